use super::{CodeCursor, Instruction, Opcode, Operand};
use crate::il::{Error, FieldId, MethodId};
use std::borrow::Cow;

/// Emit helpers on top of [`CodeCursor`]
///
/// Every helper inserts in front of the current instruction and moves past what it inserted, so
/// a run of helper calls produces instructions in call order.
pub trait CodeCursorExts<'g> {
    /// Push the receiver of an instance method
    fn load_this(&mut self) -> Result<(), Error>;

    /// Push the argument in the given slot (slot 0 is the receiver in instance methods)
    fn load_argument(&mut self, slot: u16) -> Result<(), Error>;

    /// Push a local variable
    fn load_local(&mut self, index: u16) -> Result<(), Error>;

    /// Pop into a local variable
    fn store_local(&mut self, index: u16) -> Result<(), Error>;

    /// Push a null reference
    fn const_null(&mut self) -> Result<(), Error>;

    /// Push an integer constant onto the stack
    fn const_int(&mut self, integer: i32) -> Result<(), Error>;

    /// Push a long constant onto the stack
    fn const_long(&mut self, long: i64) -> Result<(), Error>;

    /// Push a float constant onto the stack
    fn const_float(&mut self, float: f32) -> Result<(), Error>;

    /// Push a double constant onto the stack
    fn const_double(&mut self, double: f64) -> Result<(), Error>;

    /// Push a constant string to the stack
    fn const_string(&mut self, string: impl Into<Cow<'static, str>>) -> Result<(), Error>;

    /// Discard the top of the stack
    fn pop(&mut self) -> Result<(), Error>;

    /// Call a method, picking direct or virtual dispatch from the method itself
    fn invoke(&mut self, method: MethodId<'g>) -> Result<(), Error>;

    /// Get/put a field
    fn access_field(&mut self, field: FieldId<'g>, access_mode: AccessMode) -> Result<(), Error>;
}

impl<'g> CodeCursorExts<'g> for CodeCursor<'g> {
    fn load_this(&mut self) -> Result<(), Error> {
        self.load_argument(0)
    }

    fn load_argument(&mut self, slot: u16) -> Result<(), Error> {
        emit(self, Opcode::Ldarg, Operand::Argument(slot))
    }

    fn load_local(&mut self, index: u16) -> Result<(), Error> {
        emit(self, Opcode::Ldloc, Operand::Local(index))
    }

    fn store_local(&mut self, index: u16) -> Result<(), Error> {
        emit(self, Opcode::Stloc, Operand::Local(index))
    }

    fn const_null(&mut self) -> Result<(), Error> {
        self.insert_and_advance([Instruction::simple(Opcode::Ldnull)])?;
        Ok(())
    }

    fn const_int(&mut self, integer: i32) -> Result<(), Error> {
        emit(self, Opcode::LdcI4, Operand::Int32(integer))
    }

    fn const_long(&mut self, long: i64) -> Result<(), Error> {
        emit(self, Opcode::LdcI8, Operand::Int64(long))
    }

    fn const_float(&mut self, float: f32) -> Result<(), Error> {
        emit(self, Opcode::LdcR4, Operand::Float32(float))
    }

    fn const_double(&mut self, double: f64) -> Result<(), Error> {
        emit(self, Opcode::LdcR8, Operand::Float64(double))
    }

    fn const_string(&mut self, string: impl Into<Cow<'static, str>>) -> Result<(), Error> {
        emit(self, Opcode::Ldstr, Operand::String(string.into()))
    }

    fn pop(&mut self) -> Result<(), Error> {
        self.insert_and_advance([Instruction::simple(Opcode::Pop)])?;
        Ok(())
    }

    fn invoke(&mut self, method: MethodId<'g>) -> Result<(), Error> {
        emit(self, method.infer_call_opcode(), Operand::Method(method))
    }

    fn access_field(&mut self, field: FieldId<'g>, access_mode: AccessMode) -> Result<(), Error> {
        let opcode = match (field.is_static(), access_mode) {
            (true, AccessMode::Read) => Opcode::Ldsfld,
            (true, AccessMode::Write) => Opcode::Stsfld,
            (false, AccessMode::Read) => Opcode::Ldfld,
            (false, AccessMode::Write) => Opcode::Stfld,
        };
        emit(self, opcode, Operand::Field(field))
    }
}

fn emit<'g>(
    cursor: &mut CodeCursor<'g>,
    opcode: Opcode,
    operand: Operand<'g>,
) -> Result<(), Error> {
    cursor.insert_and_advance([Instruction::new(opcode, operand)])?;
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AccessMode {
    Read,
    Write,
}
