//! Opcodes of the stack IL, along with the static facts about them that editing relies on: how
//! many values each one pops and pushes, and how it affects control flow.

use std::fmt;

/// IL opcode
///
/// Short and long encodings of the same operation (eg. `ldarg.0`, `ldarg.s`, `ldarg`) are merged
/// into one opcode whose operand carries the index. This keeps pattern matching on "loads an
/// argument" to a single opcode test.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Opcode {
    Nop,
    Ldarg,
    Ldarga,
    Starg,
    Ldloc,
    Ldloca,
    Stloc,
    Ldnull,
    LdcI4,
    LdcI8,
    LdcR4,
    LdcR8,
    Ldstr,
    Dup,
    Pop,
    Call,
    Callvirt,
    Calli,
    Newobj,
    Ret,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    Bne,
    Bge,
    Bgt,
    Ble,
    Blt,
    Switch,
    Leave,
    Endfinally,
    Throw,
    Rethrow,
    Ldfld,
    Ldflda,
    Stfld,
    Ldsfld,
    Ldsflda,
    Stsfld,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Ceq,
    Cgt,
    Clt,
    ConvI4,
    ConvI8,
    ConvR4,
    ConvR8,
    Box,
    UnboxAny,
    Castclass,
    Isinst,
    Newarr,
    Ldlen,
    Ldelem,
    Stelem,
    Ldtoken,
    Ldftn,
    Ldvirtftn,
}

/// Number of values moved by one side (pop or push) of an opcode
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StackArity {
    /// Always exactly this many values
    Fixed(u8),

    /// Depends on the operand (calls, returns)
    Variable,
}

impl StackArity {
    /// Count used when summing stack depth without looking at operands
    ///
    /// Variable arities count as a single value. This is exact for `ret` in a non-void method
    /// and for calls that take one argument and return one value, and off by some amount
    /// everywhere else.
    pub fn nominal(&self) -> isize {
        match self {
            StackArity::Fixed(n) => *n as isize,
            StackArity::Variable => 1,
        }
    }
}

/// Declared stack effect of an opcode
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StackBehaviour {
    pub pop: StackArity,
    pub push: StackArity,
}

impl StackBehaviour {
    const fn new(pop: StackArity, push: StackArity) -> StackBehaviour {
        StackBehaviour { pop, push }
    }

    /// Values pushed minus values popped, using nominal counts for variable arities
    pub fn net(&self) -> isize {
        self.push.nominal() - self.pop.nominal()
    }
}

/// How an opcode affects control flow
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FlowControl {
    Next,
    Call,
    Branch,
    ConditionalBranch,
    Return,
    Throw,
}

const fn fixed(pop: u8, push: u8) -> StackBehaviour {
    StackBehaviour::new(StackArity::Fixed(pop), StackArity::Fixed(push))
}

impl Opcode {
    /// Declared stack effect
    pub fn stack_behaviour(&self) -> StackBehaviour {
        use Opcode::*;
        match self {
            Nop | Br | Leave | Endfinally | Rethrow => fixed(0, 0),

            Ldarg | Ldarga | Ldloc | Ldloca | Ldnull | LdcI4 | LdcI8 | LdcR4 | LdcR8 | Ldstr
            | Ldsfld | Ldsflda | Ldtoken | Ldftn => fixed(0, 1),

            Starg | Stloc | Stsfld | Pop | Brfalse | Brtrue | Switch | Throw => fixed(1, 0),

            Dup => fixed(1, 2),

            Beq | Bne | Bge | Bgt | Ble | Blt | Stfld => fixed(2, 0),

            Ldfld | Ldflda | Neg | Not | ConvI4 | ConvI8 | ConvR4 | ConvR8 | Box | UnboxAny
            | Castclass | Isinst | Newarr | Ldlen | Ldvirtftn => fixed(1, 1),

            Add | Sub | Mul | Div | Rem | And | Or | Xor | Shl | Shr | Ceq | Cgt | Clt
            | Ldelem => fixed(2, 1),

            Stelem => fixed(3, 0),

            Call | Callvirt | Calli | Newobj => {
                StackBehaviour::new(StackArity::Variable, StackArity::Variable)
            }

            Ret => StackBehaviour::new(StackArity::Variable, StackArity::Fixed(0)),
        }
    }

    /// Values pushed minus values popped (see [`StackArity::nominal`])
    pub fn stack_delta(&self) -> isize {
        self.stack_behaviour().net()
    }

    pub fn flow_control(&self) -> FlowControl {
        use Opcode::*;
        match self {
            Call | Callvirt | Calli | Newobj => FlowControl::Call,
            Br | Leave => FlowControl::Branch,
            Brfalse | Brtrue | Beq | Bne | Bge | Bgt | Ble | Blt | Switch => {
                FlowControl::ConditionalBranch
            }
            Ret | Endfinally => FlowControl::Return,
            Throw | Rethrow => FlowControl::Throw,
            _ => FlowControl::Next,
        }
    }

    /// Direct, virtual, or indirect method call
    ///
    /// Object construction (`newobj`) is deliberately not part of the family.
    pub fn is_call(&self) -> bool {
        matches!(self, Opcode::Call | Opcode::Callvirt | Opcode::Calli)
    }

    /// Does this opcode carry label operands?
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_control(),
            FlowControl::Branch | FlowControl::ConditionalBranch
        )
    }

    pub fn is_conditional_branch(&self) -> bool {
        self.flow_control() == FlowControl::ConditionalBranch
    }

    /// Opcodes that push a compile-time constant
    pub fn is_constant_load(&self) -> bool {
        matches!(
            self,
            Opcode::Ldnull
                | Opcode::LdcI4
                | Opcode::LdcI8
                | Opcode::LdcR4
                | Opcode::LdcR8
                | Opcode::Ldstr
        )
    }

    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        !matches!(
            self.flow_control(),
            FlowControl::Branch | FlowControl::Return | FlowControl::Throw
        )
    }

    /// Mnemonic as written in IL assembly
    pub fn mnemonic(&self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Ldarg => "ldarg",
            Ldarga => "ldarga",
            Starg => "starg",
            Ldloc => "ldloc",
            Ldloca => "ldloca",
            Stloc => "stloc",
            Ldnull => "ldnull",
            LdcI4 => "ldc.i4",
            LdcI8 => "ldc.i8",
            LdcR4 => "ldc.r4",
            LdcR8 => "ldc.r8",
            Ldstr => "ldstr",
            Dup => "dup",
            Pop => "pop",
            Call => "call",
            Callvirt => "callvirt",
            Calli => "calli",
            Newobj => "newobj",
            Ret => "ret",
            Br => "br",
            Brfalse => "brfalse",
            Brtrue => "brtrue",
            Beq => "beq",
            Bne => "bne.un",
            Bge => "bge",
            Bgt => "bgt",
            Ble => "ble",
            Blt => "blt",
            Switch => "switch",
            Leave => "leave",
            Endfinally => "endfinally",
            Throw => "throw",
            Rethrow => "rethrow",
            Ldfld => "ldfld",
            Ldflda => "ldflda",
            Stfld => "stfld",
            Ldsfld => "ldsfld",
            Ldsflda => "ldsflda",
            Stsfld => "stsfld",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Neg => "neg",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            Ceq => "ceq",
            Cgt => "cgt",
            Clt => "clt",
            ConvI4 => "conv.i4",
            ConvI8 => "conv.i8",
            ConvR4 => "conv.r4",
            ConvR8 => "conv.r8",
            Box => "box",
            UnboxAny => "unbox.any",
            Castclass => "castclass",
            Isinst => "isinst",
            Newarr => "newarr",
            Ldlen => "ldlen",
            Ldelem => "ldelem",
            Stelem => "stelem",
            Ldtoken => "ldtoken",
            Ldftn => "ldftn",
            Ldvirtftn => "ldvirtftn",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
