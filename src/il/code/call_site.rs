use super::{CodeCursor, Opcode};
use crate::il::{Error, MemberName, MethodData, RenderType, TypeId, TypeName, ValueType};
use std::fmt;

/// Identifies the callee of a call instruction by name
///
/// Parameters and generic arguments are optional, and when they are given they only need to be
/// a prefix of the callee's. That keeps a lookup working when the callee gains trailing
/// parameters in a later version of the code being patched.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CallSignature<'g> {
    pub declaring_type: TypeName,
    pub name: MemberName,
    pub parameters: Option<Vec<ValueType<TypeId<'g>>>>,
    pub generic_arguments: Option<Vec<ValueType<TypeId<'g>>>>,
}

impl<'g> CallSignature<'g> {
    pub fn new(declaring_type: TypeName, name: MemberName) -> CallSignature<'g> {
        CallSignature {
            declaring_type,
            name,
            parameters: None,
            generic_arguments: None,
        }
    }

    pub fn with_parameters(
        mut self,
        parameters: impl IntoIterator<Item = ValueType<TypeId<'g>>>,
    ) -> CallSignature<'g> {
        self.parameters = Some(parameters.into_iter().collect());
        self
    }

    pub fn with_generic_arguments(
        mut self,
        generic_arguments: impl IntoIterator<Item = ValueType<TypeId<'g>>>,
    ) -> CallSignature<'g> {
        self.generic_arguments = Some(generic_arguments.into_iter().collect());
        self
    }

    /// Check whether a method fits this signature
    pub fn matches(&self, method: &MethodData<'g>) -> bool {
        if method.declaring_type.name != self.declaring_type || method.name != self.name {
            return false;
        }
        if let Some(parameters) = &self.parameters {
            if !method.signature.parameters_start_with(parameters) {
                return false;
            }
        }
        match &self.generic_arguments {
            Some(generic_arguments) => method.generic_arguments.starts_with(generic_arguments),
            None => true,
        }
    }
}

impl<'g> fmt::Display for CallSignature<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if let Some(generic_arguments) = &self.generic_arguments {
            let rendered: Vec<String> = generic_arguments.iter().map(|t| t.render()).collect();
            write!(f, "<{}, ..>", rendered.join(", "))?;
        }
        match &self.parameters {
            Some(parameters) => {
                let rendered: Vec<String> = parameters.iter().map(|t| t.render()).collect();
                write!(f, "({}, ..)", rendered.join(", "))
            }
            None => f.write_str("(..)"),
        }
    }
}

/// Outcome of walking back from a call to the start of its argument loads
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArgumentLoadStart {
    /// First instruction contributing to the call's arguments
    Found(usize),

    /// The call consumes nothing from the stack
    AlreadySatisfied,

    /// The start of the sequence was reached before the call's arguments were accounted for
    NotFound,
}

impl<'g> CodeCursor<'g> {
    /// Move forward (starting at the current instruction) to the next call of a method matching
    /// `signature`
    ///
    /// Indirect calls carry no method, so they never match.
    pub fn locate_call(&mut self, signature: &CallSignature<'g>) -> Result<&mut Self, Error> {
        self.search_forward(|insn| {
            insn.opcode.is_call() && insn.called_method().map_or(false, |m| signature.matches(&m))
        });
        if self.is_invalid() {
            return Err(Error::CallNotFound(signature.to_string()));
        }
        log::debug!("found call to {} at {}", signature, self.position());
        Ok(self)
    }

    /// Locate the next call matching `signature`, then move back to the instruction where the
    /// loading of its arguments starts
    ///
    /// The walk sums the net stack effect of the instructions preceding the call until it
    /// accounts for everything the call consumes (the receiver included, for instance calls).
    /// This assumes straight-line code between the argument loads and the call. When nothing
    /// is found, the cursor stays on the call.
    pub fn position_before_argument_load(
        &mut self,
        signature: &CallSignature<'g>,
    ) -> Result<ArgumentLoadStart, Error> {
        self.locate_call(signature)?;
        let call_index = self.position() as usize;
        let consumption = self
            .instructions()
            .get(call_index)
            .and_then(|insn| insn.called_method())
            .map_or(0, |method| method.stack_consumption()) as isize;

        if consumption == 0 {
            return Ok(ArgumentLoadStart::AlreadySatisfied);
        }

        let mut depth: isize = 0;
        let found = self.instructions()[..call_index]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, insn)| {
                depth += insn.opcode.stack_delta();
                if depth == consumption {
                    Some(index)
                } else {
                    None
                }
            });

        match found {
            Some(index) => {
                log::debug!(
                    "arguments of call to {} at {} start at {}",
                    signature,
                    call_index,
                    index
                );
                self.advance(index as isize - call_index as isize);
                Ok(ArgumentLoadStart::Found(index))
            }
            None => {
                let message = format!(
                    "cannot find where the {} arguments of the call to {} at {} are loaded",
                    consumption, signature, call_index
                );
                log::trace!("{}", message);
                self.set_last_error(message);
                Ok(ArgumentLoadStart::NotFound)
            }
        }
    }

    /// Locate the next call matching `signature` and move just past it, also skipping a `pop`
    /// that discards its result
    pub fn position_after_call(
        &mut self,
        signature: &CallSignature<'g>,
    ) -> Result<&mut Self, Error> {
        self.locate_call(signature)?.advance(1);
        if self.opcode() == Some(Opcode::Pop) {
            self.advance(1);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::code::{Instruction, Operand};
    use crate::il::{
        MethodAttributes, MethodSignature, Name, TypeAttributes, TypeData, TypeGraph,
        TypeGraphArenas,
    };

    fn name(s: &str) -> MemberName {
        MemberName::from_str(s).unwrap()
    }

    fn type_name(s: &str) -> TypeName {
        TypeName::from_str(s).unwrap()
    }

    #[test]
    fn stack_walk_finds_receiver_load() {
        let arenas = TypeGraphArenas::new();
        let graph = TypeGraph::new(&arenas);
        let player = graph.add_type(TypeData::new(
            type_name("Game.Player"),
            None,
            TypeAttributes::PUBLIC,
        ));
        let damage = graph.add_method(MethodData::new(
            player,
            name("Damage"),
            MethodSignature {
                parameters: vec![ValueType::int32()],
                return_type: None,
            },
            MethodAttributes::PUBLIC,
        ));
        let heal = graph.add_method(MethodData::new(
            player,
            name("Heal"),
            MethodSignature {
                parameters: vec![],
                return_type: Some(ValueType::boolean()),
            },
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        ));

        let code = vec![
            Instruction::simple(Opcode::Nop),
            Instruction::new(Opcode::Ldarg, Operand::Argument(0)),
            Instruction::new(Opcode::Ldarg, Operand::Argument(1)),
            Instruction::new(Opcode::Call, damage),
            Instruction::new(Opcode::Call, heal),
            Instruction::simple(Opcode::Pop),
            Instruction::simple(Opcode::Ret),
        ];
        let mut cursor = CodeCursor::new(code);
        cursor.seek_start();

        let damage_sig = CallSignature::new(type_name("Game.Player"), name("Damage"));
        assert_eq!(
            cursor.position_before_argument_load(&damage_sig).unwrap(),
            ArgumentLoadStart::Found(1)
        );
        assert_eq!(cursor.position(), 1);

        let heal_sig = CallSignature::new(type_name("Game.Player"), name("Heal"));
        assert_eq!(
            cursor.position_before_argument_load(&heal_sig).unwrap(),
            ArgumentLoadStart::AlreadySatisfied
        );
        assert_eq!(cursor.position(), 4);

        cursor.seek_start().position_after_call(&heal_sig).unwrap();
        assert_eq!(cursor.opcode(), Some(Opcode::Ret));

        cursor.seek_start().position_after_call(&damage_sig).unwrap();
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn stack_walk_can_run_out() {
        let arenas = TypeGraphArenas::new();
        let graph = TypeGraph::new(&arenas);
        let player = graph.add_type(TypeData::new(
            type_name("Game.Player"),
            None,
            TypeAttributes::PUBLIC,
        ));
        let damage = graph.add_method(MethodData::new(
            player,
            name("Damage"),
            MethodSignature {
                parameters: vec![ValueType::int32()],
                return_type: None,
            },
            MethodAttributes::PUBLIC,
        ));

        // Only one of the two consumed values is loaded in this method body
        let code = vec![
            Instruction::new(Opcode::LdcI4, 3i32),
            Instruction::new(Opcode::Call, damage),
        ];
        let mut cursor = CodeCursor::new(code);
        cursor.seek_start();
        let signature = CallSignature::new(type_name("Game.Player"), name("Damage"));
        assert_eq!(
            cursor.position_before_argument_load(&signature).unwrap(),
            ArgumentLoadStart::NotFound
        );
        assert_eq!(cursor.position(), 1);
        assert!(cursor.last_error().is_some());
    }

    #[test]
    fn signature_prefixes() {
        let arenas = TypeGraphArenas::new();
        let graph = TypeGraph::new(&arenas);
        let player = graph.add_type(TypeData::new(
            type_name("Game.Player"),
            None,
            TypeAttributes::PUBLIC,
        ));
        let overload = |parameters: Vec<ValueType<_>>| {
            graph.add_method(MethodData::new(
                player,
                name("Say"),
                MethodSignature {
                    parameters,
                    return_type: None,
                },
                MethodAttributes::PUBLIC,
            ))
        };
        let say_string = overload(vec![ValueType::string()]);
        let say_string_int = overload(vec![ValueType::string(), ValueType::int32()]);

        let code = vec![
            Instruction::new(Opcode::Call, say_string),
            Instruction::new(Opcode::Callvirt, say_string_int),
            Instruction::new(Opcode::Calli, Operand::Signature(say_string.signature.clone())),
        ];
        let mut cursor = CodeCursor::new(code);

        let by_int = CallSignature::new(type_name("Game.Player"), name("Say"))
            .with_parameters([ValueType::string(), ValueType::int32()]);
        cursor.seek_start().locate_call(&by_int).unwrap();
        assert_eq!(cursor.position(), 1);

        let by_string = CallSignature::new(type_name("Game.Player"), name("Say"))
            .with_parameters([ValueType::string()]);
        cursor.seek_start().locate_call(&by_string).unwrap();
        assert_eq!(cursor.position(), 0);
        cursor.advance(1).locate_call(&by_string).unwrap();
        assert_eq!(cursor.position(), 1);

        // The indirect call is never a match
        assert!(matches!(
            cursor.advance(1).locate_call(&by_string),
            Err(Error::CallNotFound(_))
        ));

        let other = CallSignature::new(type_name("Game.Enemy"), name("Say"));
        assert!(cursor.seek_start().locate_call(&other).is_err());
        assert_eq!(other.to_string(), "Game.Enemy::Say(..)");
        assert_eq!(by_int.to_string(), "Game.Player::Say(string, int32, ..)");
    }
}
