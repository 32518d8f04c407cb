//! Edit the instructions of compiled stack bytecode methods
//!
//! ### Simple example
//!
//! Consider a method on `Game.Player` whose body was compiled from:
//!
//! ```csharp,ignore,no_run
//! public void Hit() {
//!     this.Damage(10);
//! }
//! ```
//!
//! Halving the damage and logging every hit can be done as follows:
//!
//! ```
//! use stackedit::il::*;
//! use stackedit::il::code::*;
//!
//! # fn patch() -> Result<(), Error> {
//! // Register the members the instructions refer to
//! let arenas = TypeGraphArenas::new();
//! let graph = TypeGraph::new(&arenas);
//! let player = graph.add_type(TypeData::new(
//!     TypeName::from_str("Game.Player").unwrap(),
//!     None,
//!     TypeAttributes::PUBLIC,
//! ));
//! let damage = graph.add_method(MethodData::new(
//!     player,
//!     MemberName::from_str("Damage").unwrap(),
//!     MethodSignature {
//!         parameters: vec![ValueType::int32()],
//!         return_type: None,
//!     },
//!     MethodAttributes::PUBLIC,
//! ));
//! let log_hit = graph.add_method(MethodData::new(
//!     player,
//!     MemberName::from_str("Log").unwrap(),
//!     MethodSignature {
//!         parameters: vec![ValueType::string()],
//!         return_type: None,
//!     },
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//! ));
//!
//! // The method body, as handed over by the patch host
//! let mut cursor = CodeCursor::new(vec![
//!     Instruction::new(Opcode::Ldarg, Operand::Argument(0)),
//!     Instruction::new(Opcode::LdcI4, 10i32),
//!     Instruction::new(Opcode::Call, damage),
//!     Instruction::simple(Opcode::Ret),
//! ]);
//!
//! // Find the constant passed to `Damage` and change it
//! cursor
//!     .match_start_forward(&[CodeMatch::loads_constant(), CodeMatch::calls(damage)])
//!     .ensure_valid("damage call")?
//!     .set_operand_and_advance(Operand::Int32(5))?;
//!
//! // Log before the arguments of `Damage` get loaded
//! let signature = CallSignature::new(
//!     TypeName::from_str("Game.Player").unwrap(),
//!     MemberName::from_str("Damage").unwrap(),
//! );
//! let start = cursor.seek_start().position_before_argument_load(&signature)?;
//! assert_eq!(start, ArgumentLoadStart::Found(0));
//! cursor.const_string("hit")?;
//! cursor.invoke(log_hit)?;
//!
//! // Take the edited method body back out
//! let instructions = cursor.finish()?;
//! assert_eq!(instructions.len(), 6);
//! assert_eq!(instructions[3], Instruction::new(Opcode::LdcI4, 5i32));
//! # Ok(())
//! # }
//! # patch().unwrap();
//! ```

mod attributes;
pub mod code;
mod descriptors;
mod errors;
mod names;
mod settings;
mod type_graph;

pub use attributes::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use settings::*;
pub use type_graph::*;
