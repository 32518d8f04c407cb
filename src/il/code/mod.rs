//! Instructions, patterns, and the cursor that edits them

mod arguments;
mod call_site;
mod cursor;
mod cursor_exts;
mod instruction;
mod label;
mod opcode;
mod pattern;

pub use arguments::*;
pub use call_site::*;
pub use cursor::*;
pub use cursor_exts::*;
pub use instruction::*;
pub use label::*;
pub use opcode::*;
pub use pattern::*;
