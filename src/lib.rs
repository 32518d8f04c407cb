//! Cursor-based editing of stack bytecode instruction streams
//!
//! See [`il`] for an overview.

pub mod il;
pub mod util;
