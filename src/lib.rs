//! Decompiler for the bytecode scripts (TOT files) of the Gob engine
//!
//! Scripts are decoded into an indented text trace, one line per operation
//! or control marker, each tagged with its file offset.

#[macro_use]
extern crate lazy_static;

pub mod archive;
pub mod block;
pub mod config;
pub mod context;
pub mod cursor;
pub mod decompiler;
pub mod error;
pub mod expression;
pub mod ext;
pub mod goblin_ops;
pub mod opcode_tables;
pub mod ops;
pub mod texts;
pub mod tot;
pub mod unpack;
pub mod video_ops;

pub use decompiler::{decompile_script, Decompiler, FileReport, WalkMode};
pub use error::{DecompileError, Result};
