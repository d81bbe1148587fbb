//! Hawk Compiler: tokeniser, AST, and scope-resolving parser.
//!
//! The [`Hawk`] handle owns what survives across parses (options,
//! intrinsics, embedder globals, the parsed tree); script text arrives
//! through the [`source::SourceIo`] callback, and [`Hawk::parse`] turns it
//! into an [`ast::Program`] with identifiers resolved into global, local,
//! and parameter slots.

pub mod ast;
pub mod globals;
pub mod hawk;
mod parser;
pub mod source;
mod token;

pub use ast::Program;
pub use globals::{builtin_global, GblId, BUILTIN_GLOBALS, NUM_BUILTIN_GLOBALS};
pub use hawk::{Hawk, IntrinsicSpec};
pub use source::{FileSource, SourceArg, SourceIo, StringSource};
