//! Core front end for the GDML declaration language.
//!
//! The pipeline is roughly:
//!
//!   source .gdml
//!     -> lexer      (tokens)
//!     -> stream     (peekable tokens with checkpoint / rewind)
//!     -> parser     (AST)
//!     -> scope + typecheck (resolved paths, types, exports)
//!
//! Tools (the CLI, editors, code generators) should depend on this crate
//! rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod stream;
pub mod ast;
pub mod parser;

// ---------------------------------------------------------------------
// Semantic layers: paths, types, values, scopes, type checking
// ---------------------------------------------------------------------

pub mod path;
pub mod types;
pub mod value;
pub mod scope;
pub mod typecheck;

// ---------------------------------------------------------------------
// Driver and source loading
// ---------------------------------------------------------------------

pub mod sources;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{Options, ParsedSrc, Parser, compile_dir, compile_source};
pub use diagnostic::{Diagnostic, Level};
pub use error::{CheckError, CoreError, ParseError, TypeError};
pub use path::{FullIdentPath, IdentPath};
pub use sources::load_sources;
pub use span::Src;
pub use types::Type;
