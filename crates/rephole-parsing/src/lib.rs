//! Syntax-aware code chunking for rephole
//!
//! Splits source files into semantically meaningful chunks (functions,
//! classes, methods, ...) using tree-sitter grammars and per-language
//! capture queries. Unsupported extensions and unparsable files yield an
//! empty chunk list rather than an error.

pub mod chunk;
pub mod chunker;
pub mod languages;

pub use chunk::Chunk;
pub use chunker::Chunker;
pub use languages::{GrammarRegistry, LanguageSpec};
