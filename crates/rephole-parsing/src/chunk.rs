//! The chunk emitted by the splitter

use serde::{Deserialize, Serialize};

/// Name used when no identifier node attaches to a block
pub const ANONYMOUS_NAME: &str = "anonymous";

/// A contiguous, syntactically meaningful slice of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Canonical id: `{filePath}:{name}:{nodeType}:L{startLine}`
    pub id: String,
    /// Grammar node type of the block (`function_item`, `class_declaration`, ...)
    pub kind: String,
    /// Identifier attached to the block, or `"anonymous"`
    pub name: String,
    /// Source text from the start of any leading comment/decorator chain to
    /// the end of the block
    pub content: String,
    /// 1-indexed inclusive start line (after context expansion)
    pub start_line: usize,
    /// 1-indexed inclusive end line
    pub end_line: usize,
}

impl Chunk {
    /// Build the canonical chunk id
    pub fn make_id(file_path: &str, name: &str, kind: &str, start_line: usize) -> String {
        format!("{file_path}:{name}:{kind}:L{start_line}")
    }
}
