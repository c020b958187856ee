//! The splitter: source text in, named semantic chunks out

use crate::chunk::{ANONYMOUS_NAME, Chunk};
use crate::languages::{GrammarRegistry, LoadedLanguage};
use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::{Node, Parser, StreamingIterator};

/// Splits source files into chunks using the grammar registry
///
/// The chunker is cheap to clone and share; tree-sitter parsers are created
/// per call (they are not Sync), while compiled queries are shared through
/// the registry.
#[derive(Clone)]
pub struct Chunker {
    registry: Arc<GrammarRegistry>,
}

impl Chunker {
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self { registry }
    }

    /// Split a file into chunks
    ///
    /// Returns chunks in document order. Unsupported extensions, unparsable
    /// input, and files with no block captures all yield an empty vec.
    pub fn split(&self, file_path: &str, source: &str) -> Vec<Chunk> {
        let extension = file_path.rsplit('.').next().unwrap_or("");
        let Some(grammar) = self.registry.for_extension(extension) else {
            return Vec::new();
        };

        let mut parser = Parser::new();
        if parser.set_language(&grammar.language).is_err() {
            tracing::warn!(language = grammar.id, "Parser rejected grammar");
            return Vec::new();
        }

        let Some(tree) = parser.parse(source, None) else {
            tracing::warn!(file = file_path, "Parse failed, emitting no chunks");
            return Vec::new();
        };

        let chunks = self.collect_chunks(&grammar, tree.root_node(), file_path, source);
        verify_unique_ids(file_path, &chunks);
        chunks
    }

    fn collect_chunks(
        &self,
        grammar: &LoadedLanguage,
        root: Node<'_>,
        file_path: &str,
        source: &str,
    ) -> Vec<Chunk> {
        let Some(block_idx) = grammar.query.capture_index_for_name("block") else {
            return Vec::new();
        };
        let name_idx = grammar.query.capture_index_for_name("name");

        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(&grammar.query, root, source.as_bytes());

        // Pair every block capture with the name capture from the same match
        let mut captured: Vec<(Node<'_>, Option<Node<'_>>)> = Vec::new();
        while let Some(m) = matches.next() {
            let mut block = None;
            let mut name = None;
            for capture in m.captures {
                if capture.index == block_idx {
                    block = Some(capture.node);
                } else if name_idx == Some(capture.index) {
                    name = Some(capture.node);
                }
            }
            if let Some(block_node) = block {
                captured.push((block_node, name));
            }
        }

        // Patterns can interleave; document order is by byte offset
        captured.sort_by_key(|(block, _)| block.start_byte());

        captured
            .into_iter()
            .map(|(block, name)| build_chunk(file_path, source, block, name))
            .collect()
    }
}

fn build_chunk(file_path: &str, source: &str, block: Node<'_>, name: Option<Node<'_>>) -> Chunk {
    // The identifier only counts when it hangs directly off the block node
    let name = name
        .filter(|n| n.parent().is_some_and(|p| p == block))
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or(ANONYMOUS_NAME)
        .to_string();

    // Context expansion: absorb the chain of comments/decorators immediately
    // preceding the block
    let mut start_node = block;
    let mut prev = block.prev_sibling();
    while let Some(sibling) = prev {
        if !is_context_node(sibling.kind()) {
            break;
        }
        start_node = sibling;
        prev = sibling.prev_sibling();
    }

    let start_byte = start_node.start_byte();
    let end_byte = block.end_byte();
    let content = source.get(start_byte..end_byte).unwrap_or_default().to_string();

    let start_line = start_node.start_position().row + 1;
    let end_line = block.end_position().row + 1;
    let kind = block.kind().to_string();
    let id = Chunk::make_id(file_path, &name, &kind, start_line);

    Chunk {
        id,
        kind,
        name,
        content,
        start_line,
        end_line,
    }
}

/// Nodes a chunk absorbs when they precede its block
fn is_context_node(kind: &str) -> bool {
    kind.contains("comment")
        || kind.contains("annotation")
        || matches!(kind, "decorator" | "attribute_item" | "attribute_list" | "attribute")
}

/// Chunk ids must be pairwise distinct within a file; a collision indicates
/// a parser or query bug. Logged here, rejected for real before upsert.
fn verify_unique_ids(file_path: &str, chunks: &[Chunk]) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for chunk in chunks {
        *seen.entry(chunk.id.as_str()).or_insert(0) += 1;
    }
    let duplicates: Vec<&str> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect();
    if !duplicates.is_empty() {
        tracing::error!(
            file = file_path,
            ids = ?duplicates,
            "Duplicate chunk ids emitted for one file"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::GrammarRegistry;

    fn chunker() -> Chunker {
        Chunker::new(Arc::new(GrammarRegistry::new()))
    }

    #[test]
    fn unknown_extension_yields_no_chunks() {
        assert!(chunker().split("binary.dat", "anything").is_empty());
        assert!(chunker().split("Makefile", "all:\n\techo hi").is_empty());
    }

    #[test]
    fn typescript_class_and_methods() {
        let source = r"
class AuthService {
  refreshToken(token: string): string {
    return token;
  }

  revoke(token: string): void {}
}
";
        let chunks = chunker().split("src/auth/auth.service.ts", source);
        let kinds: Vec<&str> = chunks.iter().map(|c| c.kind.as_str()).collect();
        assert!(kinds.contains(&"class_declaration"));
        assert!(kinds.contains(&"method_definition"));

        let class = chunks.iter().find(|c| c.kind == "class_declaration").unwrap();
        assert_eq!(class.name, "AuthService");
        assert_eq!(
            class.id,
            format!("src/auth/auth.service.ts:AuthService:class_declaration:L{}", class.start_line)
        );

        let method = chunks.iter().find(|c| c.name == "refreshToken").unwrap();
        assert_eq!(method.kind, "method_definition");
        assert!(method.content.contains("return token"));
    }

    #[test]
    fn leading_comment_is_absorbed() {
        let source = r"
// Refreshes an access token.
// Tokens expire after one hour.
function refresh(token: string): string {
  return token;
}
";
        let chunks = chunker().split("src/token.ts", source);
        let func = chunks.iter().find(|c| c.name == "refresh").unwrap();
        assert!(func.content.starts_with("// Refreshes an access token."));
        assert_eq!(func.start_line, 2);
        assert!(func.id.ends_with(":L2"));
    }

    #[test]
    fn python_decorator_is_absorbed() {
        let source = r"
@retry(times=3)
def fetch(url):
    return url
";
        let chunks = chunker().split("client.py", source);
        let func = chunks.iter().find(|c| c.name == "fetch").unwrap();
        assert!(func.content.starts_with("@retry(times=3)"));
        assert_eq!(func.kind, "function_definition");
    }

    #[test]
    fn rust_doc_comments_are_absorbed() {
        let source = r"
/// Adds two numbers.
fn add(a: u32, b: u32) -> u32 {
    a + b
}
";
        let chunks = chunker().split("src/math.rs", source);
        let func = chunks.iter().find(|c| c.name == "add").unwrap();
        assert!(func.content.starts_with("/// Adds two numbers."));
    }

    #[test]
    fn arrow_function_binding_is_anonymous() {
        let source = "const handler = (req) => {\n  return req;\n};\n";
        let chunks = chunker().split("handler.js", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, ANONYMOUS_NAME);
        assert_eq!(chunks[0].kind, "lexical_declaration");
    }

    #[test]
    fn source_without_blocks_yields_no_chunks() {
        let chunks = chunker().split("src/consts.ts", "export const X = 1;\n");
        assert!(chunks.is_empty());
    }

    #[test]
    fn ids_are_pairwise_distinct() {
        let source = r"
fn a() {}
fn b() {}
fn c() {}
";
        let chunks = chunker().split("src/lib.rs", source);
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(before, ids.len());
        assert_eq!(before, 3);
    }

    #[test]
    fn chunks_arrive_in_document_order() {
        let source = r"
def first():
    pass

def second():
    pass
";
        let chunks = chunker().split("mod.py", source);
        assert_eq!(chunks[0].name, "first");
        assert_eq!(chunks[1].name, "second");
        assert!(chunks[0].start_line < chunks[1].start_line);
    }

    #[test]
    fn line_bounds_are_one_indexed_inclusive() {
        let source = "fn only() {\n    let _x = 1;\n}\n";
        let chunks = chunker().split("one.rs", source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }
}
