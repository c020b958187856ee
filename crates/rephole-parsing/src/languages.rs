//! Language-specific configurations for code chunking
//!
//! This module centralizes all language-specific parsing configuration:
//! tree-sitter grammar bindings, file-extension mapping, and the capture
//! queries that mark chunkable blocks.
//!
//! Every query binds two capture names:
//! - `@block` - the node that becomes a chunk
//! - `@name`  - the identifier attached to the block, when the grammar
//!   exposes one as a direct child

use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::{Language, Query};

/// Static description of one supported language
pub struct LanguageSpec {
    /// The language identifier (e.g. "rust", "typescript")
    pub id: &'static str,
    /// File extensions (lowercase, without dot) handled by this grammar
    pub extensions: &'static [&'static str],
    /// Tree-sitter grammar
    pub language: Language,
    /// Capture query binding `@block` and `@name`
    pub query: &'static str,
}

/// A language whose query compiled successfully at startup
pub struct LoadedLanguage {
    pub id: &'static str,
    pub language: Language,
    pub query: Arc<Query>,
}

const RUST_QUERY: &str = r"
    (function_item name: (_) @name) @block
    (struct_item name: (_) @name) @block
    (enum_item name: (_) @name) @block
    (trait_item name: (_) @name) @block
    (impl_item type: (_) @name) @block
    (mod_item name: (_) @name) @block
    (macro_definition name: (_) @name) @block
";

const PYTHON_QUERY: &str = r"
    (function_definition name: (_) @name) @block
    (class_definition name: (_) @name) @block
";

const JAVASCRIPT_QUERY: &str = r"
    (function_declaration name: (_) @name) @block
    (generator_function_declaration name: (_) @name) @block
    (class_declaration name: (_) @name) @block
    (method_definition name: (_) @name) @block
    (lexical_declaration (variable_declarator value: (arrow_function))) @block
";

const TYPESCRIPT_QUERY: &str = r"
    (function_declaration name: (_) @name) @block
    (generator_function_declaration name: (_) @name) @block
    (class_declaration name: (_) @name) @block
    (abstract_class_declaration name: (_) @name) @block
    (method_definition name: (_) @name) @block
    (interface_declaration name: (_) @name) @block
    (enum_declaration name: (_) @name) @block
    (type_alias_declaration name: (_) @name) @block
    (lexical_declaration (variable_declarator value: (arrow_function))) @block
";

const GO_QUERY: &str = r"
    (function_declaration name: (_) @name) @block
    (method_declaration name: (_) @name) @block
    (type_declaration) @block
";

const C_QUERY: &str = r"
    (function_definition) @block
    (struct_specifier name: (_) @name body: (_)) @block
    (enum_specifier name: (_) @name body: (_)) @block
";

const CPP_QUERY: &str = r"
    (function_definition) @block
    (class_specifier name: (_) @name body: (_)) @block
    (struct_specifier name: (_) @name body: (_)) @block
    (enum_specifier name: (_) @name body: (_)) @block
    (namespace_definition name: (_) @name) @block
";

const JAVA_QUERY: &str = r"
    (method_declaration name: (_) @name) @block
    (constructor_declaration name: (_) @name) @block
    (class_declaration name: (_) @name) @block
    (interface_declaration name: (_) @name) @block
    (enum_declaration name: (_) @name) @block
    (record_declaration name: (_) @name) @block
";

const C_SHARP_QUERY: &str = r"
    (method_declaration name: (_) @name) @block
    (constructor_declaration name: (_) @name) @block
    (class_declaration name: (_) @name) @block
    (interface_declaration name: (_) @name) @block
    (struct_declaration name: (_) @name) @block
    (enum_declaration name: (_) @name) @block
";

const RUBY_QUERY: &str = r"
    (method name: (_) @name) @block
    (singleton_method name: (_) @name) @block
    (class name: (_) @name) @block
    (module name: (_) @name) @block
";

const PHP_QUERY: &str = r"
    (function_definition name: (_) @name) @block
    (method_declaration name: (_) @name) @block
    (class_declaration name: (_) @name) @block
    (interface_declaration name: (_) @name) @block
    (trait_declaration name: (_) @name) @block
";

const JSON_QUERY: &str = r"
    (document (object (pair key: (_) @name) @block))
";

const YAML_QUERY: &str = r"
    (stream (document (block_node (block_mapping (block_mapping_pair key: (_) @name) @block))))
";

const BASH_QUERY: &str = r"
    (function_definition name: (_) @name) @block
";

const HTML_QUERY: &str = r"
    (script_element) @block
    (style_element) @block
";

const CSS_QUERY: &str = r"
    (rule_set (selectors) @name) @block
    (media_statement) @block
";

/// All grammars compiled into this build
///
/// Languages without maintained crates.io bindings are intentionally absent;
/// their extensions fall through to the empty-chunk path.
fn language_specs() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec {
            id: "rust",
            extensions: &["rs"],
            language: tree_sitter_rust::LANGUAGE.into(),
            query: RUST_QUERY,
        },
        LanguageSpec {
            id: "python",
            extensions: &["py", "pyi"],
            language: tree_sitter_python::LANGUAGE.into(),
            query: PYTHON_QUERY,
        },
        LanguageSpec {
            id: "javascript",
            extensions: &["js", "mjs", "cjs", "jsx"],
            language: tree_sitter_javascript::LANGUAGE.into(),
            query: JAVASCRIPT_QUERY,
        },
        LanguageSpec {
            id: "typescript",
            extensions: &["ts", "mts", "cts"],
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            query: TYPESCRIPT_QUERY,
        },
        LanguageSpec {
            id: "tsx",
            extensions: &["tsx"],
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            query: TYPESCRIPT_QUERY,
        },
        LanguageSpec {
            id: "go",
            extensions: &["go"],
            language: tree_sitter_go::LANGUAGE.into(),
            query: GO_QUERY,
        },
        LanguageSpec {
            id: "c",
            extensions: &["c", "h"],
            language: tree_sitter_c::LANGUAGE.into(),
            query: C_QUERY,
        },
        LanguageSpec {
            id: "cpp",
            extensions: &["cpp", "cc", "cxx", "hpp", "hh"],
            language: tree_sitter_cpp::LANGUAGE.into(),
            query: CPP_QUERY,
        },
        LanguageSpec {
            id: "java",
            extensions: &["java"],
            language: tree_sitter_java::LANGUAGE.into(),
            query: JAVA_QUERY,
        },
        LanguageSpec {
            id: "csharp",
            extensions: &["cs"],
            language: tree_sitter_c_sharp::LANGUAGE.into(),
            query: C_SHARP_QUERY,
        },
        LanguageSpec {
            id: "ruby",
            extensions: &["rb", "rake"],
            language: tree_sitter_ruby::LANGUAGE.into(),
            query: RUBY_QUERY,
        },
        LanguageSpec {
            id: "php",
            extensions: &["php"],
            language: tree_sitter_php::LANGUAGE_PHP.into(),
            query: PHP_QUERY,
        },
        LanguageSpec {
            id: "json",
            extensions: &["json"],
            language: tree_sitter_json::LANGUAGE.into(),
            query: JSON_QUERY,
        },
        LanguageSpec {
            id: "yaml",
            extensions: &["yml", "yaml"],
            language: tree_sitter_yaml::LANGUAGE.into(),
            query: YAML_QUERY,
        },
        LanguageSpec {
            id: "bash",
            extensions: &["sh", "bash"],
            language: tree_sitter_bash::LANGUAGE.into(),
            query: BASH_QUERY,
        },
        LanguageSpec {
            id: "html",
            extensions: &["html", "htm"],
            language: tree_sitter_html::LANGUAGE.into(),
            query: HTML_QUERY,
        },
        LanguageSpec {
            id: "css",
            extensions: &["css"],
            language: tree_sitter_css::LANGUAGE.into(),
            query: CSS_QUERY,
        },
    ]
}

/// Extension-to-grammar table built once at startup
///
/// A language whose query fails to compile is disabled (logged) without
/// affecting the others; the service still starts as long as at least one
/// language loaded.
pub struct GrammarRegistry {
    by_extension: HashMap<&'static str, Arc<LoadedLanguage>>,
    loaded: Vec<&'static str>,
}

impl GrammarRegistry {
    /// Compile all queries and build the extension table
    pub fn new() -> Self {
        let mut by_extension = HashMap::new();
        let mut loaded = Vec::new();

        for spec in language_specs() {
            match Query::new(&spec.language, spec.query) {
                Ok(query) => {
                    let entry = Arc::new(LoadedLanguage {
                        id: spec.id,
                        language: spec.language,
                        query: Arc::new(query),
                    });
                    for ext in spec.extensions {
                        by_extension.insert(*ext, Arc::clone(&entry));
                    }
                    loaded.push(spec.id);
                }
                Err(e) => {
                    tracing::warn!(
                        language = spec.id,
                        error = %e,
                        "Disabling language: query failed to compile"
                    );
                }
            }
        }

        tracing::info!(count = loaded.len(), languages = ?loaded, "Grammars loaded");

        Self {
            by_extension,
            loaded,
        }
    }

    /// Look up the grammar for a file extension (case-insensitive)
    pub fn for_extension(&self, extension: &str) -> Option<Arc<LoadedLanguage>> {
        self.by_extension
            .get(extension.to_lowercase().as_str())
            .cloned()
    }

    /// Identifiers of the languages that loaded successfully
    pub fn loaded_languages(&self) -> &[&'static str] {
        &self.loaded
    }

    /// True when no language loaded at all (fatal for the worker)
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_loads_all_compiled_grammars() {
        let registry = GrammarRegistry::new();
        assert!(!registry.is_empty());
        // Every language in this build has a valid query
        assert_eq!(registry.loaded_languages().len(), language_specs().len());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let registry = GrammarRegistry::new();
        assert!(registry.for_extension("RS").is_some());
        assert!(registry.for_extension("ts").is_some());
        assert!(registry.for_extension("tsx").is_some());
        assert!(registry.for_extension("zig").is_none());
    }
}
