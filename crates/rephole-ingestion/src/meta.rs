//! Reserved metadata and vector record assembly
//!
//! Every vector record carries a fixed set of system-controlled metadata
//! fields. User-supplied meta is merged first, so reserved names always win.

use chrono::{DateTime, Utc};
use rephole_parsing::Chunk;
use rephole_vector_data::VectorRecord;
use serde_json::{Map, Value};

/// Metadata keys the system controls; user meta can never override these
pub const RESERVED_METADATA_FIELDS: &[&str] = &[
    "id",
    "category",
    "repositoryId",
    "repoId",
    "workspaceId",
    "userId",
    "timestamp",
    "filePath",
    "fileType",
    "chunkIndex",
    "chunkType",
    "parentId",
    "functionName",
    "startLine",
    "endLine",
];

/// Filter user-supplied meta down to safe primitive fields
///
/// Reserved names and non-primitive values (arrays, nested objects, null)
/// are dropped with a warning. Invoked once per job; the survivors are
/// attached to every record the job produces.
pub fn sanitize_user_meta(meta: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut sanitized = Map::new();
    let Some(meta) = meta else {
        return sanitized;
    };

    for (key, value) in meta {
        if RESERVED_METADATA_FIELDS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Dropping user meta field that collides with a reserved name");
            continue;
        }
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                sanitized.insert(key.clone(), value.clone());
            }
            _ => {
                tracing::warn!(key = %key, "Dropping non-primitive user meta field");
            }
        }
    }

    sanitized
}

/// Identity fields shared by every record of one job
#[derive(Debug, Clone)]
pub struct RecordContext {
    /// Client-facing filter key
    pub repo_id: String,
    /// Internal repo state id
    pub repository_id: String,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Assemble the vector records for one file's chunks
///
/// `chunks` and `vectors` must be parallel; `chunk_index` is dense 0..n-1
/// within the file.
pub fn build_records(
    context: &RecordContext,
    file_path: &str,
    chunks: &[Chunk],
    vectors: Vec<Vec<f32>>,
    user_meta: &Map<String, Value>,
) -> Vec<VectorRecord> {
    chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (chunk, vector))| {
            // User meta first; reserved assignments below overwrite on collision
            let mut metadata = user_meta.clone();

            metadata.insert("id".into(), Value::String(chunk.id.clone()));
            metadata.insert("category".into(), Value::String("repository".into()));
            metadata.insert(
                "workspaceId".into(),
                Value::String(context.repo_id.clone()),
            );
            metadata.insert(
                "userId".into(),
                Value::String(context.user_id.clone().unwrap_or_default()),
            );
            metadata.insert(
                "timestamp".into(),
                Value::String(context.timestamp.to_rfc3339()),
            );
            metadata.insert("filePath".into(), Value::String(file_path.into()));
            metadata.insert("fileType".into(), Value::String(file_type(file_path)));
            metadata.insert("chunkIndex".into(), Value::from(index as i64));
            metadata.insert("chunkType".into(), Value::String(chunk.kind.clone()));
            metadata.insert("parentId".into(), Value::String(file_path.into()));
            metadata.insert(
                "repositoryId".into(),
                Value::String(context.repository_id.clone()),
            );
            metadata.insert("repoId".into(), Value::String(context.repo_id.clone()));
            metadata.insert("functionName".into(), Value::String(chunk.name.clone()));
            metadata.insert("startLine".into(), Value::from(chunk.start_line as i64));
            metadata.insert("endLine".into(), Value::from(chunk.end_line as i64));

            VectorRecord {
                id: chunk.id.clone(),
                vector,
                content: chunk.content.clone(),
                metadata,
            }
        })
        .collect()
}

/// Extension including the dot, or empty for extension-less paths
fn file_type(path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .filter(|_| !path.ends_with('.'))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, name: &str, line: usize) -> Chunk {
        Chunk {
            id: id.into(),
            kind: "function_declaration".into(),
            name: name.into(),
            content: format!("function {name}() {{}}"),
            start_line: line,
            end_line: line + 2,
        }
    }

    #[test]
    fn reserved_keys_are_dropped_from_user_meta() {
        let mut meta = Map::new();
        meta.insert("env".into(), Value::String("prod".into()));
        meta.insert("repoId".into(), Value::String("spoofed".into()));
        meta.insert("parentId".into(), Value::String("spoofed".into()));

        let sanitized = sanitize_user_meta(Some(&meta));
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get("env").and_then(Value::as_str), Some("prod"));
    }

    #[test]
    fn non_primitive_values_are_dropped() {
        let mut meta = Map::new();
        meta.insert("tags".into(), serde_json::json!(["a", "b"]));
        meta.insert("nested".into(), serde_json::json!({"x": 1}));
        meta.insert("nothing".into(), Value::Null);
        meta.insert("count".into(), Value::from(3));

        let sanitized = sanitize_user_meta(Some(&meta));
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get("count"), Some(&Value::from(3)));
    }

    #[test]
    fn records_carry_dense_chunk_indexes_and_reserved_fields() {
        let context = RecordContext {
            repo_id: "demo".into(),
            repository_id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
            user_id: Some("u-7".into()),
            timestamp: Utc::now(),
        };
        let chunks = vec![
            chunk("src/a.ts:f:function_declaration:L1", "f", 1),
            chunk("src/a.ts:g:function_declaration:L5", "g", 5),
        ];
        let vectors = vec![vec![0.1; 4], vec![0.2; 4]];

        let mut user_meta = Map::new();
        user_meta.insert("env".into(), Value::String("prod".into()));
        user_meta.insert("repoId".into(), Value::String("spoofed".into()));

        let records = build_records(&context, "src/a.ts", &chunks, vectors, &user_meta);
        assert_eq!(records.len(), 2);

        for (index, record) in records.iter().enumerate() {
            let meta = &record.metadata;
            assert_eq!(meta.get("chunkIndex"), Some(&Value::from(index as i64)));
            assert_eq!(meta.get("repoId").and_then(Value::as_str), Some("demo"));
            assert_eq!(meta.get("parentId").and_then(Value::as_str), Some("src/a.ts"));
            assert_eq!(meta.get("fileType").and_then(Value::as_str), Some(".ts"));
            assert_eq!(meta.get("category").and_then(Value::as_str), Some("repository"));
            assert_eq!(meta.get("env").and_then(Value::as_str), Some("prod"));
            assert_eq!(
                meta.get("repositoryId").and_then(Value::as_str),
                Some("01ARZ3NDEKTSV4RRFFQ69G5FAV")
            );
        }

        assert_eq!(
            records[1].metadata.get("functionName").and_then(Value::as_str),
            Some("g")
        );
    }

    #[test]
    fn file_type_includes_the_dot() {
        assert_eq!(file_type("src/auth.service.ts"), ".ts");
        assert_eq!(file_type("Makefile"), "");
    }
}
