//! Binary-file extension blocklist
//!
//! Files with these extensions are skipped outright: no blob, no chunks,
//! no vectors.

/// Extensions (lowercase, with dot) that never contain indexable text
const BINARY_EXTENSIONS: &[&str] = &[
    // Images
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".svg", ".webp", ".tiff",
    // Video
    ".mp4", ".avi", ".mov", ".wmv", ".flv", ".mkv",
    // Audio
    ".mp3", ".wav", ".ogg", ".flac", ".aac",
    // Archives
    ".zip", ".tar", ".gz", ".rar", ".7z", ".bz2",
    // Compiled artifacts
    ".exe", ".dll", ".so", ".dylib", ".bin", ".class", ".pyc", ".o", ".a",
    // Documents
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    // Fonts
    ".ttf", ".otf", ".woff", ".woff2", ".eot",
    // Databases
    ".db", ".sqlite", ".sqlite3",
    // Misc
    ".wasm", ".lock",
];

/// True when the path carries a blocklisted extension (case-insensitive)
pub fn is_binary_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}
