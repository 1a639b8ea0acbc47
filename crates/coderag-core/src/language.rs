//! Extension-based language detection and the default file filters that
//! loaders apply before handing documents to the pipeline.

pub const UNKNOWN_LANGUAGE: &str = "unknown";

pub const INCLUDE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "java", "go", "rs", "cpp", "c", "h", "hpp", "html", "css",
    "scss", "json", "yaml", "yml", "toml", "md", "txt", "sql", "sh", "bat", "ps1", "dart",
    "swift", "kt", "rb", "php",
];

pub const EXCLUDE_DIRS: &[&str] = &[
    ".git", "__pycache__", "node_modules", "venv", ".venv", "env", ".env", "dist", "build",
    ".next", ".nuxt", "target", "bin", "obj", ".idea", ".vscode", "chroma_db", ".chroma",
    "egg-info",
];

/// Files larger than this are skipped by loaders.
pub const MAX_DOCUMENT_BYTES: usize = 500_000;

fn extension(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Language label for a forward-slash path, derived from its extension.
pub fn language_for_path(path: &str) -> &'static str {
    let Some(ext) = extension(path) else { return UNKNOWN_LANGUAGE };
    match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "tsx" => "tsx",
        "jsx" => "jsx",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" | "hpp" => "cpp",
        "c" | "h" => "c",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "sql" => "sql",
        "sh" => "bash",
        "bat" => "batch",
        "ps1" => "powershell",
        "dart" => "dart",
        "swift" => "swift",
        "kt" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "txt" => "text",
        _ => UNKNOWN_LANGUAGE,
    }
}

/// Whether a repo-relative path passes the default include/exclude filters.
pub fn is_indexable_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let Some(ext) = extension(&normalized) else { return false };
    if !INCLUDE_EXTENSIONS.contains(&ext.as_str()) {
        return false;
    }
    !normalized
        .split('/')
        .any(|part| EXCLUDE_DIRS.contains(&part) || part.ends_with(".egg-info"))
}
