//! Repository scanning: walk a source tree and collect indexable files.

use std::path::Path;
use walkdir::WalkDir;

/// Max file size to index (1 MiB). Bigger files are almost always generated
/// code or embedded data.
const MAX_FILE_BYTES: u64 = 1_048_576;

/// Directories that are never worth indexing.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "target",
    "dist",
    "build",
    "venv",
    "vendor",
    "third_party",
    "artifacts",
];

/// A source file discovered in the repository.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Relative to the repo root, forward-slash normalized
    pub relative_path: String,
    /// Lowercase language identifier
    pub language: String,
    pub content: String,
}

/// Recursively scan `repo_root` and return files with a recognized
/// language, skipping hidden and vendored directories and oversized files.
pub fn scan_repository(repo_root: &Path) -> Vec<ScannedFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(repo_root)
        .into_iter()
        .filter_entry(|e| !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let Some(language) = detect_language(path) else {
            continue;
        };

        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 && meta.len() <= MAX_FILE_BYTES => {}
            _ => continue,
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            tracing::debug!(file = %path.display(), "skipping unreadable file");
            continue;
        };

        let relative = path
            .strip_prefix(repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        files.push(ScannedFile {
            relative_path: relative,
            language: language.to_string(),
            content,
        });
    }

    // Deterministic chunk-id assignment downstream
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    tracing::info!(repo = %repo_root.display(), files_found = files.len(), "repo scan complete");
    files
}

fn is_hidden_or_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.depth() == 0 {
        return false;
    }
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref())
}

/// Map a file extension to a language identifier; None means "do not index".
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let lang = match ext.as_str() {
        "py" | "pyi" => "python",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "lua" => "lua",
        "sql" => "sql",
        "md" => "markdown",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "html" => "html",
        "css" | "scss" => "css",
        _ => return None,
    };
    Some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("main.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("app.py")), Some("python"));
        assert_eq!(detect_language(Path::new("comp.tsx")), Some("typescript"));
        assert_eq!(detect_language(Path::new("run.sh")), Some("shell"));
        assert_eq!(detect_language(Path::new("photo.png")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path: PathBuf = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_collects_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/b.rs", "fn b() {}");
        write(dir.path(), "src/a.py", "def a(): pass");
        write(dir.path(), "notes.png", "binary-ish");

        let files = scan_repository(dir.path());
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.py", "src/b.rs"]);
        assert_eq!(files[0].language, "python");
    }

    #[test]
    fn test_scan_skips_hidden_and_vendored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".git/config.py", "x = 1");
        write(dir.path(), "node_modules/lib/index.js", "module.exports = 1");
        write(dir.path(), "src/ok.rs", "fn ok() {}");

        let files = scan_repository(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "src/ok.rs");
    }

    #[test]
    fn test_scan_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty.rs", "");
        assert!(scan_repository(dir.path()).is_empty());
    }
}
