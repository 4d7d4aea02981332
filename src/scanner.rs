use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Directory names that never contain project sources.
const SKIPPED_DIRS: &[&str] = &["__pycache__", "venv", "env", "node_modules", "site-packages"];

/// File scanner for traversing Python project directories.
///
/// The `FileScanner` recursively walks through a project directory to find all Python source
/// files. It automatically skips hidden directories (those starting with `.`, which covers
/// `.venv` and `.git`), bytecode caches and virtual environments.
///
/// # Example
///
/// ```no_run
/// use fastapi_derive_responses::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-project"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} Python files", result.python_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
}

/// Result of directory scanning operation.
///
/// Contains the list of discovered Python files and any warnings encountered during scanning.
pub struct ScanResult {
    /// List of paths to all discovered `.py` files, sorted for deterministic module order
    pub python_files: Vec<PathBuf>,
    /// Warning messages for any issues encountered (e.g., inaccessible directories)
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// Creates a new `FileScanner` for the specified root directory.
    ///
    /// # Arguments
    ///
    /// * `root_path` - The root directory to scan for Python files
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Returns the directory this scanner walks.
    pub fn root(&self) -> &PathBuf {
        &self.root_path
    }

    /// Scans the directory tree and collects all `.py` files.
    ///
    /// If any directories or files cannot be accessed, warnings are logged and added to
    /// the result, but scanning continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be accessed.
    pub fn scan(&self) -> Result<ScanResult> {
        std::fs::metadata(&self.root_path)
            .with_context(|| format!("Failed to access project root: {}", self.root_path.display()))?;

        let mut python_files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the root directory itself
                if e.path() == self.root_path {
                    return true;
                }

                let file_name = e.file_name().to_string_lossy();
                let is_hidden = file_name.starts_with('.');
                let is_skipped = e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|d| file_name == *d);

                !is_hidden && !is_skipped
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();

                    if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("py") {
                        python_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            python_files,
            warnings,
        })
    }
}
