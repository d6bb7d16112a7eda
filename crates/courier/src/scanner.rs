//! Watched-directory scanner
//!
//! Lists the top level of the watched directory, keeps regular files (symlinks
//! are followed), drops the tracking file itself and everything already
//! recorded, and returns the rest sorted by filename. The sort is byte-wise
//! ascending so the processing sequence is reproducible across runs.

use crate::error::{CourierError, Result};
use crate::store::ProcessedStore;
use courier_protocol::ProcessedRecord;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// A file discovered by a scan. Lives only for one scan iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub filename: String,
}

/// Configuration for scanning operations
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether dotfiles are candidates
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_hidden: true,
        }
    }
}

/// Directory scanner
#[derive(Debug, Clone, Default)]
pub struct DirectoryScanner {
    config: ScanConfig,
}

impl DirectoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Files in `directory` that have no record in `store`, in processing order.
    ///
    /// Never fails: an enumeration error is logged and yields an empty list.
    /// A store that cannot be read is logged and treated as empty, which may
    /// reprocess files but never stalls the pipeline.
    pub fn scan(&self, directory: &Path, store: &ProcessedStore) -> Vec<CandidateFile> {
        let processed = store.load().unwrap_or_else(|e| {
            error!(
                path = %store.path().display(),
                error = %e,
                "Error loading processed files, continuing with an empty set"
            );
            HashSet::new()
        });

        let files = match self.list_regular_files(directory, store.file_name().as_deref()) {
            Ok(files) => files,
            Err(e) => {
                error!(
                    directory = %directory.display(),
                    error = %e,
                    "Error detecting new files in {}",
                    directory.display()
                );
                return Vec::new();
            }
        };

        if files.is_empty() {
            info!("No new files found in directory: {}", directory.display());
            return Vec::new();
        }

        let mut new_files: Vec<CandidateFile> = files
            .into_iter()
            .filter(|file| !processed.contains(&file.filename))
            .collect();

        // String ordering is byte-wise.
        new_files.sort_by(|a, b| a.filename.cmp(&b.filename));

        if new_files.is_empty() {
            info!("No new files found for processing");
        } else {
            info!(count = new_files.len(), "Found {} new files to process", new_files.len());
        }
        new_files
    }

    fn list_regular_files(
        &self,
        directory: &Path,
        store_name: Option<&str>,
    ) -> Result<Vec<CandidateFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
        {
            let entry = entry.map_err(|source| CourierError::Scan {
                path: directory.to_path_buf(),
                source,
            })?;

            if !is_regular_file(&entry) {
                continue;
            }

            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                warn!(
                    file = %entry.file_name().to_string_lossy(),
                    "Skipping file whose name is not valid UTF-8"
                );
                continue;
            };
            if store_name == Some(filename.as_str()) {
                continue;
            }
            if !self.config.include_hidden && filename.starts_with('.') {
                debug!(file = %filename, "Skipping hidden file");
                continue;
            }
            if !ProcessedRecord::is_representable(&filename) {
                warn!(
                    file = %filename,
                    "Skipping file whose name cannot be recorded in the tracking file"
                );
                continue;
            }

            files.push(CandidateFile {
                path: entry.into_path(),
                filename,
            });
        }

        Ok(files)
    }
}

fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    if entry.file_type().is_symlink() {
        // Dangling links are not files.
        fs::metadata(entry.path())
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    } else {
        entry.file_type().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use courier_protocol::ProcessedStatus;
    use tempfile::TempDir;

    struct TestEnv {
        _temp: TempDir,
        dir: PathBuf,
        store: ProcessedStore,
    }

    impl TestEnv {
        /// Tracking file lives inside the watched directory.
        fn new() -> Self {
            let temp = TempDir::new().expect("Failed to create temp dir");
            let dir = temp.path().join("inbox");
            fs::create_dir_all(&dir).unwrap();
            let store = ProcessedStore::new(dir.join("processed_files.txt"));
            Self {
                _temp: temp,
                dir,
                store,
            }
        }

        fn write(&self, name: &str, content: &str) {
            fs::write(self.dir.join(name), content).unwrap();
        }

        fn names(&self, scanner: &DirectoryScanner) -> Vec<String> {
            scanner
                .scan(&self.dir, &self.store)
                .into_iter()
                .map(|f| f.filename)
                .collect()
        }
    }

    fn now() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 25)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_scan_sorts_by_filename() {
        let env = TestEnv::new();
        env.write("zebra.txt", "z");
        env.write("apple.txt", "a");
        env.write("banana.txt", "b");

        assert_eq!(
            env.names(&DirectoryScanner::new()),
            vec!["apple.txt", "banana.txt", "zebra.txt"]
        );
    }

    #[test]
    fn test_sort_is_bytewise() {
        let env = TestEnv::new();
        env.write("b.txt", "");
        env.write("B.txt", "");
        env.write("_a.txt", "");
        env.write("10.txt", "");
        env.write("9.txt", "");

        assert_eq!(
            env.names(&DirectoryScanner::new()),
            vec!["10.txt", "9.txt", "B.txt", "_a.txt", "b.txt"]
        );
    }

    #[test]
    fn test_scan_excludes_recorded_files_and_store() {
        let env = TestEnv::new();
        env.write("a.txt", "hello");
        env.write("b.txt", "world");
        env.write("c.txt", "!");
        env.store.append("a.txt", ProcessedStatus::Success, now()).unwrap();
        env.store.append("c.txt", ProcessedStatus::Error, now()).unwrap();

        let files = DirectoryScanner::new().scan(&env.dir, &env.store);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "b.txt");
        assert_eq!(files[0].path, env.dir.join("b.txt"));
    }

    #[test]
    fn test_scan_ignores_subdirectories() {
        let env = TestEnv::new();
        fs::create_dir_all(env.dir.join("archive")).unwrap();
        fs::write(env.dir.join("archive").join("old.txt"), "x").unwrap();
        env.write("new.txt", "y");

        assert_eq!(env.names(&DirectoryScanner::new()), vec!["new.txt"]);
    }

    #[test]
    fn test_missing_directory_yields_empty() {
        let env = TestEnv::new();
        let files = DirectoryScanner::new().scan(&env.dir.join("missing"), &env.store);
        assert!(files.is_empty());
    }

    #[test]
    fn test_unreadable_store_does_not_block_scan() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("inbox");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        let store_path = temp.path().join("state");
        fs::create_dir_all(&store_path).unwrap();
        let store = ProcessedStore::new(&store_path);

        let files = DirectoryScanner::new().scan(&dir, &store);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_hidden_files_optional() {
        let env = TestEnv::new();
        env.write(".partial", "x");
        env.write("a.txt", "a");

        assert_eq!(env.names(&DirectoryScanner::new()), vec![".partial", "a.txt"]);

        let scanner = DirectoryScanner::with_config(ScanConfig {
            include_hidden: false,
        });
        assert_eq!(env.names(&scanner), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_followed_and_dangling_skipped() {
        let env = TestEnv::new();
        let outside = env._temp.path().join("outside.txt");
        fs::write(&outside, "x").unwrap();
        std::os::unix::fs::symlink(&outside, env.dir.join("linked.txt")).unwrap();
        std::os::unix::fs::symlink(env.dir.join("nowhere"), env.dir.join("dangling.txt")).unwrap();

        assert_eq!(env.names(&DirectoryScanner::new()), vec!["linked.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unrecordable_names_skipped() {
        let env = TestEnv::new();
        env.write("a|b.txt", "x");
        env.write("ok.txt", "y");

        assert_eq!(env.names(&DirectoryScanner::new()), vec!["ok.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let env = TestEnv::new();
        let first = env.dir.join(OsStr::from_bytes(b"a\xff.hl7"));
        let second = env.dir.join(OsStr::from_bytes(b"a\xfe.hl7"));
        // Some filesystems refuse names that are not UTF-8.
        if fs::write(&first, "x").is_err() || fs::write(&second, "y").is_err() {
            return;
        }
        env.write("ok.hl7", "z");

        // Lossy conversion would map both names to "a\u{fffd}.hl7" and the
        // second would look recorded once the first was.
        assert_eq!(env.names(&DirectoryScanner::new()), vec!["ok.hl7"]);
    }
}
