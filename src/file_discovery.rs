use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MappingError, Result};

/// Default suffix of a mapping document
pub const DEFAULT_MAPPING_SUFFIX: &str = ".orm.xml";

/// Async discovery of mapping documents below a directory
///
/// A file qualifies when its name ends with one of the configured suffixes,
/// no exclude pattern matches it and, when include patterns are set, at
/// least one of them does.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    suffixes: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
    /// Maximum directory depth below the root (None = unlimited)
    max_depth: Option<usize>,
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            suffixes: vec![DEFAULT_MAPPING_SUFFIX.to_string()],
            include_set: None,
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Set file name suffixes to discover (e.g. `.orm.xml`, `.xml`)
    pub fn with_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.include_set = build_glob_set(&patterns, "include")?;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        self.exclude_set = build_glob_set(&patterns, "exclude")?;
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover mapping documents in `path` (a file or a directory)
    ///
    /// The result is sorted. Entries that cannot be read are logged and skipped.
    pub async fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        Ok(self.discover(path).await?.0)
    }

    /// Discover files and report how many entries had to be skipped
    pub async fn get_discovery_stats(&self, root: &Path) -> Result<DiscoveryStats> {
        let (files, errors) = self.discover(root).await?;
        Ok(DiscoveryStats {
            files_found: files.len(),
            errors,
        })
    }

    async fn discover(&self, path: &Path) -> Result<(Vec<PathBuf>, usize)> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| MappingError::FileSystemTraversal {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if metadata.is_file() {
            let files = if self.should_process(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            };
            return Ok((files, 0));
        }

        let mut files = Vec::new();
        let mut errors = 0;
        self.visit_dir(path, 0, &mut files, &mut errors).await?;
        files.sort();

        debug!(root = %path.display(), found = files.len(), skipped = errors, "discovered mapping files");
        Ok((files, errors))
    }

    fn visit_dir<'a>(
        &'a self,
        dir: &'a Path,
        depth: usize,
        files: &'a mut Vec<PathBuf>,
        errors: &'a mut usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut read_dir = fs::read_dir(dir).await?;

            while let Some(entry) = read_dir.next_entry().await? {
                let entry_path = entry.path();

                if entry_path.is_symlink() && !self.follow_symlinks {
                    continue;
                }

                let metadata = match fs::metadata(&entry_path).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!(path = %entry_path.display(), error = %e, "skipping unreadable entry");
                        *errors += 1;
                        continue;
                    }
                };

                if metadata.is_file() {
                    if self.should_process(&entry_path) {
                        files.push(entry_path);
                    }
                } else if metadata.is_dir() {
                    if self.max_depth.is_some_and(|max| depth >= max) {
                        continue;
                    }
                    if let Err(e) = self.visit_dir(&entry_path, depth + 1, files, errors).await {
                        warn!(path = %entry_path.display(), error = %e, "skipping unreadable directory");
                        *errors += 1;
                    }
                }
            }

            Ok(())
        })
    }

    /// Check whether a path qualifies as a mapping document
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };

        let lower = file_name.to_lowercase();
        if !self
            .suffixes
            .iter()
            .any(|suffix| lower.len() > suffix.len() && lower.ends_with(&suffix.to_lowercase()))
        {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        if let Some(include_set) = &self.include_set {
            return include_set.is_match(path);
        }

        true
    }

    /// Class name encoded in a mapping file name, if it carries a known suffix
    pub fn class_name_for(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        self.suffixes.iter().find_map(|suffix| {
            file_name
                .strip_suffix(suffix.as_str())
                .filter(|class| !class.is_empty())
                .map(str::to_string)
        })
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn build_glob_set(patterns: &[String], kind: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| MappingError::Config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|e| MappingError::Config(format!("Failed to build {} glob set: {}", kind, e)))
}

/// Statistics about a discovery run
#[derive(Debug, Default, Clone)]
pub struct DiscoveryStats {
    pub files_found: usize,
    pub errors: usize,
}
