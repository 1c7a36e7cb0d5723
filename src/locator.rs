//! Mapping file lookup
//!
//! Each mapped class has its own document: the file for `A.B.C` is named
//! `A.B.C` followed by the mapping extension.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{MappingError, Result};
use crate::file_discovery::{DEFAULT_MAPPING_SUFFIX, FileDiscovery};

/// Finds the mapping document of a class
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MappingLocator: Send + Sync {
    /// Path of the document mapping `class_name`
    ///
    /// Fails with [`MappingError::MappingNotFound`] when no directory holds it.
    async fn find_mapping_file(&self, class_name: &str) -> Result<PathBuf>;

    /// Every class name that has a mapping document, sorted
    async fn all_class_names(&self) -> Result<Vec<String>>;

    async fn file_exists(&self, class_name: &str) -> bool;

    fn file_extension(&self) -> String;
}

/// Looks up mapping documents in an ordered list of directories
#[derive(Debug, Clone)]
pub struct FileLocator {
    paths: Vec<PathBuf>,
    extension: String,
}

impl FileLocator {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            extension: DEFAULT_MAPPING_SUFFIX.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn file_name(&self, class_name: &str) -> String {
        format!("{}{}", class_name, self.extension)
    }

    async fn locate(&self, class_name: &str) -> Option<PathBuf> {
        let file_name = self.file_name(class_name);
        for dir in &self.paths {
            let candidate = dir.join(&file_name);
            if fs::metadata(&candidate)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl MappingLocator for FileLocator {
    async fn find_mapping_file(&self, class_name: &str) -> Result<PathBuf> {
        match self.locate(class_name).await {
            Some(path) => {
                debug!(class = class_name, path = %path.display(), "located mapping file");
                Ok(path)
            }
            None => Err(MappingError::MappingNotFound {
                class_name: class_name.to_string(),
                file_name: self.file_name(class_name),
            }),
        }
    }

    async fn all_class_names(&self) -> Result<Vec<String>> {
        // Mapping directories are flat: one document per class, no nesting
        let discovery = FileDiscovery::new()
            .with_suffixes(vec![self.extension.clone()])
            .with_max_depth(Some(0));

        let mut names = BTreeSet::new();
        for dir in &self.paths {
            for file in discovery.discover_files(dir).await? {
                if let Some(class_name) = discovery.class_name_for(&file) {
                    names.insert(class_name);
                }
            }
        }

        Ok(names.into_iter().collect())
    }

    async fn file_exists(&self, class_name: &str) -> bool {
        self.locate(class_name).await.is_some()
    }

    fn file_extension(&self) -> String {
        self.extension.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAPPING: &str = "<mapping xmlns=\"urn:xml-mapping:orm\"/>";

    async fn two_dirs() -> (TempDir, TempDir) {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        fs::write(first.path().join("Models.Cms.Article.orm.xml"), MAPPING)
            .await
            .unwrap();
        fs::write(second.path().join("Models.Cms.Article.orm.xml"), MAPPING)
            .await
            .unwrap();
        fs::write(second.path().join("Models.Cms.Comment.orm.xml"), MAPPING)
            .await
            .unwrap();
        fs::write(second.path().join("Models.Cms.Draft.xml"), MAPPING)
            .await
            .unwrap();

        (first, second)
    }

    #[tokio::test]
    async fn test_first_directory_wins() {
        let (first, second) = two_dirs().await;
        let locator = FileLocator::new(vec![first.path().into(), second.path().into()]);

        let path = locator.find_mapping_file("Models.Cms.Article").await.unwrap();
        assert_eq!(path, first.path().join("Models.Cms.Article.orm.xml"));

        let path = locator.find_mapping_file("Models.Cms.Comment").await.unwrap();
        assert_eq!(path, second.path().join("Models.Cms.Comment.orm.xml"));
    }

    #[tokio::test]
    async fn test_missing_mapping_names_expected_file() {
        let (first, _second) = two_dirs().await;
        let locator = FileLocator::new(vec![first.path().into()]);

        match locator
            .find_mapping_file("Models.Generic.Serialization")
            .await
            .unwrap_err()
        {
            MappingError::MappingNotFound {
                class_name,
                file_name,
            } => {
                assert_eq!(class_name, "Models.Generic.Serialization");
                assert_eq!(file_name, "Models.Generic.Serialization.orm.xml");
            }
            other => panic!("Expected MappingNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_class_names_sorted_and_deduplicated() {
        let (first, second) = two_dirs().await;
        let locator = FileLocator::new(vec![first.path().into(), second.path().into()]);

        let names = locator.all_class_names().await.unwrap();
        assert_eq!(names, vec!["Models.Cms.Article", "Models.Cms.Comment"]);
    }

    #[tokio::test]
    async fn test_custom_extension() {
        let (_first, second) = two_dirs().await;
        let locator = FileLocator::new(vec![second.path().into()]).with_extension(".xml");

        assert_eq!(locator.file_extension(), ".xml");
        assert!(locator.file_exists("Models.Cms.Draft").await);
        assert!(!locator.file_exists("Models.Cms.Comment").await);
    }
}
