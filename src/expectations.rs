//! Expected schema violations for a set of mapping documents
//!
//! ```toml
//! [[file]]
//! name = "Models.Invalid.UnknownAttribute.orm.xml"
//! violations = ["attribute 'invalid': The attribute 'invalid' is not allowed"]
//! ```
//!
//! Each pattern is a regular expression matched against the violation at the
//! same position. Files not listed are expected to be valid.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::error::{MappingError, Result};
use crate::libxml2::SchemaViolation;

/// Why a file's violations did not meet expectations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpectationMismatch {
    #[error("expected {expected} violation(s), found {actual}")]
    Count { expected: usize, actual: usize },

    #[error("violation #{index} '{message}' does not match /{pattern}/")]
    Pattern {
        index: usize,
        pattern: String,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct ExpectationFile {
    #[serde(default)]
    file: Vec<FileExpectation>,
}

#[derive(Debug, Deserialize)]
struct FileExpectation {
    name: String,
    #[serde(default)]
    violations: Vec<String>,
}

/// Ordered violation patterns per mapping file name
#[derive(Debug, Clone, Default)]
pub struct ExpectationSet {
    files: BTreeMap<String, Vec<Regex>>,
}

impl ExpectationSet {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            MappingError::Config(msg) => {
                MappingError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let parsed: ExpectationFile = toml::from_str(content)
            .map_err(|e| MappingError::Config(format!("Invalid expectation file: {}", e)))?;

        let mut files = BTreeMap::new();
        for entry in parsed.file {
            if files.contains_key(&entry.name) {
                return Err(MappingError::Config(format!(
                    "Duplicate expectations for '{}'",
                    entry.name
                )));
            }
            let patterns = entry
                .violations
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|e| {
                        MappingError::Config(format!(
                            "Invalid pattern for '{}': {}",
                            entry.name, e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            files.insert(entry.name, patterns);
        }

        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File names with expectations, sorted
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Whether `file_name` is expected to violate the schema
    pub fn expects_violations(&self, file_name: &str) -> bool {
        self.files.get(file_name).is_some_and(|p| !p.is_empty())
    }

    /// Compare the violations reported for `file_name` with its patterns
    pub fn check(
        &self,
        file_name: &str,
        violations: &[SchemaViolation],
    ) -> std::result::Result<(), ExpectationMismatch> {
        let patterns = self.files.get(file_name).map(Vec::as_slice).unwrap_or(&[]);

        if patterns.len() != violations.len() {
            return Err(ExpectationMismatch::Count {
                expected: patterns.len(),
                actual: violations.len(),
            });
        }

        for (index, (pattern, violation)) in patterns.iter().zip(violations).enumerate() {
            if !pattern.is_match(&violation.message) {
                return Err(ExpectationMismatch::Pattern {
                    index,
                    pattern: pattern.as_str().to_string(),
                    message: violation.message.clone(),
                });
            }
        }

        Ok(())
    }
}
