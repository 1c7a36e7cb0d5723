//! The mapping XSD
//!
//! The schema shipped with the crate is compiled from memory; a replacement
//! can be loaded from disk for projects that extend the mapping format.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MappingError, Result};
use crate::libxml2::{LibXml2Wrapper, SchemaViolation, ValidationResult, XmlSchemaPtr};

/// Target namespace of mapping documents
pub const MAPPING_NAMESPACE: &str = "urn:xml-mapping:orm";

const BUNDLED_XSD: &[u8] = include_bytes!("../schema/orm-mapping.xsd");

/// Outcome of validating one mapping document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub file: PathBuf,
    pub valid: bool,
    /// Violations in the order they were reported
    pub violations: Vec<SchemaViolation>,
}

impl SchemaReport {
    fn from_result(file: PathBuf, result: ValidationResult) -> Self {
        Self {
            file,
            valid: result.is_valid(),
            violations: result.violations().to_vec(),
        }
    }

    /// Convert an invalid report into [`MappingError::SchemaViolation`]
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(MappingError::SchemaViolation {
                file: self.file,
                violations: self.violations,
            })
        }
    }
}

/// A compiled mapping schema, cheap to clone and share between threads
#[derive(Clone)]
pub struct MappingSchema {
    schema: XmlSchemaPtr,
    source: String,
}

impl std::fmt::Debug for MappingSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingSchema")
            .field("source", &self.source)
            .finish()
    }
}

impl MappingSchema {
    /// Compile the schema bundled with the crate
    pub fn bundled() -> Result<Self> {
        Self::from_bytes(BUNDLED_XSD, "bundled orm-mapping.xsd")
    }

    /// Compile a schema read from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data, &path.display().to_string())
    }

    /// Bundled schema, or the one at `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    fn from_bytes(data: &[u8], source: &str) -> Result<Self> {
        let schema = LibXml2Wrapper::new()
            .parse_schema_from_memory(data)
            .map_err(|e| MappingError::SchemaParsing {
                source_name: source.to_string(),
                details: e.to_string(),
            })?;

        debug!(source, "compiled mapping schema");
        Ok(Self {
            schema,
            source: source.to_string(),
        })
    }

    /// Where the schema was loaded from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Validate a mapping document on disk
    pub fn validate_file(&self, path: &Path) -> Result<SchemaReport> {
        let result = LibXml2Wrapper::new().validate_file(&self.schema, path)?;
        Ok(SchemaReport::from_result(path.to_path_buf(), result))
    }

    /// Validate an in-memory mapping document; `name` is used in reports
    pub fn validate_bytes(&self, content: &[u8], name: &str) -> Result<SchemaReport> {
        let result = LibXml2Wrapper::new()
            .validate_memory(&self.schema, content, Some(name.to_string()))
            .map_err(|e| match e {
                crate::error::LibXml2Error::InvalidXml { details } => MappingError::InvalidXml {
                    file: PathBuf::from(name),
                    details,
                },
                other => other.into(),
            })?;
        Ok(SchemaReport::from_result(PathBuf::from(name), result))
    }
}
