use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::libxml2::SchemaViolation;

/// Main error type for loading and validating mapping documents
///
/// The type is `Clone` so that a failed metadata load can be handed to every
/// task waiting on the same cache entry.
#[derive(Error, Debug, Clone)]
pub enum MappingError {
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("No mapping file found named '{file_name}' for class '{class_name}'.")]
    MappingNotFound {
        class_name: String,
        file_name: String,
    },

    #[error("Class '{class_name}' is not a valid entity or mapped superclass.")]
    NotMappedClass { class_name: String },

    #[error("Malformed mapping document: {file} - {details}")]
    InvalidXml { file: PathBuf, details: String },

    #[error(
        "Invalid value '{value}' for attribute '{attribute}' on <{element}> (line {line}): expected {expected}"
    )]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
        expected: String,
        line: usize,
    },

    #[error("Missing required attribute '{attribute}' on <{element}> (line {line})")]
    MissingAttribute {
        element: String,
        attribute: String,
        line: usize,
    },

    #[error("Property '{field}' is mapped more than once in class '{class_name}'.")]
    DuplicateProperty { class_name: String, field: String },

    #[error(
        "Entity '{class_name}' has a duplicate discriminator map entry: the class '{target}' is mapped to values {values:?}"
    )]
    DuplicateDiscriminatorEntry {
        class_name: String,
        target: String,
        values: Vec<String>,
    },

    #[error("Entity '{class_name}' declares the discriminator value '{value}' more than once.")]
    DuplicateDiscriminatorValue { class_name: String, value: String },

    #[error(
        "Entity association field '{class_name}#{field}' not configured as part of the second-level cache."
    )]
    NonCacheableAssociation { class_name: String, field: String },

    #[error(
        "Only to-one associations can be used as identifier, '{class_name}#{field}' is a to-many association."
    )]
    IllegalIdentifierAssociation { class_name: String, field: String },

    #[error(
        "It is illegal to put an inverse side to-many association on mapped superclass '{class_name}#{field}'."
    )]
    IllegalAssociationOnMappedSuperclass { class_name: String, field: String },

    #[error("Identifier '{field}' of class '{class_name}' does not name a mapped field or association.")]
    UnknownIdentifierField { class_name: String, field: String },

    #[error("No identifier/primary key specified for entity '{class_name}'.")]
    IdentifierRequired { class_name: String },

    #[error("Entity '{class_name}' uses inheritance but declares no discriminator map.")]
    MissingDiscriminatorMap { class_name: String },

    #[error("Mapping document {file} violates the mapping schema ({} violations)", .violations.len())]
    SchemaViolation {
        file: PathBuf,
        violations: Vec<SchemaViolation>,
    },

    #[error("Schema parsing error: {source_name} - {details}")]
    SchemaParsing { source_name: String, details: String },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

impl From<std::io::Error> for MappingError {
    fn from(err: std::io::Error) -> Self {
        MappingError::Io(Arc::new(err))
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("File validation failed with code {code}: {file}")]
    ValidationFailed { code: i32, file: PathBuf },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Invalid XML structure: {details}")]
    InvalidXml { details: String },
}

impl From<LibXml2Error> for MappingError {
    fn from(err: LibXml2Error) -> Self {
        MappingError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MappingError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_not_found_display() {
        let error = MappingError::MappingNotFound {
            class_name: "Models.Generic.Serialization".to_string(),
            file_name: "Models.Generic.Serialization.orm.xml".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "No mapping file found named 'Models.Generic.Serialization.orm.xml' for class 'Models.Generic.Serialization'."
        );
    }

    #[test]
    fn test_non_cacheable_association_display() {
        let error = MappingError::NonCacheableAssociation {
            class_name: "Models.Cache.BrokenCity".to_string(),
            field: "state".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Entity association field 'Models.Cache.BrokenCity#state' not configured as part of the second-level cache."
        );
    }

    #[test]
    fn test_schema_violation_counts_violations() {
        let error = MappingError::SchemaViolation {
            file: PathBuf::from("Models.Invalid.Foo.orm.xml"),
            violations: vec![
                SchemaViolation::new(3, "first"),
                SchemaViolation::new(7, "second"),
            ],
        };

        let display = error.to_string();
        assert!(display.contains("Models.Invalid.Foo.orm.xml"));
        assert!(display.contains("2 violations"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Access denied");
        let mapping_error: MappingError = io_error.into();

        match mapping_error {
            MappingError::Io(_) => (),
            _ => panic!("Expected MappingError::Io"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let mapping_error: MappingError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "File not found").into();

        let source = mapping_error.source().expect("io source");
        assert_eq!(source.to_string(), "File not found");
    }

    #[test]
    fn test_cloned_error_keeps_message() {
        let error = MappingError::NotMappedClass {
            class_name: "Models.Cti.Nope".to_string(),
        };
        let cloned = error.clone();

        assert_eq!(error.to_string(), cloned.to_string());
    }

    #[test]
    fn test_libxml2_error_conversion() {
        let mapping_error: MappingError = LibXml2Error::SchemaParseFailed.into();

        match mapping_error {
            MappingError::LibXml2Internal { details } => {
                assert!(details.contains("Schema parsing failed"))
            }
            _ => panic!("Expected LibXml2Internal error"),
        }
    }
}
