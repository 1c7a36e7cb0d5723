//! # xml-mapping Library
//!
//! Loads XML object-relational mapping documents into class metadata and
//! validates them against the mapping XSD through libxml2.
//!
//! A [`MappingLocator`] finds the document for a class, the [`XmlDriver`]
//! turns its element into [`ClassMetadata`], and the
//! [`ClassMetadataFactory`] caches the result and checks mappings against
//! each other. The [`ValidationEngine`] validates whole directories of
//! documents concurrently.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod error_reporter;
pub mod expectations;
pub mod factory;
pub mod file_discovery;
pub mod libxml2;
pub mod locator;
pub mod metadata;
pub mod output;
pub mod schema;
pub mod validator;
pub mod xml;

pub use cli::{Cli, Command, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use driver::XmlDriver;
pub use error::{MappingError, Result};
pub use expectations::{ExpectationMismatch, ExpectationSet};
pub use factory::{ClassMetadataFactory, FactoryStats, MappingIssue};
pub use file_discovery::{DiscoveryStats, FileDiscovery};
pub use libxml2::{LibXml2Wrapper, SchemaViolation, ValidationResult, XmlSchemaPtr};
pub use locator::{FileLocator, MappingLocator};
pub use metadata::{
    AssociationKind, AssociationMapping, CacheMapping, CacheUsage, ClassKind, ClassMetadata,
    ColumnPrefix, EmbeddedClass, FieldMapping, InheritanceType, JoinColumn, JoinTable,
    LifecycleEvent,
};
pub use output::Output;
pub use schema::{MappingSchema, SchemaReport};
pub use validator::{
    FileValidationResult, PerformanceMetrics, ProgressCallback, ValidationConfig, ValidationEngine,
    ValidationPhase, ValidationProgress, ValidationResults, ValidationStatus,
};
