#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use xml_mapping::factory::{ClassMetadataFactory, DEFAULT_MAX_METADATA_ENTRIES};
use xml_mapping::{FileLocator, MappingSchema, XmlDriver};

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Consistent mappings covering every kind of class
pub fn mapping_dir() -> PathBuf {
    fixtures_dir().join("mapping")
}

/// Schema-valid documents that fail to load or to check
pub fn mapping_errors_dir() -> PathBuf {
    fixtures_dir().join("mapping-errors")
}

/// Documents violating the XSD, with `expectations.toml`
pub fn schema_invalid_dir() -> PathBuf {
    fixtures_dir().join("schema-invalid")
}

pub fn driver(dirs: &[PathBuf]) -> XmlDriver {
    let locator = FileLocator::new(dirs.to_vec());
    XmlDriver::new(Arc::new(locator))
        .with_schema_validation(MappingSchema::bundled().expect("bundled schema compiles"))
}

pub fn factory(dirs: &[PathBuf]) -> ClassMetadataFactory {
    ClassMetadataFactory::new(driver(dirs), DEFAULT_MAX_METADATA_ENTRIES)
}
