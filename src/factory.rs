use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::XmlDriver;
use crate::error::{MappingError, Result};
use crate::metadata::{AssociationMapping, ClassMetadata};

/// Default number of class metadata records kept in memory
pub const DEFAULT_MAX_METADATA_ENTRIES: u64 = 1000;

/// A problem found while checking mappings against each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingIssue {
    pub class_name: String,
    pub message: String,
}

impl MappingIssue {
    fn new(class_name: &str, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for MappingIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.class_name, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FactoryStats {
    pub cached_classes: u64,
    /// Number of times the driver was asked to load a class
    pub driver_loads: u64,
}

/// Loads and caches class metadata
///
/// Concurrent requests for the same class wait for a single load.
pub struct ClassMetadataFactory {
    driver: XmlDriver,
    cache: Cache<String, Arc<ClassMetadata>>,
    driver_loads: AtomicU64,
}

impl ClassMetadataFactory {
    pub fn new(driver: XmlDriver, max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();

        Self {
            driver,
            cache,
            driver_loads: AtomicU64::new(0),
        }
    }

    pub fn driver(&self) -> &XmlDriver {
        &self.driver
    }

    /// Metadata for `class_name`, loading it on first request
    pub async fn metadata_for(&self, class_name: &str) -> Result<Arc<ClassMetadata>> {
        self.cache
            .try_get_with(class_name.to_string(), self.load(class_name))
            .await
            .map_err(|e| (*e).clone())
    }

    async fn load(&self, class_name: &str) -> Result<Arc<ClassMetadata>> {
        self.driver_loads.fetch_add(1, Ordering::Relaxed);
        debug!(class = class_name, "metadata cache miss");

        let mut metadata = ClassMetadata::new(class_name);
        self.driver
            .load_metadata_for_class(class_name, &mut metadata)
            .await?;
        validate_runtime(&metadata)?;

        Ok(Arc::new(metadata))
    }

    /// Whether metadata for `class_name` is already loaded
    pub fn has_metadata_for(&self, class_name: &str) -> bool {
        self.cache.contains_key(class_name)
    }

    /// Register metadata built elsewhere
    pub async fn set_metadata_for(&self, metadata: ClassMetadata) {
        self.cache
            .insert(metadata.name.clone(), Arc::new(metadata))
            .await;
    }

    /// Class names known to the driver
    pub async fn class_names(&self) -> Result<Vec<String>> {
        self.driver.all_class_names().await
    }

    /// Metadata for every class known to the driver, in class name order
    pub async fn all_metadata(&self) -> Result<Vec<Arc<ClassMetadata>>> {
        let names = self.class_names().await?;
        futures::future::try_join_all(names.iter().map(|name| self.metadata_for(name))).await
    }

    /// Load every class and check the mappings against each other
    ///
    /// Load failures are reported as issues of the failing class.
    pub async fn validate_mapping(&self) -> Result<Vec<MappingIssue>> {
        let mut issues = Vec::new();

        for class_name in self.class_names().await? {
            match self.metadata_for(&class_name).await {
                Ok(metadata) => self.check_class(&metadata, &mut issues).await,
                Err(e) => issues.push(MappingIssue::new(&class_name, e.to_string())),
            }
        }

        debug!(issues = issues.len(), "validated mappings");
        Ok(issues)
    }

    async fn check_class(&self, metadata: &ClassMetadata, issues: &mut Vec<MappingIssue>) {
        let class_name = metadata.name.as_str();

        for association in metadata.association_mappings.values() {
            self.check_association(metadata, association, issues).await;
        }

        for class in metadata.discriminator_map.values() {
            if class != class_name && self.metadata_for(class).await.is_err() {
                issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The discriminator map of '{}' refers to class '{}' that cannot be loaded.",
                        class_name, class
                    ),
                ));
            }
        }

        for (field, embedded) in &metadata.embedded_classes {
            let embeddable = self
                .metadata_for(&embedded.class)
                .await
                .is_ok_and(|target| target.is_embedded_class());
            if !embeddable {
                issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The embedded field {}#{} refers to '{}' which is not an embeddable.",
                        class_name, field, embedded.class
                    ),
                ));
            }
        }
    }

    async fn check_association(
        &self,
        metadata: &ClassMetadata,
        association: &AssociationMapping,
        issues: &mut Vec<MappingIssue>,
    ) {
        let class_name = metadata.name.as_str();
        let field = association.field_name.as_str();

        let target = match self.metadata_for(&association.target_entity).await {
            Ok(target) if !target.is_embedded_class() => target,
            _ => {
                issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The target entity '{}' specified on {}#{} is unknown or not an entity.",
                        association.target_entity, class_name, field
                    ),
                ));
                return;
            }
        };

        if let Some(mapped_by) = &association.mapped_by {
            match target.association_mappings.get(mapped_by) {
                None => issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The association {}#{} refers to the owning side field {}#{} which does not exist.",
                        class_name, field, target.name, mapped_by
                    ),
                )),
                Some(owning) if owning.mapped_by.is_some() => issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The mappings {}#{} and {}#{} are both inverse sides of the association.",
                        class_name, field, target.name, mapped_by
                    ),
                )),
                Some(owning) if owning.inversed_by.as_deref().is_some_and(|inv| inv != field) => {
                    issues.push(MappingIssue::new(
                        class_name,
                        format!(
                            "The mappings {}#{} and {}#{} are inconsistent with each other.",
                            class_name, field, target.name, mapped_by
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(inversed_by) = &association.inversed_by {
            match target.association_mappings.get(inversed_by) {
                None => issues.push(MappingIssue::new(
                    class_name,
                    format!(
                        "The association {}#{} refers to the inverse side field {}#{} which does not exist.",
                        class_name, field, target.name, inversed_by
                    ),
                )),
                Some(inverse) if inverse.mapped_by.as_deref() != Some(field) => {
                    issues.push(MappingIssue::new(
                        class_name,
                        format!(
                            "The mappings {}#{} and {}#{} are inconsistent with each other.",
                            class_name, field, target.name, inversed_by
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
    }

    pub async fn stats(&self) -> FactoryStats {
        self.cache.run_pending_tasks().await;

        FactoryStats {
            cached_classes: self.cache.entry_count(),
            driver_loads: self.driver_loads.load(Ordering::Relaxed),
        }
    }
}

/// Checks that only make sense once a class is fully loaded
fn validate_runtime(metadata: &ClassMetadata) -> Result<()> {
    if metadata.is_entity() && metadata.identifier.is_empty() {
        return Err(MappingError::IdentifierRequired {
            class_name: metadata.name.clone(),
        });
    }

    if !metadata.is_inheritance_type_none() && metadata.discriminator_map.is_empty() {
        return Err(MappingError::MissingDiscriminatorMap {
            class_name: metadata.name.clone(),
        });
    }

    Ok(())
}
