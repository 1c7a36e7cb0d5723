//! Class metadata populated from mapping documents
//!
//! A [`ClassMetadata`] starts empty, is filled once by the
//! [`XmlDriver`](crate::driver::XmlDriver) and is then shared read-only.
//! Class names use `.` as namespace separator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};

/// What kind of mapped class a document declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassKind {
    #[default]
    Entity,
    MappedSuperclass,
    Embeddable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InheritanceType {
    #[default]
    None,
    SingleTable,
    Joined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratorType {
    #[default]
    None,
    Auto,
    Sequence,
    Identity,
    Uuid,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheUsage {
    #[default]
    ReadOnly,
    ReadWrite,
    NonstrictReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchMode {
    #[default]
    Lazy,
    Eager,
    ExtraLazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
    PostLoad,
    PreFlush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_to_one(&self) -> bool {
        matches!(self, AssociationKind::OneToOne | AssociationKind::ManyToOne)
    }

    pub fn is_to_many(&self) -> bool {
        !self.is_to_one()
    }
}

/// Second-level cache settings of a class or an association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMapping {
    pub usage: CacheUsage,
    pub region: String,
}

/// Column prefix applied to the columns of an embedded object
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnPrefix {
    /// `<field>_`
    #[default]
    Default,
    Explicit(String),
    /// Columns are used without prefix
    Disabled,
}

impl ColumnPrefix {
    /// Effective prefix for an embedded object stored under `field`
    pub fn resolve(&self, field: &str) -> Option<String> {
        match self {
            ColumnPrefix::Default => Some(format!("{}_", field)),
            ColumnPrefix::Explicit(prefix) => Some(prefix.clone()),
            ColumnPrefix::Disabled => None,
        }
    }
}

/// An embedded value object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedClass {
    pub class: String,
    pub column_prefix: ColumnPrefix,
    /// Class whose mapping declared the embedded field
    pub declared: Option<String>,
}

/// A mapped scalar field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field_name: String,
    pub column_name: String,
    pub type_name: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub unique: bool,
    pub version: bool,
    pub id: bool,
    pub column_definition: Option<String>,
    pub declared: Option<String>,
}

impl FieldMapping {
    /// A non-nullable `string` field stored in a column of the same name
    pub fn new(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self {
            column_name: field_name.clone(),
            field_name,
            type_name: "string".to_string(),
            length: None,
            precision: None,
            scale: None,
            nullable: false,
            unique: false,
            version: false,
            id: false,
            column_definition: None,
            declared: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub name: String,
    pub referenced_column_name: String,
    pub nullable: bool,
    pub unique: bool,
    pub on_delete: Option<String>,
    pub column_definition: Option<String>,
}

impl JoinColumn {
    pub fn new(name: impl Into<String>, referenced_column_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referenced_column_name: referenced_column_name.into(),
            nullable: true,
            unique: false,
            on_delete: None,
            column_definition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    pub name: String,
    pub schema: Option<String>,
    pub join_columns: Vec<JoinColumn>,
    pub inverse_join_columns: Vec<JoinColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cascade {
    pub persist: bool,
    pub remove: bool,
    pub refresh: bool,
    pub merge: bool,
    pub detach: bool,
}

impl Cascade {
    pub fn all() -> Self {
        Self {
            persist: true,
            remove: true,
            refresh: true,
            merge: true,
            detach: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A mapped association to another class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMapping {
    pub field_name: String,
    pub kind: AssociationKind,
    pub source_entity: String,
    pub target_entity: String,
    pub mapped_by: Option<String>,
    pub inversed_by: Option<String>,
    pub is_owning_side: bool,
    pub id: bool,
    pub fetch: FetchMode,
    pub cascade: Cascade,
    pub orphan_removal: bool,
    pub join_columns: Vec<JoinColumn>,
    pub join_table: Option<JoinTable>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub index_by: Option<String>,
    pub cache: Option<CacheMapping>,
    pub declared: Option<String>,
}

impl AssociationMapping {
    pub fn new(
        field_name: impl Into<String>,
        kind: AssociationKind,
        target_entity: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            kind,
            source_entity: String::new(),
            target_entity: target_entity.into(),
            mapped_by: None,
            inversed_by: None,
            is_owning_side: true,
            id: false,
            fetch: FetchMode::default(),
            cascade: Cascade::default(),
            orphan_removal: false,
            join_columns: Vec::new(),
            join_table: None,
            order_by: Vec::new(),
            index_by: None,
            cache: None,
            declared: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscriminatorColumn {
    pub name: String,
    pub type_name: String,
    pub length: Option<u32>,
    pub column_definition: Option<String>,
}

impl Default for DiscriminatorColumn {
    fn default() -> Self {
        Self {
            name: "dtype".to_string(),
            type_name: "string".to_string(),
            length: Some(255),
            column_definition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGenerator {
    pub sequence_name: String,
    pub allocation_size: u32,
    pub initial_value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableMapping {
    pub name: String,
    pub schema: Option<String>,
    pub indexes: Vec<Index>,
    pub unique_constraints: Vec<Index>,
}

/// Persistence configuration of one mapped class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetadata {
    pub name: String,
    pub kind: ClassKind,
    pub table: TableMapping,
    pub repository_class: Option<String>,
    pub read_only: bool,
    pub identifier: Vec<String>,
    pub generator_type: GeneratorType,
    pub sequence_generator: Option<SequenceGenerator>,
    pub field_mappings: BTreeMap<String, FieldMapping>,
    pub association_mappings: BTreeMap<String, AssociationMapping>,
    pub embedded_classes: BTreeMap<String, EmbeddedClass>,
    pub inheritance_type: InheritanceType,
    pub discriminator_column: Option<DiscriminatorColumn>,
    pub discriminator_map: BTreeMap<String, String>,
    pub discriminator_value: Option<String>,
    pub subclasses: Vec<String>,
    pub cache: Option<CacheMapping>,
    pub lifecycle_callbacks: BTreeMap<LifecycleEvent, Vec<String>>,
}

impl ClassMetadata {
    /// An empty record for `name`, to be populated by a driver
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = TableMapping {
            name: short_name(&name).to_string(),
            ..TableMapping::default()
        };

        Self {
            name,
            kind: ClassKind::Entity,
            table,
            repository_class: None,
            read_only: false,
            identifier: Vec::new(),
            generator_type: GeneratorType::None,
            sequence_generator: None,
            field_mappings: BTreeMap::new(),
            association_mappings: BTreeMap::new(),
            embedded_classes: BTreeMap::new(),
            inheritance_type: InheritanceType::None,
            discriminator_column: None,
            discriminator_map: BTreeMap::new(),
            discriminator_value: None,
            subclasses: Vec::new(),
            cache: None,
            lifecycle_callbacks: BTreeMap::new(),
        }
    }

    /// Namespace part of the class name (empty for a global class)
    pub fn namespace(&self) -> &str {
        self.name.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Resolve a class name relative to this class's namespace
    pub fn fully_qualified_class_name(&self, class: &str) -> String {
        let namespace = self.namespace();
        if class.contains('.') || namespace.is_empty() {
            class.to_string()
        } else {
            format!("{}.{}", namespace, class)
        }
    }

    pub fn is_embedded_class(&self) -> bool {
        self.kind == ClassKind::Embeddable
    }

    pub fn is_mapped_superclass(&self) -> bool {
        self.kind == ClassKind::MappedSuperclass
    }

    pub fn is_entity(&self) -> bool {
        self.kind == ClassKind::Entity
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache.is_some()
    }

    pub fn is_inheritance_type_none(&self) -> bool {
        self.inheritance_type == InheritanceType::None
    }

    pub fn is_identifier(&self, field: &str) -> bool {
        self.identifier.iter().any(|id| id == field)
    }

    pub fn is_identifier_composite(&self) -> bool {
        self.identifier.len() > 1
    }

    /// The identifier field when the identifier is not composite
    pub fn single_identifier_field(&self) -> Option<&str> {
        match self.identifier.as_slice() {
            [single] => Some(single.as_str()),
            _ => None,
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field_mappings.contains_key(field)
    }

    pub fn has_association(&self, field: &str) -> bool {
        self.association_mappings.contains_key(field)
    }

    /// Cache region used when a mapping does not name one
    pub fn default_cache_region(&self) -> String {
        self.name.to_lowercase().replace('.', "_")
    }

    pub fn lifecycle_callbacks(&self, event: LifecycleEvent) -> &[String] {
        self.lifecycle_callbacks
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add_lifecycle_callback(&mut self, event: LifecycleEvent, method: impl Into<String>) {
        let method = method.into();
        let methods = self.lifecycle_callbacks.entry(event).or_default();
        if !methods.contains(&method) {
            methods.push(method);
        }
    }

    /// Enable the second-level cache, filling in the default region
    pub fn enable_cache(&mut self, usage: CacheUsage, region: Option<String>) {
        let region = region.unwrap_or_else(|| self.default_cache_region());
        self.cache = Some(CacheMapping { usage, region });
    }

    /// Cache settings for an association, defaulting usage and region from the class
    pub fn association_cache_defaults(
        &self,
        field: &str,
        usage: Option<CacheUsage>,
        region: Option<String>,
    ) -> CacheMapping {
        let usage = usage
            .or_else(|| self.cache.as_ref().map(|cache| cache.usage))
            .unwrap_or_default();
        let region = region.unwrap_or_else(|| format!("{}__{}", self.default_cache_region(), field));
        CacheMapping { usage, region }
    }

    fn ensure_unmapped(&self, field: &str) -> Result<()> {
        if self.field_mappings.contains_key(field)
            || self.association_mappings.contains_key(field)
            || self.embedded_classes.contains_key(field)
        {
            return Err(MappingError::DuplicateProperty {
                class_name: self.name.clone(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    pub fn map_field(&mut self, mapping: FieldMapping) -> Result<()> {
        self.ensure_unmapped(&mapping.field_name)?;

        if mapping.id && !self.is_identifier(&mapping.field_name) {
            self.identifier.push(mapping.field_name.clone());
        }
        self.field_mappings
            .insert(mapping.field_name.clone(), mapping);
        Ok(())
    }

    /// Map an association, completing join columns and join tables with defaults
    pub fn map_association(&mut self, mut mapping: AssociationMapping) -> Result<()> {
        self.ensure_unmapped(&mapping.field_name)?;

        mapping.source_entity = self.name.clone();
        mapping.is_owning_side = mapping.mapped_by.is_none();

        if mapping.id {
            if mapping.kind.is_to_many() {
                return Err(MappingError::IllegalIdentifierAssociation {
                    class_name: self.name.clone(),
                    field: mapping.field_name,
                });
            }
            if self.is_cacheable() && mapping.cache.is_none() {
                return Err(MappingError::NonCacheableAssociation {
                    class_name: self.name.clone(),
                    field: mapping.field_name,
                });
            }
        }

        let inverse_to_many = mapping.kind == AssociationKind::OneToMany
            || (mapping.kind == AssociationKind::ManyToMany && !mapping.is_owning_side);
        if inverse_to_many && self.is_mapped_superclass() {
            return Err(MappingError::IllegalAssociationOnMappedSuperclass {
                class_name: self.name.clone(),
                field: mapping.field_name,
            });
        }

        match mapping.kind {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                if mapping.is_owning_side && mapping.join_columns.is_empty() {
                    mapping.join_columns.push(JoinColumn::new(
                        format!("{}_id", mapping.field_name),
                        "id",
                    ));
                }
            }
            AssociationKind::ManyToMany => {
                if mapping.is_owning_side && mapping.join_table.is_none() {
                    mapping.join_table = Some(self.default_join_table(&mapping.target_entity));
                }
                if let Some(join_table) = mapping.join_table.as_mut() {
                    if join_table.join_columns.is_empty() {
                        join_table.join_columns.push(JoinColumn::new(
                            format!("{}_id", short_name(&self.name).to_lowercase()),
                            "id",
                        ));
                    }
                    if join_table.inverse_join_columns.is_empty() {
                        join_table.inverse_join_columns.push(JoinColumn::new(
                            format!("{}_id", short_name(&mapping.target_entity).to_lowercase()),
                            "id",
                        ));
                    }
                }
            }
            AssociationKind::OneToMany => {}
        }

        if mapping.id && !self.is_identifier(&mapping.field_name) {
            self.identifier.push(mapping.field_name.clone());
        }
        self.association_mappings
            .insert(mapping.field_name.clone(), mapping);
        Ok(())
    }

    fn default_join_table(&self, target_entity: &str) -> JoinTable {
        JoinTable {
            name: format!(
                "{}_{}",
                short_name(&self.name).to_lowercase(),
                short_name(target_entity).to_lowercase()
            ),
            schema: None,
            join_columns: Vec::new(),
            inverse_join_columns: Vec::new(),
        }
    }

    pub fn map_embedded(&mut self, field: impl Into<String>, embedded: EmbeddedClass) -> Result<()> {
        let field = field.into();
        self.ensure_unmapped(&field)?;
        self.embedded_classes.insert(field, embedded);
        Ok(())
    }

    /// Install the discriminator map
    ///
    /// Values must be unique and every class may appear only once. The entry
    /// naming this class becomes its discriminator value; the others are
    /// recorded as subclasses in declaration order.
    pub fn set_discriminator_map<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        let mut values_by_class: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut declared: Vec<(String, String)> = Vec::new();

        for (value, class) in entries {
            let class = self.fully_qualified_class_name(&class);
            if map.contains_key(&value) {
                return Err(MappingError::DuplicateDiscriminatorValue {
                    class_name: self.name.clone(),
                    value,
                });
            }
            values_by_class
                .entry(class.clone())
                .or_default()
                .push(value.clone());
            declared.push((value.clone(), class.clone()));
            map.insert(value, class);
        }

        if let Some((target, values)) = values_by_class
            .into_iter()
            .find(|(_, values)| values.len() > 1)
        {
            return Err(MappingError::DuplicateDiscriminatorEntry {
                class_name: self.name.clone(),
                target,
                values,
            });
        }

        self.discriminator_value = None;
        self.subclasses.clear();
        for (value, class) in declared {
            if class == self.name {
                self.discriminator_value = Some(value);
            } else {
                self.subclasses.push(class);
            }
        }
        self.discriminator_map = map;
        Ok(())
    }

    /// Replace the identifier with the declared order
    ///
    /// Every name must already be mapped as an identifier field or
    /// identifier association.
    pub fn set_identifier(&mut self, identifier: Vec<String>) -> Result<()> {
        for field in &identifier {
            let is_id_field = self.field_mappings.get(field).is_some_and(|m| m.id);
            let is_id_association = self.association_mappings.get(field).is_some_and(|m| m.id);
            if !is_id_field && !is_id_association {
                return Err(MappingError::UnknownIdentifierField {
                    class_name: self.name.clone(),
                    field: field.clone(),
                });
            }
        }
        self.identifier = identifier;
        Ok(())
    }
}

/// Last segment of a dotted class name
pub fn short_name(class: &str) -> &str {
    class.rsplit_once('.').map(|(_, short)| short).unwrap_or(class)
}
