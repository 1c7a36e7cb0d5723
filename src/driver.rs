//! XML mapping driver
//!
//! Reads the mapping document of a class and populates its
//! [`ClassMetadata`]. Attribute values are typed here, so a bad boolean or
//! enumeration value is reported even when schema validation is off.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MappingError, Result};
use crate::locator::MappingLocator;
use crate::metadata::{
    AssociationKind, AssociationMapping, Cascade, CacheUsage, ClassKind, ClassMetadata,
    ColumnPrefix, DiscriminatorColumn, EmbeddedClass, FetchMode, FieldMapping, GeneratorType,
    Index, InheritanceType, JoinColumn, JoinTable, LifecycleEvent, OrderDirection,
    SequenceGenerator,
};
use crate::schema::MappingSchema;
use crate::xml::{XmlElement, decode_document, parse_document};

const CLASS_ELEMENTS: [&str; 3] = ["entity", "mapped-superclass", "embeddable"];

/// Loads class metadata from XML mapping documents
#[derive(Clone)]
pub struct XmlDriver {
    locator: Arc<dyn MappingLocator>,
    schema: Option<MappingSchema>,
}

impl XmlDriver {
    pub fn new(locator: Arc<dyn MappingLocator>) -> Self {
        Self {
            locator,
            schema: None,
        }
    }

    /// Validate each document against `schema` before reading it
    pub fn with_schema_validation(mut self, schema: MappingSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn locator(&self) -> &Arc<dyn MappingLocator> {
        &self.locator
    }

    pub fn validates_schema(&self) -> bool {
        self.schema.is_some()
    }

    /// Populate `metadata` from the mapping document of `class_name`
    pub async fn load_metadata_for_class(
        &self,
        class_name: &str,
        metadata: &mut ClassMetadata,
    ) -> Result<()> {
        let path = self.locator.find_mapping_file(class_name).await?;
        let elements = self.load_mapping_file(&path).await?;

        let element = elements
            .get(class_name)
            .ok_or_else(|| MappingError::NotMappedClass {
                class_name: class_name.to_string(),
            })?;

        populate(element, metadata)?;
        debug!(
            class = class_name,
            path = %path.display(),
            fields = metadata.field_mappings.len(),
            associations = metadata.association_mappings.len(),
            "loaded class metadata"
        );
        Ok(())
    }

    /// Class names with a mapping document
    pub async fn all_class_names(&self) -> Result<Vec<String>> {
        self.locator.all_class_names().await
    }

    /// Whether `class_name` has no mapping element
    pub async fn is_transient(&self, class_name: &str) -> Result<bool> {
        let path = match self.locator.find_mapping_file(class_name).await {
            Ok(path) => path,
            Err(MappingError::MappingNotFound { .. }) => return Ok(true),
            Err(e) => return Err(e),
        };
        Ok(!self.load_mapping_file(&path).await?.contains_key(class_name))
    }

    /// Read a mapping document and return its class elements keyed by name
    ///
    /// When a name is declared twice, the first declaration is kept.
    pub async fn load_mapping_file(&self, path: &Path) -> Result<BTreeMap<String, XmlElement>> {
        let bytes = tokio::fs::read(path).await?;

        if let Some(schema) = &self.schema {
            let schema = schema.clone();
            let bytes = bytes.clone();
            let name = path.display().to_string();
            let report = tokio::task::spawn_blocking(move || schema.validate_bytes(&bytes, &name))
                .await
                .map_err(|e| MappingError::Concurrency {
                    details: format!("Schema validation task failed: {}", e),
                })??;

            if !report.valid {
                return Err(MappingError::SchemaViolation {
                    file: path.to_path_buf(),
                    violations: report.violations,
                });
            }
        }

        let root = decode_document(&bytes)
            .and_then(|source| parse_document(&source))
            .map_err(|e| MappingError::InvalidXml {
                file: path.to_path_buf(),
                details: e.to_string(),
            })?;

        let mut elements = BTreeMap::new();
        for child in root
            .children
            .into_iter()
            .filter(|child| CLASS_ELEMENTS.contains(&child.name.as_str()))
        {
            let name = required(&child, "name")?.to_string();
            elements.entry(name).or_insert(child);
        }
        Ok(elements)
    }
}

/// Fill `metadata` from one `entity`, `mapped-superclass` or `embeddable` element
fn populate(element: &XmlElement, metadata: &mut ClassMetadata) -> Result<()> {
    metadata.kind = match element.name.as_str() {
        "mapped-superclass" => ClassKind::MappedSuperclass,
        "embeddable" => ClassKind::Embeddable,
        _ => ClassKind::Entity,
    };

    if let Some(table) = element.attr("table") {
        metadata.table.name = table.to_string();
    }
    metadata.table.schema = element.attr("schema").map(str::to_string);
    metadata.repository_class = element
        .attr("repository-class")
        .map(|class| metadata.fully_qualified_class_name(class));
    metadata.read_only = bool_attr(element, "read-only")?.unwrap_or(false);

    // Class cache first: identifier associations are checked against it
    if let Some(cache) = element.child("cache") {
        let usage = enum_attr(cache, "usage", parse_cache_usage, CACHE_USAGES)?;
        metadata.enable_cache(
            usage.unwrap_or_default(),
            cache.attr("region").map(str::to_string),
        );
    }

    load_inheritance(element, metadata)?;
    load_lifecycle_callbacks(element, metadata)?;
    load_table_indexes(element, metadata);

    let declared_ids: Vec<(&XmlElement, bool)> = element
        .children_named("id")
        .map(|id| Ok((id, bool_attr(id, "association-key")?.unwrap_or(false))))
        .collect::<Result<_>>()?;
    let association_keys: HashSet<&str> = declared_ids
        .iter()
        .filter(|(_, association_key)| *association_key)
        .map(|(id, _)| required(id, "name"))
        .collect::<Result<_>>()?;

    for (id, association_key) in &declared_ids {
        if !association_key {
            load_id_field(id, metadata)?;
        }
    }

    for child in &element.children {
        match child.name.as_str() {
            "field" => {
                let mut mapping = field_mapping(child)?;
                mapping.declared = Some(metadata.name.clone());
                metadata.map_field(mapping)?;
            }
            "embedded" => load_embedded(child, metadata)?,
            "one-to-one" | "many-to-one" | "one-to-many" | "many-to-many" => {
                let mut mapping = association_mapping(child, metadata)?;
                mapping.id = association_keys.contains(mapping.field_name.as_str());
                metadata.map_association(mapping)?;
            }
            _ => {}
        }
    }

    let identifier = declared_ids
        .iter()
        .map(|(id, _)| required(id, "name").map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    metadata.set_identifier(identifier)
}

fn load_inheritance(element: &XmlElement, metadata: &mut ClassMetadata) -> Result<()> {
    metadata.inheritance_type =
        enum_attr(element, "inheritance-type", parse_inheritance, INHERITANCE_TYPES)?
            .unwrap_or_default();

    if metadata.inheritance_type != InheritanceType::None {
        let column = match element.child("discriminator-column") {
            Some(column) => {
                let type_name = column.attr("type").unwrap_or("string").to_string();
                let length = match u32_attr(column, "length")? {
                    Some(length) => Some(length),
                    None if type_name == "string" => Some(255),
                    None => None,
                };
                DiscriminatorColumn {
                    name: required(column, "name")?.to_string(),
                    type_name,
                    length,
                    column_definition: column.attr("column-definition").map(str::to_string),
                }
            }
            None => DiscriminatorColumn::default(),
        };
        metadata.discriminator_column = Some(column);
    }

    if let Some(map) = element.child("discriminator-map") {
        let entries = map
            .children_named("discriminator-mapping")
            .map(|entry| {
                Ok((
                    required(entry, "value")?.to_string(),
                    required(entry, "class")?.to_string(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        metadata.set_discriminator_map(entries)?;
    }

    Ok(())
}

fn load_lifecycle_callbacks(element: &XmlElement, metadata: &mut ClassMetadata) -> Result<()> {
    let Some(callbacks) = element.child("lifecycle-callbacks") else {
        return Ok(());
    };

    for callback in callbacks.children_named("lifecycle-callback") {
        let event = enum_attr(callback, "type", parse_lifecycle_event, LIFECYCLE_EVENTS)?
            .ok_or_else(|| missing(callback, "type"))?;
        metadata.add_lifecycle_callback(event, required(callback, "method")?);
    }
    Ok(())
}

fn load_table_indexes(element: &XmlElement, metadata: &mut ClassMetadata) {
    let indexes = |container: &str, entry: &str| -> Vec<Index> {
        element
            .children_named(container)
            .flat_map(|list| list.children_named(entry))
            .map(|index| Index {
                name: index.attr("name").map(str::to_string),
                columns: index
                    .attr("columns")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|column| !column.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .collect()
    };

    metadata.table.indexes = indexes("indexes", "index");
    metadata.table.unique_constraints = indexes("unique-constraints", "unique-constraint");
}

fn load_id_field(id: &XmlElement, metadata: &mut ClassMetadata) -> Result<()> {
    let mut mapping = field_mapping(id)?;
    mapping.id = true;
    mapping.declared = Some(metadata.name.clone());
    metadata.map_field(mapping)?;

    if let Some(generator) = id.child("generator") {
        metadata.generator_type =
            enum_attr(generator, "strategy", parse_generator, GENERATOR_STRATEGIES)?
                .unwrap_or(GeneratorType::Auto);
    }

    if let Some(sequence) = id.child("sequence-generator") {
        metadata.sequence_generator = Some(SequenceGenerator {
            sequence_name: required(sequence, "sequence-name")?.to_string(),
            allocation_size: u32_attr(sequence, "allocation-size")?.unwrap_or(1),
            initial_value: u32_attr(sequence, "initial-value")?.unwrap_or(1),
        });
    }

    Ok(())
}

fn field_mapping(element: &XmlElement) -> Result<FieldMapping> {
    let mut mapping = FieldMapping::new(required(element, "name")?);

    if let Some(column) = element.attr("column") {
        mapping.column_name = column.to_string();
    }
    if let Some(type_name) = element.attr("type") {
        mapping.type_name = type_name.to_string();
    }
    mapping.length = u32_attr(element, "length")?;
    mapping.precision = u32_attr(element, "precision")?;
    mapping.scale = u32_attr(element, "scale")?;
    mapping.nullable = bool_attr(element, "nullable")?.unwrap_or(false);
    mapping.unique = bool_attr(element, "unique")?.unwrap_or(false);
    mapping.version = bool_attr(element, "version")?.unwrap_or(false);
    mapping.column_definition = element.attr("column-definition").map(str::to_string);

    Ok(mapping)
}

fn load_embedded(element: &XmlElement, metadata: &mut ClassMetadata) -> Result<()> {
    let field = required(element, "name")?;
    let class = metadata.fully_qualified_class_name(required(element, "class")?);

    let column_prefix = if !bool_attr(element, "use-column-prefix")?.unwrap_or(true) {
        ColumnPrefix::Disabled
    } else {
        match element.attr("column-prefix") {
            Some(prefix) => ColumnPrefix::Explicit(prefix.to_string()),
            None => ColumnPrefix::Default,
        }
    };

    metadata.map_embedded(
        field,
        EmbeddedClass {
            class,
            column_prefix,
            declared: Some(metadata.name.clone()),
        },
    )
}

fn association_mapping(element: &XmlElement, metadata: &ClassMetadata) -> Result<AssociationMapping> {
    let kind = match element.name.as_str() {
        "one-to-one" => AssociationKind::OneToOne,
        "many-to-one" => AssociationKind::ManyToOne,
        "one-to-many" => AssociationKind::OneToMany,
        _ => AssociationKind::ManyToMany,
    };

    let field = required(element, "field")?;
    let target = metadata.fully_qualified_class_name(required(element, "target-entity")?);
    let mut mapping = AssociationMapping::new(field, kind, target);

    mapping.mapped_by = element.attr("mapped-by").map(str::to_string);
    if kind == AssociationKind::OneToMany && mapping.mapped_by.is_none() {
        return Err(missing(element, "mapped-by"));
    }
    mapping.inversed_by = element.attr("inversed-by").map(str::to_string);
    mapping.index_by = element.attr("index-by").map(str::to_string);
    mapping.orphan_removal = bool_attr(element, "orphan-removal")?.unwrap_or(false);
    mapping.fetch = enum_attr(element, "fetch", parse_fetch, FETCH_MODES)?.unwrap_or_default();
    mapping.declared = Some(metadata.name.clone());

    if let Some(cache) = element.child("cache") {
        let usage = enum_attr(cache, "usage", parse_cache_usage, CACHE_USAGES)?;
        mapping.cache = Some(metadata.association_cache_defaults(
            field,
            usage,
            cache.attr("region").map(str::to_string),
        ));
    }

    if let Some(cascade) = element.child("cascade") {
        mapping.cascade = cascade_set(cascade);
    }

    if let Some(column) = element.child("join-column") {
        mapping.join_columns.push(join_column(column, field)?);
    } else if let Some(columns) = element.child("join-columns") {
        mapping.join_columns = join_columns(columns, field)?;
    }

    if let Some(table) = element.child("join-table") {
        mapping.join_table = Some(JoinTable {
            name: required(table, "name")?.to_string(),
            schema: table.attr("schema").map(str::to_string),
            join_columns: match table.child("join-columns") {
                Some(columns) => join_columns(columns, field)?,
                None => Vec::new(),
            },
            inverse_join_columns: match table.child("inverse-join-columns") {
                Some(columns) => join_columns(columns, field)?,
                None => Vec::new(),
            },
        });
    }

    if let Some(order_by) = element.child("order-by") {
        mapping.order_by = order_by
            .children_named("order-by-field")
            .map(|order| {
                Ok((
                    required(order, "name")?.to_string(),
                    enum_attr(order, "direction", parse_direction, DIRECTIONS)?
                        .unwrap_or_default(),
                ))
            })
            .collect::<Result<_>>()?;
    }

    Ok(mapping)
}

fn cascade_set(element: &XmlElement) -> Cascade {
    let mut cascade = Cascade::default();
    for option in &element.children {
        match option.name.as_str() {
            "cascade-all" => return Cascade::all(),
            "cascade-persist" => cascade.persist = true,
            "cascade-remove" => cascade.remove = true,
            "cascade-refresh" => cascade.refresh = true,
            "cascade-merge" => cascade.merge = true,
            "cascade-detach" => cascade.detach = true,
            _ => {}
        }
    }
    cascade
}

fn join_columns(element: &XmlElement, field: &str) -> Result<Vec<JoinColumn>> {
    element
        .children_named("join-column")
        .map(|column| join_column(column, field))
        .collect()
}

fn join_column(element: &XmlElement, field: &str) -> Result<JoinColumn> {
    let name = element
        .attr("name")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_id", field));
    let mut column = JoinColumn::new(
        name,
        element.attr("referenced-column-name").unwrap_or("id"),
    );
    column.nullable = bool_attr(element, "nullable")?.unwrap_or(true);
    column.unique = bool_attr(element, "unique")?.unwrap_or(false);
    column.on_delete = element.attr("on-delete").map(str::to_string);
    column.column_definition = element.attr("column-definition").map(str::to_string);
    Ok(column)
}

// typed attribute access

fn missing(element: &XmlElement, attribute: &str) -> MappingError {
    MappingError::MissingAttribute {
        element: element.name.clone(),
        attribute: attribute.to_string(),
        line: element.line,
    }
}

fn invalid(element: &XmlElement, attribute: &str, value: &str, expected: &str) -> MappingError {
    MappingError::InvalidAttribute {
        element: element.name.clone(),
        attribute: attribute.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
        line: element.line,
    }
}

fn required<'a>(element: &'a XmlElement, attribute: &str) -> Result<&'a str> {
    element
        .attr(attribute)
        .ok_or_else(|| missing(element, attribute))
}

fn bool_attr(element: &XmlElement, attribute: &str) -> Result<Option<bool>> {
    element
        .attr(attribute)
        .map(|value| match value.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(invalid(element, attribute, value, "a boolean")),
        })
        .transpose()
}

fn u32_attr(element: &XmlElement, attribute: &str) -> Result<Option<u32>> {
    element
        .attr(attribute)
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(element, attribute, value, "an unsigned integer"))
        })
        .transpose()
}

fn enum_attr<T>(
    element: &XmlElement,
    attribute: &str,
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Result<Option<T>> {
    element
        .attr(attribute)
        .map(|value| parse(value.trim()).ok_or_else(|| invalid(element, attribute, value, expected)))
        .transpose()
}

const CACHE_USAGES: &str = "one of READ_ONLY, READ_WRITE, NONSTRICT_READ_WRITE";
const INHERITANCE_TYPES: &str = "one of SINGLE_TABLE, JOINED, NONE";
const GENERATOR_STRATEGIES: &str = "one of AUTO, SEQUENCE, IDENTITY, UUID, CUSTOM, NONE";
const FETCH_MODES: &str = "one of EAGER, LAZY, EXTRA_LAZY";
const DIRECTIONS: &str = "ASC or DESC";
const LIFECYCLE_EVENTS: &str = "a lifecycle event name";

fn parse_cache_usage(value: &str) -> Option<CacheUsage> {
    match value {
        "READ_ONLY" => Some(CacheUsage::ReadOnly),
        "READ_WRITE" => Some(CacheUsage::ReadWrite),
        "NONSTRICT_READ_WRITE" => Some(CacheUsage::NonstrictReadWrite),
        _ => None,
    }
}

fn parse_inheritance(value: &str) -> Option<InheritanceType> {
    match value {
        "SINGLE_TABLE" => Some(InheritanceType::SingleTable),
        "JOINED" => Some(InheritanceType::Joined),
        "NONE" => Some(InheritanceType::None),
        _ => None,
    }
}

fn parse_generator(value: &str) -> Option<GeneratorType> {
    match value {
        "AUTO" => Some(GeneratorType::Auto),
        "SEQUENCE" => Some(GeneratorType::Sequence),
        "IDENTITY" => Some(GeneratorType::Identity),
        "UUID" => Some(GeneratorType::Uuid),
        "CUSTOM" => Some(GeneratorType::Custom),
        "NONE" => Some(GeneratorType::None),
        _ => None,
    }
}

fn parse_fetch(value: &str) -> Option<FetchMode> {
    match value {
        "EAGER" => Some(FetchMode::Eager),
        "LAZY" => Some(FetchMode::Lazy),
        "EXTRA_LAZY" => Some(FetchMode::ExtraLazy),
        _ => None,
    }
}

fn parse_direction(value: &str) -> Option<OrderDirection> {
    match value {
        "ASC" => Some(OrderDirection::Asc),
        "DESC" => Some(OrderDirection::Desc),
        _ => None,
    }
}

fn parse_lifecycle_event(value: &str) -> Option<LifecycleEvent> {
    match value {
        "prePersist" => Some(LifecycleEvent::PrePersist),
        "postPersist" => Some(LifecycleEvent::PostPersist),
        "preUpdate" => Some(LifecycleEvent::PreUpdate),
        "postUpdate" => Some(LifecycleEvent::PostUpdate),
        "preRemove" => Some(LifecycleEvent::PreRemove),
        "postRemove" => Some(LifecycleEvent::PostRemove),
        "postLoad" => Some(LifecycleEvent::PostLoad),
        "preFlush" => Some(LifecycleEvent::PreFlush),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MockMappingLocator;
    use tempfile::TempDir;

    fn write_mapping(dir: &TempDir, class_name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(format!("{}.orm.xml", class_name));
        std::fs::write(
            &path,
            format!(
                "<?xml version=\"1.0\"?>\n<mapping xmlns=\"urn:xml-mapping:orm\">\n{}\n</mapping>\n",
                body
            ),
        )
        .unwrap();
        path
    }

    fn driver_for(class_name: &str, path: std::path::PathBuf) -> XmlDriver {
        let expected = class_name.to_string();
        let mut locator = MockMappingLocator::new();
        locator
            .expect_find_mapping_file()
            .withf(move |requested| requested == expected)
            .returning(move |_| Ok(path.clone()));
        XmlDriver::new(Arc::new(locator))
    }

    async fn load(class_name: &str, body: &str) -> Result<ClassMetadata> {
        let dir = TempDir::new().unwrap();
        let path = write_mapping(&dir, class_name, body);
        let driver = driver_for(class_name, path);

        let mut metadata = ClassMetadata::new(class_name);
        driver
            .load_metadata_for_class(class_name, &mut metadata)
            .await?;
        Ok(metadata)
    }

    #[tokio::test]
    async fn test_load_entity() {
        let metadata = load(
            "Models.Cms.Article",
            r#"<entity name="Models.Cms.Article" table="articles" repository-class="ArticleRepository">
    <id name="id" type="integer">
        <generator strategy="SEQUENCE"/>
        <sequence-generator sequence-name="article_seq" allocation-size="10"/>
    </id>
    <field name="title" length="255"/>
    <field name="body" type="text" nullable="true"/>
    <many-to-one field="author" target-entity="User">
        <cascade><cascade-persist/></cascade>
    </many-to-one>
    <one-to-many field="comments" target-entity="Comment" mapped-by="article" fetch="EXTRA_LAZY">
        <order-by><order-by-field name="createdAt" direction="DESC"/></order-by>
    </one-to-many>
</entity>"#,
        )
        .await
        .unwrap();

        assert!(metadata.is_entity());
        assert_eq!(metadata.table.name, "articles");
        assert_eq!(
            metadata.repository_class.as_deref(),
            Some("Models.Cms.ArticleRepository")
        );
        assert_eq!(metadata.identifier, vec!["id"]);
        assert_eq!(metadata.generator_type, GeneratorType::Sequence);
        assert_eq!(
            metadata.sequence_generator.as_ref().unwrap().allocation_size,
            10
        );

        let title = &metadata.field_mappings["title"];
        assert_eq!(title.type_name, "string");
        assert_eq!(title.length, Some(255));
        assert!(!title.nullable);
        assert!(metadata.field_mappings["body"].nullable);

        let author = &metadata.association_mappings["author"];
        assert_eq!(author.target_entity, "Models.Cms.User");
        assert!(author.cascade.persist);
        assert!(!author.cascade.remove);
        assert_eq!(author.join_columns[0].name, "author_id");

        let comments = &metadata.association_mappings["comments"];
        assert!(!comments.is_owning_side);
        assert_eq!(comments.fetch, FetchMode::ExtraLazy);
        assert_eq!(
            comments.order_by,
            vec![("createdAt".to_string(), OrderDirection::Desc)]
        );
    }

    #[tokio::test]
    async fn test_composite_identifier_with_association_key() {
        let metadata = load(
            "Models.Translation.Translation",
            r#"<entity name="Models.Translation.Translation">
    <id name="language" type="string"/>
    <id name="article" association-key="true"/>
    <field name="text" type="text"/>
    <many-to-one field="article" target-entity="Article"/>
</entity>"#,
        )
        .await
        .unwrap();

        assert_eq!(metadata.identifier, vec!["language", "article"]);
        assert!(metadata.is_identifier_composite());
        assert!(metadata.association_mappings["article"].id);
        assert!(metadata.field_mappings["language"].id);
        assert!(!metadata.has_field("article"));
    }

    #[tokio::test]
    async fn test_association_key_without_association() {
        let error = load(
            "Models.Translation.Orphan",
            r#"<entity name="Models.Translation.Orphan">
    <id name="article" association-key="true"/>
</entity>"#,
        )
        .await
        .unwrap_err();

        assert!(matches!(error, MappingError::UnknownIdentifierField { .. }));
    }

    #[tokio::test]
    async fn test_embedded_column_prefixes() {
        let metadata = load(
            "Models.Embedded.Person",
            r#"<entity name="Models.Embedded.Person">
    <id name="id" type="integer"/>
    <embedded name="name" class="Name" column-prefix="nm_"/>
    <embedded name="home" class="Address" use-column-prefix="false"/>
    <embedded name="work" class="Models.Embedded.Address"/>
</entity>"#,
        )
        .await
        .unwrap();

        let name = &metadata.embedded_classes["name"];
        assert_eq!(name.class, "Models.Embedded.Name");
        assert_eq!(name.column_prefix, ColumnPrefix::Explicit("nm_".to_string()));
        assert_eq!(name.declared.as_deref(), Some("Models.Embedded.Person"));

        assert_eq!(
            metadata.embedded_classes["home"].column_prefix,
            ColumnPrefix::Disabled
        );
        assert_eq!(
            metadata.embedded_classes["work"].column_prefix,
            ColumnPrefix::Default
        );
    }

    #[tokio::test]
    async fn test_embeddable_kind() {
        let metadata = load(
            "Models.Embedded.Name",
            r#"<embeddable name="Models.Embedded.Name">
    <field name="first"/>
    <field name="last"/>
</embeddable>"#,
        )
        .await
        .unwrap();

        assert!(metadata.is_embedded_class());
        assert!(metadata.identifier.is_empty());
        assert_eq!(metadata.field_mappings.len(), 2);
    }

    #[tokio::test]
    async fn test_inheritance_and_discriminator() {
        let metadata = load(
            "Models.Cti.CtiFoo",
            r#"<entity name="Models.Cti.CtiFoo" inheritance-type="JOINED">
    <discriminator-column name="type" length="32"/>
    <discriminator-map>
        <discriminator-mapping value="foo" class="CtiFoo"/>
        <discriminator-mapping value="bar" class="CtiBar"/>
        <discriminator-mapping value="baz" class="CtiBaz"/>
    </discriminator-map>
    <id name="id" type="integer"/>
</entity>"#,
        )
        .await
        .unwrap();

        assert_eq!(metadata.inheritance_type, InheritanceType::Joined);
        let column = metadata.discriminator_column.as_ref().unwrap();
        assert_eq!(column.name, "type");
        assert_eq!(column.length, Some(32));
        assert_eq!(metadata.discriminator_map.len(), 3);
        assert_eq!(metadata.discriminator_map["baz"], "Models.Cti.CtiBaz");
        assert_eq!(metadata.discriminator_value.as_deref(), Some("foo"));
    }

    #[tokio::test]
    async fn test_default_discriminator_column() {
        let metadata = load(
            "Models.Sti.Vehicle",
            r#"<entity name="Models.Sti.Vehicle" inheritance-type="SINGLE_TABLE">
    <discriminator-map>
        <discriminator-mapping value="vehicle" class="Vehicle"/>
    </discriminator-map>
    <id name="id" type="integer"/>
</entity>"#,
        )
        .await
        .unwrap();

        assert_eq!(
            metadata.discriminator_column,
            Some(DiscriminatorColumn::default())
        );
    }

    #[tokio::test]
    async fn test_cache_and_lifecycle_callbacks() {
        let metadata = load(
            "Models.Cache.City",
            r#"<entity name="Models.Cache.City">
    <cache usage="READ_ONLY"/>
    <lifecycle-callbacks>
        <lifecycle-callback type="prePersist" method="touch"/>
        <lifecycle-callback type="preUpdate" method="touch"/>
    </lifecycle-callbacks>
    <indexes><index name="city_name" columns="name, state_id"/></indexes>
    <id name="id" type="integer"/>
    <many-to-one field="state" target-entity="State">
        <cache usage="READ_WRITE"/>
    </many-to-one>
</entity>"#,
        )
        .await
        .unwrap();

        let cache = metadata.cache.as_ref().unwrap();
        assert_eq!(cache.usage, CacheUsage::ReadOnly);
        assert_eq!(cache.region, "models_cache_city");

        let state_cache = metadata.association_mappings["state"].cache.as_ref().unwrap();
        assert_eq!(state_cache.usage, CacheUsage::ReadWrite);
        assert_eq!(state_cache.region, "models_cache_city__state");

        assert_eq!(
            metadata.lifecycle_callbacks(LifecycleEvent::PreUpdate),
            ["touch"]
        );
        assert_eq!(metadata.table.indexes[0].columns, vec!["name", "state_id"]);
    }

    #[tokio::test]
    async fn test_uncached_identifier_association_on_cached_entity() {
        let error = load(
            "Models.Cache.BrokenCity",
            r#"<entity name="Models.Cache.BrokenCity">
    <cache usage="READ_ONLY"/>
    <id name="state" association-key="true"/>
    <many-to-one field="state" target-entity="State"/>
</entity>"#,
        )
        .await
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Entity association field 'Models.Cache.BrokenCity#state' not configured as part of the second-level cache."
        );
    }

    #[tokio::test]
    async fn test_many_to_many_join_table() {
        let metadata = load(
            "Models.Cms.User",
            r#"<entity name="Models.Cms.User">
    <id name="id" type="integer"/>
    <many-to-many field="groups" target-entity="Group" inversed-by="users">
        <join-table name="cms_users_groups">
            <join-columns><join-column name="user_id" on-delete="CASCADE"/></join-columns>
        </join-table>
    </many-to-many>
</entity>"#,
        )
        .await
        .unwrap();

        let join_table = metadata.association_mappings["groups"]
            .join_table
            .as_ref()
            .unwrap();
        assert_eq!(join_table.name, "cms_users_groups");
        assert_eq!(join_table.join_columns[0].on_delete.as_deref(), Some("CASCADE"));
        assert_eq!(join_table.inverse_join_columns[0].name, "group_id");
    }

    #[tokio::test]
    async fn test_invalid_boolean_attribute() {
        let error = load(
            "Models.Cms.Article",
            r#"<entity name="Models.Cms.Article">
    <id name="id" type="integer"/>
    <field name="title" nullable="yes"/>
</entity>"#,
        )
        .await
        .unwrap_err();

        match error {
            MappingError::InvalidAttribute {
                element,
                attribute,
                value,
                line,
                ..
            } => {
                assert_eq!(element, "field");
                assert_eq!(attribute, "nullable");
                assert_eq!(value, "yes");
                assert_eq!(line, 5);
            }
            other => panic!("Expected InvalidAttribute, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_enumeration_attribute() {
        let error = load(
            "Models.Cache.City",
            r#"<entity name="Models.Cache.City">
    <cache usage="SOMETIMES"/>
</entity>"#,
        )
        .await
        .unwrap_err();

        assert!(matches!(error, MappingError::InvalidAttribute { .. }));
    }

    #[tokio::test]
    async fn test_class_missing_from_document() {
        let error = load(
            "Models.Cti.CtiBar",
            r#"<entity name="Models.Cti.CtiFoo"><id name="id"/></entity>"#,
        )
        .await
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Class 'Models.Cti.CtiBar' is not a valid entity or mapped superclass."
        );
    }

    #[tokio::test]
    async fn test_malformed_document() {
        let error = load("Models.Cms.Article", "<entity name=\"Models.Cms.Article\">")
            .await
            .unwrap_err();

        assert!(matches!(error, MappingError::InvalidXml { .. }));
    }

    #[tokio::test]
    async fn test_mapping_not_found_is_propagated() {
        let mut locator = MockMappingLocator::new();
        locator.expect_find_mapping_file().returning(|class_name| {
            Err(MappingError::MappingNotFound {
                class_name: class_name.to_string(),
                file_name: format!("{}.orm.xml", class_name),
            })
        });
        let driver = XmlDriver::new(Arc::new(locator));

        let mut metadata = ClassMetadata::new("Models.Generic.Serialization");
        let error = driver
            .load_metadata_for_class("Models.Generic.Serialization", &mut metadata)
            .await
            .unwrap_err();
        assert!(matches!(error, MappingError::MappingNotFound { .. }));
        assert!(driver.is_transient("Models.Generic.Serialization").await.unwrap());
    }

    #[tokio::test]
    async fn test_schema_validation_runs_first() {
        let dir = TempDir::new().unwrap();
        let path = write_mapping(
            &dir,
            "Models.Cms.Article",
            r#"<entity name="Models.Cms.Article"><field name="title" invalid="1"/></entity>"#,
        );
        let driver = driver_for("Models.Cms.Article", path)
            .with_schema_validation(MappingSchema::bundled().unwrap());

        let mut metadata = ClassMetadata::new("Models.Cms.Article");
        match driver
            .load_metadata_for_class("Models.Cms.Article", &mut metadata)
            .await
            .unwrap_err()
        {
            MappingError::SchemaViolation { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].message.contains("'invalid'"));
            }
            other => panic!("Expected SchemaViolation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_declared_latin1_document_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Models.Cms.Cafe.orm.xml");
        let mut bytes = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<mapping xmlns="urn:xml-mapping:orm">
<entity name="Models.Cms.Cafe">
    <id name="id" type="integer"/>
    <field name="name" column="caf"#
            .to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"\"/>\n</entity>\n</mapping>\n");
        std::fs::write(&path, bytes).unwrap();

        let driver = driver_for("Models.Cms.Cafe", path)
            .with_schema_validation(MappingSchema::bundled().unwrap());
        let mut metadata = ClassMetadata::new("Models.Cms.Cafe");
        driver
            .load_metadata_for_class("Models.Cms.Cafe", &mut metadata)
            .await
            .unwrap();

        assert_eq!(metadata.field_mappings["name"].column_name, "café");
    }

    #[tokio::test]
    async fn test_undeclared_non_utf8_document_is_invalid_xml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Models.Cms.Cafe.orm.xml");
        std::fs::write(
            &path,
            b"<mapping xmlns=\"urn:xml-mapping:orm\"><entity name=\"Models.Cms.Caf\xE9\"/></mapping>",
        )
        .unwrap();

        let driver = driver_for("Models.Cms.Cafe", path);
        let mut metadata = ClassMetadata::new("Models.Cms.Cafe");
        match driver
            .load_metadata_for_class("Models.Cms.Cafe", &mut metadata)
            .await
            .unwrap_err()
        {
            MappingError::InvalidXml { details, .. } => {
                assert!(details.contains("not valid UTF-8"), "{}", details)
            }
            other => panic!("Expected InvalidXml, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_mapping_file_lists_all_classes() {
        let dir = TempDir::new().unwrap();
        let path = write_mapping(
            &dir,
            "Models.Shared",
            r#"<embeddable name="Models.Shared.Money"><field name="amount" type="decimal"/></embeddable>
<mapped-superclass name="Models.Shared.Base"><id name="id" type="integer"/></mapped-superclass>"#,
        );
        let driver = XmlDriver::new(Arc::new(MockMappingLocator::new()));

        let elements = driver.load_mapping_file(&path).await.unwrap();
        let names: Vec<_> = elements.keys().cloned().collect();
        assert_eq!(names, vec!["Models.Shared.Base", "Models.Shared.Money"]);
    }
}
