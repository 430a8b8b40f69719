//! Evaluated properties, items, metadata and the dictionaries holding them.
//!
//! Every value keeps a link to the value it replaced (its predecessor), so
//! the full history of a name is reachable from its current value. Chains
//! only ever point backwards in evaluation order and end in `None`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::NameComparison;
use crate::events::EventLocation;
use crate::xml::ElementLocation;

// ═══════════════════════════════════════════════════════════════════════════════
//  Provenance
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a property value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Environment,
    Toolset,
    SubToolset,
    Global,
    Reserved,
    /// Defined by a `<PropertyGroup>` in the project or one of its imports.
    Project,
}

/// The element that defined a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlSource {
    pub file: Option<PathBuf>,
    pub location: ElementLocation,
}

impl XmlSource {
    pub fn new(file: Option<&Path>, location: ElementLocation) -> Self {
        Self { file: file.map(Path::to_path_buf), location }
    }
}

impl From<&XmlSource> for EventLocation {
    fn from(source: &XmlSource) -> Self {
        EventLocation { file: source.file.clone(), line: source.location.line, column: source.location.column }
    }
}

impl fmt::Display for XmlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        EventLocation::from(self).fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Properties
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectProperty {
    name: String,
    evaluated_value: String,
    unevaluated_value: Option<String>,
    kind: PropertyKind,
    source: Option<XmlSource>,
    predecessor: Option<Arc<ProjectProperty>>,
    is_imported: bool,
}

impl ProjectProperty {
    /// A property with no backing element: environment, toolset, global or
    /// reserved.
    pub fn initial(name: impl Into<String>, value: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            evaluated_value: value.into(),
            unevaluated_value: None,
            kind,
            source: None,
            predecessor: None,
            is_imported: false,
        }
    }

    /// A property defined by a `<PropertyGroup>` child.
    pub fn from_xml(
        name: impl Into<String>,
        unevaluated_value: impl Into<String>,
        evaluated_value: impl Into<String>,
        source: XmlSource,
        is_imported: bool,
    ) -> Self {
        Self {
            name: name.into(),
            evaluated_value: evaluated_value.into(),
            unevaluated_value: Some(unevaluated_value.into()),
            kind: PropertyKind::Project,
            source: Some(source),
            predecessor: None,
            is_imported,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluated_value(&self) -> &str {
        &self.evaluated_value
    }

    /// Text as written in the project; initial properties return their value.
    pub fn unevaluated_value(&self) -> &str {
        self.unevaluated_value.as_deref().unwrap_or(&self.evaluated_value)
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn source(&self) -> Option<&XmlSource> {
        self.source.as_ref()
    }

    /// The value this property replaced.
    pub fn predecessor(&self) -> Option<&ProjectProperty> {
        self.predecessor.as_deref()
    }

    /// Defined in a file other than the outermost project.
    pub fn is_imported(&self) -> bool {
        self.is_imported
    }

    pub fn is_global_property(&self) -> bool {
        self.kind == PropertyKind::Global
    }

    pub fn is_environment_property(&self) -> bool {
        self.kind == PropertyKind::Environment
    }

    pub fn is_reserved_property(&self) -> bool {
        self.kind == PropertyKind::Reserved
    }

    /// This value followed by each predecessor, newest first.
    pub fn history(&self) -> impl Iterator<Item = &ProjectProperty> {
        std::iter::successors(Some(self), |p| p.predecessor())
    }
}

/// Case-insensitive, insertion-ordered map of current property values.
#[derive(Debug, Clone, Default)]
pub struct PropertyDictionary {
    map: IndexMap<String, Arc<ProjectProperty>>,
}

impl PropertyDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten value becomes the predecessor of
    /// the new one.
    pub fn set(&mut self, mut property: ProjectProperty) -> Arc<ProjectProperty> {
        let key = property.name.to_lowercase();
        if property.predecessor.is_none() {
            property.predecessor = self.map.get(&key).cloned();
        }
        let property = Arc::new(property);
        self.map.insert(key, Arc::clone(&property));
        property
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ProjectProperty>> {
        self.map.get(&name.to_lowercase())
    }

    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.evaluated_value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<ProjectProperty>> {
        self.map.shift_remove(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProjectProperty>> {
        self.map.values()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Metadata
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMetadata {
    name: String,
    evaluated_value: String,
    unevaluated_value: String,
    source: Option<XmlSource>,
    predecessor: Option<Arc<ProjectMetadata>>,
    is_imported: bool,
}

impl ProjectMetadata {
    pub fn new(
        name: impl Into<String>,
        unevaluated_value: impl Into<String>,
        evaluated_value: impl Into<String>,
        source: Option<XmlSource>,
        is_imported: bool,
    ) -> Self {
        Self {
            name: name.into(),
            evaluated_value: evaluated_value.into(),
            unevaluated_value: unevaluated_value.into(),
            source,
            predecessor: None,
            is_imported,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluated_value(&self) -> &str {
        &self.evaluated_value
    }

    pub fn unevaluated_value(&self) -> &str {
        &self.unevaluated_value
    }

    pub fn source(&self) -> Option<&XmlSource> {
        self.source.as_ref()
    }

    pub fn predecessor(&self) -> Option<&ProjectMetadata> {
        self.predecessor.as_deref()
    }

    pub fn is_imported(&self) -> bool {
        self.is_imported
    }

    pub fn history(&self) -> impl Iterator<Item = &ProjectMetadata> {
        std::iter::successors(Some(self), |m| m.predecessor())
    }
}

type MetadataTable = IndexMap<String, Arc<ProjectMetadata>>;

fn insert_metadata(
    table: &mut MetadataTable,
    mut metadata: ProjectMetadata,
    fallback: Option<&Arc<ProjectMetadata>>,
) -> Arc<ProjectMetadata> {
    let key = metadata.name.to_lowercase();
    metadata.predecessor = table.get(&key).or(fallback).cloned();
    let metadata = Arc::new(metadata);
    table.insert(key, Arc::clone(&metadata));
    metadata
}

// ─── Item definitions ────────────────────────────────────────────────────────

/// Default metadata for one item type, accumulated from every
/// `<ItemDefinitionGroup>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDefinition {
    item_type: String,
    metadata: MetadataTable,
}

impl ItemDefinition {
    pub fn new(item_type: impl Into<String>) -> Self {
        Self { item_type: item_type.into(), metadata: IndexMap::new() }
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn get_metadata(&self, name: &str) -> Option<&Arc<ProjectMetadata>> {
        self.metadata.get(&name.to_lowercase())
    }

    pub fn get_metadata_value(&self, name: &str) -> Option<&str> {
        self.get_metadata(name).map(|m| m.evaluated_value())
    }

    pub fn set_metadata(&mut self, metadata: ProjectMetadata) -> Arc<ProjectMetadata> {
        insert_metadata(&mut self.metadata, metadata, None)
    }

    pub fn metadata(&self) -> impl Iterator<Item = &Arc<ProjectMetadata>> {
        self.metadata.values()
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }
}

/// Item definitions keyed by item type.
#[derive(Debug, Clone, Default)]
pub struct ItemDefinitionLibrary {
    comparison: NameComparison,
    definitions: IndexMap<String, Arc<ItemDefinition>>,
}

impl ItemDefinitionLibrary {
    pub fn new(comparison: NameComparison) -> Self {
        Self { comparison, definitions: IndexMap::new() }
    }

    pub fn get(&self, item_type: &str) -> Option<&Arc<ItemDefinition>> {
        self.definitions.get(&self.comparison.key(item_type))
    }

    pub fn get_or_insert(&mut self, item_type: &str) -> &mut ItemDefinition {
        let entry = self
            .definitions
            .entry(self.comparison.key(item_type))
            .or_insert_with(|| Arc::new(ItemDefinition::new(item_type)));
        Arc::make_mut(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ItemDefinition>> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Items
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata every item has without declaring it.
pub const WELL_KNOWN_METADATA: &[&str] = &[
    "FullPath",
    "RootDir",
    "Filename",
    "Extension",
    "RelativeDir",
    "Directory",
    "RecursiveDir",
    "Identity",
    "DefiningProjectFullPath",
    "DefiningProjectDirectory",
    "DefiningProjectName",
    "DefiningProjectExtension",
];

pub fn is_well_known_metadata(name: &str) -> bool {
    WELL_KNOWN_METADATA.iter().any(|m| m.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    item_type: String,
    evaluated_include: String,
    unevaluated_include: String,
    metadata: MetadataTable,
    definition: Option<Arc<ItemDefinition>>,
    source: Option<XmlSource>,
    project_directory: PathBuf,
    recursive_dir: Option<String>,
    is_imported: bool,
}

impl ProjectItem {
    pub fn new(
        item_type: impl Into<String>,
        evaluated_include: impl Into<String>,
        unevaluated_include: impl Into<String>,
        project_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_type: item_type.into(),
            evaluated_include: evaluated_include.into(),
            unevaluated_include: unevaluated_include.into(),
            metadata: IndexMap::new(),
            definition: None,
            source: None,
            project_directory: project_directory.into(),
            recursive_dir: None,
            is_imported: false,
        }
    }

    pub fn with_definition(mut self, definition: Option<Arc<ItemDefinition>>) -> Self {
        self.definition = definition;
        self
    }

    pub fn with_source(mut self, source: XmlSource, is_imported: bool) -> Self {
        self.source = Some(source);
        self.is_imported = is_imported;
        self
    }

    /// Portion of the path matched by a `**` wildcard.
    pub fn with_recursive_dir(mut self, recursive_dir: Option<String>) -> Self {
        self.recursive_dir = recursive_dir;
        self
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn evaluated_include(&self) -> &str {
        &self.evaluated_include
    }

    pub fn unevaluated_include(&self) -> &str {
        &self.unevaluated_include
    }

    pub fn source(&self) -> Option<&XmlSource> {
        self.source.as_ref()
    }

    pub fn is_imported(&self) -> bool {
        self.is_imported
    }

    pub fn definition(&self) -> Option<&Arc<ItemDefinition>> {
        self.definition.as_ref()
    }

    /// Metadata set on the item itself, in the order it was set.
    pub fn direct_metadata(&self) -> impl Iterator<Item = &Arc<ProjectMetadata>> {
        self.metadata.values()
    }

    /// Direct metadata first, then definition defaults not overridden.
    pub fn metadata(&self) -> Vec<&Arc<ProjectMetadata>> {
        let mut out: Vec<_> = self.metadata.values().collect();
        if let Some(definition) = &self.definition {
            out.extend(definition.metadata().filter(|m| !self.metadata.contains_key(&m.name().to_lowercase())));
        }
        out
    }

    /// Declared metadata: the item's own value, else its definition's.
    pub fn get_metadata(&self, name: &str) -> Option<&Arc<ProjectMetadata>> {
        let key = name.to_lowercase();
        self.metadata
            .get(&key)
            .or_else(|| self.definition.as_ref().and_then(|d| d.metadata.get(&key)))
    }

    /// Value of declared or well-known metadata; empty when undefined.
    pub fn get_metadata_value(&self, name: &str) -> String {
        if let Some(m) = self.get_metadata(name) {
            return m.evaluated_value().to_string();
        }
        self.well_known_metadata(name).unwrap_or_default()
    }

    pub fn has_metadata(&self, name: &str) -> bool {
        self.get_metadata(name).is_some() || is_well_known_metadata(name)
    }

    /// Set item metadata; the replaced value, or the definition default,
    /// becomes the predecessor.
    pub fn set_metadata(&mut self, metadata: ProjectMetadata) -> Arc<ProjectMetadata> {
        let key = metadata.name().to_lowercase();
        let fallback = self.definition.as_ref().and_then(|d| d.metadata.get(&key)).cloned();
        insert_metadata(&mut self.metadata, metadata, fallback.as_ref())
    }

    /// Copy every piece of metadata, direct and inherited, onto `self`.
    pub fn copy_metadata_from(&mut self, other: &ProjectItem) {
        for m in other.metadata() {
            self.metadata.insert(m.name().to_lowercase(), Arc::clone(m));
        }
    }

    pub fn remove_metadata(&mut self, name: &str) -> Option<Arc<ProjectMetadata>> {
        self.metadata.shift_remove(&name.to_lowercase())
    }

    pub fn clear_metadata(&mut self) {
        self.metadata.clear();
        self.definition = None;
    }

    pub fn full_path(&self) -> PathBuf {
        crate::imports::normalize_path(&self.project_directory.join(&self.evaluated_include))
    }

    fn well_known_metadata(&self, name: &str) -> Option<String> {
        let include = Path::new(&self.evaluated_include);
        let full_path = self.full_path();
        let defining = self.source.as_ref().and_then(|s| s.file.as_deref());
        let value = match name.to_ascii_lowercase().as_str() {
            "identity" => self.evaluated_include.clone(),
            "fullpath" => full_path.display().to_string(),
            "rootdir" => root_of(&full_path),
            "filename" => file_stem(include),
            "extension" => extension(include),
            "relativedir" => {
                let spec = self.evaluated_include.as_str();
                match spec.rfind(['/', '\\']) {
                    Some(i) => spec[..=i].to_string(),
                    None => String::new(),
                }
            }
            "directory" => {
                let root = root_of(&full_path);
                let dir = full_path.parent().map(with_trailing_separator).unwrap_or_default();
                dir.strip_prefix(&root).unwrap_or(&dir).to_string()
            }
            "recursivedir" => self.recursive_dir.clone().unwrap_or_default(),
            "definingprojectfullpath" => defining.map(|p| p.display().to_string()).unwrap_or_default(),
            "definingprojectdirectory" => {
                defining.and_then(Path::parent).map(with_trailing_separator).unwrap_or_default()
            }
            "definingprojectname" => defining.map(file_stem).unwrap_or_default(),
            "definingprojectextension" => defining.map(extension).unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default()
}

fn root_of(path: &Path) -> String {
    let root: PathBuf = path
        .components()
        .take_while(|c| matches!(c, std::path::Component::Prefix(_) | std::path::Component::RootDir))
        .collect();
    root.display().to_string()
}

pub(crate) fn with_trailing_separator(path: &Path) -> String {
    let mut s = path.display().to_string();
    if !s.ends_with(['/', '\\']) {
        s.push(std::path::MAIN_SEPARATOR);
    }
    s
}

/// Items grouped by type, each group in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct ItemDictionary {
    comparison: NameComparison,
    lists: IndexMap<String, Vec<Arc<ProjectItem>>>,
}

impl ItemDictionary {
    pub fn new(comparison: NameComparison) -> Self {
        Self { comparison, lists: IndexMap::new() }
    }

    pub fn comparison(&self) -> NameComparison {
        self.comparison
    }

    pub fn add(&mut self, item: ProjectItem) -> Arc<ProjectItem> {
        let item = Arc::new(item);
        self.lists
            .entry(self.comparison.key(item.item_type()))
            .or_default()
            .push(Arc::clone(&item));
        item
    }

    /// Items of one type. Under case-sensitive comparison a differently
    /// cased name finds nothing.
    pub fn get(&self, item_type: &str) -> &[Arc<ProjectItem>] {
        self.lists
            .get(&self.comparison.key(item_type))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get_mut(&mut self, item_type: &str) -> Option<&mut Vec<Arc<ProjectItem>>> {
        self.lists.get_mut(&self.comparison.key(item_type))
    }

    /// Drop items of `item_type` matching `predicate`; returns how many.
    pub fn remove_where(&mut self, item_type: &str, predicate: impl Fn(&ProjectItem) -> bool) -> usize {
        let Some(list) = self.get_mut(item_type) else {
            return 0;
        };
        let before = list.len();
        list.retain(|item| !predicate(item));
        before - list.len()
    }

    pub fn item_types(&self) -> impl Iterator<Item = &str> {
        self.lists.iter().filter(|(_, v)| !v.is_empty()).filter_map(|(_, v)| v.first().map(|i| i.item_type()))
    }

    /// Every item, grouped by type.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProjectItem>> {
        self.lists.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn src(line: u32) -> XmlSource {
        XmlSource::new(Some(Path::new("/p/a.proj")), ElementLocation { line, column: 5 })
    }

    #[test]
    fn overwrite_links_predecessor() {
        let mut props = PropertyDictionary::new();
        props.set(ProjectProperty::from_xml("p", "1", "1", src(1), false));
        props.set(ProjectProperty::from_xml("P", "2", "2", src(2), false));
        let current = props.get("p").unwrap();
        assert_eq!(current.evaluated_value(), "2");
        assert_eq!(current.name(), "P");
        let values: Vec<_> = current.history().map(|p| p.evaluated_value()).collect();
        assert_eq!(values, ["2", "1"]);
        assert!(current.predecessor().unwrap().predecessor().is_none());
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn initial_properties_have_no_source() {
        let mut props = PropertyDictionary::new();
        props.set(ProjectProperty::initial("Path", "/bin", PropertyKind::Environment));
        let p = props.get("PATH").unwrap();
        assert!(p.source().is_none());
        assert!(p.is_environment_property());
        assert_eq!(p.unevaluated_value(), "/bin");
        assert!(props.remove("path").is_some());
        assert!(props.is_empty());
    }

    #[test]
    fn item_metadata_falls_back_to_definition() {
        let mut lib = ItemDefinitionLibrary::new(NameComparison::CaseInsensitive);
        lib.get_or_insert("i").set_metadata(ProjectMetadata::new("m", "1", "1", Some(src(2)), false));
        let mut item = ProjectItem::new("i", "a.cs", "a.cs", "/p").with_definition(lib.get("I").cloned());
        assert_eq!(item.get_metadata_value("M"), "1");

        item.set_metadata(ProjectMetadata::new("m", "2;%(m)", "2;1", Some(src(5)), false));
        item.set_metadata(ProjectMetadata::new("m", "3;%(m)", "3;2;1", Some(src(6)), false));
        let m = item.get_metadata("m").unwrap();
        let chain: Vec<_> = m.history().map(|m| m.evaluated_value()).collect();
        assert_eq!(chain, ["3;2;1", "2;1", "1"]);
        assert_eq!(item.metadata().len(), 1);
    }

    #[test]
    fn well_known_metadata() {
        let item = ProjectItem::new("Compile", "src/sub/a.cs", "src/**/*.cs", "/p")
            .with_source(src(3), false)
            .with_recursive_dir(Some("sub/".into()));
        assert_eq!(item.get_metadata_value("Filename"), "a");
        assert_eq!(item.get_metadata_value("Extension"), ".cs");
        assert_eq!(item.get_metadata_value("RelativeDir"), "src/sub/");
        assert_eq!(item.get_metadata_value("Identity"), "src/sub/a.cs");
        assert_eq!(item.get_metadata_value("RecursiveDir"), "sub/");
        assert_eq!(item.get_metadata_value("DefiningProjectName"), "a");
        assert_eq!(item.get_metadata_value("DefiningProjectExtension"), ".proj");
        assert_eq!(item.get_metadata_value("Nope"), "");
        assert!(item.has_metadata("fullpath"));
        if cfg!(unix) {
            assert_eq!(item.get_metadata_value("FullPath"), "/p/src/sub/a.cs");
            assert_eq!(item.get_metadata_value("RootDir"), "/");
            assert_eq!(item.get_metadata_value("Directory"), "p/src/sub/");
        }
    }

    #[test]
    fn item_dictionary_comparison() {
        let mut items = ItemDictionary::new(NameComparison::CaseInsensitive);
        items.add(ProjectItem::new("Compile", "a", "a", "/p"));
        items.add(ProjectItem::new("compile", "b", "b", "/p"));
        assert_eq!(items.get("COMPILE").len(), 2);
        assert_eq!(items.item_types().collect::<Vec<_>>(), ["Compile"]);

        let mut items = ItemDictionary::new(NameComparison::CaseSensitive);
        items.add(ProjectItem::new("Compile", "a", "a", "/p"));
        assert!(items.get("compile").is_empty());
        assert_eq!(items.remove_where("Compile", |i| i.evaluated_include() == "a"), 1);
        assert!(items.is_empty());
    }

    #[test]
    fn copy_metadata_includes_inherited() {
        let mut def = ItemDefinition::new("i");
        def.set_metadata(ProjectMetadata::new("d", "x", "x", None, false));
        let mut a = ProjectItem::new("i", "a", "a", "/p").with_definition(Some(Arc::new(def)));
        a.set_metadata(ProjectMetadata::new("m", "y", "y", None, false));
        let mut b = ProjectItem::new("j", "a", "@(i)", "/p");
        b.copy_metadata_from(&a);
        assert_eq!(b.get_metadata_value("d"), "x");
        assert_eq!(b.get_metadata_value("m"), "y");
        b.clear_metadata();
        assert_eq!(b.get_metadata_value("m"), "");
    }
}
