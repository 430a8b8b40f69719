//! Parsed project tree.
//!
//! Reading is done by walking a `roxmltree` document into fully owned types,
//! so a parsed [`ProjectRootElement`] can be cached and shared between
//! evaluations. Every element keeps its line/column for error reporting.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::ProjectError;

// ═══════════════════════════════════════════════════════════════════════════════
//  Type definitions
// ═══════════════════════════════════════════════════════════════════════════════

/// 1-based position of an element's start tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ElementLocation {
    pub line: u32,
    pub column: u32,
}

// ─── ProjectRootElement ──────────────────────────────────────────────────────

/// Root of a project file (`<Project>`).
#[derive(Debug, Clone)]
pub struct ProjectRootElement {
    full_path: Option<PathBuf>,
    directory: PathBuf,
    last_write_time: Option<SystemTime>,
    pub sdk: Option<String>,
    pub default_targets: Option<String>,
    pub initial_targets: Option<String>,
    pub treat_as_local_property: Option<String>,
    pub tools_version: Option<String>,
    pub children: Vec<ProjectElement>,
    pub location: ElementLocation,
}

/// Direct child of `<Project>`, `<When>` or `<Otherwise>`.
#[derive(Debug, Clone)]
pub enum ProjectElement {
    PropertyGroup(PropertyGroupElement),
    ItemGroup(ItemGroupElement),
    ItemDefinitionGroup(ItemDefinitionGroupElement),
    Import(ImportElement),
    ImportGroup(ImportGroupElement),
    Choose(ChooseElement),
    Sdk(SdkElement),
    Target(TargetElement),
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PropertyGroupElement {
    pub condition: Option<String>,
    pub properties: Vec<PropertyElement>,
    pub location: ElementLocation,
}

/// `<Name Condition="...">value</Name>` inside a `<PropertyGroup>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyElement {
    pub name: String,
    pub value: String,
    pub condition: Option<String>,
    pub location: ElementLocation,
}

// ─── Items ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ItemGroupElement {
    pub condition: Option<String>,
    pub items: Vec<ItemElement>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemElement {
    pub item_type: String,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub remove: Option<String>,
    pub update: Option<String>,
    pub condition: Option<String>,
    pub metadata: Vec<MetadataElement>,
    pub location: ElementLocation,
}

/// Metadata declared either as a child element or as an attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataElement {
    pub name: String,
    pub value: String,
    pub condition: Option<String>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default)]
pub struct ItemDefinitionGroupElement {
    pub condition: Option<String>,
    pub definitions: Vec<ItemDefinitionElement>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default)]
pub struct ItemDefinitionElement {
    pub item_type: String,
    pub condition: Option<String>,
    pub metadata: Vec<MetadataElement>,
    pub location: ElementLocation,
}

// ─── Imports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportElement {
    pub project: String,
    pub condition: Option<String>,
    pub sdk: Option<String>,
    pub version: Option<String>,
    pub minimum_version: Option<String>,
    /// Synthesized from a project `Sdk` attribute or an `<Sdk>` element.
    pub implicit: bool,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default)]
pub struct ImportGroupElement {
    pub condition: Option<String>,
    pub imports: Vec<ImportElement>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkElement {
    pub name: String,
    pub version: Option<String>,
    pub minimum_version: Option<String>,
    pub location: ElementLocation,
}

// ─── Choose ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ChooseElement {
    pub whens: Vec<WhenElement>,
    pub otherwise: Option<OtherwiseElement>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default)]
pub struct WhenElement {
    pub condition: String,
    pub children: Vec<ProjectElement>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone, Default)]
pub struct OtherwiseElement {
    pub children: Vec<ProjectElement>,
    pub location: ElementLocation,
}

// ─── Targets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TargetElement {
    pub name: String,
    pub condition: Option<String>,
    pub depends_on_targets: Option<String>,
    pub before_targets: Option<String>,
    pub after_targets: Option<String>,
    pub inputs: Option<String>,
    pub outputs: Option<String>,
    pub returns: Option<String>,
    pub children: Vec<TargetChild>,
    pub location: ElementLocation,
}

#[derive(Debug, Clone)]
pub enum TargetChild {
    PropertyGroup(PropertyGroupElement),
    ItemGroup(ItemGroupElement),
    /// Any other element; opaque to evaluation.
    Task(TaskElement),
}

#[derive(Debug, Clone, Default)]
pub struct TaskElement {
    pub name: String,
    pub condition: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub location: ElementLocation,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectRootElement – loading
// ═══════════════════════════════════════════════════════════════════════════════

impl ProjectRootElement {
    /// Parse a project from its XML source without a backing file. Relative
    /// paths resolve against the current directory.
    pub fn parse(source: &str) -> Result<Self, ProjectError> {
        let directory = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::parse_in(source, None, directory)
    }

    /// Parse a project from its XML source as if it lived at `path`.
    pub fn parse_with_path(source: &str, path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let full_path = crate::imports::absolute_path(path.as_ref());
        let directory = full_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse_in(source, Some(full_path), directory)
    }

    /// Load a project file from disk, capturing its last-write-time.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ProjectError::import("MSB4025", format!("The project file could not be loaded. {e}"))
                .in_file(path)
        })?;
        let mut root = Self::parse_with_path(&source, path)?;
        root.last_write_time = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(root)
    }

    fn parse_in(source: &str, full_path: Option<PathBuf>, directory: PathBuf) -> Result<Self, ProjectError> {
        let with_file = |e: ProjectError| match &full_path {
            Some(p) => e.in_file(p),
            None => e,
        };
        let doc = roxmltree::Document::parse(source).map_err(|e| with_file(e.into()))?;
        let root = doc.root_element();
        let parser = TreeParser { doc: &doc };
        let mut project = parser.parse_project(root).map_err(with_file)?;
        project.full_path = full_path;
        project.directory = directory;
        Ok(project)
    }

    /// Absolute path of the backing file, if any.
    pub fn full_path(&self) -> Option<&Path> {
        self.full_path.as_deref()
    }

    /// Directory against which relative paths in this file resolve.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn last_write_time(&self) -> Option<SystemTime> {
        self.last_write_time
    }

    /// Every `<Import>` in the file, including those inside `<ImportGroup>`s.
    pub fn imports(&self) -> Vec<&ImportElement> {
        let mut out = Vec::new();
        for child in &self.children {
            match child {
                ProjectElement::Import(import) => out.push(import),
                ProjectElement::ImportGroup(group) => out.extend(group.imports.iter()),
                _ => {}
            }
        }
        out
    }

    pub fn property_groups(&self) -> impl Iterator<Item = &PropertyGroupElement> {
        self.children.iter().filter_map(|c| match c {
            ProjectElement::PropertyGroup(pg) => Some(pg),
            _ => None,
        })
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetElement> {
        self.children.iter().filter_map(|c| match c {
            ProjectElement::Target(t) => Some(t),
            _ => None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Parsing – roxmltree → owned types
// ═══════════════════════════════════════════════════════════════════════════════

const ITEM_RESERVED_ATTRIBUTES: &[&str] = &[
    "Include",
    "Exclude",
    "Remove",
    "Update",
    "Condition",
    "KeepMetadata",
    "RemoveMetadata",
    "KeepDuplicates",
    "MatchOnMetadata",
    "MatchOnMetadataOptions",
    "Label",
];

struct TreeParser<'d, 'input> {
    doc: &'d roxmltree::Document<'input>,
}

impl TreeParser<'_, '_> {
    fn location(&self, node: &roxmltree::Node) -> ElementLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        ElementLocation { line: pos.row, column: pos.col }
    }

    fn unexpected(&self, node: &roxmltree::Node, parent: &str) -> ProjectError {
        let loc = self.location(node);
        ProjectError::syntax(
            "MSB4067",
            format!(
                "The element <{}> beneath element <{parent}> is unrecognized.",
                node.tag_name().name()
            ),
        )
        .at(None, loc.line, loc.column)
    }

    fn missing_attribute(&self, node: &roxmltree::Node, attribute: &str) -> ProjectError {
        let loc = self.location(node);
        ProjectError::syntax(
            "MSB4035",
            format!(
                "The required attribute \"{attribute}\" is empty or missing from the element <{}>.",
                node.tag_name().name()
            ),
        )
        .at(None, loc.line, loc.column)
    }

    fn parse_project(&self, root: roxmltree::Node) -> Result<ProjectRootElement, ProjectError> {
        if root.tag_name().name() != "Project" {
            let loc = self.location(&root);
            return Err(ProjectError::syntax(
                "MSB4068",
                format!("The element <{}> is unrecognized as a project root.", root.tag_name().name()),
            )
            .at(None, loc.line, loc.column));
        }

        let mut project = ProjectRootElement {
            full_path: None,
            directory: PathBuf::new(),
            last_write_time: None,
            sdk: attr(&root, "Sdk"),
            default_targets: attr(&root, "DefaultTargets"),
            initial_targets: attr(&root, "InitialTargets"),
            treat_as_local_property: attr(&root, "TreatAsLocalProperty"),
            tools_version: attr(&root, "ToolsVersion"),
            children: Vec::new(),
            location: self.location(&root),
        };

        for child in root.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "ProjectExtensions" | "UsingTask" => {}
                "Import" => project.children.push(ProjectElement::Import(self.parse_import(&child)?)),
                "ImportGroup" => {
                    project.children.push(ProjectElement::ImportGroup(self.parse_import_group(&child)?))
                }
                "Sdk" => project.children.push(ProjectElement::Sdk(self.parse_sdk(&child)?)),
                "Target" => project.children.push(ProjectElement::Target(self.parse_target(&child)?)),
                "ItemDefinitionGroup" => project
                    .children
                    .push(ProjectElement::ItemDefinitionGroup(self.parse_item_definition_group(&child)?)),
                _ => project.children.push(self.parse_common(&child, "Project")?),
            }
        }

        Ok(project)
    }

    /// Elements allowed both under `<Project>` and under `<When>`/`<Otherwise>`.
    fn parse_common(&self, node: &roxmltree::Node, parent: &str) -> Result<ProjectElement, ProjectError> {
        match node.tag_name().name() {
            "PropertyGroup" => Ok(ProjectElement::PropertyGroup(self.parse_property_group(node)?)),
            "ItemGroup" => Ok(ProjectElement::ItemGroup(self.parse_item_group(node, true)?)),
            "Choose" => Ok(ProjectElement::Choose(self.parse_choose(node)?)),
            _ => Err(self.unexpected(node, parent)),
        }
    }

    fn parse_property_group(&self, node: &roxmltree::Node) -> Result<PropertyGroupElement, ProjectError> {
        let mut pg = PropertyGroupElement {
            condition: attr(node, "Condition"),
            properties: Vec::new(),
            location: self.location(node),
        };
        for child in node.children().filter(|n| n.is_element()) {
            pg.properties.push(PropertyElement {
                name: child.tag_name().name().to_string(),
                value: element_text(&child),
                condition: attr(&child, "Condition"),
                location: self.location(&child),
            });
        }
        Ok(pg)
    }

    fn parse_item_group(&self, node: &roxmltree::Node, require_operation: bool) -> Result<ItemGroupElement, ProjectError> {
        let mut ig = ItemGroupElement {
            condition: attr(node, "Condition"),
            items: Vec::new(),
            location: self.location(node),
        };
        for child in node.children().filter(|n| n.is_element()) {
            let item = ItemElement {
                item_type: child.tag_name().name().to_string(),
                include: attr(&child, "Include"),
                exclude: attr(&child, "Exclude"),
                remove: attr(&child, "Remove"),
                update: attr(&child, "Update"),
                condition: attr(&child, "Condition"),
                metadata: self.parse_metadata(&child, ITEM_RESERVED_ATTRIBUTES),
                location: self.location(&child),
            };
            if require_operation && item.include.is_none() && item.remove.is_none() && item.update.is_none() {
                return Err(self.missing_attribute(&child, "Include"));
            }
            ig.items.push(item);
        }
        Ok(ig)
    }

    fn parse_item_definition_group(&self, node: &roxmltree::Node) -> Result<ItemDefinitionGroupElement, ProjectError> {
        let mut idg = ItemDefinitionGroupElement {
            condition: attr(node, "Condition"),
            definitions: Vec::new(),
            location: self.location(node),
        };
        for child in node.children().filter(|n| n.is_element()) {
            idg.definitions.push(ItemDefinitionElement {
                item_type: child.tag_name().name().to_string(),
                condition: attr(&child, "Condition"),
                metadata: self.parse_metadata(&child, &["Condition", "Label"]),
                location: self.location(&child),
            });
        }
        Ok(idg)
    }

    /// Attribute metadata first (document order of attributes), then child
    /// element metadata.
    fn parse_metadata(&self, node: &roxmltree::Node, reserved: &[&str]) -> Vec<MetadataElement> {
        let location = self.location(node);
        let mut metadata: Vec<MetadataElement> = node
            .attributes()
            .filter(|a| a.namespace().is_none() && !reserved.contains(&a.name()))
            .map(|a| MetadataElement {
                name: a.name().to_string(),
                value: a.value().to_string(),
                condition: None,
                location,
            })
            .collect();
        for child in node.children().filter(|n| n.is_element()) {
            metadata.push(MetadataElement {
                name: child.tag_name().name().to_string(),
                value: element_text(&child),
                condition: attr(&child, "Condition"),
                location: self.location(&child),
            });
        }
        metadata
    }

    fn parse_import(&self, node: &roxmltree::Node) -> Result<ImportElement, ProjectError> {
        let Some(project) = attr(node, "Project") else {
            return Err(self.missing_attribute(node, "Project"));
        };
        Ok(ImportElement {
            project,
            condition: attr(node, "Condition"),
            sdk: attr(node, "Sdk"),
            version: attr(node, "Version"),
            minimum_version: attr(node, "MinimumVersion"),
            implicit: false,
            location: self.location(node),
        })
    }

    fn parse_import_group(&self, node: &roxmltree::Node) -> Result<ImportGroupElement, ProjectError> {
        let mut group = ImportGroupElement {
            condition: attr(node, "Condition"),
            imports: Vec::new(),
            location: self.location(node),
        };
        for child in node.children().filter(|n| n.is_element()) {
            if child.tag_name().name() != "Import" {
                return Err(self.unexpected(&child, "ImportGroup"));
            }
            group.imports.push(self.parse_import(&child)?);
        }
        Ok(group)
    }

    fn parse_sdk(&self, node: &roxmltree::Node) -> Result<SdkElement, ProjectError> {
        let Some(name) = attr(node, "Name") else {
            return Err(self.missing_attribute(node, "Name"));
        };
        Ok(SdkElement {
            name,
            version: attr(node, "Version"),
            minimum_version: attr(node, "MinimumVersion"),
            location: self.location(node),
        })
    }

    fn parse_choose(&self, node: &roxmltree::Node) -> Result<ChooseElement, ProjectError> {
        let mut choose = ChooseElement { location: self.location(node), ..Default::default() };
        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "When" if choose.otherwise.is_none() => {
                    let Some(condition) = attr(&child, "Condition") else {
                        return Err(self.missing_attribute(&child, "Condition"));
                    };
                    choose.whens.push(WhenElement {
                        condition,
                        children: self.parse_branch(&child, "When")?,
                        location: self.location(&child),
                    });
                }
                "Otherwise" if choose.otherwise.is_none() => {
                    choose.otherwise = Some(OtherwiseElement {
                        children: self.parse_branch(&child, "Otherwise")?,
                        location: self.location(&child),
                    });
                }
                _ => return Err(self.unexpected(&child, "Choose")),
            }
        }
        if choose.whens.is_empty() {
            let loc = choose.location;
            return Err(ProjectError::syntax("MSB4076", "The <Choose> element must contain at least one <When>.")
                .at(None, loc.line, loc.column));
        }
        Ok(choose)
    }

    fn parse_branch(&self, node: &roxmltree::Node, name: &str) -> Result<Vec<ProjectElement>, ProjectError> {
        node.children()
            .filter(|n| n.is_element())
            .map(|child| self.parse_common(&child, name))
            .collect()
    }

    fn parse_target(&self, node: &roxmltree::Node) -> Result<TargetElement, ProjectError> {
        let Some(name) = attr(node, "Name") else {
            return Err(self.missing_attribute(node, "Name"));
        };
        let mut target = TargetElement {
            name,
            condition: attr(node, "Condition"),
            depends_on_targets: attr(node, "DependsOnTargets"),
            before_targets: attr(node, "BeforeTargets"),
            after_targets: attr(node, "AfterTargets"),
            inputs: attr(node, "Inputs"),
            outputs: attr(node, "Outputs"),
            returns: attr(node, "Returns"),
            children: Vec::new(),
            location: self.location(node),
        };
        for child in node.children().filter(|n| n.is_element()) {
            let parsed = match child.tag_name().name() {
                "PropertyGroup" => TargetChild::PropertyGroup(self.parse_property_group(&child)?),
                "ItemGroup" => TargetChild::ItemGroup(self.parse_item_group(&child, false)?),
                other => TargetChild::Task(TaskElement {
                    name: other.to_string(),
                    condition: attr(&child, "Condition"),
                    attributes: child
                        .attributes()
                        .filter(|a| a.name() != "Condition")
                        .map(|a| (a.name().to_string(), a.value().to_string()))
                        .collect(),
                    location: self.location(&child),
                }),
            };
            target.children.push(parsed);
        }
        Ok(target)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn attr(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.attribute(name).map(String::from)
}

/// Concatenated text of an element's direct text children.
fn element_text(node: &roxmltree::Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
