//! Staged evaluation of a project and everything it imports.
//!
//! Evaluation runs in passes over the full import closure:
//!
//! 0. initial properties: environment, toolset, sub-toolset, global, reserved
//! 1. properties, imports, `<Choose>` and targets, in document order
//! 2. item definitions
//! 3. items
//!
//! Item definition groups and item groups met during pass 1 are queued and
//! evaluated later against the final property values. The result is built
//! from scratch each time and only handed back once every pass succeeded.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cache::ProjectRootElementCache;
use crate::condition::ConditionEvaluator;
use crate::config::{EvaluationConfig, LoadSettings};
use crate::environment::environment_properties;
use crate::error::{ErrorKind, ProjectError};
use crate::events::{EvaluationEvent, EvaluationLogger, EventLocation, ImportIgnoredReason};
use crate::expander::{Expander, IncludeFragment, MetadataLookup, PropertyLookup};
use crate::imports::{
    fix_separators, glob_files, has_wildcards, normalize_path, pattern_text, wildcard_directory, ImportDisposition,
    ImportResolution, ImportResolver, ImportTracker, ResolvedImport,
};
use crate::properties::{
    with_trailing_separator, ItemDefinition, ItemDefinitionLibrary, ItemDictionary, ProjectItem, ProjectMetadata,
    ProjectProperty, PropertyDictionary, PropertyKind, XmlSource,
};
use crate::sdk::{SdkReference, SdkResolverChain, SdkResult};
use crate::shredder::{
    contains_metadata_expression_outside_transform, get_referenced_item_names_and_metadata, is_valid_name,
    split_semicolon_separated_list,
};
use crate::toolset::{Toolset, SUB_TOOLSET_SELECTOR};
use crate::xml::{
    ChooseElement, ElementLocation, ImportElement, ItemElement, ItemGroupElement, ItemDefinitionGroupElement,
    MetadataElement, ProjectElement, ProjectRootElement, PropertyElement, TargetChild, TargetElement,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Reserved properties
// ═══════════════════════════════════════════════════════════════════════════════

/// Properties the engine defines; assigning one is an error.
pub const RESERVED_PROPERTY_NAMES: &[&str] = &[
    "MSBuildProjectDirectory",
    "MSBuildProjectDirectoryNoRoot",
    "MSBuildProjectFile",
    "MSBuildProjectExtension",
    "MSBuildProjectFullPath",
    "MSBuildProjectName",
    "MSBuildThisFile",
    "MSBuildThisFileDirectory",
    "MSBuildThisFileDirectoryNoRoot",
    "MSBuildThisFileExtension",
    "MSBuildThisFileFullPath",
    "MSBuildThisFileName",
    "MSBuildToolsVersion",
    "MSBuildToolsPath",
    "MSBuildBinPath",
    "MSBuildStartupDirectory",
];

pub fn is_reserved_property_name(name: &str) -> bool {
    RESERVED_PROPERTY_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Inputs and outputs
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything an evaluation reads besides the project tree.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub global_properties: &'a IndexMap<String, String>,
    pub environment: &'a HashMap<String, String>,
    pub toolset: Option<&'a Toolset>,
    pub sdk_resolvers: &'a SdkResolverChain,
    pub cache: &'a ProjectRootElementCache,
    pub config: &'a EvaluationConfig,
    pub load_settings: LoadSettings,
    pub logger: &'a dyn EvaluationLogger,
}

/// A `<Target>` as it stands after evaluation: the last definition wins.
#[derive(Debug, Clone)]
pub struct ProjectTarget {
    pub element: TargetElement,
    pub file: Arc<ProjectRootElement>,
    pub is_imported: bool,
}

impl ProjectTarget {
    pub fn name(&self) -> &str {
        &self.element.name
    }

    pub fn full_path(&self) -> Option<&Path> {
        self.file.full_path()
    }
}

#[derive(Debug, Clone)]
pub struct EvaluatedProject {
    pub properties: PropertyDictionary,
    /// Every assignment in evaluation order, initial properties first.
    pub all_evaluated_properties: Vec<Arc<ProjectProperty>>,
    pub items: ItemDictionary,
    pub all_evaluated_items: Vec<Arc<ProjectItem>>,
    pub item_definitions: ItemDefinitionLibrary,
    pub all_evaluated_item_definition_metadata: Vec<Arc<ProjectMetadata>>,
    pub imports: Vec<ResolvedImport>,
    pub imports_including_duplicates: Vec<ResolvedImport>,
    pub targets: IndexMap<String, ProjectTarget>,
    pub default_targets: Vec<String>,
    pub initial_targets: Vec<String>,
}

impl EvaluatedProject {
    pub(crate) fn new(config: &EvaluationConfig) -> Self {
        Self {
            properties: PropertyDictionary::new(),
            all_evaluated_properties: Vec::new(),
            items: ItemDictionary::new(config.item_name_comparison),
            all_evaluated_items: Vec::new(),
            item_definitions: ItemDefinitionLibrary::new(config.item_name_comparison),
            all_evaluated_item_definition_metadata: Vec::new(),
            imports: Vec::new(),
            imports_including_duplicates: Vec::new(),
            targets: IndexMap::new(),
            default_targets: Vec::new(),
            initial_targets: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Entry points
// ═══════════════════════════════════════════════════════════════════════════════

pub fn evaluate(root: Arc<ProjectRootElement>, ctx: &EvaluationContext<'_>) -> Result<EvaluatedProject, ProjectError> {
    let conditions = ConditionEvaluator::new();
    let mut evaluator = Evaluator::new(Arc::clone(&root), ctx, &conditions);

    evaluator.set_initial_properties()?;
    let root_ctx = FileContext { file: root, is_imported: false, in_target: false };
    evaluator.evaluate_file(&root_ctx)?;
    evaluator.finish_targets()?;
    evaluator.evaluate_item_definitions()?;
    evaluator.evaluate_items()?;

    let result = evaluator.result;
    tracing::debug!(
        project = ?root_ctx.file.full_path(),
        properties = result.properties.len(),
        items = result.items.len(),
        imports = result.imports.len(),
        targets = result.targets.len(),
        "evaluation complete"
    );
    Ok(result)
}

/// Apply the `<PropertyGroup>`/`<ItemGroup>` children of `target_name` to
/// copies of the evaluated state. Conditions inside the target resolve
/// paths against the outermost project's directory.
pub fn evaluate_target_intrinsics(
    evaluated: &EvaluatedProject,
    root: &Arc<ProjectRootElement>,
    target_name: &str,
    ctx: &EvaluationContext<'_>,
) -> Result<(PropertyDictionary, ItemDictionary), ProjectError> {
    let Some(target) = evaluated.targets.get(&target_name.to_lowercase()) else {
        return Err(ProjectError::configuration(
            "MSB4057",
            format!("The target \"{target_name}\" does not exist in the project."),
        ));
    };

    let conditions = ConditionEvaluator::new();
    let mut evaluator = Evaluator::new(Arc::clone(root), ctx, &conditions);
    evaluator.result.properties = evaluated.properties.clone();
    evaluator.result.items = evaluated.items.clone();
    evaluator.result.item_definitions = evaluated.item_definitions.clone();
    evaluator.collect_global_names()?;

    let target_ctx = FileContext { file: Arc::clone(&target.file), is_imported: target.is_imported, in_target: true };
    let element = &target.element;
    if evaluator.condition(&target_ctx, element.condition.as_deref(), element.location, None)? {
        for child in &element.children {
            match child {
                TargetChild::PropertyGroup(group) => {
                    if evaluator.condition(&target_ctx, group.condition.as_deref(), group.location, None)? {
                        for property in &group.properties {
                            evaluator.evaluate_property(&target_ctx, property)?;
                        }
                    }
                }
                TargetChild::ItemGroup(group) => evaluator.evaluate_item_group(&target_ctx, group)?,
                TargetChild::Task(_) => {}
            }
        }
    }
    Ok((evaluator.result.properties, evaluator.result.items))
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property lookup during evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// First read of each property that was undefined at the time.
#[derive(Debug, Default)]
struct ReadTracker {
    enabled: bool,
    location: RefCell<EventLocation>,
    first_reads: RefCell<HashMap<String, EventLocation>>,
}

impl ReadTracker {
    fn set_location(&self, file: Option<&Path>, location: ElementLocation) {
        *self.location.borrow_mut() = event_location(file, location);
    }

    fn location(&self) -> EventLocation {
        self.location.borrow().clone()
    }

    fn record(&self, name: &str) {
        if self.enabled {
            let location = self.location();
            self.first_reads.borrow_mut().entry(name.to_lowercase()).or_insert(location);
        }
    }

    fn take(&self, name: &str) -> Option<EventLocation> {
        self.first_reads.borrow_mut().remove(&name.to_lowercase())
    }
}

struct Lookup<'e> {
    properties: &'e PropertyDictionary,
    this_file: &'e ProjectRootElement,
    reads: &'e ReadTracker,
    in_condition: bool,
    environment_reads: Option<&'e dyn EvaluationLogger>,
}

impl PropertyLookup for Lookup<'_> {
    fn get_property_value(&self, name: &str) -> Option<String> {
        if let Some(value) = this_file_property(self.this_file, name) {
            return Some(value);
        }
        match self.properties.get(name) {
            Some(property) => {
                if property.is_environment_property() {
                    if let Some(logger) = self.environment_reads {
                        logger.log(&EvaluationEvent::EnvironmentVariableRead {
                            name: property.name().to_string(),
                            value: property.evaluated_value().to_string(),
                            location: self.reads.location(),
                        });
                    }
                }
                Some(property.evaluated_value().to_string())
            }
            None => {
                if !self.in_condition {
                    self.reads.record(name);
                }
                None
            }
        }
    }
}

/// `MSBuildThisFile*`: always about the file being evaluated.
fn this_file_property(file: &ProjectRootElement, name: &str) -> Option<String> {
    const PREFIX: &str = "msbuildthisfile";
    let lower = name.to_ascii_lowercase();
    let suffix = lower.strip_prefix(PREFIX)?;
    let full_path = file.full_path();
    let text = |s: Option<&std::ffi::OsStr>| s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let value = match suffix {
        "" => text(full_path.and_then(Path::file_name)),
        "name" => text(full_path.and_then(Path::file_stem)),
        "extension" => full_path
            .and_then(Path::extension)
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
        "fullpath" => full_path.map(|p| p.display().to_string()).unwrap_or_default(),
        "directory" => with_trailing_separator(file.directory()),
        "directorynoroot" => {
            let stripped = strip_root(file.directory());
            if stripped.is_empty() { stripped } else { with_trailing_separator(Path::new(&stripped)) }
        }
        _ => return None,
    };
    Some(value)
}

/// `path` without its root or drive.
fn strip_root(path: &Path) -> String {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect();
    relative.display().to_string()
}

fn event_location(file: Option<&Path>, location: ElementLocation) -> EventLocation {
    EventLocation { file: file.map(Path::to_path_buf), line: location.line, column: location.column }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

/// The file whose elements are being evaluated.
#[derive(Debug, Clone)]
struct FileContext {
    file: Arc<ProjectRootElement>,
    is_imported: bool,
    in_target: bool,
}

impl FileContext {
    fn full_path(&self) -> Option<&Path> {
        self.file.full_path()
    }

    fn at(&self, location: ElementLocation) -> impl Fn(ProjectError) -> ProjectError + '_ {
        move |e| e.at(self.full_path(), location.line, location.column)
    }
}

struct Evaluator<'a> {
    ctx: &'a EvaluationContext<'a>,
    root: Arc<ProjectRootElement>,
    conditions: &'a ConditionEvaluator,
    resolver: ImportResolver<'a>,
    tracker: ImportTracker,
    reads: ReadTracker,
    global_names: HashSet<String>,
    local_names: HashSet<String>,
    default_targets: Option<String>,
    initial_targets: Vec<String>,
    pending_definitions: Vec<(FileContext, ItemDefinitionGroupElement)>,
    pending_items: Vec<(FileContext, ItemGroupElement)>,
    result: EvaluatedProject,
}

impl<'a> Evaluator<'a> {
    fn new(root: Arc<ProjectRootElement>, ctx: &'a EvaluationContext<'a>, conditions: &'a ConditionEvaluator) -> Self {
        let resolver = ImportResolver::new(ctx.sdk_resolvers, ctx.toolset, ctx.load_settings, conditions, ctx.logger);
        Self {
            ctx,
            tracker: ImportTracker::new(root.full_path()),
            root,
            conditions,
            resolver,
            reads: ReadTracker { enabled: ctx.config.warn_on_uninitialized_property, ..ReadTracker::default() },
            global_names: HashSet::new(),
            local_names: HashSet::new(),
            default_targets: None,
            initial_targets: Vec::new(),
            pending_definitions: Vec::new(),
            pending_items: Vec::new(),
            result: EvaluatedProject::new(ctx.config),
        }
    }

    fn lookup<'s>(&'s self, file: &'s FileContext, in_condition: bool) -> Lookup<'s> {
        Lookup {
            properties: &self.result.properties,
            this_file: &file.file,
            reads: &self.reads,
            in_condition,
            environment_reads: self.ctx.config.log_environment_reads.then_some(self.ctx.logger),
        }
    }

    fn project_directory(&self) -> &Path {
        self.root.directory()
    }

    /// Evaluate an optional condition; `None` is true.
    fn condition(
        &self,
        file: &FileContext,
        condition: Option<&str>,
        location: ElementLocation,
        metadata: Option<&dyn MetadataLookup>,
    ) -> Result<bool, ProjectError> {
        let Some(condition) = condition else {
            return Ok(true);
        };
        let lookup = self.lookup(file, true);
        // Inside targets, paths resolve against the outermost project.
        let directory = if file.in_target { self.project_directory() } else { file.file.directory() };
        let mut expander = Expander::new(&lookup, directory).with_items(&self.result.items);
        if let Some(metadata) = metadata.filter(|_| contains_metadata_expression_outside_transform(condition)) {
            expander = expander.with_metadata(metadata);
        }
        self.conditions.evaluate(condition, &expander).map_err(file.at(location))
    }

    // ─── Pass 0 ──────────────────────────────────────────────────────────────

    fn set_initial(&mut self, name: &str, value: &str, kind: PropertyKind) {
        let property = self.result.properties.set(ProjectProperty::initial(name, value, kind));
        if self.ctx.config.log_initial_property_values {
            self.ctx.logger.log(&EvaluationEvent::PropertyInitialValueSet {
                property_name: name.to_string(),
                value: value.to_string(),
                source: kind,
                location: None,
            });
        }
        self.result.all_evaluated_properties.push(property);
    }

    fn set_initial_properties(&mut self) -> Result<(), ProjectError> {
        let ctx = self.ctx;
        for (name, value) in environment_properties(ctx.environment) {
            self.set_initial(name, value, PropertyKind::Environment);
        }

        if let Some(toolset) = ctx.toolset {
            for (name, value) in &toolset.properties {
                self.set_initial(name, value, PropertyKind::Toolset);
            }
            let selector = ctx
                .global_properties
                .iter()
                .chain(ctx.environment.iter())
                .find(|(k, _)| k.eq_ignore_ascii_case(SUB_TOOLSET_SELECTOR))
                .map(|(_, v)| v.as_str());
            if let Some((version, properties)) = toolset.sub_toolset(selector) {
                tracing::trace!(version, "applying sub-toolset");
                for (name, value) in properties {
                    self.set_initial(name, value, PropertyKind::SubToolset);
                }
                if !self.result.properties.contains(SUB_TOOLSET_SELECTOR) {
                    self.set_initial(SUB_TOOLSET_SELECTOR, version, PropertyKind::SubToolset);
                }
            }
        }

        for (name, value) in ctx.global_properties {
            self.set_initial(name, value, PropertyKind::Global);
        }

        let root = Arc::clone(&self.root);
        let full_path = root.full_path();
        let os_text = |s: Option<&std::ffi::OsStr>| s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let startup = std::env::current_dir().map(|d| d.display().to_string()).unwrap_or_default();
        let tools_path = ctx.toolset.map(|t| t.tools_path.display().to_string()).unwrap_or_default();
        let reserved = [
            ("MSBuildProjectDirectory", root.directory().display().to_string()),
            ("MSBuildProjectDirectoryNoRoot", strip_root(root.directory())),
            ("MSBuildProjectFile", os_text(full_path.and_then(Path::file_name))),
            (
                "MSBuildProjectExtension",
                full_path.and_then(Path::extension).map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
            ),
            ("MSBuildProjectFullPath", full_path.map(|p| p.display().to_string()).unwrap_or_default()),
            ("MSBuildProjectName", os_text(full_path.and_then(Path::file_stem))),
            ("MSBuildToolsVersion", ctx.toolset.map(|t| t.tools_version.clone()).unwrap_or_else(|| "Current".into())),
            ("MSBuildToolsPath", tools_path.clone()),
            ("MSBuildBinPath", tools_path),
            ("MSBuildStartupDirectory", startup),
        ];
        for (name, value) in &reserved {
            self.set_initial(name, value, PropertyKind::Reserved);
        }

        self.collect_global_names()
    }

    /// Global property names, minus those the project keeps local.
    fn collect_global_names(&mut self) -> Result<(), ProjectError> {
        self.global_names = self.ctx.global_properties.keys().map(|k| k.to_lowercase()).collect();
        let Some(raw) = self.root.treat_as_local_property.clone() else {
            return Ok(());
        };
        let root_ctx = FileContext { file: Arc::clone(&self.root), is_imported: false, in_target: false };
        let expanded = {
            let lookup = self.lookup(&root_ctx, true);
            Expander::new(&lookup, self.project_directory())
                .expand_properties(&raw)
                .map_err(root_ctx.at(self.root.location))?
        };
        for name in expanded.split(';').map(str::trim).filter(|n| !n.is_empty()) {
            if !is_valid_name(name) {
                return Err(ProjectError::configuration(
                    "MSB4228",
                    format!("The name \"{name}\" is not a valid property name in the TreatAsLocalProperty attribute."),
                )
                .at(root_ctx.full_path(), self.root.location.line, self.root.location.column));
            }
            self.local_names.insert(name.to_lowercase());
        }
        Ok(())
    }

    // ─── Pass 1 ──────────────────────────────────────────────────────────────

    fn evaluate_file(&mut self, file: &FileContext) -> Result<(), ProjectError> {
        let root = Arc::clone(&file.file);
        if self.default_targets.is_none() {
            self.default_targets = root.default_targets.clone().filter(|t| !t.trim().is_empty());
        }
        if let Some(initial) = &root.initial_targets {
            self.initial_targets.push(initial.clone());
        }

        let sdks = sdk_imports(&root)?;
        for (props, _) in &sdks {
            self.evaluate_import(file, props)?;
        }
        self.evaluate_elements(file, &root.children)?;
        for (_, targets) in &sdks {
            self.evaluate_import(file, targets)?;
        }
        Ok(())
    }

    fn evaluate_elements(&mut self, file: &FileContext, elements: &[ProjectElement]) -> Result<(), ProjectError> {
        for element in elements {
            match element {
                ProjectElement::PropertyGroup(group) => {
                    if self.condition(file, group.condition.as_deref(), group.location, None)? {
                        for property in &group.properties {
                            self.evaluate_property(file, property)?;
                        }
                    }
                }
                ProjectElement::ItemDefinitionGroup(group) => self.pending_definitions.push((file.clone(), group.clone())),
                ProjectElement::ItemGroup(group) => self.pending_items.push((file.clone(), group.clone())),
                ProjectElement::Import(import) => self.evaluate_import(file, import)?,
                ProjectElement::ImportGroup(group) => {
                    if self.condition(file, group.condition.as_deref(), group.location, None)? {
                        for import in &group.imports {
                            self.evaluate_import(file, import)?;
                        }
                    }
                }
                ProjectElement::Choose(choose) => self.evaluate_choose(file, choose)?,
                ProjectElement::Sdk(_) => {}
                ProjectElement::Target(target) => {
                    self.result.targets.insert(
                        target.name.to_lowercase(),
                        ProjectTarget { element: target.clone(), file: Arc::clone(&file.file), is_imported: file.is_imported },
                    );
                }
            }
        }
        Ok(())
    }

    fn evaluate_choose(&mut self, file: &FileContext, choose: &ChooseElement) -> Result<(), ProjectError> {
        for when in &choose.whens {
            if self.condition(file, Some(when.condition.as_str()), when.location, None)? {
                return self.evaluate_elements(file, &when.children);
            }
        }
        match &choose.otherwise {
            Some(otherwise) => self.evaluate_elements(file, &otherwise.children),
            None => Ok(()),
        }
    }

    fn evaluate_property(&mut self, file: &FileContext, element: &PropertyElement) -> Result<(), ProjectError> {
        if is_reserved_property_name(&element.name) {
            return Err(ProjectError::syntax(
                "MSB4004",
                format!("The \"{}\" property is reserved, and cannot be modified.", element.name),
            )
            .at(file.full_path(), element.location.line, element.location.column));
        }
        if !self.condition(file, element.condition.as_deref(), element.location, None)? {
            return Ok(());
        }

        self.reads.set_location(file.full_path(), element.location);
        let value = {
            let lookup = self.lookup(file, false);
            Expander::new(&lookup, self.project_directory())
                .expand_properties(&element.value)
                .map_err(file.at(element.location))?
        };

        let key = element.name.to_lowercase();
        if self.global_names.contains(&key) && !self.local_names.contains(&key) {
            tracing::trace!(property = %element.name, "global property wins over project assignment");
            return Ok(());
        }

        let source = XmlSource::new(file.full_path(), element.location);
        let write_location = EventLocation::from(&source);
        if let Some(read_location) = self.reads.take(&element.name) {
            // A property reading itself in its first definition is fine.
            if read_location != write_location {
                self.ctx.logger.log(&EvaluationEvent::UninitializedPropertyRead {
                    property_name: element.name.clone(),
                    read_location,
                    write_location: write_location.clone(),
                });
            }
        }

        let previous = self.result.properties.get(&element.name).cloned();
        let property = self.result.properties.set(ProjectProperty::from_xml(
            &element.name,
            &element.value,
            &value,
            source,
            file.is_imported,
        ));
        self.result.all_evaluated_properties.push(property);

        let config = self.ctx.config;
        match previous {
            Some(previous) if previous.kind() == PropertyKind::Project => {
                if config.log_property_reassignment && previous.evaluated_value() != value {
                    self.ctx.logger.log(&EvaluationEvent::PropertyReassignment {
                        property_name: element.name.clone(),
                        previous_value: previous.evaluated_value().to_string(),
                        new_value: value,
                        location: write_location,
                    });
                }
            }
            Some(_) => {}
            None => {
                if config.log_initial_property_values {
                    self.ctx.logger.log(&EvaluationEvent::PropertyInitialValueSet {
                        property_name: element.name.clone(),
                        value,
                        source: PropertyKind::Project,
                        location: Some(write_location),
                    });
                }
            }
        }
        Ok(())
    }

    // ─── Imports ─────────────────────────────────────────────────────────────

    fn evaluate_import(&mut self, file: &FileContext, import: &ImportElement) -> Result<(), ProjectError> {
        let deferred = self.resolver.checks_condition(import);
        if !deferred && !self.condition(file, import.condition.as_deref(), import.location, None)? {
            self.log_import_ignored(file, import, ImportIgnoredReason::FalseCondition);
            return Ok(());
        }

        self.reads.set_location(file.full_path(), import.location);
        let resolution = {
            let lookup = self.lookup(file, false);
            self.resolver.resolve(import, &lookup, &file.file)?
        };
        match resolution {
            ImportResolution::Ignored(reason) => {
                self.log_import_ignored(file, import, reason);
                Ok(())
            }
            ImportResolution::Files { paths, sdk } => {
                for path in paths {
                    self.import_file(file, import, &path, sdk.as_ref())?;
                }
                Ok(())
            }
        }
    }

    fn log_import_ignored(&self, file: &FileContext, import: &ImportElement, reason: ImportIgnoredReason) {
        let lookup = self.lookup(file, true);
        let expander = Expander::new(&lookup, file.file.directory());
        let condition = import.condition.as_deref();
        let evaluated_condition = condition.and_then(|c| expander.expand_into_string(c).ok());
        let condition_result = condition.and_then(|c| self.conditions.evaluate_for_logging(c, &expander));
        self.ctx.logger.log(&EvaluationEvent::ImportIgnored {
            importing_file: file.full_path().map(Path::to_path_buf),
            unevaluated_project: import.project.clone(),
            reason,
            condition: import.condition.clone(),
            evaluated_condition,
            condition_result,
            location: event_location(file.full_path(), import.location),
        });
    }

    fn import_file(
        &mut self,
        file: &FileContext,
        import: &ImportElement,
        path: &Path,
        sdk: Option<&(SdkReference, SdkResult)>,
    ) -> Result<(), ProjectError> {
        let path = normalize_path(path);
        let location = event_location(file.full_path(), import.location);
        let settings = self.ctx.load_settings;

        match self.tracker.classify(&path) {
            ImportDisposition::Circular => {
                if settings.reject_circular_imports {
                    return Err(ProjectError::new(
                        ErrorKind::CircularImport,
                        "MSB4210",
                        format!(
                            "There is a circular reference involving the import of file \"{}\". This file may have been imported more than once, or you may have attempted to import the main project file.",
                            path.display()
                        ),
                    )
                    .at(file.full_path(), import.location.line, import.location.column));
                }
                if settings.record_duplicate_but_not_circular_imports {
                    tracing::trace!(path = %path.display(), "circular import skipped");
                    return Ok(());
                }
                let imported = self.ctx.cache.get(&path).map_err(file.at(import.location))?;
                self.ctx.logger.log(&EvaluationEvent::CircularImport { imported_file: path.clone(), location });
                let resolved = resolved_import(file, import, imported, path, sdk, true);
                self.result.imports_including_duplicates.push(resolved);
                Ok(())
            }
            ImportDisposition::Duplicate => {
                let imported = self.ctx.cache.get(&path).map_err(file.at(import.location))?;
                self.ctx.logger.log(&EvaluationEvent::DuplicateImport { imported_file: path.clone(), location });
                let resolved = resolved_import(file, import, imported, path, sdk, true);
                self.result.imports_including_duplicates.push(resolved);
                Ok(())
            }
            ImportDisposition::Fresh => {
                let imported = self.ctx.cache.get(&path).map_err(file.at(import.location))?;
                self.ctx.logger.log(&EvaluationEvent::ImportResolved {
                    importing_file: file.full_path().map(Path::to_path_buf),
                    imported_file: path.clone(),
                    location,
                });
                let resolved = resolved_import(file, import, Arc::clone(&imported), path.clone(), sdk, false);
                self.result.imports.push(resolved.clone());
                self.result.imports_including_duplicates.push(resolved);

                self.tracker.enter(path);
                let child = FileContext { file: imported, is_imported: true, in_target: false };
                let outcome = self.evaluate_file(&child);
                self.tracker.exit();
                outcome
            }
        }
    }

    fn finish_targets(&mut self) -> Result<(), ProjectError> {
        let root_ctx = FileContext { file: Arc::clone(&self.root), is_imported: false, in_target: false };
        let expand = |raw: &str| -> Result<Vec<String>, ProjectError> {
            let lookup = self.lookup(&root_ctx, true);
            let expanded = Expander::new(&lookup, self.project_directory()).expand_properties(raw)?;
            Ok(split_semicolon_separated_list(&expanded))
        };

        let mut default_targets = match &self.default_targets {
            Some(raw) => expand(raw)?,
            None => Vec::new(),
        };
        if default_targets.is_empty() {
            default_targets.extend(self.result.targets.values().next().map(|t| t.name().to_string()));
        }
        let mut initial_targets = Vec::new();
        for raw in &self.initial_targets {
            initial_targets.extend(expand(raw)?);
        }
        self.result.default_targets = default_targets;
        self.result.initial_targets = initial_targets;
        Ok(())
    }

    // ─── Pass 2 ──────────────────────────────────────────────────────────────

    fn evaluate_item_definitions(&mut self) -> Result<(), ProjectError> {
        for (file, group) in std::mem::take(&mut self.pending_definitions) {
            if !self.condition(&file, group.condition.as_deref(), group.location, None)? {
                continue;
            }
            for definition in &group.definitions {
                let item_type = &definition.item_type;
                let current = self.current_definition(item_type);
                if !self.condition(&file, definition.condition.as_deref(), definition.location, Some(&*current))? {
                    continue;
                }
                for element in &definition.metadata {
                    let current = self.current_definition(item_type);
                    if !self.condition(&file, element.condition.as_deref(), element.location, Some(&*current))? {
                        continue;
                    }
                    let value = {
                        let lookup = self.lookup(&file, false);
                        let expander = Expander::new(&lookup, self.project_directory()).with_metadata(&*current);
                        let with_metadata = expander.expand_metadata(&element.value).map_err(file.at(element.location))?;
                        expander.expand_properties(&with_metadata).map_err(file.at(element.location))?
                    };
                    let metadata = ProjectMetadata::new(
                        &element.name,
                        &element.value,
                        value,
                        Some(XmlSource::new(file.full_path(), element.location)),
                        file.is_imported,
                    );
                    let metadata = self.result.item_definitions.get_or_insert(item_type).set_metadata(metadata);
                    self.result.all_evaluated_item_definition_metadata.push(metadata);
                }
            }
        }
        Ok(())
    }

    fn current_definition(&self, item_type: &str) -> Arc<ItemDefinition> {
        self.result
            .item_definitions
            .get(item_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(ItemDefinition::new(item_type)))
    }

    // ─── Pass 3 ──────────────────────────────────────────────────────────────

    fn evaluate_items(&mut self) -> Result<(), ProjectError> {
        for (file, group) in std::mem::take(&mut self.pending_items) {
            self.evaluate_item_group(&file, &group)?;
        }
        Ok(())
    }

    fn evaluate_item_group(&mut self, file: &FileContext, group: &ItemGroupElement) -> Result<(), ProjectError> {
        if !self.condition(file, group.condition.as_deref(), group.location, None)? {
            return Ok(());
        }
        for element in &group.items {
            if !self.condition(file, element.condition.as_deref(), element.location, None)? {
                continue;
            }
            if let Some(include) = &element.include {
                self.include_items(file, element, include)?;
            } else if let Some(remove) = &element.remove {
                self.remove_items(file, element, remove)?;
            } else if let Some(update) = &element.update {
                self.update_items(file, element, Some(update))?;
            } else {
                // Inside a target: batch metadata onto every item of the type.
                self.update_items(file, element, None)?;
            }
        }
        Ok(())
    }

    /// Expand an item list attribute into fragments.
    fn item_fragments(&self, file: &FileContext, element: &ItemElement, text: &str) -> Result<Vec<IncludeFragment>, ProjectError> {
        self.reads.set_location(file.full_path(), element.location);
        let lookup = self.lookup(file, false);
        Expander::new(&lookup, self.project_directory())
            .with_items(&self.result.items)
            .expand_include(text)
            .map_err(file.at(element.location))
    }

    fn include_items(&mut self, file: &FileContext, element: &ItemElement, include: &str) -> Result<(), ProjectError> {
        let project_directory = self.project_directory().to_path_buf();
        let fragments = self.item_fragments(file, element, include)?;
        let excluded = match &element.exclude {
            Some(exclude) => {
                ItemSpecMatcher::new(&project_directory, self.item_fragments(file, element, exclude)?)
                    .map_err(file.at(element.location))?
            }
            None => ItemSpecMatcher::default(),
        };

        let definition = self.result.item_definitions.get(&element.item_type).cloned();
        let source = XmlSource::new(file.full_path(), element.location);
        let new_item = |value: &str| {
            ProjectItem::new(&element.item_type, value, include, &project_directory)
                .with_definition(definition.clone())
                .with_source(source.clone(), file.is_imported)
        };

        let mut items = Vec::new();
        for fragment in fragments {
            match fragment {
                IncludeFragment::Item(expanded) => {
                    if expanded.value.is_empty() || excluded.matches(&expanded.value) {
                        continue;
                    }
                    let mut item = new_item(&expanded.value);
                    if let Some(origin) = &expanded.source {
                        item.copy_metadata_from(origin);
                    }
                    items.push(item);
                }
                IncludeFragment::Text(text) if has_wildcards(&text) => {
                    let matches = expand_item_wildcard(&project_directory, &text).map_err(file.at(element.location))?;
                    for (value, recursive_dir) in matches {
                        if !excluded.matches(&value) {
                            items.push(new_item(&value).with_recursive_dir(recursive_dir));
                        }
                    }
                }
                IncludeFragment::Text(text) => {
                    if !text.is_empty() && !excluded.matches(&text) {
                        items.push(new_item(&text));
                    }
                }
            }
        }

        for mut item in items {
            self.apply_metadata(file, &mut item, &element.metadata)?;
            let item = self.result.items.add(item);
            self.result.all_evaluated_items.push(item);
        }
        Ok(())
    }

    fn remove_items(&mut self, file: &FileContext, element: &ItemElement, remove: &str) -> Result<(), ProjectError> {
        let fragments = self.item_fragments(file, element, remove)?;
        let matcher = ItemSpecMatcher::new(self.project_directory(), fragments).map_err(file.at(element.location))?;
        let removed = self.result.items.remove_where(&element.item_type, |item| matcher.matches(item.evaluated_include()));
        tracing::trace!(item_type = %element.item_type, removed, "items removed");
        Ok(())
    }

    fn update_items(&mut self, file: &FileContext, element: &ItemElement, update: Option<&str>) -> Result<(), ProjectError> {
        let matcher = match update {
            Some(update) => {
                let fragments = self.item_fragments(file, element, update)?;
                Some(ItemSpecMatcher::new(self.project_directory(), fragments).map_err(file.at(element.location))?)
            }
            None => None,
        };
        let targets: Vec<usize> = self
            .result
            .items
            .get(&element.item_type)
            .iter()
            .enumerate()
            .filter(|(_, item)| matcher.as_ref().is_none_or(|m| m.matches(item.evaluated_include())))
            .map(|(index, _)| index)
            .collect();

        for index in targets {
            let mut item = ProjectItem::clone(&self.result.items.get(&element.item_type)[index]);
            self.apply_metadata(file, &mut item, &element.metadata)?;
            if let Some(list) = self.result.items.get_mut(&element.item_type) {
                list[index] = Arc::new(item);
            }
        }
        Ok(())
    }

    fn apply_metadata(&self, file: &FileContext, item: &mut ProjectItem, metadata: &[MetadataElement]) -> Result<(), ProjectError> {
        for element in metadata {
            if !self.condition(file, element.condition.as_deref(), element.location, Some(&*item))? {
                continue;
            }
            let references = get_referenced_item_names_and_metadata([element.value.as_str()]);
            let value = {
                let lookup = self.lookup(file, false);
                let expander = Expander::new(&lookup, self.project_directory());
                let expanded = if references.items.is_empty() && references.metadata.is_empty() {
                    expander.expand_properties(&element.value)
                } else {
                    expander.with_items(&self.result.items).with_metadata(&*item).expand_into_string(&element.value)
                };
                expanded.map_err(file.at(element.location))?
            };
            item.set_metadata(ProjectMetadata::new(
                &element.name,
                &element.value,
                value,
                Some(XmlSource::new(file.full_path(), element.location)),
                file.is_imported,
            ));
        }
        Ok(())
    }
}

fn resolved_import(
    file: &FileContext,
    import: &ImportElement,
    imported_project: Arc<ProjectRootElement>,
    path: PathBuf,
    sdk: Option<&(SdkReference, SdkResult)>,
    is_duplicate: bool,
) -> ResolvedImport {
    ResolvedImport {
        import: import.clone(),
        importing_file: file.full_path().map(Path::to_path_buf),
        imported_project,
        path,
        is_imported: file.is_imported,
        is_duplicate,
        sdk_reference: sdk.map(|(reference, _)| reference.clone()),
        sdk_result: sdk.map(|(_, result)| result.clone()),
    }
}

/// Implicit `Sdk.props`/`Sdk.targets` import pairs for every SDK the file
/// names, through its `Sdk` attribute or `<Sdk>` elements.
fn sdk_imports(file: &ProjectRootElement) -> Result<Vec<(ImportElement, ImportElement)>, ProjectError> {
    let mut references: Vec<(SdkReference, ElementLocation)> = Vec::new();
    if let Some(attribute) = &file.sdk {
        let parsed = SdkReference::parse_list(attribute)
            .map_err(|e| e.at(file.full_path(), file.location.line, file.location.column))?;
        references.extend(parsed.into_iter().map(|r| (r, file.location)));
    }
    for element in &file.children {
        if let ProjectElement::Sdk(sdk) = element {
            let reference = SdkReference::new(&sdk.name, sdk.version.clone(), sdk.minimum_version.clone());
            references.push((reference, sdk.location));
        }
    }

    let implicit = |reference: &SdkReference, project: &str, location: ElementLocation| ImportElement {
        project: project.to_string(),
        condition: None,
        sdk: Some(reference.name.clone()),
        version: reference.version.clone(),
        minimum_version: reference.minimum_version.clone(),
        implicit: true,
        location,
    };
    Ok(references
        .iter()
        .map(|(reference, location)| {
            (implicit(reference, "Sdk.props", *location), implicit(reference, "Sdk.targets", *location))
        })
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Item specs
// ═══════════════════════════════════════════════════════════════════════════════

/// Files matched by an item wildcard, as include values relative to the
/// project directory when the pattern was relative, with the `**` portion
/// as `RecursiveDir`.
fn expand_item_wildcard(project_directory: &Path, pattern: &str) -> Result<Vec<(String, Option<String>)>, ProjectError> {
    let relative = fix_separators(pattern);
    let full = normalize_path(&project_directory.join(&relative));
    let base = wildcard_directory(&full);
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let recursive = pattern.contains("**");
    let files = glob_files(&full)?;
    Ok(files
        .into_iter()
        .map(|file| {
            let recursive_dir = recursive.then(|| {
                file.parent()
                    .and_then(|parent| parent.strip_prefix(&base).ok())
                    .filter(|rest| !rest.as_os_str().is_empty())
                    .map(with_trailing_separator)
                    .unwrap_or_default()
            });
            let value = if relative.is_absolute() {
                file.display().to_string()
            } else {
                file.strip_prefix(project_directory).unwrap_or(&file).display().to_string()
            };
            (value, recursive_dir)
        })
        .collect())
}

/// Matches item specs from an `Exclude`, `Remove` or `Update` list.
/// Comparison is on normalized full paths, ignoring case.
#[derive(Debug, Default)]
struct ItemSpecMatcher {
    directory: PathBuf,
    literals: HashSet<String>,
    patterns: Vec<glob::Pattern>,
}

impl ItemSpecMatcher {
    fn new(directory: &Path, fragments: Vec<IncludeFragment>) -> Result<Self, ProjectError> {
        let mut matcher = Self { directory: directory.to_path_buf(), ..Self::default() };
        for fragment in fragments {
            let text = match fragment {
                IncludeFragment::Item(item) => item.value,
                IncludeFragment::Text(text) => text,
            };
            if text.is_empty() {
                continue;
            }
            if has_wildcards(&text) {
                let full = normalize_path(&directory.join(fix_separators(&text)));
                let pattern = glob::Pattern::new(&pattern_text(&full)).map_err(|e| {
                    ProjectError::syntax("MSB4186", format!("The item specification \"{text}\" is not a valid wildcard: {e}"))
                })?;
                matcher.patterns.push(pattern);
            } else {
                matcher.literals.insert(matcher.key(&text));
            }
        }
        Ok(matcher)
    }

    fn key(&self, spec: &str) -> String {
        normalize_path(&self.directory.join(fix_separators(spec))).to_string_lossy().to_lowercase()
    }

    fn matches(&self, spec: &str) -> bool {
        if self.literals.is_empty() && self.patterns.is_empty() {
            return false;
        }
        let full = normalize_path(&self.directory.join(fix_separators(spec)));
        let options = glob::MatchOptions { case_sensitive: false, require_literal_separator: true, require_literal_leading_dot: false };
        self.literals.contains(&full.to_string_lossy().to_lowercase())
            || self.patterns.iter().any(|p| p.matches_path_with(&full, options))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingLogger;

    struct Harness {
        globals: IndexMap<String, String>,
        environment: HashMap<String, String>,
        toolset: Option<Toolset>,
        resolvers: SdkResolverChain,
        cache: ProjectRootElementCache,
        config: EvaluationConfig,
        settings: LoadSettings,
        logger: CollectingLogger,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                globals: IndexMap::new(),
                environment: HashMap::new(),
                toolset: None,
                resolvers: SdkResolverChain::new(),
                cache: ProjectRootElementCache::default(),
                config: EvaluationConfig::default(),
                settings: LoadSettings::default(),
                logger: CollectingLogger::new(),
            }
        }

        fn context(&self) -> EvaluationContext<'_> {
            EvaluationContext {
                global_properties: &self.globals,
                environment: &self.environment,
                toolset: self.toolset.as_ref(),
                sdk_resolvers: &self.resolvers,
                cache: &self.cache,
                config: &self.config,
                load_settings: self.settings,
                logger: &self.logger,
            }
        }

        fn evaluate(&self, xml: &str) -> Result<EvaluatedProject, ProjectError> {
            let root = Arc::new(ProjectRootElement::parse_with_path(xml, "/virtual/dir/test.proj")?);
            evaluate(root, &self.context())
        }

        fn warnings(&self) -> usize {
            self.logger.events().iter().filter(|e| matches!(e, EvaluationEvent::UninitializedPropertyRead { .. })).count()
        }
    }

    fn value(result: &EvaluatedProject, name: &str) -> String {
        result.properties.get_value(name).unwrap_or_default().to_string()
    }

    #[test]
    fn properties_expand_in_order() {
        let result = Harness::new()
            .evaluate(
                r#"<Project><PropertyGroup>
                    <A>1</A><B>$(A);2</B><A>$(B)</A>
                </PropertyGroup></Project>"#,
            )
            .unwrap();
        assert_eq!(value(&result, "a"), "1;2");
        let a = result.properties.get("A").unwrap();
        let history: Vec<_> = a.history().map(|p| p.evaluated_value().to_string()).collect();
        assert_eq!(history, ["1;2", "1"]);
    }

    #[test]
    fn reserved_properties_are_set_and_protected() {
        let harness = Harness::new();
        let result = harness.evaluate("<Project />").unwrap();
        assert_eq!(value(&result, "MSBuildProjectName"), "test");
        assert_eq!(value(&result, "MSBuildProjectFile"), "test.proj");
        assert_eq!(value(&result, "MSBuildProjectExtension"), ".proj");
        assert_eq!(value(&result, "MSBuildProjectDirectory"), Path::new("/virtual/dir").display().to_string());
        assert!(result.properties.get("MSBuildProjectName").unwrap().is_reserved_property());

        let err = harness.evaluate("<Project><PropertyGroup><MSBuildProjectName>x</MSBuildProjectName></PropertyGroup></Project>").unwrap_err();
        assert_eq!(err.code, "MSB4004");
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn this_file_properties_follow_the_file() {
        let result = Harness::new()
            .evaluate("<Project><PropertyGroup><Dir>$(MSBuildThisFileDirectory)</Dir><F>$(MSBuildThisFile)</F></PropertyGroup></Project>")
            .unwrap();
        assert_eq!(value(&result, "F"), "test.proj");
        assert!(value(&result, "Dir").ends_with(std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn global_properties_win_unless_local() {
        let mut harness = Harness::new();
        harness.globals.insert("Foo".into(), "Baz".into());
        let result = harness.evaluate("<Project><PropertyGroup><Foo>$(Foo)Bar</Foo></PropertyGroup></Project>").unwrap();
        assert_eq!(value(&result, "Foo"), "Baz");

        let result = harness
            .evaluate(r#"<Project TreatAsLocalProperty="Foo"><PropertyGroup><Foo>$(Foo)Bar</Foo></PropertyGroup></Project>"#)
            .unwrap();
        assert_eq!(value(&result, "Foo"), "BazBar");
        assert!(result.properties.get("Foo").unwrap().predecessor().unwrap().is_global_property());

        let err = harness.evaluate(r#"<Project TreatAsLocalProperty="1bad"></Project>"#).unwrap_err();
        assert_eq!(err.code, "MSB4228");
    }

    #[test]
    fn environment_and_toolset_layers() {
        let mut harness = Harness::new();
        harness.environment.insert("FromEnv".into(), "env".into());
        harness.environment.insert("Bad Name".into(), "x".into());
        harness.environment.insert(SUB_TOOLSET_SELECTOR.into(), "16.0".into());
        harness.toolset = Some(
            Toolset::new("Current", "/tools")
                .with_property("Ext", "/ext")
                .with_sub_toolset("16.0", [("Vc", "16")])
                .with_sub_toolset("17.0", [("Vc", "17")])
                .with_default_sub_toolset("17.0"),
        );
        let result = harness.evaluate("<Project />").unwrap();
        assert_eq!(value(&result, "FromEnv"), "env");
        assert!(result.properties.get("FromEnv").unwrap().is_environment_property());
        assert!(!result.properties.contains("Bad Name"));
        assert_eq!(value(&result, "Ext"), "/ext");
        assert_eq!(value(&result, "Vc"), "16");
        assert_eq!(value(&result, "MSBuildToolsPath"), "/tools");

        harness.globals.insert(SUB_TOOLSET_SELECTOR.into(), "17.0".into());
        assert_eq!(value(&harness.evaluate("<Project />").unwrap(), "Vc"), "17");
    }

    #[test]
    fn uninitialized_reads_warn_once() {
        let mut harness = Harness::new();
        harness.config.warn_on_uninitialized_property = true;
        harness
            .evaluate(
                r#"<Project><PropertyGroup>
                    <A>$(Late)</A>
                    <B>$(Late)</B>
                    <Late>x</Late>
                    <Late>y</Late>
                </PropertyGroup></Project>"#,
            )
            .unwrap();
        assert_eq!(harness.warnings(), 1);
    }

    #[test]
    fn self_reference_and_conditions_do_not_warn() {
        let mut harness = Harness::new();
        harness.config.warn_on_uninitialized_property = true;
        harness
            .evaluate(
                r#"<Project><PropertyGroup>
                    <Baz>$(Baz);x</Baz>
                    <E></E>
                    <F>$(E)</F>
                    <E>later</E>
                    <G Condition="'$(H)' == ''">1</G>
                    <H>h</H>
                </PropertyGroup></Project>"#,
            )
            .unwrap();
        assert_eq!(harness.warnings(), 0);
    }

    #[test]
    fn choose_takes_first_true_branch() {
        let result = Harness::new()
            .evaluate(
                r#"<Project>
                  <PropertyGroup><Mode>b</Mode></PropertyGroup>
                  <Choose>
                    <When Condition="'$(Mode)' == 'a'"><PropertyGroup><Out>A</Out></PropertyGroup></When>
                    <When Condition="'$(Mode)' == 'b'"><PropertyGroup><Out>B</Out></PropertyGroup></When>
                    <Otherwise><PropertyGroup><Out>other</Out></PropertyGroup></Otherwise>
                  </Choose>
                </Project>"#,
            )
            .unwrap();
        assert_eq!(value(&result, "Out"), "B");
    }

    #[test]
    fn items_see_final_properties() {
        let result = Harness::new()
            .evaluate(
                r#"<Project>
                  <ItemGroup><I Include="$(Name).txt" /></ItemGroup>
                  <PropertyGroup><Name>early</Name></PropertyGroup>
                  <PropertyGroup><Name>final</Name></PropertyGroup>
                </Project>"#,
            )
            .unwrap();
        assert_eq!(result.items.get("I")[0].evaluated_include(), "final.txt");
    }

    #[test]
    fn item_operations() {
        let result = Harness::new()
            .evaluate(
                r#"<Project>
                  <ItemDefinitionGroup><I><Kind>default</Kind></I></ItemDefinitionGroup>
                  <ItemGroup>
                    <I Include="a;b;c;d" Exclude="b" />
                    <I Remove="c" />
                    <I Update="d"><Kind>special</Kind></I>
                    <J Include="@(I)"><From>%(Kind)</From></J>
                  </ItemGroup>
                </Project>"#,
            )
            .unwrap();
        let includes: Vec<_> = result.items.get("I").iter().map(|i| i.evaluated_include().to_string()).collect();
        assert_eq!(includes, ["a", "d"]);
        assert_eq!(result.items.get("I")[0].get_metadata_value("Kind"), "default");
        assert_eq!(result.items.get("I")[1].get_metadata_value("Kind"), "special");
        let from: Vec<_> = result.items.get("J").iter().map(|i| i.get_metadata_value("From")).collect();
        assert_eq!(from, ["default", "special"]);
        assert_eq!(result.all_evaluated_item_definition_metadata.len(), 1);
    }

    #[test]
    fn metadata_self_reference_builds_history() {
        let result = Harness::new()
            .evaluate(
                r#"<Project><ItemGroup><I Include="x"><M>1</M><M>2;%(M)</M><M>3;%(M)</M></I></ItemGroup></Project>"#,
            )
            .unwrap();
        let item = &result.items.get("I")[0];
        assert_eq!(item.get_metadata_value("M"), "3;2;1");
        let chain: Vec<_> = item.get_metadata("M").unwrap().history().map(|m| m.evaluated_value().to_string()).collect();
        assert_eq!(chain, ["3;2;1", "2;1", "1"]);
    }

    #[test]
    fn targets_default_and_initial() {
        let result = Harness::new()
            .evaluate(
                r#"<Project InitialTargets="Init">
                  <Target Name="First" />
                  <Target Name="Second" />
                  <Target Name="First" DependsOnTargets="Second" />
                </Project>"#,
            )
            .unwrap();
        assert_eq!(result.default_targets, ["First"]);
        assert_eq!(result.initial_targets, ["Init"]);
        assert_eq!(result.targets.len(), 2);
        assert_eq!(result.targets["first"].element.depends_on_targets.as_deref(), Some("Second"));
    }

    #[test]
    fn target_intrinsics_apply_to_copies() {
        let harness = Harness::new();
        let root = Arc::new(
            ProjectRootElement::parse_with_path(
                r#"<Project>
                  <PropertyGroup><P>outer</P></PropertyGroup>
                  <ItemGroup><I Include="a" /></ItemGroup>
                  <Target Name="Build">
                    <PropertyGroup><P>$(P);inner</P></PropertyGroup>
                    <ItemGroup><I Include="b" /><I><Tag>t</Tag></I></ItemGroup>
                    <Message Text="hi" />
                  </Target>
                </Project>"#,
                "/virtual/dir/t.proj",
            )
            .unwrap(),
        );
        let ctx = harness.context();
        let evaluated = evaluate(Arc::clone(&root), &ctx).unwrap();
        let (properties, items) = evaluate_target_intrinsics(&evaluated, &root, "build", &ctx).unwrap();
        assert_eq!(properties.get_value("P"), Some("outer;inner"));
        assert_eq!(items.get("I").len(), 2);
        assert!(items.get("I").iter().all(|i| i.get_metadata_value("Tag") == "t"));
        assert_eq!(value(&evaluated, "P"), "outer");

        let err = evaluate_target_intrinsics(&evaluated, &root, "Missing", &ctx).unwrap_err();
        assert_eq!(err.code, "MSB4057");
    }

    #[test]
    fn condition_errors_carry_location() {
        let err = Harness::new()
            .evaluate("<Project>\n<PropertyGroup Condition=\"'a' == \">\n</PropertyGroup></Project>")
            .unwrap_err();
        assert_eq!(err.code, "MSB4092");
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn strip_root_removes_prefix() {
        assert_eq!(strip_root(Path::new("/a/b")), Path::new("a/b").display().to_string());
    }
}
