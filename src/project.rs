use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cache::ProjectRootElementCache;
use crate::config::{EvaluationConfig, LoadSettings};
use crate::error::ProjectError;
use crate::evaluator::{self, EvaluatedProject, EvaluationContext, ProjectTarget};
use crate::events::{EvaluationLogger, TracingLogger};
use crate::imports::ResolvedImport;
use crate::properties::{
    ItemDefinitionLibrary, ItemDictionary, ProjectItem, ProjectMetadata, ProjectProperty, PropertyDictionary,
};
use crate::sdk::{SdkResolver, SdkResolverChain};
use crate::toolset::{Toolset, ToolsetCollection};
use crate::xml::ProjectRootElement;

// ═══════════════════════════════════════════════════════════════════════════════
//  Project
// ═══════════════════════════════════════════════════════════════════════════════

/// An evaluated project together with everything needed to evaluate it again.
///
/// The evaluated collections are replaced wholesale on re-evaluation; a
/// failed re-evaluation leaves the previous generation in place.
pub struct Project {
    root: Arc<ProjectRootElement>,
    global_properties: IndexMap<String, String>,
    environment: HashMap<String, String>,
    toolset: Option<Toolset>,
    sdk_resolvers: SdkResolverChain,
    cache: Arc<ProjectRootElementCache>,
    config: EvaluationConfig,
    load_settings: LoadSettings,
    logger: Arc<dyn EvaluationLogger>,
    evaluation: EvaluatedProject,
    dirty: bool,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("full_path", &self.root.full_path())
            .field("global_properties", &self.global_properties)
            .field("properties", &self.evaluation.properties.len())
            .field("items", &self.evaluation.items.len())
            .field("imports", &self.evaluation.imports.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Project {
    /// Load and evaluate a project file with default settings.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        ProjectBuilder::new().from_file(path)
    }

    /// Parse and evaluate a project from its XML source with default settings.
    pub fn parse(source: &str) -> Result<Self, ProjectError> {
        ProjectBuilder::new().parse(source)
    }

    fn context(&self) -> EvaluationContext<'_> {
        EvaluationContext {
            global_properties: &self.global_properties,
            environment: &self.environment,
            toolset: self.toolset.as_ref(),
            sdk_resolvers: &self.sdk_resolvers,
            cache: &self.cache,
            config: &self.config,
            load_settings: self.load_settings,
            logger: self.logger.as_ref(),
        }
    }

    pub fn root(&self) -> &Arc<ProjectRootElement> {
        &self.root
    }

    pub fn full_path(&self) -> Option<&Path> {
        self.root.full_path()
    }

    pub fn directory(&self) -> &Path {
        self.root.directory()
    }

    // ─── Evaluated state ─────────────────────────────────────────────────────

    pub fn properties(&self) -> &PropertyDictionary {
        &self.evaluation.properties
    }

    pub fn get_property(&self, name: &str) -> Option<&Arc<ProjectProperty>> {
        self.evaluation.properties.get(name)
    }

    /// Evaluated value, or the empty string when undefined.
    pub fn get_property_value(&self, name: &str) -> &str {
        self.evaluation.properties.get_value(name).unwrap_or_default()
    }

    /// Every property assignment in evaluation order, duplicates included.
    pub fn all_evaluated_properties(&self) -> &[Arc<ProjectProperty>] {
        &self.evaluation.all_evaluated_properties
    }

    pub fn items(&self) -> &ItemDictionary {
        &self.evaluation.items
    }

    pub fn get_items(&self, item_type: &str) -> &[Arc<ProjectItem>] {
        self.evaluation.items.get(item_type)
    }

    pub fn all_evaluated_items(&self) -> &[Arc<ProjectItem>] {
        &self.evaluation.all_evaluated_items
    }

    pub fn item_definitions(&self) -> &ItemDefinitionLibrary {
        &self.evaluation.item_definitions
    }

    pub fn all_evaluated_item_definition_metadata(&self) -> &[Arc<ProjectMetadata>] {
        &self.evaluation.all_evaluated_item_definition_metadata
    }

    /// First resolution of each imported file.
    pub fn imports(&self) -> &[ResolvedImport] {
        &self.evaluation.imports
    }

    pub fn imports_including_duplicates(&self) -> &[ResolvedImport] {
        &self.evaluation.imports_including_duplicates
    }

    pub fn targets(&self) -> &IndexMap<String, ProjectTarget> {
        &self.evaluation.targets
    }

    pub fn get_target(&self, name: &str) -> Option<&ProjectTarget> {
        self.evaluation.targets.get(&name.to_lowercase())
    }

    pub fn default_targets(&self) -> &[String] {
        &self.evaluation.default_targets
    }

    pub fn initial_targets(&self) -> &[String] {
        &self.evaluation.initial_targets
    }

    /// Global properties as supplied by the caller; never touched by evaluation.
    pub fn global_properties(&self) -> &IndexMap<String, String> {
        &self.global_properties
    }

    /// Properties and items as they stand after running `target`'s
    /// property and item groups.
    pub fn evaluate_target_intrinsics(&self, target: &str) -> Result<(PropertyDictionary, ItemDictionary), ProjectError> {
        evaluator::evaluate_target_intrinsics(&self.evaluation, &self.root, target, &self.context())
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Set a global property. Returns `true` and marks the project dirty if
    /// the value changed.
    pub fn set_global_property(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.global_properties.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, existing)) if *existing == value => return false,
            Some((_, existing)) => *existing = value,
            None => {
                self.global_properties.insert(name.to_string(), value);
            }
        }
        self.dirty = true;
        true
    }

    /// Remove a global property. Returns `true` and marks the project dirty
    /// if it was present.
    pub fn remove_global_property(&mut self, name: &str) -> bool {
        let Some(index) = self.global_properties.keys().position(|k| k.eq_ignore_ascii_case(name)) else {
            return false;
        };
        self.global_properties.shift_remove_index(index);
        self.dirty = true;
        true
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-evaluate if anything changed since the last evaluation. Returns
    /// whether an evaluation ran.
    pub fn reevaluate_if_necessary(&mut self) -> Result<bool, ProjectError> {
        if !self.dirty {
            return Ok(false);
        }
        let root = self.current_root()?;
        let evaluation = {
            let ctx = self.context();
            evaluator::evaluate(Arc::clone(&root), &ctx)?
        };
        self.root = root;
        self.evaluation = evaluation;
        self.dirty = false;
        Ok(true)
    }

    /// The root tree to evaluate: the cached one if still valid, else a
    /// fresh load when the file exists on disk.
    fn current_root(&self) -> Result<Arc<ProjectRootElement>, ProjectError> {
        let Some(path) = self.root.full_path() else {
            return Ok(Arc::clone(&self.root));
        };
        if let Some(root) = self.cache.try_get(path) {
            return Ok(root);
        }
        if path.is_file() {
            tracing::debug!(path = %path.display(), "reloading project file");
            return self.cache.get(path);
        }
        Ok(Arc::clone(&self.root))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  ProjectBuilder – evaluation inputs
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for constructing a [`Project`] with custom evaluation inputs.
///
/// # Example
/// ```no_run
/// use msproj_eval::{ProjectBuilder, LoadSettings};
///
/// let project = ProjectBuilder::new()
///     .system_env()
///     .global_property("Configuration", "Release")
///     .load_settings(LoadSettings::ignore_missing_imports())
///     .from_file("App.csproj")
///     .unwrap();
/// println!("{}", project.get_property_value("OutputPath"));
/// ```
#[derive(Clone)]
pub struct ProjectBuilder {
    env: HashMap<String, String>,
    global_properties: IndexMap<String, String>,
    toolset: Option<Toolset>,
    toolsets: Option<ToolsetCollection>,
    sdk_resolvers: SdkResolverChain,
    cache: Option<Arc<ProjectRootElementCache>>,
    config: EvaluationConfig,
    load_settings: LoadSettings,
    logger: Arc<dyn EvaluationLogger>,
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self {
            env: HashMap::new(),
            global_properties: IndexMap::new(),
            toolset: None,
            toolsets: None,
            sdk_resolvers: SdkResolverChain::new(),
            cache: None,
            config: EvaluationConfig::default(),
            load_settings: LoadSettings::default(),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl ProjectBuilder {
    /// Create a new builder with an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an entire variable map into the environment. Later calls
    /// override earlier values for the same key.
    pub fn env(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Parse a `SET NAME=VALUE` script and merge its variables.
    /// `%VAR%` references see variables already in the builder first,
    /// then the process environment.
    pub fn env_script(self, content: &str) -> Self {
        let known = |name: &str| {
            self.env
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .or_else(|| std::env::var(name).ok())
        };
        let vars = crate::environment::parse_env_script_with(content, &known);
        self.env(vars)
    }

    pub fn env_script_file(self, path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let vars = crate::environment::parse_env_script_file(path)?;
        Ok(self.env(vars))
    }

    /// Pull all current process environment variables into the map.
    ///
    /// Call it before [`env_script`](Self::env_script) to let the script win,
    /// or after to let the process environment win.
    pub fn system_env(mut self) -> Self {
        self.env.extend(std::env::vars());
        self
    }

    pub fn global_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_properties.insert(name.into(), value.into());
        self
    }

    pub fn global_properties(mut self, properties: impl IntoIterator<Item = (String, String)>) -> Self {
        self.global_properties.extend(properties);
        self
    }

    /// Use this toolset regardless of the project's `ToolsVersion`.
    pub fn toolset(mut self, toolset: Toolset) -> Self {
        self.toolset = Some(toolset);
        self
    }

    /// Pick the toolset named by the project's `ToolsVersion`, falling back
    /// to the collection's default.
    pub fn toolsets(mut self, toolsets: ToolsetCollection) -> Self {
        self.toolsets = Some(toolsets);
        self
    }

    pub fn sdk_resolver(mut self, resolver: impl SdkResolver + 'static) -> Self {
        self.sdk_resolvers.add(Arc::new(resolver));
        self
    }

    pub fn sdk_resolvers(mut self, resolvers: SdkResolverChain) -> Self {
        self.sdk_resolvers = resolvers;
        self
    }

    pub fn config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn load_settings(mut self, settings: LoadSettings) -> Self {
        self.load_settings = settings;
        self
    }

    /// Share parsed files with other projects.
    pub fn cache(mut self, cache: Arc<ProjectRootElementCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn EvaluationLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Parse a project from its XML source string.
    pub fn parse(self, source: &str) -> Result<Project, ProjectError> {
        let root = ProjectRootElement::parse(source)?;
        self.from_root(Arc::new(root))
    }

    /// Load a project file from disk, through the cache.
    pub fn from_file(self, path: impl AsRef<Path>) -> Result<Project, ProjectError> {
        let cache = self.cache.clone().unwrap_or_default();
        let root = cache.get(path)?;
        Self { cache: Some(cache), ..self }.from_root(root)
    }

    /// Evaluate an already-parsed tree.
    pub fn from_root(self, root: Arc<ProjectRootElement>) -> Result<Project, ProjectError> {
        let cache = self.cache.unwrap_or_default();
        cache.add_entry(Arc::clone(&root));
        let toolset = self.toolset.or_else(|| {
            let toolsets = self.toolsets?;
            let by_version = root.tools_version.as_deref().and_then(|v| toolsets.get(v));
            by_version.or_else(|| toolsets.default_toolset()).cloned()
        });

        let evaluation = EvaluatedProject::new(&self.config);
        let mut project = Project {
            root,
            global_properties: self.global_properties,
            environment: self.env,
            toolset,
            sdk_resolvers: self.sdk_resolvers,
            cache,
            config: self.config,
            load_settings: self.load_settings,
            logger: self.logger,
            evaluation,
            dirty: true,
        };
        project.reevaluate_if_necessary()?;
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingLogger, EvaluationEvent};

    const SIMPLE: &str = r#"<Project>
  <PropertyGroup>
    <Configuration Condition="'$(Configuration)' == ''">Debug</Configuration>
    <OutDir>bin\$(Configuration)</OutDir>
  </PropertyGroup>
  <ItemGroup>
    <Compile Include="a.cs;b.cs" />
  </ItemGroup>
  <Target Name="Build" />
</Project>"#;

    #[test]
    fn parse_and_read_back() {
        let project = Project::parse(SIMPLE).unwrap();
        assert_eq!(project.get_property_value("Configuration"), "Debug");
        assert_eq!(project.get_property_value("outdir"), r"bin\Debug");
        assert_eq!(project.get_property_value("Undefined"), "");
        assert_eq!(project.get_items("Compile").len(), 2);
        assert_eq!(project.default_targets(), ["Build"]);
        assert!(project.get_target("build").is_some());
        assert!(!project.is_dirty());
    }

    #[test]
    fn global_property_changes_mark_dirty() {
        let mut project = ProjectBuilder::new().global_property("Configuration", "Release").parse(SIMPLE).unwrap();
        assert_eq!(project.get_property_value("OutDir"), r"bin\Release");

        assert!(!project.set_global_property("configuration", "Release"));
        assert!(!project.is_dirty());
        assert!(!project.reevaluate_if_necessary().unwrap());

        assert!(project.set_global_property("Configuration", "Ship"));
        assert!(project.is_dirty());
        assert!(project.reevaluate_if_necessary().unwrap());
        assert_eq!(project.get_property_value("OutDir"), r"bin\Ship");

        assert!(project.remove_global_property("CONFIGURATION"));
        assert!(!project.remove_global_property("Configuration"));
        project.reevaluate_if_necessary().unwrap();
        assert_eq!(project.get_property_value("OutDir"), r"bin\Debug");
    }

    #[test]
    fn reevaluation_reproduces_state() {
        let mut project = Project::parse(SIMPLE).unwrap();
        let before: Vec<_> =
            project.properties().iter().map(|p| (p.name().to_string(), p.evaluated_value().to_string())).collect();
        let all_before = project.all_evaluated_properties().len();

        project.mark_dirty();
        assert!(project.reevaluate_if_necessary().unwrap());
        let after: Vec<_> =
            project.properties().iter().map(|p| (p.name().to_string(), p.evaluated_value().to_string())).collect();
        assert_eq!(before, after);
        assert_eq!(all_before, project.all_evaluated_properties().len());
        assert_eq!(project.get_items("Compile").len(), 2);
    }

    #[test]
    fn failed_reevaluation_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.proj");
        std::fs::write(&file, "<Project><PropertyGroup><P>1</P></PropertyGroup></Project>").unwrap();
        let mut project = ProjectBuilder::new()
            .cache(Arc::new(ProjectRootElementCache::new(true)))
            .from_file(&file)
            .unwrap();
        assert_eq!(project.get_property_value("P"), "1");

        std::fs::write(&file, "<Project><PropertyGroup><P>2</P>").unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options().write(true).open(&file).unwrap().set_modified(later).unwrap();

        project.mark_dirty();
        let err = project.reevaluate_if_necessary().unwrap_err();
        assert_eq!(err.code, "MSB4025");
        assert_eq!(project.get_property_value("P"), "1");
        assert!(project.is_dirty());

        std::fs::write(&file, "<Project><PropertyGroup><P>3</P></PropertyGroup></Project>").unwrap();
        let later = later + std::time::Duration::from_secs(5);
        std::fs::File::options().write(true).open(&file).unwrap().set_modified(later).unwrap();
        assert!(project.reevaluate_if_necessary().unwrap());
        assert_eq!(project.get_property_value("P"), "3");
    }

    #[test]
    fn treat_as_local_keeps_global_map() {
        let project = ProjectBuilder::new()
            .global_property("Foo", "Baz")
            .parse(r#"<Project TreatAsLocalProperty="Foo"><PropertyGroup><Foo>$(Foo)Bar</Foo></PropertyGroup></Project>"#)
            .unwrap();
        assert_eq!(project.get_property_value("Foo"), "BazBar");
        assert_eq!(project.global_properties()["Foo"], "Baz");
    }

    #[test]
    fn environment_layers() {
        let project = ProjectBuilder::new()
            .env_var("FROM_VAR", "1")
            .env_script("@SET FROM_SCRIPT=%FROM_VAR%2\n")
            .parse("<Project><PropertyGroup><Both>$(FROM_VAR);$(FROM_SCRIPT)</Both></PropertyGroup></Project>")
            .unwrap();
        assert_eq!(project.get_property_value("Both"), "1;2");
    }

    #[test]
    fn toolset_chosen_by_tools_version() {
        let mut toolsets = ToolsetCollection::new();
        toolsets.add(Toolset::new("Current", "/current").with_property("Which", "current"));
        toolsets.add(Toolset::new("4.0", "/old").with_property("Which", "old"));
        toolsets.default_tools_version = Some("Current".into());

        let builder = ProjectBuilder::new().toolsets(toolsets);
        let old = builder.clone().parse(r#"<Project ToolsVersion="4.0" />"#).unwrap();
        assert_eq!(old.get_property_value("Which"), "old");
        assert_eq!(old.get_property_value("MSBuildToolsVersion"), "4.0");
        let default = builder.parse("<Project />").unwrap();
        assert_eq!(default.get_property_value("Which"), "current");
    }

    #[test]
    fn logger_receives_reassignments() {
        let logger = Arc::new(CollectingLogger::new());
        ProjectBuilder::new()
            .logger(logger.clone())
            .parse("<Project><PropertyGroup><A>1</A><A>2</A><A>2</A></PropertyGroup></Project>")
            .unwrap();
        let reassignments = logger.count(|e| matches!(e, EvaluationEvent::PropertyReassignment { .. }));
        assert_eq!(reassignments, 1);
    }

    #[test]
    fn target_intrinsics_through_project() {
        let project = Project::parse(
            r#"<Project>
  <PropertyGroup><P>a</P></PropertyGroup>
  <Target Name="T" Condition="'$(P)' == 'a'"><PropertyGroup><P>$(P)b</P></PropertyGroup></Target>
</Project>"#,
        )
        .unwrap();
        let (properties, _) = project.evaluate_target_intrinsics("T").unwrap();
        assert_eq!(properties.get_value("P"), Some("ab"));
        assert_eq!(project.get_property_value("P"), "a");
    }
}
