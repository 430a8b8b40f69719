//! Import resolution.
//!
//! Turns one `<Import>` into the concrete files it names: SDK-relative
//! paths, wildcard patterns and toolset fallback search paths are handled
//! here. [`ImportTracker`] classifies each resolved file as fresh, a
//! duplicate of something already imported, or a cycle back to a file that
//! is still being imported.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::condition::ConditionEvaluator;
use crate::config::LoadSettings;
use crate::error::{ErrorKind, ProjectError};
use crate::events::{EvaluationEvent, EvaluationLogger, ImportIgnoredReason};
use crate::expander::{Expander, PropertyLookup};
use crate::sdk::{SdkReference, SdkResolverChain, SdkResolverContext, SdkResult};
use crate::toolset::Toolset;
use crate::xml::{ImportElement, ProjectRootElement};

// ═══════════════════════════════════════════════════════════════════════════════
//  Paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// `path` made absolute against the current directory, then normalized.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    let base = std::env::current_dir().unwrap_or_default();
    normalize_path(&base.join(path))
}

/// Project files use `\` freely; make it a separator on this platform.
pub fn fix_separators(text: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(text)
    } else {
        PathBuf::from(text.replace('\\', "/"))
    }
}

pub fn has_wildcards(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Directory part of a pattern that precedes its first wildcard.
pub fn wildcard_directory(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        if has_wildcards(&component.as_os_str().to_string_lossy()) {
            break;
        }
        base.push(component);
    }
    base
}

/// Glob text for `pattern` with its literal base directory escaped.
pub fn pattern_text(pattern: &Path) -> String {
    let base = wildcard_directory(pattern);
    let rest = pattern.strip_prefix(&base).unwrap_or(pattern);
    let mut text = glob::Pattern::escape(&base.to_string_lossy());
    if !text.is_empty() && !text.ends_with(std::path::MAIN_SEPARATOR) {
        text.push(std::path::MAIN_SEPARATOR);
    }
    text.push_str(&rest.to_string_lossy());
    text
}

/// Files matching `pattern`, sorted. `**` spans directories.
pub fn glob_files(pattern: &Path) -> Result<Vec<PathBuf>, ProjectError> {
    let text = pattern_text(pattern);
    let options = glob::MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let matches = glob::glob_with(&text, options).map_err(|e| {
        ProjectError::import("MSB4019", format!("The wildcard \"{}\" is invalid: {e}", pattern.display()))
    })?;
    let mut files: Vec<PathBuf> = matches.filter_map(Result::ok).filter(|p| p.is_file()).collect();
    files.sort();
    Ok(files)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Import chain
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDisposition {
    Fresh,
    /// Already imported somewhere else in this evaluation.
    Duplicate,
    /// Still being imported further up the chain.
    Circular,
}

/// Files on the current import chain, plus every file imported so far.
#[derive(Debug, Clone, Default)]
pub struct ImportTracker {
    chain: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl ImportTracker {
    /// A tracker whose chain starts at the outermost project.
    pub fn new(root: Option<&Path>) -> Self {
        let mut tracker = Self::default();
        if let Some(root) = root {
            tracker.enter(root.to_path_buf());
        }
        tracker
    }

    pub fn classify(&self, path: &Path) -> ImportDisposition {
        if self.chain.iter().any(|p| p == path) {
            ImportDisposition::Circular
        } else if self.seen.contains(path) {
            ImportDisposition::Duplicate
        } else {
            ImportDisposition::Fresh
        }
    }

    pub fn enter(&mut self, path: PathBuf) {
        self.seen.insert(path.clone());
        self.chain.push(path);
    }

    pub fn exit(&mut self) {
        self.chain.pop();
    }

    pub fn chain(&self) -> &[PathBuf] {
        &self.chain
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Resolved imports
// ═══════════════════════════════════════════════════════════════════════════════

/// One occurrence of an imported file.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub import: ImportElement,
    pub importing_file: Option<PathBuf>,
    pub imported_project: Arc<ProjectRootElement>,
    pub path: PathBuf,
    /// The `<Import>` itself lives in an imported file.
    pub is_imported: bool,
    /// This occurrence was skipped because the file was already imported.
    pub is_duplicate: bool,
    pub sdk_reference: Option<SdkReference>,
    pub sdk_result: Option<SdkResult>,
}

/// What an `<Import>` resolved to.
#[derive(Debug, Clone)]
pub enum ImportResolution {
    Files { paths: Vec<PathBuf>, sdk: Option<(SdkReference, SdkResult)> },
    Ignored(ImportIgnoredReason),
}

enum Located {
    Files(Vec<PathBuf>),
    NoMatches,
    MissingDirectory,
    Missing(PathBuf),
}

// ─── Lookup adapters ─────────────────────────────────────────────────────────

/// Shadows one property with a candidate search path.
struct Override<'a> {
    inner: &'a dyn PropertyLookup,
    name: &'a str,
    value: &'a str,
}

impl PropertyLookup for Override<'_> {
    fn get_property_value(&self, name: &str) -> Option<String> {
        if name.eq_ignore_ascii_case(self.name) {
            Some(self.value.to_string())
        } else {
            self.inner.get_property_value(name)
        }
    }
}

/// Remembers whether any lookup came back empty-handed.
struct MissTracker<'a> {
    inner: &'a dyn PropertyLookup,
    missed: std::cell::Cell<bool>,
}

impl PropertyLookup for MissTracker<'_> {
    fn get_property_value(&self, name: &str) -> Option<String> {
        let value = self.inner.get_property_value(name);
        if value.is_none() {
            self.missed.set(true);
        }
        value
    }
}

// ─── ImportResolver ──────────────────────────────────────────────────────────

pub struct ImportResolver<'a> {
    sdk_resolvers: &'a SdkResolverChain,
    toolset: Option<&'a Toolset>,
    settings: LoadSettings,
    conditions: &'a ConditionEvaluator,
    logger: &'a dyn EvaluationLogger,
    sdk_results: Mutex<HashMap<SdkReference, SdkResult>>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(
        sdk_resolvers: &'a SdkResolverChain,
        toolset: Option<&'a Toolset>,
        settings: LoadSettings,
        conditions: &'a ConditionEvaluator,
        logger: &'a dyn EvaluationLogger,
    ) -> Self {
        Self { sdk_resolvers, toolset, settings, conditions, logger, sdk_results: Mutex::new(HashMap::new()) }
    }

    /// Resolve `import`, declared in `importing`, to files on disk. Unless
    /// [`Self::checks_condition`] holds, the import's own condition must
    /// already have been found true.
    pub fn resolve(
        &self,
        import: &ImportElement,
        properties: &dyn PropertyLookup,
        importing: &ProjectRootElement,
    ) -> Result<ImportResolution, ProjectError> {
        let at = |e: ProjectError| e.at(importing.full_path(), import.location.line, import.location.column);
        match &import.sdk {
            Some(sdk) => self.resolve_sdk_import(import, sdk, properties, importing).map_err(at),
            None => self.resolve_project_import(import, properties, importing.directory()).map_err(at),
        }
    }

    fn resolve_sdk_import(
        &self,
        import: &ImportElement,
        sdk: &str,
        properties: &dyn PropertyLookup,
        importing: &ProjectRootElement,
    ) -> Result<ImportResolution, ProjectError> {
        let expander = Expander::new(properties, importing.directory());
        let optional = |value: &Option<String>| -> Result<Option<String>, ProjectError> {
            match value {
                Some(v) => Ok(Some(expander.expand_properties(v)?.trim().to_string()).filter(|v| !v.is_empty())),
                None => Ok(None),
            }
        };
        let name = expander.expand_properties(sdk)?.trim().to_string();
        if name.is_empty() || name.contains('/') {
            return Err(ProjectError::configuration("MSB4229", format!("The value \"{name}\" is not a valid SDK name.")));
        }
        let reference = SdkReference::new(name, optional(&import.version)?, optional(&import.minimum_version)?);

        let result = self.resolve_sdk(&reference, importing.full_path());
        let base = match &result {
            SdkResult::Success { path, .. } => path.clone(),
            SdkResult::Failure { errors } => {
                if self.settings.ignore_missing_imports {
                    return Ok(ImportResolution::Ignored(ImportIgnoredReason::SdkNotResolved));
                }
                return Err(ProjectError::new(
                    ErrorKind::SdkResolution,
                    "MSB4236",
                    format!("The SDK '{reference}' specified could not be found. {}", errors.join(" ")),
                ));
            }
        };

        let project = expander.expand_properties(&import.project)?;
        let pattern = project.trim();
        let guarded = import.condition.is_some();
        let resolution = match locate(pattern, &base, guarded)? {
            Located::Files(paths) => ImportResolution::Files { paths, sdk: Some((reference, result)) },
            Located::NoMatches => ImportResolution::Ignored(ImportIgnoredReason::NoMatches),
            Located::MissingDirectory if guarded => ImportResolution::Ignored(ImportIgnoredReason::NoMatches),
            Located::MissingDirectory | Located::Missing(_) => {
                if self.settings.ignore_missing_imports {
                    ImportResolution::Ignored(ImportIgnoredReason::MissingFile)
                } else {
                    return Err(not_found(&base.join(fix_separators(pattern)), &import.project));
                }
            }
        };
        Ok(resolution)
    }

    /// Each distinct SDK reference is resolved once per resolver.
    fn resolve_sdk(&self, reference: &SdkReference, project_path: Option<&Path>) -> SdkResult {
        if let Some(result) = self.sdk_results.lock().get(reference) {
            return result.clone();
        }
        let context = SdkResolverContext { project_path };
        let result = self.sdk_resolvers.resolve(reference, &context);
        if let SdkResult::Success { path, version } = &result {
            self.logger.log(&EvaluationEvent::SdkResolved {
                sdk_name: reference.name.clone(),
                path: path.clone(),
                version: version.clone(),
            });
        }
        self.sdk_results.lock().insert(reference.clone(), result.clone());
        result
    }

    fn resolve_project_import(
        &self,
        import: &ImportElement,
        properties: &dyn PropertyLookup,
        directory: &Path,
    ) -> Result<ImportResolution, ProjectError> {
        let guarded = import.condition.is_some();
        let fallback = self.fallback_for(&import.project);
        // With fallbacks in play the condition is checked per candidate value.
        let primary_applies = match (&import.condition, fallback) {
            (Some(condition), Some(_)) => self.conditions.evaluate(condition, &Expander::new(properties, directory))?,
            _ => true,
        };

        let mut primary = None;
        if primary_applies {
            let expanded = Expander::new(properties, directory).expand_properties(&import.project)?;
            let expanded = expanded.trim().to_string();
            if expanded.is_empty() {
                if self.settings.ignore_missing_imports {
                    return Ok(ImportResolution::Ignored(ImportIgnoredReason::EmptyExpansion));
                }
                return Err(ProjectError::import(
                    "MSB4020",
                    format!("The value \"\" of the \"Project\" attribute in element <Import> is invalid. \"{}\" expanded to nothing.", import.project),
                ));
            }
            match locate(&expanded, directory, guarded)? {
                Located::Files(paths) => return Ok(ImportResolution::Files { paths, sdk: None }),
                located => primary = Some((expanded, located)),
            }
        }

        if let Some((property, search_paths)) = fallback {
            for search_path in search_paths {
                if let Some(paths) = self.try_search_path(import, properties, directory, property, search_path)? {
                    return Ok(ImportResolution::Files { paths, sdk: None });
                }
            }
        }

        let Some((expanded, located)) = primary else {
            return Ok(ImportResolution::Ignored(ImportIgnoredReason::FalseCondition));
        };
        let missing = match located {
            Located::Files(_) | Located::NoMatches => return Ok(ImportResolution::Ignored(ImportIgnoredReason::NoMatches)),
            Located::MissingDirectory if guarded => return Ok(ImportResolution::Ignored(ImportIgnoredReason::NoMatches)),
            Located::MissingDirectory => directory.join(fix_separators(&expanded)),
            Located::Missing(path) => path,
        };
        if self.settings.ignore_missing_imports {
            return Ok(ImportResolution::Ignored(ImportIgnoredReason::MissingFile));
        }
        Err(match fallback {
            Some((property, search_paths)) => ProjectError::import(
                "MSB4226",
                format!(
                    "The imported project \"{}\" was not found. Also, tried to find \"{}\" in the fallback search path(s) for $({property}) - \"{}\".",
                    missing.display(),
                    import.project,
                    search_paths.join("\", \""),
                ),
            ),
            None => not_found(&missing, &import.project),
        })
    }

    /// Whether `import` has its condition checked here, once per fallback
    /// candidate, rather than by the caller beforehand.
    pub fn checks_condition(&self, import: &ImportElement) -> bool {
        import.sdk.is_none() && import.condition.is_some() && self.fallback_for(&import.project).is_some()
    }

    /// The toolset fallback property referenced by `project`, if any.
    fn fallback_for(&self, project: &str) -> Option<(&'a str, &'a [String])> {
        let toolset = self.toolset?;
        let lower = project.to_lowercase();
        toolset
            .import_search_paths
            .current()
            .find(|(name, paths)| !paths.is_empty() && lower.contains(&format!("$({})", name.to_lowercase())))
    }

    /// One fallback candidate: `None` when it does not apply or finds nothing.
    fn try_search_path(
        &self,
        import: &ImportElement,
        properties: &dyn PropertyLookup,
        directory: &Path,
        property: &str,
        search_path: &str,
    ) -> Result<Option<Vec<PathBuf>>, ProjectError> {
        let tracker = MissTracker { inner: properties, missed: std::cell::Cell::new(false) };
        let value = Expander::new(&tracker, directory).expand_properties(search_path)?;
        if tracker.missed.get() {
            tracing::debug!(search_path, "fallback search path references an undefined property");
            return Ok(None);
        }

        let overridden = Override { inner: properties, name: property, value: &value };
        let expander = Expander::new(&overridden, directory);
        if let Some(condition) = &import.condition {
            if !self.conditions.evaluate(condition, &expander)? {
                return Ok(None);
            }
        }
        let expanded = expander.expand_properties(&import.project)?;
        match locate(expanded.trim(), directory, true)? {
            Located::Files(paths) => {
                tracing::debug!(property, value = %value, "import found in fallback search path");
                Ok(Some(paths))
            }
            _ => Ok(None),
        }
    }
}

fn not_found(path: &Path, project: &str) -> ProjectError {
    ProjectError::import(
        "MSB4019",
        format!(
            "The imported project \"{}\" was not found. Confirm that the expression in the Import declaration \"{project}\" is correct, and that the file exists on disk.",
            path.display()
        ),
    )
}

/// Find the file(s) `pattern` names relative to `directory`.
fn locate(pattern: &str, directory: &Path, guarded: bool) -> Result<Located, ProjectError> {
    let path = normalize_path(&directory.join(fix_separators(pattern)));
    if !has_wildcards(pattern) {
        return Ok(if path.is_file() { Located::Files(vec![path]) } else { Located::Missing(path) });
    }
    if !wildcard_directory(&path).is_dir() {
        tracing::debug!(pattern, guarded, "wildcard import base directory does not exist");
        return Ok(Located::MissingDirectory);
    }
    let files = glob_files(&path)?;
    Ok(if files.is_empty() { Located::NoMatches } else { Located::Files(files) })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingLogger;
    use crate::properties::{PropertyDictionary, PropertyKind, ProjectProperty};
    use crate::sdk::DirectorySdkResolver;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "<Project />").unwrap();
    }

    fn import(project: &str) -> ImportElement {
        ImportElement { project: project.to_string(), ..ImportElement::default() }
    }

    fn importing(dir: &Path) -> ProjectRootElement {
        ProjectRootElement::parse_with_path("<Project />", dir.join("main.proj")).unwrap()
    }

    struct Fixture {
        chain: SdkResolverChain,
        conditions: ConditionEvaluator,
        logger: CollectingLogger,
    }

    impl Fixture {
        fn new(chain: SdkResolverChain) -> Self {
            Self { chain, conditions: ConditionEvaluator::new(), logger: CollectingLogger::new() }
        }

        fn resolver<'a>(&'a self, toolset: Option<&'a Toolset>, settings: LoadSettings) -> ImportResolver<'a> {
            ImportResolver::new(&self.chain, toolset, settings, &self.conditions, &self.logger)
        }
    }

    fn files(resolution: ImportResolution) -> Vec<PathBuf> {
        match resolution {
            ImportResolution::Files { paths, .. } => paths,
            ImportResolution::Ignored(reason) => panic!("ignored: {reason:?}"),
        }
    }

    #[test]
    fn normalize_removes_dots() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn absolute_path_is_rooted() {
        assert!(absolute_path(Path::new("some/file.proj")).is_absolute());
    }

    #[cfg(not(windows))]
    #[test]
    fn backslashes_become_separators() {
        assert_eq!(fix_separators(r"a\b\c.props"), PathBuf::from("a/b/c.props"));
    }

    #[test]
    fn wildcard_directory_stops_at_first_wildcard() {
        assert_eq!(wildcard_directory(Path::new("/a/b/*/c.props")), PathBuf::from("/a/b"));
        assert_eq!(wildcard_directory(Path::new("/a/**/x?.props")), PathBuf::from("/a"));
    }

    #[test]
    fn tracker_classifies() {
        let mut tracker = ImportTracker::new(Some(Path::new("/p/root.proj")));
        assert_eq!(tracker.classify(Path::new("/p/root.proj")), ImportDisposition::Circular);
        assert_eq!(tracker.classify(Path::new("/p/a.props")), ImportDisposition::Fresh);
        tracker.enter(PathBuf::from("/p/a.props"));
        assert_eq!(tracker.classify(Path::new("/p/a.props")), ImportDisposition::Circular);
        tracker.exit();
        assert_eq!(tracker.classify(Path::new("/p/a.props")), ImportDisposition::Duplicate);
        assert_eq!(tracker.chain().len(), 1);
    }

    #[test]
    fn wildcard_imports_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.props", "a.props", "c.targets"] {
            touch(&dir.path().join("ext").join(name));
        }
        touch(&dir.path().join("ext/nested/d.props"));
        let fixture = Fixture::new(SdkResolverChain::new());
        let resolver = fixture.resolver(None, LoadSettings::default());
        let props = PropertyDictionary::new();

        let found = files(resolver.resolve(&import(r"ext\*.props"), &props, &importing(dir.path())).unwrap());
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, ["a.props", "b.props"]);

        let recursive = files(resolver.resolve(&import("ext/**/*.props"), &props, &importing(dir.path())).unwrap());
        assert_eq!(recursive.len(), 3);
    }

    #[test]
    fn wildcard_without_matches_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ext")).unwrap();
        let fixture = Fixture::new(SdkResolverChain::new());
        let resolver = fixture.resolver(None, LoadSettings::default());
        let props = PropertyDictionary::new();
        let outcome = resolver.resolve(&import("ext/*.props"), &props, &importing(dir.path())).unwrap();
        assert!(matches!(outcome, ImportResolution::Ignored(ImportIgnoredReason::NoMatches)));
    }

    #[test]
    fn missing_wildcard_directory_needs_a_condition() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(SdkResolverChain::new());
        let resolver = fixture.resolver(None, LoadSettings::default());
        let props = PropertyDictionary::new();

        let err = resolver.resolve(&import("nope/*.props"), &props, &importing(dir.path())).unwrap_err();
        assert_eq!(err.code, "MSB4019");

        let mut guarded = import("nope/*.props");
        guarded.condition = Some("true".into());
        let outcome = resolver.resolve(&guarded, &props, &importing(dir.path())).unwrap();
        assert!(matches!(outcome, ImportResolution::Ignored(ImportIgnoredReason::NoMatches)));
    }

    #[test]
    fn missing_and_empty_imports() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(SdkResolverChain::new());
        let props = PropertyDictionary::new();
        let root = importing(dir.path());

        let strict = fixture.resolver(None, LoadSettings::default());
        let err = strict.resolve(&import("missing.props"), &props, &root).unwrap_err();
        assert_eq!((err.kind, err.code), (ErrorKind::ImportResolution, "MSB4019"));
        assert_eq!(err.location.file.as_deref(), root.full_path());
        assert_eq!(strict.resolve(&import("$(Empty)"), &props, &root).unwrap_err().code, "MSB4020");

        let lenient = fixture.resolver(None, LoadSettings::ignore_missing_imports());
        assert!(matches!(
            lenient.resolve(&import("missing.props"), &props, &root).unwrap(),
            ImportResolution::Ignored(ImportIgnoredReason::MissingFile)
        ));
        assert!(matches!(
            lenient.resolve(&import("$(Empty)"), &props, &root).unwrap(),
            ImportResolution::Ignored(ImportIgnoredReason::EmptyExpansion)
        ));
    }

    #[test]
    fn fallback_search_paths_are_tried_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        touch(&second.join("Ext/x.props"));
        std::fs::create_dir_all(&first).unwrap();

        let toolset = Toolset::new("Current", dir.path()).with_import_search_path(
            std::env::consts::OS,
            "MSBuildExtensionsPath",
            [
                "$(Undefined)/never".to_string(),
                first.display().to_string(),
                second.display().to_string(),
            ],
        );
        let mut props = PropertyDictionary::new();
        props.set(ProjectProperty::initial("MSBuildExtensionsPath", dir.path().join("primary").display().to_string(), PropertyKind::Toolset));

        let fixture = Fixture::new(SdkResolverChain::new());
        let resolver = fixture.resolver(Some(&toolset), LoadSettings::default());
        let root = importing(dir.path());
        let found = files(resolver.resolve(&import("$(MSBuildExtensionsPath)/Ext/x.props"), &props, &root).unwrap());
        assert_eq!(found, [second.join("Ext/x.props")]);

        let err = resolver.resolve(&import("$(MSBuildExtensionsPath)/Ext/y.props"), &props, &root).unwrap_err();
        assert_eq!(err.code, "MSB4226");
        assert!(err.message.contains("fallback search path"));
    }

    #[test]
    fn fallback_condition_sees_candidate_value() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        touch(&first.join("x.props"));
        touch(&second.join("x.props"));
        let toolset = Toolset::new("Current", dir.path()).with_import_search_path(
            std::env::consts::OS,
            "Ext",
            [first.display().to_string(), second.display().to_string()],
        );
        let props = PropertyDictionary::new();
        let fixture = Fixture::new(SdkResolverChain::new());
        let resolver = fixture.resolver(Some(&toolset), LoadSettings::default());

        let mut guarded = import("$(Ext)/x.props");
        guarded.condition = Some(format!("'$(Ext)' == '{}'", second.display()));
        let found = files(resolver.resolve(&guarded, &props, &importing(dir.path())).unwrap());
        assert_eq!(found, [second.join("x.props")]);
    }

    #[test]
    fn sdk_imports_resolve_relative_to_sdk() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("sdks/My.Sdk/1.0.0/Sdk/Sdk.props"));
        let fixture = Fixture::new(SdkResolverChain::new().with(DirectorySdkResolver::new(dir.path().join("sdks"))));
        let resolver = fixture.resolver(None, LoadSettings::default());
        let props = PropertyDictionary::new();
        let root = importing(dir.path());

        let mut sdk_import = import("Sdk.props");
        sdk_import.sdk = Some("My.Sdk".into());
        let outcome = resolver.resolve(&sdk_import, &props, &root).unwrap();
        let ImportResolution::Files { paths, sdk: Some((reference, result)) } = outcome else {
            panic!("expected sdk files");
        };
        assert_eq!(paths, [dir.path().join("sdks/My.Sdk/1.0.0/Sdk/Sdk.props")]);
        assert_eq!(reference.name, "My.Sdk");
        assert!(result.is_success());

        // Second resolution hits the per-resolver cache.
        resolver.resolve(&sdk_import, &props, &root).unwrap();
        let resolved = fixture.logger.events().iter().filter(|e| matches!(e, EvaluationEvent::SdkResolved { .. })).count();
        assert_eq!(resolved, 1);

        sdk_import.sdk = Some("Missing.Sdk".into());
        let err = resolver.resolve(&sdk_import, &props, &root).unwrap_err();
        assert_eq!((err.kind, err.code), (ErrorKind::SdkResolution, "MSB4236"));

        sdk_import.sdk = Some("Bad/Name".into());
        assert_eq!(resolver.resolve(&sdk_import, &props, &root).unwrap_err().code, "MSB4229");
    }
}
