//! Toolsets: the tools-version–keyed bundles of initial properties, sub-toolset
//! overlays and import fallback search paths.
//!
//! A [`ToolsetCollection`] can be built in code or loaded from TOML:
//!
//! ```toml
//! default_tools_version = "Current"
//!
//! [[toolset]]
//! tools_version = "Current"
//! tools_path = "/opt/msbuild/bin"
//! default_sub_toolset = "17.0"
//!
//! [toolset.properties]
//! MSBuildExtensionsPath = "/opt/msbuild/ext"
//!
//! [toolset.sub_toolsets."17.0"]
//! VCTargetsPath = "/opt/msbuild/vc"
//!
//! [toolset.import_search_paths.linux]
//! MSBuildExtensionsPath = ["/usr/lib/msbuild", "$(HOME)/.msbuild"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ProjectError;

/// Property selecting the sub-toolset.
pub const SUB_TOOLSET_SELECTOR: &str = "VisualStudioVersion";

/// Fallback search paths per OS, then per property name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ImportSearchPaths {
    by_os: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl ImportSearchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, os: &str, property: &str, paths: impl IntoIterator<Item = impl Into<String>>) {
        self.by_os
            .entry(os.to_lowercase())
            .or_default()
            .entry(property.to_string())
            .or_default()
            .extend(paths.into_iter().map(Into::into));
    }

    /// The table for the running OS. Linux falls back to `unix`.
    pub fn for_current_os(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        let keys: &[&str] = match std::env::consts::OS {
            "windows" => &["windows"],
            "macos" => &["macos", "osx", "unix"],
            "linux" => &["linux", "unix"],
            _ => &["unix"],
        };
        keys.iter().find_map(|k| self.by_os.get(*k))
    }

    /// `(property name, search paths)` pairs for the running OS.
    pub fn current(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.for_current_os()
            .into_iter()
            .flat_map(|table| table.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
    }

    pub fn is_empty(&self) -> bool {
        self.by_os.values().all(BTreeMap::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Toolset {
    pub tools_version: String,
    pub tools_path: PathBuf,
    pub properties: BTreeMap<String, String>,
    pub sub_toolsets: BTreeMap<String, BTreeMap<String, String>>,
    pub default_sub_toolset: Option<String>,
    pub import_search_paths: ImportSearchPaths,
}

impl Toolset {
    pub fn new(tools_version: impl Into<String>, tools_path: impl Into<PathBuf>) -> Self {
        Self { tools_version: tools_version.into(), tools_path: tools_path.into(), ..Self::default() }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_sub_toolset(
        mut self,
        version: impl Into<String>,
        properties: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let table = properties.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.sub_toolsets.insert(version.into(), table);
        self
    }

    pub fn with_default_sub_toolset(mut self, version: impl Into<String>) -> Self {
        self.default_sub_toolset = Some(version.into());
        self
    }

    pub fn with_import_search_path(
        mut self,
        os: &str,
        property: &str,
        paths: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.import_search_paths.add(os, property, paths);
        self
    }

    /// Choose the sub-toolset for an explicit selector value, falling back
    /// to the default one. Unknown selectors select nothing.
    pub fn sub_toolset(&self, selector: Option<&str>) -> Option<(&str, &BTreeMap<String, String>)> {
        let version = selector.or(self.default_sub_toolset.as_deref())?;
        self.sub_toolsets.get_key_value(version).map(|(k, v)| (k.as_str(), v))
    }

    /// Fallback search paths registered for `property` on this OS.
    pub fn search_paths_for(&self, property: &str) -> &[String] {
        self.import_search_paths
            .current()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, paths)| paths)
            .unwrap_or_default()
    }
}

/// Toolsets keyed by tools version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolsetCollection {
    pub default_tools_version: Option<String>,
    #[serde(rename = "toolset")]
    pub toolsets: Vec<Toolset>,
}

impl ToolsetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(source: &str) -> Result<Self, ProjectError> {
        let collection: Self = toml::from_str(source)?;
        if let Some(blank) = collection.toolsets.iter().find(|t| t.tools_version.trim().is_empty()) {
            return Err(ProjectError::configuration(
                "MSB4136",
                format!("Toolset with tools path \"{}\" has no tools_version.", blank.tools_path.display()),
            ));
        }
        Ok(collection)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ProjectError::from(e).in_file(path))?;
        Self::from_toml(&source).map_err(|e| e.in_file(path))
    }

    /// Register a toolset, replacing any with the same tools version.
    pub fn add(&mut self, toolset: Toolset) {
        self.toolsets.retain(|t| !t.tools_version.eq_ignore_ascii_case(&toolset.tools_version));
        self.toolsets.push(toolset);
    }

    pub fn get(&self, tools_version: &str) -> Option<&Toolset> {
        self.toolsets.iter().find(|t| t.tools_version.eq_ignore_ascii_case(tools_version))
    }

    /// The default toolset, or the first registered one.
    pub fn default_toolset(&self) -> Option<&Toolset> {
        self.default_tools_version
            .as_deref()
            .and_then(|v| self.get(v))
            .or_else(|| self.toolsets.first())
    }
}
