//! SDK references and pluggable SDK resolution.
//!
//! An SDK is a named, optionally versioned bundle of `Sdk.props` and
//! `Sdk.targets` files. Resolvers are tried by ascending priority; the
//! first success wins and failures are aggregated into one error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ProjectError;

// ═══════════════════════════════════════════════════════════════════════════════
//  SdkReference
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SdkReference {
    pub name: String,
    pub version: Option<String>,
    pub minimum_version: Option<String>,
}

impl SdkReference {
    pub fn new(name: impl Into<String>, version: Option<String>, minimum_version: Option<String>) -> Self {
        Self { name: name.into(), version, minimum_version }
    }

    /// Parse `Name`, `Name/Version` or `Name/min=Version`.
    pub fn parse(text: &str) -> Result<Self, ProjectError> {
        let invalid = || {
            ProjectError::configuration(
                "MSB4229",
                format!("The value \"{text}\" is not valid for an Sdk specification. The attribute should be a semicolon-delimited list of Sdk-name/minimum-version pairs, separated by a forward slash."),
            )
        };
        let parts: Vec<&str> = text.trim().split('/').map(str::trim).collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new(*name, None, None)),
            [name, version] if !name.is_empty() && !version.is_empty() => {
                match version.get(..4).filter(|p| p.eq_ignore_ascii_case("min=")) {
                    Some(_) => {
                        let minimum = version[4..].trim();
                        if minimum.is_empty() {
                            return Err(invalid());
                        }
                        Ok(Self::new(*name, None, Some(minimum.to_string())))
                    }
                    None => Ok(Self::new(*name, Some(version.to_string()), None)),
                }
            }
            _ => Err(invalid()),
        }
    }

    /// Parse a `;`-separated list as found in a project's `Sdk` attribute.
    pub fn parse_list(text: &str) -> Result<Vec<Self>, ProjectError> {
        text.split(';').filter(|s| !s.trim().is_empty()).map(Self::parse).collect()
    }
}

impl fmt::Display for SdkReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, &self.minimum_version) {
            (Some(v), _) => write!(f, "{}/{v}", self.name),
            (None, Some(min)) => write!(f, "{}/min={min}", self.name),
            (None, None) => f.write_str(&self.name),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Resolution
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkResult {
    Success { path: PathBuf, version: Option<String> },
    Failure { errors: Vec<String> },
}

impl SdkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success { path, .. } => Some(path),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure { errors: vec![message.into()] }
    }
}

/// What a resolver knows about the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkResolverContext<'a> {
    pub project_path: Option<&'a Path>,
}

pub trait SdkResolver: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    fn resolve(&self, sdk: &SdkReference, context: &SdkResolverContext<'_>) -> SdkResult;
}

/// Ordered set of resolvers.
#[derive(Clone, Default)]
pub struct SdkResolverChain {
    resolvers: Vec<Arc<dyn SdkResolver>>,
}

impl fmt::Debug for SdkResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.resolvers.iter().map(|r| r.name())).finish()
    }
}

impl SdkResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl SdkResolver + 'static) -> Self {
        self.add(Arc::new(resolver));
        self
    }

    pub fn add(&mut self, resolver: Arc<dyn SdkResolver>) {
        self.resolvers.push(resolver);
        self.resolvers.sort_by_key(|r| r.priority());
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, sdk: &SdkReference, context: &SdkResolverContext<'_>) -> SdkResult {
        let mut errors = Vec::new();
        for resolver in &self.resolvers {
            match resolver.resolve(sdk, context) {
                SdkResult::Success { path, version } => {
                    tracing::debug!(resolver = resolver.name(), sdk = %sdk, path = %path.display(), "SDK resolved");
                    return SdkResult::Success { path, version };
                }
                SdkResult::Failure { errors: e } => {
                    errors.extend(e.into_iter().map(|m| format!("{}: {m}", resolver.name())));
                }
            }
        }
        if errors.is_empty() {
            errors.push(format!("No SDK resolver could resolve \"{sdk}\"."));
        }
        SdkResult::Failure { errors }
    }
}

// ─── DirectorySdkResolver ────────────────────────────────────────────────────

/// Resolves SDKs laid out on disk as `<root>/<Name>/<Version>/Sdk` or
/// `<root>/<Name>/Sdk`.
#[derive(Debug, Clone)]
pub struct DirectorySdkResolver {
    root: PathBuf,
    priority: i32,
}

impl DirectorySdkResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), priority: 1000 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// `(version, Sdk dir)` for every versioned layout, unsorted.
    fn versions(&self, sdk_dir: &Path) -> Vec<(Vec<u64>, String, PathBuf)> {
        let Ok(entries) = std::fs::read_dir(sdk_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let version = parse_version(&name)?;
                let sdk = entry.path().join("Sdk");
                sdk.is_dir().then_some((version, name, sdk))
            })
            .collect()
    }
}

impl SdkResolver for DirectorySdkResolver {
    fn name(&self) -> &str {
        "DirectorySdkResolver"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn resolve(&self, sdk: &SdkReference, _context: &SdkResolverContext<'_>) -> SdkResult {
        let sdk_dir = self.root.join(&sdk.name);

        if let Some(version) = &sdk.version {
            let path = sdk_dir.join(version).join("Sdk");
            return if path.is_dir() {
                SdkResult::Success { path, version: Some(version.clone()) }
            } else {
                SdkResult::failure(format!("Version \"{version}\" of SDK \"{}\" was not found under \"{}\".", sdk.name, sdk_dir.display()))
            };
        }

        let minimum = sdk.minimum_version.as_deref().and_then(parse_version);
        let best = self
            .versions(&sdk_dir)
            .into_iter()
            .filter(|(v, _, _)| minimum.as_ref().is_none_or(|min| compare(v, min).is_ge()))
            .max_by(|a, b| compare(&a.0, &b.0));
        if let Some((_, name, path)) = best {
            return SdkResult::Success { path, version: Some(name) };
        }

        let unversioned = sdk_dir.join("Sdk");
        if unversioned.is_dir() {
            return SdkResult::Success { path: unversioned, version: None };
        }
        SdkResult::failure(format!("SDK \"{sdk}\" was not found under \"{}\".", self.root.display()))
    }
}

/// `1.2.3` and `1.2.3-preview`; the suffix is ignored.
fn parse_version(text: &str) -> Option<Vec<u64>> {
    let core = text.split(['-', '+']).next()?;
    let parts: Option<Vec<u64>> = core.split('.').map(|p| p.parse().ok()).collect();
    parts.filter(|p| !p.is_empty())
}

fn compare(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).unwrap_or(&0).cmp(b.get(i).unwrap_or(&0)))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
