//! Evaluation switches.
//!
//! Toggles that MSBuild historically kept in process-wide statics live on an
//! immutable [`EvaluationConfig`] handed to each evaluation. Import policy
//! lives on [`LoadSettings`].

/// Environment variable enabling the uninitialized-property warning.
pub const WARN_ON_UNINITIALIZED_PROPERTY_ENV: &str = "MSBUILDWARNONUNINITIALIZEDPROPERTY";
/// Environment variable switching item type names to case-sensitive matching.
pub const CASE_SENSITIVE_ITEM_NAMES_ENV: &str = "MSBUILDUSECASESENSITIVEITEMNAMES";
/// Environment variable enabling initial-value and environment-read tracking.
pub const LOG_PROPERTY_TRACKING_ENV: &str = "MSBUILDLOGPROPERTYTRACKING";

/// How item type names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameComparison {
    #[default]
    CaseInsensitive,
    CaseSensitive,
}

impl NameComparison {
    /// Key under which a name is stored in a dictionary using this comparison.
    pub fn key(self, name: &str) -> String {
        match self {
            Self::CaseInsensitive => name.to_lowercase(),
            Self::CaseSensitive => name.to_string(),
        }
    }

    pub fn eq(self, a: &str, b: &str) -> bool {
        match self {
            Self::CaseInsensitive => a.eq_ignore_ascii_case(b) || (!a.is_ascii() && a.to_lowercase() == b.to_lowercase()),
            Self::CaseSensitive => a == b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationConfig {
    /// Warn when a property is first assigned after it was already read
    /// while undefined.
    pub warn_on_uninitialized_property: bool,
    pub item_name_comparison: NameComparison,
    pub log_property_reassignment: bool,
    pub log_initial_property_values: bool,
    pub log_environment_reads: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            warn_on_uninitialized_property: false,
            item_name_comparison: NameComparison::CaseInsensitive,
            log_property_reassignment: true,
            log_initial_property_values: false,
            log_environment_reads: false,
        }
    }
}

impl EvaluationConfig {
    /// Defaults overlaid with the `MSBUILD*` switches of the process
    /// environment, read once.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |name: &str| lookup(name).is_some_and(|v| !v.trim().is_empty() && v.trim() != "0");
        let mut config = Self::default();
        if enabled(WARN_ON_UNINITIALIZED_PROPERTY_ENV) {
            config.warn_on_uninitialized_property = true;
        }
        if enabled(CASE_SENSITIVE_ITEM_NAMES_ENV) {
            config.item_name_comparison = NameComparison::CaseSensitive;
        }
        if enabled(LOG_PROPERTY_TRACKING_ENV) {
            config.log_initial_property_values = true;
            config.log_environment_reads = true;
        }
        config
    }

    pub fn with_uninitialized_property_warning(mut self, enabled: bool) -> Self {
        self.warn_on_uninitialized_property = enabled;
        self
    }

    pub fn with_item_name_comparison(mut self, comparison: NameComparison) -> Self {
        self.item_name_comparison = comparison;
        self
    }
}

/// Import-related load flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSettings {
    /// Missing imports, empty import expansions and unresolved SDKs are
    /// logged and skipped instead of failing the evaluation.
    pub ignore_missing_imports: bool,
    /// A circular import fails the evaluation.
    pub reject_circular_imports: bool,
    /// Circular imports are dropped silently; duplicates are still recorded.
    pub record_duplicate_but_not_circular_imports: bool,
}

impl LoadSettings {
    pub fn ignore_missing_imports() -> Self {
        Self { ignore_missing_imports: true, ..Self::default() }
    }

    pub fn reject_circular_imports() -> Self {
        Self { reject_circular_imports: true, ..Self::default() }
    }

    pub fn record_duplicate_but_not_circular_imports() -> Self {
        Self { record_duplicate_but_not_circular_imports: true, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn from_lookup_reads_switches() {
        let vars: HashMap<&str, &str> = [
            (WARN_ON_UNINITIALIZED_PROPERTY_ENV, "1"),
            (CASE_SENSITIVE_ITEM_NAMES_ENV, "true"),
        ]
        .into_iter()
        .collect();
        let config = EvaluationConfig::from_lookup(|n| vars.get(n).map(|v| v.to_string()));
        assert!(config.warn_on_uninitialized_property);
        assert_eq!(config.item_name_comparison, NameComparison::CaseSensitive);
        assert!(!config.log_initial_property_values);
    }

    #[test]
    fn zero_or_blank_disables() {
        let config = EvaluationConfig::from_lookup(|n| {
            (n == WARN_ON_UNINITIALIZED_PROPERTY_ENV).then(|| "0".to_string())
        });
        assert!(!config.warn_on_uninitialized_property);
        let config = EvaluationConfig::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(config, EvaluationConfig::default());
    }

    #[test]
    fn name_comparison_keys() {
        assert_eq!(NameComparison::CaseInsensitive.key("Compile"), "compile");
        assert_eq!(NameComparison::CaseSensitive.key("Compile"), "Compile");
        assert!(NameComparison::CaseInsensitive.eq("FOO", "foo"));
        assert!(!NameComparison::CaseSensitive.eq("FOO", "foo"));
    }
}
