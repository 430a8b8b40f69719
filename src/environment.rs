//! Environment seeding.
//!
//! Environment properties are the lowest layer of evaluation. Besides the
//! process environment they can come from batch-style scripts containing
//! `@SET KEY=VALUE` lines, with `%VAR%` references expanded in document
//! order.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ProjectError;
use crate::evaluator::is_reserved_property_name;
use crate::shredder::is_valid_name;

/// Expand `%VAR%` references in a value using the already-accumulated map.
/// Unknown variables fall back to `fallback`, then to the empty string.
fn expand_percent_vars(s: &str, vars: &HashMap<String, String>, fallback: &dyn Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '%' {
            let var_name: String = chars.by_ref().take_while(|&ch| ch != '%').collect();
            let found = vars
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&var_name))
                .map(|(_, v)| v.clone())
                .or_else(|| fallback(&var_name));
            if let Some(val) = found {
                result.push_str(&val);
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Parse the contents of a `SET` script into a variable map.
///
/// Each line of the form `@SET KEY=VALUE` or `SET KEY=VALUE` (case-insensitive)
/// is parsed; everything else is skipped. Unknown `%VAR%` references fall
/// back to the process environment.
///
/// ```
/// let vars = msproj_eval::environment::parse_env_script("@SET ROOT=C:\\sdk\n@SET BIN=%ROOT%\\bin\n");
/// assert_eq!(vars["BIN"], r"C:\sdk\bin");
/// ```
pub fn parse_env_script(content: &str) -> HashMap<String, String> {
    parse_env_script_with(content, &|name| std::env::var(name).ok())
}

/// [`parse_env_script`] with an explicit source for unknown variables.
pub fn parse_env_script_with(content: &str, fallback: &dyn Fn(&str) -> Option<String>) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in content.lines() {
        let trimmed = line.trim();
        let rest = trimmed.strip_prefix('@').unwrap_or(trimmed);

        let rest = match rest.get(..3) {
            Some(kw) if kw.eq_ignore_ascii_case("set") => &rest[3..],
            _ => continue,
        };
        // `SETX`, `SETLOCAL` and friends are not assignments.
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let rest = rest.trim_start();

        let Some(eq_pos) = rest.find('=') else {
            continue;
        };

        let key = rest[..eq_pos].trim().to_string();
        if key.is_empty() {
            continue;
        }

        let raw_value = &rest[eq_pos + 1..];
        let value = if raw_value.contains('%') {
            expand_percent_vars(raw_value, &vars, fallback)
        } else {
            raw_value.to_string()
        };

        vars.insert(key, value);
    }

    vars
}

pub fn parse_env_script_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>, ProjectError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::from(e).in_file(path))?;
    Ok(parse_env_script(&content))
}

/// Whether a variable can become an environment property.
pub fn is_environment_property(name: &str) -> bool {
    is_valid_name(name) && !is_reserved_property_name(name)
}

/// The variables of `env` that can become properties, sorted by name.
pub fn environment_properties(env: &HashMap<String, String>) -> Vec<(&str, &str)> {
    let mut vars: Vec<(&str, &str)> = env
        .iter()
        .filter(|(k, _)| is_environment_property(k))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    vars.sort_unstable_by(|a, b| a.0.cmp(b.0));
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fallback(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parse_basic_set_lines() {
        let content = "\
@SET SDKROOT=C:\\Program Files\\Sdk
@SET SDKINCLUDE=C:\\Program Files\\Sdk\\include
";
        let vars = parse_env_script(content);
        assert_eq!(vars["SDKROOT"], "C:\\Program Files\\Sdk");
        assert_eq!(vars["SDKINCLUDE"], "C:\\Program Files\\Sdk\\include");
    }

    #[test]
    fn expand_percent_references() {
        let content = "\
@SET ROOT=C:\\Sdk
@SET ROOTBIN=%ROOT%\\bin
@SET ROOTLIB=%root%\\lib
";
        let vars = parse_env_script_with(content, &no_fallback);
        assert_eq!(vars["ROOTBIN"], "C:\\Sdk\\bin");
        assert_eq!(vars["ROOTLIB"], "C:\\Sdk\\lib");
    }

    #[test]
    fn handles_empty_value() {
        let vars = parse_env_script("@SET PLATFORM=\n@SET SDK=\n");
        assert_eq!(vars["PLATFORM"], "");
        assert_eq!(vars["SDK"], "");
    }

    #[test]
    fn case_insensitive_set_keyword() {
        let vars = parse_env_script("SET ROOT=C:\\Sdk\nset FOO=bar\n@Set BAZ=qux\n");
        assert_eq!(vars["ROOT"], "C:\\Sdk");
        assert_eq!(vars["FOO"], "bar");
        assert_eq!(vars["BAZ"], "qux");
    }

    #[test]
    fn skips_non_set_lines() {
        let content = "\
@echo off
REM This is a comment
SETLOCAL
@SET ROOT=C:\\Sdk
:: another comment
";
        let vars = parse_env_script(content);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["ROOT"], "C:\\Sdk");
    }

    #[test]
    fn unknown_percent_var_expands_to_empty() {
        let vars = parse_env_script_with("@SET FOO=%NOT_DEFINED_ANYWHERE%;rest\n", &no_fallback);
        assert_eq!(vars["FOO"], ";rest");
    }

    #[test]
    fn percent_var_falls_back() {
        let fallback = |name: &str| (name == "OUTER").then(|| "x".to_string());
        let vars = parse_env_script_with("@SET P=%OUTER%;%P%\n", &fallback);
        assert_eq!(vars["P"], "x;");
    }

    #[test]
    fn percent_var_falls_back_to_system_env() {
        let vars = parse_env_script("@SET MY_PATH=%PATH%\n");
        assert_eq!(vars["MY_PATH"], std::env::var("PATH").unwrap_or_default());
    }

    #[test]
    fn file_variant_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("vars.bat");
        std::fs::write(&file, "@SET A=1\n").unwrap();
        assert_eq!(parse_env_script_file(&file).unwrap()["A"], "1");

        let err = parse_env_script_file(dir.path().join("missing.bat")).unwrap_err();
        assert_eq!(err.location.file.as_deref(), Some(dir.path().join("missing.bat").as_path()));
    }

    #[test]
    fn invalid_and_reserved_names_are_skipped() {
        let env: HashMap<String, String> = [
            ("Good", "1"),
            ("ProgramFiles(x86)", "2"),
            ("1BAD", "3"),
            ("MSBuildProjectFile", "4"),
            ("Another_One", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let props = environment_properties(&env);
        assert_eq!(props, [("Another_One", "5"), ("Good", "1")]);
    }
}
