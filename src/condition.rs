//! Condition parser and evaluator.
//!
//! Parses and evaluates the `Condition` attributes found on project
//! elements, for example:
//!
//! - `'$(Configuration)|$(Platform)' == 'Debug|AnyCPU'`
//! - `('$(A)' == 'true' and '$(B)' != '') or !Exists('$(Out)')`
//! - `$(MSBuildVersion) >= 16.0`
//!
//! Uses [`chumsky`] for the parsing grammar.
//!
//! ## Grammar (case-insensitive keywords)
//!
//! ```text
//! expr       = or_expr
//! or_expr    = and_expr ('or' and_expr)*
//! and_expr   = not_expr ('and' not_expr)*
//! not_expr   = '!' not_expr | relational
//! relational = factor (('==' | '!=' | '<=' | '>=' | '<' | '>') factor)?
//! factor     = function | '(' expr ')' | quoted | unquoted
//! function   = ident '(' (expr (',' expr)*)? ')'
//! quoted     = "'" chars "'"
//! unquoted   = (reference | [A-Za-z0-9_.+-])+
//! reference  = ('$' | '@' | '%') '(' balanced ')'
//! ```
//!
//! Operands are kept raw and expanded only when evaluated, so `And`/`Or`
//! never expand the side they short-circuit past.

use std::collections::HashMap;
use std::sync::Arc;

use chumsky::prelude::*;
use parking_lot::Mutex;

use crate::error::ProjectError;
use crate::expander::Expander;

// ═══════════════════════════════════════════════════════════════════════════════
//  AST
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Or(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Compare {
        lhs: Box<Expression>,
        op: CompareOp,
        rhs: Box<Expression>,
    },
    /// `Exists('...')`, `HasTrailingSlash('...')`.
    Function { name: String, args: Vec<Expression> },
    /// Text between single quotes, unexpanded.
    Quoted(String),
    /// A bare token such as `$(Flag)`, `true` or `16.0`, unexpanded.
    Unquoted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Chumsky parser
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the chumsky parser for condition expressions.
fn condition_parser<'a>() -> impl Parser<'a, &'a str, Expression, extra::Err<Simple<'a, char>>> {
    // ── Balanced text inside a $( ), @( ) or %( ) reference ─────────────
    let balanced = recursive(|balanced| {
        choice((
            none_of("()'").ignored(),
            just('\'')
                .then(none_of('\'').repeated())
                .then(just('\''))
                .ignored(),
            balanced
                .repeated()
                .delimited_by(just('('), just(')'))
                .ignored(),
        ))
    });

    let reference = one_of("$@%")
        .then(just('('))
        .then(balanced.repeated())
        .then(just(')'))
        .ignored();

    // ── Case-insensitive alphabetic word (for keyword matching) ──────────
    let alpha_word = any()
        .filter(|c: &char| c.is_ascii_alphabetic())
        .repeated()
        .at_least(1)
        .to_slice();

    recursive(|expr| {
        // ── Single-quoted string ─────────────────────────────────────────
        let quoted = just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\''))
            .map(|s: &str| Expression::Quoted(s.to_string()));

        // ── Bare token: references, numbers, true/false ─────────────────
        let unquoted = choice((
            reference,
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+'))
                .ignored(),
        ))
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| Expression::Unquoted(s.to_string()));

        // ── Function call:  Name(arg, ...) ───────────────────────────────
        let ident = any()
            .filter(|c: &char| c.is_ascii_alphabetic())
            .then(any().filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated())
            .to_slice();

        let function = ident
            .then(
                expr.clone()
                    .separated_by(just(',').padded())
                    .collect::<Vec<_>>()
                    .delimited_by(just('(').padded(), just(')').padded()),
            )
            .map(|(name, args): (&str, Vec<Expression>)| Expression::Function { name: name.to_string(), args });

        // ── Parenthesized expression ─────────────────────────────────────
        let paren_expr = expr.clone().delimited_by(just('(').padded(), just(')').padded());

        let factor = choice((function, paren_expr, quoted, unquoted)).padded();

        // ── Relational operators ─────────────────────────────────────────
        let cmp_op = choice((
            just("==").to(CompareOp::Equal),
            just("!=").to(CompareOp::NotEqual),
            just("<=").to(CompareOp::LessOrEqual),
            just(">=").to(CompareOp::GreaterOrEqual),
            just("<").to(CompareOp::Less),
            just(">").to(CompareOp::Greater),
        ))
        .padded();

        let relational = factor
            .clone()
            .then(cmp_op.then(factor).or_not())
            .map(|(lhs, rest)| match rest {
                Some((op, rhs)) => Expression::Compare { lhs: Box::new(lhs), op, rhs: Box::new(rhs) },
                None => lhs,
            });

        // ── '!' binds tighter than 'and' ─────────────────────────────────
        let not_expr = recursive(|not_expr| {
            just('!')
                .padded()
                .ignore_then(not_expr)
                .map(|e| Expression::Not(Box::new(e)))
                .or(relational)
        });

        // ── 'and' — higher precedence than 'or' ─────────────────────────
        let and_kw = alpha_word
            .filter(|s: &&str| s.eq_ignore_ascii_case("and"))
            .padded();

        let and_expr = not_expr.clone().foldl(
            and_kw.ignore_then(not_expr).repeated(),
            |lhs, rhs| Expression::And(Box::new(lhs), Box::new(rhs)),
        );

        // ── 'or' — lowest precedence ────────────────────────────────────
        let or_kw = alpha_word
            .filter(|s: &&str| s.eq_ignore_ascii_case("or"))
            .padded();

        and_expr.clone().foldl(
            or_kw.ignore_then(and_expr).repeated(),
            |lhs, rhs| Expression::Or(Box::new(lhs), Box::new(rhs)),
        )
    })
    .padded()
    .then_ignore(end())
}

/// Parse a condition string into an [`Expression`].
pub fn parse_condition(input: &str) -> Result<Expression, ProjectError> {
    condition_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| {
            let position = errs.first().map_or(0, |e| e.span().start) + 1;
            ProjectError::condition(
                "MSB4092",
                format!("An unexpected token was found at character position {position} in condition \"{input}\"."),
            )
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluate a parsed condition. Relative paths in `Exists` resolve against
/// the expander's directory.
pub fn evaluate(expr: &Expression, condition: &str, expander: &Expander) -> Result<bool, ProjectError> {
    Evaluation { condition, expander }.boolean(expr)
}

struct Evaluation<'c, 'e, 'a> {
    condition: &'c str,
    expander: &'e Expander<'a>,
}

impl Evaluation<'_, '_, '_> {
    fn boolean(&self, expr: &Expression) -> Result<bool, ProjectError> {
        match expr {
            Expression::Or(a, b) => Ok(self.boolean(a)? || self.boolean(b)?),
            Expression::And(a, b) => Ok(self.boolean(a)? && self.boolean(b)?),
            Expression::Not(e) => Ok(!self.boolean(e)?),
            Expression::Compare { lhs, op, rhs } => {
                let l = self.string(lhs)?;
                let r = self.string(rhs)?;
                self.compare(&l, *op, &r)
            }
            Expression::Function { name, args } => self.function(name, args),
            Expression::Quoted(raw) | Expression::Unquoted(raw) => {
                let value = self.expander.expand_into_string(raw)?;
                parse_boolean(&value).ok_or_else(|| {
                    ProjectError::condition(
                        "MSB4113",
                        format!(
                            "Specified condition \"{}\" evaluates to \"{value}\" instead of a boolean.",
                            self.condition
                        ),
                    )
                })
            }
        }
    }

    fn string(&self, expr: &Expression) -> Result<String, ProjectError> {
        match expr {
            Expression::Quoted(raw) | Expression::Unquoted(raw) => self.expander.expand_into_string(raw),
            other => Ok(if self.boolean(other)? { "true" } else { "false" }.to_string()),
        }
    }

    fn function(&self, name: &str, args: &[Expression]) -> Result<bool, ProjectError> {
        let [arg] = args else {
            return Err(self.bad_function(name));
        };
        let value = self.string(arg)?;
        match name.to_ascii_lowercase().as_str() {
            "exists" => {
                let value = value.trim();
                if value.is_empty() {
                    return Ok(false);
                }
                let path = crate::imports::fix_separators(value);
                Ok(self.expander.directory().join(path).exists())
            }
            "hastrailingslash" => Ok(value.ends_with(['/', '\\'])),
            _ => Err(self.bad_function(name)),
        }
    }

    fn bad_function(&self, name: &str) -> ProjectError {
        ProjectError::condition(
            "MSB4091",
            format!("Found a call to an undefined function \"{name}\" in condition \"{}\".", self.condition),
        )
    }

    fn compare(&self, l: &str, op: CompareOp, r: &str) -> Result<bool, ProjectError> {
        if let (Some(a), Some(b)) = (parse_number(l), parse_number(r)) {
            return Ok(match op {
                CompareOp::Equal => a == b,
                CompareOp::NotEqual => a != b,
                CompareOp::Less => a < b,
                CompareOp::LessOrEqual => a <= b,
                CompareOp::Greater => a > b,
                CompareOp::GreaterOrEqual => a >= b,
            });
        }
        match op {
            CompareOp::Equal => Ok(l.eq_ignore_ascii_case(r) || l.to_lowercase() == r.to_lowercase()),
            CompareOp::NotEqual => Ok(!(l.eq_ignore_ascii_case(r) || l.to_lowercase() == r.to_lowercase())),
            _ => {
                let (Some(a), Some(b)) = (parse_version(l), parse_version(r)) else {
                    return Err(ProjectError::condition(
                        "MSB4086",
                        format!(
                            "A numeric comparison was attempted on \"{l}\" that evaluates to \"{r}\" instead of a number, in condition \"{}\".",
                            self.condition
                        ),
                    ));
                };
                let ordering = compare_versions(&a, &b);
                Ok(match op {
                    CompareOp::Less => ordering.is_lt(),
                    CompareOp::LessOrEqual => ordering.is_le(),
                    CompareOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    let (negated, word) = match value.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let truth = match word.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" => true,
        "false" | "off" | "no" => false,
        _ => return None,
    };
    Some(truth != negated)
}

/// Decimal or `0x` hexadecimal.
fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    let numeric = !value.is_empty()
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'));
    numeric.then(|| value.parse::<f64>().ok()).flatten()
}

fn parse_version(value: &str) -> Option<Vec<u64>> {
    let parts: Vec<&str> = value.trim().split('.').collect();
    if parts.len() > 4 {
        return None;
    }
    parts.iter().map(|p| p.parse::<u64>().ok()).collect()
}

fn compare_versions(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Cached evaluator
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses each distinct condition string once. A failed evaluation drops
/// the cached parse, so the next call starts from a clean parse.
#[derive(Debug, Default)]
pub struct ConditionEvaluator {
    cache: Mutex<HashMap<String, Arc<Expression>>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty or blank condition is true.
    pub fn evaluate(&self, condition: &str, expander: &Expander) -> Result<bool, ProjectError> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        let expr = self.parse(condition)?;
        evaluate(&expr, condition, expander).inspect_err(|_| {
            self.cache.lock().remove(condition);
        })
    }

    /// Re-evaluation for diagnostics only: failures are swallowed.
    pub fn evaluate_for_logging(&self, condition: &str, expander: &Expander) -> Option<bool> {
        self.evaluate(condition, expander).ok()
    }

    pub fn parse(&self, condition: &str) -> Result<Arc<Expression>, ProjectError> {
        if let Some(expr) = self.cache.lock().get(condition) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse_condition(condition)?);
        self.cache.lock().insert(condition.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn is_cached(&self, condition: &str) -> bool {
        self.cache.lock().contains_key(condition)
    }
}

/// Parse and evaluate without caching.
pub fn evaluate_condition(condition: &str, expander: &Expander) -> Result<bool, ProjectError> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    evaluate(&parse_condition(condition)?, condition, expander)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{ProjectProperty, PropertyDictionary, PropertyKind};
    use std::path::Path;

    fn make_vars(pairs: &[(&str, &str)]) -> PropertyDictionary {
        let mut d = PropertyDictionary::new();
        for (k, v) in pairs {
            d.set(ProjectProperty::initial(*k, *v, PropertyKind::Global));
        }
        d
    }

    fn eval(condition: &str, pairs: &[(&str, &str)]) -> Result<bool, ProjectError> {
        let vars = make_vars(pairs);
        let expander = Expander::new(&vars, Path::new("."));
        evaluate_condition(condition, &expander)
    }

    // ── Condition parsing ────────────────────────────────────────────────

    #[test]
    fn parse_simple_equality() {
        let expr = parse_condition("'$(Config)'=='Base'").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                lhs: Box::new(Expression::Quoted("$(Config)".into())),
                op: CompareOp::Equal,
                rhs: Box::new(Expression::Quoted("Base".into())),
            }
        );
    }

    #[test]
    fn parse_spaced_operators() {
        let expr = parse_condition(" '$(Configuration)' == '' ").unwrap();
        assert!(matches!(expr, Expression::Compare { op: CompareOp::Equal, .. }));
    }

    #[test]
    fn parse_precedence() {
        let expr = parse_condition("'a'=='a' or 'b'=='b' And !'c'=='c'").unwrap();
        match &expr {
            Expression::Or(_, rhs) => match rhs.as_ref() {
                Expression::And(_, not) => assert!(matches!(not.as_ref(), Expression::Not(_))),
                other => panic!("expected And, got {other:?}"),
            },
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_unquoted_references() {
        let expr = parse_condition("$(A.Contains('x)')) == true").unwrap();
        assert_eq!(
            expr,
            Expression::Compare {
                lhs: Box::new(Expression::Unquoted("$(A.Contains('x)'))".into())),
                op: CompareOp::Equal,
                rhs: Box::new(Expression::Unquoted("true".into())),
            }
        );
        assert!(parse_condition("@(Compile) != ''").is_ok());
        assert!(parse_condition("$(V) >= 16.0").is_ok());
    }

    #[test]
    fn parse_functions() {
        let expr = parse_condition("Exists ( '$(Dir)\\a.props' )").unwrap();
        assert!(matches!(&expr, Expression::Function { name, args } if name == "Exists" && args.len() == 1));
        assert!(parse_condition("!HasTrailingSlash('$(Out)')").is_ok());
    }

    #[test]
    fn parse_errors_report_position() {
        let err = parse_condition("'a' == 'b' and").unwrap_err();
        assert_eq!(err.code, "MSB4092");
        assert!(err.message.contains("'a' == 'b' and"), "{}", err.message);
        assert!(parse_condition("('a' == 'b'").is_err());
        assert!(parse_condition("'unterminated").is_err());
        assert!(parse_condition("'a' === 'b'").is_err());
    }

    // ── Evaluation ───────────────────────────────────────────────────────

    #[test]
    fn eval_string_comparisons() {
        assert!(eval("'$(Config)'=='debug'", &[("Config", "Debug")]).unwrap());
        assert!(!eval("'$(Config)'=='Release'", &[("Config", "Debug")]).unwrap());
        assert!(eval("'$(Base)'!=''", &[("Base", "true")]).unwrap());
        assert!(!eval("'$(Base)'!=''", &[]).unwrap());
    }

    #[test]
    fn eval_boolean_logic() {
        let input = "('$(Platform)'=='Win32' and '$(Base)'=='true') or '$(Base_Win32)'!=''";
        assert!(eval(input, &[("Platform", "Win32"), ("Base", "true")]).unwrap());
        assert!(eval(input, &[("Base_Win32", "true")]).unwrap());
        assert!(!eval(input, &[("Platform", "Win64"), ("Base", "true")]).unwrap());
        assert!(eval("!false", &[]).unwrap());
        assert!(eval("$(Flag)", &[("Flag", "ON")]).unwrap());
        assert!(!eval("'$(Flag)'", &[("Flag", "!yes")]).unwrap());
    }

    #[test]
    fn eval_numeric_and_version() {
        assert!(eval("$(V) >= 16.0", &[("V", "16")]).unwrap());
        assert!(eval("'1.0' == '1'", &[]).unwrap());
        assert!(eval("0x10 == 16", &[]).unwrap());
        assert!(eval("'1.2.10' > '1.2.9'", &[]).unwrap());
        assert!(eval("'3' < '10'", &[]).unwrap());
        let err = eval("'abc' < 'def'", &[]).unwrap_err();
        assert_eq!(err.code, "MSB4086");
    }

    #[test]
    fn eval_non_boolean_is_an_error() {
        let err = eval("'$(X)'", &[("X", "maybe")]).unwrap_err();
        assert_eq!(err.code, "MSB4113");
        assert_eq!(eval("Bogus('x')", &[]).unwrap_err().code, "MSB4091");
    }

    #[test]
    fn eval_short_circuits() {
        assert!(!eval("false and 'x' < 'y'", &[]).unwrap());
        assert!(eval("true or 'x' < 'y'", &[]).unwrap());
    }

    #[test]
    fn eval_exists_and_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("here.txt"), "").unwrap();
        let vars = make_vars(&[]);
        let expander = Expander::new(&vars, dir.path());
        assert!(evaluate_condition("Exists('here.txt')", &expander).unwrap());
        assert!(!evaluate_condition("Exists('gone.txt')", &expander).unwrap());
        assert!(!evaluate_condition("Exists('')", &expander).unwrap());
        assert!(evaluate_condition("HasTrailingSlash('a/')", &expander).unwrap());
        assert!(!evaluate_condition("HasTrailingSlash('a')", &expander).unwrap());
    }

    // ── Cache behaviour ──────────────────────────────────────────────────

    #[test]
    fn failed_evaluation_resets_cached_parse() {
        let evaluator = ConditionEvaluator::new();
        let vars = make_vars(&[("X", "abc")]);
        let expander = Expander::new(&vars, Path::new("."));

        assert!(evaluator.evaluate("'$(X)' == 'abc'", &expander).unwrap());
        assert!(evaluator.is_cached("'$(X)' == 'abc'"));

        assert!(evaluator.evaluate("'$(X)' < 'b'", &expander).is_err());
        assert!(!evaluator.is_cached("'$(X)' < 'b'"));

        let numeric = make_vars(&[("X", "1")]);
        let expander = Expander::new(&numeric, Path::new("."));
        assert!(evaluator.evaluate("'$(X)' < 'b'", &expander).is_err());
        assert!(evaluator.evaluate("'$(X)' < '2'", &expander).unwrap());

        assert!(evaluator.evaluate("'a' ==", &expander).is_err());
        assert!(!evaluator.is_cached("'a' =="));
        assert!(evaluator.evaluate("'a' == 'a'", &expander).unwrap());
    }

    #[test]
    fn logging_evaluation_swallows_errors() {
        let evaluator = ConditionEvaluator::new();
        let vars = make_vars(&[]);
        let expander = Expander::new(&vars, Path::new("."));
        assert_eq!(evaluator.evaluate_for_logging("'x' < 'y'", &expander), None);
        assert_eq!(evaluator.evaluate_for_logging("true or 'x' < 'y'", &expander), Some(true));
        assert!(evaluator.evaluate("", &expander).unwrap());
    }

    // ── A corpus of real-world conditions ────────────────────────────────

    #[test]
    fn parse_real_conditions() {
        let conditions = [
            "'$(Config)'==''",
            " '$(Configuration)' == '' ",
            "'$(Config)'=='Base' or '$(Base)'!=''",
            "('$(Platform)'=='Win32' and '$(Cfg_1)'=='true') or '$(Cfg_1_Win32)'!=''",
            "'$(Config)'=='Debug' And '$(Platform)'=='Win64'",
            "Exists('$(BDS)\\Bin\\CodeGear.Delphi.Targets')",
            "Exists('$(MSBuildProjectName).deployproj')",
            "'$(Configuration)|$(Platform)' == 'Debug|AnyCPU'",
            "'$(TargetFrameworkIdentifier)' == '.NETFramework' and '$(TargetFrameworkVersion.TrimStart(vV))' < '4.0'",
            "'$(ImportDirectoryBuildProps)' == 'true' and exists('$(DirectoryBuildPropsPath)')",
            "!$([MSBuild]::ValueOrDefault('$(Flag)', 'false'))",
            "$(MSBuildAssemblyVersion) != '' and $(MSBuildAssemblyVersion) >= 16.0",
            "'@(Compile->Count())' > 0",
            "'%(Culture)' != ''",
        ];

        for cond in &conditions {
            let result = parse_condition(cond);
            assert!(result.is_ok(), "Failed to parse condition: {cond}\n  Error: {}", result.unwrap_err());
        }
    }
}
