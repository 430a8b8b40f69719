//! Expansion of `$(property)`, `@(item)` and `%(metadata)` references.
//!
//! Expansion order for a full string is metadata, then properties, then
//! items. Item vectors are only expanded when an item source is attached;
//! without one they stay literal, which is what the property pass wants.
//! Likewise metadata stays literal without a metadata context.
//!
//! Property functions cover the string instance methods and the
//! `[MSBuild]`, `[System.String]` and `[System.IO.Path]` static functions
//! projects actually use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ProjectError;
use crate::properties::{ItemDefinition, ItemDictionary, ProjectItem, PropertyDictionary, with_trailing_separator};
use crate::shredder::{self, ItemExpressionCapture, TransformCapture};

// ═══════════════════════════════════════════════════════════════════════════════
//  Lookup seams
// ═══════════════════════════════════════════════════════════════════════════════

pub trait PropertyLookup {
    /// Current value, or `None` when the property was never set.
    fn get_property_value(&self, name: &str) -> Option<String>;
}

pub trait ItemLookup {
    fn get_items(&self, item_type: &str) -> Vec<Arc<ProjectItem>>;
}

pub trait MetadataLookup {
    /// `None` means "no context", leaving the reference literal.
    fn get_metadata_value(&self, item_type: Option<&str>, name: &str) -> Option<String>;
}

impl PropertyLookup for PropertyDictionary {
    fn get_property_value(&self, name: &str) -> Option<String> {
        self.get_value(name).map(String::from)
    }
}

impl ItemLookup for ItemDictionary {
    fn get_items(&self, item_type: &str) -> Vec<Arc<ProjectItem>> {
        self.get(item_type).to_vec()
    }
}

impl MetadataLookup for ProjectItem {
    fn get_metadata_value(&self, item_type: Option<&str>, name: &str) -> Option<String> {
        match item_type {
            Some(t) if !t.eq_ignore_ascii_case(self.item_type()) => Some(String::new()),
            _ => Some(ProjectItem::get_metadata_value(self, name)),
        }
    }
}

impl MetadataLookup for ItemDefinition {
    fn get_metadata_value(&self, item_type: Option<&str>, name: &str) -> Option<String> {
        match item_type {
            Some(t) if !t.eq_ignore_ascii_case(self.item_type()) => Some(String::new()),
            _ => Some(ItemDefinition::get_metadata_value(self, name).unwrap_or_default().to_string()),
        }
    }
}

/// One element produced by an item vector, with the item it came from.
#[derive(Debug, Clone)]
pub struct ExpandedItem {
    pub value: String,
    pub source: Option<Arc<ProjectItem>>,
}

/// Result of expanding an item `Include`.
#[derive(Debug, Clone)]
pub enum IncludeFragment {
    /// Came out of an `@(...)` vector.
    Item(ExpandedItem),
    /// Plain text: a path or a wildcard pattern.
    Text(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Expander
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy)]
pub struct Expander<'a> {
    properties: &'a dyn PropertyLookup,
    items: Option<&'a dyn ItemLookup>,
    metadata: Option<&'a dyn MetadataLookup>,
    directory: &'a Path,
}

impl<'a> Expander<'a> {
    /// `directory` anchors relative paths in path functions.
    pub fn new(properties: &'a dyn PropertyLookup, directory: &'a Path) -> Self {
        Self { properties, items: None, metadata: None, directory }
    }

    pub fn with_items(mut self, items: &'a dyn ItemLookup) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_metadata(mut self, metadata: &'a dyn MetadataLookup) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn directory(&self) -> &Path {
        self.directory
    }

    /// Metadata, then properties, then items.
    pub fn expand_into_string(&self, text: &str) -> Result<String, ProjectError> {
        let text = self.expand_metadata(text)?;
        let text = self.expand_properties(&text)?;
        self.expand_items(&text)
    }

    // ─── Properties ──────────────────────────────────────────────────────

    pub fn expand_properties(&self, text: &str) -> Result<String, ProjectError> {
        if !text.contains("$(") {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        let mut i = 0;
        while let Some(offset) = text[i..].find("$(") {
            let start = i + offset;
            let Some(close) = find_closing_paren(text, start + 1) else {
                break;
            };
            out.push_str(&text[copied..start]);
            out.push_str(&self.expand_property_body(&text[start + 2..close])?);
            i = close + 1;
            copied = i;
        }
        out.push_str(&text[copied..]);
        Ok(out)
    }

    fn expand_property_body(&self, body: &str) -> Result<String, ProjectError> {
        let body = body.trim();
        if shredder::is_valid_name(body) {
            return Ok(self.properties.get_property_value(body).unwrap_or_default());
        }
        if body.get(..9).is_some_and(|prefix| prefix.eq_ignore_ascii_case("registry:")) {
            return Ok(String::new());
        }
        FunctionCall { expander: self, text: body }.evaluate().map(Value::into_string)
    }

    // ─── Metadata ────────────────────────────────────────────────────────

    /// Replace `%(...)` outside item vectors. Without a metadata context the
    /// text is returned unchanged.
    pub fn expand_metadata(&self, text: &str) -> Result<String, ProjectError> {
        let Some(metadata) = self.metadata else {
            return Ok(text.to_string());
        };
        let references = shredder::get_metadata_references(text);
        if references.is_empty() {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        for (start, end, reference) in references {
            out.push_str(&text[copied..start]);
            match metadata.get_metadata_value(reference.item_type.as_deref(), &reference.name) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&text[start..end]),
            }
            copied = end;
        }
        out.push_str(&text[copied..]);
        Ok(out)
    }

    // ─── Items ───────────────────────────────────────────────────────────

    /// Replace each `@(...)` with its values joined by the separator
    /// (default `;`).
    pub fn expand_items(&self, text: &str) -> Result<String, ProjectError> {
        if self.items.is_none() {
            return Ok(text.to_string());
        }
        let captures = shredder::get_referenced_item_expressions(text);
        if captures.is_empty() {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        for capture in &captures {
            out.push_str(&text[copied..capture.index]);
            let values = self.evaluate_item_vector(capture)?;
            let separator = capture.separator.as_deref().unwrap_or(";");
            let joined: Vec<&str> = values.iter().map(|v| v.value.as_str()).collect();
            out.push_str(&joined.join(separator));
            copied = capture.end();
        }
        out.push_str(&text[copied..]);
        Ok(out)
    }

    /// Expand an item `Include`/`Exclude`/`Remove` into fragments. A list
    /// entry that is exactly one vector keeps the items it came from so
    /// their metadata can be copied.
    pub fn expand_include(&self, include: &str) -> Result<Vec<IncludeFragment>, ProjectError> {
        let expanded = self.expand_properties(&self.expand_metadata(include)?)?;
        let mut fragments = Vec::new();
        for entry in shredder::split_semicolon_separated_list(&expanded) {
            let captures = if self.items.is_some() {
                shredder::get_referenced_item_expressions(&entry)
            } else {
                Vec::new()
            };
            match captures.as_slice() {
                [only] if only.index == 0 && only.length == entry.len() && only.separator.is_none() => {
                    fragments.extend(self.evaluate_item_vector(only)?.into_iter().map(IncludeFragment::Item));
                }
                _ => {
                    let text = self.expand_items(&entry)?;
                    fragments.extend(
                        shredder::split_semicolon_separated_list(&text).into_iter().map(IncludeFragment::Text),
                    );
                }
            }
        }
        Ok(fragments)
    }

    pub fn evaluate_item_vector(&self, capture: &ItemExpressionCapture) -> Result<Vec<ExpandedItem>, ProjectError> {
        let Some(items) = self.items else {
            return Ok(Vec::new());
        };
        let mut current: Vec<ExpandedItem> = items
            .get_items(&capture.item_type)
            .into_iter()
            .map(|item| ExpandedItem { value: item.evaluated_include().to_string(), source: Some(item) })
            .collect();
        for transform in &capture.transforms {
            current = self.apply_transform(current, transform, capture)?;
        }
        Ok(current)
    }

    fn apply_transform(
        &self,
        current: Vec<ExpandedItem>,
        transform: &TransformCapture,
        capture: &ItemExpressionCapture,
    ) -> Result<Vec<ExpandedItem>, ProjectError> {
        match transform {
            TransformCapture::Quoted { value, .. } => {
                let mut out = Vec::with_capacity(current.len());
                for element in current {
                    let text = match &element.source {
                        Some(item) => self.with_metadata(&**item).expand_metadata(value)?,
                        None => value.clone(),
                    };
                    if !text.is_empty() {
                        out.push(ExpandedItem { value: text, source: element.source });
                    }
                }
                Ok(out)
            }
            TransformCapture::Function { name, arguments, .. } => {
                let args = match arguments {
                    Some(raw) => split_arguments(raw)
                        .into_iter()
                        .map(|a| self.evaluate_argument(&a))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => Vec::new(),
                };
                item_function(current, name, &args).ok_or_else(|| {
                    ProjectError::syntax(
                        "MSB4186",
                        format!("Invalid static method invocation syntax: \"{}\". The item function \"{name}\" with {} argument(s) is not supported.", capture.value, args.len()),
                    )
                })
            }
        }
    }

    /// A function argument: quotes stripped, properties expanded.
    fn evaluate_argument(&self, raw: &str) -> Result<String, ProjectError> {
        let raw = raw.trim();
        let inner = strip_quotes(raw).unwrap_or(raw);
        self.expand_properties(inner)
    }
}

fn metadata_of(element: &ExpandedItem, name: &str) -> String {
    element.source.as_ref().map(|i| i.get_metadata_value(name)).unwrap_or_default()
}

fn item_function(current: Vec<ExpandedItem>, name: &str, args: &[String]) -> Option<Vec<ExpandedItem>> {
    let scalar = |value: String| vec![ExpandedItem { value, source: None }];
    let out = match (name.to_ascii_lowercase().as_str(), args) {
        ("distinct", []) => {
            let mut seen = std::collections::HashSet::new();
            current.into_iter().filter(|e| seen.insert(e.value.to_lowercase())).collect()
        }
        ("reverse", []) => current.into_iter().rev().collect(),
        ("count", []) => scalar(current.len().to_string()),
        ("clearmetadata", []) => current
            .into_iter()
            .map(|e| ExpandedItem {
                source: e.source.map(|i| {
                    let mut cleared = (*i).clone();
                    cleared.clear_metadata();
                    Arc::new(cleared)
                }),
                value: e.value,
            })
            .collect(),
        ("hasmetadata", [m]) => current.into_iter().filter(|e| !metadata_of(e, m).is_empty()).collect(),
        ("withmetadatavalue", [m, v]) => {
            current.into_iter().filter(|e| metadata_of(e, m).eq_ignore_ascii_case(v)).collect()
        }
        ("anyhavemetadatavalue", [m, v]) => {
            let any = current.iter().any(|e| metadata_of(e, m).eq_ignore_ascii_case(v));
            scalar(if any { "true" } else { "false" }.to_string())
        }
        ("metadata", [m]) => current
            .into_iter()
            .filter_map(|e| {
                let value = metadata_of(&e, m);
                (!value.is_empty()).then_some(ExpandedItem { value, source: e.source })
            })
            .collect(),
        _ => return None,
    };
    Some(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Property functions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl Value {
    fn into_string(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::List(items) => items.join(";"),
        }
    }
}

/// One `$( ... )` body that is not a plain property name.
struct FunctionCall<'e, 'a> {
    expander: &'e Expander<'a>,
    text: &'e str,
}

impl FunctionCall<'_, '_> {
    fn error(&self, reason: impl std::fmt::Display) -> ProjectError {
        ProjectError::syntax(
            "MSB4184",
            format!("The expression \"$({})\" cannot be evaluated. {reason}", self.text),
        )
    }

    fn evaluate(&self) -> Result<Value, ProjectError> {
        let text = self.text;
        let mut i;
        let mut value = if text.starts_with('[') {
            let close = text.find(']').ok_or_else(|| self.error("Missing ']'"))?;
            let type_name = text[1..close].trim();
            i = close + 1;
            skip_ws(text, &mut i);
            if !text[i..].starts_with("::") {
                return Err(self.error("Expected '::' after the type name"));
            }
            i += 2;
            skip_ws(text, &mut i);
            let (member, args) = self.member(&mut i)?;
            self.call_static(type_name, member, args)?
        } else {
            let end = text
                .char_indices()
                .find(|&(_, c)| !shredder::is_valid_name_char(c))
                .map_or(text.len(), |(j, _)| j);
            let name = &text[..end];
            if !shredder::is_valid_name(name) {
                return Err(self.error("Invalid property name"));
            }
            i = end;
            Value::Str(self.expander.properties.get_property_value(name).unwrap_or_default())
        };

        loop {
            skip_ws(text, &mut i);
            if i >= text.len() {
                break;
            }
            if !text[i..].starts_with('.') {
                return Err(self.error(format!("Unexpected character '{}'", &text[i..])));
            }
            i += 1;
            let (member, args) = self.member(&mut i)?;
            value = self.call_instance(value, member, args)?;
        }
        Ok(value)
    }

    /// `Name` or `Name(args)`; arguments come back evaluated.
    fn member(&self, i: &mut usize) -> Result<(&str, Option<Vec<String>>), ProjectError> {
        let text = self.text;
        let start = *i;
        while let Some(c) = text[*i..].chars().next() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            *i += c.len_utf8();
        }
        if *i == start {
            return Err(self.error("Expected a member name"));
        }
        let name = &text[start..*i];
        skip_ws(text, i);
        if !text[*i..].starts_with('(') {
            return Ok((name, None));
        }
        let close = find_closing_paren(text, *i).ok_or_else(|| self.error("Missing ')'"))?;
        let raw = &text[*i + 1..close];
        *i = close + 1;
        let args = split_arguments(raw)
            .iter()
            .map(|a| self.expander.evaluate_argument(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((name, Some(args)))
    }

    fn call_static(&self, type_name: &str, member: &str, args: Option<Vec<String>>) -> Result<Value, ProjectError> {
        let args = args.unwrap_or_default();
        let member_lc = member.to_ascii_lowercase();
        let unknown = || self.error(format!("The function \"{member}\" on type \"{type_name}\" is not available."));
        match type_name.to_ascii_lowercase().as_str() {
            "msbuild" => match (member_lc.as_str(), args.as_slice()) {
                ("add" | "subtract" | "multiply" | "divide" | "modulo", [a, b]) => self.arithmetic(&member_lc, a, b),
                ("valueordefault", [a, b]) => Ok(Value::Str(if a.is_empty() { b.clone() } else { a.clone() })),
                ("ensuretrailingslash", [s]) => {
                    let mut s = s.clone();
                    if !s.is_empty() && !s.ends_with(['/', '\\']) {
                        s.push(std::path::MAIN_SEPARATOR);
                    }
                    Ok(Value::Str(s))
                }
                ("normalizepath", parts) if !parts.is_empty() => {
                    Ok(Value::Str(self.normalize(parts).display().to_string()))
                }
                ("normalizedirectory", parts) if !parts.is_empty() => {
                    Ok(Value::Str(with_trailing_separator(&self.normalize(parts))))
                }
                _ => Err(unknown()),
            },
            "system.string" | "string" => match (member_lc.as_str(), args.as_slice()) {
                ("isnullorempty", [s]) => Ok(Value::Bool(s.is_empty())),
                ("isnullorwhitespace", [s]) => Ok(Value::Bool(s.trim().is_empty())),
                ("concat", parts) => Ok(Value::Str(parts.concat())),
                ("copy", [s]) => Ok(Value::Str(s.clone())),
                ("empty", []) => Ok(Value::Str(String::new())),
                _ => Err(unknown()),
            },
            "system.io.path" => match (member_lc.as_str(), args.as_slice()) {
                ("combine", parts) if !parts.is_empty() => Ok(Value::Str(combine(parts).display().to_string())),
                ("getfilename", [p]) => Ok(Value::Str(
                    Path::new(p).file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
                )),
                ("getextension", [p]) => Ok(Value::Str(
                    Path::new(p).extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default(),
                )),
                ("getdirectoryname", [p]) => Ok(Value::Str(
                    Path::new(p).parent().map(|d| d.display().to_string()).unwrap_or_default(),
                )),
                ("getfilenamewithoutextension", [p]) => Ok(Value::Str(
                    Path::new(p).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
                )),
                ("directoryseparatorchar", []) => Ok(Value::Str(std::path::MAIN_SEPARATOR.to_string())),
                _ => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }

    fn normalize(&self, parts: &[String]) -> PathBuf {
        crate::imports::normalize_path(&self.expander.directory.join(combine(parts)))
    }

    /// Integer overload when both operands parse as integers, else floating.
    fn arithmetic(&self, op: &str, a: &str, b: &str) -> Result<Value, ProjectError> {
        if let (Ok(x), Ok(y)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
            let result = match op {
                "add" => x.checked_add(y),
                "subtract" => x.checked_sub(y),
                "multiply" => x.checked_mul(y),
                "divide" | "modulo" if y == 0 => return Err(self.error("Attempted to divide by zero.")),
                "divide" => x.checked_div(y),
                _ => x.checked_rem(y),
            };
            if let Some(result) = result {
                return Ok(Value::Int(result));
            }
        }
        let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) else {
            return Err(self.error(format!("\"{a}\" and \"{b}\" are not numbers.")));
        };
        let result = match op {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "divide" => x / y,
            _ => x % y,
        };
        Ok(Value::Float(result))
    }

    fn call_instance(&self, value: Value, member: &str, args: Option<Vec<String>>) -> Result<Value, ProjectError> {
        let receiver = value.into_string();
        let args = args.unwrap_or_default();
        let member_lc = member.to_ascii_lowercase();
        let chars_of = |args: &[String]| -> Vec<char> { args.iter().flat_map(|a| a.chars()).collect() };

        let result = match (member_lc.as_str(), args.as_slice()) {
            ("length", []) => Value::Int(receiver.chars().count() as i64),
            ("toupper" | "toupperinvariant", []) => Value::Str(receiver.to_uppercase()),
            ("tolower" | "tolowerinvariant", []) => Value::Str(receiver.to_lowercase()),
            ("tostring", []) => Value::Str(receiver),
            ("trim", []) => Value::Str(receiver.trim().to_string()),
            ("trim", set) => {
                let set = chars_of(set);
                Value::Str(receiver.trim_matches(|c: char| set.contains(&c)).to_string())
            }
            ("trimstart", []) => Value::Str(receiver.trim_start().to_string()),
            ("trimstart", set) => {
                let set = chars_of(set);
                Value::Str(receiver.trim_start_matches(|c: char| set.contains(&c)).to_string())
            }
            ("trimend", []) => Value::Str(receiver.trim_end().to_string()),
            ("trimend", set) => {
                let set = chars_of(set);
                Value::Str(receiver.trim_end_matches(|c: char| set.contains(&c)).to_string())
            }
            ("replace", [old, new]) => {
                if old.is_empty() {
                    return Err(self.error("String cannot be of zero length."));
                }
                Value::Str(receiver.replace(old.as_str(), new))
            }
            ("substring", [start]) => {
                let start = self.parse_index(start)?;
                Value::Str(self.substring(&receiver, start, None)?)
            }
            ("substring", [start, len]) => {
                let (start, len) = (self.parse_index(start)?, self.parse_index(len)?);
                Value::Str(self.substring(&receiver, start, Some(len))?)
            }
            ("contains", [s]) => Value::Bool(receiver.contains(s.as_str())),
            ("startswith", [s]) => Value::Bool(receiver.starts_with(s.as_str())),
            ("endswith", [s]) => Value::Bool(receiver.ends_with(s.as_str())),
            ("equals", [s]) => Value::Bool(receiver == *s),
            ("indexof", [s]) => Value::Int(char_index(&receiver, receiver.find(s.as_str()))),
            ("lastindexof", [s]) => Value::Int(char_index(&receiver, receiver.rfind(s.as_str()))),
            ("split", []) => Value::List(receiver.split(char::is_whitespace).map(String::from).collect()),
            ("split", set) => {
                let set = chars_of(set);
                Value::List(receiver.split(|c: char| set.contains(&c)).map(String::from).collect())
            }
            ("padleft" | "padright", [width, rest @ ..]) if rest.len() <= 1 => {
                let width = self.parse_index(width)?;
                let fill = match rest.first() {
                    Some(c) => c.chars().next().ok_or_else(|| self.error("Empty padding character"))?,
                    None => ' ',
                };
                let missing = width.saturating_sub(receiver.chars().count());
                let padding: String = std::iter::repeat_n(fill, missing).collect();
                if member_lc == "padleft" {
                    Value::Str(padding + &receiver)
                } else {
                    Value::Str(receiver + &padding)
                }
            }
            _ => {
                return Err(self.error(format!(
                    "The method \"{member}\" with {} argument(s) is not available on a string.",
                    args.len()
                )));
            }
        };
        Ok(result)
    }

    fn parse_index(&self, s: &str) -> Result<usize, ProjectError> {
        s.trim().parse::<usize>().map_err(|_| self.error(format!("\"{s}\" is not a valid index.")))
    }

    fn substring(&self, s: &str, start: usize, len: Option<usize>) -> Result<String, ProjectError> {
        let total = s.chars().count();
        let end = match len {
            Some(len) => start.checked_add(len).filter(|&e| e <= total),
            None => Some(total),
        };
        match end {
            Some(end) if start <= total => Ok(s.chars().skip(start).take(end - start).collect()),
            _ => Err(self.error("Index and length must refer to a location within the string.")),
        }
    }
}

fn char_index(s: &str, byte_index: Option<usize>) -> i64 {
    byte_index.map_or(-1, |b| s[..b].chars().count() as i64)
}

fn combine(parts: &[String]) -> PathBuf {
    let mut path = PathBuf::new();
    for part in parts {
        path.push(part);
    }
    path
}

fn skip_ws(text: &str, i: &mut usize) {
    while let Some(c) = text[*i..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        *i += c.len_utf8();
    }
}

fn strip_quotes(s: &str) -> Option<&str> {
    ['\'', '"', '`'].into_iter().find_map(|q| {
        s.strip_prefix(q).and_then(|rest| rest.strip_suffix(q))
    })
}

/// Index of the `)` matching the `(` at `open`. Quoted runs (`'`, `"`,
/// `` ` ``) are skipped.
pub fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in text.as_bytes().iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a raw argument list on top-level commas.
pub fn split_arguments(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in raw.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => args.push(std::mem::take(&mut current).trim().to_string()),
                _ => current.push(c),
            },
        }
    }
    args.push(current.trim().to_string());
    args
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════
