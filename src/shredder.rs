//! Expression shredder.
//!
//! Finds item vectors (`@(Type->'transform', 'separator')`) and metadata
//! references (`%(Type.Name)`) inside arbitrary strings without building a
//! full expression tree. The evaluator uses it to know which items and
//! metadata a string depends on, and the expander reuses its captures to
//! locate vectors it has to replace.
//!
//! The scanner is single pass. Anything that is not a well-formed vector or
//! metadata reference is treated as literal text.

use indexmap::IndexMap;

// ═══════════════════════════════════════════════════════════════════════════════
//  Captures
// ═══════════════════════════════════════════════════════════════════════════════

/// One `->` clause of an item vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformCapture {
    /// `->'%(Filename).obj'`; `value` is the text between the quotes.
    Quoted { index: usize, value: String },
    /// `->Metadata('Culture')`; `arguments` is the raw text between the
    /// parentheses, `None` for `()`.
    Function { index: usize, name: String, arguments: Option<String> },
}

/// A well-formed `@(...)` found in a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemExpressionCapture {
    /// Byte offset of the `@`.
    pub index: usize,
    /// Byte length up to and including the closing `)`.
    pub length: usize,
    pub value: String,
    pub item_type: String,
    pub transforms: Vec<TransformCapture>,
    pub separator: Option<String>,
    /// Byte offset of the first separator character.
    pub separator_start: Option<usize>,
}

impl ItemExpressionCapture {
    pub fn end(&self) -> usize {
        self.index + self.length
    }
}

/// A `%(Name)` or `%(Type.Name)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataReference {
    pub item_type: Option<String>,
    pub name: String,
}

impl MetadataReference {
    /// Case-insensitive key, `type.name` when qualified.
    pub fn key(&self) -> String {
        match &self.item_type {
            Some(t) => format!("{}.{}", t.to_lowercase(), self.name.to_lowercase()),
            None => self.name.to_lowercase(),
        }
    }
}

/// Distinct item types and metadata referenced by a set of strings.
/// Both collections compare names case-insensitively and keep the casing
/// of the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsAndMetadataPair {
    pub items: IndexMap<String, String>,
    pub metadata: IndexMap<String, MetadataReference>,
}

impl ItemsAndMetadataPair {
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.values().map(String::as_str)
    }

    pub fn has_item(&self, item_type: &str) -> bool {
        self.items.contains_key(&item_type.to_lowercase())
    }

    pub fn has_metadata(&self, item_type: Option<&str>, name: &str) -> bool {
        let probe = MetadataReference { item_type: item_type.map(String::from), name: name.to_string() };
        self.metadata.contains_key(&probe.key())
    }

    fn add_item(&mut self, name: &str) {
        self.items.entry(name.to_lowercase()).or_insert_with(|| name.to_string());
    }

    fn add_metadata(&mut self, reference: MetadataReference) {
        self.metadata.entry(reference.key()).or_insert(reference);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Public entry points
// ═══════════════════════════════════════════════════════════════════════════════

/// Split on `;`, except inside `@(...)` vectors (including their quoted
/// clauses). Entries are trimmed and empty entries dropped.
pub fn split_semicolon_separated_list(expression: &str) -> Vec<String> {
    let bytes = expression.as_bytes();
    let mut out = Vec::new();
    let mut segment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'@' && bytes.get(i + 1) == Some(&b'(') {
            i = skip_vector_body(bytes, i + 2);
            continue;
        }
        if bytes[i] == b';' {
            push_trimmed(&mut out, &expression[segment_start..i]);
            segment_start = i + 1;
        }
        i += 1;
    }
    push_trimmed(&mut out, &expression[segment_start..]);
    out
}

/// Every well-formed item vector in `expression`, left to right. Vectors
/// nested in another vector's quoted clauses are part of that vector.
pub fn get_referenced_item_expressions(expression: &str) -> Vec<ItemExpressionCapture> {
    if !expression.contains("@(") {
        return Vec::new();
    }
    let mut captures = Vec::new();
    let mut i = 0;
    while let Some(offset) = expression[i..].find("@(") {
        let start = i + offset;
        match parse_item_vector(expression, start) {
            Some(capture) => {
                i = capture.end();
                captures.push(capture);
            }
            None => i = start + 1,
        }
    }
    captures
}

/// Collect the item types and the metadata referenced by `expressions`.
///
/// Metadata inside a vector's transform belongs to that transform and is
/// not reported here; it is available from
/// [`get_referenced_item_expressions`].
pub fn get_referenced_item_names_and_metadata<'a>(
    expressions: impl IntoIterator<Item = &'a str>,
) -> ItemsAndMetadataPair {
    let mut pair = ItemsAndMetadataPair::default();
    for expression in expressions {
        let has_metadata = expression.contains("%(");
        if !has_metadata && !expression.contains("@(") {
            continue;
        }
        if !has_metadata {
            if let Some(names) = simple_item_vector_list(expression) {
                for name in names {
                    pair.add_item(name);
                }
                continue;
            }
        }
        shred(expression, &mut pair);
    }
    pair
}

/// Whether `expression` holds a `%(...)` reference outside of any vector.
pub fn contains_metadata_expression_outside_transform(expression: &str) -> bool {
    if !expression.contains("%(") {
        return false;
    }
    let mut pair = ItemsAndMetadataPair::default();
    shred(expression, &mut pair);
    !pair.metadata.is_empty()
}

/// Every metadata reference outside of vectors, with its byte span.
pub fn get_metadata_references(expression: &str) -> Vec<(usize, usize, MetadataReference)> {
    let mut found = Vec::new();
    if !expression.contains("%(") {
        return found;
    }
    scan(expression, |event| {
        if let Scanned::Metadata { start, end, reference } = event {
            found.push((start, end, reference));
        }
    });
    found
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Name rules
// ═══════════════════════════════════════════════════════════════════════════════

fn in_name_start_range(c: char) -> bool {
    matches!(c,
        '\u{00C0}'..='\u{00D6}'
        | '\u{00D8}'..='\u{00F6}'
        | '\u{00F8}'..='\u{02FF}'
        | '\u{0370}'..='\u{037D}'
        | '\u{037F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}')
}

/// First character of an item, metadata or property name.
pub fn is_valid_name_start_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || in_name_start_range(c)
}

/// Any later character of an item, metadata or property name.
pub fn is_valid_name_char(c: char) -> bool {
    is_valid_name_start_char(c)
        || c.is_ascii_digit()
        || c == '-'
        || matches!(c, '\u{00B7}' | '\u{0300}'..='\u{036F}' | '\u{203F}'..='\u{2040}')
}

pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_valid_name_start_char(first) => chars.all(is_valid_name_char),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Scanner
// ═══════════════════════════════════════════════════════════════════════════════

enum Scanned {
    Vector(ItemExpressionCapture),
    Metadata { start: usize, end: usize, reference: MetadataReference },
}

fn shred(expression: &str, pair: &mut ItemsAndMetadataPair) {
    scan(expression, |event| match event {
        Scanned::Vector(capture) => pair.add_item(&capture.item_type),
        Scanned::Metadata { reference, .. } => pair.add_metadata(reference),
    });
}

fn scan(expression: &str, mut sink: impl FnMut(Scanned)) {
    let mut i = 0;
    while i < expression.len() {
        let rest = &expression[i..];
        if rest.starts_with("@(") {
            if let Some(capture) = parse_item_vector(expression, i) {
                i = capture.end();
                sink(Scanned::Vector(capture));
                continue;
            }
        } else if rest.starts_with("%(") {
            if let Some((end, reference)) = parse_metadata_reference(expression, i) {
                sink(Scanned::Metadata { start: i, end, reference });
                i = end;
                continue;
            }
        }
        i += rest.chars().next().map_or(1, char::len_utf8);
    }
}

/// `@(a);@(b)` and similar: only bare vectors separated by semicolons.
fn simple_item_vector_list(expression: &str) -> Option<Vec<&str>> {
    let mut names = Vec::new();
    for part in expression.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let inner = part.strip_prefix("@(")?.strip_suffix(')')?.trim();
        if !is_valid_name(inner) {
            return None;
        }
        names.push(inner);
    }
    (!names.is_empty()).then_some(names)
}

fn parse_item_vector(expression: &str, start: usize) -> Option<ItemExpressionCapture> {
    let mut i = start + 2;
    sink_whitespace(expression, &mut i);

    let name_start = i;
    if !sink_valid_name(expression, &mut i) {
        return None;
    }
    // `@(foo->'x')`: the `-` belongs to the arrow, not to the name.
    if expression[name_start..i].ends_with('-') && expression[i..].starts_with('>') {
        i -= 1;
        if i == name_start {
            return None;
        }
    }
    let item_type = expression[name_start..i].to_string();
    sink_whitespace(expression, &mut i);

    let mut transforms = Vec::new();
    while sink(expression, &mut i, "->") {
        sink_whitespace(expression, &mut i);
        let transform_start = i;
        if sink_single_quoted(expression, &mut i) {
            transforms.push(TransformCapture::Quoted {
                index: transform_start,
                value: expression[transform_start + 1..i - 1].to_string(),
            });
        } else {
            if !sink_valid_name(expression, &mut i) {
                return None;
            }
            let name = expression[transform_start..i].to_string();
            sink_whitespace(expression, &mut i);
            let args_start = i;
            if !sink_arguments_in_parentheses(expression, &mut i) {
                return None;
            }
            let raw = expression[args_start + 1..i - 1].trim();
            transforms.push(TransformCapture::Function {
                index: transform_start,
                name,
                arguments: (!raw.is_empty()).then(|| raw.to_string()),
            });
        }
        sink_whitespace(expression, &mut i);
    }

    let mut separator = None;
    let mut separator_start = None;
    if sink(expression, &mut i, ",") {
        sink_whitespace(expression, &mut i);
        let quote = i;
        if !sink_single_quoted(expression, &mut i) {
            return None;
        }
        separator = Some(expression[quote + 1..i - 1].to_string());
        separator_start = Some(quote + 1);
        sink_whitespace(expression, &mut i);
    }

    if !sink(expression, &mut i, ")") {
        return None;
    }

    Some(ItemExpressionCapture {
        index: start,
        length: i - start,
        value: expression[start..i].to_string(),
        item_type,
        transforms,
        separator,
        separator_start,
    })
}

fn parse_metadata_reference(expression: &str, start: usize) -> Option<(usize, MetadataReference)> {
    let mut i = start + 2;
    sink_whitespace(expression, &mut i);
    let first_start = i;
    if !sink_valid_name(expression, &mut i) {
        return None;
    }
    let first = &expression[first_start..i];
    sink_whitespace(expression, &mut i);

    let reference = if sink(expression, &mut i, ".") {
        sink_whitespace(expression, &mut i);
        let second_start = i;
        if !sink_valid_name(expression, &mut i) {
            return None;
        }
        let second = &expression[second_start..i];
        sink_whitespace(expression, &mut i);
        MetadataReference { item_type: Some(first.to_string()), name: second.to_string() }
    } else {
        MetadataReference { item_type: None, name: first.to_string() }
    };

    sink(expression, &mut i, ")").then_some((i, reference))
}

// ─── Sinks ───────────────────────────────────────────────────────────────────

fn sink(expression: &str, i: &mut usize, token: &str) -> bool {
    if expression[*i..].starts_with(token) {
        *i += token.len();
        true
    } else {
        false
    }
}

fn sink_whitespace(expression: &str, i: &mut usize) {
    while let Some(c) = expression[*i..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        *i += c.len_utf8();
    }
}

fn sink_valid_name(expression: &str, i: &mut usize) -> bool {
    let mut chars = expression[*i..].chars();
    match chars.next() {
        Some(c) if is_valid_name_start_char(c) => *i += c.len_utf8(),
        _ => return false,
    }
    for c in chars {
        if !is_valid_name_char(c) {
            break;
        }
        *i += c.len_utf8();
    }
    true
}

fn sink_single_quoted(expression: &str, i: &mut usize) -> bool {
    if !expression[*i..].starts_with('\'') {
        return false;
    }
    match expression[*i + 1..].find('\'') {
        Some(close) => {
            *i += close + 2;
            true
        }
        None => false,
    }
}

/// `( ... )` with nesting; parentheses inside single quotes do not count.
fn sink_arguments_in_parentheses(expression: &str, i: &mut usize) -> bool {
    let bytes = expression.as_bytes();
    if bytes.get(*i) != Some(&b'(') {
        return false;
    }
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut j = *i;
    while j < bytes.len() {
        match bytes[j] {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    *i = j + 1;
                    return true;
                }
            }
            _ => {}
        }
        j += 1;
    }
    false
}

/// Index just past the `)` closing a vector whose body starts at `i`, or
/// the end of input when it never closes.
fn skip_vector_body(bytes: &[u8], mut i: usize) -> usize {
    let mut in_quote = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b')' if !in_quote => return i + 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn push_trimmed(out: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::BTreeSet;

    // ── Semicolon splitting ──────────────────────────────────────────────

    #[test]
    fn split_drops_empty_entries() {
        assert_eq!(split_semicolon_separated_list("a;;b"), ["a", "b"]);
        assert_eq!(split_semicolon_separated_list(" a ; b ;"), ["a", "b"]);
    }

    #[test]
    fn split_blank_is_empty() {
        assert!(split_semicolon_separated_list("").is_empty());
        assert!(split_semicolon_separated_list("   ").is_empty());
        assert!(split_semicolon_separated_list(";;;").is_empty());
    }

    #[test]
    fn split_keeps_vectors_whole() {
        assert_eq!(split_semicolon_separated_list("@(foo,';')"), ["@(foo,';')"]);
        assert_eq!(
            split_semicolon_separated_list("a;@(foo->'%(x);y', ';');b"),
            ["a", "@(foo->'%(x);y', ';')", "b"]
        );
        assert_eq!(split_semicolon_separated_list("@(foo);@(bar)"), ["@(foo)", "@(bar)"]);
    }

    #[test]
    fn split_unterminated_vector_swallows_rest() {
        assert_eq!(split_semicolon_separated_list("a;@(foo;b"), ["a", "@(foo;b"]);
    }

    // ── Item expression captures ─────────────────────────────────────────

    #[test]
    fn capture_plain_vector() {
        let caps = get_referenced_item_expressions("x @(Compile) y");
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].item_type, "Compile");
        assert_eq!(caps[0].index, 2);
        assert_eq!(caps[0].value, "@(Compile)");
        assert!(caps[0].transforms.is_empty());
        assert_eq!(caps[0].separator, None);
    }

    #[test]
    fn capture_transform_and_separator() {
        let caps = get_referenced_item_expressions("@( i -> '%(Filename).obj' , ';' )");
        assert_eq!(caps.len(), 1);
        let cap = &caps[0];
        assert_eq!(cap.item_type, "i");
        assert_eq!(
            cap.transforms,
            [TransformCapture::Quoted { index: 8, value: "%(Filename).obj".into() }]
        );
        assert_eq!(cap.separator.as_deref(), Some(";"));
        assert_eq!(cap.separator_start, Some(29));
    }

    #[test]
    fn capture_function_transforms() {
        let caps = get_referenced_item_expressions(
            "@(i->Metadata('Culture')->Distinct()->Substring(1, 'a)b'))",
        );
        assert_eq!(caps.len(), 1);
        let names: Vec<_> = caps[0]
            .transforms
            .iter()
            .map(|t| match t {
                TransformCapture::Function { name, arguments, .. } => (name.as_str(), arguments.clone()),
                TransformCapture::Quoted { .. } => panic!("unexpected quoted transform"),
            })
            .collect();
        assert_eq!(
            names,
            [
                ("Metadata", Some("'Culture'".to_string())),
                ("Distinct", None),
                ("Substring", Some("1, 'a)b'".to_string())),
            ]
        );
    }

    #[test]
    fn capture_hyphenated_name_before_arrow() {
        let caps = get_referenced_item_expressions("@(my-items->'x')");
        assert_eq!(caps[0].item_type, "my-items");
        let caps = get_referenced_item_expressions("@(a-->'x')");
        assert_eq!(caps[0].item_type, "a-");
    }

    #[test]
    fn unterminated_vectors_are_not_captured() {
        for text in ["@(x", "@(x->", "@(x->'a'", "@(x,", "@(x,'a'", "@(", "@()", "@(x y)", "@(x->Foo"] {
            assert!(get_referenced_item_expressions(text).is_empty(), "{text}");
        }
    }

    #[test]
    fn adjacent_vectors() {
        let caps = get_referenced_item_expressions("@(a)@(b)@(c,'')");
        let names: Vec<_> = caps.iter().map(|c| c.item_type.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(caps[2].separator.as_deref(), Some(""));
    }

    #[test]
    fn vector_inside_transform_literal_is_not_separate() {
        let caps = get_referenced_item_expressions("@(a->'@(b)')");
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].item_type, "a");
    }

    #[test]
    fn non_ascii_item_names() {
        let caps = get_referenced_item_expressions("@(Übersetzung) @(données_2)");
        let names: Vec<_> = caps.iter().map(|c| c.item_type.as_str()).collect();
        assert_eq!(names, ["Übersetzung", "données_2"]);
        assert!(get_referenced_item_expressions("@(\u{2000}x)").is_empty());
    }

    // ── Items and metadata ───────────────────────────────────────────────

    #[test]
    fn items_and_metadata_basic() {
        let pair = get_referenced_item_names_and_metadata(["@(A);%(B.m1) %(m2) @(a)"]);
        assert_eq!(pair.item_names().collect::<Vec<_>>(), ["A"]);
        assert!(pair.has_metadata(Some("b"), "M1"));
        assert!(pair.has_metadata(None, "m2"));
        assert_eq!(pair.metadata.len(), 2);
    }

    #[test]
    fn metadata_in_transform_belongs_to_transform() {
        let pair = get_referenced_item_names_and_metadata(["@(A->'%(Filename)') %(Culture)"]);
        assert!(pair.has_item("a"));
        assert!(!pair.has_metadata(None, "Filename"));
        assert!(pair.has_metadata(None, "Culture"));
        assert!(!contains_metadata_expression_outside_transform("@(A->'%(Filename)')"));
        assert!(contains_metadata_expression_outside_transform("@(A->'x')%(y)"));
    }

    #[test]
    fn metadata_spacing_and_invalid_forms() {
        let pair = get_referenced_item_names_and_metadata(["%( a . b ) %(c.d.e) %(1x) %()"]);
        assert_eq!(pair.metadata.len(), 1);
        assert!(pair.has_metadata(Some("a"), "b"));
    }

    #[test]
    fn metadata_reference_spans() {
        let refs = get_metadata_references("x%(a)y@(i->'%(b)')%(T.c)");
        let spans: Vec<_> = refs.iter().map(|(s, e, r)| (*s, *e, r.key())).collect();
        assert_eq!(spans, [(1, 5, "a".to_string()), (18, 24, "t.c".to_string())]);
    }

    #[test]
    fn many_expressions_accumulate() {
        let pair = get_referenced_item_names_and_metadata(["@(x)", "no refs", "@(y);@(X)", "%(m)"]);
        assert_eq!(pair.item_names().collect::<Vec<_>>(), ["x", "y"]);
        assert!(pair.has_metadata(None, "M"));
    }

    #[test]
    fn valid_names() {
        assert!(is_valid_name("Foo_1-x"));
        assert!(is_valid_name("_a"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a.b"));
        assert!(!is_valid_name("a b"));
    }

    // ── Differential check against the regex formulation ────────────────

    struct RegexOracle {
        vector: Regex,
        metadata: Regex,
    }

    impl RegexOracle {
        fn new() -> Self {
            Self {
                vector: Regex::new(
                    r"@\(\s*(?P<TYPE>[A-Za-z_][A-Za-z_0-9\-]*)\s*(?:->\s*'(?P<TRANSFORM>[^']*)')?\s*(?:,\s*'(?P<SEPARATOR>[^']*)')?\s*\)",
                )
                .unwrap(),
                metadata: Regex::new(
                    r"%\(\s*(?:(?P<ITEM_TYPE>[A-Za-z_][A-Za-z_0-9\-]*)\s*\.\s*)?(?P<NAME>[A-Za-z_][A-Za-z_0-9\-]*)\s*\)",
                )
                .unwrap(),
            }
        }

        fn shred(&self, text: &str) -> (BTreeSet<String>, BTreeSet<String>) {
            let mut items = BTreeSet::new();
            let mut spans = Vec::new();
            for caps in self.vector.captures_iter(text) {
                let whole = caps.get(0).unwrap();
                spans.push(whole.range());
                items.insert(caps["TYPE"].to_lowercase());
            }
            let mut metadata = BTreeSet::new();
            for caps in self.metadata.captures_iter(text) {
                let start = caps.get(0).unwrap().start();
                if spans.iter().any(|r| r.contains(&start)) {
                    continue;
                }
                let reference = MetadataReference {
                    item_type: caps.name("ITEM_TYPE").map(|m| m.as_str().to_string()),
                    name: caps["NAME"].to_string(),
                };
                metadata.insert(reference.key());
            }
            (items, metadata)
        }
    }

    fn shredded(text: &str) -> (BTreeSet<String>, BTreeSet<String>) {
        let pair = get_referenced_item_names_and_metadata([text]);
        (
            pair.items.keys().cloned().collect(),
            pair.metadata.keys().cloned().collect(),
        )
    }

    #[test]
    fn scanner_agrees_with_regex_oracle() {
        let corpus = [
            "",
            "plain text",
            "@(a)",
            "@(a);@(b)",
            " @(a) ; @(b) ;; @(c) ",
            "@(a)@(b)",
            "@( a )",
            "@(a-)",
            "@(a_b-c1)",
            "@(1a)",
            "@(a b)",
            "@(a;b)",
            "@(a",
            "@(a->",
            "@(a->'x'",
            "@(a->'x')",
            "@(a->'%(x)')",
            "@(a->'@(b)')",
            "@(a->'x', ';')",
            "@(a , ';' )",
            "@(a,';')@(b,',')",
            "@(a,'')",
            "%(m)",
            "%(T.m)",
            "%( T . m )",
            "%(T.m.n)",
            "%(1m)",
            "%()",
            "%(m",
            "%(m)%(n)%(m)",
            "@(a)%(m)",
            "'%(Foo.Bar)' == ''",
            "@(i->'%(Filename).obj') and %(Culture)",
            "@(i, '%(m)') %(n)",
            "x@(a->'y');%(q)@(b)",
            "@(@(a))",
            "%(%(m))",
            "@(a)->'x'",
            "@@(a)",
            "%%(m)",
            "@(A);@(a)",
        ];
        let oracle = RegexOracle::new();
        for text in corpus {
            assert_eq!(shredded(text), oracle.shred(text), "disagreement on {text:?}");
        }
    }

    #[test]
    fn fast_path_matches_general_path() {
        for text in ["@(a);@(b)", " @(a) ", "@(a);;@(b);", "@(a);@(A)", "@(x-y)"] {
            let mut general = ItemsAndMetadataPair::default();
            shred(text, &mut general);
            assert!(simple_item_vector_list(text).is_some(), "{text}");
            assert_eq!(get_referenced_item_names_and_metadata([text]), general, "{text}");
        }
        for text in ["@(a,';')", "@(a->'x')", "x@(a)", "@(a) b"] {
            assert!(simple_item_vector_list(text).is_none(), "{text}");
        }
    }
}
