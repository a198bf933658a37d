//! Response template AST
//!
//! A stored template string is parsed once into a [`Template`] tree; every
//! render walks the tree and produces a new [`serde_json::Value`].

use crate::error::TemplateError;
use crate::placeholders::PlaceholderTable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;

/// Largest count a single repeat marker may request
pub const MAX_REPEAT: usize = 1000;
/// Largest number of values one render may produce
pub const MAX_EXPANDED_NODES: usize = 100_000;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z][A-Za-z0-9_]*)\s*\}\}").expect("valid token regex"));
static REPEAT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\{\{\s*x(\d+)\s*\}\}$").expect("valid repeat regex"));

/// Piece of a string that mixes text and placeholders
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Token(String),
}

/// Parsed response template
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Passed through unchanged
    Literal(Value),
    /// A string that is exactly one known token
    Placeholder(String),
    /// A string with text around one or more known tokens
    Interpolated(Vec<Segment>),
    Object(Vec<(String, Template)>),
    Array(Vec<Template>),
    /// `count` copies of the item templates, cycling when there are several
    Repeat { count: usize, items: Vec<Template> },
}

impl Template {
    /// Parse a stored template. Tokens unknown to `table` stay literal text.
    pub fn parse(source: &str, table: &PlaceholderTable) -> Result<Self, TemplateError> {
        let source = quote_bare_tokens(source);
        let value: Value =
            serde_json::from_str(&source).map_err(|e| TemplateError::Malformed(e.to_string()))?;
        let template = Self::from_value(value, table)?;
        if template.expanded_size() > MAX_EXPANDED_NODES {
            return Err(TemplateError::ExpansionTooLarge {
                max: MAX_EXPANDED_NODES,
            });
        }
        Ok(template)
    }

    fn from_value(value: Value, table: &PlaceholderTable) -> Result<Self, TemplateError> {
        match value {
            Value::String(s) => Ok(Self::from_string(s, table)),
            Value::Array(items) => Ok(Template::Array(
                items
                    .into_iter()
                    .map(|item| Self::from_value(item, table))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => {
                let mut fields = Vec::with_capacity(map.len());
                let mut seen = HashSet::with_capacity(map.len());
                for (key, value) in map {
                    let repeat = split_repeat_key(&key)?;
                    let name = repeat.as_ref().map_or(key.as_str(), |(name, _)| name.as_str());
                    if !seen.insert(name.to_string()) {
                        return Err(TemplateError::Malformed(format!(
                            "key {:?} is defined more than once",
                            name
                        )));
                    }
                    match repeat {
                        Some((name, count)) => {
                            let items = match value {
                                Value::Array(items) => items,
                                single => vec![single],
                            };
                            let items = items
                                .into_iter()
                                .map(|item| Self::from_value(item, table))
                                .collect::<Result<_, _>>()?;
                            fields.push((name, Template::Repeat { count, items }));
                        }
                        None => fields.push((key, Self::from_value(value, table)?)),
                    }
                }
                Ok(Template::Object(fields))
            }
            other => Ok(Template::Literal(other)),
        }
    }

    fn from_string(s: String, table: &PlaceholderTable) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in TOKEN.captures_iter(&s) {
            let (whole, name) = match (caps.get(0), caps.get(1)) {
                (Some(whole), Some(name)) => (whole, name.as_str()),
                _ => continue,
            };
            if !table.contains(name) {
                continue;
            }
            if whole.start() > last {
                segments.push(Segment::Text(s[last..whole.start()].to_string()));
            }
            segments.push(Segment::Token(name.to_string()));
            last = whole.end();
        }
        if segments.is_empty() {
            return Template::Literal(Value::String(s));
        }
        if last < s.len() {
            segments.push(Segment::Text(s[last..].to_string()));
        }
        match segments.as_slice() {
            [Segment::Token(name)] => Template::Placeholder(name.clone()),
            _ => Template::Interpolated(segments),
        }
    }

    /// Number of JSON values one render produces
    pub fn expanded_size(&self) -> usize {
        match self {
            Template::Literal(_) | Template::Placeholder(_) | Template::Interpolated(_) => 1,
            Template::Object(fields) => fields
                .iter()
                .fold(1usize, |acc, (_, t)| acc.saturating_add(t.expanded_size())),
            Template::Array(items) => items
                .iter()
                .fold(1usize, |acc, t| acc.saturating_add(t.expanded_size())),
            Template::Repeat { count, items } => {
                if items.is_empty() {
                    return 1;
                }
                let per_cycle = items
                    .iter()
                    .fold(0usize, |acc, t| acc.saturating_add(t.expanded_size()));
                let average = per_cycle / items.len() + 1;
                average.saturating_mul(*count).saturating_add(1)
            }
        }
    }

    /// Whether rendering can produce different output each time
    pub fn is_dynamic(&self) -> bool {
        match self {
            Template::Literal(_) => false,
            Template::Placeholder(_) | Template::Interpolated(_) => true,
            Template::Object(fields) => fields.iter().any(|(_, t)| t.is_dynamic()),
            Template::Array(items) => items.iter().any(Template::is_dynamic),
            Template::Repeat { .. } => true,
        }
    }

    /// Produce a fresh value, resolving each placeholder occurrence independently
    pub fn render(&self, table: &PlaceholderTable) -> Value {
        match self {
            Template::Literal(value) => value.clone(),
            Template::Placeholder(name) => Value::String(resolve_or_keep(table, name)),
            Template::Interpolated(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Token(name) => out.push_str(&resolve_or_keep(table, name)),
                    }
                }
                Value::String(out)
            }
            Template::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    map.insert(key.clone(), value.render(table));
                }
                Value::Object(map)
            }
            Template::Array(items) => Value::Array(items.iter().map(|t| t.render(table)).collect()),
            Template::Repeat { count, items } => {
                if items.is_empty() {
                    return Value::Array(Vec::new());
                }
                Value::Array(
                    items
                        .iter()
                        .cycle()
                        .take(*count)
                        .map(|item| item.render(table))
                        .collect(),
                )
            }
        }
    }
}

fn resolve_or_keep(table: &PlaceholderTable, name: &str) -> String {
    table
        .resolve(name)
        .unwrap_or_else(|| format!("{{{{{}}}}}", name))
}

fn split_repeat_key(key: &str) -> Result<Option<(String, usize)>, TemplateError> {
    let Some(caps) = REPEAT_KEY.captures(key) else {
        return Ok(None);
    };
    let name = caps.get(1).map_or("", |m| m.as_str());
    let raw = caps.get(2).map_or("", |m| m.as_str());
    let count: u64 = raw.parse().map_err(|_| TemplateError::RepeatTooLarge {
        count: u64::MAX,
        max: MAX_REPEAT,
    })?;
    if count > MAX_REPEAT as u64 {
        return Err(TemplateError::RepeatTooLarge {
            count,
            max: MAX_REPEAT,
        });
    }
    Ok(Some((name.to_string(), count as usize)))
}

/// Wrap `{{token}}` occurrences that sit outside JSON strings in quotes so
/// that templates like `{"age": {{randomInt}}}` parse.
fn quote_bare_tokens(source: &str) -> Cow<'_, str> {
    if !source.contains("{{") {
        return Cow::Borrowed(source);
    }

    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;
    let mut i = 0;
    let mut copied = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => {
                in_string = true;
                i += 1;
            }
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                let Some(len) = source[i..].find("}}") else {
                    break;
                };
                let end = i + len + 2;
                out.push_str(&source[copied..i]);
                out.push('"');
                out.push_str(&source[i..end]);
                out.push('"');
                copied = end;
                changed = true;
                i = end;
            }
            _ => i += 1,
        }
    }

    if !changed {
        return Cow::Borrowed(source);
    }
    out.push_str(&source[copied..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn table() -> std::sync::Arc<PlaceholderTable> {
        PlaceholderTable::standard()
    }

    fn render(source: &str) -> Value {
        Template::parse(source, &table()).unwrap().render(&table())
    }

    #[test]
    fn test_static_template_round_trips() {
        let source = r#"{"name":"Ada","tags":["a","b"],"age":36,"active":true,"extra":null}"#;
        let expected: Value = serde_json::from_str(source).unwrap();
        assert_eq!(render(source), expected);
        assert!(!Template::parse(source, &table()).unwrap().is_dynamic());
    }

    #[test]
    fn test_key_order_is_preserved() {
        let rendered = render(r#"{"z":1,"a":2,"m":3}"#);
        assert_eq!(serde_json::to_string(&rendered).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn test_repeat_marker_expands_items() {
        let rendered = render(r#"{"items{{x5}}": [{"id":"{{uuid}}"}]}"#);
        let items = rendered["items"].as_array().unwrap();
        assert_eq!(items.len(), 5);
        let ids: HashSet<_> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids.len(), 5);
        assert!(rendered.get("items{{x5}}").is_none());
    }

    #[test]
    fn test_repeat_accepts_bare_object_and_cycles_items() {
        let rendered = render(r#"{"one{{x2}}": {"k":1}, "many{{x3}}": [1, 2]}"#);
        assert_eq!(rendered["one"], json!([{"k":1}, {"k":1}]));
        assert_eq!(rendered["many"], json!([1, 2, 1]));
    }

    #[test]
    fn test_nested_repeat() {
        let rendered = render(r#"{"rows{{x3}}": [{"cells{{x2}}": ["{{word}}"]}]}"#);
        let rows = rendered["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r["cells"].as_array().unwrap().len() == 2));
    }

    #[test]
    fn test_placeholders_are_independent() {
        let source = r#"{"a":"{{uuid}}","b":"{{uuid}}"}"#;
        let first = render(source);
        let second = render(source);
        assert_ne!(first["a"], first["b"]);
        assert_ne!(first["a"], second["a"]);
        assert_ne!(first["b"], second["b"]);
    }

    #[test]
    fn test_interpolated_and_unknown_tokens() {
        let rendered = render(r#"{"email":"user-{{randomInt}}@x.test","keep":"{{nope}}","x":"{{x5}}"}"#);
        let email = rendered["email"].as_str().unwrap();
        assert!(email.starts_with("user-") && email.ends_with("@x.test"));
        assert!(!email.contains("{{"));
        assert_eq!(rendered["keep"], "{{nope}}");
        assert_eq!(rendered["x"], "{{x5}}");
    }

    #[test]
    fn test_bare_tokens_are_tolerated() {
        let rendered = render(r#"{"age": {{randomInt}}, "note": "{ not {{ a token"}"#);
        assert!(rendered["age"].as_str().unwrap().parse::<u32>().is_ok());
        assert_eq!(rendered["note"], "{ not {{ a token");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Template::parse("{not json", &table()),
            Err(TemplateError::Malformed(_))
        ));
        assert!(matches!(
            Template::parse(r#"{"a{{x1001}}": [1]}"#, &table()),
            Err(TemplateError::RepeatTooLarge { count: 1001, .. })
        ));
        assert!(matches!(
            Template::parse(r#"{"a{{x1000}}": [{"b{{x1000}}": [1]}]}"#, &table()),
            Err(TemplateError::ExpansionTooLarge { .. })
        ));
    }

    #[test]
    fn test_repeat_key_clashing_with_plain_key() {
        let err = Template::parse(r#"{"items": 1, "items{{x2}}": [2]}"#, &table()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Malformed("key \"items\" is defined more than once".into())
        );
        assert!(Template::parse(r#"{"a{{x2}}": [1], "a{{x3}}": [2]}"#, &table()).is_err());
    }

    #[test]
    fn test_zero_repeat_yields_empty_array() {
        assert_eq!(render(r#"{"none{{x0}}": [1]}"#), json!({"none": []}));
    }

    fn static_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_templates_without_markers_are_unchanged(value in static_json()) {
            let source = serde_json::to_string(&value).unwrap();
            prop_assert_eq!(render(&source), value);
        }
    }
}
