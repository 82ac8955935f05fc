//! Resolution of authored field sources against a submission
//!
//! A source is what the form designer typed into an action's mapping box:
//! nothing, a literal, a reference to another form field (`fld_123` or
//! `%slug%`) or a template containing magic tags (`{user:email}`,
//! `{get:ref}`, `{post_id}`, `{date:%Y}`). Resolution never fails: anything
//! that cannot be resolved comes back empty.

use super::submission::{Submission, UploadedFile};
use crate::api::models::value_as_id;
use chrono::format::{Item, StrftimeItems};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

static FIELD_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^fld_[A-Za-z0-9_]+$").expect("valid regex"));
static FIELD_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^%([A-Za-z0-9_]+)%$").expect("valid regex"));
static TEMPLATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}|%([A-Za-z0-9_]+)%").expect("valid regex"));

/// Where a mapped value comes from
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Source {
    /// Nothing mapped: the field keeps its default
    #[default]
    Empty,
    Literal(Value),
    FieldId(String),
    FieldSlug(String),
    /// Text with embedded tags or `%slug%` references
    Template(String),
}

impl Source {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else if FIELD_ID.is_match(trimmed) {
            Self::FieldId(trimmed.to_string())
        } else if let Some(caps) = FIELD_SLUG.captures(trimmed) {
            Self::FieldSlug(caps[1].to_string())
        } else if TEMPLATE_TOKEN.is_match(raw) {
            Self::Template(raw.to_string())
        } else {
            Self::Literal(Value::String(raw.to_string()))
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The form field this source points at, if it is a plain reference
    pub fn field_key(&self) -> Option<&str> {
        match self {
            Self::FieldId(key) | Self::FieldSlug(key) => Some(key),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::String(String::new()),
            Self::Literal(value) => value.clone(),
            Self::FieldId(id) => Value::String(id.clone()),
            Self::FieldSlug(slug) => Value::String(format!("%{}%", slug)),
            Self::Template(template) => Value::String(template.clone()),
        }
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::parse(&s),
            other => Self::Literal(other),
        }
    }
}

impl From<&str> for Source {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// Resolves sources for one submission
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper<'a> {
    submission: &'a Submission,
}

impl<'a> FieldMapper<'a> {
    pub fn new(submission: &'a Submission) -> Self {
        Self { submission }
    }

    pub fn submission(&self) -> &'a Submission {
        self.submission
    }

    /// Resolve a source to its submitted value; unresolvable sources are null
    pub fn resolve(&self, source: &Source) -> Value {
        match source {
            Source::Empty => Value::Null,
            Source::Literal(value) => value.clone(),
            Source::FieldId(key) | Source::FieldSlug(key) => {
                self.submission.value(key).cloned().unwrap_or(Value::Null)
            }
            Source::Template(template) => Value::String(self.render(template)),
        }
    }

    /// Resolve to text; arrays are joined with ", "
    pub fn resolve_string(&self, source: &Source) -> String {
        value_to_string(&self.resolve(source))
    }

    /// Resolve to the first positive integer id
    pub fn resolve_id(&self, source: &Source) -> Option<i64> {
        self.resolve_ids(source).into_iter().next()
    }

    /// Resolve to every positive integer id (arrays and comma-separated text)
    pub fn resolve_ids(&self, source: &Source) -> Vec<i64> {
        ids_from_value(&self.resolve(source))
    }

    /// File staged for the field a source points at
    pub fn resolve_upload(&self, source: &Source) -> Option<&'a UploadedFile> {
        source.field_key().and_then(|key| self.submission.upload(key))
    }

    fn render(&self, template: &str) -> String {
        TEMPLATE_TOKEN
            .replace_all(template, |caps: &Captures| match (caps.get(1), caps.get(2)) {
                (Some(tag), _) => self.tag(tag.as_str()),
                (None, Some(slug)) => self
                    .submission
                    .value(slug.as_str())
                    .map(value_to_string)
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .into_owned()
    }

    fn tag(&self, tag: &str) -> String {
        let submission = self.submission;
        if let Some(value) = submission.tag(tag) {
            return value.to_string();
        }

        let (name, arg) = match tag.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (tag, None),
        };

        match (name, arg) {
            ("post_id", None) => submission.post_id.map(|id| id.to_string()).unwrap_or_default(),
            ("date", None) => submission.submitted_at.format("%Y-%m-%d").to_string(),
            ("date", Some(format)) => {
                let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
                if items.iter().any(|item| matches!(item, Item::Error)) {
                    String::new()
                } else {
                    submission.submitted_at.format_with_items(items.iter()).to_string()
                }
            }
            ("get", Some(var)) => submission.query_var(var).unwrap_or_default().to_string(),
            (_, _) if tag.starts_with('%') && tag.ends_with('%') && tag.len() > 2 => submission
                .value(&tag[1..tag.len() - 1])
                .map(value_to_string)
                .unwrap_or_default(),
            _ => {
                log::debug!("Unresolved magic tag {{{}}}", tag);
                String::new()
            }
        }
    }
}

/// Text form of a submitted value
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Every positive integer id contained in a value
pub fn ids_from_value(value: &Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().flat_map(ids_from_value).collect(),
        Value::String(s) if s.contains(',') => s
            .split(',')
            .filter_map(|part| value_as_id(&Value::String(part.to_string())))
            .collect(),
        other => value_as_id(other).into_iter().collect(),
    }
}
