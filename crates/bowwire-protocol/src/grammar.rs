//! Structural grammar for records.
//!
//! A [`Validator`] decides whether a [`Record`] may be encoded, and whether a
//! decoded one may be trusted. Two validators ship with the crate:
//!
//! - [`AcceptAll`] enforces nothing.
//! - [`GrammarRules`] checks required keys, value types and nesting depth,
//!   and can be loaded from a configuration file:
//!
//! ```toml
//! required = ["channel", "fields.topic"]
//! allow_unknown = true
//! max_depth = 8
//!
//! [fields]
//! channel = "string"
//! seq = "integer"
//! fields = "object"
//! ```
//!
//! Paths are dot-separated object keys, so `fields.topic` names the `topic`
//! key of the object stored under `fields`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Record;

/// Default nesting limit for [`GrammarRules`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Hard nesting limit applied to every record, whatever the validator.
///
/// serde_json refuses to parse documents nested 128 levels or more, so a
/// record deeper than this could be encoded but never decoded.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Path used for violations that concern the record as a whole.
pub const ROOT_PATH: &str = "$";

/// The JSON type of a value, as named in grammar files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Any,
    Null,
    Bool,
    /// Any number, integer or float.
    Number,
    /// A number parsed as an integer literal that fits in i64 or u64.
    /// `1.0` is a `Number`, not an `Integer`.
    Integer,
    String,
    Array,
    Object,
}

impl FieldType {
    /// Returns the most specific type of a value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Returns true if `value` is acceptable where this type is expected.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Number => value.is_number(),
            expected => expected == Self::of(value),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// What is wrong at a given path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViolationKind {
    #[error("required field is missing")]
    Missing,

    #[error("expected {expected}, found {found}")]
    WrongType { expected: FieldType, found: FieldType },

    #[error("nesting exceeds {max} levels")]
    TooDeep { max: usize },

    #[error("field is not allowed")]
    Unknown,

    #[error("expected a mapping at the top level, found {found}")]
    NotAMapping { found: FieldType },
}

/// A grammar failure and the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {kind}")]
pub struct Violation {
    /// Dot-separated path of the offending field, or [`ROOT_PATH`].
    pub path: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// A violation concerning the whole record.
    pub fn root(kind: ViolationKind) -> Self {
        Self::new(ROOT_PATH, kind)
    }
}

/// Decides whether a record is structurally acceptable.
pub trait Validator: Send + Sync {
    /// Checks a record, returning the first violation found.
    fn validate(&self, record: &Record) -> Result<(), Violation>;
}

impl<V: Validator + ?Sized> Validator for &V {
    fn validate(&self, record: &Record) -> Result<(), Violation> {
        (**self).validate(record)
    }
}

impl<V: Validator + ?Sized> Validator for Box<V> {
    fn validate(&self, record: &Record) -> Result<(), Violation> {
        (**self).validate(record)
    }
}

impl<V: Validator + ?Sized> Validator for Arc<V> {
    fn validate(&self, record: &Record) -> Result<(), Violation> {
        (**self).validate(record)
    }
}

/// A validator that accepts every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _record: &Record) -> Result<(), Violation> {
        Ok(())
    }
}

/// Declarative grammar: required keys, field types, nesting limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarRules {
    /// Paths that must be present.
    pub required: Vec<String>,

    /// Expected type per path, checked when the field is present.
    pub fields: BTreeMap<String, FieldType>,

    /// Whether top-level keys not named in `required` or `fields` are allowed.
    pub allow_unknown: bool,

    /// Maximum nesting depth; the record itself is depth 1. Values above
    /// [`MAX_NESTING_DEPTH`] are treated as [`MAX_NESTING_DEPTH`].
    pub max_depth: usize,
}

impl Default for GrammarRules {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            fields: BTreeMap::new(),
            allow_unknown: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl GrammarRules {
    /// Builder: require a path.
    pub fn require(mut self, path: impl Into<String>) -> Self {
        self.required.push(path.into());
        self
    }

    /// Builder: constrain the type at a path.
    pub fn field(mut self, path: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(path.into(), ty);
        self
    }

    /// Builder: reject top-level keys the grammar does not name.
    pub fn deny_unknown(mut self) -> Self {
        self.allow_unknown = false;
        self
    }

    /// Builder: set the nesting limit, at most [`MAX_NESTING_DEPTH`].
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_NESTING_DEPTH);
        self
    }

    /// Returns the nesting limit actually enforced.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_NESTING_DEPTH)
    }

    fn is_declared(&self, key: &str) -> bool {
        self.required
            .iter()
            .chain(self.fields.keys())
            .any(|path| path.split('.').next() == Some(key))
    }
}

impl Validator for GrammarRules {
    fn validate(&self, record: &Record) -> Result<(), Violation> {
        for path in &self.required {
            if lookup(record, path).is_none() {
                return Err(Violation::new(path.as_str(), ViolationKind::Missing));
            }
        }

        for (path, expected) in &self.fields {
            if let Some(value) = lookup(record, path)
                && !expected.accepts(value)
            {
                return Err(Violation::new(
                    path.as_str(),
                    ViolationKind::WrongType {
                        expected: *expected,
                        found: FieldType::of(value),
                    },
                ));
            }
        }

        if !self.allow_unknown
            && let Some(key) = record.keys().find(|key| !self.is_declared(key))
        {
            return Err(Violation::new(key.as_str(), ViolationKind::Unknown));
        }

        check_depth(record, self.effective_max_depth())
    }
}

/// Resolves a dot-separated path inside a record.
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Fails if any value in `record` is nested deeper than `max` levels.
pub fn check_depth(record: &Record, max: usize) -> Result<(), Violation> {
    if max == 0 {
        return Err(Violation::root(ViolationKind::TooDeep { max }));
    }
    for (key, value) in record {
        check_value_depth(value, 2, key.clone(), max)?;
    }
    Ok(())
}

fn check_value_depth(value: &Value, depth: usize, path: String, max: usize) -> Result<(), Violation> {
    match value {
        Value::Object(map) => {
            if depth > max {
                return Err(Violation::new(path, ViolationKind::TooDeep { max }));
            }
            for (key, child) in map {
                check_value_depth(child, depth + 1, format!("{path}.{key}"), max)?;
            }
        }
        Value::Array(items) => {
            if depth > max {
                return Err(Violation::new(path, ViolationKind::TooDeep { max }));
            }
            for (index, child) in items.iter().enumerate() {
                check_value_depth(child, depth + 1, format!("{path}[{index}]"), max)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn bow_request() -> Record {
        record(json!({
            "type": "record",
            "name": "redis.schema.put.request",
            "namespace": "net.genuinemerit.schema",
            "fields": {
                "store": "redis",
                "topic": "ontology_file",
                "plan_ty": "put",
                "service_ty": "request"
            }
        }))
    }

    #[test]
    fn accept_all_accepts() {
        assert!(AcceptAll.validate(&Record::new()).is_ok());
        assert!(AcceptAll.validate(&bow_request()).is_ok());
    }

    #[test]
    fn default_rules_accept_flat_and_nested() {
        let rules = GrammarRules::default();
        assert!(rules.validate(&Record::new()).is_ok());
        assert!(rules.validate(&bow_request()).is_ok());
    }

    #[test]
    fn missing_required_field() {
        let rules = GrammarRules::default().require("channel").require("seq");
        let r = record(json!({"channel": "/queue/x"}));
        assert_eq!(
            rules.validate(&r),
            Err(Violation::new("seq", ViolationKind::Missing))
        );
    }

    #[test]
    fn missing_nested_required_field() {
        let rules = GrammarRules::default().require("fields.auth_token");
        let err = rules.validate(&bow_request()).unwrap_err();
        assert_eq!(err.path, "fields.auth_token");
        assert_eq!(err.kind, ViolationKind::Missing);

        let rules = GrammarRules::default().require("fields.topic");
        assert!(rules.validate(&bow_request()).is_ok());
    }

    #[test]
    fn required_path_through_scalar_is_missing() {
        let rules = GrammarRules::default().require("name.first");
        let err = rules.validate(&bow_request()).unwrap_err();
        assert_eq!(err.kind, ViolationKind::Missing);
    }

    #[test]
    fn wrong_type() {
        let rules = GrammarRules::default().field("seq", FieldType::Integer);
        let r = record(json!({"seq": "one"}));
        assert_eq!(
            rules.validate(&r),
            Err(Violation::new(
                "seq",
                ViolationKind::WrongType {
                    expected: FieldType::Integer,
                    found: FieldType::String,
                }
            ))
        );
    }

    #[test]
    fn number_accepts_integers_and_floats() {
        let rules = GrammarRules::default().field("x", FieldType::Number);
        assert!(rules.validate(&record(json!({"x": 1}))).is_ok());
        assert!(rules.validate(&record(json!({"x": 1.5}))).is_ok());

        let rules = GrammarRules::default().field("x", FieldType::Integer);
        let err = rules.validate(&record(json!({"x": 1.5}))).unwrap_err();
        assert_eq!(
            err.kind,
            ViolationKind::WrongType {
                expected: FieldType::Integer,
                found: FieldType::Number,
            }
        );
    }

    #[test]
    fn typed_field_absent_is_fine() {
        let rules = GrammarRules::default().field("seq", FieldType::Integer);
        assert!(rules.validate(&record(json!({"channel": "c"}))).is_ok());
    }

    #[test]
    fn unknown_fields_rejected_when_denied() {
        let rules = GrammarRules::default()
            .require("channel")
            .field("fields.topic", FieldType::String)
            .deny_unknown();
        assert!(
            rules
                .validate(&record(json!({"channel": "c", "fields": {"topic": "t"}})))
                .is_ok()
        );
        assert_eq!(
            rules.validate(&record(json!({"channel": "c", "extra": true}))),
            Err(Violation::new("extra", ViolationKind::Unknown))
        );
    }

    #[test]
    fn depth_limit() {
        let rules = GrammarRules::default().with_max_depth(2);
        assert!(rules.validate(&record(json!({"a": {"b": 1}}))).is_ok());
        assert!(rules.validate(&record(json!({"a": [1, 2]}))).is_ok());

        let err = rules
            .validate(&record(json!({"a": {"b": {"c": 1}}})))
            .unwrap_err();
        assert_eq!(err, Violation::new("a.b", ViolationKind::TooDeep { max: 2 }));

        let err = rules
            .validate(&record(json!({"a": [1, [2]]})))
            .unwrap_err();
        assert_eq!(err.path, "a[1]");
    }

    #[test]
    fn depth_one_allows_only_scalars() {
        let rules = GrammarRules::default().with_max_depth(1);
        assert!(rules.validate(&record(json!({"a": 1, "b": "x"}))).is_ok());
        assert!(rules.validate(&record(json!({"a": {}}))).is_err());
    }

    #[test]
    fn violation_display() {
        let v = Violation::new(
            "seq",
            ViolationKind::WrongType {
                expected: FieldType::Integer,
                found: FieldType::String,
            },
        );
        assert_eq!(v.to_string(), "seq: expected integer, found string");
        assert_eq!(
            Violation::root(ViolationKind::NotAMapping {
                found: FieldType::Array
            })
            .to_string(),
            "$: expected a mapping at the top level, found array"
        );
    }

    #[test]
    fn rules_from_toml() {
        let rules: GrammarRules = toml::from_str(
            r#"
            required = ["channel", "fields.topic"]
            allow_unknown = false
            max_depth = 8

            [fields]
            channel = "string"
            seq = "integer"
            fields = "object"
            "#,
        )
        .unwrap();

        assert_eq!(rules.required, vec!["channel", "fields.topic"]);
        assert_eq!(rules.fields.get("seq"), Some(&FieldType::Integer));
        assert!(!rules.allow_unknown);
        assert_eq!(rules.max_depth, 8);
    }

    #[test]
    fn rules_from_empty_toml_are_default() {
        let rules: GrammarRules = toml::from_str("").unwrap();
        assert_eq!(rules, GrammarRules::default());
    }

    #[test]
    fn depth_limit_is_capped() {
        let rules = GrammarRules::default().with_max_depth(500);
        assert_eq!(rules.max_depth, MAX_NESTING_DEPTH);

        // A limit loaded from a file is capped when enforced.
        let loaded: GrammarRules = toml::from_str("max_depth = 500").unwrap();
        assert_eq!(loaded.max_depth, 500);
        assert_eq!(loaded.effective_max_depth(), MAX_NESTING_DEPTH);

        let mut value = json!(null);
        for _ in 0..MAX_NESTING_DEPTH {
            value = json!([value]);
        }
        let err = loaded.validate(&record(json!({ "x": value }))).unwrap_err();
        assert_eq!(
            err.kind,
            ViolationKind::TooDeep {
                max: MAX_NESTING_DEPTH
            }
        );
    }

    #[test]
    fn integer_means_integer_literal() {
        assert!(FieldType::Integer.accepts(&json!(1)));
        assert!(!FieldType::Integer.accepts(&json!(1.0)));
        assert!(FieldType::Number.accepts(&json!(1.0)));
    }
}
