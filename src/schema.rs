//! Schema contracts for pipeline inputs and structured model outputs.
//!
//! A [`Shape`] is a static, named list of fields. The same description is used
//! three ways: to validate raw JSON coming in ([`validate_input`]) or coming
//! back from the model ([`validate_output`]), and to tell the model what to
//! produce ([`Shape::describe`]).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

// =============================================================================
// Shape declarations
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// A string. Required text must not be blank.
    Text,
    /// An absolute URL.
    Url,
    /// A string drawn from a closed set.
    OneOf(&'static [&'static str]),
    /// An integer within an inclusive range.
    Integer { min: i64, max: i64 },
    /// An array of non-blank strings.
    TextList { min_items: usize },
    /// An array of objects, each conforming to `item`.
    ObjectList {
        item: &'static Shape,
        min_items: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    /// Steers the model; also shown in violation reports.
    pub description: &'static str,
}

impl FieldSpec {
    pub const fn required(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

// =============================================================================
// Violations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViolationKind {
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("required field is missing")]
    MissingField,
    #[error("required field is empty")]
    EmptyField,
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{value:?} is not one of {allowed:?}")]
    NotInSet {
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("{value:?} is not a valid URL")]
    InvalidUrl { value: String },
    #[error("expected at least {min} items, found {found}")]
    TooFewItems { min: usize, found: usize },
    #[error("{value} is outside {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("{0}")]
    Decode(String),
}

/// A value does not conform to its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema violation in {shape} at {path}: {kind}")]
pub struct SchemaViolation {
    pub shape: &'static str,
    pub path: String,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    fn new(shape: &'static str, path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            shape,
            path: path.into(),
            kind,
        }
    }

    /// True when the violation means "nothing usable was produced" rather than
    /// "something malformed was produced".
    pub fn is_absence(&self) -> bool {
        matches!(
            self.kind,
            ViolationKind::MissingField
                | ViolationKind::EmptyField
                | ViolationKind::TooFewItems { .. }
        )
    }
}

// =============================================================================
// Validation
// =============================================================================

impl Shape {
    /// Check `value` against this shape.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(self.name, "$", value)
    }

    fn validate_at(
        &self,
        root: &'static str,
        path: &str,
        value: &Value,
    ) -> Result<(), SchemaViolation> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new(root, path, ViolationKind::NotAnObject))?;

        for field in self.fields {
            let field_path = format!("{path}.{}", field.name);
            match obj.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaViolation::new(
                        root,
                        field_path,
                        ViolationKind::MissingField,
                    ));
                }
                None | Some(Value::Null) => {}
                Some(v) => check_field(root, &field_path, field, v)?,
            }
        }
        Ok(())
    }

    /// Human-readable description of the expected JSON, for the model.
    pub fn describe(&self) -> String {
        let mut out = String::from(
            "Respond with a single JSON object and nothing else. It must have these fields:\n",
        );
        describe_fields(self.fields, 0, &mut out);
        out
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn check_field(
    root: &'static str,
    path: &str,
    field: &FieldSpec,
    v: &Value,
) -> Result<(), SchemaViolation> {
    let violation = |kind| Err(SchemaViolation::new(root, path, kind));

    match field.ty {
        FieldType::Text => {
            let s = expect_str(root, path, v)?;
            if field.required && s.trim().is_empty() {
                return violation(ViolationKind::EmptyField);
            }
        }
        FieldType::Url => {
            let s = expect_str(root, path, v)?;
            if s.trim().is_empty() {
                return if field.required {
                    violation(ViolationKind::EmptyField)
                } else {
                    Ok(())
                };
            }
            if !is_valid_url(s) {
                return violation(ViolationKind::InvalidUrl {
                    value: s.to_string(),
                });
            }
        }
        FieldType::OneOf(allowed) => {
            let s = expect_str(root, path, v)?;
            if s.trim().is_empty() && field.required {
                return violation(ViolationKind::EmptyField);
            }
            if !allowed.contains(&s) {
                return violation(ViolationKind::NotInSet {
                    value: s.to_string(),
                    allowed,
                });
            }
        }
        FieldType::Integer { min, max } => {
            let n = v.as_i64().ok_or_else(|| {
                SchemaViolation::new(
                    root,
                    path,
                    ViolationKind::TypeMismatch {
                        expected: "integer",
                        found: json_kind(v),
                    },
                )
            })?;
            if n < min || n > max {
                return violation(ViolationKind::OutOfRange { value: n, min, max });
            }
        }
        FieldType::TextList { min_items } => {
            let items = expect_array(root, path, v)?;
            if items.len() < min_items {
                return violation(ViolationKind::TooFewItems {
                    min: min_items,
                    found: items.len(),
                });
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let s = expect_str(root, &item_path, item)?;
                if s.trim().is_empty() {
                    return Err(SchemaViolation::new(
                        root,
                        item_path,
                        ViolationKind::EmptyField,
                    ));
                }
            }
        }
        FieldType::ObjectList { item, min_items } => {
            let items = expect_array(root, path, v)?;
            if items.len() < min_items {
                return violation(ViolationKind::TooFewItems {
                    min: min_items,
                    found: items.len(),
                });
            }
            for (i, element) in items.iter().enumerate() {
                item.validate_at(root, &format!("{path}[{i}]"), element)?;
            }
        }
    }
    Ok(())
}

fn expect_str<'v>(root: &'static str, path: &str, v: &'v Value) -> Result<&'v str, SchemaViolation> {
    v.as_str().ok_or_else(|| {
        SchemaViolation::new(
            root,
            path,
            ViolationKind::TypeMismatch {
                expected: "string",
                found: json_kind(v),
            },
        )
    })
}

fn expect_array<'v>(
    root: &'static str,
    path: &str,
    v: &'v Value,
) -> Result<&'v Vec<Value>, SchemaViolation> {
    v.as_array().ok_or_else(|| {
        SchemaViolation::new(
            root,
            path,
            ViolationKind::TypeMismatch {
                expected: "array",
                found: json_kind(v),
            },
        )
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Absolute http(s) URL with a host.
pub fn is_valid_url(s: &str) -> bool {
    match url::Url::parse(s.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

fn describe_fields(fields: &[FieldSpec], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth + 1);
    for field in fields {
        let ty = match field.ty {
            FieldType::Text => "string".to_string(),
            FieldType::Url => "string (absolute URL)".to_string(),
            FieldType::OneOf(allowed) => {
                let quoted: Vec<String> = allowed.iter().map(|a| format!("\"{a}\"")).collect();
                format!("one of {}", quoted.join(" | "))
            }
            FieldType::Integer { min, max } => format!("integer {min}..={max}"),
            FieldType::TextList { min_items } => {
                format!("array of strings (at least {min_items})")
            }
            FieldType::ObjectList { min_items, .. } => {
                format!("array of objects (at least {min_items}), each with:")
            }
        };
        let req = if field.required { "required" } else { "optional" };
        out.push_str(&format!(
            "{indent}\"{}\": {ty} [{req}] {}\n",
            field.name, field.description
        ));
        if let FieldType::ObjectList { item, .. } = field.ty {
            describe_fields(item.fields, depth + 1, out);
        }
    }
}

// =============================================================================
// Typed contracts
// =============================================================================

/// A typed pipeline input with a declared shape.
pub trait InputContract: Serialize + DeserializeOwned {
    const SHAPE: &'static Shape;

    /// Check an already-typed value against its shape.
    fn ensure_valid(&self) -> Result<(), SchemaViolation> {
        let raw = serde_json::to_value(self).map_err(|e| {
            SchemaViolation::new(Self::SHAPE.name, "$", ViolationKind::Decode(e.to_string()))
        })?;
        Self::SHAPE.validate(&raw)
    }
}

/// Validate raw JSON against `T`'s shape and decode it.
pub fn validate_input<T: InputContract>(raw: &Value) -> Result<T, SchemaViolation> {
    T::SHAPE.validate(raw)?;
    decode(T::SHAPE, raw)
}

/// Validate a raw model reply against `shape` and decode it.
pub fn validate_output<T: DeserializeOwned>(
    shape: &'static Shape,
    raw: &Value,
) -> Result<T, SchemaViolation> {
    shape.validate(raw)?;
    decode(shape, raw)
}

fn decode<T: DeserializeOwned>(shape: &'static Shape, raw: &Value) -> Result<T, SchemaViolation> {
    // Unknown keys and nulls are dropped so serde defaults apply to absent optionals.
    let trimmed = match raw {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(k, v)| shape.field(k).is_some() && !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    };
    serde_json::from_value(trimmed)
        .map_err(|e| SchemaViolation::new(shape.name, "$", ViolationKind::Decode(e.to_string())))
}
