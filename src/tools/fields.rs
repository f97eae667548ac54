use std::fmt::Write as _;

use serde_json::Value;

use super::ToolError;

/// Parameter value types understood by the dispatch-time validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

/// The parameter object a tool accepts. Validated before the handler runs
/// so handlers can assume required fields exist with the right type.
#[derive(Debug, Clone, Default)]
pub struct ObjectSpec {
    pub fields: Vec<FieldSpec>,
}

impl ObjectSpec {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn validate(&self, params: &Value) -> Result<(), ToolError> {
        let Some(object) = params.as_object() else {
            return Err(ToolError::InvalidParameter {
                name: "params".into(),
                expected: "object".into(),
            });
        };

        for field in &self.fields {
            match object.get(field.name) {
                Some(value) => {
                    if !field.kind.matches(value) && !value.is_null() {
                        return Err(ToolError::InvalidParameter {
                            name: field.name.into(),
                            expected: field.kind.as_str().into(),
                        });
                    }
                }
                None if field.required => {
                    return Err(ToolError::MissingParameter(field.name.into()));
                }
                None => {}
            }
        }

        Ok(())
    }

    /// Compact `{"name": kind, ...}` rendering for the tools prompt.
    pub fn describe(&self) -> String {
        if self.fields.is_empty() {
            return "{}".into();
        }
        let mut out = String::from("{");
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "\"{}\": {}", field.name, field.kind.as_str());
            if !field.required {
                out.push('?');
            }
        }
        out.push('}');
        out
    }
}

/// Shorthand for tools whose only parameter is a workspace-relative path.
pub fn path_only_spec() -> ObjectSpec {
    ObjectSpec::new(vec![FieldSpec::required(
        "path",
        FieldKind::String,
        "Workspace-relative path",
    )])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn spec() -> ObjectSpec {
        ObjectSpec::new(vec![
            FieldSpec::required("path", FieldKind::String, "target path"),
            FieldSpec::optional("count", FieldKind::Integer, "how many"),
        ])
    }

    #[test]
    fn test_valid_params_pass() {
        assert!(spec().validate(&json!({"path": "a.txt", "count": 3})).is_ok());
        assert!(spec().validate(&json!({"path": "a.txt"})).is_ok());
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = spec().validate(&json!({"count": 3})).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(name) if name == "path"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = spec().validate(&json!({"path": 42})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter { .. }));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(spec().validate(&json!([1, 2])).is_err());
        assert!(spec().validate(&json!("string")).is_err());
    }

    #[test]
    fn test_empty_object_spec_accepts_empty_params() {
        assert!(ObjectSpec::empty().validate(&json!({})).is_ok());
    }

    #[test]
    fn test_describe() {
        assert_eq!(spec().describe(), r#"{"path": string, "count": integer?}"#);
        assert_eq!(ObjectSpec::empty().describe(), "{}");
    }
}
