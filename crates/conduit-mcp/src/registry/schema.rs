//! Schema Collaborators
//!
//! Two pluggable capabilities around JSON Schema:
//!
//! - **Validation** ([`SchemaValidator`]): tool arguments are checked
//!   against the tool's `inputSchema` before the handler runs, and
//!   structured output against the declared `outputSchema` before
//!   emission.
//! - **Derivation** ([`output_schema_for`]): hosts that register tools
//!   with typed outputs can derive the `outputSchema` from the Rust
//!   type instead of writing it by hand. Derivation is opt-in; tools
//!   registered without it simply omit `outputSchema`.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Failure to compile a schema at registration time
#[derive(Debug, Clone, Error)]
#[error("Invalid schema: {message}")]
pub struct SchemaError {
    /// What the schema compiler rejected
    pub message: String,
}

/// A compiled JSON Schema ready for repeated validation
#[derive(Debug)]
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile a schema document
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the document is not a valid schema.
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError {
            message: e.to_string(),
        })?;
        Ok(Self { validator })
    }

    /// Validate an instance, reporting the first violation
    ///
    /// # Errors
    ///
    /// Returns the first violation rendered as `path: message`.
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        match self.validator.iter_errors(instance).next() {
            None => Ok(()),
            Some(error) => Err(format!("{}: {}", error.instance_path, error)),
        }
    }

    /// Whether an instance satisfies the schema
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

/// Derive the JSON Schema for a typed tool output
///
/// Used by tool builders to populate `outputSchema` from a Rust type:
///
/// ```rust
/// use conduit_mcp::registry::output_schema_for;
/// use schemars::JsonSchema;
/// use serde::Serialize;
///
/// #[derive(Serialize, JsonSchema)]
/// struct Forecast {
///     temperature_c: f64,
///     summary: String,
/// }
///
/// let schema = output_schema_for::<Forecast>();
/// assert_eq!(schema["properties"]["summary"]["type"], "string");
/// ```
pub fn output_schema_for<T: schemars::JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"}
            },
            "required": ["message"]
        })
    }

    #[test]
    fn compile_rejects_malformed_schemas() {
        assert!(SchemaValidator::compile(&json!({"type": 42})).is_err());
        assert!(SchemaValidator::compile(&echo_schema()).is_ok());
    }

    #[test]
    fn validation_reports_the_violation() {
        let validator = SchemaValidator::compile(&echo_schema()).unwrap();
        assert!(validator.validate(&json!({"message": "hi"})).is_ok());

        let error = validator.validate(&json!({"message": 7})).unwrap_err();
        assert!(error.contains("message"));
        assert!(!validator.is_valid(&json!({})));
    }

    #[test]
    fn derived_schema_covers_fields() {
        #[derive(serde::Serialize, schemars::JsonSchema)]
        struct Output {
            count: u32,
        }
        let schema = output_schema_for::<Output>();
        assert!(schema["properties"]["count"].is_object());
    }
}
