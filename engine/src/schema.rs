//! JSON Schema helpers
//!
//! Thin wrapper over the `jsonschema` crate used for action parameters, the
//! planning decision and caller-requested response formats. Validation
//! collects every violation into one message rather than stopping at the
//! first.

use jsonschema::Validator;
use serde_json::Value;
use std::fmt;

/// A compiled JSON schema together with its source document
pub struct CompiledSchema {
    source: Value,
    validator: Validator,
}

impl CompiledSchema {
    /// Compile a schema document
    ///
    /// Returns the compiler's message when the document is not a valid schema.
    pub fn compile(source: Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&source).map_err(|e| e.to_string())?;
        Ok(Self { source, validator })
    }

    /// The schema document this was compiled from
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Validate an instance, joining every violation into one message
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join("; "))
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
