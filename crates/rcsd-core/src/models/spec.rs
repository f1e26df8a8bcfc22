use serde::{Deserialize, Serialize};

/// Result of validating a [`SpecDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecValidation {
    /// Whether the document passed schema validation.
    pub valid: bool,
    /// Fraction of requirement lines that use an RFC 2119 keyword, in `[0.0, 1.0]`.
    pub rfc2119_coverage: f64,
    /// Human-readable validation errors; empty when `valid`.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SpecValidation {
    /// A passing validation with the given coverage.
    pub fn passed(rfc2119_coverage: f64) -> Self {
        Self {
            valid: true,
            rfc2119_coverage,
            errors: Vec::new(),
        }
    }

    /// A failing validation.
    pub fn failed(rfc2119_coverage: f64, errors: Vec<String>) -> Self {
        Self {
            valid: false,
            rfc2119_coverage,
            errors,
        }
    }
}

/// Structured specification produced by the spec stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    /// Specification title.
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Validation status, filled in by the stage machine after validation.
    #[serde(default)]
    pub validation: Option<SpecValidation>,
}

impl SpecDocument {
    /// Creates an unvalidated document.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            validation: None,
        }
    }

    /// Whether the document has been validated and passed.
    pub fn is_valid(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| v.valid)
    }
}
