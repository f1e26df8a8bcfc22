use crate::collaborators::SpecValidator;
use rcsd_core::{SpecDocument, SpecValidation};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+\S").expect("heading pattern"));

#[allow(clippy::expect_used)]
static REQUIREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\S").expect("list item pattern"));

#[allow(clippy::expect_used)]
static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(?:MUST(?: NOT)?|SHALL(?: NOT)?|SHOULD(?: NOT)?|MAY",
        r"|REQUIRED|RECOMMENDED|OPTIONAL)\b"
    ))
    .expect("rfc 2119 keyword pattern")
});

/// Structural and RFC 2119 check of a generated spec.
///
/// Requirement lines are markdown list items. Coverage is the share of them
/// carrying at least one upper-case RFC 2119 keyword.
pub struct Rfc2119Validator {
    min_coverage: f64,
}

impl Rfc2119Validator {
    pub fn new(min_coverage: f64) -> Self {
        Self { min_coverage }
    }

    /// Share of requirement lines carrying a keyword, and the number of such lines.
    pub fn coverage(body: &str) -> (f64, usize) {
        let requirements: Vec<&str> = body.lines().filter(|l| REQUIREMENT_RE.is_match(l)).collect();
        if requirements.is_empty() {
            return (0.0, 0);
        }
        let normative = requirements.iter().filter(|l| KEYWORD_RE.is_match(l)).count();
        (normative as f64 / requirements.len() as f64, requirements.len())
    }
}

impl SpecValidator for Rfc2119Validator {
    fn validate(&self, spec: &SpecDocument) -> SpecValidation {
        let (coverage, requirement_lines) = Self::coverage(&spec.body);
        let mut errors = Vec::new();

        if spec.title.trim().is_empty() {
            errors.push("spec has no title".to_string());
        }
        if spec.body.trim().is_empty() {
            errors.push("spec body is empty".to_string());
        } else if !HEADING_RE.is_match(&spec.body) {
            errors.push("spec body has no markdown heading".to_string());
        }
        if requirement_lines == 0 && self.min_coverage > 0.0 {
            errors.push("spec has no requirement list items".to_string());
        } else if coverage < self.min_coverage {
            errors.push(format!(
                "RFC 2119 coverage {:.2} is below the required {:.2}",
                coverage, self.min_coverage
            ));
        }

        if errors.is_empty() {
            SpecValidation::passed(coverage)
        } else {
            SpecValidation::failed(coverage, errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
# Rate limiter

## Requirements
- The limiter MUST reject requests above the configured rate.
- Limits SHOULD be configurable per tenant.
- Operators MAY disable limiting.
- Metrics are exported on /metrics.
";

    #[test]
    fn test_coverage_counts_list_items_only() {
        let (coverage, lines) = Rfc2119Validator::coverage(BODY);
        assert_eq!(lines, 4);
        assert!((coverage - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lowercase_keywords_do_not_count() {
        let (coverage, _) = Rfc2119Validator::coverage("- you must do this\n- it may fail");
        assert_eq!(coverage, 0.0);
    }

    #[test]
    fn test_valid_spec_passes() {
        let v = Rfc2119Validator::new(0.5).validate(&SpecDocument::new("Rate limiter", BODY));
        assert!(v.valid, "{:?}", v.errors);
        assert!(v.errors.is_empty());
    }

    #[test]
    fn test_low_coverage_fails() {
        let v = Rfc2119Validator::new(0.9).validate(&SpecDocument::new("Rate limiter", BODY));
        assert!(!v.valid);
        assert!(v.errors[0].contains("below the required"));
    }

    #[test]
    fn test_missing_heading_and_title() {
        let v = Rfc2119Validator::new(0.0).validate(&SpecDocument::new(" ", "- MUST work"));
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn test_no_requirements() {
        let v = Rfc2119Validator::new(0.5).validate(&SpecDocument::new("t", "# Only prose\nText."));
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("no requirement")));
    }
}
