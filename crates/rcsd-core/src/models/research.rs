use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single source backing the research findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// URL, file path or other locator of the source.
    pub source: String,
    /// Human-readable title, when known.
    #[serde(default)]
    pub title: Option<String>,
    /// The quoted passage the findings rely on.
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl Citation {
    /// Creates a citation with only a source locator.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: None,
            excerpt: None,
        }
    }
}

/// Evidence bundle produced by the research stage.
///
/// Immutable once produced; consumed by the consensus round and the spec
/// stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    /// The topic this evidence was gathered for.
    #[serde(default)]
    pub topic: String,
    /// Ordered source citations.
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Synthesized findings, in the order the researcher reported them.
    #[serde(default)]
    pub findings: Vec<String>,
    /// When the bundle was produced.
    #[serde(default = "Utc::now")]
    pub produced_at: DateTime<Utc>,
}

impl ResearchOutput {
    /// Creates an empty bundle for a topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            citations: Vec::new(),
            findings: Vec::new(),
            produced_at: Utc::now(),
        }
    }

    /// Appends a citation.
    pub fn with_citation(mut self, citation: Citation) -> Self {
        self.citations.push(citation);
        self
    }

    /// Appends a finding.
    pub fn with_finding(mut self, finding: impl Into<String>) -> Self {
        self.findings.push(finding.into());
        self
    }

    /// Whether the bundle carries no evidence at all.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty() && self.findings.is_empty()
    }
}

/// Input handed to the research collaborator.
///
/// On a revision pass `revision` is non-zero and `guidance` carries what the
/// previous consensus round asked to be revised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// The natural-language topic of the run.
    pub topic: String,
    /// Zero on the first pass, incremented on each revision.
    pub revision: u32,
    /// Revision guidance from the previous consensus round.
    pub guidance: Option<String>,
}
