use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum characters of site context passed to the narrator
pub const NARRATION_CONTEXT_CHARS: usize = 100;

/// Input of the narration collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRequest {
    /// Raw user request
    pub request: String,

    /// Positive requirement texts
    pub requirements: Vec<String>,

    /// Hard constraints rendered as text
    pub constraint_summary: Vec<String>,

    /// Candidate contexts in presentation order, truncated
    pub candidates: Vec<String>,

    /// Number of sites the narrator should recommend
    pub max_sites: usize,
}

impl NarrationRequest {
    /// Truncate a context to the narration budget on a char boundary
    pub fn truncate_context(context: &str) -> String {
        context.chars().take(NARRATION_CONTEXT_CHARS).collect()
    }
}

/// Narrative for one recommended site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteNarrative {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub advantages: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Strict narration response schema.
///
/// `sites` is keyed by 1-based presentation index ("1", "2", ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteNarrative>,
}

impl Narrative {
    pub fn site(&self, position: usize) -> Option<&SiteNarrative> {
        self.sites.get(&(position + 1).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_context_on_char_boundary() {
        let context = "地".repeat(150);
        assert_eq!(NarrationRequest::truncate_context(&context).chars().count(), 100);
        assert_eq!(NarrationRequest::truncate_context("short"), "short");
    }

    #[test]
    fn test_narrative_schema() {
        let narrative: Narrative = serde_json::from_str(
            r#"{
                "recommendations": "地块1->地块2",
                "summary": "交通便利",
                "sites": {
                    "1": {"name": "A", "reason": "近地铁", "score": 8.5,
                          "advantages": ["a", "b", "c"], "risks": ["r"]},
                    "2": {"name": "B"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(narrative.site(0).unwrap().score, Some(8.5));
        assert!(narrative.site(1).unwrap().advantages.is_empty());
        assert!(narrative.site(2).is_none());
    }

    #[test]
    fn test_narrative_rejects_wrong_shapes() {
        let result: Result<Narrative, _> =
            serde_json::from_str(r#"{"sites": {"1": {"advantages": "not a list"}}}"#);
        assert!(result.is_err());
    }
}
