use crate::error::GeositeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Rules below this confidence are ignored during evaluation
pub const MIN_RULE_CONFIDENCE: f64 = 0.3;

/// Column-level comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
}

impl RuleOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim().to_lowercase().as_str() {
            "==" => Some(RuleOp::Eq),
            "in" => Some(RuleOp::In),
            "contains" => Some(RuleOp::Contains),
            "regex" => Some(RuleOp::Regex),
            "<=" => Some(RuleOp::Le),
            ">=" => Some(RuleOp::Ge),
            "<" => Some(RuleOp::Lt),
            ">" => Some(RuleOp::Gt),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RuleOp::Eq => "==",
            RuleOp::In => "in",
            RuleOp::Contains => "contains",
            RuleOp::Regex => "regex",
            RuleOp::Le => "<=",
            RuleOp::Ge => ">=",
            RuleOp::Lt => "<",
            RuleOp::Gt => ">",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, RuleOp::Le | RuleOp::Ge | RuleOp::Lt | RuleOp::Gt)
    }
}

impl fmt::Display for RuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An executable column-level rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub column: String,
    pub op: RuleOp,
    pub value: Value,
    pub negative: bool,
    pub confidence: f64,
}

impl Rule {
    pub fn new(column: impl Into<String>, op: RuleOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
            negative: false,
            confidence: 0.9,
        }
    }

    pub fn negated(mut self, negative: bool) -> Self {
        self.negative = negative;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_confident(&self) -> bool {
        self.confidence >= MIN_RULE_CONFIDENCE
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.negative { "NOT " } else { "" };
        write!(f, "{}{} {} {}", prefix, self.column, self.op, self.value)
    }
}

/// Rule as proposed by the language model, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    pub column: String,
    pub op: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub negative: bool,
    #[serde(default)]
    pub confidence: f64,
}

impl TryFrom<RawRule> for Rule {
    type Error = GeositeError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let op = RuleOp::parse(&raw.op).ok_or_else(|| GeositeError::MalformedResponse {
            reason: format!("unknown rule operator '{}'", raw.op),
        })?;
        if raw.column.trim().is_empty() {
            return Err(GeositeError::MalformedResponse {
                reason: "rule without a column".to_string(),
            });
        }
        if !raw.confidence.is_finite() {
            return Err(GeositeError::MalformedResponse {
                reason: format!("rule on '{}' has a non-finite confidence", raw.column),
            });
        }

        Ok(Rule {
            column: raw.column,
            op,
            value: raw.value,
            negative: raw.negative,
            confidence: raw.confidence,
        })
    }
}

/// Validated rule proposal from the language model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleProposal {
    pub rules: Vec<Rule>,
    pub synonyms: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_parse() {
        assert_eq!(RuleOp::parse("<="), Some(RuleOp::Le));
        assert_eq!(RuleOp::parse("REGEX"), Some(RuleOp::Regex));
        assert_eq!(RuleOp::parse("between"), None);
        assert!(RuleOp::Gt.is_numeric());
        assert!(!RuleOp::In.is_numeric());
    }

    #[test]
    fn test_raw_rule_validation() {
        let raw: RawRule = serde_json::from_value(json!({
            "column": "price_per_m2",
            "op": "<=",
            "value": 3000,
            "confidence": 0.9
        }))
        .unwrap();
        let rule = Rule::try_from(raw).unwrap();
        assert_eq!(rule.op, RuleOp::Le);
        assert!(!rule.negative);
        assert!(rule.is_confident());

        let bad: RawRule =
            serde_json::from_value(json!({ "column": "x", "op": "near", "value": 1 })).unwrap();
        assert!(Rule::try_from(bad).is_err());
    }

    #[test]
    fn test_missing_confidence_defaults_below_threshold() {
        let raw: RawRule =
            serde_json::from_value(json!({ "column": "land_use", "op": "contains", "value": "商业" }))
                .unwrap();
        let rule = Rule::try_from(raw).unwrap();
        assert!(!rule.is_confident());
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule::new("land_use", RuleOp::Contains, "工业").negated(true);
        assert_eq!(rule.to_string(), "NOT land_use contains \"工业\"");
    }
}
