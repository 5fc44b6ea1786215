//! OpenAI-compatible chat client implementing the language-model port

use crate::ports::LanguageModel;
use crate::prompts;
use async_trait::async_trait;
use geosite_core::error::{GeositeError, Result};
use geosite_core::models::{
    ConstraintCategory, HardConstraint, NarrationRequest, Narrative, RawRule, Requirement, Rule,
    RuleProposal,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Chat-completions client with JSON-object responses
pub struct ChatModelClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatModelClient {
    /// Create a client against `{base_url}/chat/completions`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GeositeError::LanguageModelUnavailable {
                reason: format!("Failed to build HTTP client: {}", e),
                remediation: "Check the TLS configuration of this host".to_string(),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and return the raw message content
    async fn chat_json(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            stream: false,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GeositeError::LanguageModelUnavailable {
                reason: format!("Failed to reach {}: {}", self.base_url, e),
                remediation: "Check network access and GEOSITE_LLM_BASE_URL".to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeositeError::LanguageModelUnavailable {
                reason: format!("Chat API error ({}): {}", status, error_text),
                remediation: format!(
                    "Check GEOSITE_LLM_API_KEY and that the model '{}' exists",
                    self.model
                ),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| GeositeError::MalformedResponse {
            reason: format!("Failed to parse chat response: {}", e),
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GeositeError::MalformedResponse {
                reason: "chat response has no choices".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for ChatModelClient {
    async fn parse(&self, request: &str) -> Result<Vec<Requirement>> {
        let content = self.chat_json(prompts::PARSE_SYSTEM, &prompts::parse_prompt(request)).await?;
        let parsed: ParseResponse = decode(&content)?;
        let requirements: Vec<Requirement> = parsed.into_items().into_iter().map(Requirement::from).collect();

        tracing::debug!(count = requirements.len(), "Parsed request into requirements");
        Ok(requirements)
    }

    async fn propose_rules(
        &self,
        constraints: &[HardConstraint],
        columns: &[String],
        samples: &BTreeMap<String, Vec<String>>,
    ) -> Result<RuleProposal> {
        let prompt = prompts::rules_prompt(constraints, columns, samples);
        let content = self.chat_json(prompts::RULES_SYSTEM, &prompt).await?;
        let raw: RawProposal = decode(&content)?;
        Ok(raw.validate())
    }

    async fn narrate(&self, request: &NarrationRequest) -> Result<Narrative> {
        let content = self
            .chat_json(prompts::NARRATE_SYSTEM, &prompts::narrate_prompt(request))
            .await?;
        decode(&content)
    }
}

/// Decode a JSON payload, tolerating a surrounding Markdown code fence
pub fn decode<T: DeserializeOwned>(content: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(content)).map_err(|e| GeositeError::MalformedResponse {
        reason: format!("response does not match the expected schema: {}", e),
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: String,
}

/// One requirement as emitted by the parse prompt
#[derive(Debug, Deserialize)]
struct ParsedRequirement {
    #[serde(default)]
    pos: Option<String>,
    #[serde(default)]
    neg: Option<String>,
    #[serde(default)]
    mustsee: bool,
    #[serde(default, rename = "type")]
    category: Option<String>,
}

impl From<ParsedRequirement> for Requirement {
    fn from(parsed: ParsedRequirement) -> Self {
        Requirement {
            positive: parsed.pos,
            negative: parsed.neg,
            is_hard_constraint: parsed.mustsee,
            category: parsed
                .category
                .as_deref()
                .map(ConstraintCategory::parse)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParseResponse {
    Wrapped { requirements: Vec<ParsedRequirement> },
    Bare(Vec<ParsedRequirement>),
}

impl ParseResponse {
    fn into_items(self) -> Vec<ParsedRequirement> {
        match self {
            ParseResponse::Wrapped { requirements } => requirements,
            ParseResponse::Bare(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    synonyms: BTreeMap<String, Vec<String>>,
}

impl RawProposal {
    /// Keep the rules that validate; drop the rest individually
    fn validate(self) -> RuleProposal {
        let total = self.rules.len();
        let rules: Vec<Rule> = self
            .rules
            .into_iter()
            .filter_map(|raw| match Rule::try_from(raw) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping proposed rule");
                    None
                }
            })
            .collect();

        tracing::debug!(accepted = rules.len(), proposed = total, "Validated proposed rules");
        RuleProposal { rules, synonyms: self.synonyms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosite_core::models::RuleOp;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_response_shapes() {
        let wrapped: ParseResponse = decode(
            r#"{"requirements": [{"pos": "天河区", "neg": null, "mustsee": true, "type": "区域"}]}"#,
        )
        .unwrap();
        let requirements: Vec<Requirement> =
            wrapped.into_items().into_iter().map(Requirement::from).collect();
        assert_eq!(requirements[0].category, ConstraintCategory::Region);
        assert!(requirements[0].is_hard_constraint);

        let bare: ParseResponse = decode(r#"[{"pos": null, "neg": "化工园", "mustsee": true}]"#).unwrap();
        let items = bare.into_items();
        assert_eq!(items[0].neg.as_deref(), Some("化工园"));
    }

    #[test]
    fn test_malformed_parse_response() {
        let result: Result<ParseResponse> = decode(r#"{"items": "nope"}"#);
        assert!(matches!(result, Err(GeositeError::MalformedResponse { .. })));
    }

    #[test]
    fn test_invalid_rules_are_dropped_individually() {
        let raw: RawProposal = decode(
            r#"{
                "rules": [
                    {"column": "price_per_m2", "op": "<=", "value": 3000, "confidence": 0.9},
                    {"column": "land_use", "op": "near", "value": "x", "confidence": 0.9}
                ],
                "synonyms": {"便宜": ["低价"]}
            }"#,
        )
        .unwrap();

        let proposal = raw.validate();
        assert_eq!(proposal.rules.len(), 1);
        assert_eq!(proposal.rules[0].op, RuleOp::Le);
        assert_eq!(proposal.synonyms["便宜"], vec!["低价".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let client = ChatModelClient::new("http://127.0.0.1:9", "deepseek-chat", "sk-test").unwrap();
        let result = client.parse("近地铁").await;
        assert!(matches!(result, Err(GeositeError::LanguageModelUnavailable { .. })));
    }
}
