//! Evaluator registry: LLM-judge and code rules on datasets or projects.

use std::sync::Arc;

use serde_json::{json, Value};
use tracekit_wire::{
    CodeSpec, EvaluatorBody, EvaluatorRuleRequest, JudgePrompt, JudgeSpec, PlatformTransport,
    StructuredJudge, VariableMapping,
};

use super::owner::OwnerResolver;
use super::resolve::{rule_target, Resolved};
use super::Provisioned;
use crate::domain::{
    EvaluatorDefinition, EvaluatorKind, PromptSource, Result, ScoreType, DEFAULT_RULE_FILTER,
    MODEL_SECRET_KEY,
};
use crate::guard::IdempotencyGuard;

/// Model judges run with unless a definition says otherwise.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-5-mini";

/// Serialized chat-model constructor for judges. The credential is a
/// reference to the workspace secret, never the value.
pub fn default_judge_model() -> Value {
    json!({
        "lc": 1,
        "type": "constructor",
        "id": ["langchain", "chat_models", "openai", "ChatOpenAI"],
        "kwargs": {
            "temperature": 1,
            "top_p": 1,
            "presence_penalty": null,
            "frequency_penalty": null,
            "model": DEFAULT_JUDGE_MODEL,
            "extra_headers": {},
            "openai_api_key": {
                "id": [MODEL_SECRET_KEY],
                "lc": 1,
                "type": "secret"
            }
        }
    })
}

/// Structured-output schema with one required score property named `key`
/// and an optional free-text `comment`.
pub fn judge_schema(key: &str, description: &str, score_type: ScoreType) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        key.to_string(),
        json!({ "type": score_type.as_str(), "description": description }),
    );
    properties.insert(
        "comment".to_string(),
        json!({ "type": "string", "description": "Reasoning for the score" }),
    );
    json!({
        "title": "extract",
        "description": "Extract information from the user's response.",
        "type": "object",
        "properties": properties,
        "required": [key],
    })
}

pub struct EvaluatorRegistry {
    transport: Arc<dyn PlatformTransport>,
    guard: IdempotencyGuard,
    owner: Arc<OwnerResolver>,
    default_project: Option<String>,
}

impl EvaluatorRegistry {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        owner: Arc<OwnerResolver>,
        default_project: Option<String>,
    ) -> Self {
        let guard = IdempotencyGuard::new(transport.api().clone());
        Self {
            transport,
            guard,
            owner,
            default_project,
        }
    }

    pub async fn provision(&self, definition: &EvaluatorDefinition) -> Result<Provisioned> {
        let api = self.transport.api();
        let target =
            match rule_target(api, &definition.target, self.default_project.as_deref()).await? {
                Resolved::Found(target) => target,
                Resolved::Missing(reason) => return Ok(Provisioned::skipped(reason)),
            };

        let scope = target.scope();
        if self.guard.exists(&definition.name, &scope).await? {
            return Ok(Provisioned::Existing(None));
        }

        let body = match &definition.kind {
            EvaluatorKind::Judge {
                score_type,
                prompt,
                description,
            } => {
                let prompt = match prompt {
                    PromptSource::Inline(messages) => JudgePrompt::Inline(messages.clone()),
                    PromptSource::Reference(reference) => {
                        let owner = self.owner.resolve().await?;
                        if !self.guard.prompt_exists(&owner, reference).await {
                            return Ok(Provisioned::skipped(format!(
                                "judge prompt '{}' not found",
                                reference
                            )));
                        }
                        JudgePrompt::HubRef(reference.clone())
                    }
                };
                let description = description
                    .clone()
                    .unwrap_or_else(|| format!("Evaluator for {}", definition.name));
                EvaluatorBody::Judge(vec![JudgeSpec {
                    structured: StructuredJudge {
                        model: default_judge_model(),
                        schema: judge_schema(&definition.name, &description, *score_type),
                        variable_mapping: VariableMapping::default(),
                        prompt,
                    },
                }])
            }
            EvaluatorKind::Code { code, language } => EvaluatorBody::Code(vec![CodeSpec {
                code: code.clone(),
                language: language.clone(),
            }]),
        };

        let request = EvaluatorRuleRequest {
            display_name: definition.name.clone(),
            target,
            sampling_rate: definition.sampling_rate,
            is_enabled: true,
            filter: Some(
                definition
                    .filter
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RULE_FILTER.to_string()),
            ),
            body,
        };
        let record = api.create_evaluator(&request).await?;
        Ok(Provisioned::Created(record.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_the_score_key() {
        let schema = judge_schema("correctness", "Evaluator for correctness", ScoreType::Boolean);
        assert_eq!(schema["title"], "extract");
        assert_eq!(schema["required"], json!(["correctness"]));
        assert_eq!(schema["properties"]["correctness"]["type"], "boolean");
        assert_eq!(schema["properties"]["comment"]["type"], "string");
    }

    #[test]
    fn judge_model_references_the_secret() {
        let model = default_judge_model();
        assert_eq!(model["kwargs"]["model"], DEFAULT_JUDGE_MODEL);
        assert_eq!(model["kwargs"]["openai_api_key"]["type"], "secret");
        assert_eq!(model["kwargs"]["openai_api_key"]["id"], json!([MODEL_SECRET_KEY]));
    }
}
