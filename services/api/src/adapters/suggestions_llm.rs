//! services/api/src/adapters/suggestions_llm.rs
//!
//! This module contains the adapter for the reinforcement-suggestion LLM.
//! It implements the `SuggestionService` port from the `core` crate against any
//! OpenAI-compatible chat endpoint (Gemini's compatibility endpoint by default).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use classroom_core::{
    domain::{ReinforcementPlan, SubjectSuggestion, SuggestionRequest},
    ports::{PortError, PortResult, SuggestionService},
};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::config::SuggestionConfig;

const SYSTEM_INSTRUCTIONS: &str = "Você é um assistente educacional especializado em criar planos de reforço para estudantes.";

const USER_INPUT_TEMPLATE: &str = r#"Analise o desempenho do aluno {student} ({grade}) nas seguintes matérias que precisam de melhoria:

{subjects}

Crie um plano de reforço personalizado com sugestões práticas e acionáveis.

Forneça a resposta EXATAMENTE no seguinte formato JSON (sem markdown, sem blocos de código):
{
  "sugestoes": [
    {
      "materia": "Nome da Matéria",
      "diagnostico": "Breve diagnóstico do problema principal (1 frase)",
      "acoes": [
        "Ação prática 1",
        "Ação prática 2",
        "Ação prática 3"
      ],
      "recursos": [
        "Recurso ou ferramenta sugerida 1",
        "Recurso ou ferramenta sugerida 2"
      ],
      "meta": "Meta de melhoria específica e mensurável"
    }
  ],
  "dicasGerais": [
    "Dica geral 1 para melhorar hábitos de estudo",
    "Dica geral 2 para organização e planejamento",
    "Dica geral 3 para motivação"
  ]
}

IMPORTANTE: Retorne apenas o JSON puro, sem formatação markdown."#;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SuggestionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSuggestionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    max_attempts: u32,
}

impl OpenAiSuggestionAdapter {
    /// Creates a new `OpenAiSuggestionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, config: &SuggestionConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Builds the adapter together with its client from the loaded configuration.
    pub fn from_config(config: &SuggestionConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(config.api_key.clone());
        if let Some(base) = &config.api_base {
            openai_config = openai_config.with_api_base(base.clone());
        }
        Self::new(Client::with_config(openai_config), config)
    }

    async fn request_once(&self, prompt: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                PortError::Unexpected(format!(
                    "suggestion generator timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected(
                    "Suggestion LLM response contained no text content.".to_string(),
                )
            })
    }
}

//=========================================================================================
// Prompt and Reply Handling
//=========================================================================================

pub fn build_prompt(request: &SuggestionRequest) -> String {
    let subjects = request
        .subjects
        .iter()
        .map(|s| {
            format!(
                "- {}: Pontuação {}%, Nota Média {}%, Taxa de Conclusão {}%",
                s.subject_name, s.score, s.average_score, s.completion_rate
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    USER_INPUT_TEMPLATE
        .replace("{student}", &request.student_name)
        .replace("{grade}", &request.grade)
        .replace("{subjects}", &subjects)
}

#[derive(Deserialize)]
struct PlanReply {
    #[serde(default)]
    sugestoes: Vec<SuggestionReply>,
    #[serde(default, rename = "dicasGerais")]
    dicas_gerais: Vec<String>,
}

#[derive(Deserialize)]
struct SuggestionReply {
    materia: String,
    #[serde(default)]
    diagnostico: String,
    #[serde(default)]
    acoes: Vec<String>,
    #[serde(default)]
    recursos: Vec<String>,
    #[serde(default)]
    meta: String,
}

/// Parses the model's reply, tolerating markdown code fences around the JSON.
pub fn parse_plan(text: &str) -> PortResult<ReinforcementPlan> {
    let fence = Regex::new(r"```(?:json)?\n?").map_err(|e| PortError::Unexpected(e.to_string()))?;
    let cleaned = fence.replace_all(text, "");
    let reply: PlanReply = serde_json::from_str(cleaned.trim())
        .map_err(|e| PortError::Unexpected(format!("unparseable suggestion reply: {e}")))?;

    Ok(ReinforcementPlan {
        suggestions: reply
            .sugestoes
            .into_iter()
            .map(|s| SubjectSuggestion {
                subject: s.materia,
                diagnosis: s.diagnostico,
                actions: s.acoes,
                resources: s.recursos,
                goal: s.meta,
            })
            .collect(),
        general_tips: reply.dicas_gerais,
    })
}

//=========================================================================================
// `SuggestionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SuggestionService for OpenAiSuggestionAdapter {
    /// Asks the model for a reinforcement plan, retrying transient failures.
    async fn suggest(&self, request: &SuggestionRequest) -> PortResult<ReinforcementPlan> {
        let prompt = build_prompt(request);
        let mut last_error = PortError::Unexpected("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            match self.request_once(&prompt).await.and_then(|text| parse_plan(&text)) {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "Suggestion attempt failed");
                    last_error = e;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_core::domain::SubjectShortfall;

    #[test]
    fn prompt_lists_every_subject() {
        let prompt = build_prompt(&SuggestionRequest {
            student_name: "Ana".to_string(),
            grade: "7º ano".to_string(),
            subjects: vec![SubjectShortfall {
                subject_name: "Química".to_string(),
                score: 45,
                average_score: 50.0,
                completion_rate: 40,
            }],
        });
        assert!(prompt.contains("aluno Ana (7º ano)"));
        assert!(prompt.contains("- Química: Pontuação 45%, Nota Média 50%, Taxa de Conclusão 40%"));
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"sugestoes\":[{\"materia\":\"Química\",\"diagnostico\":\"d\",\"acoes\":[\"a\"],\"recursos\":[\"r\"],\"meta\":\"m\"}],\"dicasGerais\":[\"dormir bem\"]}\n```";
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.suggestions.len(), 1);
        assert_eq!(plan.suggestions[0].subject, "Química");
        assert_eq!(plan.general_tips, vec!["dormir bem".to_string()]);
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(parse_plan("Desculpe, não posso ajudar.").is_err());
    }
}
