//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Adapter wrapping a concrete rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // rig models take one prompt message plus a preamble and chat
        // history; fold our message list into that shape.
        let preamble: String = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let non_system: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let (prompt, history) = match non_system.split_last() {
            Some((last, rest)) => (last.content.clone(), rest),
            None => (String::new(), &[] as &[&ChatMessage]),
        };

        let history: Vec<Message> = history
            .iter()
            .map(|m| match m.role {
                Role::Assistant => Message::assistant(&m.content),
                _ => Message::user(&m.content),
            })
            .collect();

        let mut builder = self
            .model
            .completion_request(Message::user(prompt))
            .messages(history);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "empty completion".into(),
            });
        }

        Ok(CompletionResponse { content })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
