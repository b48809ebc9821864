use crate::error::ProviderError;
use crate::models::{GenerationRequest, GenerationSettings, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Hosted language model answering one request.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError>;
}

#[async_trait]
impl<T: GenerationProvider + ?Sized> GenerationProvider for Box<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, ProviderError> {
        (**self).generate(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's question. \
If the answer is not in the context, say that you don't know instead of making one up.";

/// Chat-style message list: instructions plus retrieved context, prior turns, then the question.
pub fn build_messages(request: &GenerationRequest<'_>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() * 2 + 2);

    if !request.context.is_empty() {
        let context = request.context.join("\n\n");
        messages.push(ChatMessage::new(
            Role::System,
            format!("{ANSWER_INSTRUCTIONS}\n----------------\n{context}"),
        ));
    }

    for turn in request.history {
        messages.push(ChatMessage::new(Role::User, turn.question.as_str()));
        messages.push(ChatMessage::new(Role::Assistant, turn.answer.as_str()));
    }

    messages.push(ChatMessage::new(Role::User, request.question));
    messages
}

/// Prompt asking the model to rewrite a follow-up into a question that stands on its own.
pub fn condense_question_prompt(history: &[Turn], question: &str) -> String {
    let transcript = history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
question to be a standalone question, in its original language. Reply with the question only.\n\n\
Chat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    )
}

/// Request without retrieved context, used for condensation and credential checks.
pub fn bare_request<'a>(question: &'a str, settings: &'a GenerationSettings) -> GenerationRequest<'a> {
    GenerationRequest {
        context: Vec::new(),
        history: &[],
        question,
        settings,
    }
}
