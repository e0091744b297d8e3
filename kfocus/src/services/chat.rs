use std::sync::Arc;

use crate::db::MetaStore;
use crate::error::Result;
use crate::gateway::{ChatTurn, ModelGateway};
use crate::models::{Capability, MessageRole};
use crate::pipeline::estimate_tokens;
use crate::retrieval::{Retriever, SearchHit};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const DEFAULT_MAX_CONTEXT: u32 = 8192;
const DEFAULT_MAX_OUTPUT: u32 = 1024;
const HISTORY_FETCH_LIMIT: u32 = 200;

/// Everything needed to run one chat turn: the prompt stack with RAG
/// context and trimmed history folded in, plus the sources for the
/// response metadata.
pub struct PreparedChat {
    pub turns: Vec<ChatTurn>,
    pub sources: Vec<SearchHit>,
}

/// Prompt assembly for the streaming chat endpoint. The handler persists
/// the user message before calling this and the assistant message after
/// the stream finishes.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn MetaStore>,
    gateway: ModelGateway,
    retriever: Arc<Retriever>,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MetaStore>,
        gateway: ModelGateway,
        retriever: Arc<Retriever>,
    ) -> Self {
        Self {
            store,
            gateway,
            retriever,
        }
    }

    pub async fn prepare(&self, session_id: i64, user_message: &str) -> Result<PreparedChat> {
        let (rag_block, sources) = match self.retriever.rag_context(session_id, user_message).await
        {
            Ok(Some((block, hits))) => (Some(block), hits),
            Ok(None) => (None, Vec::new()),
            Err(error) => {
                // Retrieval failures degrade the prompt, never the chat.
                tracing::warn!(session_id, error = %error, "RAG retrieval failed");
                (None, Vec::new())
            }
        };

        let (max_context, max_output) = self.model_budget().await;
        let rag_tokens = rag_block.as_deref().map(estimate_tokens).unwrap_or(0);
        let fixed_tokens =
            estimate_tokens(SYSTEM_PROMPT) + estimate_tokens(user_message) + rag_tokens;
        let history_budget = (max_context as usize)
            .saturating_sub(max_output as usize)
            .saturating_sub(fixed_tokens);

        let history = self.trimmed_history(session_id, history_budget).await?;

        let mut turns = Vec::with_capacity(history.len() + 2);
        turns.push(ChatTurn::system(SYSTEM_PROMPT));
        turns.extend(history);

        let user_content = match rag_block {
            Some(block) => format!("{block}\n\n---\n\n{user_message}"),
            None => user_message.to_string(),
        };
        turns.push(ChatTurn::user(user_content));

        Ok(PreparedChat { turns, sources })
    }

    async fn model_budget(&self) -> (u32, u32) {
        match self.gateway.resolve(Capability::Text).await {
            Ok(resolved) => (
                resolved.max_context_length.unwrap_or(DEFAULT_MAX_CONTEXT),
                resolved.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT),
            ),
            Err(_) => (DEFAULT_MAX_CONTEXT, DEFAULT_MAX_OUTPUT),
        }
    }

    /// Most recent prior messages that fit the remaining token budget,
    /// returned oldest-first.
    async fn trimmed_history(&self, session_id: i64, budget: usize) -> Result<Vec<ChatTurn>> {
        if budget == 0 {
            return Ok(Vec::new());
        }

        let messages = self
            .store
            .get_messages(session_id, HISTORY_FETCH_LIMIT, 0)
            .await?;

        let mut picked: Vec<ChatTurn> = Vec::new();
        let mut used = 0usize;
        for message in messages.iter().rev() {
            if message.role == MessageRole::System {
                continue;
            }
            let cost = estimate_tokens(&message.content);
            if used + cost > budget {
                break;
            }
            used += cost;
            picked.push(ChatTurn {
                role: message.role,
                content: message.content.clone(),
            });
        }

        picked.reverse();
        Ok(picked)
    }
}
