use std::sync::Arc;

use serde::Deserialize;

use crate::db::MetaStore;
use crate::error::Result;
use crate::gateway::{ChatTurn, ModelGateway};
use crate::models::{ChatSession, Metadata};
use crate::pipeline::prompts::session_title_prompt;

const MAX_TITLE_CHARS: usize = 20;
const FALLBACK_TITLE_CHARS: usize = 17;
const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Deserialize)]
struct TitleResponse {
    title: String,
}

/// Session lifecycle helpers above the raw store: "smart" creation asks
/// the model to title the session from the first user message, degrading
/// to a truncation of the message, then to a fixed default.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn MetaStore>,
    gateway: ModelGateway,
}

impl SessionService {
    pub fn new(store: Arc<dyn MetaStore>, gateway: ModelGateway) -> Self {
        Self { store, gateway }
    }

    pub async fn create_smart_session(
        &self,
        first_message: &str,
        metadata: Option<Metadata>,
    ) -> Result<ChatSession> {
        let title = self.generate_title(first_message).await;
        self.store.create_session(&title, metadata).await
    }

    async fn generate_title(&self, first_message: &str) -> String {
        let trimmed = first_message.trim();
        if trimmed.is_empty() {
            return DEFAULT_TITLE.to_string();
        }

        let turns = [ChatTurn::user(session_title_prompt(trimmed))];
        match self.gateway.chat_structured::<TitleResponse>(&turns).await {
            Ok(response) => {
                let title: String = response
                    .title
                    .trim()
                    .chars()
                    .take(MAX_TITLE_CHARS)
                    .collect();
                if title.is_empty() {
                    fallback_title(trimmed)
                } else {
                    title
                }
            }
            Err(error) => {
                tracing::debug!(error = %error, "Smart title failed, falling back");
                fallback_title(trimmed)
            }
        }
    }
}

fn fallback_title(first_message: &str) -> String {
    if first_message.chars().count() <= FALLBACK_TITLE_CHARS {
        first_message.to_string()
    } else {
        let prefix: String = first_message.chars().take(FALLBACK_TITLE_CHARS).collect();
        format!("{prefix}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_become_the_title() {
        assert_eq!(fallback_title("hello there"), "hello there");
    }

    #[test]
    fn long_messages_truncate_with_ellipsis() {
        let title = fallback_title("a very long first message that keeps going");
        assert_eq!(title.chars().count(), FALLBACK_TITLE_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn cjk_truncation_respects_char_count() {
        let message = "这是一个非常长的第一条消息内容超过限制";
        let title = fallback_title(message);
        assert_eq!(title.chars().count(), FALLBACK_TITLE_CHARS + 1);
    }
}
