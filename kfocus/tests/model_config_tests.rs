mod common;

use kfocus::models::Capability;

#[tokio::test]
async fn unassigned_capability_resolves_to_none() {
    let store = common::memory_store().await;
    let resolved = store.resolve_capability(Capability::Embedding).await.unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn assignment_chain_resolves_to_a_callable_model() {
    let store = common::memory_store().await;

    let provider = store
        .add_provider("ollama", "Local Ollama", None, None)
        .await
        .unwrap();
    let configuration = store
        .upsert_configuration(provider.id, "nomic-embed-text", "Nomic Embed", Some(8192), None)
        .await
        .unwrap();
    store
        .assign_capability(Capability::Embedding, configuration.id)
        .await
        .unwrap();

    let resolved = store
        .resolve_capability(Capability::Embedding)
        .await
        .unwrap()
        .expect("assignment should resolve");
    assert_eq!(resolved.model_identifier, "nomic-embed-text");
    // No explicit base URL: the provider kind's default applies.
    assert_eq!(resolved.base_url, "http://localhost:11434/v1");
    assert_eq!(resolved.max_context_length, Some(8192));
}

#[tokio::test]
async fn inactive_provider_breaks_resolution() {
    let store = common::memory_store().await;

    let provider = store
        .add_provider("openai", "OpenAI", None, Some("sk-test"))
        .await
        .unwrap();
    let configuration = store
        .upsert_configuration(provider.id, "gpt-4o-mini", "GPT-4o mini", None, None)
        .await
        .unwrap();
    store
        .assign_capability(Capability::Text, configuration.id)
        .await
        .unwrap();

    assert!(store
        .resolve_capability(Capability::Text)
        .await
        .unwrap()
        .is_some());

    store
        .update_provider(provider.id, None, None, None, None, Some(false))
        .await
        .unwrap();
    assert!(store
        .resolve_capability(Capability::Text)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reassignment_replaces_the_previous_configuration() {
    let store = common::memory_store().await;

    let provider = store
        .add_provider("groq", "Groq", None, Some("key"))
        .await
        .unwrap();
    let first = store
        .upsert_configuration(provider.id, "llama-3.1-8b", "Llama 8B", None, None)
        .await
        .unwrap();
    let second = store
        .upsert_configuration(provider.id, "llama-3.3-70b", "Llama 70B", None, None)
        .await
        .unwrap();

    store
        .assign_capability(Capability::Text, first.id)
        .await
        .unwrap();
    store
        .assign_capability(Capability::Text, second.id)
        .await
        .unwrap();

    let resolved = store
        .resolve_capability(Capability::Text)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.model_identifier, "llama-3.3-70b");
}

#[tokio::test]
async fn clearing_an_assignment_makes_the_capability_missing() {
    let store = common::memory_store().await;

    let provider = store
        .add_provider("lmstudio", "LM Studio", None, None)
        .await
        .unwrap();
    let configuration = store
        .upsert_configuration(provider.id, "qwen2.5-7b", "Qwen 7B", None, None)
        .await
        .unwrap();
    store
        .assign_capability(Capability::Vision, configuration.id)
        .await
        .unwrap();

    assert!(store
        .clear_capability_assignment(Capability::Vision)
        .await
        .unwrap());
    assert!(store
        .resolve_capability(Capability::Vision)
        .await
        .unwrap()
        .is_none());
    // Clearing twice reports nothing to clear.
    assert!(!store
        .clear_capability_assignment(Capability::Vision)
        .await
        .unwrap());
}

#[tokio::test]
async fn add_capability_is_idempotent() {
    let store = common::memory_store().await;

    let provider = store.add_provider("grok", "Grok", None, Some("k")).await.unwrap();
    let configuration = store
        .upsert_configuration(provider.id, "grok-3", "Grok 3", None, None)
        .await
        .unwrap();

    store
        .add_capability(configuration.id, Capability::ToolUse)
        .await
        .unwrap();
    store
        .add_capability(configuration.id, Capability::ToolUse)
        .await
        .unwrap();

    let reloaded = store
        .get_configuration(configuration.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        reloaded
            .capabilities
            .iter()
            .filter(|c| **c == Capability::ToolUse)
            .count(),
        1
    );
}

#[tokio::test]
async fn discovery_upsert_refreshes_instead_of_duplicating() {
    let store = common::memory_store().await;

    let provider = store
        .add_provider("openrouter", "OpenRouter", None, Some("key"))
        .await
        .unwrap();
    let first = store
        .upsert_configuration(provider.id, "meta/llama-3-70b", "Llama 3 70B", Some(8192), None)
        .await
        .unwrap();
    let second = store
        .upsert_configuration(
            provider.id,
            "meta/llama-3-70b",
            "Llama 3 70B (updated)",
            Some(8192),
            Some(4096),
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.display_name, "Llama 3 70B (updated)");
    assert_eq!(second.max_output_tokens, Some(4096));
    assert_eq!(store.list_configurations(provider.id).await.unwrap().len(), 1);
}
