use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
    ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObjectArgs, ResponseFormat,
};
use serde_json::json;

use crate::error::Result;
use crate::models::{Capability, CapabilityProbeReport, ResolvedModel};

use super::{ChatClient, ChatTurn};

/// 1x1 transparent PNG, the smallest payload a vision endpoint accepts.
const PROBE_IMAGE_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

const PROBE_SENTINEL: &str = "capability probe sentinel";

/// Minimal per-capability probes against one configuration. Each probe
/// answers a boolean; nothing is written — the caller decides whether to
/// record confirmed capabilities via `add_capability`.
pub async fn run_capability_probes(
    resolved: &ResolvedModel,
    capabilities: &[Capability],
    timeout_secs: u64,
) -> Result<CapabilityProbeReport> {
    let client = ChatClient::new(resolved, timeout_secs, 0)?;
    let mut report = CapabilityProbeReport::default();

    for capability in capabilities {
        match capability {
            Capability::Text => {
                report.text = Some(probe_text(&client).await);
            }
            Capability::Vision => {
                report.vision = Some(probe_vision(&client).await);
            }
            Capability::ToolUse => {
                report.tool_use = Some(probe_tool_use(&client).await);
            }
            Capability::Embedding => {
                report.embedding = Some(probe_embedding(&client).await);
            }
            Capability::StructuredOutput => {
                report.structured_output = Some(probe_structured_output(&client).await);
            }
        }
    }

    Ok(report)
}

async fn probe_text(client: &ChatClient) -> bool {
    client
        .complete(&[ChatTurn::user("Reply with the single word: ready")])
        .await
        .is_ok()
}

async fn probe_vision(client: &ChatClient) -> bool {
    client
        .describe_image(PROBE_IMAGE_BASE64, "Describe this image in one short sentence.")
        .await
        .is_ok()
}

/// Weather-schema tool call with `tool_choice=required`; passes only when
/// the model actually emits a tool call.
async fn probe_tool_use(client: &ChatClient) -> bool {
    let function = match FunctionObjectArgs::default()
        .name("get_weather")
        .description("Get the current weather for a city")
        .parameters(json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "description": "City name" }
            },
            "required": ["city"]
        }))
        .build()
    {
        Ok(function) => function,
        Err(_) => return false,
    };

    let tool = match ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(function)
        .build()
    {
        Ok(tool) => tool,
        Err(_) => return false,
    };

    let message = match ChatCompletionRequestUserMessageArgs::default()
        .content("What is the weather in Paris right now?")
        .build()
    {
        Ok(message) => message,
        Err(_) => return false,
    };

    let request = match CreateChatCompletionRequestArgs::default()
        .model(client.model().to_string())
        .messages(vec![message.into()])
        .tools(vec![tool])
        .tool_choice(ChatCompletionToolChoiceOption::Required)
        .build()
    {
        Ok(request) => request,
        Err(_) => return false,
    };

    match client.inner().chat().create(request).await {
        Ok(response) => response
            .choices
            .first()
            .and_then(|choice| choice.message.tool_calls.as_ref())
            .map(|calls| !calls.is_empty())
            .unwrap_or(false),
        Err(_) => false,
    }
}

async fn probe_embedding(client: &ChatClient) -> bool {
    match client.embed(&[PROBE_SENTINEL.to_string()]).await {
        Ok(vectors) => vectors.first().map(|v| !v.is_empty()).unwrap_or(false),
        Err(_) => false,
    }
}

async fn probe_structured_output(client: &ChatClient) -> bool {
    let message = match ChatCompletionRequestUserMessageArgs::default()
        .content("Return a JSON object with a single key \"ok\" set to true.")
        .build()
    {
        Ok(message) => message,
        Err(_) => return false,
    };

    let request = match CreateChatCompletionRequestArgs::default()
        .model(client.model().to_string())
        .messages(vec![message.into()])
        .response_format(ResponseFormat::JsonObject)
        .build()
    {
        Ok(request) => request,
        Err(_) => return false,
    };

    match client.inner().chat().create(request).await {
        Ok(response) => response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(|content| serde_json::from_str::<serde_json::Value>(content.trim()).is_ok())
            .unwrap_or(false),
        Err(_) => false,
    }
}
