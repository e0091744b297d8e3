//! Prompt templates for the tagging and chunking pipelines.
//!
//! Templates use `format!()` interpolation so missing variables fail at
//! compile time.

use crate::models::ChunkType;

/// System prompt for tag generation.
pub const TAGGING_SYSTEM_PROMPT: &str = "You are a world-class librarian. Your task is to \
analyze the provided text and generate a list of relevant tags. Adhere strictly to the format \
required. Respond with a JSON object of the form {\"tags\": [\"...\"]}.";

/// User prompt for tag generation: 0-3 tags, Chinese-first when the
/// summary contains Chinese, `_` word joiner for English, candidate reuse.
pub fn tagging_prompt(summary: &str, candidates: &[String]) -> String {
    let candidate_str = if candidates.is_empty() {
        "None".to_string()
    } else {
        candidates
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"Please analyze the following file summary and context to generate between 0 and 3 relevant tags.

**Rules:**
1.  **Language:** If any Chinese characters appear in the summary, generate Chinese tags as top priority. Use English only for globally recognized acronyms (e.g., `AI`, `API`, `RAG`).
2.  **Format:** English tags must not contain spaces. Use `_` to connect words (e.g., `project_management`), but keep hyphens `-` in compound words (e.g., `man-in-loop`).
3.  **Quality:** Tags must be meaningful and concise. Avoid generic or redundant tags.
4.  **Reuse First:** If any of the "Existing Candidate Tags" are highly relevant, reuse them.

**Existing Candidate Tags:**
[{candidate_str}]

**File Content Summary:**
---
{summary}
---

Based on all information, provide the best tags for this file as {{"tags": [...]}}."#
    )
}

/// Prompt for generating a chat session title from the first user message.
pub fn session_title_prompt(first_message: &str) -> String {
    format!(
        r#"Please create a concise and meaningful title for a chat session based on the user's first message.

**Requirements:**
1. **Length:** Maximum 20 characters (including Chinese characters, English letters, numbers, and symbols)
2. **Language:** Use the same language as the user's message
3. **Content:** Capture the main topic or intent of the user's question/request
4. **Special Cases:** For simple greetings like "hello", use a generic title like "New Chat"

**User's First Message:**
---
{first_message}
---

Respond with a JSON object of the form {{"title": "..."}}."#
    )
}

/// Role-specific system prompt for retrieval summaries. These summaries
/// are embedded and used to retrieve the raw parent elements, so they are
/// tuned for retrieval, not for reading.
pub fn summary_system_prompt(chunk_type: ChunkType) -> &'static str {
    match chunk_type {
        ChunkType::Table => {
            "You are an assistant tasked with summarizing tables for retrieval. \
These summaries will be embedded and used to retrieve the raw table elements. \
Give a concise summary of the table that is well optimized for retrieval.\n\n\
IMPORTANT: Output ONLY the summary content, without any prefixes like \
\"Here's a summary:\", \"Summary:\", or formatting markers."
        }
        ChunkType::Image | ChunkType::ImageContext => {
            "You are an assistant tasked with summarizing image content for retrieval. \
These summaries will be embedded and used to retrieve the raw image elements. \
Give a concise summary of the image content that is well optimized for retrieval.\n\n\
IMPORTANT: Output ONLY the summary content, without any prefixes like \
\"Here's a summary:\", \"Summary:\", or formatting markers."
        }
        ChunkType::Text => {
            "You are an assistant tasked with summarizing text for retrieval. \
These summaries will be embedded and used to retrieve the raw text elements. \
Give a concise summary of the text that is well optimized for retrieval.\n\n\
IMPORTANT: Output ONLY the summary content, without any prefixes like \
\"Here's a summary:\", \"Summary:\", or formatting markers."
        }
    }
}

/// Caption prompt handed to the VISION model by the parser's picture hook.
pub const IMAGE_CAPTION_PROMPT: &str = "Describe this image concisely for retrieval purposes. \
Focus on the concrete content: what is shown, any visible text, chart axes and trends, and \
notable entities. Output only the description.";

/// System prompt for condensing the text surrounding an image into a
/// background block for an image-context pair.
pub const CONTEXT_SUMMARY_PROMPT: &str = "You are an assistant that condenses document text \
into a short background summary. Summarize the key points of the provided passages in a few \
sentences. Output only the summary.";

/// Preamble phrases models keep emitting despite instructions; stripped
/// from the head of generated summaries.
const SUMMARY_PREFIXES: &[&str] = &[
    "Here's a retrieval-optimized summary:",
    "Here's a retrieval-optimized summary of the text:",
    "Here's a retrieval-optimized summary of the image:",
    "Here's a retrieval-optimized summary of the table:",
    "Here's a concise summary:",
    "**Summary:**",
    "Summary:",
    "**Image Summary:**",
    "Image Summary:",
    "**Table Summary:**",
    "Table Summary:",
];

/// Strip a known preamble prefix plus leading separator punctuation.
pub fn clean_summary_prefixes(summary: &str) -> String {
    let mut cleaned = summary.trim();

    for prefix in SUMMARY_PREFIXES {
        let matches = cleaned
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            cleaned = cleaned[prefix.len()..].trim_start();
            break;
        }
    }

    let cleaned = cleaned.trim_start_matches([':', '-', '*', ' ']).trim();
    if cleaned.is_empty() {
        summary.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagging_prompt_includes_candidates_and_summary() {
        let prompt = tagging_prompt(
            "Quarterly sales figures",
            &["finance".to_string(), "sales".to_string()],
        );
        assert!(prompt.contains("\"finance\", \"sales\""));
        assert!(prompt.contains("Quarterly sales figures"));
    }

    #[test]
    fn tagging_prompt_without_candidates_says_none() {
        let prompt = tagging_prompt("hello", &[]);
        assert!(prompt.contains("[None]"));
    }

    #[test]
    fn summary_prefixes_are_stripped() {
        assert_eq!(
            clean_summary_prefixes("Summary: sales rose 10% in Q3"),
            "sales rose 10% in Q3"
        );
        assert_eq!(
            clean_summary_prefixes("**Table Summary:** revenue by region"),
            "revenue by region"
        );
    }

    #[test]
    fn clean_keeps_untouched_summaries() {
        assert_eq!(
            clean_summary_prefixes("Revenue by region, 2024"),
            "Revenue by region, 2024"
        );
    }

    #[test]
    fn clean_never_returns_empty_for_nonempty_input() {
        assert_eq!(clean_summary_prefixes("Summary:"), "Summary:");
    }
}
