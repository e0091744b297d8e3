//! Token-budgeted hybrid splitter.
//!
//! The token measure here is a neutral estimator, deliberately decoupled
//! from whatever model serves the EMBEDDING capability: embeddings come
//! from an API, and re-chunking the corpus because the provider changed
//! tokenizers would churn every vector for no retrieval gain. The estimate
//! (1 token per CJK character, ~4 ASCII characters per token otherwise)
//! tracks real tokenizers closely enough for budget enforcement.

use unicode_segmentation::UnicodeSegmentation;

/// Rough token count for budget decisions; see module docs.
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    cjk + other.div_ceil(4)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}'
    )
}

pub struct HybridSplitter {
    max_tokens: usize,
}

impl HybridSplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    /// Split text into pieces of at most `max_tokens` by the estimator's
    /// measure: paragraphs first, sentences when a paragraph overflows,
    /// grapheme windows for a single runaway sentence. Adjacent small
    /// pieces are merged back up to the budget.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if estimate_tokens(text) <= self.max_tokens {
            return vec![text.to_string()];
        }

        let mut pieces: Vec<String> = Vec::new();
        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if estimate_tokens(paragraph) <= self.max_tokens {
                pieces.push(paragraph.to_string());
            } else {
                for sentence in split_sentences(paragraph) {
                    if estimate_tokens(&sentence) <= self.max_tokens {
                        pieces.push(sentence);
                    } else {
                        pieces.extend(self.hard_split(&sentence));
                    }
                }
            }
        }

        self.merge(pieces)
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            let candidate_tokens = if current.is_empty() {
                estimate_tokens(&piece)
            } else {
                estimate_tokens(&current) + 1 + estimate_tokens(&piece)
            };

            if candidate_tokens > self.max_tokens && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&piece);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    fn hard_split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for grapheme in text.graphemes(true) {
            current.push_str(grapheme);
            if estimate_tokens(&current) >= self.max_tokens {
                out.push(std::mem::take(&mut current));
            }
        }
        if !current.trim().is_empty() {
            out.push(current);
        }
        out
    }
}

const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "vs.", "etc.", "i.e.", "e.g.", "Inc.",
    "Ltd.", "Corp.", "Co.", "No.", "Vol.", "Ch.", "Fig.", "Eq.", "Sec.",
];

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for grapheme in text.graphemes(true) {
        current.push_str(grapheme);
        if is_sentence_boundary(&current) {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

fn is_sentence_boundary(text: &str) -> bool {
    let trimmed = text.trim_end();
    let Some(last_char) = trimmed.chars().last() else {
        return false;
    };

    if matches!(last_char, '。' | '！' | '？' | '\n') {
        return true;
    }
    if !matches!(last_char, '.' | '!' | '?') {
        return false;
    }

    if let Some(last_word) = trimmed.split_whitespace().last() {
        if ABBREVIATIONS.contains(&last_word) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_stays_whole() {
        let splitter = HybridSplitter::new(512);
        let chunks = splitter.split("One short paragraph.");
        assert_eq!(chunks, vec!["One short paragraph.".to_string()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        let splitter = HybridSplitter::new(512);
        assert!(splitter.split("   ").is_empty());
    }

    #[test]
    fn oversized_text_splits_within_budget() {
        let splitter = HybridSplitter::new(32);
        let sentence = "This sentence is roughly a dozen tokens by the estimator. ";
        let text = sentence.repeat(20);
        let chunks = splitter.split(&text);

        assert!(chunks.len() >= 2, "expected multiple chunks");
        for chunk in &chunks {
            assert!(
                estimate_tokens(chunk) <= 32,
                "chunk over budget: {} tokens",
                estimate_tokens(chunk)
            );
        }
    }

    #[test]
    fn cjk_counts_one_token_per_char() {
        assert_eq!(estimate_tokens("中文"), 2);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn abbreviations_do_not_break_sentences() {
        let sentences = split_sentences("Dr. Smith arrived. He sat down.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "Dr. Smith arrived.");
    }

    #[test]
    fn cjk_punctuation_breaks_sentences() {
        let sentences = split_sentences("第一句。第二句！第三句？");
        assert_eq!(sentences.len(), 3);
    }

    #[test]
    fn runaway_sentence_is_hard_split() {
        let splitter = HybridSplitter::new(8);
        let text = "a".repeat(400);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(estimate_tokens(chunk) <= 9);
        }
    }
}
