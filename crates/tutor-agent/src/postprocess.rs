use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where an answer's `thinking` text came from, for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingSource {
    /// Extracted from literal `<thinking>...</thinking>` tags in the text.
    TextTags,
    /// Extracted from native structured content blocks (`type: thinking`).
    Native,
    /// No thinking content found; answer passed through unchanged.
    None,
}

#[derive(Debug, Clone)]
pub struct PostProcessed {
    pub answer: String,
    pub thinking: Option<String>,
    pub source: ThinkingSource,
}

static THINKING_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<thinking>(.*?)</thinking>").expect("thinking tag regex is valid"));
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex is valid"));

/// A structured content block as produced by a native-thinking-capable model.
#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub block_type: String,
    pub text: String,
}

/// Splits a raw model reply into its visible answer and its internal
/// reasoning, if any. Three cases, in priority order:
///
/// 1. The plain-text reply contains one or more literal `<thinking>` tags —
///    extracted and stripped, regardless of whether native thinking blocks
///    are also present (a model can be asked to fence its reasoning in tags
///    even without the native API feature turned on).
/// 2. No text-tag form, but the reply arrived as structured content blocks —
///    `thinking`-typed blocks are concatenated separately from `text` ones.
/// 3. Neither — the text passes through unchanged.
pub fn postprocess_text(raw: &str) -> PostProcessed {
    if let Some(captures) = THINKING_TAG.captures_iter(raw).next() {
        let thinking = captures.get(1).map(|m| m.as_str().trim().to_string());
        let stripped = THINKING_TAG.replace_all(raw, "");
        let collapsed = EXCESS_NEWLINES.replace_all(&stripped, "\n\n");
        return PostProcessed {
            answer: collapsed.trim().to_string(),
            thinking,
            source: ThinkingSource::TextTags,
        };
    }

    PostProcessed {
        answer: raw.trim().to_string(),
        thinking: None,
        source: ThinkingSource::None,
    }
}

pub fn postprocess_blocks(blocks: &[ContentBlock]) -> PostProcessed {
    let mut answer_parts = Vec::new();
    let mut thinking_parts = Vec::new();

    for block in blocks {
        match block.block_type.as_str() {
            "thinking" => thinking_parts.push(block.text.clone()),
            "text" => answer_parts.push(block.text.clone()),
            _ => {}
        }
    }

    let answer = answer_parts.join("\n\n").trim().to_string();
    let thinking = if thinking_parts.is_empty() {
        None
    } else {
        Some(thinking_parts.join("\n\n").trim().to_string())
    };

    PostProcessed {
        answer,
        thinking,
        source: if thinking_parts.is_empty() {
            ThinkingSource::None
        } else {
            ThinkingSource::Native
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_tag_thinking_and_strips_it() {
        let raw = "<thinking>the give-way vessel must act early</thinking>\n\nYou should alter course to starboard.";
        let result = postprocess_text(raw);
        assert_eq!(result.source, ThinkingSource::TextTags);
        assert_eq!(result.thinking.as_deref(), Some("the give-way vessel must act early"));
        assert_eq!(result.answer, "You should alter course to starboard.");
    }

    #[test]
    fn is_case_insensitive_and_handles_multiline() {
        let raw = "<THINKING>\nmulti\nline\n</THINKING>\nAnswer here.";
        let result = postprocess_text(raw);
        assert_eq!(result.thinking.as_deref(), Some("multi\nline"));
    }

    #[test]
    fn collapses_excess_blank_lines_after_stripping() {
        let raw = "<thinking>reasoning</thinking>\n\n\n\nFirst line.\n\n\n\nSecond line.";
        let result = postprocess_text(raw);
        assert!(!result.answer.contains("\n\n\n"));
    }

    #[test]
    fn plain_text_passes_through_unchanged() {
        let raw = "No reasoning markers here.";
        let result = postprocess_text(raw);
        assert_eq!(result.source, ThinkingSource::None);
        assert_eq!(result.answer, raw);
        assert!(result.thinking.is_none());
    }

    #[test]
    fn structured_blocks_separate_thinking_from_answer() {
        let blocks = vec![
            ContentBlock { block_type: "thinking".to_string(), text: "reasoning step".to_string() },
            ContentBlock { block_type: "text".to_string(), text: "Final answer.".to_string() },
        ];
        let result = postprocess_blocks(&blocks);
        assert_eq!(result.source, ThinkingSource::Native);
        assert_eq!(result.thinking.as_deref(), Some("reasoning step"));
        assert_eq!(result.answer, "Final answer.");
    }

    #[test]
    fn structured_blocks_without_thinking_report_none() {
        let blocks = vec![ContentBlock { block_type: "text".to_string(), text: "Just an answer.".to_string() }];
        let result = postprocess_blocks(&blocks);
        assert_eq!(result.source, ThinkingSource::None);
        assert!(result.thinking.is_none());
    }
}
