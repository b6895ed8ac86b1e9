use crate::types::{BoundingBox, ContentType, TextRun};

/// `content_type`/`confidence` thresholds and size bounds for the semantic
/// chunker, read from `IngestionConfig`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            min_chars: 120,
        }
    }
}

/// One chunk candidate before it's assigned a `node_id`/`document_id`/
/// `chunk_index` and embedded.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub content: String,
    pub content_type: ContentType,
    pub confidence: f32,
    pub bounding_boxes: Vec<BoundingBox>,
}

/// Groups a page's text runs into chunks bounded by `[min_chars, max_chars]`,
/// breaking early at a heading/table/formula/diagram-reference cue so each
/// chunk stays topically coherent rather than splitting mid-structure.
/// A run below `min_chars` on its own is merged into the next chunk instead
/// of being emitted as a fragment.
pub fn chunk_page(runs: &[TextRun], config: ChunkerConfig, source_confidence: f32) -> Vec<ChunkDraft> {
    let mut drafts = Vec::new();
    let mut current = String::new();
    let mut current_bboxes = Vec::new();
    let mut current_type = ContentType::Text;

    for run in runs {
        let cue = classify_run(&run.text);

        let would_overflow = current.chars().count() + run.text.chars().count() > config.max_chars;
        let breaks_structure = cue.is_some() && current.chars().count() >= config.min_chars;

        if (would_overflow || breaks_structure) && !current.is_empty() {
            drafts.push(finish_chunk(&mut current, &mut current_bboxes, current_type, source_confidence));
            current_type = ContentType::Text;
        }

        if let Some(detected) = cue {
            current_type = detected;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(run.text.trim());
        if let Some(bbox) = run.bbox {
            current_bboxes.push(bbox);
        }
    }

    if !current.is_empty() {
        drafts.push(finish_chunk(&mut current, &mut current_bboxes, current_type, source_confidence));
    }

    merge_undersized(drafts, config.min_chars)
}

fn finish_chunk(content: &mut String, bboxes: &mut Vec<BoundingBox>, content_type: ContentType, source_confidence: f32) -> ChunkDraft {
    let draft = ChunkDraft {
        content: std::mem::take(content),
        content_type,
        confidence: source_confidence,
        bounding_boxes: std::mem::take(bboxes),
    };
    draft
}

/// Detects a structural cue at the start of a run: short all-caps or
/// numbered lines read as headings, a run dense with tab/pipe separators
/// reads as a table row, runs opening with a figure/diagram reference
/// phrase read as a diagram reference. Plain prose yields `None` — the
/// caller keeps accumulating into the current chunk's existing type.
fn classify_run(text: &str) -> Option<ContentType> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_heading_like(trimmed) {
        return Some(ContentType::Heading);
    }
    if looks_like_table_row(trimmed) {
        return Some(ContentType::Table);
    }
    if looks_like_formula(trimmed) {
        return Some(ContentType::Formula);
    }
    if looks_like_diagram_reference(trimmed) {
        return Some(ContentType::DiagramReference);
    }
    None
}

fn is_heading_like(text: &str) -> bool {
    let word_count = text.split_whitespace().count();
    if word_count == 0 || word_count > 12 {
        return false;
    }
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let upper_ratio = letters.iter().filter(|c| c.is_uppercase()).count() as f64 / letters.len() as f64;
    let starts_with_rule_marker = text.starts_with("Rule ") || text.starts_with("Chapter ") || text.starts_with("Regulation ");
    upper_ratio > 0.8 || starts_with_rule_marker
}

fn looks_like_table_row(text: &str) -> bool {
    text.matches('\t').count() >= 2 || text.matches('|').count() >= 2
}

fn looks_like_formula(text: &str) -> bool {
    let symbol_count = text.chars().filter(|c| "=+-*/^∑∫√≈≤≥".contains(*c)).count();
    symbol_count >= 2 && text.split_whitespace().count() <= 15
}

fn looks_like_diagram_reference(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.starts_with("figure ") || lower.starts_with("fig. ") || lower.starts_with("diagram ") || lower.starts_with("see chart ")
}

/// Folds any chunk below `min_chars` into its successor so a trailing
/// scrap of text never becomes a standalone low-signal chunk; a final
/// undersized chunk is folded into the previous one instead.
fn merge_undersized(drafts: Vec<ChunkDraft>, min_chars: usize) -> Vec<ChunkDraft> {
    if drafts.len() <= 1 {
        return drafts;
    }

    let mut merged: Vec<ChunkDraft> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        if draft.content.chars().count() < min_chars && !merged.is_empty() {
            let prev = merged.last_mut().unwrap();
            prev.content.push(' ');
            prev.content.push_str(&draft.content);
            prev.bounding_boxes.extend(draft.bounding_boxes);
        } else {
            merged.push(draft);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> TextRun {
        TextRun {
            text: text.to_string(),
            bbox: None,
        }
    }

    #[test]
    fn splits_on_heading_cue_once_minimum_size_is_met() {
        let long_para = "a".repeat(150);
        let runs = vec![run(&long_para), run("RULE 5"), run("Every vessel shall at all times maintain a proper lookout.")];
        let drafts = chunk_page(&runs, ChunkerConfig::default(), 1.0);
        assert!(drafts.len() >= 2);
        assert_eq!(drafts[1].content_type, ContentType::Heading);
    }

    #[test]
    fn respects_max_chars_boundary() {
        let runs: Vec<TextRun> = (0..20).map(|_| run(&"word ".repeat(20))).collect();
        let drafts = chunk_page(&runs, ChunkerConfig { max_chars: 200, min_chars: 20 }, 1.0);
        assert!(drafts.iter().all(|d| d.content.chars().count() <= 260));
    }

    #[test]
    fn undersized_trailing_chunk_is_merged_into_previous() {
        let runs = vec![run(&"word ".repeat(40)), run("ok")];
        let drafts = chunk_page(&runs, ChunkerConfig { max_chars: 1000, min_chars: 120 }, 1.0);
        assert_eq!(drafts.len(), 1);
    }

    #[test]
    fn table_like_run_is_tagged_table() {
        let runs = vec![run(&"intro text ".repeat(20)), run("col1\tcol2\tcol3")];
        let drafts = chunk_page(&runs, ChunkerConfig { max_chars: 1000, min_chars: 20 }, 1.0);
        assert!(drafts.iter().any(|d| d.content_type == ContentType::Table));
    }
}
