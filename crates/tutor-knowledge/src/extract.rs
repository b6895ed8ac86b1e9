//! Direct (non-vision) PDF text extraction.
//!
//! `pdf` exposes content streams as a flat list of drawing operators rather
//! than a "give me the text" call, so this module walks the operator list
//! itself: it tracks the current text matrix through `Tm`/`Td`/`TD` and
//! records a [`TextRun`] with a normalized bounding box on every `Tj`/`TJ`.
//! Anything the walk can't make sense of (unsupported operators, a missing
//! page resource) degrades to an empty run list rather than failing the
//! page outright — [`classify::usability_score`](crate::classify) then
//! routes that page to the vision fallback, which is the intended recovery
//! path for content this extractor can't handle.

use pdf::content::Op;
use pdf::file::FileOptions;
use pdf::object::Resolve;

use crate::error::{KnowledgeError, Result};
use crate::types::{BoundingBox, TextRun};

pub struct PdfDocument {
    file: pdf::file::File<Vec<u8>>,
}

impl PdfDocument {
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let file = FileOptions::cached()
            .load(bytes)
            .map_err(|e| KnowledgeError::Pdf(e.to_string()))?;
        Ok(Self { file })
    }

    pub fn page_count(&self) -> u32 {
        self.file.num_pages()
    }

    /// Extracts text runs for a 1-indexed page, with each run's bounding
    /// box normalized to `[0, 100]` on both axes using the page's media box.
    pub fn extract_page(&self, page_number: u32) -> Result<Vec<TextRun>> {
        let page = self
            .file
            .get_page(page_number.saturating_sub(1))
            .map_err(|e| KnowledgeError::Pdf(format!("page {page_number}: {e}")))?;

        let media_box = page
            .media_box()
            .unwrap_or(pdf::object::Rect {
                left: 0.0,
                bottom: 0.0,
                right: 612.0,
                top: 792.0,
            });
        let page_width = (media_box.right - media_box.left).max(1.0);
        let page_height = (media_box.top - media_box.bottom).max(1.0);

        let resolver = self.file.resolver();
        let content = match &page.contents {
            Some(content) => content,
            None => return Ok(Vec::new()),
        };
        let ops = content
            .operations(&resolver)
            .map_err(|e| KnowledgeError::Pdf(e.to_string()))?;

        Ok(walk_operators(&ops, page_width, page_height))
    }
}

/// Text-positioning state tracked while walking a content stream's
/// operators: the current text line matrix `(e, f)` translation component,
/// which is all `Tm`/`Td`/`TD` contribute for the purposes of bounding-box
/// placement here (rotation/scale are not modeled).
struct TextState {
    x: f32,
    y: f32,
}

fn walk_operators(ops: &[Op], page_width: f32, page_height: f32) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut state = TextState { x: 0.0, y: 0.0 };

    for op in ops {
        match op {
            Op::TextMove { translation } => {
                state.x += translation.x;
                state.y += translation.y;
            }
            Op::SetTextMatrix { matrix } => {
                state.x = matrix.e;
                state.y = matrix.f;
            }
            Op::TextDraw { text } => {
                push_run(&mut runs, text.to_string_lossy(), &state, page_width, page_height);
            }
            Op::TextDrawAdjusted { array } => {
                let combined: String = array
                    .iter()
                    .filter_map(|item| match item {
                        pdf::content::TextDrawAdjusted::Text(s) => Some(s.to_string_lossy()),
                        pdf::content::TextDrawAdjusted::Spacing(_) => None,
                    })
                    .collect();
                push_run(&mut runs, combined, &state, page_width, page_height);
            }
            _ => {}
        }
    }

    runs
}

fn push_run(runs: &mut Vec<TextRun>, text: String, state: &TextState, page_width: f32, page_height: f32) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    let x0 = (state.x / page_width * 100.0).clamp(0.0, 100.0);
    let y0 = (state.y / page_height * 100.0).clamp(0.0, 100.0);
    runs.push(TextRun {
        text,
        bbox: Some(BoundingBox {
            x0,
            y0,
            x1: (x0 + 1.0).min(100.0),
            y1: (y0 + 1.0).min(100.0),
        }),
    });
}

/// Concatenates a page's text runs into one string for the usability check —
/// the check only cares about gross character statistics, not layout.
pub fn runs_to_plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_concatenates_runs_with_spaces() {
        let runs = vec![
            TextRun { text: "Rule 5".to_string(), bbox: None },
            TextRun { text: "Lookout".to_string(), bbox: None },
        ];
        assert_eq!(runs_to_plain_text(&runs), "Rule 5 Lookout");
    }
}
