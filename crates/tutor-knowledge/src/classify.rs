/// Weights for the three usability factors, read from `IngestionConfig`.
#[derive(Debug, Clone, Copy)]
pub struct UsabilityWeights {
    pub char_count: f64,
    pub printable_ratio: f64,
    pub structured_run: f64,
}

impl Default for UsabilityWeights {
    fn default() -> Self {
        Self {
            char_count: 0.4,
            printable_ratio: 0.4,
            structured_run: 0.2,
        }
    }
}

/// A page is worth enough to run structured-run detection past roughly one
/// paragraph of extracted text; below this, char-count alone already
/// signals "too little to be useful".
const CHAR_COUNT_SATURATION: usize = 500;

/// Scores how usable a page's directly-extracted text is, combining three
/// signals into one value in `[0, 1]`:
///
/// - `char_count` factor: extracted character count, saturating at
///   [`CHAR_COUNT_SATURATION`] (more text past that point doesn't raise
///   confidence further).
/// - `printable_ratio` factor: fraction of extracted characters that are
///   printable/alphanumeric/whitespace, penalizing the control-character
///   soup that direct extraction produces on scanned or malformed pages.
/// - `structured_run` factor: `1.0` if the text contains at least one run
///   of [`MIN_STRUCTURED_RUN_LEN`] consecutive alphabetic characters
///   (evidence of real prose rather than OCR noise), else `0.0`.
///
/// The page is routed to direct extraction when the weighted sum clears
/// `threshold` (`IngestionConfig::text_usability_threshold`, default
/// `0.6`), otherwise to the vision path.
pub fn usability_score(extracted_text: &str, weights: UsabilityWeights) -> f64 {
    let char_count_factor = (extracted_text.chars().count() as f64 / CHAR_COUNT_SATURATION as f64).min(1.0);

    let total = extracted_text.chars().count();
    let printable_ratio_factor = if total == 0 {
        0.0
    } else {
        let printable = extracted_text
            .chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .count();
        printable as f64 / total as f64
    };

    let structured_run_factor = if has_structured_run(extracted_text) { 1.0 } else { 0.0 };

    weights.char_count * char_count_factor
        + weights.printable_ratio * printable_ratio_factor
        + weights.structured_run * structured_run_factor
}

const MIN_STRUCTURED_RUN_LEN: usize = 20;

fn has_structured_run(text: &str) -> bool {
    let mut run = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() || c == ' ' {
            run += 1;
            if run >= MIN_STRUCTURED_RUN_LEN {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// `true` when `usability_score(...) >= threshold` — the page is routed to
/// direct extraction rather than the vision fallback.
pub fn is_directly_usable(extracted_text: &str, weights: UsabilityWeights, threshold: f64) -> bool {
    usability_score(extracted_text, weights) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_prose_scores_above_default_threshold() {
        let text = "The master of every vessel shall maintain a proper lookout by sight and hearing \
                     as well as by all available means appropriate in the prevailing circumstances \
                     and conditions so as to make a full appraisal of the situation and of the risk of collision."
            .repeat(2);
        let score = usability_score(&text, UsabilityWeights::default());
        assert!(score >= 0.6, "expected usable score, got {score}");
    }

    #[test]
    fn sparse_control_character_noise_scores_below_threshold() {
        let text = "\u{0}\u{1}\u{2}\u{3}ab\u{4}\u{5}";
        let score = usability_score(text, UsabilityWeights::default());
        assert!(score < 0.6, "expected unusable score, got {score}");
    }

    #[test]
    fn empty_page_is_never_directly_usable() {
        assert!(!is_directly_usable("", UsabilityWeights::default(), 0.6));
    }
}
