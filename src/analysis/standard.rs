//! Standard analyzer: Unicode word boundaries, NFC and lowercase.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::{Analyzer, Token};

/// Splits text on Unicode word boundaries (UAX #29), keeps the segments that
/// contain at least one alphanumeric character and lowercases them.
///
/// Punctuation such as the `^` separating DICOM person name components is
/// dropped, so `SALVADOR^DALI` yields `salvador` and `dali`.
#[derive(Debug, Clone, Default)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        let normalized: String = text.nfc().collect();
        let mut tokens = Vec::new();
        let mut position = 0;

        for (offset, word) in normalized.split_word_bound_indices() {
            if !word.chars().any(char::is_alphanumeric) {
                continue;
            }
            tokens.push(Token::new(
                word.to_lowercase(),
                position,
                offset,
                offset + word.len(),
            ));
            position += 1;
        }

        tokens
    }

    fn normalize(&self, term: &str) -> String {
        term.nfc().collect::<String>().to_lowercase()
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}
