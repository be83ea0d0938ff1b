//! Keyword analyzer: the whole value is one term.

use crate::analysis::{Analyzer, Token};

/// Emits the input unchanged as a single token.
///
/// Used for identity fields (object URIs, UIDs) which are matched exactly.
/// Empty input produces no token.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![Token::new(text, 0, 0, text.len())]
    }

    fn normalize(&self, term: &str) -> String {
        term.to_string()
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_token() {
        let tokens = KeywordAnalyzer::new().analyze("file:///data/CT/1.dcm");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "file:///data/CT/1.dcm");
        assert!(KeywordAnalyzer::new().analyze("").is_empty());
    }
}
