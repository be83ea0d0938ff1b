//! Field-dependent analyzer selection.

use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::{Analyzer, KeywordAnalyzer, StandardAnalyzer, Token};

/// Routes each field to its own analyzer, falling back to a default one.
#[derive(Debug, Clone)]
pub struct PerFieldAnalyzer {
    default_analyzer: Arc<dyn Analyzer>,
    field_analyzers: AHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default_analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            default_analyzer,
            field_analyzers: AHashMap::new(),
        }
    }

    /// Standard analysis everywhere except for the given exact-match fields.
    pub fn with_keyword_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut analyzer = Self::new(Arc::new(StandardAnalyzer::new()));
        let keyword: Arc<dyn Analyzer> = Arc::new(KeywordAnalyzer::new());
        for field in fields {
            analyzer.add_analyzer(field, Arc::clone(&keyword));
        }
        analyzer
    }

    pub fn add_analyzer<S: Into<String>>(&mut self, field: S, analyzer: Arc<dyn Analyzer>) {
        self.field_analyzers.insert(field.into(), analyzer);
    }

    /// The analyzer used for a field.
    pub fn analyzer_for(&self, field: &str) -> &dyn Analyzer {
        self.field_analyzers
            .get(field)
            .map(|a| a.as_ref())
            .unwrap_or(self.default_analyzer.as_ref())
    }

    pub fn analyze_field(&self, field: &str, text: &str) -> Vec<Token> {
        self.analyzer_for(field).analyze(text)
    }

    pub fn normalize_field(&self, field: &str, term: &str) -> String {
        self.analyzer_for(field).normalize(term)
    }
}

impl Default for PerFieldAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(StandardAnalyzer::new()))
    }
}
