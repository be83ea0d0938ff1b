//! Query string parser.
//!
//! Turns query text into a tree of [`Query`] objects:
//!
//! - `field:value`, bare `value` on the default field
//! - `AND`/`&&`, `OR`/`||`, `NOT`/`!`/`-`, `+`, implicit OR between clauses
//! - `( ... )` groups and `field:( ... )` field-scoped groups
//! - `"quoted phrases"`, `wild*ca?ds`, `/regular expressions/`
//! - `[low TO high]` inclusive and `{low TO high}` exclusive ranges, `*` for an
//!   open end
//! - `*:*` for all documents, backslash escapes for special characters
//!
//! Terms are analyzed with the field's analyzer, so `PatientName:Salvador`
//! becomes a term query for `salvador`. Construction of range queries is
//! delegated to a [`RangeQueryBuilder`], which lets callers give some fields a
//! different range type without touching the grammar.

use std::sync::Arc;

use log::debug;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::analysis::PerFieldAnalyzer;
use crate::error::{MedIndexError, Result};
use crate::lexical::query::{
    BooleanQuery, MatchAllQuery, PhraseQuery, Query, RegexpQuery, TermQuery, TermRangeQuery,
    WildcardQuery,
};

/// Pest grammar parser for query strings.
#[derive(Parser)]
#[grammar = "lexical/query/parser.pest"]
struct QueryStringParser;

/// Builds the query for a `field:[lower TO upper]` clause.
///
/// Bounds arrive unescaped and unanalyzed; `None` means an open (`*`) end.
pub trait RangeQueryBuilder: Send + Sync {
    fn build_range(
        &self,
        field: &str,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
        analyzer: &PerFieldAnalyzer,
    ) -> Result<Box<dyn Query>>;
}

/// Lexicographic ranges over the analyzed terms of the field.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRangeQueryBuilder;

impl RangeQueryBuilder for DefaultRangeQueryBuilder {
    fn build_range(
        &self,
        field: &str,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
        analyzer: &PerFieldAnalyzer,
    ) -> Result<Box<dyn Query>> {
        Ok(Box::new(TermRangeQuery::new(
            field,
            lower.map(|b| analyzer.normalize_field(field, b)),
            upper.map(|b| analyzer.normalize_field(field, b)),
            include_lower,
            include_upper,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    Required,
    Prohibited,
}

type Clause = (Box<dyn Query>, Modifier);

/// Parser for the boolean query language.
#[derive(Debug, Clone)]
pub struct QueryParser {
    default_field: String,
    analyzer: Arc<PerFieldAnalyzer>,
}

impl QueryParser {
    pub fn new<S: Into<String>>(default_field: S, analyzer: Arc<PerFieldAnalyzer>) -> Self {
        QueryParser {
            default_field: default_field.into(),
            analyzer,
        }
    }

    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    pub fn analyzer(&self) -> &PerFieldAnalyzer {
        &self.analyzer
    }

    /// Parse with lexicographic ranges.
    pub fn parse(&self, text: &str) -> Result<Box<dyn Query>> {
        self.parse_with(text, &DefaultRangeQueryBuilder)
    }

    /// Parse, building range clauses with `ranges`.
    pub fn parse_with(&self, text: &str, ranges: &dyn RangeQueryBuilder) -> Result<Box<dyn Query>> {
        if text.trim().is_empty() {
            return Err(MedIndexError::parse("empty query"));
        }

        let mut pairs = QueryStringParser::parse(Rule::query, text)
            .map_err(|e| MedIndexError::parse(format!("invalid query {text:?}: {e}")))?;
        let query_pair = pairs
            .next()
            .ok_or_else(|| MedIndexError::parse("empty parse tree"))?;

        let context = BuildContext {
            parser: self,
            ranges,
        };
        let mut query: Option<Box<dyn Query>> = None;
        for inner in query_pair.into_inner() {
            if inner.as_rule() == Rule::or_expr {
                query = context.build_or(inner, &self.default_field)?;
            }
        }

        let query = query.unwrap_or_else(|| Box::new(BooleanQuery::new()));
        debug!("parsed {text:?} as {}", query.description());
        Ok(query)
    }
}

struct BuildContext<'a> {
    parser: &'a QueryParser,
    ranges: &'a dyn RangeQueryBuilder,
}

impl BuildContext<'_> {
    fn build_or(&self, pair: Pair<'_, Rule>, field: &str) -> Result<Option<Box<dyn Query>>> {
        let mut clauses = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::and_expr {
                if let Some(clause) = self.build_and(inner, field)? {
                    clauses.push(clause);
                }
            }
        }

        if clauses.len() <= 1 {
            return Ok(clauses.pop().map(|(query, modifier)| match modifier {
                Modifier::Prohibited => negate(query),
                _ => query,
            }));
        }

        let mut boolean = BooleanQuery::new();
        let mut positive = false;
        for (query, modifier) in clauses {
            match modifier {
                Modifier::None => {
                    positive = true;
                    boolean.add_should(query);
                }
                Modifier::Required => {
                    positive = true;
                    boolean.add_must(query);
                }
                Modifier::Prohibited => boolean.add_must_not(query),
            }
        }
        if !positive {
            boolean.add_must(Box::new(MatchAllQuery::new()));
        }
        Ok(Some(Box::new(boolean)))
    }

    fn build_and(&self, pair: Pair<'_, Rule>, field: &str) -> Result<Option<Clause>> {
        let mut clauses = Vec::new();
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::unary {
                if let Some(clause) = self.build_unary(inner, field)? {
                    clauses.push(clause);
                }
            }
        }

        if clauses.len() <= 1 {
            return Ok(clauses.pop());
        }

        let mut boolean = BooleanQuery::new();
        let mut positive = false;
        for (query, modifier) in clauses {
            if modifier == Modifier::Prohibited {
                boolean.add_must_not(query);
            } else {
                positive = true;
                boolean.add_must(query);
            }
        }
        if !positive {
            boolean.add_must(Box::new(MatchAllQuery::new()));
        }
        Ok(Some((Box::new(boolean), Modifier::None)))
    }

    fn build_unary(&self, pair: Pair<'_, Rule>, field: &str) -> Result<Option<Clause>> {
        let mut modifier = Modifier::None;
        let mut query = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::required => modifier = Modifier::Required,
                Rule::prohibited => modifier = Modifier::Prohibited,
                _ => query = self.build_primary(inner, field)?,
            }
        }
        Ok(query.map(|q| (q, modifier)))
    }

    fn build_primary(&self, pair: Pair<'_, Rule>, field: &str) -> Result<Option<Box<dyn Query>>> {
        match pair.as_rule() {
            Rule::group => {
                let mut result = None;
                for inner in pair.into_inner() {
                    if inner.as_rule() == Rule::or_expr {
                        result = self.build_or(inner, field)?;
                    }
                }
                Ok(result)
            }
            Rule::field_clause => {
                let mut inner = pair.into_inner();
                let name = inner
                    .next()
                    .ok_or_else(|| MedIndexError::parse("field clause without a field"))?
                    .as_str()
                    .to_string();
                let value = inner
                    .next()
                    .ok_or_else(|| MedIndexError::parse(format!("field {name} has no value")))?;

                if name == "*" {
                    return match (value.as_rule(), value.as_str()) {
                        (Rule::term, "*") => Ok(Some(Box::new(MatchAllQuery::new()))),
                        _ => Err(MedIndexError::parse(format!(
                            "the * field only accepts *, got {}",
                            value.as_str()
                        ))),
                    };
                }
                self.build_primary(value, &name)
            }
            Rule::range => self.build_range(pair, field).map(Some),
            Rule::phrase => {
                let text = unescape(inner_text(pair));
                Ok(self.build_phrase(field, &text))
            }
            Rule::regexp => {
                let pattern = inner_text(pair).replace("\\/", "/");
                Ok(Some(Box::new(RegexpQuery::new(field, pattern)?)))
            }
            Rule::term => self.build_term(field, pair.as_str()),
            rule => Err(MedIndexError::parse(format!("unexpected {rule:?} in query"))),
        }
    }

    fn build_term(&self, field: &str, raw: &str) -> Result<Option<Box<dyn Query>>> {
        let analyzer = self.parser.analyzer();
        if has_wildcard(raw) {
            let pattern = analyzer.normalize_field(field, raw);
            return Ok(Some(Box::new(WildcardQuery::new(field, pattern)?)));
        }

        let text = unescape(raw);
        let mut tokens = analyzer.analyze_field(field, &text);
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(tokens
                .pop()
                .map(|t| Box::new(TermQuery::new(field, t.text)) as Box<dyn Query>)),
            _ => {
                let mut boolean = BooleanQuery::new();
                for token in tokens {
                    boolean.add_should(Box::new(TermQuery::new(field, token.text)));
                }
                Ok(Some(Box::new(boolean)))
            }
        }
    }

    fn build_phrase(&self, field: &str, text: &str) -> Option<Box<dyn Query>> {
        let mut tokens = self.parser.analyzer().analyze_field(field, text);
        match tokens.len() {
            0 => None,
            1 => tokens
                .pop()
                .map(|t| Box::new(TermQuery::new(field, t.text)) as Box<dyn Query>),
            _ => Some(Box::new(PhraseQuery::new(
                field,
                tokens.into_iter().map(|t| t.text).collect(),
            ))),
        }
    }

    fn build_range(&self, pair: Pair<'_, Rule>, field: &str) -> Result<Box<dyn Query>> {
        let mut include_lower = true;
        let mut include_upper = true;
        let mut bounds: Vec<Option<String>> = Vec::with_capacity(2);

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::range_open => include_lower = inner.as_str() == "[",
                Rule::range_close => include_upper = inner.as_str() == "]",
                Rule::range_term if inner.as_str() == "*" => bounds.push(None),
                Rule::range_term => bounds.push(Some(unescape(inner.as_str()))),
                Rule::phrase => bounds.push(Some(unescape(inner_text(inner)))),
                _ => {}
            }
        }

        let [lower, upper]: [Option<String>; 2] = bounds
            .try_into()
            .map_err(|_| MedIndexError::parse(format!("range on {field} needs two bounds")))?;

        self.ranges.build_range(
            field,
            lower.as_deref(),
            upper.as_deref(),
            include_lower,
            include_upper,
            self.parser.analyzer(),
        )
    }
}

/// Wrap a prohibited clause standing on its own.
fn negate(query: Box<dyn Query>) -> Box<dyn Query> {
    let mut boolean = BooleanQuery::new();
    boolean.add_must(Box::new(MatchAllQuery::new()));
    boolean.add_must_not(query);
    Box::new(boolean)
}

/// Text of the single inner pair of a quoted phrase or regexp.
fn inner_text(pair: Pair<'_, Rule>) -> &str {
    pair.into_inner().next().map(|p| p.as_str()).unwrap_or("")
}

/// Whether a raw term contains an unescaped `*` or `?`.
fn has_wildcard(raw: &str) -> bool {
    let mut escaped = false;
    for c in raw.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Drop escaping backslashes.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
