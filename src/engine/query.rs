//! Query parsing with typed numeric ranges.
//!
//! On top of the boolean query language this accepts `Field:Int:[1 TO 10]`,
//! `Field:Float:[..]` and `Field:Numeric:[..]`. The three markers mean the
//! same thing: a decimal range over the point field `_point_Field`.
//!
//! The markers are handled by rewriting the text before it reaches the
//! grammar. A first pass collects the marked field names for the whole query,
//! a second strips the markers; only range construction then differs, through
//! [`NumericRangeBuilder`]. A field marked anywhere in the query is numeric in
//! every range clause of that query.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;

use crate::analysis::PerFieldAnalyzer;
use crate::error::{MedIndexError, Result};
use crate::lexical::core::field::point_field_name;
use crate::lexical::query::{
    DefaultRangeQueryBuilder, PointRangeQuery, Query, QueryParser, RangeQueryBuilder,
};

const TYPE_MARKERS: [&str; 3] = ["Float:", "Int:", "Numeric:"];

/// A compiled query and the fields that were typed numeric while parsing it.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub query: Box<dyn Query>,
    pub numeric_fields: BTreeSet<String>,
}

/// Range construction that turns ranges on numeric fields into point ranges.
#[derive(Debug, Clone, Copy)]
pub struct NumericRangeBuilder<'a> {
    numeric_fields: &'a BTreeSet<String>,
}

impl<'a> NumericRangeBuilder<'a> {
    pub fn new(numeric_fields: &'a BTreeSet<String>) -> Self {
        NumericRangeBuilder { numeric_fields }
    }
}

impl RangeQueryBuilder for NumericRangeBuilder<'_> {
    fn build_range(
        &self,
        field: &str,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
        analyzer: &PerFieldAnalyzer,
    ) -> Result<Box<dyn Query>> {
        if !self.numeric_fields.contains(field) {
            return DefaultRangeQueryBuilder.build_range(
                field,
                lower,
                upper,
                include_lower,
                include_upper,
                analyzer,
            );
        }
        // Point ranges are inclusive at both ends whatever the brackets say.
        let lower = parse_bound(field, lower, f32::NEG_INFINITY)?;
        let upper = parse_bound(field, upper, f32::INFINITY)?;
        Ok(Box::new(PointRangeQuery::new(
            point_field_name(field),
            lower,
            upper,
        )))
    }
}

fn parse_bound(field: &str, bound: Option<&str>, open: f32) -> Result<f32> {
    match bound {
        None => Ok(open),
        Some(text) => text.trim().parse::<f32>().map_err(|e| {
            MedIndexError::parse(format!(
                "numeric range on {field}: {text:?} is not a number ({e})"
            ))
        }),
    }
}

/// Query parser for the DICOM index.
#[derive(Debug, Clone)]
pub struct DicomQueryParser {
    base: QueryParser,
    typed_field: Regex,
}

impl DicomQueryParser {
    pub fn new<S: Into<String>>(default_field: S, analyzer: Arc<PerFieldAnalyzer>) -> Result<Self> {
        let typed_field = Regex::new(r"([a-zA-Z_0-9]*:(Float|Numeric|Int):)+")
            .map_err(|e| MedIndexError::invalid_config(format!("typed field pattern: {e}")))?;
        Ok(DicomQueryParser {
            base: QueryParser::new(default_field, analyzer),
            typed_field,
        })
    }

    pub fn default_field(&self) -> &str {
        self.base.default_field()
    }

    /// Field names marked numeric anywhere in `text`.
    ///
    /// For a run of markers such as `A:Int:B:Int:` only the first name counts.
    pub fn numeric_fields(&self, text: &str) -> BTreeSet<String> {
        self.typed_field
            .find_iter(text)
            .filter_map(|m| m.as_str().split(':').next())
            .map(str::to_string)
            .collect()
    }

    /// The query text with every type marker removed.
    pub fn strip_markers(text: &str) -> String {
        TYPE_MARKERS
            .iter()
            .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
    }

    pub fn parse_typed(&self, text: &str) -> Result<ParsedQuery> {
        let numeric_fields = self.numeric_fields(text);
        let rewritten = Self::strip_markers(text);
        let query = self
            .base
            .parse_with(&rewritten, &NumericRangeBuilder::new(&numeric_fields))?;
        Ok(ParsedQuery {
            query,
            numeric_fields,
        })
    }

    pub fn parse(&self, text: &str) -> Result<Box<dyn Query>> {
        Ok(self.parse_typed(text)?.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::query::{BooleanQuery, Occur, TermQuery, TermRangeQuery};

    fn parser() -> DicomQueryParser {
        DicomQueryParser::new("others", Arc::new(PerFieldAnalyzer::default())).unwrap()
    }

    fn point_range(query: &dyn Query) -> &PointRangeQuery {
        query
            .as_any()
            .downcast_ref::<PointRangeQuery>()
            .unwrap_or_else(|| panic!("not a point range: {}", query.description()))
    }

    #[test]
    fn test_collect_and_strip() {
        let parser = parser();
        let text = "Rows:Int:[1 TO 10] AND Slope:Float:[0 TO 1] OR A:Int:B:Numeric:[1 TO 2]";
        let fields: Vec<String> = parser.numeric_fields(text).into_iter().collect();
        assert_eq!(fields, vec!["A", "Rows", "Slope"]);
        assert_eq!(
            DicomQueryParser::strip_markers("Rows:Int:[1 TO 10] X:Numeric:[1 TO 2]"),
            "Rows:[1 TO 10] X:[1 TO 2]"
        );
    }

    #[test]
    fn test_open_bounds() {
        let parsed = parser().parse_typed("Rows:Int:[* TO 512]").unwrap();
        let range = point_range(parsed.query.as_ref());
        assert_eq!(range.lower(), f32::NEG_INFINITY);
        assert_eq!(range.upper(), 512.0);
    }

    #[test]
    fn test_exclusive_brackets_stay_inclusive() {
        let parsed = parser().parse_typed("Rows:Int:{1 TO 10}").unwrap();
        let range = point_range(parsed.query.as_ref());
        assert_eq!((range.lower(), range.upper()), (1.0, 10.0));
    }

    #[test]
    fn test_bad_number_is_parse_error() {
        let err = parser().parse("Rows:Int:[one TO 10]").unwrap_err();
        assert!(matches!(err, MedIndexError::Parse(_)));
    }

    #[test]
    fn test_marker_applies_to_whole_query() {
        let parsed = parser()
            .parse_typed("Rows:[1 TO 5] OR Rows:Int:[8 TO 9]")
            .unwrap();
        assert!(parsed.numeric_fields.contains("Rows"));
        let boolean = parsed
            .query
            .as_any()
            .downcast_ref::<BooleanQuery>()
            .unwrap();
        for clause in boolean.clauses() {
            assert_eq!(clause.occur, Occur::Should);
            point_range(clause.query.as_ref());
        }
    }

    #[test]
    fn test_untyped_parts_are_unchanged() {
        let query = parser().parse("Modality:CT").unwrap();
        let term = query.as_any().downcast_ref::<TermQuery>().unwrap();
        assert_eq!(term.term(), "ct");

        let query = parser().parse("StudyDate:[20100118 TO 20100328]").unwrap();
        let range = query.as_any().downcast_ref::<TermRangeQuery>().unwrap();
        assert_eq!(range.lower(), Some("20100118"));
    }
}
