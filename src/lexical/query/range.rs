//! Range queries over terms and numeric points.

use std::any::Any;
use std::ops::Bound;

use bit_vec::BitVec;

use crate::error::Result;
use crate::lexical::index::segment::Segment;
use crate::lexical::query::{Query, mark_postings};

/// Lexicographic range over the terms of a field.
///
/// `None` bounds are open. Dates in `YYYYMMDD` form sort correctly this way.
#[derive(Debug, Clone, PartialEq)]
pub struct TermRangeQuery {
    field: String,
    lower: Option<String>,
    upper: Option<String>,
    include_lower: bool,
    include_upper: bool,
}

impl TermRangeQuery {
    pub fn new<F: Into<String>>(
        field: F,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        TermRangeQuery {
            field: field.into(),
            lower,
            upper,
            include_lower,
            include_upper,
        }
    }

    /// Range with both ends included.
    pub fn inclusive<F: Into<String>, L: Into<String>, U: Into<String>>(
        field: F,
        lower: L,
        upper: U,
    ) -> Self {
        Self::new(field, Some(lower.into()), Some(upper.into()), true, true)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lower(&self) -> Option<&str> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&str> {
        self.upper.as_deref()
    }

    pub fn include_lower(&self) -> bool {
        self.include_lower
    }

    pub fn include_upper(&self) -> bool {
        self.include_upper
    }

    fn bound<'a>(value: Option<&'a str>, inclusive: bool) -> Bound<&'a str> {
        match value {
            None => Bound::Unbounded,
            Some(v) if inclusive => Bound::Included(v),
            Some(v) => Bound::Excluded(v),
        }
    }

    /// Whether the bounds describe an empty interval.
    fn is_empty_range(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => {
                lower > upper || (lower == upper && !(self.include_lower && self.include_upper))
            }
            _ => false,
        }
    }
}

impl Query for TermRangeQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        if self.is_empty_range() {
            return Ok(set);
        }
        let Some(dictionary) = segment.terms(&self.field) else {
            return Ok(set);
        };

        let bounds = (
            Self::bound(self.lower.as_deref(), self.include_lower),
            Self::bound(self.upper.as_deref(), self.include_upper),
        );
        for (_, postings) in dictionary.range::<str, _>(bounds) {
            mark_postings(&mut set, postings);
        }
        Ok(set)
    }

    fn description(&self) -> String {
        format!(
            "{}:{}{} TO {}{}",
            self.field,
            if self.include_lower { '[' } else { '{' },
            self.lower.as_deref().unwrap_or("*"),
            self.upper.as_deref().unwrap_or("*"),
            if self.include_upper { ']' } else { '}' },
        )
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inclusive numeric range over a point field.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRangeQuery {
    field: String,
    lower: f32,
    upper: f32,
}

impl PointRangeQuery {
    /// Both bounds are inclusive. Use infinities for open ends.
    pub fn new<F: Into<String>>(field: F, lower: f32, upper: f32) -> Self {
        PointRangeQuery {
            field: field.into(),
            lower,
            upper,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lower(&self) -> f32 {
        self.lower
    }

    pub fn upper(&self) -> f32 {
        self.upper
    }
}

impl Query for PointRangeQuery {
    fn matches(&self, segment: &Segment) -> Result<BitVec> {
        let mut set = segment.empty_doc_set();
        if self.lower.is_nan() || self.upper.is_nan() || self.lower > self.upper {
            return Ok(set);
        }

        let points = segment.points(&self.field);
        let start = points.partition_point(|(value, _)| *value < self.lower);
        let end = points.partition_point(|(value, _)| *value <= self.upper);
        for (_, doc) in &points[start..end.max(start)] {
            set.set(*doc as usize, true);
        }
        Ok(set)
    }

    fn description(&self) -> String {
        format!("{}:[{} TO {}]", self.field, self.lower, self.upper)
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PerFieldAnalyzer;
    use crate::lexical::core::Document;

    fn segment() -> Segment {
        let analyzer = PerFieldAnalyzer::default();
        let docs: Vec<_> = [
            ("20100101", 0.1f32),
            ("20100118", 0.25),
            ("20100301", 0.5),
            ("20100328", 0.75),
            ("20100401", 1.0),
        ]
        .iter()
        .map(|(date, value)| {
            Document::new()
                .with_field("StudyDate", *date)
                .with_field("Something", *value)
                .materialize(&analyzer)
        })
        .collect();
        Segment::from_documents("s", &docs)
    }

    #[test]
    fn test_term_range_inclusive_and_exclusive() {
        let segment = segment();

        let set = TermRangeQuery::inclusive("StudyDate", "20100118", "20100328")
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![false, true, true, true, false]);

        let set = TermRangeQuery::new(
            "StudyDate",
            Some("20100118".into()),
            Some("20100328".into()),
            false,
            false,
        )
        .matches(&segment)
        .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![false, false, true, false, false]);
    }

    #[test]
    fn test_term_range_open_and_inverted() {
        let segment = segment();

        let set = TermRangeQuery::new("StudyDate", None, Some("20100118".into()), true, true)
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().filter(|b| *b).count(), 2);

        let set = TermRangeQuery::inclusive("StudyDate", "20100401", "20100101")
            .matches(&segment)
            .unwrap();
        assert!(set.none());

        let set = TermRangeQuery::new(
            "StudyDate",
            Some("20100118".into()),
            Some("20100118".into()),
            true,
            false,
        )
        .matches(&segment)
        .unwrap();
        assert!(set.none());
    }

    #[test]
    fn test_point_range() {
        let segment = segment();

        let set = PointRangeQuery::new("_point_Something", 0.25, 0.75)
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![false, true, true, true, false]);

        let set = PointRangeQuery::new("_point_Something", f32::NEG_INFINITY, 0.2)
            .matches(&segment)
            .unwrap();
        assert_eq!(set.iter().filter(|b| *b).count(), 1);

        assert!(
            PointRangeQuery::new("_point_Something", 2.0, 1.0)
                .matches(&segment)
                .unwrap()
                .none()
        );
        assert!(
            PointRangeQuery::new("_point_Missing", 0.0, 1.0)
                .matches(&segment)
                .unwrap()
                .none()
        );
    }
}
