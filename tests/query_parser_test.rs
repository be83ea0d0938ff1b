use std::sync::Arc;

use medindex::analysis::PerFieldAnalyzer;
use medindex::engine::query::DicomQueryParser;
use medindex::lexical::query::{
    BooleanQuery, Occur, PointRangeQuery, Query, TermQuery, TermRangeQuery,
};

fn parser() -> DicomQueryParser {
    let analyzer = Arc::new(PerFieldAnalyzer::with_keyword_fields(["uri", "SOPInstanceUID"]));
    DicomQueryParser::new("others", analyzer).unwrap()
}

fn downcast<T: 'static>(query: &dyn Query) -> &T {
    query
        .as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("unexpected query {}", query.description()))
}

#[test]
fn test_float_range_on_point_field() -> medindex::Result<()> {
    let parsed = parser().parse_typed("MyStringS:Float:[1 TO 10]")?;
    assert!(parsed.numeric_fields.contains("MyStringS"));

    let range = downcast::<PointRangeQuery>(parsed.query.as_ref());
    assert_eq!(range.field(), "_point_MyStringS");
    assert_eq!((range.lower(), range.upper()), (1.0, 10.0));
    Ok(())
}

#[test]
fn test_int_range_on_point_field() -> medindex::Result<()> {
    let query = parser().parse("AccessionNumber:Int:[1 TO 10]")?;
    let range = downcast::<PointRangeQuery>(query.as_ref());
    assert_eq!(range.field(), "_point_AccessionNumber");
    assert_eq!((range.lower(), range.upper()), (1.0, 10.0));
    Ok(())
}

#[test]
fn test_numeric_range_with_decimals() -> medindex::Result<()> {
    let query = parser().parse("Something:Numeric:[0.25 TO 0.75]")?;
    let range = downcast::<PointRangeQuery>(query.as_ref());
    assert_eq!(range.field(), "_point_Something");
    assert_eq!((range.lower(), range.upper()), (0.25, 0.75));
    Ok(())
}

#[test]
fn test_untyped_range_is_lexicographic() -> medindex::Result<()> {
    let query = parser().parse("StudyDate:[20100118 TO 20100328]")?;
    let range = downcast::<TermRangeQuery>(query.as_ref());
    assert_eq!(range.field(), "StudyDate");
    assert_eq!(range.lower(), Some("20100118"));
    assert_eq!(range.upper(), Some("20100328"));
    assert!(range.include_lower() && range.include_upper());
    Ok(())
}

#[test]
fn test_term_and_range_conjunction() -> medindex::Result<()> {
    let query = parser().parse("PatientName:Salvador AND StudyDate:[20100118 TO 20100328]")?;
    let boolean = downcast::<BooleanQuery>(query.as_ref());
    let clauses = boolean.clauses();
    assert_eq!(clauses.len(), 2);
    assert!(clauses.iter().all(|c| c.occur == Occur::Must));

    let term = downcast::<TermQuery>(clauses[0].query.as_ref());
    assert_eq!((term.field(), term.term()), ("PatientName", "salvador"));

    let range = downcast::<TermRangeQuery>(clauses[1].query.as_ref());
    assert_eq!(range.field(), "StudyDate");
    assert_eq!(range.lower(), Some("20100118"));
    Ok(())
}

#[test]
fn test_typed_field_stays_numeric_in_other_clauses() -> medindex::Result<()> {
    let query = parser().parse("Rows:Int:[1 TO 10] OR Rows:[100 TO 200]")?;
    let boolean = downcast::<BooleanQuery>(query.as_ref());
    for clause in boolean.clauses() {
        assert_eq!(clause.occur, Occur::Should);
        let range = downcast::<PointRangeQuery>(clause.query.as_ref());
        assert_eq!(range.field(), "_point_Rows");
    }
    Ok(())
}

#[test]
fn test_malformed_queries_are_parse_errors() {
    let parser = parser();
    assert!(parser.parse("Rows:Int:[one TO 10]").is_err());
    assert!(parser.parse("PatientName:(unbalanced").is_err());
    assert!(parser.parse("StudyDate:[20100118 TO").is_err());
}
