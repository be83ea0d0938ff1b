//! Immutable in-memory segments.

use std::collections::BTreeMap;

use bit_vec::BitVec;

use crate::lexical::core::{AnalyzedDocument, FieldValue};

/// Occurrences of a term in one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc: u32,
    pub positions: Vec<u32>,
}

/// Postings for one term, sorted by document.
pub type PostingList = Vec<Posting>;

/// Term dictionary of one field.
pub type TermDictionary = BTreeMap<String, PostingList>;

/// A set of documents frozen into inverted form.
///
/// Segments are never modified after construction. Deletions are tracked
/// outside the segment, by the writer and by each reader generation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segment {
    pub(crate) name: String,
    pub(crate) stored: Vec<Vec<(String, FieldValue)>>,
    pub(crate) terms: BTreeMap<String, TermDictionary>,
    /// Point field to `(value, doc)` pairs, sorted by value.
    pub(crate) points: BTreeMap<String, Vec<(f32, u32)>>,
}

impl Segment {
    /// Build a segment from analyzed documents. Document `i` gets ordinal `i`.
    pub fn from_documents<S: Into<String>>(name: S, docs: &[AnalyzedDocument]) -> Self {
        let mut builder = SegmentBuilder::new(name);
        for doc in docs {
            builder.add(
                doc.stored.clone(),
                doc.terms.iter().flat_map(|(field, terms)| {
                    terms
                        .iter()
                        .map(move |(term, pos)| (field.as_str(), term.as_str(), *pos))
                }),
                doc.points.iter().map(|(field, value)| (field.as_str(), *value)),
            );
        }
        builder.build()
    }

    /// Merge the live documents of several segments into a new one.
    pub fn merge<S: Into<String>>(name: S, sources: &[(&Segment, &BitVec)]) -> Self {
        let mut merged = Segment {
            name: name.into(),
            ..Default::default()
        };

        for (segment, deleted) in sources {
            let base = merged.stored.len() as u32;
            let mut remap: Vec<Option<u32>> = Vec::with_capacity(segment.stored.len());
            let mut next = base;
            for (doc, stored) in segment.stored.iter().enumerate() {
                if deleted.get(doc).unwrap_or(false) {
                    remap.push(None);
                } else {
                    merged.stored.push(stored.clone());
                    remap.push(Some(next));
                    next += 1;
                }
            }

            for (field, dictionary) in &segment.terms {
                let target = merged.terms.entry(field.clone()).or_default();
                for (term, postings) in dictionary {
                    let live: Vec<Posting> = postings
                        .iter()
                        .filter_map(|p| {
                            remap[p.doc as usize].map(|doc| Posting {
                                doc,
                                positions: p.positions.clone(),
                            })
                        })
                        .collect();
                    if !live.is_empty() {
                        target.entry(term.clone()).or_default().extend(live);
                    }
                }
            }

            for (field, points) in &segment.points {
                let target = merged.points.entry(field.clone()).or_default();
                target.extend(
                    points
                        .iter()
                        .filter_map(|(value, doc)| remap[*doc as usize].map(|d| (*value, d))),
                );
            }
        }

        merged.terms.retain(|_, dictionary| !dictionary.is_empty());
        merged.points.retain(|_, points| !points.is_empty());
        for points in merged.points.values_mut() {
            points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        merged
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents, deleted ones included.
    pub fn doc_count(&self) -> usize {
        self.stored.len()
    }

    /// Stored fields of a document.
    pub fn stored_fields(&self, doc: u32) -> Option<&[(String, FieldValue)]> {
        self.stored.get(doc as usize).map(|fields| fields.as_slice())
    }

    /// First stored value of `field` in `doc`.
    pub fn stored_value(&self, doc: u32, field: &str) -> Option<&FieldValue> {
        self.stored_fields(doc)?
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// The term dictionary of a field.
    pub fn terms(&self, field: &str) -> Option<&TermDictionary> {
        self.terms.get(field)
    }

    pub fn postings(&self, field: &str, term: &str) -> Option<&PostingList> {
        self.terms.get(field)?.get(term)
    }

    /// Points of a field, sorted by value.
    pub fn points(&self, field: &str) -> &[(f32, u32)] {
        self.points.get(field).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// An empty document set sized for this segment.
    pub fn empty_doc_set(&self) -> BitVec {
        BitVec::from_elem(self.doc_count(), false)
    }

    /// A document set containing every document of this segment.
    pub fn full_doc_set(&self) -> BitVec {
        BitVec::from_elem(self.doc_count(), true)
    }
}

/// Accumulates documents in ordinal order.
#[derive(Debug)]
pub(crate) struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    pub(crate) fn new<S: Into<String>>(name: S) -> Self {
        SegmentBuilder {
            segment: Segment {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    pub(crate) fn add<'a, T, P>(&mut self, stored: Vec<(String, FieldValue)>, terms: T, points: P)
    where
        T: IntoIterator<Item = (&'a str, &'a str, u32)>,
        P: IntoIterator<Item = (&'a str, f32)>,
    {
        let doc = self.segment.stored.len() as u32;
        self.segment.stored.push(stored);

        for (field, term, position) in terms {
            let postings = self
                .segment
                .terms
                .entry(field.to_string())
                .or_default()
                .entry(term.to_string())
                .or_default();
            match postings.last_mut() {
                Some(last) if last.doc == doc => last.positions.push(position),
                _ => postings.push(Posting {
                    doc,
                    positions: vec![position],
                }),
            }
        }

        for (field, value) in points {
            self.segment
                .points
                .entry(field.to_string())
                .or_default()
                .push((value, doc));
        }
    }

    pub(crate) fn build(mut self) -> Segment {
        for points in self.segment.points.values_mut() {
            points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        self.segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PerFieldAnalyzer;
    use crate::lexical::core::Document;

    fn analyzed(docs: &[Document]) -> Vec<AnalyzedDocument> {
        let analyzer = PerFieldAnalyzer::with_keyword_fields(["uri"]);
        docs.iter().map(|d| d.materialize(&analyzer)).collect()
    }

    fn sample() -> Vec<AnalyzedDocument> {
        analyzed(&[
            Document::new()
                .with_field("uri", "a.dcm")
                .with_field("Modality", "CT")
                .with_field("Rows", 512i64),
            Document::new()
                .with_field("uri", "b.dcm")
                .with_field("Modality", "MR")
                .with_field("Rows", 256i64),
            Document::new()
                .with_field("uri", "c.dcm")
                .with_field("Modality", "CT")
                .with_field("Rows", 128i64),
        ])
    }

    #[test]
    fn test_from_documents() {
        let segment = Segment::from_documents("seg", &sample());
        assert_eq!(segment.doc_count(), 3);

        let docs: Vec<u32> = segment
            .postings("Modality", "ct")
            .unwrap()
            .iter()
            .map(|p| p.doc)
            .collect();
        assert_eq!(docs, vec![0, 2]);

        let points: Vec<f32> = segment.points("_point_Rows").iter().map(|p| p.0).collect();
        assert_eq!(points, vec![128.0, 256.0, 512.0]);
        assert_eq!(
            segment.stored_value(1, "uri"),
            Some(&FieldValue::Text("b.dcm".into()))
        );
    }

    #[test]
    fn test_merge_drops_deleted() {
        let first = Segment::from_documents("a", &sample());
        let second = Segment::from_documents("b", &sample()[..1]);

        let mut deleted = first.empty_doc_set();
        deleted.set(0, true);
        let none = second.empty_doc_set();

        let merged = Segment::merge("m", &[(&first, &deleted), (&second, &none)]);
        assert_eq!(merged.doc_count(), 3);
        assert_eq!(
            merged.stored_value(2, "uri"),
            Some(&FieldValue::Text("a.dcm".into()))
        );
        let ct: Vec<u32> = merged
            .postings("Modality", "ct")
            .unwrap()
            .iter()
            .map(|p| p.doc)
            .collect();
        assert_eq!(ct, vec![1, 2]);
        assert!(merged.postings("uri", "a.dcm").is_some());
        assert_eq!(merged.points("_point_Rows").len(), 3);
    }
}
