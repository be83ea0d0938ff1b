//! Documents and their analyzed form.

use std::collections::BTreeMap;

use crate::analysis::PerFieldAnalyzer;
use crate::lexical::core::field::{Field, FieldValue, point_field_name};

/// An ordered collection of typed fields.
///
/// Field names are not unique: adding the same name twice keeps both values,
/// which is how multi-valued attributes are represented.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Append a field.
    pub fn add<S: Into<String>, V: Into<FieldValue>>(&mut self, name: S, value: V) {
        self.fields.push(Field::new(name, value.into()));
    }

    pub fn add_text<S: Into<String>, T: Into<String>>(&mut self, name: S, value: T) {
        self.add(name, FieldValue::Text(value.into()));
    }

    pub fn add_numeric<S: Into<String>>(&mut self, name: S, value: f32) {
        self.add(name, FieldValue::Numeric(value));
    }

    pub fn add_integer<S: Into<String>>(&mut self, name: S, value: i64) {
        self.add(name, FieldValue::Integer(value));
    }

    pub fn add_blob<S: Into<String>>(&mut self, name: S, value: Vec<u8>) {
        self.add(name, FieldValue::Blob(value));
    }

    /// Builder-style [`Document::add`].
    pub fn with_field<S: Into<String>, V: Into<FieldValue>>(mut self, name: S, value: V) -> Self {
        self.add(name, value);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| &f.value)
    }

    /// Number of fields named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).count()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert the document into the form the index stores.
    ///
    /// Text is run through the field's analyzer. Repeated fields continue the
    /// position sequence with a gap of one so phrases never span two values.
    pub fn materialize(&self, analyzer: &PerFieldAnalyzer) -> AnalyzedDocument {
        let mut analyzed = AnalyzedDocument::default();
        let mut next_position: BTreeMap<&str, u32> = BTreeMap::new();

        for field in &self.fields {
            analyzed.stored.push((field.name.clone(), field.value.clone()));

            match &field.value {
                FieldValue::Text(text) => {
                    let base = next_position.entry(field.name.as_str()).or_insert(0);
                    let tokens = analyzer.analyze_field(&field.name, text);
                    let mut last = *base;
                    let postings = analyzed.terms.entry(field.name.clone()).or_default();
                    for token in tokens {
                        let position = *base + token.position;
                        postings.push((token.text, position));
                        last = position + 1;
                    }
                    *base = last + 1;
                }
                FieldValue::Integer(value) => {
                    analyzed
                        .terms
                        .entry(field.name.clone())
                        .or_default()
                        .push((value.to_string(), 0));
                }
                FieldValue::Numeric(_) | FieldValue::Blob(_) => {}
            }

            if let Some(point) = field.value.point_value() {
                analyzed.points.push((point_field_name(&field.name), point));
            }
        }

        analyzed
    }
}

/// A document after analysis, ready to be buffered by the writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedDocument {
    /// Exact values, in the original field order.
    pub stored: Vec<(String, FieldValue)>,
    /// Field name to `(term, position)` pairs.
    pub terms: BTreeMap<String, Vec<(String, u32)>>,
    /// Shadow point fields.
    pub points: Vec<(String, f32)>,
}

impl AnalyzedDocument {
    /// Whether `field` contains exactly `term`.
    pub fn has_term(&self, field: &str, term: &str) -> bool {
        self.terms
            .get(field)
            .is_some_and(|terms| terms.iter().any(|(t, _)| t == term))
    }

    /// First stored value of `field`.
    pub fn stored_value(&self, field: &str) -> Option<&FieldValue> {
        self.stored
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub(crate) fn estimated_size(&self) -> usize {
        let stored: usize = self
            .stored
            .iter()
            .map(|(name, value)| name.len() + value.estimated_size() + 16)
            .sum();
        let terms: usize = self
            .terms
            .iter()
            .map(|(field, terms)| {
                field.len() + terms.iter().map(|(t, _)| t.len() + 28).sum::<usize>()
            })
            .sum();
        let points: usize = self.points.iter().map(|(name, _)| name.len() + 28).sum();
        stored + terms + points
    }
}
