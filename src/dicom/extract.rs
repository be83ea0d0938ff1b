//! Attribute extraction: from a decoded [`AttributeSet`] to a [`Document`].
//!
//! Two passes contribute fields. The structured pass adds every `dim` entry
//! of the dictionary under its alias, with an empty value when the attribute
//! is absent. The flattening pass walks the whole set, sequences included,
//! adding leaves under `prefix + alias` and collecting every decoded value
//! into one free-text blob.
//!
//! Flattening only descends into the first item of a sequence. Each
//! sequence also becomes a field of its own, named by the bare alias and
//! holding the space-joined names of the fields found below it.

use std::collections::btree_map;

use log::trace;

use super::attribute::{AttributeSet, Element};
use super::charset::CharacterSet;
use super::dictionary::TagDictionary;
use super::vr::{VR, VrKind};
use crate::lexical::core::document::Document;

/// Prefixes longer than this stop the descent into nested sequences.
pub const DEFAULT_PREFIX_BUDGET: usize = 512;

/// Add `value` under `name`, typed by `vr`.
///
/// Integer VRs become [`FieldValue::Integer`](crate::lexical::FieldValue),
/// decimal VRs become `Numeric`; text that does not parse stays text, as
/// does everything else.
pub fn add_field(doc: &mut Document, vr: VR, name: &str, value: &str) {
    match vr {
        VR::IS | VR::SS | VR::US | VR::SL | VR::UL | VR::SV | VR::UV => {
            match value.parse::<i64>() {
                Ok(number) => doc.add_integer(name, number),
                Err(_) => doc.add_text(name, value),
            }
        }
        VR::DS | VR::FL | VR::FD => match value.parse::<f32>() {
            Ok(number) => doc.add_numeric(name, number),
            Err(_) => doc.add_text(name, value),
        },
        _ => doc.add_text(name, value),
    }
}

/// Builds document fields from attribute sets according to a dictionary.
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    dictionary: &'a TagDictionary,
    prefix_budget: usize,
}

impl<'a> Extractor<'a> {
    pub fn new(dictionary: &'a TagDictionary) -> Self {
        Extractor {
            dictionary,
            prefix_budget: DEFAULT_PREFIX_BUDGET,
        }
    }

    pub fn with_prefix_budget(mut self, prefix_budget: usize) -> Self {
        self.prefix_budget = prefix_budget;
        self
    }

    /// Add every structured field. Missing attributes contribute `""`.
    pub fn add_structured_fields(&self, set: &AttributeSet, doc: &mut Document) {
        let charset = set.charset();
        for entry in self.dictionary.dim_fields() {
            let element = set.get(entry.tag);
            let value = element
                .and_then(|e| e.to_text(charset))
                .unwrap_or_default();
            let vr = element.map_or(entry.vr, |e| e.vr);
            add_field(doc, vr, &entry.alias, &value);
        }
    }

    /// Flatten the whole set into `doc` and return the free-text blob.
    ///
    /// Without `deep_search` only attributes the dictionary marks as `other`
    /// are visited.
    pub fn flatten(&self, set: &AttributeSet, doc: &mut Document, deep_search: bool) -> String {
        let mut text = String::new();
        self.walk(set, "", doc, deep_search, &mut text);
        text
    }

    /// Walk `set` as if it were nested under `prefix`, appending decoded
    /// values to `text`. Returns the space-joined names of the fields added.
    ///
    /// Traversal is depth first over an explicit stack, so nesting depth does
    /// not grow the call stack.
    pub fn walk(
        &self,
        set: &AttributeSet,
        prefix: &str,
        doc: &mut Document,
        deep_search: bool,
        text: &mut String,
    ) -> String {
        if prefix.len() > self.prefix_budget {
            return String::new();
        }

        let mut stack = vec![Frame::new(set, prefix.to_string(), set.charset())];
        let mut returned: Option<String> = None;

        while let Some(frame) = stack.last_mut() {
            if let Some(tags) = returned.take() {
                let alias = frame.awaiting.take().unwrap_or_default();
                frame.tag_list.push(' ');
                frame.tag_list.push_str(&tags);
                frame.record_sequence(alias, tags);
            }

            let Some(element) = frame.elements.next() else {
                let Some(done) = stack.pop() else { break };
                for (alias, tags) in done.sequences {
                    add_field(doc, VR::ST, &alias, &tags);
                }
                if stack.is_empty() {
                    return done.tag_list;
                }
                returned = Some(done.tag_list);
                continue;
            };

            let Some(entry) = self.dictionary.get(element.tag) else {
                continue;
            };
            if !(deep_search || entry.other) {
                continue;
            }

            match element.items() {
                Some([]) => {}
                Some([first, ..]) => {
                    text.push(' ');
                    let child_prefix = format!("{}{}_", frame.prefix, entry.alias);
                    frame.awaiting = Some(entry.alias.clone());
                    if child_prefix.len() > self.prefix_budget {
                        trace!("prefix budget exhausted at {}", element.tag);
                        returned = Some(String::new());
                        continue;
                    }
                    let charset = first.declared_charset().unwrap_or(frame.charset);
                    stack.push(Frame::new(first, child_prefix, charset));
                }
                None => {
                    if matches!(element.vr, VR::OB | VR::OW) || entry.alias == "?" {
                        continue;
                    }
                    let Some(value) = leaf_value(element, frame.charset) else {
                        continue;
                    };
                    let name = format!("{}{}", frame.prefix, entry.alias);
                    frame.tag_list.push(' ');
                    frame.tag_list.push_str(&name);
                    add_field(doc, element.vr, &name, &value);
                    text.push(' ');
                    text.push_str(&value);
                }
            }
        }
        String::new()
    }
}

fn leaf_value(element: &Element, charset: CharacterSet) -> Option<String> {
    if element.vr.kind() == VrKind::Bulk {
        return None;
    }
    element.to_text(charset)
}

/// One level of the walk.
struct Frame<'s> {
    elements: btree_map::Values<'s, super::tag::Tag, Element>,
    prefix: String,
    charset: CharacterSet,
    tag_list: String,
    sequences: Vec<(String, String)>,
    awaiting: Option<String>,
}

impl<'s> Frame<'s> {
    fn new(set: &'s AttributeSet, prefix: String, charset: CharacterSet) -> Self {
        Frame {
            elements: set.iter(),
            prefix,
            charset,
            tag_list: String::new(),
            sequences: Vec::new(),
            awaiting: None,
        }
    }

    fn record_sequence(&mut self, alias: String, tags: String) {
        match self.sequences.iter_mut().find(|(a, _)| *a == alias) {
            Some(slot) => slot.1 = tags,
            None => self.sequences.push((alias, tags)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::dictionary::TagEntry;
    use crate::dicom::tag::Tag;
    use crate::lexical::core::field::FieldValue;

    fn dictionary() -> TagDictionary {
        let entry = |group, element, alias: &str, vr, dim, other| TagEntry {
            tag: Tag(group, element),
            alias: alias.to_string(),
            vr,
            dim,
            other,
        };
        TagDictionary::new([
            entry(0x0008, 0x0018, "SOPInstanceUID", VR::UI, true, false),
            entry(0x0008, 0x0060, "Modality", VR::CS, true, false),
            entry(0x0008, 0x0070, "Manufacturer", VR::LO, false, true),
            entry(0x0008, 0x1140, "ReferencedImageSequence", VR::SQ, false, true),
            entry(0x0008, 0x1155, "ReferencedSOPInstanceUID", VR::UI, false, true),
            entry(0x0010, 0x0010, "PatientName", VR::PN, true, false),
            entry(0x0020, 0x0013, "InstanceNumber", VR::IS, true, false),
            entry(0x0028, 0x0010, "Rows", VR::US, false, true),
            entry(0x0028, 0x0030, "PixelSpacing", VR::DS, false, true),
            entry(0x0028, 0x1053, "RescaleSlope", VR::DS, false, true),
            entry(0x0040, 0xA730, "ContentSequence", VR::SQ, false, true),
            entry(0x0009, 0x1001, "?", VR::LO, false, true),
        ])
    }

    fn sample() -> AttributeSet {
        let mut item = AttributeSet::new();
        item.put_str(Tag(0x0008, 0x1155), VR::UI, "1.2.3.9");
        let mut set = AttributeSet::new();
        set.put_str(Tag::SOP_INSTANCE_UID, VR::UI, "1.2.3.4")
            .put_str(Tag::MODALITY, VR::CS, "CT")
            .put_str(Tag(0x0008, 0x0070), VR::LO, "ACME")
            .put_sequence(Tag(0x0008, 0x1140), vec![item, AttributeSet::new()])
            .put_str(Tag(0x0010, 0x0010), VR::PN, "SALVADOR^DALI")
            .put_str(Tag(0x0020, 0x0013), VR::IS, "7 ")
            .put_u16(Tag(0x0028, 0x0010), 512)
            .put_str(Tag(0x0028, 0x0030), VR::DS, "0.5\\0.5")
            .put_str(Tag(0x0028, 0x1053), VR::DS, "1.5")
            .put_str(Tag(0x0009, 0x1001), VR::LO, "hidden");
        set
    }

    #[test]
    fn test_add_field_typing() {
        let mut doc = Document::new();
        add_field(&mut doc, VR::IS, "a", "42");
        add_field(&mut doc, VR::IS, "b", "4\\2");
        add_field(&mut doc, VR::DS, "c", "2.5");
        add_field(&mut doc, VR::DS, "d", "");
        add_field(&mut doc, VR::PN, "e", "12");
        assert_eq!(doc.get("a"), Some(&FieldValue::Integer(42)));
        assert_eq!(doc.get("b"), Some(&FieldValue::Text("4\\2".to_string())));
        assert_eq!(doc.get("c"), Some(&FieldValue::Numeric(2.5)));
        assert_eq!(doc.get("d"), Some(&FieldValue::Text(String::new())));
        assert_eq!(doc.get("e"), Some(&FieldValue::Text("12".to_string())));
    }

    #[test]
    fn test_structured_fields() {
        let dictionary = dictionary();
        let mut set = sample();
        set.remove(Tag(0x0010, 0x0010));
        let mut doc = Document::new();
        Extractor::new(&dictionary).add_structured_fields(&set, &mut doc);

        assert_eq!(doc.get("SOPInstanceUID").and_then(|v| v.as_text()), Some("1.2.3.4"));
        assert_eq!(doc.get("InstanceNumber"), Some(&FieldValue::Integer(7)));
        // Missing attributes still produce a field.
        assert_eq!(doc.get("PatientName").and_then(|v| v.as_text()), Some(""));
        assert!(doc.get("Manufacturer").is_none());
    }

    #[test]
    fn test_flatten_other_fields() {
        let dictionary = dictionary();
        let mut doc = Document::new();
        let text = Extractor::new(&dictionary).flatten(&sample(), &mut doc, false);

        assert_eq!(text, " ACME  1.2.3.9 512 0.5\\0.5 1.5");
        assert_eq!(doc.get("Manufacturer").and_then(|v| v.as_text()), Some("ACME"));
        assert_eq!(
            doc.get("ReferencedImageSequence_ReferencedSOPInstanceUID")
                .and_then(|v| v.as_text()),
            Some("1.2.3.9")
        );
        assert_eq!(doc.get("Rows"), Some(&FieldValue::Integer(512)));
        assert_eq!(doc.get("RescaleSlope"), Some(&FieldValue::Numeric(1.5)));
        assert_eq!(
            doc.get("ReferencedImageSequence").and_then(|v| v.as_text()),
            Some(" ReferencedImageSequence_ReferencedSOPInstanceUID")
        );
        // Not "other" and no deep search.
        assert!(doc.get("PatientName").is_none());
        assert!(doc.get("?").is_none());
    }

    #[test]
    fn test_flatten_deep_search() {
        let dictionary = dictionary();
        let mut doc = Document::new();
        let text = Extractor::new(&dictionary).flatten(&sample(), &mut doc, true);
        assert!(text.contains("SALVADOR^DALI"));
        assert!(text.contains("CT"));
        assert_eq!(doc.get("Modality").and_then(|v| v.as_text()), Some("CT"));
    }

    #[test]
    fn test_walk_returns_tag_list() {
        let dictionary = dictionary();
        let mut doc = Document::new();
        let mut text = String::new();
        let tags = Extractor::new(&dictionary).walk(&sample(), "", &mut doc, false, &mut text);
        assert_eq!(
            tags,
            " Manufacturer  ReferencedImageSequence_ReferencedSOPInstanceUID Rows PixelSpacing RescaleSlope"
        );
    }

    #[test]
    fn test_long_prefix_returns_empty() {
        let dictionary = dictionary();
        let prefix = "x".repeat(1000);
        let mut doc = Document::new();
        let mut text = String::new();
        let tags = Extractor::new(&dictionary).walk(&sample(), &prefix, &mut doc, true, &mut text);
        assert_eq!(tags, "");
        assert!(text.is_empty());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_deep_nesting_terminates() {
        let dictionary = dictionary();
        let mut leaf = AttributeSet::new();
        leaf.put_str(Tag(0x0008, 0x0070), VR::LO, "DEEP");
        let mut current = leaf;
        for _ in 0..10_000 {
            let mut parent = AttributeSet::new();
            parent.put_sequence(Tag(0x0040, 0xA730), vec![current]);
            current = parent;
        }

        let mut doc = Document::new();
        let text = Extractor::new(&dictionary).flatten(&current, &mut doc, false);
        // "ContentSequence_" is 16 bytes: 32 levels fit within 512.
        assert_eq!(text.len(), 33);
        assert!(!text.contains("DEEP"));
        assert_eq!(doc.count("ContentSequence"), 33);

        // Dropping deeply nested sets recursively would overflow the stack.
        let mut pending = vec![current];
        while let Some(mut set) = pending.pop() {
            if let Some(element) = set.remove(Tag(0x0040, 0xA730)) {
                if let crate::dicom::attribute::Value::Sequence(items) = element.value {
                    pending.extend(items);
                }
            }
        }
    }
}
