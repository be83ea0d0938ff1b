//! Decoded attribute sets.

use std::collections::BTreeMap;
use std::collections::btree_map;

use byteorder::{ByteOrder, LittleEndian};

use super::charset::{CharacterSet, trim_padding};
use super::tag::Tag;
use super::vr::{VR, VrKind};

/// The value of one attribute.
///
/// Binary values are always held little endian, whatever the byte order of
/// the stream they were read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Sequence(Vec<AttributeSet>),
}

/// One attribute: tag, value representation and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: VR,
    pub value: Value,
}

impl Element {
    pub fn new(tag: Tag, vr: VR, value: Value) -> Self {
        Element { tag, vr, value }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Bytes(bytes) => Some(bytes),
            Value::Sequence(_) => None,
        }
    }

    pub fn items(&self) -> Option<&[AttributeSet]> {
        match &self.value {
            Value::Sequence(items) => Some(items),
            Value::Bytes(_) => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.value, Value::Sequence(_))
    }

    /// Decode the value as indexable text.
    ///
    /// Character data is decoded with `charset` and trimmed. Binary numbers
    /// yield their first value, attribute tags their `(gggg,eeee)` form.
    /// Bulk data and sequences yield `None`.
    pub fn to_text(&self, charset: CharacterSet) -> Option<String> {
        let bytes = self.bytes()?;
        match self.vr.kind() {
            VrKind::Text => Some(charset.decode(bytes)),
            VrKind::BinaryInteger => Some(first_integer(self.vr, bytes)?.to_string()),
            VrKind::BinaryFloat => match self.vr {
                VR::FD if bytes.len() >= 8 => Some(LittleEndian::read_f64(bytes).to_string()),
                VR::FL if bytes.len() >= 4 => Some(LittleEndian::read_f32(bytes).to_string()),
                _ => Some(String::new()),
            },
            VrKind::AttributeTag if bytes.len() >= 4 => Some(
                Tag(
                    LittleEndian::read_u16(bytes),
                    LittleEndian::read_u16(&bytes[2..]),
                )
                .to_string(),
            ),
            VrKind::AttributeTag => Some(String::new()),
            VrKind::Bulk | VrKind::Sequence => None,
        }
    }
}

fn first_integer(vr: VR, bytes: &[u8]) -> Option<i128> {
    if bytes.is_empty() {
        return None;
    }
    let value = match vr {
        VR::US if bytes.len() >= 2 => LittleEndian::read_u16(bytes) as i128,
        VR::SS if bytes.len() >= 2 => LittleEndian::read_i16(bytes) as i128,
        VR::UL if bytes.len() >= 4 => LittleEndian::read_u32(bytes) as i128,
        VR::SL if bytes.len() >= 4 => LittleEndian::read_i32(bytes) as i128,
        VR::UV if bytes.len() >= 8 => LittleEndian::read_u64(bytes) as i128,
        VR::SV if bytes.len() >= 8 => LittleEndian::read_i64(bytes) as i128,
        // Short values: fold whatever bytes are there.
        _ => bytes
            .iter()
            .rev()
            .fold(0i128, |acc, &b| (acc << 8) | b as i128),
    };
    Some(value)
}

/// An ordered map from tag to attribute, possibly nested through sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    elements: BTreeMap<Tag, Element>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element, replacing any element with the same tag.
    pub fn insert(&mut self, element: Element) -> Option<Element> {
        self.elements.insert(element.tag, element)
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    /// Elements in tag order.
    pub fn iter(&self) -> btree_map::Values<'_, Tag, Element> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The repertoire declared by this set's Specific Character Set, if any.
    pub fn declared_charset(&self) -> Option<CharacterSet> {
        let bytes = self.get(Tag::SPECIFIC_CHARACTER_SET)?.bytes()?;
        Some(CharacterSet::from_term(&String::from_utf8_lossy(bytes)))
    }

    pub fn charset(&self) -> CharacterSet {
        self.declared_charset().unwrap_or_default()
    }

    /// Decoded text of an attribute, using this set's declared repertoire.
    pub fn string(&self, tag: Tag) -> Option<String> {
        self.get(tag)?.to_text(self.charset())
    }

    pub fn sop_instance_uid(&self) -> Option<String> {
        self.string(Tag::SOP_INSTANCE_UID)
    }

    pub fn modality(&self) -> Option<String> {
        self.string(Tag::MODALITY)
    }

    /// Put a character value, stored as UTF-8 bytes.
    pub fn put_str(&mut self, tag: Tag, vr: VR, value: &str) -> &mut Self {
        self.insert(Element::new(tag, vr, Value::Bytes(value.as_bytes().to_vec())));
        self
    }

    pub fn put_u16(&mut self, tag: Tag, value: u16) -> &mut Self {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.put_bytes(tag, VR::US, buf.to_vec())
    }

    pub fn put_u32(&mut self, tag: Tag, value: u32) -> &mut Self {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.put_bytes(tag, VR::UL, buf.to_vec())
    }

    pub fn put_f32(&mut self, tag: Tag, value: f32) -> &mut Self {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, value);
        self.put_bytes(tag, VR::FL, buf.to_vec())
    }

    pub fn put_f64(&mut self, tag: Tag, value: f64) -> &mut Self {
        let mut buf = [0u8; 8];
        LittleEndian::write_f64(&mut buf, value);
        self.put_bytes(tag, VR::FD, buf.to_vec())
    }

    pub fn put_bytes(&mut self, tag: Tag, vr: VR, bytes: Vec<u8>) -> &mut Self {
        self.insert(Element::new(tag, vr, Value::Bytes(bytes)));
        self
    }

    pub fn put_sequence(&mut self, tag: Tag, items: Vec<AttributeSet>) -> &mut Self {
        self.insert(Element::new(tag, VR::SQ, Value::Sequence(items)));
        self
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Element;
    type IntoIter = btree_map::Values<'a, Tag, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Text of a raw character value with padding removed, ignoring repertoire.
pub(crate) fn ascii_value(bytes: &[u8]) -> String {
    trim_padding(&String::from_utf8_lossy(bytes)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_and_binary_values() {
        let mut set = AttributeSet::new();
        set.put_str(Tag(0x0010, 0x0010), VR::PN, "SALVADOR^DALI ")
            .put_u16(Tag(0x0028, 0x0010), 512)
            .put_f64(Tag(0x0018, 0x0088), 1.25)
            .put_bytes(Tag(0x0028, 0x0009), VR::AT, vec![0x18, 0x00, 0x63, 0x10])
            .put_bytes(Tag(0x7FE0, 0x0008), VR::OF, vec![0; 8]);

        assert_eq!(set.string(Tag(0x0010, 0x0010)).unwrap(), "SALVADOR^DALI");
        assert_eq!(set.string(Tag(0x0028, 0x0010)).unwrap(), "512");
        assert_eq!(set.string(Tag(0x0018, 0x0088)).unwrap(), "1.25");
        assert_eq!(set.string(Tag(0x0028, 0x0009)).unwrap(), "(0018,1063)");
        assert_eq!(set.string(Tag(0x7FE0, 0x0008)), None);
        assert_eq!(set.string(Tag(0x0010, 0x0020)), None);
    }

    #[test]
    fn test_declared_charset() {
        let mut set = AttributeSet::new();
        assert_eq!(set.declared_charset(), None);
        set.put_str(Tag::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100");
        set.put_bytes(Tag(0x0010, 0x0010), VR::PN, vec![b'M', 0xFC, b'l']);
        assert_eq!(set.charset(), CharacterSet::Latin1);
        assert_eq!(set.string(Tag(0x0010, 0x0010)).unwrap(), "Mül");
    }

    #[test]
    fn test_iteration_is_in_tag_order() {
        let mut set = AttributeSet::new();
        set.put_str(Tag(0x0020, 0x000D), VR::UI, "1.2")
            .put_str(Tag(0x0008, 0x0060), VR::CS, "CT")
            .put_sequence(Tag(0x0008, 0x1140), vec![AttributeSet::new()]);
        let tags: Vec<Tag> = set.iter().map(|e| e.tag).collect();
        assert_eq!(
            tags,
            vec![Tag(0x0008, 0x0060), Tag(0x0008, 0x1140), Tag(0x0020, 0x000D)]
        );
        assert!(set.get(Tag(0x0008, 0x1140)).unwrap().is_sequence());
    }
}
