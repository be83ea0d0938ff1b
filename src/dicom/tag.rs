//! DICOM attribute tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MedIndexError, Result};

/// A `(group, element)` attribute tag.
///
/// Ordering follows the numeric value, which is the order attributes appear
/// in an encoded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const FILE_META_GROUP_LENGTH: Tag = Tag(0x0002, 0x0000);
    pub const FILE_META_VERSION: Tag = Tag(0x0002, 0x0001);
    pub const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002, 0x0002);
    pub const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002, 0x0003);
    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
    pub const IMPLEMENTATION_CLASS_UID: Tag = Tag(0x0002, 0x0012);
    pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

    pub fn group(self) -> u16 {
        self.0
    }

    pub fn element(self) -> u16 {
        self.1
    }

    /// Group length tags `(gggg,0000)`.
    pub fn is_group_length(self) -> bool {
        self.1 == 0
    }

    /// Private tags live in odd groups.
    pub fn is_private(self) -> bool {
        self.0 % 2 == 1
    }

    pub fn is_file_meta(self) -> bool {
        self.0 == 0x0002
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl FromStr for Tag {
    type Err = MedIndexError;

    /// Accepts `gggg,eeee`, `(gggg,eeee)` and `ggggeeee` in hexadecimal.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (group, element) = match trimmed.split_once(',') {
            Some((g, e)) => (g.trim(), e.trim()),
            None if trimmed.len() == 8 => trimmed.split_at(4),
            None => return Err(MedIndexError::invalid_argument(format!("invalid tag {s:?}"))),
        };
        let parse = |part: &str| {
            u16::from_str_radix(part, 16)
                .map_err(|e| MedIndexError::invalid_argument(format!("invalid tag {s:?}: {e}")))
        };
        Ok(Tag(parse(group)?, parse(element)?))
    }
}

impl TryFrom<String> for Tag {
    type Error = MedIndexError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        format!("{:04X},{:04X}", tag.0, tag.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("0010,0010".parse::<Tag>().unwrap(), Tag(0x0010, 0x0010));
        assert_eq!("(7FE0,0010)".parse::<Tag>().unwrap(), Tag::PIXEL_DATA);
        assert_eq!("00080018".parse::<Tag>().unwrap(), Tag::SOP_INSTANCE_UID);
        assert!("0010".parse::<Tag>().is_err());
        assert!("zzzz,0010".parse::<Tag>().is_err());
        assert_eq!(Tag(0x0008, 0x0060).to_string(), "(0008,0060)");
    }

    #[test]
    fn test_ordering_and_kinds() {
        assert!(Tag(0x0008, 0x0018) < Tag(0x0010, 0x0010));
        assert!(Tag(0x0009, 0x0010).is_private());
        assert!(Tag(0x0010, 0x0000).is_group_length());
        assert!(Tag::TRANSFER_SYNTAX_UID.is_file_meta());
    }
}
