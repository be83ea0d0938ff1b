//! DICOM Part 10 decoding.
//!
//! The reader decodes the file meta group and the dataset up to, but not
//! including, the top-level Pixel Data attribute. Everything it returns lives
//! in memory; bulk pixel data is never read.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::attribute::{AttributeSet, Element, Value, ascii_value};
use super::dictionary::TagDictionary;
use super::tag::Tag;
use super::vr::VR;
use crate::error::{MedIndexError, Result};

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

/// Nested sequences deeper than this are rejected.
pub const MAX_DEPTH: usize = 64;

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const PREAMBLE_LENGTH: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Dataset encoding announced by the transfer syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub explicit_vr: bool,
    pub big_endian: bool,
}

impl Encoding {
    pub const EXPLICIT_LE: Encoding = Encoding {
        explicit_vr: true,
        big_endian: false,
    };
    pub const IMPLICIT_LE: Encoding = Encoding {
        explicit_vr: false,
        big_endian: false,
    };
    pub const EXPLICIT_BE: Encoding = Encoding {
        explicit_vr: true,
        big_endian: true,
    };

    pub fn from_transfer_syntax(uid: &str) -> Result<Encoding> {
        match uid {
            IMPLICIT_VR_LITTLE_ENDIAN => Ok(Encoding::IMPLICIT_LE),
            EXPLICIT_VR_BIG_ENDIAN => Ok(Encoding::EXPLICIT_BE),
            DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => Err(MedIndexError::decode(
                "deflated transfer syntax is not supported",
            )),
            // Encapsulated pixel data syntaxes encode the dataset itself as
            // explicit VR little endian.
            _ => Ok(Encoding::EXPLICIT_LE),
        }
    }
}

/// Read a Part 10 file with the built-in dictionary.
pub fn read_file<R: Read>(input: R) -> Result<AttributeSet> {
    read_file_with(input, &TagDictionary::standard())
}

/// Read a Part 10 file, resolving implicit VRs through `dictionary`.
///
/// The returned set holds the file meta attributes as well as the dataset.
pub fn read_file_with<R: Read>(input: R, dictionary: &TagDictionary) -> Result<AttributeSet> {
    let mut source = Source::new(input);
    let head = source.peek(PREAMBLE_LENGTH + MAGIC.len())?.to_vec();
    if head.len() >= PREAMBLE_LENGTH + MAGIC.len() && &head[PREAMBLE_LENGTH..] == MAGIC {
        source.skip(PREAMBLE_LENGTH + MAGIC.len())?;
    } else if head.starts_with(MAGIC) {
        source.skip(MAGIC.len())?;
    } else {
        return Err(MedIndexError::decode("missing DICM prefix"));
    }

    let mut parser = Parser {
        source,
        encoding: Encoding::EXPLICIT_LE,
        dictionary,
        stopped: false,
    };
    let mut set = parser.read_file_meta()?;
    let transfer_syntax = set
        .get(Tag::TRANSFER_SYNTAX_UID)
        .and_then(|e| e.bytes())
        .map(ascii_value);
    parser.encoding = match transfer_syntax {
        Some(uid) => Encoding::from_transfer_syntax(&uid)?,
        None => parser.guess_encoding()?,
    };

    let dataset = parser.read_dataset(Limit::End, 0)?;
    for element in dataset.iter() {
        set.insert(element.clone());
    }
    Ok(set)
}

/// Read a bare dataset in a known encoding, without preamble or meta group.
pub fn read_dataset<R: Read>(
    input: R,
    encoding: Encoding,
    dictionary: &TagDictionary,
) -> Result<AttributeSet> {
    let mut parser = Parser {
        source: Source::new(input),
        encoding,
        dictionary,
        stopped: false,
    };
    parser.read_dataset(Limit::End, 0)
}

#[derive(Debug, Clone, Copy)]
enum Limit {
    End,
    Offset(u64),
    ItemDelimiter,
}

/// A reader with a small lookahead buffer and a byte position.
struct Source<R> {
    inner: R,
    lookahead: Vec<u8>,
    position: u64,
}

impl<R: Read> Source<R> {
    fn new(inner: R) -> Self {
        Source {
            inner,
            lookahead: Vec::new(),
            position: 0,
        }
    }

    /// Up to `n` upcoming bytes; fewer only at end of input.
    fn peek(&mut self, n: usize) -> Result<&[u8]> {
        while self.lookahead.len() < n {
            let mut buf = [0u8; 256];
            let want = (n - self.lookahead.len()).min(buf.len());
            let read = self.inner.read(&mut buf[..want]).map_err(io_error)?;
            if read == 0 {
                break;
            }
            self.lookahead.extend_from_slice(&buf[..read]);
        }
        Ok(&self.lookahead[..n.min(self.lookahead.len())])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let from_lookahead = buf.len().min(self.lookahead.len());
        buf[..from_lookahead].copy_from_slice(&self.lookahead[..from_lookahead]);
        self.lookahead.drain(..from_lookahead);
        self.inner
            .read_exact(&mut buf[from_lookahead..])
            .map_err(io_error)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read exactly `len` bytes without trusting `len` for the allocation.
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(64 * 1024));
        let mut chunk = [0u8; 8192];
        while out.len() < len {
            let n = (len - out.len()).min(chunk.len());
            self.read_exact(&mut chunk[..n])?;
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let mut chunk = [0u8; 8192];
        let mut left = len;
        while left > 0 {
            let n = left.min(chunk.len());
            self.read_exact(&mut chunk[..n])?;
            left -= n;
        }
        Ok(())
    }

    fn at_end(&mut self) -> Result<bool> {
        Ok(self.peek(1)?.is_empty())
    }
}

fn io_error(e: std::io::Error) -> MedIndexError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        MedIndexError::decode("unexpected end of data")
    } else {
        MedIndexError::decode(format!("read failed: {e}"))
    }
}

struct Parser<'d, R> {
    source: Source<R>,
    encoding: Encoding,
    dictionary: &'d TagDictionary,
    stopped: bool,
}

impl<R: Read> Parser<'_, R> {
    fn u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.source.read_exact(&mut buf)?;
        Ok(if self.encoding.big_endian {
            BigEndian::read_u16(&buf)
        } else {
            LittleEndian::read_u16(&buf)
        })
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(if self.encoding.big_endian {
            BigEndian::read_u32(&buf)
        } else {
            LittleEndian::read_u32(&buf)
        })
    }

    fn tag(&mut self) -> Result<Tag> {
        let group = self.u16()?;
        let element = self.u16()?;
        Ok(Tag(group, element))
    }

    /// The meta group is always explicit VR little endian.
    fn read_file_meta(&mut self) -> Result<AttributeSet> {
        let mut meta = AttributeSet::new();
        loop {
            let next = self.source.peek(2)?;
            if next.len() < 2 || LittleEndian::read_u16(next) != 0x0002 {
                break;
            }
            let tag = self.tag()?;
            let (vr, len) = self.explicit_header(tag)?;
            if len == UNDEFINED_LENGTH {
                return Err(MedIndexError::decode(format!(
                    "undefined length in file meta attribute {tag}"
                )));
            }
            let bytes = self.source.read_vec(len as usize)?;
            meta.insert(Element::new(tag, vr, Value::Bytes(bytes)));
        }
        if meta.is_empty() {
            return Err(MedIndexError::decode("missing file meta information"));
        }
        Ok(meta)
    }

    /// Without a transfer syntax, look at the first dataset element: explicit
    /// VR streams carry two upper-case letters after the tag.
    fn guess_encoding(&mut self) -> Result<Encoding> {
        let head = self.source.peek(6)?;
        if head.len() == 6 && VR::from_bytes([head[4], head[5]]).is_some() {
            Ok(Encoding::EXPLICIT_LE)
        } else {
            Ok(Encoding::IMPLICIT_LE)
        }
    }

    fn explicit_header(&mut self, tag: Tag) -> Result<(VR, u32)> {
        let mut code = [0u8; 2];
        self.source.read_exact(&mut code)?;
        let vr = VR::from_bytes(code).ok_or_else(|| {
            MedIndexError::decode(format!(
                "unknown VR {:?} for {tag}",
                String::from_utf8_lossy(&code)
            ))
        })?;
        let len = if vr.has_long_header() {
            self.source.skip(2)?;
            self.u32()?
        } else {
            self.u16()? as u32
        };
        Ok((vr, len))
    }

    fn header(&mut self, tag: Tag) -> Result<(VR, u32)> {
        if self.encoding.explicit_vr {
            self.explicit_header(tag)
        } else {
            let len = self.u32()?;
            let vr = self.dictionary.vr_of(tag).unwrap_or(VR::UN);
            Ok((vr, len))
        }
    }

    fn read_dataset(&mut self, limit: Limit, depth: usize) -> Result<AttributeSet> {
        if depth > MAX_DEPTH {
            return Err(MedIndexError::decode(format!(
                "sequences nested deeper than {MAX_DEPTH}"
            )));
        }
        let mut set = AttributeSet::new();
        loop {
            if self.stopped {
                break;
            }
            match limit {
                Limit::Offset(end) if self.source.position >= end => break,
                Limit::End if self.source.at_end()? => break,
                _ => {}
            }

            let tag = self.tag()?;
            if tag == Tag::ITEM_DELIMITATION {
                self.u32()?;
                match limit {
                    Limit::ItemDelimiter => break,
                    _ => continue,
                }
            }
            if tag.group() == 0xFFFE {
                return Err(MedIndexError::decode(format!(
                    "unexpected delimiter {tag} in dataset"
                )));
            }
            if tag == Tag::PIXEL_DATA && depth == 0 {
                self.stopped = true;
                break;
            }

            let (vr, len) = self.header(tag)?;
            let element = if vr == VR::SQ || (len == UNDEFINED_LENGTH && vr == VR::UN) {
                let items = self.read_items(len, depth + 1)?;
                Element::new(tag, VR::SQ, Value::Sequence(items))
            } else if len == UNDEFINED_LENGTH {
                self.skip_fragments()?;
                Element::new(tag, vr, Value::Bytes(Vec::new()))
            } else {
                let mut bytes = self.source.read_vec(len as usize)?;
                if self.encoding.big_endian {
                    swap_to_little_endian(vr, &mut bytes);
                }
                Element::new(tag, vr, Value::Bytes(bytes))
            };
            set.insert(element);
        }
        Ok(set)
    }

    fn read_items(&mut self, len: u32, depth: usize) -> Result<Vec<AttributeSet>> {
        if depth > MAX_DEPTH {
            return Err(MedIndexError::decode(format!(
                "sequences nested deeper than {MAX_DEPTH}"
            )));
        }
        let end = (len != UNDEFINED_LENGTH).then(|| self.source.position + len as u64);
        let mut items = Vec::new();
        loop {
            if let Some(end) = end {
                if self.source.position >= end {
                    break;
                }
            }
            let tag = self.tag()?;
            let item_len = self.u32()?;
            match tag {
                Tag::ITEM => {
                    let limit = if item_len == UNDEFINED_LENGTH {
                        Limit::ItemDelimiter
                    } else {
                        Limit::Offset(self.source.position + item_len as u64)
                    };
                    items.push(self.read_dataset(limit, depth)?);
                }
                Tag::SEQUENCE_DELIMITATION if end.is_none() => break,
                other => {
                    return Err(MedIndexError::decode(format!(
                        "expected item, found {other}"
                    )));
                }
            }
        }
        Ok(items)
    }

    /// Encapsulated fragments outside the top-level pixel data are skipped.
    fn skip_fragments(&mut self) -> Result<()> {
        loop {
            let tag = self.tag()?;
            let len = self.u32()?;
            match tag {
                Tag::ITEM => self.source.skip(len as usize)?,
                Tag::SEQUENCE_DELIMITATION => return Ok(()),
                other => {
                    return Err(MedIndexError::decode(format!(
                        "expected fragment, found {other}"
                    )));
                }
            }
        }
    }
}

fn swap_to_little_endian(vr: VR, bytes: &mut [u8]) {
    if let Some(unit) = vr.unit_size() {
        for chunk in bytes.chunks_exact_mut(unit) {
            chunk.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::writer::write_file;

    fn sample() -> AttributeSet {
        let mut item = AttributeSet::new();
        item.put_str(Tag(0x0008, 0x1150), VR::UI, "1.2.840.10008.5.1.4.1.1.2")
            .put_str(Tag(0x0008, 0x1155), VR::UI, "1.2.3.4.5");
        let mut set = AttributeSet::new();
        set.put_str(Tag::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.2")
            .put_str(Tag::SOP_INSTANCE_UID, VR::UI, "1.2.3.4.6")
            .put_str(Tag::MODALITY, VR::CS, "CT")
            .put_str(Tag(0x0010, 0x0010), VR::PN, "SALVADOR^DALI")
            .put_u16(Tag(0x0028, 0x0010), 512)
            .put_sequence(Tag(0x0008, 0x1140), vec![item])
            .put_bytes(Tag::PIXEL_DATA, VR::OW, vec![1, 2, 3, 4]);
        set
    }

    #[test]
    fn test_read_written_file() {
        let mut bytes = Vec::new();
        write_file(&sample(), &mut bytes).unwrap();

        let set = read_file(bytes.as_slice()).unwrap();
        assert_eq!(set.sop_instance_uid().unwrap(), "1.2.3.4.6");
        assert_eq!(set.modality().unwrap(), "CT");
        assert_eq!(set.string(Tag(0x0028, 0x0010)).unwrap(), "512");
        assert!(set.contains(Tag::TRANSFER_SYNTAX_UID));
        assert!(!set.contains(Tag::PIXEL_DATA));

        let items = set.get(Tag(0x0008, 0x1140)).unwrap().items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].string(Tag(0x0008, 0x1155)).unwrap(), "1.2.3.4.5");
    }

    #[test]
    fn test_missing_magic() {
        let err = read_file(&b"not a dicom file at all"[..]).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_truncated_file() {
        let mut bytes = Vec::new();
        write_file(&sample(), &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 40);
        let err = read_file(bytes.as_slice()).unwrap_err();
        assert!(err.is_decode());
    }

    fn le_implicit(tag: Tag, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tag.0.to_le_bytes());
        out.extend_from_slice(&tag.1.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_implicit_little_endian_dataset() {
        let mut data = le_implicit(Tag::MODALITY, b"MR");
        data.extend(le_implicit(Tag(0x0028, 0x0011), &256u16.to_le_bytes()));
        data.extend(le_implicit(Tag(0x0009, 0x0010), b"VENDOR"));

        let set = read_dataset(
            data.as_slice(),
            Encoding::IMPLICIT_LE,
            &TagDictionary::standard(),
        )
        .unwrap();
        assert_eq!(set.modality().unwrap(), "MR");
        assert_eq!(set.get(Tag(0x0028, 0x0011)).unwrap().vr, VR::US);
        assert_eq!(set.string(Tag(0x0028, 0x0011)).unwrap(), "256");
        assert_eq!(set.get(Tag(0x0009, 0x0010)).unwrap().vr, VR::UN);
    }

    #[test]
    fn test_explicit_big_endian_dataset() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0028u16.to_be_bytes());
        data.extend_from_slice(&0x0010u16.to_be_bytes());
        data.extend_from_slice(b"US");
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&300u16.to_be_bytes());

        let set = read_dataset(
            data.as_slice(),
            Encoding::EXPLICIT_BE,
            &TagDictionary::standard(),
        )
        .unwrap();
        assert_eq!(set.string(Tag(0x0028, 0x0010)).unwrap(), "300");
    }

    #[test]
    fn test_undefined_length_sequence_and_items() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0008u16.to_le_bytes());
        data.extend_from_slice(&0x1140u16.to_le_bytes());
        data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        data.extend_from_slice(&0xE000u16.to_le_bytes());
        data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        data.extend(le_implicit(Tag(0x0008, 0x1155), b"1.2.3\0"));
        data.extend(le_implicit(Tag::ITEM_DELIMITATION, b""));
        data.extend(le_implicit(Tag::SEQUENCE_DELIMITATION, b""));
        data.extend(le_implicit(Tag::MODALITY, b"CT"));

        let set = read_dataset(
            data.as_slice(),
            Encoding::IMPLICIT_LE,
            &TagDictionary::standard(),
        )
        .unwrap();
        let items = set.get(Tag(0x0008, 0x1140)).unwrap().items().unwrap();
        assert_eq!(items[0].string(Tag(0x0008, 0x1155)).unwrap(), "1.2.3");
        assert_eq!(set.modality().unwrap(), "CT");
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = Vec::new();
        for _ in 0..(MAX_DEPTH + 2) {
            data.extend_from_slice(&0x0040u16.to_le_bytes());
            data.extend_from_slice(&0xA730u16.to_le_bytes());
            data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
            data.extend_from_slice(&0xFFFEu16.to_le_bytes());
            data.extend_from_slice(&0xE000u16.to_le_bytes());
            data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        }
        let err = read_dataset(
            data.as_slice(),
            Encoding::IMPLICIT_LE,
            &TagDictionary::standard(),
        )
        .unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_transfer_syntaxes() {
        assert_eq!(
            Encoding::from_transfer_syntax(IMPLICIT_VR_LITTLE_ENDIAN).unwrap(),
            Encoding::IMPLICIT_LE
        );
        assert_eq!(
            Encoding::from_transfer_syntax("1.2.840.10008.1.2.4.50").unwrap(),
            Encoding::EXPLICIT_LE
        );
        assert!(Encoding::from_transfer_syntax(DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN).is_err());
    }
}
