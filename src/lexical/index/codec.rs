//! Binary segment encoding.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic "MIXS" | version u32
//! doc_count u32 | per doc: field_count u32, per field: name, value
//! term_field_count u32 | per field: name, term_count u32,
//!     per term: term, posting_count u32, per posting: doc u32, freq u32, positions u32*
//! point_field_count u32 | per field: name, count u32, per point: value f32, doc u32
//! crc32 u32 over everything above
//! ```
//!
//! Strings and blobs are written as a `u32` length followed by the bytes.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{MedIndexError, Result};
use crate::lexical::core::FieldValue;
use crate::lexical::index::segment::{Posting, Segment};

const MAGIC: &[u8; 4] = b"MIXS";
const VERSION: u32 = 1;

/// Serialize a segment.
pub fn encode_segment(segment: &Segment) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_all(MAGIC)?;
    buf.write_u32::<LittleEndian>(VERSION)?;

    write_len(&mut buf, segment.stored.len())?;
    for fields in &segment.stored {
        write_len(&mut buf, fields.len())?;
        for (name, value) in fields {
            write_str(&mut buf, name)?;
            write_value(&mut buf, value)?;
        }
    }

    write_len(&mut buf, segment.terms.len())?;
    for (field, dictionary) in &segment.terms {
        write_str(&mut buf, field)?;
        write_len(&mut buf, dictionary.len())?;
        for (term, postings) in dictionary {
            write_str(&mut buf, term)?;
            write_len(&mut buf, postings.len())?;
            for posting in postings {
                buf.write_u32::<LittleEndian>(posting.doc)?;
                write_len(&mut buf, posting.positions.len())?;
                for position in &posting.positions {
                    buf.write_u32::<LittleEndian>(*position)?;
                }
            }
        }
    }

    write_len(&mut buf, segment.points.len())?;
    for (field, points) in &segment.points {
        write_str(&mut buf, field)?;
        write_len(&mut buf, points.len())?;
        for (value, doc) in points {
            buf.write_f32::<LittleEndian>(*value)?;
            buf.write_u32::<LittleEndian>(*doc)?;
        }
    }

    let checksum = crc32fast::hash(&buf);
    buf.write_u32::<LittleEndian>(checksum)?;
    Ok(buf)
}

/// Deserialize a segment, verifying its checksum.
pub fn decode_segment(name: &str, bytes: &[u8]) -> Result<Segment> {
    if bytes.len() < MAGIC.len() + 8 {
        return Err(MedIndexError::index(format!("segment {name} is truncated")));
    }
    let (body, footer) = bytes.split_at(bytes.len() - 4);
    let expected = Cursor::new(footer).read_u32::<LittleEndian>()?;
    if crc32fast::hash(body) != expected {
        return Err(MedIndexError::index(format!(
            "segment {name} failed checksum verification"
        )));
    }

    decode_body(name, body).map_err(|e| match e {
        MedIndexError::Io(io) => MedIndexError::index(format!("segment {name} is malformed: {io}")),
        other => other,
    })
}

fn decode_body(name: &str, body: &[u8]) -> Result<Segment> {
    let mut input = Cursor::new(body);

    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(MedIndexError::index(format!("segment {name} has a bad magic")));
    }
    let version = input.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(MedIndexError::index(format!(
            "segment {name} has unsupported version {version}"
        )));
    }

    let mut segment = Segment {
        name: name.to_string(),
        ..Default::default()
    };

    let doc_count = read_len(&mut input)?;
    for _ in 0..doc_count {
        let field_count = read_len(&mut input)?;
        let mut fields = Vec::with_capacity(field_count.min(1024));
        for _ in 0..field_count {
            let field = read_str(&mut input)?;
            let value = read_value(&mut input)?;
            fields.push((field, value));
        }
        segment.stored.push(fields);
    }

    let field_count = read_len(&mut input)?;
    for _ in 0..field_count {
        let field = read_str(&mut input)?;
        let dictionary = segment.terms.entry(field).or_default();
        let term_count = read_len(&mut input)?;
        for _ in 0..term_count {
            let term = read_str(&mut input)?;
            let posting_count = read_len(&mut input)?;
            let mut postings = Vec::with_capacity(posting_count.min(1024));
            for _ in 0..posting_count {
                let doc = input.read_u32::<LittleEndian>()?;
                check_doc(name, doc, doc_count)?;
                let freq = read_len(&mut input)?;
                let mut positions = Vec::with_capacity(freq.min(1024));
                for _ in 0..freq {
                    positions.push(input.read_u32::<LittleEndian>()?);
                }
                postings.push(Posting { doc, positions });
            }
            dictionary.insert(term, postings);
        }
    }

    let field_count = read_len(&mut input)?;
    for _ in 0..field_count {
        let field = read_str(&mut input)?;
        let count = read_len(&mut input)?;
        let mut points = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let value = input.read_f32::<LittleEndian>()?;
            let doc = input.read_u32::<LittleEndian>()?;
            check_doc(name, doc, doc_count)?;
            points.push((value, doc));
        }
        segment.points.insert(field, points);
    }

    if (input.position() as usize) != body.len() {
        return Err(MedIndexError::index(format!(
            "segment {name} has trailing data"
        )));
    }

    Ok(segment)
}

fn check_doc(name: &str, doc: u32, doc_count: usize) -> Result<()> {
    if doc as usize >= doc_count {
        return Err(MedIndexError::index(format!(
            "segment {name} references document {doc} beyond {doc_count}"
        )));
    }
    Ok(())
}

fn write_len<W: Write>(out: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| MedIndexError::index(format!("length {len} does not fit in a segment")))?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn read_len<R: Read>(input: &mut R) -> Result<usize> {
    Ok(input.read_u32::<LittleEndian>()? as usize)
}

fn write_bytes<W: Write>(out: &mut W, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.write_all(bytes)?;
    Ok(())
}

fn read_bytes(input: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = read_len(input)?;
    let remaining = input.get_ref().len() as u64 - input.position();
    if len as u64 > remaining {
        return Err(MedIndexError::index("string length exceeds segment size"));
    }
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_str<W: Write>(out: &mut W, s: &str) -> Result<()> {
    write_bytes(out, s.as_bytes())
}

fn read_str(input: &mut Cursor<&[u8]>) -> Result<String> {
    String::from_utf8(read_bytes(input)?)
        .map_err(|e| MedIndexError::index(format!("invalid UTF-8 in segment: {e}")))
}

fn write_value<W: Write>(out: &mut W, value: &FieldValue) -> Result<()> {
    out.write_u8(value.type_tag())?;
    match value {
        FieldValue::Text(s) => write_str(out, s)?,
        FieldValue::Numeric(v) => out.write_f32::<LittleEndian>(*v)?,
        FieldValue::Integer(v) => out.write_i64::<LittleEndian>(*v)?,
        FieldValue::Blob(b) => write_bytes(out, b)?,
    }
    Ok(())
}

fn read_value(input: &mut Cursor<&[u8]>) -> Result<FieldValue> {
    let value = match input.read_u8()? {
        0 => FieldValue::Text(read_str(input)?),
        1 => FieldValue::Numeric(input.read_f32::<LittleEndian>()?),
        2 => FieldValue::Integer(input.read_i64::<LittleEndian>()?),
        3 => FieldValue::Blob(read_bytes(input)?),
        tag => {
            return Err(MedIndexError::index(format!("unknown field type tag {tag}")));
        }
    };
    Ok(value)
}
