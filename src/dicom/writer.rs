//! DICOM Part 10 encoding, explicit VR little endian.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::attribute::{AttributeSet, Element, Value};
use super::reader::EXPLICIT_VR_LITTLE_ENDIAN;
use super::tag::Tag;
use super::vr::VR;
use crate::error::Result;

/// Implementation Class UID written into the file meta group.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.138449176201926380374313358283372532117";

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Write `set` as a Part 10 file: preamble, `DICM`, meta group, dataset.
///
/// The meta group is rebuilt from the dataset; any group 0002 attributes in
/// `set` are ignored.
pub fn write_file<W: Write>(set: &AttributeSet, mut out: W) -> Result<()> {
    let uid = |tag: Tag| {
        set.get(tag)
            .and_then(|e| e.bytes())
            .map(|b| b.to_vec())
            .unwrap_or_default()
    };
    let mut meta = AttributeSet::new();
    meta.put_bytes(Tag::FILE_META_VERSION, VR::OB, vec![0, 1])
        .put_bytes(Tag::MEDIA_STORAGE_SOP_CLASS_UID, VR::UI, uid(Tag::SOP_CLASS_UID))
        .put_bytes(
            Tag::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            uid(Tag::SOP_INSTANCE_UID),
        )
        .put_str(Tag::TRANSFER_SYNTAX_UID, VR::UI, EXPLICIT_VR_LITTLE_ENDIAN)
        .put_str(Tag::IMPLEMENTATION_CLASS_UID, VR::UI, IMPLEMENTATION_CLASS_UID);

    let mut meta_bytes = Vec::new();
    for element in meta.iter() {
        write_element(&mut meta_bytes, element)?;
    }

    out.write_all(&[0u8; 128])?;
    out.write_all(b"DICM")?;
    let mut group_length = AttributeSet::new();
    group_length.put_u32(Tag::FILE_META_GROUP_LENGTH, meta_bytes.len() as u32);
    for element in group_length.iter() {
        write_element(&mut out, element)?;
    }
    out.write_all(&meta_bytes)?;
    write_dataset(set, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Write the non-meta attributes of `set` as an explicit VR LE dataset.
pub fn write_dataset<W: Write>(set: &AttributeSet, out: &mut W) -> Result<()> {
    for element in set.iter().filter(|e| !e.tag.is_file_meta()) {
        write_element(out, element)?;
    }
    Ok(())
}

fn write_element<W: Write>(out: &mut W, element: &Element) -> Result<()> {
    out.write_u16::<LittleEndian>(element.tag.group())?;
    out.write_u16::<LittleEndian>(element.tag.element())?;
    match &element.value {
        Value::Sequence(items) => {
            out.write_all(VR::SQ.as_str().as_bytes())?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(UNDEFINED_LENGTH)?;
            for item in items {
                write_delimiter(out, Tag::ITEM, UNDEFINED_LENGTH)?;
                write_dataset(item, out)?;
                write_delimiter(out, Tag::ITEM_DELIMITATION, 0)?;
            }
            write_delimiter(out, Tag::SEQUENCE_DELIMITATION, 0)?;
        }
        Value::Bytes(bytes) => {
            let padded = bytes.len() % 2 == 1;
            let len = bytes.len() + padded as usize;
            out.write_all(element.vr.as_str().as_bytes())?;
            if element.vr.has_long_header() {
                out.write_u16::<LittleEndian>(0)?;
                out.write_u32::<LittleEndian>(len as u32)?;
            } else {
                out.write_u16::<LittleEndian>(len as u16)?;
            }
            out.write_all(bytes)?;
            if padded {
                out.write_u8(element.vr.padding())?;
            }
        }
    }
    Ok(())
}

fn write_delimiter<W: Write>(out: &mut W, tag: Tag, len: u32) -> Result<()> {
    out.write_u16::<LittleEndian>(tag.group())?;
    out.write_u16::<LittleEndian>(tag.element())?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}
