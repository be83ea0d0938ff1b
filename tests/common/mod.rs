#![allow(dead_code)]

use std::sync::Arc;

use medindex::dicom::write_file;
use medindex::storage::memory::MemoryStorage;
use medindex::{AttributeSet, EngineConfig, IndexEngine, MemoryItem, Tag, VR};

pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
pub const ROWS: Tag = Tag(0x0028, 0x0010);
pub const SLICE_THICKNESS: Tag = Tag(0x0018, 0x0050);
pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);

/// A CT instance with a handful of typed attributes.
pub fn instance(uid: &str, patient: &str, study_date: &str, rows: u16) -> AttributeSet {
    let mut set = AttributeSet::new();
    set.put_str(Tag::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.2")
        .put_str(Tag::SOP_INSTANCE_UID, VR::UI, uid)
        .put_str(Tag::MODALITY, VR::CS, "CT")
        .put_str(PATIENT_NAME, VR::PN, patient)
        .put_str(STUDY_DATE, VR::DA, study_date)
        .put_str(SERIES_NUMBER, VR::IS, "7")
        .put_str(SLICE_THICKNESS, VR::DS, "1.25")
        .put_u16(ROWS, rows);
    set
}

pub fn encode(set: &AttributeSet) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_file(set, &mut bytes).unwrap();
    bytes
}

pub fn item(uri: &str, set: &AttributeSet) -> MemoryItem {
    MemoryItem::new(uri, encode(set))
}

pub fn memory_engine() -> IndexEngine {
    IndexEngine::with_storage(
        Arc::new(MemoryStorage::default()),
        EngineConfig::builder().index_all_modalities().build(),
    )
    .unwrap()
}
