//! The tag dictionary: which attributes are indexed, and under what name.
//!
//! Every entry maps a [`Tag`] to an alias (the field name in the index) and
//! the value representation used when the tag appears in an implicit VR
//! dataset. Entries marked `dim` are the structured fields that every indexed
//! document carries; entries marked `other` take part in free-text flattening
//! even when deep search is off.
//!
//! The dictionary is configuration state. [`DictionaryHandle`] holds the
//! current version and can swap in a reloaded one while indexing runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use lazy_static::lazy_static;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::tag::Tag;
use super::vr::VR;
use crate::error::{MedIndexError, Result};

/// One dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    pub tag: Tag,
    pub alias: String,
    pub vr: VR,
    /// Always indexed as a structured field.
    #[serde(default)]
    pub dim: bool,
    /// Eligible for free-text flattening without deep search.
    #[serde(default)]
    pub other: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    tags: Vec<TagEntry>,
}

/// Tag number to alias and indexing policy.
#[derive(Debug, Clone, Default)]
pub struct TagDictionary {
    entries: AHashMap<Tag, TagEntry>,
    dim_fields: Vec<Tag>,
}

// (group, element, alias, vr, dim, other)
type Row = (u16, u16, &'static str, VR, bool, bool);

const STANDARD_TAGS: &[Row] = &[
    (0x0008, 0x0005, "SpecificCharacterSet", VR::CS, false, true),
    (0x0008, 0x0008, "ImageType", VR::CS, false, true),
    (0x0008, 0x0012, "InstanceCreationDate", VR::DA, false, true),
    (0x0008, 0x0013, "InstanceCreationTime", VR::TM, false, true),
    (0x0008, 0x0016, "SOPClassUID", VR::UI, true, false),
    (0x0008, 0x0018, "SOPInstanceUID", VR::UI, true, false),
    (0x0008, 0x0020, "StudyDate", VR::DA, true, false),
    (0x0008, 0x0021, "SeriesDate", VR::DA, true, false),
    (0x0008, 0x0022, "AcquisitionDate", VR::DA, false, true),
    (0x0008, 0x0023, "ContentDate", VR::DA, false, true),
    (0x0008, 0x0030, "StudyTime", VR::TM, true, false),
    (0x0008, 0x0031, "SeriesTime", VR::TM, false, true),
    (0x0008, 0x0032, "AcquisitionTime", VR::TM, false, true),
    (0x0008, 0x0033, "ContentTime", VR::TM, false, true),
    (0x0008, 0x0050, "AccessionNumber", VR::SH, true, false),
    (0x0008, 0x0060, "Modality", VR::CS, true, false),
    (0x0008, 0x0061, "ModalitiesInStudy", VR::CS, false, true),
    (0x0008, 0x0064, "ConversionType", VR::CS, false, true),
    (0x0008, 0x0070, "Manufacturer", VR::LO, false, true),
    (0x0008, 0x0080, "InstitutionName", VR::LO, true, false),
    (0x0008, 0x0081, "InstitutionAddress", VR::ST, false, true),
    (0x0008, 0x0090, "ReferringPhysicianName", VR::PN, false, true),
    (0x0008, 0x0100, "CodeValue", VR::SH, false, true),
    (0x0008, 0x0102, "CodingSchemeDesignator", VR::SH, false, true),
    (0x0008, 0x0104, "CodeMeaning", VR::LO, false, true),
    (0x0008, 0x1010, "StationName", VR::SH, false, true),
    (0x0008, 0x1030, "StudyDescription", VR::LO, true, false),
    (0x0008, 0x103E, "SeriesDescription", VR::LO, true, false),
    (0x0008, 0x1040, "InstitutionalDepartmentName", VR::LO, false, true),
    (0x0008, 0x1050, "PerformingPhysicianName", VR::PN, false, true),
    (0x0008, 0x1060, "NameOfPhysiciansReadingStudy", VR::PN, false, true),
    (0x0008, 0x1070, "OperatorsName", VR::PN, false, true),
    (0x0008, 0x1090, "ManufacturerModelName", VR::LO, false, true),
    (0x0008, 0x1110, "ReferencedStudySequence", VR::SQ, false, true),
    (0x0008, 0x1111, "ReferencedPerformedProcedureStepSequence", VR::SQ, false, true),
    (0x0008, 0x1140, "ReferencedImageSequence", VR::SQ, false, true),
    (0x0008, 0x1150, "ReferencedSOPClassUID", VR::UI, false, true),
    (0x0008, 0x1155, "ReferencedSOPInstanceUID", VR::UI, false, true),
    (0x0008, 0x2111, "DerivationDescription", VR::ST, false, true),
    (0x0010, 0x0010, "PatientName", VR::PN, true, false),
    (0x0010, 0x0020, "PatientID", VR::LO, true, false),
    (0x0010, 0x0030, "PatientBirthDate", VR::DA, true, false),
    (0x0010, 0x0040, "PatientSex", VR::CS, true, false),
    (0x0010, 0x1010, "PatientAge", VR::AS, true, false),
    (0x0010, 0x1020, "PatientSize", VR::DS, false, true),
    (0x0010, 0x1030, "PatientWeight", VR::DS, false, true),
    (0x0018, 0x0010, "ContrastBolusAgent", VR::LO, false, true),
    (0x0018, 0x0015, "BodyPartExamined", VR::CS, false, true),
    (0x0018, 0x0020, "ScanningSequence", VR::CS, false, true),
    (0x0018, 0x0050, "SliceThickness", VR::DS, false, true),
    (0x0018, 0x0060, "KVP", VR::DS, false, true),
    (0x0018, 0x0080, "RepetitionTime", VR::DS, false, true),
    (0x0018, 0x0081, "EchoTime", VR::DS, false, true),
    (0x0018, 0x0087, "MagneticFieldStrength", VR::DS, false, true),
    (0x0018, 0x0088, "SpacingBetweenSlices", VR::DS, false, true),
    (0x0018, 0x1000, "DeviceSerialNumber", VR::LO, false, true),
    (0x0018, 0x1020, "SoftwareVersions", VR::LO, false, true),
    (0x0018, 0x1030, "ProtocolName", VR::LO, false, true),
    (0x0018, 0x1150, "ExposureTime", VR::IS, false, true),
    (0x0018, 0x1151, "XRayTubeCurrent", VR::IS, false, true),
    (0x0018, 0x1152, "Exposure", VR::IS, false, true),
    (0x0018, 0x5100, "PatientPosition", VR::CS, false, true),
    (0x0018, 0x9004, "ContentQualification", VR::CS, false, true),
    (0x0020, 0x000D, "StudyInstanceUID", VR::UI, true, false),
    (0x0020, 0x000E, "SeriesInstanceUID", VR::UI, true, false),
    (0x0020, 0x0010, "StudyID", VR::SH, true, false),
    (0x0020, 0x0011, "SeriesNumber", VR::IS, true, false),
    (0x0020, 0x0012, "AcquisitionNumber", VR::IS, false, true),
    (0x0020, 0x0013, "InstanceNumber", VR::IS, true, false),
    (0x0020, 0x0020, "PatientOrientation", VR::CS, false, true),
    (0x0020, 0x0032, "ImagePositionPatient", VR::DS, false, true),
    (0x0020, 0x0037, "ImageOrientationPatient", VR::DS, false, true),
    (0x0020, 0x0052, "FrameOfReferenceUID", VR::UI, false, true),
    (0x0020, 0x1041, "SliceLocation", VR::DS, false, true),
    (0x0020, 0x4000, "ImageComments", VR::LT, false, true),
    (0x0028, 0x0002, "SamplesPerPixel", VR::US, false, true),
    (0x0028, 0x0004, "PhotometricInterpretation", VR::CS, false, true),
    (0x0028, 0x0008, "NumberOfFrames", VR::IS, false, true),
    (0x0028, 0x0010, "Rows", VR::US, false, true),
    (0x0028, 0x0011, "Columns", VR::US, false, true),
    (0x0028, 0x0030, "PixelSpacing", VR::DS, false, true),
    (0x0028, 0x0100, "BitsAllocated", VR::US, false, true),
    (0x0028, 0x0101, "BitsStored", VR::US, false, true),
    (0x0028, 0x0102, "HighBit", VR::US, false, true),
    (0x0028, 0x0103, "PixelRepresentation", VR::US, false, true),
    (0x0028, 0x1050, "WindowCenter", VR::DS, false, true),
    (0x0028, 0x1051, "WindowWidth", VR::DS, false, true),
    (0x0028, 0x1052, "RescaleIntercept", VR::DS, false, true),
    (0x0028, 0x1053, "RescaleSlope", VR::DS, false, true),
    (0x0032, 0x1060, "RequestedProcedureDescription", VR::LO, false, true),
    (0x0040, 0x0244, "PerformedProcedureStepStartDate", VR::DA, false, true),
    (0x0040, 0x0254, "PerformedProcedureStepDescription", VR::LO, false, true),
    (0x0040, 0x0260, "PerformedProtocolCodeSequence", VR::SQ, false, true),
    (0x0040, 0xA730, "ContentSequence", VR::SQ, false, true),
    (0x0054, 0x0016, "RadiopharmaceuticalInformationSequence", VR::SQ, false, true),
    (0x0054, 0x1001, "Units", VR::CS, false, true),
    (0x7FE0, 0x0010, "PixelData", VR::OW, false, false),
];

lazy_static! {
    static ref STANDARD: Arc<TagDictionary> = Arc::new(TagDictionary::new(
        STANDARD_TAGS
            .iter()
            .map(|&(group, element, alias, vr, dim, other)| TagEntry {
                tag: Tag(group, element),
                alias: alias.to_string(),
                vr,
                dim,
                other,
            })
    ));
}

impl TagDictionary {
    /// Build a dictionary. Later entries for the same tag replace earlier ones.
    pub fn new<I: IntoIterator<Item = TagEntry>>(entries: I) -> Self {
        let mut map = AHashMap::new();
        for entry in entries {
            map.insert(entry.tag, entry);
        }
        let mut dim_fields: Vec<Tag> = map
            .values()
            .filter(|entry| entry.dim)
            .map(|entry| entry.tag)
            .collect();
        dim_fields.sort();
        TagDictionary {
            entries: map,
            dim_fields,
        }
    }

    /// The built-in dictionary of common attributes.
    pub fn standard() -> Arc<TagDictionary> {
        Arc::clone(&STANDARD)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: DictionaryFile = toml::from_str(text)?;
        Ok(Self::new(file.tags))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: DictionaryFile = serde_json::from_str(text)?;
        Ok(Self::new(file.tags))
    }

    /// Load from a `.toml` or `.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MedIndexError::invalid_config(format!(
                "cannot read dictionary {}: {e}",
                path.display()
            ))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Err(MedIndexError::invalid_config(format!(
                "unsupported dictionary format: {}",
                path.display()
            ))),
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&TagEntry> {
        self.entries.get(&tag)
    }

    pub fn alias(&self, tag: Tag) -> Option<&str> {
        self.get(tag).map(|entry| entry.alias.as_str())
    }

    /// VR used for `tag` when the stream does not say.
    pub fn vr_of(&self, tag: Tag) -> Option<VR> {
        if tag.is_group_length() {
            return Some(VR::UL);
        }
        self.get(tag).map(|entry| entry.vr)
    }

    pub fn is_other_field(&self, tag: Tag) -> bool {
        self.get(tag).is_some_and(|entry| entry.other)
    }

    /// Structured fields, in tag order.
    pub fn dim_fields(&self) -> impl Iterator<Item = &TagEntry> {
        self.dim_fields.iter().filter_map(|tag| self.entries.get(tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which modalities get their full content flattened into the free-text field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityPolicy {
    pub enabled: BTreeSet<String>,
    pub index_all: bool,
    pub deep_search: bool,
}

impl ModalityPolicy {
    pub fn is_enabled(&self, modality: &str) -> bool {
        self.enabled.contains(modality.trim())
    }

    /// Whether a record of this modality is flattened at all.
    pub fn flattens(&self, modality: &str) -> bool {
        self.index_all || self.is_enabled(modality)
    }
}

/// Shared, reloadable access to the current dictionary.
#[derive(Debug)]
pub struct DictionaryHandle {
    current: RwLock<Arc<TagDictionary>>,
    source: Option<PathBuf>,
}

impl DictionaryHandle {
    pub fn new(dictionary: Arc<TagDictionary>) -> Self {
        DictionaryHandle {
            current: RwLock::new(dictionary),
            source: None,
        }
    }

    /// A handle that can be reloaded from `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dictionary = TagDictionary::from_file(&path)?;
        Ok(DictionaryHandle {
            current: RwLock::new(Arc::new(dictionary)),
            source: Some(path),
        })
    }

    /// The dictionary in force right now. Callers keep it for a whole item.
    pub fn current(&self) -> Arc<TagDictionary> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, dictionary: Arc<TagDictionary>) {
        *self.current.write() = dictionary;
    }

    /// Re-read the file this handle was loaded from. A handle built in
    /// memory has nothing to reload.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let dictionary = TagDictionary::from_file(path)?;
        info!(
            "reloaded tag dictionary from {} ({} entries)",
            path.display(),
            dictionary.len()
        );
        self.replace(Arc::new(dictionary));
        Ok(())
    }
}

impl Default for DictionaryHandle {
    fn default() -> Self {
        DictionaryHandle::new(TagDictionary::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_dictionary() {
        let dictionary = TagDictionary::standard();
        assert_eq!(dictionary.alias(Tag::SOP_INSTANCE_UID), Some("SOPInstanceUID"));
        assert_eq!(dictionary.vr_of(Tag(0x0028, 0x0010)), Some(VR::US));
        assert_eq!(dictionary.vr_of(Tag(0x0010, 0x0000)), Some(VR::UL));
        assert!(dictionary.is_other_field(Tag(0x0008, 0x0070)));
        assert!(!dictionary.is_other_field(Tag(0x0010, 0x0010)));

        let dims: Vec<Tag> = dictionary.dim_fields().map(|entry| entry.tag).collect();
        assert!(dims.contains(&Tag::MODALITY));
        assert!(dims.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_load_toml() {
        let dictionary = TagDictionary::from_toml_str(
            r#"
            [[tags]]
            tag = "0010,0010"
            alias = "PatientName"
            vr = "PN"
            dim = true

            [[tags]]
            tag = "0008,0070"
            alias = "Manufacturer"
            vr = "LO"
            other = true
            "#,
        )
        .unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.dim_fields().count(), 1);
        assert!(dictionary.is_other_field(Tag(0x0008, 0x0070)));
    }

    #[test]
    fn test_load_json_rejects_bad_tag() {
        let result = TagDictionary::from_json_str(
            r#"{"tags": [{"tag": "00x0,0010", "alias": "X", "vr": "LO"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_handle_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tags.toml");
        std::fs::write(
            &path,
            "[[tags]]\ntag = \"0010,0010\"\nalias = \"PatientName\"\nvr = \"PN\"\n",
        )
        .unwrap();
        let handle = DictionaryHandle::from_file(&path).unwrap();
        let before = handle.current();
        assert_eq!(before.len(), 1);

        std::fs::write(
            &path,
            "[[tags]]\ntag = \"0010,0010\"\nalias = \"Name\"\nvr = \"PN\"\n\
             [[tags]]\ntag = \"0010,0020\"\nalias = \"PatientID\"\nvr = \"LO\"\n",
        )
        .unwrap();
        handle.reload().unwrap();
        assert_eq!(handle.current().len(), 2);
        assert_eq!(handle.current().alias(Tag(0x0010, 0x0010)), Some("Name"));
        // A dictionary already handed out is unaffected.
        assert_eq!(before.alias(Tag(0x0010, 0x0010)), Some("PatientName"));
    }

    #[test]
    fn test_modality_policy() {
        let policy = ModalityPolicy {
            enabled: ["CT".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(policy.flattens("CT "));
        assert!(!policy.flattens("MR"));
        let all = ModalityPolicy {
            index_all: true,
            ..Default::default()
        };
        assert!(all.flattens("MR"));
    }
}
