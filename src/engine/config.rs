use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::PerFieldAnalyzer;
use crate::dicom::{DEFAULT_PREFIX_BUDGET, ModalityPolicy};
use crate::error::{MedIndexError, Result};
use crate::lexical::index::IndexWriterConfig;
use crate::storage::StorageConfig;

/// Configuration for the indexing engine.
///
/// Every field has a default, so a TOML file only needs the settings it
/// changes:
///
/// ```
/// use medindex::engine::config::EngineConfig;
///
/// let config = EngineConfig::from_toml_str(r#"
///     ram_buffer_size_mb = 64.0
///
///     [storage]
///     type = "file"
///     path = "/var/lib/medindex"
///
///     [modalities]
///     enabled = ["CT", "MR"]
/// "#).unwrap();
/// assert_eq!(config.default_field, "others");
/// assert!(config.modalities.is_enabled("CT"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where index files live.
    pub storage: StorageConfig,
    /// RAM buffer bound of the writer, in megabytes.
    pub ram_buffer_size_mb: f64,
    /// Buffered documents that force a segment flush.
    pub max_buffered_docs: usize,
    /// Segment count above which segments are merged at commit.
    pub max_segments: usize,
    /// Segments merged together at a time.
    pub merge_factor: usize,
    /// Field holding the flattened free text; also the query default field.
    pub default_field: String,
    /// Field holding the object URI.
    pub identity_field: String,
    /// Field holding the unique instance identifier.
    pub instance_uid_field: String,
    /// Field holding the byte size of the object.
    pub size_field: String,
    /// Fields indexed as a single untokenized term.
    pub keyword_fields: Vec<String>,
    /// Prefix length at which sequence flattening stops descending.
    pub prefix_budget: usize,
    /// Modalities whose full content is flattened.
    pub modalities: ModalityPolicy,
    /// Tag dictionary file; the built-in dictionary is used when absent.
    pub dictionary_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            storage: StorageConfig::default(),
            ram_buffer_size_mb: 255.0,
            max_buffered_docs: 10_000,
            max_segments: 10,
            merge_factor: 10,
            default_field: "others".to_string(),
            identity_field: "uri".to_string(),
            instance_uid_field: "SOPInstanceUID".to_string(),
            size_field: "FileSize".to_string(),
            keyword_fields: [
                "uri",
                "SOPInstanceUID",
                "SeriesInstanceUID",
                "StudyInstanceUID",
                "SOPClassUID",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            prefix_budget: DEFAULT_PREFIX_BUDGET,
            modalities: ModalityPolicy::default(),
            dictionary_path: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MedIndexError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ram_buffer_size_mb > 0.0) {
            return Err(MedIndexError::invalid_config(
                "ram_buffer_size_mb must be positive",
            ));
        }
        for (name, value) in [
            ("default_field", &self.default_field),
            ("identity_field", &self.identity_field),
            ("instance_uid_field", &self.instance_uid_field),
            ("size_field", &self.size_field),
        ] {
            if value.trim().is_empty() {
                return Err(MedIndexError::invalid_config(format!(
                    "{name} must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Per-field analysis: keyword fields verbatim, everything else through
    /// the standard analyzer. The identity and instance fields are always
    /// keyword fields.
    pub fn analyzer(&self) -> PerFieldAnalyzer {
        let mut fields = self.keyword_fields.clone();
        fields.push(self.identity_field.clone());
        fields.push(self.instance_uid_field.clone());
        PerFieldAnalyzer::with_keyword_fields(fields)
    }

    pub(crate) fn writer_config(&self, analyzer: Arc<PerFieldAnalyzer>) -> IndexWriterConfig {
        IndexWriterConfig {
            ram_buffer_size_mb: self.ram_buffer_size_mb,
            max_buffered_docs: self.max_buffered_docs,
            max_segments: self.max_segments,
            merge_factor: self.merge_factor,
            analyzer,
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn ram_buffer_size_mb(mut self, megabytes: f64) -> Self {
        self.config.ram_buffer_size_mb = megabytes;
        self
    }

    pub fn max_buffered_docs(mut self, docs: usize) -> Self {
        self.config.max_buffered_docs = docs;
        self
    }

    pub fn default_field(mut self, field: impl Into<String>) -> Self {
        self.config.default_field = field.into();
        self
    }

    pub fn keyword_field(mut self, field: impl Into<String>) -> Self {
        self.config.keyword_fields.push(field.into());
        self
    }

    pub fn prefix_budget(mut self, budget: usize) -> Self {
        self.config.prefix_budget = budget;
        self
    }

    pub fn modalities(mut self, policy: ModalityPolicy) -> Self {
        self.config.modalities = policy;
        self
    }

    /// Flatten every modality.
    pub fn index_all_modalities(mut self) -> Self {
        self.config.modalities.index_all = true;
        self
    }

    pub fn deep_search(mut self, enabled: bool) -> Self {
        self.config.modalities.deep_search = enabled;
        self
    }

    pub fn dictionary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dictionary_path = Some(path.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorageConfig;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.ram_buffer_size_mb, 255.0);
        assert_eq!(config.prefix_budget, 512);
        assert_eq!(config.identity_field, "uri");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            default_field = "text"

            [storage]
            type = "file"
            path = "/tmp/medindex"

            [modalities]
            index_all = true
            deep_search = true
            "#,
        )
        .unwrap();
        assert_eq!(config.default_field, "text");
        assert_eq!(
            config.storage,
            StorageConfig::File(FileStorageConfig::new("/tmp/medindex"))
        );
        assert!(config.modalities.flattens("XA"));
        assert!(config.modalities.deep_search);
        assert_eq!(config.max_buffered_docs, 10_000);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EngineConfig::from_toml_str("ram_buffer_size_mb = \"big\"").is_err());
        assert!(EngineConfig::from_toml_str("ram_buffer_size_mb = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("identity_field = \"\"").is_err());
    }

    #[test]
    fn test_builder_and_analyzer() {
        let config = EngineConfig::builder()
            .keyword_field("PatientID")
            .index_all_modalities()
            .build();
        let analyzer = config.analyzer();
        assert_eq!(analyzer.normalize_field("PatientID", "AB-12"), "AB-12");
        assert_eq!(analyzer.normalize_field("uri", "file:/A.dcm"), "file:/A.dcm");
        assert_eq!(analyzer.normalize_field("PatientName", "DALI"), "dali");
    }
}
