//! Static catalog of known model artifacts

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of model a caller can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Speech-to-text model
    Transcription,
    /// Text summarization model
    Summarization,
}

impl ModelKind {
    /// All kinds, in catalog order
    pub const ALL: [ModelKind; 2] = [ModelKind::Transcription, ModelKind::Summarization];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Summarization => "summarization",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transcription" => Ok(Self::Transcription),
            "summarization" => Ok(Self::Summarization),
            other => Err(format!("Unknown model kind: {}", other)),
        }
    }
}

/// Static description of a downloadable model artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model name (e.g., "whisper-small")
    pub name: String,
    pub kind: ModelKind,
    pub source_url: String,
    /// SHA-256 hex digest; empty means the artifact is unverified
    #[serde(default)]
    pub expected_checksum: String,
    /// Where the artifact lives on disk outside the cache
    pub local_path: PathBuf,
    pub version: String,
    /// Minimum free space needed before downloading
    pub required_bytes: u64,
    #[serde(default)]
    pub description: String,
}

impl ModelDescriptor {
    /// Whether a checksum was declared for this artifact
    pub fn has_checksum(&self) -> bool {
        !self.expected_checksum.is_empty()
    }

    /// Base name of the artifact file, used for cache file naming
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.bin", self.name))
    }
}

/// Read-only registry of model descriptors
///
/// Built once at startup and shared behind an `Arc`. Descriptors are never
/// mutated after construction; lookups hand out clones.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    descriptors: Arc<[ModelDescriptor]>,
}

impl ModelCatalog {
    /// Create a catalog from descriptors, rejecting duplicate names
    ///
    /// Declared checksums are normalized to the lowercase hex that
    /// [`crate::checksum::compute_digest`] produces.
    pub fn new(mut descriptors: Vec<ModelDescriptor>) -> anyhow::Result<Self> {
        let mut names = HashSet::new();
        for descriptor in &mut descriptors {
            descriptor.expected_checksum = descriptor.expected_checksum.trim().to_ascii_lowercase();
        }
        for descriptor in &descriptors {
            if descriptor.name.is_empty() {
                anyhow::bail!("Model name cannot be empty");
            }
            if !names.insert(descriptor.name.as_str()) {
                anyhow::bail!("Duplicate model name in catalog: {}", descriptor.name);
            }
        }

        Ok(Self {
            descriptors: descriptors.into(),
        })
    }

    /// Built-in catalog rooted at `models_dir`
    pub fn builtin(models_dir: &Path) -> Self {
        Self {
            descriptors: builtin_descriptors(models_dir).into(),
        }
    }

    /// All descriptors in catalog order
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.descriptors.to_vec()
    }

    /// First descriptor of the given kind
    pub fn find_by_kind(&self, kind: ModelKind) -> Option<ModelDescriptor> {
        self.descriptors.iter().find(|d| d.kind == kind).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ModelDescriptor> {
        self.descriptors.iter().find(|d| d.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn builtin_descriptors(models_dir: &Path) -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            name: "whisper-small".to_string(),
            kind: ModelKind::Transcription,
            source_url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin"
                .to_string(),
            expected_checksum: String::new(),
            local_path: models_dir.join("whisper").join("ggml-small.bin"),
            version: "1.0".to_string(),
            required_bytes: 500_000_000,
            description: "Whisper Small speech recognition (~460MB)".to_string(),
        },
        ModelDescriptor {
            name: "bart-large-cnn".to_string(),
            kind: ModelKind::Summarization,
            source_url: "https://huggingface.co/facebook/bart-large-cnn/resolve/main/model.safetensors"
                .to_string(),
            expected_checksum: String::new(),
            local_path: models_dir.join("summarization").join("bart-large-cnn.safetensors"),
            version: "1.0".to_string(),
            required_bytes: 1_700_000_000,
            description: "BART Large CNN summarization (~1.6GB)".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, kind: ModelKind) -> ModelDescriptor {
        ModelDescriptor {
            name: name.to_string(),
            kind,
            source_url: format!("http://example.com/{}.bin", name),
            expected_checksum: String::new(),
            local_path: PathBuf::from(format!("/tmp/models/{}.bin", name)),
            version: "1".to_string(),
            required_bytes: 1000,
            description: String::new(),
        }
    }

    #[test]
    fn test_builtin_has_one_model_per_kind() {
        let catalog = ModelCatalog::builtin(Path::new("/tmp/models"));
        for kind in ModelKind::ALL {
            let count = catalog.list().iter().filter(|d| d.kind == kind).count();
            assert_eq!(count, 1, "kind {} should have exactly one model", kind);
        }
    }

    #[test]
    fn test_find_by_kind_returns_first_match() {
        let catalog = ModelCatalog::new(vec![
            descriptor("a", ModelKind::Transcription),
            descriptor("b", ModelKind::Transcription),
        ])
        .unwrap();

        assert_eq!(catalog.find_by_kind(ModelKind::Transcription).unwrap().name, "a");
        assert!(catalog.find_by_kind(ModelKind::Summarization).is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ModelCatalog::new(vec![
            descriptor("same", ModelKind::Transcription),
            descriptor("same", ModelKind::Summarization),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("transcription".parse::<ModelKind>(), Ok(ModelKind::Transcription));
        assert_eq!("Summarization".parse::<ModelKind>(), Ok(ModelKind::Summarization));
        assert!("vision".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::Summarization.to_string(), "summarization");
    }

    #[test]
    fn test_descriptor_file_name() {
        let d = descriptor("whisper", ModelKind::Transcription);
        assert_eq!(d.file_name(), "whisper.bin");
        assert!(!d.has_checksum());
    }

    #[test]
    fn test_checksums_normalized_to_lowercase() {
        let mut d = descriptor("whisper", ModelKind::Transcription);
        d.expected_checksum = "  B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9 ".to_string();
        let mut blank = descriptor("bart", ModelKind::Summarization);
        blank.expected_checksum = "   ".to_string();

        let catalog = ModelCatalog::new(vec![d, blank]).unwrap();

        let whisper = catalog.find_by_name("whisper").unwrap();
        assert_eq!(
            whisper.expected_checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(whisper.has_checksum());
        assert!(!catalog.find_by_name("bart").unwrap().has_checksum());
    }

    #[test]
    fn test_descriptor_json_uses_snake_case_kind() {
        let d = descriptor("whisper", ModelKind::Transcription);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"kind\":\"transcription\""));
    }
}
