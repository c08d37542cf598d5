use crate::error::{PipelineError, Result, Stage};
use crate::ml::classifier::TrainedModel;
use crate::ml::features::FEATURE_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Version of the on-disk envelope layout
pub const ENVELOPE_VERSION: u32 = 1;

/// Sink for fitted models
pub trait ModelStore: Send + Sync {
    /// Persist a model at `path`
    fn save(&self, model: &TrainedModel, path: &Path) -> Result<()>;

    /// Load a model previously written by `save`
    fn load(&self, path: &Path) -> Result<TrainedModel>;
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    envelope_version: u32,
    feature_schema_version: u32,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct Envelope {
    envelope_version: u32,
    feature_schema_version: u32,
    model: TrainedModel,
}

/// Binary model files written with bincode
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeModelStore;

impl BincodeModelStore {
    pub fn new() -> Self {
        Self
    }
}

impl ModelStore for BincodeModelStore {
    fn save(&self, model: &TrainedModel, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let envelope = EnvelopeRef {
            envelope_version: ENVELOPE_VERSION,
            feature_schema_version: model.metadata.feature_schema_version,
            model,
        };
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, &envelope)?;
        writer.flush()?;

        info!(
            family = %model.family(),
            path = %path.display(),
            "Model saved"
        );
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<TrainedModel> {
        let reader = BufReader::new(File::open(path)?);
        let envelope: Envelope = bincode::deserialize_from(reader)?;

        if envelope.envelope_version != ENVELOPE_VERSION {
            return Err(PipelineError::Serialization {
                stage: Stage::Persistence,
                message: format!(
                    "unsupported model file version {}, expected {}",
                    envelope.envelope_version, ENVELOPE_VERSION
                ),
            });
        }
        if envelope.feature_schema_version != FEATURE_SCHEMA_VERSION {
            return Err(PipelineError::Serialization {
                stage: Stage::Persistence,
                message: format!(
                    "model was trained on feature schema {}, this build extracts schema {}",
                    envelope.feature_schema_version, FEATURE_SCHEMA_VERSION
                ),
            });
        }

        info!(
            family = %envelope.model.family(),
            path = %path.display(),
            "Model loaded"
        );
        Ok(envelope.model)
    }
}
