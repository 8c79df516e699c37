//! Air-quality estimation core
//!
//! Turns multi-source environmental observations into per-pollutant estimates:
//! - Assembling feature tables from partial records (`FeatureAssembler`)
//! - Training one tree-ensemble regressor per target (`Trainer`)
//! - Persisting immutable, versioned model banks (`ArtifactStore`)
//! - Serving predictions from a shared snapshot (`AirQualityService`)

pub mod bank;
pub mod buffer;
pub mod config;
pub mod error;
pub mod features;
pub mod job;
pub mod layout;
pub mod models;
pub mod predictor;
pub mod progress;
pub mod record;
pub mod service;
pub mod store;
pub mod target;
pub mod trainer;
pub mod version;

pub use bank::{BankState, ModelBank, ModelSlot, TrainedModel};
pub use buffer::{BufferConfig, ObservationBuffer};
pub use config::AirqConfig;
pub use error::{AirqError, AirqResult};
pub use features::{ConditionEncoding, FeatureAssembler, FeatureSchema, FeatureTable, FeatureVector};
pub use job::{TrainerStatus, TrainingJobId};
pub use layout::ArtifactLayout;
pub use models::{ModelFamily, Regressor};
pub use predictor::{Prediction, Predictor};
pub use progress::{ChannelProgressSink, ProgressEvent, ProgressSink, TracingProgressSink};
pub use record::{
    compute_batch_id, read_json_record, read_jsonl_records, write_jsonl_records, Location, ObservationRecord,
    PollutionReading, SatelliteAtmospheric, SatelliteSurface, WeatherBlock,
};
pub use service::{AirQualityService, ModelInfo, TrainingReport};
pub use store::{ArtifactManifest, ArtifactStore};
pub use target::Target;
pub use trainer::{TargetMetrics, Trainer, TrainerConfig, TrainingOutcome};
pub use version::VersionTag;
