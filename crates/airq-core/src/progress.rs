use crate::job::TrainingJobId;
use crate::models::ModelFamily;
use crate::target::Target;
use crate::version::VersionTag;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId, records: usize },
    TargetTrained { job_id: TrainingJobId, target: Target, family: ModelFamily, r2: f64 },
    TargetSkipped { job_id: TrainingJobId, target: Target, reason: String },
    Persisted { job_id: TrainingJobId, version: VersionTag },
    Finished { job_id: TrainingJobId, trained: usize },
    Failed { job_id: TrainingJobId, error: String },
    Cancelled { job_id: TrainingJobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Renders progress as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id, records } => info!(job = %job_id, records, "Training started"),
            ProgressEvent::TargetTrained { job_id, target, family, r2 } => {
                info!(job = %job_id, target = %target, family = %family, r2, "Target trained");
            }
            ProgressEvent::TargetSkipped { job_id, target, reason } => {
                warn!(job = %job_id, target = %target, reason = %reason, "Target skipped");
            }
            ProgressEvent::Persisted { job_id, version } => info!(job = %job_id, version = %version, "Model bank saved"),
            ProgressEvent::Finished { job_id, trained } => info!(job = %job_id, trained, "Training finished"),
            ProgressEvent::Failed { job_id, error } => warn!(job = %job_id, error = %error, "Training failed"),
            ProgressEvent::Cancelled { job_id } => info!(job = %job_id, "Training cancelled"),
        }
    }
}

/// Forwards events to an async receiver. Events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
