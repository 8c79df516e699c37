//! The core-facing contract: train, predict, load and feature importance.
//!
//! The service owns the only [`ModelSlot`]. Training runs one at a time on the
//! blocking pool, builds a complete bank in isolation, persists it, then swaps
//! it in. Predictions always read a whole snapshot.

use crate::bank::{BankState, ModelBank, ModelSlot};
use crate::config::AirqConfig;
use crate::error::{AirqError, AirqResult};
use crate::job::{TrainerStatus, TrainingJobId};
use crate::predictor::{Prediction, Predictor};
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink};
use crate::record::ObservationRecord;
use crate::store::{ArtifactManifest, ArtifactStore};
use crate::target::Target;
use crate::trainer::{TargetMetrics, Trainer};
use crate::version::VersionTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What a finished training run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub job_id: TrainingJobId,
    /// `None` when no target had enough data and nothing was saved.
    pub version: Option<VersionTag>,
    pub metrics: BTreeMap<Target, TargetMetrics>,
    pub skipped: BTreeMap<Target, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: Option<VersionTag>,
    pub trained_at: Option<DateTime<Utc>>,
    pub samples: usize,
    pub targets: Vec<Target>,
    pub feature_count: usize,
    pub state: BankState,
    pub metrics: BTreeMap<Target, TargetMetrics>,
}

/// Finished jobs kept for status queries; older ones are forgotten.
const RETAINED_JOBS: usize = 32;

#[derive(Debug)]
struct JobEntry {
    status: TrainerStatus,
    cancel: Arc<AtomicBool>,
    report: Option<TrainingReport>,
}

/// Live jobs plus the most recent [`RETAINED_JOBS`] finished ones.
#[derive(Debug, Default)]
struct JobLedger {
    entries: HashMap<TrainingJobId, JobEntry>,
    finished: VecDeque<TrainingJobId>,
}

impl JobLedger {
    fn register(&mut self, job_id: &TrainingJobId, cancel: Arc<AtomicBool>) {
        self.entries.insert(job_id.clone(), JobEntry { status: TrainerStatus::Preparing, cancel, report: None });
    }

    fn set_status(&mut self, job_id: &TrainingJobId, status: TrainerStatus) {
        if let Some(entry) = self.entries.get_mut(job_id) {
            entry.status = status;
        }
    }

    fn finish(&mut self, job_id: &TrainingJobId, status: TrainerStatus, report: Option<TrainingReport>) {
        let Some(entry) = self.entries.get_mut(job_id) else {
            return;
        };
        entry.status = status;
        entry.report = report;
        self.finished.push_back(job_id.clone());

        while self.finished.len() > RETAINED_JOBS {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

pub struct AirQualityService {
    store: ArtifactStore,
    trainer: Trainer,
    slot: ModelSlot,
    train_lock: tokio::sync::Mutex<()>,
    jobs: Mutex<JobLedger>,
    progress: Arc<dyn ProgressSink>,
}

impl AirQualityService {
    #[must_use]
    pub fn new(store: ArtifactStore, trainer: Trainer) -> Self {
        Self {
            store,
            trainer,
            slot: ModelSlot::default(),
            train_lock: tokio::sync::Mutex::new(()),
            jobs: Mutex::new(JobLedger::default()),
            progress: Arc::new(TracingProgressSink),
        }
    }

    pub fn from_config(config: &AirqConfig) -> AirqResult<Self> {
        let trainer = Trainer::new(config.trainer.clone())?;
        Ok(Self::new(ArtifactStore::new(config.artifact_root.clone()), trainer))
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<ModelBank> {
        self.slot.snapshot()
    }

    fn jobs(&self) -> MutexGuard<'_, JobLedger> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, job_id: &TrainingJobId) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.jobs().register(job_id, Arc::clone(&cancel));
        cancel
    }

    /// Train on `records`, persist a new version and publish it.
    ///
    /// Returns per-target metrics; targets without enough data are listed under `skipped`.
    pub async fn train(&self, records: Vec<ObservationRecord>) -> AirqResult<TrainingReport> {
        let job_id = TrainingJobId::new();
        let cancel = self.register(&job_id);
        self.run_job(job_id, records, cancel).await
    }

    /// Start training in the background. Observe it through [`Self::status`] or the progress sink.
    pub fn spawn_training(self: &Arc<Self>, records: Vec<ObservationRecord>) -> TrainingJobId {
        let job_id = TrainingJobId::new();
        let cancel = self.register(&job_id);
        let this = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_job(id.clone(), records, cancel).await {
                debug!(job = %id, error = %err, "Background training ended without a new version");
            }
        });
        job_id
    }

    /// Train on `existing ++ new`.
    pub async fn retrain_with_new_data(
        &self,
        new: Vec<ObservationRecord>,
        existing: Option<Vec<ObservationRecord>>,
    ) -> AirqResult<TrainingReport> {
        let mut records = existing.unwrap_or_default();
        info!(existing = records.len(), new = new.len(), "Retraining with new data");
        records.extend(new);
        self.train(records).await
    }

    async fn run_job(
        &self,
        job_id: TrainingJobId,
        records: Vec<ObservationRecord>,
        cancel: Arc<AtomicBool>,
    ) -> AirqResult<TrainingReport> {
        let _writer = self.train_lock.lock().await;

        let result = if cancel.load(Ordering::SeqCst) {
            Err(AirqError::Cancelled)
        } else {
            self.jobs().set_status(&job_id, TrainerStatus::Running);
            self.train_blocking(&job_id, records, Arc::clone(&cancel)).await
        };

        match result {
            Ok((bank, report)) => {
                if let Some(bank) = bank {
                    self.slot.replace(bank);
                }
                self.progress.on_event(ProgressEvent::Finished { job_id: job_id.clone(), trained: report.metrics.len() });
                self.jobs().finish(&job_id, TrainerStatus::Finished, Some(report.clone()));
                Ok(report)
            }
            Err(AirqError::Cancelled) => {
                self.jobs().finish(&job_id, TrainerStatus::Cancelled, None);
                self.progress.on_event(ProgressEvent::Cancelled { job_id });
                Err(AirqError::Cancelled)
            }
            Err(err) => {
                self.jobs().finish(&job_id, TrainerStatus::Failed(err.to_string()), None);
                self.progress.on_event(ProgressEvent::Failed { job_id, error: err.to_string() });
                Err(err)
            }
        }
    }

    async fn train_blocking(
        &self,
        job_id: &TrainingJobId,
        records: Vec<ObservationRecord>,
        cancel: Arc<AtomicBool>,
    ) -> AirqResult<(Option<ModelBank>, TrainingReport)> {
        let trainer = self.trainer.clone();
        let store = self.store.clone();
        let progress = Arc::clone(&self.progress);
        let id = job_id.clone();

        tokio::task::spawn_blocking(move || -> AirqResult<(Option<ModelBank>, TrainingReport)> {
            let outcome = trainer.train(&records, &id, progress.as_ref(), &cancel)?;
            let mut report =
                TrainingReport { job_id: id.clone(), version: None, metrics: outcome.metrics, skipped: outcome.skipped };

            if outcome.bank.is_empty() {
                warn!(job = %id, "No target had enough data; nothing saved");
                return Ok((None, report));
            }
            if cancel.load(Ordering::SeqCst) {
                return Err(AirqError::Cancelled);
            }

            let version = fresh_version(&store)?;
            store.save(&outcome.bank, &version)?;
            progress.on_event(ProgressEvent::Persisted { job_id: id, version: version.clone() });

            report.version = Some(version.clone());
            Ok((Some(outcome.bank.with_version(version)), report))
        })
        .await
        .map_err(|e| AirqError::Other(anyhow::anyhow!("training task failed: {e}")))?
    }

    /// Request cancellation. Returns false for unknown or already finished jobs.
    pub fn cancel(&self, job_id: &TrainingJobId) -> bool {
        match self.jobs().entries.get(job_id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.cancel.store(true, Ordering::SeqCst);
                info!(job = %job_id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, job_id: &TrainingJobId) -> TrainerStatus {
        self.jobs().entries.get(job_id).map_or(TrainerStatus::Idle, |e| e.status.clone())
    }

    pub fn report(&self, job_id: &TrainingJobId) -> Option<TrainingReport> {
        self.jobs().entries.get(job_id).and_then(|e| e.report.clone())
    }

    /// Load `version`, or the latest saved version, into the shared slot.
    ///
    /// Returns false when nothing could be loaded (no versions yet, a missing or
    /// corrupt version, or a training run holding the slot).
    pub fn load(&self, version: Option<&VersionTag>) -> bool {
        let Ok(_writer) = self.train_lock.try_lock() else {
            warn!("Training in progress; load skipped");
            return false;
        };

        match self.store.load(version) {
            Ok(Some(bank)) => {
                self.slot.replace(bank);
                true
            }
            Ok(None) => {
                warn!(root = %self.store.layout().root().display(), "No trained models found; train before predicting");
                false
            }
            Err(err) => {
                warn!(error = %err, "Failed to load model bank");
                false
            }
        }
    }

    /// Current snapshot, lazily loading the latest version if nothing is loaded.
    fn predictor(&self) -> Predictor {
        let mut bank = self.slot.snapshot();
        if bank.is_empty() && bank.version().is_none() && self.load(None) {
            bank = self.slot.snapshot();
        }
        Predictor::new(bank)
    }

    /// Non-negative prediction per trained target; empty before any training.
    pub fn predict(&self, record: &ObservationRecord) -> AirqResult<Prediction> {
        self.predictor().predict(record)
    }

    pub fn predict_target(&self, record: &ObservationRecord, target: Target) -> AirqResult<f64> {
        self.predictor().predict_target(record, target)
    }

    pub fn predict_batch(&self, records: &[ObservationRecord]) -> Vec<AirqResult<Prediction>> {
        self.predictor().predict_batch(records)
    }

    /// Features ranked by importance for `target`; empty when it is untrained.
    pub fn feature_importance(&self, target: Target) -> Vec<(String, f64)> {
        self.predictor().bank().feature_importance(target)
    }

    pub fn model_info(&self) -> ModelInfo {
        let bank = self.slot.snapshot();
        ModelInfo {
            version: bank.version().cloned(),
            trained_at: bank.trained_at(),
            samples: bank.samples(),
            targets: bank.targets(),
            feature_count: bank.schema().len(),
            state: bank.state(),
            metrics: bank.metrics(),
        }
    }

    pub fn versions(&self) -> AirqResult<Vec<VersionTag>> {
        self.store.versions()
    }

    pub fn manifests(&self) -> AirqResult<Vec<ArtifactManifest>> {
        self.store.manifests()
    }
}

/// A version tag not yet used in `store`.
fn fresh_version(store: &ArtifactStore) -> AirqResult<VersionTag> {
    for _ in 0..5 {
        let tag = VersionTag::now();
        if !store.layout().version_dir(&tag).exists() {
            return Ok(tag);
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    Err(AirqError::Artifact("could not allocate a fresh version tag".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::TrainerConfig;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> AirQualityService {
        let trainer = Trainer::new(TrainerConfig { n_estimators: 5, ..Default::default() }).unwrap();
        AirQualityService::new(ArtifactStore::new(temp.path().join("models")), trainer)
    }

    #[test]
    fn test_load_without_versions_is_false() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);

        assert!(!svc.load(None));
        assert_eq!(svc.model_info().state, BankState::Empty);
    }

    #[test]
    fn test_unknown_job_status_is_idle() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        let id = TrainingJobId::new();

        assert_eq!(svc.status(&id), TrainerStatus::Idle);
        assert!(!svc.cancel(&id));
    }

    #[tokio::test]
    async fn test_train_with_no_usable_target_saves_nothing() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);

        let report = svc.train(vec![ObservationRecord::default(); 12]).await.unwrap();

        assert!(report.version.is_none());
        assert_eq!(report.skipped.len(), Target::ALL.len());
        assert!(svc.versions().unwrap().is_empty());
    }

    #[test]
    fn test_job_ledger_forgets_oldest_finished_jobs() {
        let mut ledger = JobLedger::default();
        let ids: Vec<TrainingJobId> = (0..=RETAINED_JOBS).map(|_| TrainingJobId::new()).collect();
        let running = TrainingJobId::new();
        ledger.register(&running, Arc::new(AtomicBool::new(false)));

        for id in &ids {
            ledger.register(id, Arc::new(AtomicBool::new(false)));
            ledger.finish(id, TrainerStatus::Finished, None);
        }

        assert!(!ledger.entries.contains_key(&ids[0]));
        assert!(ledger.entries.contains_key(&ids[RETAINED_JOBS]));
        assert!(ledger.entries.contains_key(&running));
        assert_eq!(ledger.entries.len(), RETAINED_JOBS + 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_pruned() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);

        let mut ids = Vec::new();
        for _ in 0..RETAINED_JOBS + 3 {
            ids.push(svc.train(vec![ObservationRecord::default(); 3]).await.unwrap().job_id);
        }

        assert_eq!(svc.status(&ids[0]), TrainerStatus::Idle);
        assert!(svc.report(&ids[0]).is_none());
        assert_eq!(svc.status(&ids[ids.len() - 1]), TrainerStatus::Finished);
        assert!(svc.jobs().entries.len() <= RETAINED_JOBS);
    }

    #[tokio::test]
    async fn test_poisoned_job_ledger_still_tracks_status() {
        let temp = TempDir::new().unwrap();
        let svc = Arc::new(service(&temp));

        let poisoner = Arc::clone(&svc);
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.jobs.lock().unwrap();
            panic!("poison the job ledger");
        })
        .join();
        assert!(joined.is_err());
        assert!(svc.jobs.is_poisoned());

        let report = svc.train(vec![ObservationRecord::default(); 3]).await.unwrap();
        assert_eq!(svc.status(&report.job_id), TrainerStatus::Finished);
        assert_eq!(svc.report(&report.job_id), Some(report));
    }
}
