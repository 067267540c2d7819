//! In-process stores for tests and database-free runs.
//!
//! [`MemoryStore`] implements [`SessionTracker`], [`JobStore`] and
//! [`ItemStore`] over one mutex-guarded state, applying the same session
//! transition rules as the PostgreSQL tracker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use pinrelay_core::session::{Session, Transition};
use pinrelay_core::status::{ItemStatus, JobStatus, SessionStatus, Stage};
use pinrelay_core::types::{new_id, ItemId, JobId, SessionId};
use pinrelay_db::models::item::{Item, NewItem};
use pinrelay_db::models::job::Job;

use crate::error::{StorageError, TrackerError};
use crate::store::{ItemStore, JobStore, Verdict};
use crate::tracker::SessionTracker;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    sessions: HashMap<JobId, Session>,
    /// Items in insertion order.
    items: Vec<Item>,
    /// Stage whose next `advance_stage` call fails with a storage error.
    advance_fault: Option<Stage>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    log_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `append_log` fail with [`StorageError::Unavailable`] until reset.
    pub fn set_log_unavailable(&self, unavailable: bool) {
        self.log_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `advance_stage` call to `stage` fail with
    /// [`StorageError::Unavailable`]. Later calls succeed.
    pub fn fail_next_advance(&self, stage: Stage) {
        self.lock().advance_fault = Some(stage);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(
        &self,
        job_id: JobId,
        decide: impl FnOnce(&Session) -> Result<Transition, pinrelay_core::session::TransitionError>,
    ) -> Result<Session, TrackerError> {
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&job_id)
            .ok_or(TrackerError::NotFound(job_id))?;
        match decide(session).map_err(|source| TrackerError::InvalidTransition { job_id, source })? {
            Transition::Unchanged => {}
            Transition::Changed(next) => session.apply(next),
        }
        Ok(session.clone())
    }
}

#[async_trait]
impl SessionTracker for MemoryStore {
    async fn create(&self, session_id: SessionId, job_id: JobId) -> Result<Session, TrackerError> {
        let mut state = self.lock();
        if state.sessions.contains_key(&job_id) {
            return Err(StorageError::Unavailable(format!("session for job {job_id} already exists")).into());
        }
        let session = Session::new(session_id, job_id);
        state.sessions.insert(job_id, session.clone());
        Ok(session)
    }

    async fn advance_stage(&self, job_id: JobId, stage: Stage) -> Result<Session, TrackerError> {
        {
            let mut state = self.lock();
            if state.advance_fault == Some(stage) {
                state.advance_fault = None;
                return Err(StorageError::Unavailable(format!("advance to {stage} failed")).into());
            }
        }
        self.transition(job_id, |s| s.state().advance_to(stage))
    }

    async fn set_status(&self, job_id: JobId, status: SessionStatus) -> Result<Session, TrackerError> {
        self.transition(job_id, |s| s.state().with_status(status))
    }

    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), TrackerError> {
        if self.log_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("session log is unavailable".into()).into());
        }
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(&job_id)
            .ok_or(TrackerError::NotFound(job_id))?;
        session.log.push(line.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Session, TrackerError> {
        self.lock()
            .sessions
            .get(&job_id)
            .cloned()
            .ok_or(TrackerError::NotFound(job_id))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job_id: JobId, input_text: &str) -> Result<Job, StorageError> {
        let now = Utc::now();
        let job = Job {
            id: job_id,
            input_text: input_text.to_string(),
            status_id: JobStatus::Pending.id(),
            created_at: now,
            updated_at: now,
        };
        self.lock().jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StorageError> {
        Ok(self.lock().jobs.get(&job_id).cloned())
    }

    async fn set_job_status(&self, job_id: JobId, status: JobStatus) -> Result<bool, StorageError> {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        job.status_id = status.id();
        job.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn save_item(&self, job_id: JobId, item: &NewItem) -> Result<Item, StorageError> {
        let mut state = self.lock();
        let now = Utc::now();
        if let Some(existing) = state
            .items
            .iter_mut()
            .find(|i| i.job_id == job_id && i.image_url == item.image_url)
        {
            existing.title = item.title.clone();
            existing.item_url = item.item_url.clone();
            existing.description = item.description.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let stored = Item {
            id: new_id(),
            job_id,
            external_id: item.external_id.clone(),
            title: item.title.clone(),
            image_url: item.image_url.clone(),
            item_url: item.item_url.clone(),
            description: item.description.clone(),
            match_score: None,
            status_id: ItemStatus::Pending.id(),
            explanation: String::new(),
            collected_at: now,
            updated_at: now,
        };
        state.items.push(stored.clone());
        Ok(stored)
    }

    async fn items_for_job(&self, job_id: JobId) -> Result<Vec<Item>, StorageError> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn record_verdict(&self, item_id: ItemId, verdict: &Verdict) -> Result<bool, StorageError> {
        let mut state = self.lock();
        let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) else {
            return Ok(false);
        };
        item.status_id = verdict.status.id();
        item.match_score = Some(verdict.score);
        item.explanation = verdict.explanation.clone();
        item.updated_at = Utc::now();
        Ok(true)
    }
}
