pub mod rest;

use crate::models::{Bout, Event, EventStatus, FightResult};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

pub use rest::RestSink;

// ── Sink contract ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("datastore request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("datastore returned HTTP {status} for {context}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        context: String,
        body: String,
    },

    #[error("unexpected datastore response for {context}: {detail}")]
    Malformed { context: String, detail: String },
}

/// Write/read surface of the datastore. Upserts resolve on the record's
/// natural key, so replaying a sync is idempotent: the first run inserts,
/// identical re-runs update in place.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome, SinkError>;
    async fn upsert_bout(&self, bout: &Bout) -> Result<UpsertOutcome, SinkError>;
    async fn upsert_result(&self, result: &FightResult) -> Result<UpsertOutcome, SinkError>;

    /// Last `limit` completed events, most recent date first.
    async fn recent_completed_events(&self, limit: usize) -> Result<Vec<Event>, SinkError>;

    /// The nearest upcoming event, if any.
    async fn next_upcoming_event(&self) -> Result<Option<Event>, SinkError>;

    /// Open a row in the run log; failures here must not fail the sync.
    async fn begin_run(&self, mode: &str) -> Result<i64, SinkError>;

    async fn finish_run(
        &self,
        run_id: i64,
        events: usize,
        bouts: usize,
        results: usize,
        error: Option<&str>,
    ) -> Result<(), SinkError>;
}

// ── In-memory sink ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    events: HashMap<String, Event>,
    bouts: HashMap<String, Bout>,
    results: HashMap<String, FightResult>,
    runs_started: i64,
    runs_finished: i64,
}

/// Map-backed sink with the same natural-key semantics as the REST sink.
/// Backs the pipeline tests; no network involved.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.state.lock().await.events.values().cloned().collect()
    }

    pub async fn bouts(&self) -> Vec<Bout> {
        self.state.lock().await.bouts.values().cloned().collect()
    }

    pub async fn results(&self) -> Vec<FightResult> {
        self.state.lock().await.results.values().cloned().collect()
    }

    pub async fn finished_runs(&self) -> i64 {
        self.state.lock().await.runs_finished
    }
}

fn upsert_into<T>(map: &mut HashMap<String, T>, key: String, value: T) -> UpsertOutcome {
    match map.insert(key, value) {
        None => UpsertOutcome::Inserted,
        Some(_) => UpsertOutcome::Updated,
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome, SinkError> {
        let mut state = self.state.lock().await;
        Ok(upsert_into(&mut state.events, event.id.clone(), event.clone()))
    }

    async fn upsert_bout(&self, bout: &Bout) -> Result<UpsertOutcome, SinkError> {
        let mut state = self.state.lock().await;
        Ok(upsert_into(&mut state.bouts, bout.id.clone(), bout.clone()))
    }

    async fn upsert_result(&self, result: &FightResult) -> Result<UpsertOutcome, SinkError> {
        let mut state = self.state.lock().await;
        Ok(upsert_into(
            &mut state.results,
            result.bout_id.clone(),
            result.clone(),
        ))
    }

    async fn recent_completed_events(&self, limit: usize) -> Result<Vec<Event>, SinkError> {
        let state = self.state.lock().await;
        let mut completed: Vec<Event> = state
            .events
            .values()
            .filter(|e| e.status == EventStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.date.cmp(&a.date));
        completed.truncate(limit);
        Ok(completed)
    }

    async fn next_upcoming_event(&self) -> Result<Option<Event>, SinkError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .filter(|e| e.status == EventStatus::Upcoming)
            .min_by_key(|e| e.date)
            .cloned())
    }

    async fn begin_run(&self, _mode: &str) -> Result<i64, SinkError> {
        let mut state = self.state.lock().await;
        state.runs_started += 1;
        Ok(state.runs_started)
    }

    async fn finish_run(
        &self,
        _run_id: i64,
        _events: usize,
        _bouts: usize,
        _results: usize,
        _error: Option<&str>,
    ) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        state.runs_finished += 1;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
