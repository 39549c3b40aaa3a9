//! Sync orchestrator: ties source → normalization → sink together.
//!
//! ## Run modes
//!
//! `sync_events()` — scrape the full events index, upsert Event rows only.
//!
//! `sync_history(n)` — events first, then for the last `n` completed events
//!   (datastore order, date descending): scrape the card, upsert bouts, then
//!   scrape each concluded bout's detail page and upsert its result.
//!
//! `sync_next()` — scrape the single nearest upcoming event's card, no
//!   results.
//!
//! Per-item failures are tallied and the run continues; only missing
//! configuration and structural parse failures abort. Execution is strictly
//! sequential — the fetcher's politeness delay before every request is the
//! rate limiter.

use crate::config::AppConfig;
use crate::models::Event;
use crate::scraper::normalize::{card_row_to_entry, event_row_to_event, fight_page_to_result};
use crate::scraper::parsers::ParseError;
use crate::scraper::{StatsSource, UfcStatsSource};
use crate::sink::{EventSink, RestSink, UpsertOutcome};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ── Counters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageCounts {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

impl fmt::Display for StageCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} skipped, {} failed",
            self.inserted, self.updated, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncSummary {
    pub events: StageCounts,
    pub bouts: StageCounts,
    pub results: StageCounts,
}

impl SyncSummary {
    pub fn failed_total(&self) -> usize {
        self.events.failed + self.bouts.failed + self.results.failed
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct SyncPipeline {
    source: Arc<dyn StatsSource>,
    sink: Arc<dyn EventSink>,
}

/// Structural parse failures abort the whole run: once the source markup has
/// changed, every remaining extraction would be meaningless.
fn is_structural(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ParseError>().is_some()
}

impl SyncPipeline {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self::with_parts(
            Arc::new(UfcStatsSource::new(&config.source).context("Failed to build scraper")?),
            Arc::new(RestSink::new(&config.datastore).context("Failed to build datastore sink")?),
        ))
    }

    pub fn with_parts(source: Arc<dyn StatsSource>, sink: Arc<dyn EventSink>) -> Self {
        Self { source, sink }
    }

    // ── Modes ─────────────────────────────────────────────────────────────────

    pub async fn sync_events(&self) -> Result<SyncSummary> {
        let run_id = self.begin_run("events").await;

        let mut summary = SyncSummary::default();
        self.events_stage(&mut summary).await?;

        self.finish_run(run_id, &summary).await;
        Ok(summary)
    }

    pub async fn sync_history(&self, count: usize) -> Result<SyncSummary> {
        let run_id = self.begin_run("history").await;

        let mut summary = SyncSummary::default();
        self.events_stage(&mut summary).await?;

        let events = self
            .sink
            .recent_completed_events(count)
            .await
            .context("Selecting completed events failed")?;
        if events.is_empty() {
            bail!("No completed events in the datastore");
        }

        info!(
            "=== Step 2: Syncing cards + results for {} completed events ===",
            events.len()
        );
        for event in &events {
            if let Err(e) = self.card_stage(event, true, &mut summary).await {
                if is_structural(&e) {
                    return Err(e);
                }
                warn!("{}: card sync failed: {:#}", event.id, e);
                summary.bouts.failed += 1;
            }
        }

        self.finish_run(run_id, &summary).await;
        Ok(summary)
    }

    pub async fn sync_next(&self) -> Result<SyncSummary> {
        let run_id = self.begin_run("next").await;

        let event = self
            .sink
            .next_upcoming_event()
            .await
            .context("Selecting next event failed")?;
        let Some(event) = event else {
            bail!("No upcoming event in the datastore — run sync-events first");
        };

        info!("Next event: {} ({})", event.name, event.date);

        let mut summary = SyncSummary::default();
        if let Err(e) = self.card_stage(&event, false, &mut summary).await {
            if is_structural(&e) {
                return Err(e);
            }
            warn!("{}: card sync failed: {:#}", event.id, e);
            summary.bouts.failed += 1;
        }

        self.finish_run(run_id, &summary).await;
        Ok(summary)
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    async fn events_stage(&self, summary: &mut SyncSummary) -> Result<()> {
        info!("=== Step 1: Syncing events index ===");
        let rows = self
            .source
            .fetch_event_index()
            .await
            .context("Events index fetch failed")?;

        let today = Utc::now().date_naive();
        let now = Utc::now().naive_utc();

        for row in &rows {
            let Some(event) = event_row_to_event(row, today, now) else {
                summary.events.skipped += 1;
                continue;
            };
            match self.sink.upsert_event(&event).await {
                Ok(outcome) => summary.events.record(outcome),
                Err(e) => {
                    warn!("event {}: {}", event.id, e);
                    summary.events.failed += 1;
                }
            }
        }

        info!("Events: {}", summary.events);
        Ok(())
    }

    /// Sync one event's card; when `with_results` is set, also grade every
    /// concluded bout from its detail page.
    async fn card_stage(
        &self,
        event: &Event,
        with_results: bool,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let rows = self.source.fetch_event_card(&event.id).await?;
        let now = Utc::now().naive_utc();

        // Re-number as rows normalize so bout_order stays contiguous even if
        // a malformed row drops out.
        let mut entries = Vec::new();
        for row in &rows {
            match card_row_to_entry(row, &event.id, entries.len(), now) {
                Some(entry) => entries.push(entry),
                None => summary.bouts.skipped += 1,
            }
        }

        for entry in &entries {
            match self.sink.upsert_bout(&entry.bout).await {
                Ok(outcome) => summary.bouts.record(outcome),
                Err(e) => {
                    warn!("bout {}: {}", entry.bout.id, e);
                    summary.bouts.failed += 1;
                    continue;
                }
            }

            if with_results && entry.concluded {
                if let Err(e) = self.result_stage(&entry.bout.id, summary).await {
                    if is_structural(&e) {
                        return Err(e);
                    }
                    warn!("result {}: {:#}", entry.bout.id, e);
                    summary.results.failed += 1;
                }
            }
        }

        info!("{}: {} bouts on card", event.id, entries.len());
        Ok(())
    }

    async fn result_stage(&self, bout_id: &str, summary: &mut SyncSummary) -> Result<()> {
        let page = self.source.fetch_fight_page(bout_id).await?;

        let Some(result) = fight_page_to_result(&page, bout_id, Utc::now().naive_utc()) else {
            summary.results.skipped += 1;
            return Ok(());
        };

        match self.sink.upsert_result(&result).await {
            Ok(outcome) => summary.results.record(outcome),
            Err(e) => {
                warn!("result {}: {}", bout_id, e);
                summary.results.failed += 1;
            }
        }
        Ok(())
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    async fn begin_run(&self, mode: &str) -> Option<i64> {
        self.sink
            .begin_run(mode)
            .await
            .map_err(|e| warn!("Run log unavailable: {}", e))
            .ok()
    }

    async fn finish_run(&self, run_id: Option<i64>, summary: &SyncSummary) {
        let Some(run_id) = run_id else { return };
        let failed = summary.failed_total();
        let error = if failed > 0 {
            Some(format!("{} failures", failed))
        } else {
            None
        };
        if let Err(e) = self
            .sink
            .finish_run(
                run_id,
                summary.events.applied(),
                summary.bouts.applied(),
                summary.results.applied(),
                error.as_deref(),
            )
            .await
        {
            warn!("Run log close failed: {}", e);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EventStatus, RawCardRow, RawEventRow, RawFightPage, Winner,
    };
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use chrono::{Days, Utc};
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct StubSource {
        index: Vec<RawEventRow>,
        cards: HashMap<String, Vec<RawCardRow>>,
        fights: HashMap<String, RawFightPage>,
        failing_cards: HashSet<String>,
        structural_cards: bool,
    }

    #[async_trait]
    impl StatsSource for StubSource {
        async fn fetch_event_index(&self) -> Result<Vec<RawEventRow>> {
            Ok(self.index.clone())
        }

        async fn fetch_event_card(&self, event_id: &str) -> Result<Vec<RawCardRow>> {
            if self.structural_cards {
                return Err(ParseError::StructureMissing {
                    anchor: "table.b-fight-details__table",
                }
                .into());
            }
            if self.failing_cards.contains(event_id) {
                bail!("connection reset by peer");
            }
            Ok(self.cards.get(event_id).cloned().unwrap_or_default())
        }

        async fn fetch_fight_page(&self, fight_id: &str) -> Result<RawFightPage> {
            self.fights
                .get(fight_id)
                .cloned()
                .with_context(|| format!("no fight page for {}", fight_id))
        }
    }

    fn event_row(id: &str, date_text: &str) -> RawEventRow {
        RawEventRow {
            detail_href: Some(format!("http://stats.example/event-details/{id}")),
            name: Some(format!("Event {id}")),
            date_text: Some(date_text.to_string()),
            location: Some("Las Vegas, Nevada, USA".to_string()),
        }
    }

    fn card_row(fight: &str, red: &str, blue: &str, concluded: bool) -> RawCardRow {
        RawCardRow {
            fight_href: Some(format!("http://stats.example/fight-details/{fight}")),
            red_href: Some(format!("http://stats.example/fighter-details/{red}")),
            red_name: Some(format!("Red {red}")),
            blue_href: Some(format!("http://stats.example/fighter-details/{blue}")),
            blue_name: Some(format!("Blue {blue}")),
            weight_class: Some("Lightweight".to_string()),
            method: concluded.then(|| "KO/TKO".to_string()),
            round: concluded.then(|| "2".to_string()),
            time: concluded.then(|| "3:14".to_string()),
        }
    }

    fn won_fight(red_status: &str, blue_status: &str) -> RawFightPage {
        RawFightPage {
            statuses: vec![red_status.to_string(), blue_status.to_string()],
            method: Some("KO/TKO".to_string()),
            round: Some("2".to_string()),
            time: Some("3:14".to_string()),
            details: None,
        }
    }

    fn pipeline(source: StubSource, sink: Arc<MemorySink>) -> SyncPipeline {
        SyncPipeline::with_parts(Arc::new(source), sink)
    }

    #[tokio::test]
    async fn full_sync_inserts_wellformed_events_and_skips_the_rest() {
        let source = StubSource {
            index: vec![
                event_row("e1", "January 10, 2015"),
                event_row("e2", "February 07, 2015"),
                event_row("e3", "March 14, 2015"),
                event_row("bad", "to be announced"),
            ],
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));

        let summary = pipeline.sync_events().await.unwrap();

        assert_eq!(summary.events.inserted, 3);
        assert_eq!(summary.events.updated, 0);
        assert_eq!(summary.events.skipped, 1);
        assert_eq!(summary.events.failed, 0);
        assert_eq!(sink.events().await.len(), 3);
        assert_eq!(sink.finished_runs().await, 1);
    }

    #[tokio::test]
    async fn replaying_the_same_sync_updates_instead_of_inserting() {
        let source = StubSource {
            index: vec![
                event_row("e1", "January 10, 2015"),
                event_row("e2", "February 07, 2015"),
                event_row("e3", "March 14, 2015"),
            ],
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));

        let first = pipeline.sync_events().await.unwrap();
        let second = pipeline.sync_events().await.unwrap();

        assert_eq!(first.events.inserted, 3);
        assert_eq!(second.events.inserted, 0);
        assert_eq!(second.events.updated, 3);
        assert_eq!(sink.events().await.len(), 3);
    }

    #[tokio::test]
    async fn history_sync_grades_only_concluded_bouts() {
        let mut source = StubSource {
            index: vec![event_row("e1", "January 10, 2015")],
            ..Default::default()
        };
        source.cards.insert(
            "e1".to_string(),
            vec![
                card_row("f1", "r1", "b1", true),
                card_row("f2", "r2", "b2", true),
                card_row("f3", "r3", "b3", false),
            ],
        );
        source.fights.insert("f1".to_string(), won_fight("W", "L"));
        source.fights.insert("f2".to_string(), won_fight("L", "W"));

        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));

        let summary = pipeline.sync_history(5).await.unwrap();

        assert_eq!(summary.events.inserted, 1);
        assert_eq!(summary.bouts.inserted, 3);
        assert_eq!(summary.results.inserted, 2);
        assert_eq!(summary.failed_total(), 0);

        // Results exist only for the concluded bouts.
        let results = sink.results().await;
        let graded: HashSet<&str> = results.iter().map(|r| r.bout_id.as_str()).collect();
        assert_eq!(graded, HashSet::from(["f1", "f2"]));
        assert!(results
            .iter()
            .any(|r| r.bout_id == "f1" && r.winner == Winner::Red));
        assert!(results
            .iter()
            .any(|r| r.bout_id == "f2" && r.winner == Winner::Blue));
    }

    #[tokio::test]
    async fn bout_order_is_contiguous_and_main_event_goes_five_rounds() {
        let mut source = StubSource {
            index: vec![event_row("e1", "January 10, 2015")],
            ..Default::default()
        };
        source.cards.insert(
            "e1".to_string(),
            vec![
                card_row("f1", "r1", "b1", false),
                // Malformed: no fighter links; dropped without a gap.
                RawCardRow {
                    fight_href: Some("http://stats.example/fight-details/f2".to_string()),
                    ..Default::default()
                },
                card_row("f3", "r3", "b3", false),
            ],
        );

        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));
        let summary = pipeline.sync_history(5).await.unwrap();

        assert_eq!(summary.bouts.inserted, 2);
        assert_eq!(summary.bouts.skipped, 1);

        let mut bouts = sink.bouts().await;
        bouts.sort_by_key(|b| b.bout_order);
        let orders: Vec<u32> = bouts.iter().map(|b| b.bout_order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(bouts[0].id, "f1");
        assert_eq!(bouts[0].scheduled_rounds, 5);
        assert_eq!(bouts[1].scheduled_rounds, 3);
    }

    #[tokio::test]
    async fn one_failing_card_does_not_abort_the_run() {
        let mut source = StubSource {
            index: vec![
                event_row("e1", "January 10, 2015"),
                event_row("e2", "February 07, 2015"),
            ],
            ..Default::default()
        };
        source
            .cards
            .insert("e1".to_string(), vec![card_row("f1", "r1", "b1", false)]);
        source.failing_cards.insert("e2".to_string());

        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));

        let summary = pipeline.sync_history(5).await.unwrap();

        assert_eq!(summary.bouts.inserted, 1);
        assert_eq!(summary.bouts.failed, 1);
        assert_eq!(sink.bouts().await.len(), 1);
    }

    #[tokio::test]
    async fn structural_card_failure_aborts_the_run() {
        let source = StubSource {
            index: vec![event_row("e1", "January 10, 2015")],
            structural_cards: true,
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(source, Arc::clone(&sink));

        let err = pipeline.sync_history(5).await.unwrap_err();
        assert!(is_structural(&err));
    }

    #[tokio::test]
    async fn history_sync_requires_completed_events() {
        let future = (Utc::now().date_naive() + Days::new(30)).format("%B %d, %Y");
        let source = StubSource {
            index: vec![event_row("e1", &future.to_string())],
            ..Default::default()
        };
        let pipeline = pipeline(source, Arc::new(MemorySink::new()));

        assert!(pipeline.sync_history(5).await.is_err());
    }

    #[tokio::test]
    async fn next_sync_targets_the_nearest_upcoming_event_without_results() {
        let future = (Utc::now().date_naive() + Days::new(30)).format("%B %d, %Y");
        let mut source = StubSource {
            index: vec![event_row("e9", &future.to_string())],
            ..Default::default()
        };
        source
            .cards
            .insert("e9".to_string(), vec![card_row("f1", "r1", "b1", false)]);

        let sink = Arc::new(MemorySink::new());
        // Seed the store the way an earlier events sync would have.
        pipeline(
            StubSource {
                index: vec![event_row("e9", &future.to_string())],
                ..Default::default()
            },
            Arc::clone(&sink),
        )
        .sync_events()
        .await
        .unwrap();
        assert_eq!(
            sink.events().await[0].status,
            EventStatus::Upcoming
        );

        let pipeline = pipeline(source, Arc::clone(&sink));
        let summary = pipeline.sync_next().await.unwrap();

        assert_eq!(summary.bouts.inserted, 1);
        assert_eq!(summary.results.applied(), 0);
        assert!(sink.results().await.is_empty());
    }

    #[tokio::test]
    async fn next_sync_without_upcoming_event_is_fatal() {
        let pipeline = pipeline(StubSource::default(), Arc::new(MemorySink::new()));
        assert!(pipeline.sync_next().await.is_err());
    }
}
