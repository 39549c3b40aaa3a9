pub mod http_client;
pub mod normalize;
pub mod parsers;

use crate::config::SourceConfig;
use crate::models::{RawCardRow, RawEventRow, RawFightPage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use self::http_client::HttpClient;
use self::parsers::{parse_event_card, parse_event_index, parse_fight_page};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable statistics-source abstraction. Implementations return raw rows;
/// normalization and counting stay with the pipeline.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_event_index(&self) -> Result<Vec<RawEventRow>>;
    async fn fetch_event_card(&self, event_id: &str) -> Result<Vec<RawCardRow>>;
    async fn fetch_fight_page(&self, fight_id: &str) -> Result<RawFightPage>;
}

// ── ufcstats scraper ──────────────────────────────────────────────────────────

pub struct UfcStatsSource {
    client: HttpClient,
    base_url: String,
}

impl UfcStatsSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL for the completed-events index; `page=all` returns every event in
    /// one response.
    fn index_url(&self) -> String {
        format!("{}/statistics/events/completed?page=all", self.base_url)
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/event-details/{}", self.base_url, event_id)
    }

    fn fight_url(&self, fight_id: &str) -> String {
        format!("{}/fight-details/{}", self.base_url, fight_id)
    }
}

#[async_trait]
impl StatsSource for UfcStatsSource {
    async fn fetch_event_index(&self) -> Result<Vec<RawEventRow>> {
        let url = self.index_url();
        info!("Fetching events index ({})", url);

        let html = self
            .client
            .get_text(&url)
            .await
            .context("Failed to fetch events index")?;

        let rows = parse_event_index(&html)?;
        info!("Events index: {} rows", rows.len());
        Ok(rows)
    }

    async fn fetch_event_card(&self, event_id: &str) -> Result<Vec<RawCardRow>> {
        let url = self.event_url(event_id);
        debug!("Fetching event card: {}", url);

        let html = self
            .client
            .get_text(&url)
            .await
            .with_context(|| format!("Failed to fetch event page for {}", event_id))?;

        let rows = parse_event_card(&html)?;
        debug!("{}: {} card rows", event_id, rows.len());
        Ok(rows)
    }

    async fn fetch_fight_page(&self, fight_id: &str) -> Result<RawFightPage> {
        let url = self.fight_url(fight_id);
        debug!("Fetching fight page: {}", url);

        let html = self
            .client
            .get_text(&url)
            .await
            .with_context(|| format!("Failed to fetch fight page for {}", fight_id))?;

        Ok(parse_fight_page(&html)?)
    }
}
