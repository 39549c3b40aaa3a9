//! REST implementation of the sink against the datastore's PostgREST-style
//! interface. Upserts go through `POST /rest/v1/{table}?on_conflict={key}`
//! with `Prefer: resolution=merge-duplicates`; the natural key is probed first
//! so the caller learns whether the write inserted or updated.

use crate::config::DatastoreConfig;
use crate::models::{Bout, Event, EventStatus, FightResult};
use crate::sink::{EventSink, SinkError, UpsertOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

pub struct RestSink {
    http: reqwest::Client,
    base_url: String,
}

impl RestSink {
    pub fn new(config: &DatastoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&config.service_key)
            .context("Datastore service key is not a valid header value")?;
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .context("Datastore service key is not a valid header value")?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build datastore client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn check(resp: reqwest::Response, context: &str) -> Result<reqwest::Response, SinkError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status,
            context: context.to_string(),
            body,
        })
    }

    async fn key_exists(&self, table: &str, key_col: &str, key: &str) -> Result<bool, SinkError> {
        let key_filter = format!("eq.{key}");
        let resp = self
            .http
            .get(self.table_url(table))
            .query(&[
                ("select", key_col),
                (key_col, key_filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let resp = Self::check(resp, &format!("{table} key probe")).await?;
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(!rows.is_empty())
    }

    async fn upsert_row<T: Serialize>(
        &self,
        table: &str,
        key_col: &str,
        key: &str,
        row: &T,
    ) -> Result<UpsertOutcome, SinkError> {
        let existed = self.key_exists(table, key_col, key).await?;

        let resp = self
            .http
            .post(self.table_url(table))
            .query(&[("on_conflict", key_col)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await?;
        Self::check(resp, &format!("{table} upsert {key}")).await?;

        debug!("{} {} {}", table, key, if existed { "updated" } else { "inserted" });
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn select_events(
        &self,
        status: EventStatus,
        order: &str,
        limit: usize,
    ) -> Result<Vec<Event>, SinkError> {
        let status_filter = format!("eq.{status}");
        let limit = limit.to_string();
        let resp = self
            .http
            .get(self.table_url("events"))
            .query(&[
                ("select", "*"),
                ("status", status_filter.as_str()),
                ("order", order),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let resp = Self::check(resp, "events select").await?;
        Ok(resp.json().await?)
    }

    /// Exact row count of a table, via the range-counting headers.
    pub async fn count(&self, table: &str) -> Result<u64, SinkError> {
        let resp = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = Self::check(resp, &format!("{table} count")).await?;

        let malformed = |detail: &str| SinkError::Malformed {
            context: format!("{table} count"),
            detail: detail.to_string(),
        };

        let range = resp
            .headers()
            .get("content-range")
            .ok_or_else(|| malformed("missing content-range header"))?
            .to_str()
            .map_err(|_| malformed("content-range is not valid text"))?;

        range
            .rsplit('/')
            .next()
            .and_then(|total| total.parse().ok())
            .ok_or_else(|| malformed(&format!("unparseable content-range {range:?}")))
    }
}

#[async_trait]
impl EventSink for RestSink {
    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome, SinkError> {
        self.upsert_row("events", "id", &event.id, event).await
    }

    async fn upsert_bout(&self, bout: &Bout) -> Result<UpsertOutcome, SinkError> {
        self.upsert_row("bouts", "id", &bout.id, bout).await
    }

    async fn upsert_result(&self, result: &FightResult) -> Result<UpsertOutcome, SinkError> {
        self.upsert_row("results", "bout_id", &result.bout_id, result)
            .await
    }

    async fn recent_completed_events(&self, limit: usize) -> Result<Vec<Event>, SinkError> {
        self.select_events(EventStatus::Completed, "date.desc", limit)
            .await
    }

    async fn next_upcoming_event(&self) -> Result<Option<Event>, SinkError> {
        let mut events = self
            .select_events(EventStatus::Upcoming, "date.asc", 1)
            .await?;
        Ok(events.pop())
    }

    async fn begin_run(&self, mode: &str) -> Result<i64, SinkError> {
        let resp = self
            .http
            .post(self.table_url("sync_runs"))
            .header("Prefer", "return=representation")
            .json(&json!({
                "mode": mode,
                "status": "running",
                "started_at": Utc::now().naive_utc(),
            }))
            .send()
            .await?;
        let resp = Self::check(resp, "sync_runs insert").await?;

        let rows: Vec<serde_json::Value> = resp.json().await?;
        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| SinkError::Malformed {
                context: "sync_runs insert".to_string(),
                detail: "no id in representation".to_string(),
            })
    }

    async fn finish_run(
        &self,
        run_id: i64,
        events: usize,
        bouts: usize,
        results: usize,
        error: Option<&str>,
    ) -> Result<(), SinkError> {
        let resp = self
            .http
            .patch(self.table_url("sync_runs"))
            .query(&[("id", &format!("eq.{run_id}"))])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "finished_at": Utc::now().naive_utc(),
                "status": if error.is_none() { "success" } else { "error" },
                "events_synced": events,
                "bouts_synced": bouts,
                "results_synced": results,
                "error_msg": error,
            }))
            .send()
            .await?;
        Self::check(resp, "sync_runs update").await?;
        Ok(())
    }
}
