use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Event ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Live,
    Completed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Upcoming => write!(f, "upcoming"),
            EventStatus::Live => write!(f, "live"),
            EventStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One fight-card night. `id` is the trailing path segment of the source's
/// event-details link and is the natural key for upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    pub status: EventStatus,
    pub location: Option<String>,
    pub scraped_at: NaiveDateTime,
}

// ── Bout ──────────────────────────────────────────────────────────────────────

/// One scheduled matchup on an event's card. `bout_order` 0 is the main event;
/// red/blue corners follow source row order and never swap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bout {
    pub id: String,
    pub event_id: String,
    pub bout_order: u32,
    pub red_fighter_id: String,
    pub red_fighter_name: String,
    pub blue_fighter_id: String,
    pub blue_fighter_name: String,
    pub weight_class: Option<String>,
    pub scheduled_rounds: u32,
    pub scraped_at: NaiveDateTime,
}

// ── Result ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Red,
    Blue,
    Draw,
    NoContest,
}

/// Graded outcome of a completed bout; keyed by the owning bout's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FightResult {
    pub bout_id: String,
    pub winner: Winner,
    pub method: Option<String>,
    pub round: Option<i64>,
    pub time: Option<String>,
    pub details: Option<String>,
    pub scraped_at: NaiveDateTime,
}

// ── Raw parser rows ───────────────────────────────────────────────────────────

/// One row of the completed-events index table, untyped.
#[derive(Debug, Clone, Default)]
pub struct RawEventRow {
    pub detail_href: Option<String>,
    pub name: Option<String>,
    pub date_text: Option<String>,
    pub location: Option<String>,
}

/// One row of an event page's fight table. Fighter links come in source row
/// order: first = red corner, second = blue. Method/round/time are only
/// populated once the fight has concluded.
#[derive(Debug, Clone, Default)]
pub struct RawCardRow {
    pub fight_href: Option<String>,
    pub red_href: Option<String>,
    pub red_name: Option<String>,
    pub blue_href: Option<String>,
    pub blue_name: Option<String>,
    pub weight_class: Option<String>,
    pub method: Option<String>,
    pub round: Option<String>,
    pub time: Option<String>,
}

/// Outcome data scraped from one fight-details page. `statuses` holds the two
/// per-fighter markers (W/L/D/NC) in block order: first = red, second = blue.
#[derive(Debug, Clone, Default)]
pub struct RawFightPage {
    pub statuses: Vec<String>,
    pub method: Option<String>,
    pub round: Option<String>,
    pub time: Option<String>,
    pub details: Option<String>,
}
