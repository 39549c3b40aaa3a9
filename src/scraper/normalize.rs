//! Raw parser rows → typed records.
//!
//! Every converter returns `Option`: `None` means the row is unusable and the
//! caller skips it. Hard failures never originate here.

use crate::models::{
    Bout, Event, EventStatus, FightResult, RawCardRow, RawEventRow, RawFightPage, Winner,
};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;
use url::Url;

// ── Identifier mapping ────────────────────────────────────────────────────────

/// External id of an event/fighter/fight detail link: the last non-empty path
/// segment of its href. Empty input or a segment-less URL yields `None`.
pub fn id_from_url(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let segment = match Url::parse(href) {
        Ok(url) => url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .next_back()
            .map(str::to_string),
        // Relative hrefs have no base to parse against; split the path by hand.
        Err(_) => href
            .split(['?', '#'])
            .next()
            .unwrap_or(href)
            .split('/')
            .filter(|s| !s.is_empty())
            .next_back()
            .map(str::to_string),
    };

    segment.filter(|s| !s.is_empty())
}

// ── Field parsing ─────────────────────────────────────────────────────────────

/// Parse event dates: "November 16, 2024" (source format), with fallbacks.
pub fn parse_event_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%B %d, %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%b %d, %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }

    None
}

pub fn parse_round(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() || s == "-" || s == "—" {
        return None;
    }
    s.parse().ok()
}

/// The source publishes calendar dates only, so status is derived from the
/// date: future → upcoming, today → live, past → completed. Re-scraping walks
/// an event through the transitions.
pub fn event_status_for(date: NaiveDate, today: NaiveDate) -> EventStatus {
    if date > today {
        EventStatus::Upcoming
    } else if date == today {
        EventStatus::Live
    } else {
        EventStatus::Completed
    }
}

// ── Event row → Event ─────────────────────────────────────────────────────────

pub fn event_row_to_event(row: &RawEventRow, today: NaiveDate, now: NaiveDateTime) -> Option<Event> {
    let href = row.detail_href.as_deref()?;
    let id = id_from_url(href)?;
    let name = row.name.as_deref()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let date_text = row.date_text.as_deref()?;
    let Some(date) = parse_event_date(date_text) else {
        warn!("Unparseable event date {:?} for {}", date_text, id);
        return None;
    };

    Some(Event {
        id,
        name,
        date,
        status: event_status_for(date, today),
        location: row.location.as_deref().map(str::trim).and_then(|s| {
            if s.is_empty() { None } else { Some(s.to_string()) }
        }),
        scraped_at: now,
    })
}

// ── Card row → Bout ───────────────────────────────────────────────────────────

/// A normalized card row plus whether the fight has concluded on the source
/// (method column populated), which decides whether its detail page is worth
/// scraping for a result.
#[derive(Debug, Clone)]
pub struct CardEntry {
    pub bout: Bout,
    pub concluded: bool,
}

pub fn card_row_to_entry(
    row: &RawCardRow,
    event_id: &str,
    index: usize,
    now: NaiveDateTime,
) -> Option<CardEntry> {
    let id = id_from_url(row.fight_href.as_deref()?)?;
    let red_fighter_id = id_from_url(row.red_href.as_deref()?)?;
    let blue_fighter_id = id_from_url(row.blue_href.as_deref()?)?;
    let red_fighter_name = row.red_name.as_deref()?.trim().to_string();
    let blue_fighter_name = row.blue_name.as_deref()?.trim().to_string();
    if red_fighter_name.is_empty() || blue_fighter_name.is_empty() {
        return None;
    }

    let bout = Bout {
        id,
        event_id: event_id.to_string(),
        bout_order: index as u32,
        red_fighter_id,
        red_fighter_name,
        blue_fighter_id,
        blue_fighter_name,
        weight_class: row.weight_class.clone(),
        // The source does not publish scheduled rounds; main events go five.
        scheduled_rounds: if index == 0 { 5 } else { 3 },
        scraped_at: now,
    };

    Some(CardEntry {
        bout,
        concluded: row.method.is_some(),
    })
}

// ── Fight page → FightResult ──────────────────────────────────────────────────

/// Grade a fight page: per-fighter status markers decide the winning corner
/// (first block = red, second = blue); draw and no-contest are global.
pub fn fight_page_to_result(
    page: &RawFightPage,
    bout_id: &str,
    now: NaiveDateTime,
) -> Option<FightResult> {
    let red = page.statuses.first().map(String::as_str).unwrap_or("");
    let blue = page.statuses.get(1).map(String::as_str).unwrap_or("");

    let winner = if red == "D" || blue == "D" {
        Winner::Draw
    } else if red == "NC" || blue == "NC" {
        Winner::NoContest
    } else if red == "W" {
        Winner::Red
    } else if blue == "W" {
        Winner::Blue
    } else {
        warn!("No winner marker on fight page for {}", bout_id);
        return None;
    };

    Some(FightResult {
        bout_id: bout_id.to_string(),
        winner,
        method: page.method.clone(),
        round: page.round.as_deref().and_then(parse_round),
        time: page.time.clone(),
        details: page.details.clone(),
        scraped_at: now,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[test]
    fn test_id_from_url() {
        assert_eq!(
            id_from_url("http://stats.example/event-details/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            id_from_url("http://stats.example/fighter-details/f9/"),
            Some("f9".to_string())
        );
        assert_eq!(
            id_from_url("/fight-details/xyz?tab=totals"),
            Some("xyz".to_string())
        );
        assert_eq!(id_from_url(""), None);
        assert_eq!(id_from_url("http://stats.example/"), None);
    }

    #[test]
    fn test_parse_event_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 16).unwrap();
        assert_eq!(parse_event_date("November 16, 2024"), Some(expected));
        assert_eq!(parse_event_date("Nov 16, 2024"), Some(expected));
        assert_eq!(parse_event_date("2024-11-16"), Some(expected));
        assert_eq!(parse_event_date("sometime soon"), None);
    }

    #[test]
    fn status_follows_the_calendar() {
        let today = NaiveDate::from_ymd_opt(2024, 11, 16).unwrap();
        assert_eq!(
            event_status_for(today + chrono::Days::new(7), today),
            EventStatus::Upcoming
        );
        assert_eq!(event_status_for(today, today), EventStatus::Live);
        assert_eq!(
            event_status_for(today - chrono::Days::new(1), today),
            EventStatus::Completed
        );
    }

    #[test]
    fn event_row_without_date_is_skipped() {
        let row = RawEventRow {
            detail_href: Some("http://stats.example/event-details/e1".into()),
            name: Some("Grand Prix 300".into()),
            date_text: Some("to be announced".into()),
            location: None,
        };
        assert!(event_row_to_event(&row, Utc::now().date_naive(), now()).is_none());
    }

    fn card_row(concluded: bool) -> RawCardRow {
        RawCardRow {
            fight_href: Some("http://stats.example/fight-details/f1".into()),
            red_href: Some("http://stats.example/fighter-details/r1".into()),
            red_name: Some("Alpha Silva".into()),
            blue_href: Some("http://stats.example/fighter-details/b1".into()),
            blue_name: Some("Bravo Jones".into()),
            weight_class: Some("Lightweight".into()),
            method: concluded.then(|| "KO/TKO Punches".into()),
            round: concluded.then(|| "2".into()),
            time: concluded.then(|| "3:14".into()),
        }
    }

    #[test]
    fn main_event_is_scheduled_for_five_rounds() {
        let main = card_row_to_entry(&card_row(true), "e1", 0, now()).unwrap();
        let prelim = card_row_to_entry(&card_row(true), "e1", 4, now()).unwrap();

        assert_eq!(main.bout.scheduled_rounds, 5);
        assert_eq!(main.bout.bout_order, 0);
        assert_eq!(prelim.bout.scheduled_rounds, 3);
        assert_eq!(prelim.bout.bout_order, 4);
    }

    #[test]
    fn corners_follow_row_order() {
        let entry = card_row_to_entry(&card_row(false), "e1", 1, now()).unwrap();
        assert_eq!(entry.bout.red_fighter_id, "r1");
        assert_eq!(entry.bout.blue_fighter_id, "b1");
        assert!(!entry.concluded);
    }

    fn result_page(red: &str, blue: &str) -> RawFightPage {
        RawFightPage {
            statuses: vec![red.to_string(), blue.to_string()],
            method: Some("Decision - Unanimous".into()),
            round: Some("3".into()),
            time: Some("5:00".into()),
            details: None,
        }
    }

    #[test]
    fn first_block_win_grades_red() {
        let result = fight_page_to_result(&result_page("W", ""), "f1", now()).unwrap();
        assert_eq!(result.winner, Winner::Red);
        assert_eq!(result.round, Some(3));
    }

    #[test]
    fn second_block_win_grades_blue() {
        let result = fight_page_to_result(&result_page("L", "W"), "f1", now()).unwrap();
        assert_eq!(result.winner, Winner::Blue);
    }

    #[test]
    fn draw_and_no_contest_are_global_outcomes() {
        assert_eq!(
            fight_page_to_result(&result_page("D", "D"), "f1", now()).unwrap().winner,
            Winner::Draw
        );
        assert_eq!(
            fight_page_to_result(&result_page("NC", "NC"), "f1", now()).unwrap().winner,
            Winner::NoContest
        );
    }

    #[test]
    fn page_without_winner_marker_is_skipped() {
        assert!(fight_page_to_result(&result_page("", ""), "f1", now()).is_none());
    }
}
