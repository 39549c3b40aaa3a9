//! HTML parsers for the three source page shapes.
//!
//! Each parser is a pure function over fetched HTML. The selector expectations
//! below are the de facto contract with the source site: if the structural
//! anchor for a page matches nothing, the whole parse fails with
//! [`ParseError::StructureMissing`] so a markup change surfaces loudly instead
//! of as silently empty data. Individual malformed rows are skipped.

use crate::models::{RawCardRow, RawEventRow, RawFightPage};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected markup anchor `{anchor}` matched nothing; source layout may have changed")]
    StructureMissing { anchor: &'static str },

    #[error("invalid selector `{0}`")]
    Selector(&'static str),
}

fn sel(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector(css))
}

/// Collapse an element's text into single-spaced form.
fn squish(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// ── Events index page ─────────────────────────────────────────────────────────

const EVENTS_TABLE: &str = "table.b-statistics__table-events";

/// Parse the completed-events index (the "all" page returns every event).
/// Rows without a detail link or a name are skipped, not failed.
pub fn parse_event_index(html: &str) -> Result<Vec<RawEventRow>, ParseError> {
    let doc = Html::parse_document(html);

    let table_sel = sel(EVENTS_TABLE)?;
    let tr_sel = sel("tbody tr")?;
    let td_sel = sel("td")?;
    let a_sel = sel("a[href]")?;
    let date_sel = sel("span.b-statistics__date")?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Err(ParseError::StructureMissing { anchor: EVENTS_TABLE });
    };

    let mut rows = Vec::new();

    for tr in table.select(&tr_sel) {
        let Some(link) = tr.select(&a_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(name) = non_empty(squish(link)) else {
            continue;
        };

        let date_text = tr.select(&date_sel).next().map(squish).and_then(non_empty);
        let location = tr.select(&td_sel).last().map(squish).and_then(non_empty);

        rows.push(RawEventRow {
            detail_href: Some(href.to_string()),
            name: Some(name),
            date_text,
            location,
        });
    }

    Ok(rows)
}

// ── Event card page ───────────────────────────────────────────────────────────

const CARD_TABLE: &str = "table.b-fight-details__table";

/// Parse one event page's fight table. Row order is the card order: row 0 is
/// the main event. Columns past the fighters (weight class, method, round,
/// time) are present but empty until the fight has concluded.
pub fn parse_event_card(html: &str) -> Result<Vec<RawCardRow>, ParseError> {
    let doc = Html::parse_document(html);

    let table_sel = sel(CARD_TABLE)?;
    let tr_sel = sel("tbody tr")?;
    let td_sel = sel("td")?;
    let fight_sel = sel(r#"a[href*="fight-details"]"#)?;
    let fighter_sel = sel(r#"a[href*="fighter-details"]"#)?;

    let Some(table) = doc.select(&table_sel).next() else {
        return Err(ParseError::StructureMissing { anchor: CARD_TABLE });
    };

    let mut rows = Vec::new();

    for tr in table.select(&tr_sel) {
        // Fight link lives on the row itself; older layouts nest an anchor.
        let fight_href = tr
            .value()
            .attr("data-link")
            .map(str::to_string)
            .or_else(|| {
                tr.select(&fight_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string)
            });
        let Some(fight_href) = fight_href else {
            continue;
        };

        let fighters: Vec<ElementRef<'_>> = tr.select(&fighter_sel).collect();
        let (Some(red), Some(blue)) = (fighters.first(), fighters.get(1)) else {
            continue;
        };

        let cells: Vec<String> = tr.select(&td_sel).map(squish).collect();

        rows.push(RawCardRow {
            fight_href: Some(fight_href),
            red_href: red.value().attr("href").map(str::to_string),
            red_name: non_empty(squish(*red)),
            blue_href: blue.value().attr("href").map(str::to_string),
            blue_name: non_empty(squish(*blue)),
            // W/L | Fighters | Kd | Str | Td | Sub | Weight class | Method | Round | Time
            weight_class: cells.get(6).cloned().and_then(non_empty),
            method: cells.get(7).cloned().and_then(non_empty),
            round: cells.get(8).cloned().and_then(non_empty),
            time: cells.get(9).cloned().and_then(non_empty),
        });
    }

    Ok(rows)
}

// ── Fight details page ────────────────────────────────────────────────────────

const PERSON_BLOCK: &str = "div.b-fight-details__person";

/// Parse one fight-details page: the two per-fighter outcome blocks (status
/// markers W/L/D/NC in block order, first = red) and the labeled text items
/// carrying method, round, time and details.
pub fn parse_fight_page(html: &str) -> Result<RawFightPage, ParseError> {
    let doc = Html::parse_document(html);

    let person_sel = sel(PERSON_BLOCK)?;
    let status_sel = sel("i.b-fight-details__person-status")?;
    let item_sel = sel("i.b-fight-details__text-item_first, i.b-fight-details__text-item")?;
    let text_sel = sel("p.b-fight-details__text")?;

    let mut page = RawFightPage::default();

    for person in doc.select(&person_sel) {
        let status = person
            .select(&status_sel)
            .next()
            .map(squish)
            .unwrap_or_default();
        page.statuses.push(status);
    }

    if page.statuses.is_empty() {
        return Err(ParseError::StructureMissing { anchor: PERSON_BLOCK });
    }

    for item in doc.select(&item_sel) {
        let text = squish(item);
        for (label, slot) in [
            ("Method:", &mut page.method),
            ("Round:", &mut page.round),
            ("Time:", &mut page.time),
            ("Details:", &mut page.details),
        ] {
            if let Some(value) = text.strip_prefix(label) {
                let value = value.trim();
                if !value.is_empty() && slot.is_none() {
                    *slot = Some(value.to_string());
                }
            }
        }
    }

    // Decision details sit as plain paragraph text after an inline label.
    if page.details.is_none() {
        for para in doc.select(&text_sel) {
            if let Some(value) = squish(para).strip_prefix("Details:") {
                let value = value.trim();
                if !value.is_empty() {
                    page.details = Some(value.to_string());
                    break;
                }
            }
        }
    }

    Ok(page)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
