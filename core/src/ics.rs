//! iCalendar (RFC 5545) export of planned meals.
//!
//! Every entry becomes one all-day `VEVENT` without a recurrence rule.
//! Lines are folded at 75 octets and text values are escaped, so the output
//! imports cleanly into third-party calendar clients. [`parse_ics`] reads
//! the subset we write back for round-trip checks.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

use crate::error::{PlanError, PlanResult};
use crate::models::{MealSlot, PlannedMeal, YEARS};

const PRODID: &str = "-//larder//meal planner//EN";
const MAX_LINE_OCTETS: usize = 75;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcsEvent {
    pub uid: String,
    pub start: NaiveDate,
    pub summary: String,
    pub description: Option<String>,
}

impl IcsEvent {
    /// Split `"<Slot>: <title>"` back into its parts.
    #[must_use]
    pub fn slot_and_title(&self) -> Option<(MealSlot, &str)> {
        let (label, title) = self.summary.split_once(": ")?;
        let slot = MealSlot::ALL.into_iter().find(|s| s.label() == label)?;
        Some((slot, title))
    }
}

#[must_use]
pub fn event_summary(meal: &PlannedMeal) -> String {
    let title = meal
        .recipe_title
        .clone()
        .unwrap_or_else(|| format!("Recipe {}", meal.entry.recipe_id));
    format!("{}: {title}", meal.entry.slot.label())
}

/// Render meals as a calendar. `stamp` becomes every event's `DTSTAMP`.
pub fn render_ics(meals: &[PlannedMeal], stamp: DateTime<Utc>) -> PlanResult<String> {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, &format!("PRODID:{PRODID}"));
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, "CALSCALE:GREGORIAN");
    push_line(&mut out, "METHOD:PUBLISH");

    let dtstamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();
    for meal in meals {
        let entry = &meal.entry;
        let end = entry
            .date
            .checked_add_days(Days::new(1))
            .filter(|d| YEARS.contains(&d.year()))
            .ok_or_else(|| {
                PlanError::export("ics", format!("{} has no DATE-representable end", entry.date))
            })?;
        push_line(&mut out, "BEGIN:VEVENT");
        push_line(&mut out, &format!("UID:{}@larder", entry.uuid));
        push_line(&mut out, &format!("DTSTAMP:{dtstamp}"));
        push_line(
            &mut out,
            &format!("DTSTART;VALUE=DATE:{}", entry.date.format("%Y%m%d")),
        );
        push_line(&mut out, &format!("DTEND;VALUE=DATE:{}", end.format("%Y%m%d")));
        push_line(
            &mut out,
            &format!("SUMMARY:{}", escape_text(&event_summary(meal))),
        );
        if let Some(notes) = &entry.notes {
            push_line(&mut out, &format!("DESCRIPTION:{}", escape_text(notes)));
        }
        push_line(&mut out, "END:VEVENT");
    }
    push_line(&mut out, "END:VCALENDAR");
    Ok(out)
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(&fold_line(line));
    out.push_str("\r\n");
}

/// Fold a content line into chunks of at most 75 octets, never splitting a
/// UTF-8 sequence. Continuation lines start with a single space, which
/// counts toward their length.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out
}

#[must_use]
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[must_use]
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Read the `VEVENT`s of a calendar produced by [`render_ics`].
pub fn parse_ics(input: &str) -> PlanResult<Vec<IcsEvent>> {
    let mut events = Vec::new();
    let mut current: Option<PartialEvent> = None;

    for line in unfold(input) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let property = name.split(';').next().unwrap_or(name);
        match property {
            "BEGIN" if value == "VEVENT" => {
                if current.is_some() {
                    return Err(PlanError::export("ics", "nested VEVENT"));
                }
                current = Some(PartialEvent::default());
            }
            "END" if value == "VEVENT" => {
                let partial = current
                    .take()
                    .ok_or_else(|| PlanError::export("ics", "END:VEVENT without BEGIN"))?;
                events.push(partial.finish()?);
            }
            _ => {
                if let Some(ev) = current.as_mut() {
                    ev.set(property, value)?;
                }
            }
        }
    }

    if current.is_some() {
        return Err(PlanError::export("ics", "unterminated VEVENT"));
    }
    Ok(events)
}

#[derive(Default)]
struct PartialEvent {
    uid: Option<String>,
    start: Option<NaiveDate>,
    summary: Option<String>,
    description: Option<String>,
}

impl PartialEvent {
    fn set(&mut self, property: &str, value: &str) -> PlanResult<()> {
        match property {
            "UID" => self.uid = Some(value.to_string()),
            "DTSTART" => {
                let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|e| {
                    PlanError::export("ics", format!("bad DTSTART '{value}': {e}"))
                })?;
                self.start = Some(date);
            }
            "SUMMARY" => self.summary = Some(unescape_text(value)),
            "DESCRIPTION" => self.description = Some(unescape_text(value)),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> PlanResult<IcsEvent> {
        let missing = |prop| PlanError::export("ics", format!("VEVENT without {prop}"));
        Ok(IcsEvent {
            uid: self.uid.ok_or_else(|| missing("UID"))?,
            start: self.start.ok_or_else(|| missing("DTSTART"))?,
            summary: self.summary.unwrap_or_default(),
            description: self.description,
        })
    }
}

fn unfold(input: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in input.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(cont) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(cont);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

#[must_use]
pub fn describe_events(events: &[IcsEvent]) -> String {
    let mut out = String::new();
    for ev in events {
        let _ = writeln!(out, "{}  {}", ev.start, ev.summary);
    }
    out
}
