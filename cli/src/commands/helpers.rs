use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::PlanError;
use larder_core::models::PlannedMeal;
use larder_core::range::{DateRange, Direction, ViewMode};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => larder_core::models::parse_date("date", &s).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// How the user picked a date range on the command line.
#[derive(Debug, Default, Clone)]
pub(crate) struct RangeSelection {
    pub start: Option<String>,
    pub end: Option<String>,
    pub anchor: Option<String>,
    pub view: Option<String>,
    /// Number of weeks/months to move the anchor; negative moves back.
    pub shift: i32,
}

/// Explicit `--start/--end` wins. Otherwise the week or month around the
/// anchor (default: today), moved `shift` steps.
pub(crate) fn resolve_range(sel: RangeSelection) -> Result<DateRange> {
    if sel.start.is_some() || sel.end.is_some() {
        let start = parse_date(sel.start.clone().or_else(|| sel.end.clone()))?;
        let end = match sel.end {
            Some(end) => parse_date(Some(end))?,
            None => start,
        };
        return Ok(DateRange::new(start, end)?);
    }

    let view: ViewMode = match sel.view.as_deref() {
        Some(v) => v.parse()?,
        None => ViewMode::Week,
    };
    let mut anchor = parse_date(sel.anchor)?;
    let direction = if sel.shift < 0 {
        Direction::Previous
    } else {
        Direction::Next
    };
    for _ in 0..sel.shift.unsigned_abs() {
        anchor = DateRange::navigate(anchor, view, direction);
    }
    Ok(DateRange::resolve(anchor, view)?)
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Missing entries and recipes exit with status 2; everything else is
/// handed back to the caller.
pub(crate) fn exit_if_missing(err: PlanError, json: bool) -> anyhow::Error {
    if matches!(err, PlanError::NotFound(_) | PlanError::InvalidReference(_)) {
        if json {
            println!("{}", json_error(&err.to_string()));
        } else {
            eprintln!("{err}");
        }
        process::exit(2);
    }
    err.into()
}

/// Write to `out`, or to stdout when no file was given.
pub(crate) fn write_output(bytes: &[u8], out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(crate) fn print_plan_table(meals: &[PlannedMeal]) {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Slot")]
        slot: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<PlanRow> = meals
        .iter()
        .map(|m| PlanRow {
            id: m.entry.id,
            date: m.entry.date.format("%a %Y-%m-%d").to_string(),
            slot: m.entry.slot.label().to_string(),
            recipe: m.recipe_title.as_deref().map_or_else(
                || format!("(recipe {} unavailable)", m.entry.recipe_id),
                |t| truncate(t, 35),
            ),
            notes: m
                .entry
                .notes
                .as_deref()
                .map(|n| truncate(n, 30))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso_and_invalid() {
        assert_eq!(parse_date(Some("2024-01-15".to_string())).unwrap(), d("2024-01-15"));
        assert!(parse_date(Some("nope".to_string())).is_err());
        assert!(parse_date(Some("+262142-12-31".to_string())).is_err());
    }

    #[test]
    fn test_resolve_anchor_at_calendar_edge() {
        let month = resolve_range(RangeSelection {
            anchor: Some("9999-12-20".into()),
            view: Some("month".into()),
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!(month.end, d("9999-12-31"));

        // shifting past the last supported month keeps the anchor in place
        let shifted = resolve_range(RangeSelection {
            anchor: Some("9999-12-20".into()),
            view: Some("month".into()),
            shift: 3,
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!(shifted, month);
    }

    #[test]
    fn test_resolve_explicit_range() {
        let range = resolve_range(RangeSelection {
            start: Some("2024-03-04".into()),
            end: Some("2024-03-05".into()),
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!((range.start, range.end), (d("2024-03-04"), d("2024-03-05")));

        let single = resolve_range(RangeSelection {
            end: Some("2024-03-05".into()),
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!((single.start, single.end), (d("2024-03-05"), d("2024-03-05")));
    }

    #[test]
    fn test_resolve_rejects_reversed_range() {
        let result = resolve_range(RangeSelection {
            start: Some("2024-03-06".into()),
            end: Some("2024-03-05".into()),
            ..RangeSelection::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_anchor_view_and_shift() {
        let week = resolve_range(RangeSelection {
            anchor: Some("2024-03-06".into()),
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!((week.start, week.end), (d("2024-03-03"), d("2024-03-09")));

        let prev_month = resolve_range(RangeSelection {
            anchor: Some("2024-03-31".into()),
            view: Some("month".into()),
            shift: -1,
            ..RangeSelection::default()
        })
        .unwrap();
        assert_eq!((prev_month.start, prev_month.end), (d("2024-02-01"), d("2024-02-29")));

        assert!(
            resolve_range(RangeSelection {
                view: Some("fortnight".into()),
                ..RangeSelection::default()
            })
            .is_err()
        );
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        write_output(b"flour\n", Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "flour\n");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("Recipe 7 not found"), r#"{"error":"Recipe 7 not found"}"#);
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }
}
