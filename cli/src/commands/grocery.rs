use anyhow::{Context, Result};
use std::path::Path;

use larder_core::export::{ExportFormat, render_grocery};
use larder_core::ics::{describe_events, parse_ics};
use larder_core::range::DateRange;
use larder_core::service::Planner;

use super::helpers::write_output;

pub(crate) async fn cmd_grocery(
    planner: &Planner,
    owner_id: i64,
    range: DateRange,
    format: &str,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let format = if json {
        ExportFormat::Json
    } else {
        format.parse()?
    };
    let list = planner.grocery_list(owner_id, range).await?;

    for warning in &list.warnings {
        eprintln!(
            "Skipped {} {} (recipe {}): {}",
            warning.date,
            warning.slot.label().to_lowercase(),
            warning.recipe_id,
            warning.reason
        );
    }

    let mut bytes = render_grocery(&list, format)?;
    if format == ExportFormat::Json && out.is_none() {
        bytes.push(b'\n');
    }
    write_output(&bytes, out)
}

pub(crate) async fn cmd_export_ical(
    planner: &Planner,
    owner_id: i64,
    range: DateRange,
    out: Option<&Path>,
) -> Result<()> {
    let calendar = planner.export_ical(owner_id, range).await?;
    write_output(calendar.as_bytes(), out)
}

/// Show the events of a calendar file, e.g. one written by `export-ical`.
pub(crate) fn cmd_ical_preview(file: &Path, json: bool) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let events = parse_ics(&input)?;

    if json {
        let rows: Vec<serde_json::Value> = events
            .iter()
            .map(|ev| {
                let (slot, title) = ev
                    .slot_and_title()
                    .map_or((None, None), |(s, t)| (Some(s), Some(t)));
                serde_json::json!({
                    "uid": ev.uid,
                    "date": ev.start,
                    "summary": ev.summary,
                    "slot": slot,
                    "title": title,
                    "description": ev.description,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if events.is_empty() {
        println!("No events in {}", file.display());
    } else {
        print!("{}", describe_events(&events));
    }
    Ok(())
}
