use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::mpsc;

use larder_core::grid::GridDay;
use larder_core::models::{MealSlot, ScheduleIntent};
use larder_core::range::DateRange;
use larder_core::service::Planner;

use super::helpers::{exit_if_missing, parse_date, print_plan_table, truncate};

pub(crate) async fn cmd_plan_list(
    planner: &Planner,
    owner_id: i64,
    range: DateRange,
    json: bool,
) -> Result<()> {
    let meals = planner.list_planned(owner_id, range).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        println!("No meals planned for {range}");
    } else {
        println!("Meals for {range}");
        print_plan_table(&meals);
    }
    Ok(())
}

pub(crate) async fn cmd_plan_schedule(
    planner: &Planner,
    owner_id: i64,
    recipe_id: i64,
    date: Option<String>,
    slot: &str,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let slot: MealSlot = slot.parse()?;
    let scheduled = planner
        .schedule(owner_id, date, slot, recipe_id, notes)
        .await
        .map_err(|e| exit_if_missing(e, json))?;
    let entry = scheduled.entry;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "{} recipe {} for {} on {} (entry {})",
            if scheduled.created { "Scheduled" } else { "Replaced with" },
            entry.recipe_id,
            entry.slot.label().to_lowercase(),
            entry.date.format("%a %Y-%m-%d"),
            entry.id
        );
    }
    Ok(())
}

pub(crate) async fn cmd_plan_reassign(
    planner: &Planner,
    owner_id: i64,
    entry_id: i64,
    recipe_id: i64,
    json: bool,
) -> Result<()> {
    let entry = planner
        .reassign(owner_id, entry_id, recipe_id)
        .await
        .map_err(|e| exit_if_missing(e, json))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Entry {} now uses recipe {}", entry.id, entry.recipe_id);
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove(
    planner: &Planner,
    owner_id: i64,
    entry_id: i64,
    json: bool,
) -> Result<()> {
    planner
        .unschedule(owner_id, entry_id)
        .map_err(|e| exit_if_missing(e, json))?;

    if json {
        println!("{}", serde_json::json!({ "deleted": entry_id }));
    } else {
        println!("Removed entry {entry_id}");
    }
    Ok(())
}

pub(crate) async fn cmd_plan_grid(
    planner: &Planner,
    owner_id: i64,
    range: DateRange,
    json: bool,
) -> Result<()> {
    let grid = planner.grid(owner_id, range).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grid)?);
    } else {
        print_grid(&grid);
    }
    Ok(())
}

fn print_grid(grid: &[GridDay]) {
    use tabled::{builder::Builder, settings::Style};

    let mut builder = Builder::default();
    let mut header = vec!["Date".to_string()];
    header.extend(MealSlot::ALL.iter().map(|s| s.label().to_string()));
    builder.push_record(header);

    for day in grid {
        let mut row = vec![day.date.format("%a %m-%d").to_string()];
        row.extend(day.cells.iter().map(|cell| {
            cell.meal.as_ref().map_or_else(String::new, |m| {
                m.recipe_title
                    .as_deref()
                    .map_or_else(|| format!("#{}", m.entry.recipe_id), |t| truncate(t, 18))
            })
        }));
        builder.push_record(row);
    }

    println!("{}", builder.build().with(Style::rounded()));
}

/// Apply a JSON array of schedule intents in order, one outcome per line.
pub(crate) async fn cmd_plan_apply(
    planner: &Planner,
    owner_id: i64,
    file: &Path,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let intents: Vec<ScheduleIntent> =
        serde_json::from_str(&input).context("Expected a JSON array of schedule intents")?;
    let total = intents.len();

    let (intent_tx, intent_rx) = mpsc::channel(16);
    let (reply_tx, mut reply_rx) = mpsc::channel(16);

    let producer = async move {
        for intent in intents {
            if intent_tx.send(intent).await.is_err() {
                break;
            }
        }
    };
    let printer = async move {
        let mut results = Vec::new();
        while let Some(outcome) = reply_rx.recv().await {
            let larder_core::service::IntentOutcome { intent, result } = outcome;
            match result {
                Ok(scheduled) if json => results.push(serde_json::json!({
                    "entry": scheduled.entry,
                    "created": scheduled.created,
                })),
                Err(e) if json => results.push(serde_json::json!({
                    "intent": intent,
                    "error": e.to_string(),
                })),
                Ok(scheduled) => println!(
                    "{} {:<9} recipe {} (entry {})",
                    scheduled.entry.date,
                    scheduled.entry.slot.label(),
                    scheduled.entry.recipe_id,
                    scheduled.entry.id
                ),
                Err(e) => eprintln!(
                    "{} {:<9} recipe {}: {e}",
                    intent.date,
                    intent.slot.label(),
                    intent.recipe_id
                ),
            }
        }
        results
    };

    let (applied, (), results) = tokio::join!(
        planner.run_intents(owner_id, intent_rx, reply_tx),
        producer,
        printer
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Applied {applied} of {total} intents");
    }
    Ok(())
}
