use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{PlanError, PlanResult};
use crate::models::{GroceryItem, GroceryList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
    Csv,
    Ics,
}

impl ExportFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "text",
            ExportFormat::Csv => "csv",
            ExportFormat::Ics => "ics",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Ics => "text/calendar; charset=utf-8",
        }
    }

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Json => "grocery-list.json",
            ExportFormat::Text => "grocery-list.txt",
            ExportFormat::Csv => "grocery-list.csv",
            ExportFormat::Ics => "meal-plans.ics",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            "csv" => Ok(ExportFormat::Csv),
            "ics" | "ical" => Ok(ExportFormat::Ics),
            _ => Err(PlanError::validation(
                "format",
                format!("'{s}' is not one of: json, text, csv, ics"),
            )),
        }
    }
}

/// Render a grocery list. A failure here leaves `list` untouched, so the
/// caller can fall back to another format.
pub fn render_grocery(list: &GroceryList, format: ExportFormat) -> PlanResult<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            serde_json::to_vec_pretty(list).map_err(|e| PlanError::export("json", e))
        }
        ExportFormat::Text => Ok(render_text(list).into_bytes()),
        ExportFormat::Csv => render_csv(list),
        ExportFormat::Ics => Err(PlanError::validation(
            "format",
            "ics exports meal plans, not grocery lists",
        )),
    }
}

/// `"<quantity> <unit> <name> (<notes>)"`, dropping absent parts. An item
/// no recipe gave an amount for has no quantity; "as needed" leads its
/// parenthetical instead (`"tbsp butter (as needed)"`).
#[must_use]
pub fn item_line(item: &GroceryItem) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(3);
    if !item.is_as_needed() {
        parts.push(item.total_quantity.to_string());
    }
    if !item.unit.is_empty() {
        parts.push(item.unit.clone());
    }
    parts.push(item.name.clone());
    let mut line = parts.join(" ");

    let mut notes: Vec<&str> = Vec::with_capacity(item.notes.len() + 1);
    if item.is_as_needed() {
        notes.push("as needed");
    }
    notes.extend(item.notes.iter().map(String::as_str));
    if !notes.is_empty() {
        let _ = write!(line, " ({})", notes.join(", "));
    }
    line
}

#[must_use]
pub fn render_text(list: &GroceryList) -> String {
    let mut out = String::from("Grocery List\n");
    match list.date_range {
        Some(range) => {
            let _ = writeln!(out, "{range}");
        }
        None => out.push_str("No meals planned\n"),
    }
    for group in &list.categories {
        let _ = write!(out, "\n{}\n", group.category);
        for item in &group.items {
            let line = item_line(item);
            let _ = writeln!(out, "{line}");
        }
    }
    out
}

fn render_csv(list: &GroceryList) -> PlanResult<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["category", "name", "quantity", "unit", "recipes", "notes"])
        .map_err(|e| PlanError::export("csv", e))?;
    for group in &list.categories {
        for item in &group.items {
            let quantity = if item.is_as_needed() {
                String::new()
            } else {
                item.total_quantity.to_string()
            };
            let recipes = join_set(&item.recipes);
            let notes = join_set(&item.notes);
            wtr.write_record([
                group.category.label(),
                item.name.as_str(),
                quantity.as_str(),
                item.unit.as_str(),
                recipes.as_str(),
                notes.as_str(),
            ])
            .map_err(|e| PlanError::export("csv", e))?;
        }
    }
    wtr.into_inner().map_err(|e| PlanError::export("csv", e))
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join("; ")
}
