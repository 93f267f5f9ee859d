//! Grocery-list aggregation.
//!
//! Ingredients from every resolved entry are merged on
//! `(lower(trim(name)), lower(trim(unit)))`. Same name with different units
//! stays separate. The result depends only on the set of entries, never on
//! the order they are supplied in.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::classify::classify;
use crate::models::{
    CategoryGroup, GroceryItem, GroceryList, MealPlanEntry, Recipe, ResolutionWarning,
};
use crate::quantity::Quantity;
use crate::range::DateRange;

pub const MISSING_RECIPE_REASON: &str = "recipe not found or not visible";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Fold spellings of the same unit ("tbsp", "tbs.") onto one name
    /// before keying. Never converts between different units.
    pub canonical_units: bool,
}

type MergeKey = (String, String);

pub fn aggregate(entries: &[MealPlanEntry], recipes: &HashMap<i64, Recipe>) -> GroceryList {
    aggregate_with(entries, recipes, AggregateOptions::default())
}

pub fn aggregate_with(
    entries: &[MealPlanEntry],
    recipes: &HashMap<i64, Recipe>,
    options: AggregateOptions,
) -> GroceryList {
    // an entry id seen twice is still one entry
    let unique: BTreeMap<i64, &MealPlanEntry> = entries.iter().map(|e| (e.id, e)).collect();

    let date_range = unique
        .values()
        .map(|e| DateRange::single(e.date))
        .reduce(|a, b| a.union(&b));

    let mut items: BTreeMap<MergeKey, GroceryItem> = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut resolved = 0;

    for entry in unique.values() {
        let Some(recipe) = recipes.get(&entry.recipe_id) else {
            warnings.push(ResolutionWarning {
                entry_id: entry.id,
                recipe_id: entry.recipe_id,
                date: entry.date,
                slot: entry.slot,
                reason: MISSING_RECIPE_REASON.to_string(),
            });
            continue;
        };
        resolved += 1;

        for ingredient in &recipe.ingredients {
            let name = normalize(&ingredient.name);
            let mut unit = normalize(&ingredient.unit);
            if options.canonical_units {
                unit = canonical_unit(&unit).to_string();
            }
            let mut notes = BTreeSet::new();
            let note = ingredient.notes.trim();
            if !note.is_empty() {
                notes.insert(note.to_string());
            }
            let contribution = GroceryItem {
                category: classify(&name),
                name: name.clone(),
                unit: unit.clone(),
                total_quantity: ingredient.quantity.unwrap_or(Quantity::ZERO),
                quantified: ingredient.quantity.is_some(),
                recipes: BTreeSet::from([recipe.title.clone()]),
                notes,
            };
            merge_item(&mut items, (name, unit), contribution);
        }
    }

    debug!(
        entries = unique.len(),
        resolved,
        items = items.len(),
        "aggregated grocery list"
    );
    build_list(items, date_range, resolved, warnings)
}

impl GroceryList {
    /// Combine lists computed over disjoint entry sets. Equal to aggregating
    /// the union of those entries.
    #[must_use]
    pub fn merge(&self, other: &GroceryList) -> GroceryList {
        let mut items: BTreeMap<MergeKey, GroceryItem> = BTreeMap::new();
        for item in self.items().chain(other.items()) {
            merge_item(&mut items, (item.name.clone(), item.unit.clone()), item.clone());
        }
        let date_range = match (self.date_range, other.date_range) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        let warnings = self
            .warnings
            .iter()
            .chain(&other.warnings)
            .cloned()
            .collect();
        build_list(
            items,
            date_range,
            self.source_entry_count + other.source_entry_count,
            warnings,
        )
    }
}

fn merge_item(items: &mut BTreeMap<MergeKey, GroceryItem>, key: MergeKey, add: GroceryItem) {
    match items.get_mut(&key) {
        Some(existing) => {
            existing.total_quantity = existing.total_quantity + add.total_quantity;
            existing.quantified |= add.quantified;
            existing.recipes.extend(add.recipes);
            existing.notes.extend(add.notes);
        }
        None => {
            items.insert(key, add);
        }
    }
}

fn build_list(
    items: BTreeMap<MergeKey, GroceryItem>,
    date_range: Option<DateRange>,
    source_entry_count: usize,
    mut warnings: Vec<ResolutionWarning>,
) -> GroceryList {
    let total_items = items.len();
    // BTreeMap iteration is already sorted by (name, unit)
    let mut by_category: BTreeMap<_, Vec<GroceryItem>> = BTreeMap::new();
    for item in items.into_values() {
        by_category.entry(item.category).or_default().push(item);
    }
    let categories = by_category
        .into_iter()
        .map(|(category, items)| CategoryGroup { category, items })
        .collect();
    warnings.sort();
    warnings.dedup();

    GroceryList {
        categories,
        total_items,
        date_range,
        source_entry_count,
        warnings,
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Canonical spelling for a normalized unit. Unknown units pass through.
#[must_use]
pub fn canonical_unit(unit: &str) -> &str {
    match unit {
        "tbsp" | "tbs" | "tbsp." | "tbs." | "tablespoons" => "tablespoon",
        "tsp" | "tsp." | "teaspoons" => "teaspoon",
        "cups" | "c" | "c." => "cup",
        "lb" | "lbs" | "lb." | "lbs." | "pounds" => "pound",
        "oz" | "oz." | "ounces" => "ounce",
        "g" | "grams" => "gram",
        "kg" | "kilograms" => "kilogram",
        "ml" | "milliliters" => "milliliter",
        "l" | "liters" => "liter",
        "pieces" | "pcs" | "pc" => "piece",
        "cloves" => "clove",
        "heads" => "head",
        other => other,
    }
}
