use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use serde::ser::SerializeMap;

use crate::classify::Category;
use crate::error::{PlanError, PlanResult};
use crate::instructions::{Instructions, parse_instructions};
use crate::quantity::Quantity;
use crate::range::DateRange;

pub const MAX_NOTES_LEN: usize = 500;

// --- Scheduling grid ---

/// The second axis of the calendar grid. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

impl MealSlot {
    pub const ALL: [MealSlot; 5] = [
        MealSlot::Breakfast,
        MealSlot::Lunch,
        MealSlot::Dinner,
        MealSlot::Snack,
        MealSlot::Dessert,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
            MealSlot::Snack => "snack",
            MealSlot::Dessert => "dessert",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "Breakfast",
            MealSlot::Lunch => "Lunch",
            MealSlot::Dinner => "Dinner",
            MealSlot::Snack => "Snack",
            MealSlot::Dessert => "Dessert",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        MealSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == lower)
            .ok_or_else(|| {
                let valid: Vec<&str> = MealSlot::ALL.iter().map(|s| s.as_str()).collect();
                PlanError::validation(
                    "slot",
                    format!("'{s}' is not one of: {}", valid.join(", ")),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MealPlanEntry {
    pub id: i64,
    pub uuid: String,
    pub owner_id: i64,
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub recipe_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMealPlanEntry {
    pub owner_id: i64,
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub recipe_id: i64,
    pub notes: Option<String>,
}

/// A stored entry and whether the upsert created it or replaced the
/// occupant of its slot.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub entry: MealPlanEntry,
    pub created: bool,
}

/// An entry joined with the title of its recipe, as shown on the calendar.
/// `recipe_title` is `None` when the recipe could not be resolved.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedMeal {
    #[serde(flatten)]
    pub entry: MealPlanEntry,
    pub recipe_title: Option<String>,
}

/// A typed request to put a recipe into a calendar cell, produced by
/// drag-and-drop or by picking a recipe for an empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleIntent {
    pub recipe_id: i64,
    pub date: NaiveDate,
    pub slot: MealSlot,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn validate_notes(notes: Option<String>) -> PlanResult<Option<String>> {
    match notes.map(|n| n.trim().to_string()) {
        Some(n) if n.is_empty() => Ok(None),
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(PlanError::validation(
            "notes",
            format!("must be at most {MAX_NOTES_LEN} characters"),
        )),
        other => Ok(other),
    }
}

/// Calendar files and the week/month arithmetic only deal in four-digit
/// years.
pub const YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

pub fn parse_date(field: &'static str, value: &str) -> PlanResult<NaiveDate> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| PlanError::validation(field, format!("'{value}' is not a YYYY-MM-DD date")))?;
    if !YEARS.contains(&date.year()) {
        return Err(PlanError::validation(
            field,
            format!("'{value}' is out of range (years 1 to 9999)"),
        ));
    }
    Ok(date)
}

// --- Recipes (read-only here) ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeIngredient {
    pub name: String,
    pub quantity: Option<Quantity>,
    pub unit: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i64>,
    pub is_public: bool,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Instructions,
}

impl Recipe {
    /// Public recipes are visible to everyone; private ones only to their author.
    #[must_use]
    pub fn is_visible_to(&self, owner_id: i64) -> bool {
        self.is_public || self.author_id == Some(owner_id)
    }
}

/// Wire shape of a recipe as delivered by the recipe backend or an import file.
/// Converted into [`Recipe`] exactly once by [`RecipePayload::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct RecipePayload {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub ingredients: Vec<IngredientPayload>,
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientPayload {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A validated recipe that has not been stored yet. `instructions` keeps
/// the raw text so it can be persisted as received.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub id: Option<i64>,
    pub title: String,
    pub author_id: Option<i64>,
    pub is_public: bool,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: String,
}

impl NewRecipe {
    #[must_use]
    pub fn into_recipe(self, id: i64) -> Recipe {
        Recipe {
            id,
            instructions: parse_instructions(&self.instructions),
            title: self.title,
            author_id: self.author_id,
            is_public: self.is_public,
            ingredients: self.ingredients,
        }
    }
}

impl RecipePayload {
    pub fn into_new_recipe(self) -> PlanResult<NewRecipe> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(PlanError::validation("title", "must not be empty"));
        }
        let ingredients = self
            .ingredients
            .into_iter()
            .enumerate()
            .map(|(i, ing)| {
                let name = ing.name.trim().to_string();
                if name.is_empty() {
                    return Err(PlanError::validation(
                        "ingredients",
                        format!("ingredient {} has an empty name", i + 1),
                    ));
                }
                Ok(RecipeIngredient {
                    name,
                    quantity: ing.quantity,
                    unit: ing.unit.unwrap_or_default().trim().to_string(),
                    notes: ing.notes.unwrap_or_default().trim().to_string(),
                })
            })
            .collect::<PlanResult<Vec<_>>>()?;

        Ok(NewRecipe {
            id: self.id,
            title,
            author_id: self.author_id,
            is_public: self.is_public,
            ingredients,
            instructions: self.instructions.unwrap_or_default(),
        })
    }

    /// Validate and convert. `id` is taken from the payload when present,
    /// otherwise from `fallback_id`.
    pub fn validate(self, fallback_id: i64) -> PlanResult<Recipe> {
        let new = self.into_new_recipe()?;
        let id = new.id.unwrap_or(fallback_id);
        Ok(new.into_recipe(id))
    }
}

// --- Grocery list ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroceryItem {
    /// Merge key: trimmed, lowercased ingredient name.
    pub name: String,
    /// Trimmed, lowercased unit; empty for unit-less items.
    pub unit: String,
    pub total_quantity: Quantity,
    /// True when at least one contributing ingredient carried a quantity.
    pub quantified: bool,
    pub category: Category,
    pub recipes: BTreeSet<String>,
    pub notes: BTreeSet<String>,
}

impl GroceryItem {
    #[must_use]
    pub fn is_as_needed(&self) -> bool {
        !self.quantified && self.total_quantity.is_zero()
    }

    /// "3 cup", "2", or `None` for "as needed" items.
    #[must_use]
    pub fn quantity_label(&self) -> Option<String> {
        if self.is_as_needed() {
            return None;
        }
        if self.unit.is_empty() {
            Some(self.total_quantity.to_string())
        } else {
            Some(format!("{} {}", self.total_quantity, self.unit))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub items: Vec<GroceryItem>,
}

/// An entry dropped from aggregation because its recipe was unavailable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ResolutionWarning {
    pub entry_id: i64,
    pub recipe_id: i64,
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroceryList {
    #[serde(rename = "ingredients_by_category", serialize_with = "serialize_groups")]
    pub categories: Vec<CategoryGroup>,
    pub total_items: usize,
    pub date_range: Option<DateRange>,
    pub source_entry_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolutionWarning>,
}

impl GroceryList {
    pub fn items(&self) -> impl Iterator<Item = &GroceryItem> {
        self.categories.iter().flat_map(|g| g.items.iter())
    }

    #[must_use]
    pub fn find(&self, name: &str, unit: &str) -> Option<&GroceryItem> {
        self.items().find(|i| i.name == name && i.unit == unit)
    }
}

/// Categories as a JSON object whose keys keep display order.
fn serialize_groups<S: Serializer>(groups: &[CategoryGroup], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for group in groups {
        map.serialize_entry(group.category.label(), &group.items)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parse_case_insensitive() {
        assert_eq!("Lunch".parse::<MealSlot>().unwrap(), MealSlot::Lunch);
        assert_eq!(" DESSERT ".parse::<MealSlot>().unwrap(), MealSlot::Dessert);
    }

    #[test]
    fn test_slot_parse_unknown_names_field() {
        let err = "brunch".parse::<MealSlot>().unwrap_err();
        match err {
            PlanError::Validation { field, message } => {
                assert_eq!(field, "slot");
                assert!(message.contains("breakfast, lunch, dinner, snack, dessert"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_slot_order_is_display_order() {
        let mut slots = vec![MealSlot::Dessert, MealSlot::Breakfast, MealSlot::Dinner];
        slots.sort();
        assert_eq!(
            slots,
            vec![MealSlot::Breakfast, MealSlot::Dinner, MealSlot::Dessert]
        );
    }

    #[test]
    fn test_validate_notes() {
        assert_eq!(validate_notes(None).unwrap(), None);
        assert_eq!(validate_notes(Some("   ".into())).unwrap(), None);
        assert_eq!(
            validate_notes(Some(" double batch ".into())).unwrap().as_deref(),
            Some("double batch")
        );
        assert!(validate_notes(Some("x".repeat(MAX_NOTES_LEN + 1))).is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("date", "2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert!(parse_date("start_date", "03/01/2024").is_err());
    }

    #[test]
    fn test_parse_date_rejects_extended_years() {
        for value in ["+262142-12-31", "+10000-01-01", "0000-12-31", "-0001-01-01"] {
            let err = parse_date("anchor", value).unwrap_err();
            assert!(
                matches!(err, PlanError::Validation { field: "anchor", .. }),
                "{value}: {err:?}"
            );
        }
        assert!(parse_date("date", "9999-12-31").is_ok());
        assert!(parse_date("date", "0001-01-01").is_ok());
    }

    #[test]
    fn test_recipe_payload_validate() {
        let payload: RecipePayload = serde_json::from_str(
            r#"{
                "title": "  Pancakes ",
                "author_id": 7,
                "is_public": false,
                "ingredients": [
                    {"name": " Flour ", "quantity": 2, "unit": "Cup"},
                    {"name": "salt", "quantity": "1/2", "unit": "tsp", "notes": "fine"},
                    {"name": "butter"}
                ],
                "instructions": "Mix.\nFry."
            }"#,
        )
        .unwrap();
        let recipe = payload.validate(11).unwrap();
        assert_eq!(recipe.id, 11);
        assert_eq!(recipe.title, "Pancakes");
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.ingredients[0].name, "Flour");
        assert_eq!(recipe.ingredients[0].unit, "Cup");
        assert_eq!(recipe.ingredients[1].quantity.unwrap().hundredths(), 50);
        assert_eq!(recipe.ingredients[1].notes, "fine");
        assert!(recipe.ingredients[2].quantity.is_none());
        assert!(recipe.ingredients[2].unit.is_empty());
        assert_eq!(recipe.instructions.steps().len(), 2);
    }

    #[test]
    fn test_recipe_payload_rejects_blank_title_and_names() {
        let blank: RecipePayload = serde_json::from_str(r#"{"title": " "}"#).unwrap();
        assert!(blank.validate(1).is_err());

        let bad_ing: RecipePayload =
            serde_json::from_str(r#"{"title": "Soup", "ingredients": [{"name": ""}]}"#).unwrap();
        assert!(bad_ing.validate(1).is_err());
    }

    #[test]
    fn test_recipe_visibility() {
        let payload: RecipePayload =
            serde_json::from_str(r#"{"title": "Secret", "author_id": 3, "is_public": false}"#)
                .unwrap();
        let recipe = payload.validate(1).unwrap();
        assert!(recipe.is_visible_to(3));
        assert!(!recipe.is_visible_to(4));
    }

    #[test]
    fn test_quantity_label() {
        let mut item = GroceryItem {
            name: "flour".into(),
            unit: "cup".into(),
            total_quantity: Quantity::whole(3),
            quantified: true,
            category: Category::Pantry,
            recipes: BTreeSet::new(),
            notes: BTreeSet::new(),
        };
        assert_eq!(item.quantity_label().as_deref(), Some("3 cup"));

        item.unit.clear();
        assert_eq!(item.quantity_label().as_deref(), Some("3"));

        item.total_quantity = Quantity::ZERO;
        item.quantified = false;
        assert!(item.is_as_needed());
        assert_eq!(item.quantity_label(), None);
    }
}
