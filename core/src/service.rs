use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{PlanError, PlanResult};
use crate::grid::{GridDay, MAX_GRID_DAYS, build_grid};
use crate::grocery::{AggregateOptions, aggregate_with};
use crate::ics::render_ics;
use crate::models::{
    GroceryList, MealPlanEntry, MealSlot, NewMealPlanEntry, NewRecipe, PlannedMeal, Recipe,
    ScheduleIntent, Scheduled, validate_notes,
};
use crate::range::DateRange;
use crate::source::{RecipeSource, fetch_all};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of applying one [`ScheduleIntent`], sent back to whoever queued it.
#[derive(Debug)]
pub struct IntentOutcome {
    pub intent: ScheduleIntent,
    pub result: PlanResult<Scheduled>,
}

/// Meal-plan operations for one store and one recipe source.
///
/// The database lock is never held across an `.await`; recipe lookups run
/// unlocked and the store is touched before or after them.
pub struct Planner {
    db: Arc<Mutex<Database>>,
    source: Arc<dyn RecipeSource>,
    options: AggregateOptions,
    lookup_timeout: Duration,
}

impl Planner {
    pub fn new(db: Arc<Mutex<Database>>, source: Arc<dyn RecipeSource>) -> Self {
        Self {
            db,
            source,
            options: AggregateOptions::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Store ---

    pub fn list(&self, owner_id: i64, range: DateRange) -> PlanResult<Vec<MealPlanEntry>> {
        self.db().list_meal_plans(owner_id, range)
    }

    /// Entries in `range` with their recipe titles. Titles of recipes that
    /// cannot be resolved are left empty.
    pub async fn list_planned(&self, owner_id: i64, range: DateRange) -> PlanResult<Vec<PlannedMeal>> {
        let entries = self.list(owner_id, range)?;
        let lookup = fetch_all(
            self.source.as_ref(),
            entries.iter().map(|e| e.recipe_id),
            owner_id,
            self.lookup_timeout,
        )
        .await;
        Ok(entries
            .into_iter()
            .map(|entry| PlannedMeal {
                recipe_title: lookup.recipes.get(&entry.recipe_id).map(|r| r.title.clone()),
                entry,
            })
            .collect())
    }

    pub async fn schedule(
        &self,
        owner_id: i64,
        date: NaiveDate,
        slot: MealSlot,
        recipe_id: i64,
        notes: Option<String>,
    ) -> PlanResult<Scheduled> {
        let notes = validate_notes(notes)?;
        self.visible_recipe(owner_id, recipe_id).await?;
        let scheduled = self.db().upsert_meal_plan(&NewMealPlanEntry {
            owner_id,
            date,
            slot,
            recipe_id,
            notes,
        })?;
        info!(
            owner_id,
            entry_id = scheduled.entry.id,
            created = scheduled.created,
            %date,
            %slot,
            recipe_id,
            "scheduled meal"
        );
        Ok(scheduled)
    }

    pub async fn apply(&self, owner_id: i64, intent: ScheduleIntent) -> PlanResult<Scheduled> {
        self.schedule(owner_id, intent.date, intent.slot, intent.recipe_id, intent.notes)
            .await
    }

    /// Point an existing entry at another recipe. Date and slot are kept.
    pub async fn reassign(&self, owner_id: i64, entry_id: i64, recipe_id: i64) -> PlanResult<MealPlanEntry> {
        self.owned_entry(owner_id, entry_id)?;
        self.visible_recipe(owner_id, recipe_id).await?;
        let entry = self
            .db()
            .update_meal_plan_recipe(entry_id, recipe_id)?
            .ok_or_else(|| entry_not_found(entry_id))?;
        info!(owner_id, entry_id, recipe_id, "reassigned meal");
        Ok(entry)
    }

    pub fn unschedule(&self, owner_id: i64, entry_id: i64) -> PlanResult<()> {
        let db = self.db();
        let entry = check_owner(db.get_meal_plan(entry_id)?, owner_id, entry_id)?;
        if !db.delete_meal_plan(entry.id)? {
            return Err(entry_not_found(entry_id));
        }
        info!(owner_id, entry_id, "unscheduled meal");
        Ok(())
    }

    fn owned_entry(&self, owner_id: i64, entry_id: i64) -> PlanResult<MealPlanEntry> {
        check_owner(self.db().get_meal_plan(entry_id)?, owner_id, entry_id)
    }

    // --- Recipes ---

    /// A recipe `owner_id` may schedule. Missing and hidden recipes are
    /// reported the same way.
    pub async fn visible_recipe(&self, owner_id: i64, recipe_id: i64) -> PlanResult<Recipe> {
        let fetched = tokio::time::timeout(self.lookup_timeout, self.source.fetch(recipe_id))
            .await
            .map_err(|_| {
                PlanError::Internal(anyhow::anyhow!(
                    "recipe lookup for {recipe_id} timed out"
                ))
            })??;
        match fetched {
            Some(recipe) if recipe.is_visible_to(owner_id) => Ok(recipe),
            _ => Err(PlanError::InvalidReference(recipe_id)),
        }
    }

    pub fn import_recipe(&self, recipe: &NewRecipe) -> PlanResult<Recipe> {
        let stored = self.db().insert_recipe(recipe)?;
        info!(recipe_id = stored.id, title = %stored.title, "imported recipe");
        Ok(stored)
    }

    pub fn list_catalog(&self, owner_id: i64) -> PlanResult<Vec<Recipe>> {
        self.db().list_recipes(owner_id)
    }

    // --- Derived views ---

    /// Aggregate every entry in `range`. Recipes that cannot be resolved are
    /// reported as warnings on the list instead of failing the call.
    pub async fn grocery_list(&self, owner_id: i64, range: DateRange) -> PlanResult<GroceryList> {
        let entries = self.list(owner_id, range)?;
        let lookup = fetch_all(
            self.source.as_ref(),
            entries.iter().map(|e| e.recipe_id),
            owner_id,
            self.lookup_timeout,
        )
        .await;

        let mut list = aggregate_with(&entries, &lookup.recipes, self.options);
        for warning in &mut list.warnings {
            if let Some(reason) = lookup.failures.get(&warning.recipe_id) {
                warning.reason.clone_from(reason);
            }
        }
        debug!(
            owner_id,
            %range,
            items = list.total_items,
            warnings = list.warnings.len(),
            "built grocery list"
        );
        Ok(list)
    }

    pub async fn export_ical(&self, owner_id: i64, range: DateRange) -> PlanResult<String> {
        let meals = self.list_planned(owner_id, range).await?;
        render_ics(&meals, Utc::now())
    }

    pub async fn grid(&self, owner_id: i64, range: DateRange) -> PlanResult<Vec<GridDay>> {
        if range.day_count() > MAX_GRID_DAYS {
            return Err(PlanError::validation(
                "end_date",
                format!(
                    "a grid covers at most {MAX_GRID_DAYS} days, {range} has {}",
                    range.day_count()
                ),
            ));
        }
        let meals = self.list_planned(owner_id, range).await?;
        Ok(build_grid(range, &meals))
    }

    /// Apply intents in arrival order until the sender side closes. Each
    /// outcome is sent on `replies`; a dropped reply receiver does not stop
    /// the loop. Returns how many intents were applied successfully.
    pub async fn run_intents(
        &self,
        owner_id: i64,
        mut intents: mpsc::Receiver<ScheduleIntent>,
        replies: mpsc::Sender<IntentOutcome>,
    ) -> usize {
        let mut applied = 0;
        while let Some(intent) = intents.recv().await {
            let result = self.apply(owner_id, intent.clone()).await;
            if result.is_ok() {
                applied += 1;
            }
            let _ = replies.send(IntentOutcome { intent, result }).await;
        }
        applied
    }
}

fn entry_not_found(entry_id: i64) -> PlanError {
    PlanError::NotFound(format!("Meal plan {entry_id} not found"))
}

fn check_owner(
    entry: Option<MealPlanEntry>,
    owner_id: i64,
    entry_id: i64,
) -> PlanResult<MealPlanEntry> {
    match entry {
        None => Err(entry_not_found(entry_id)),
        Some(e) if e.owner_id != owner_id => Err(PlanError::Forbidden(format!(
            "Meal plan {entry_id} belongs to another user"
        ))),
        Some(e) => Ok(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::ics::parse_ics;
    use crate::quantity::Quantity;
    use crate::source::testing::{MemorySource, recipe};

    const OWNER: i64 = 1;
    const OTHER: i64 = 2;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn source() -> MemorySource {
        let mut private = recipe(3, "Family Secret", &[("garlic", Some("4"), "clove")]);
        private.is_public = false;
        private.author_id = Some(OTHER);
        MemorySource::with(vec![
            recipe(1, "Recipe A", &[("flour", Some("2"), "cup"), ("salt", Some("1"), "tsp")]),
            recipe(2, "Recipe B", &[("flour", Some("1"), "cup"), ("egg", Some("2"), "")]),
            private,
        ])
    }

    fn planner_with(source: MemorySource) -> Planner {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        Planner::new(db, Arc::new(source))
    }

    fn planner() -> Planner {
        planner_with(source())
    }

    #[tokio::test]
    async fn test_schedule_upsert_idempotent() {
        let planner = planner();
        let first = planner.schedule(OWNER, d(4), MealSlot::Breakfast, 1, None).await.unwrap();
        let second = planner.schedule(OWNER, d(4), MealSlot::Breakfast, 1, None).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.entry.id, second.entry.id);

        let replaced = planner.schedule(OWNER, d(4), MealSlot::Breakfast, 2, None).await.unwrap();
        assert!(!replaced.created);
        let (first, replaced) = (first.entry, replaced.entry);
        assert_eq!(replaced.id, first.id);
        assert_eq!(replaced.recipe_id, 2);
        assert_eq!(planner.list(OWNER, DateRange::single(d(4))).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_rejects_unknown_or_hidden_recipe() {
        let planner = planner();
        let missing = planner.schedule(OWNER, d(4), MealSlot::Lunch, 99, None).await;
        assert!(matches!(missing, Err(PlanError::InvalidReference(99))));

        let hidden = planner.schedule(OWNER, d(4), MealSlot::Lunch, 3, None).await;
        assert!(matches!(hidden, Err(PlanError::InvalidReference(3))));

        // the author can schedule their own private recipe
        assert!(planner.schedule(OTHER, d(4), MealSlot::Lunch, 3, None).await.is_ok());
        assert!(planner.list(OWNER, DateRange::single(d(4))).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_validates_notes_before_lookup() {
        let planner = planner();
        let err = planner
            .schedule(OWNER, d(4), MealSlot::Lunch, 99, Some("x".repeat(501)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Validation { field: "notes", .. }));
    }

    #[tokio::test]
    async fn test_reassign() {
        let planner = planner();
        let entry = planner.schedule(OWNER, d(4), MealSlot::Dinner, 1, None).await.unwrap().entry;

        let moved = planner.reassign(OWNER, entry.id, 2).await.unwrap();
        assert_eq!(moved.id, entry.id);
        assert_eq!(moved.recipe_id, 2);
        assert_eq!(moved.slot, MealSlot::Dinner);

        assert!(matches!(
            planner.reassign(OTHER, entry.id, 2).await,
            Err(PlanError::Forbidden(_))
        ));
        assert!(matches!(
            planner.reassign(OWNER, 999, 2).await,
            Err(PlanError::NotFound(_))
        ));
        assert!(matches!(
            planner.reassign(OWNER, entry.id, 99).await,
            Err(PlanError::InvalidReference(99))
        ));
    }

    #[tokio::test]
    async fn test_unschedule() {
        let planner = planner();
        let entry = planner.schedule(OWNER, d(4), MealSlot::Dinner, 1, None).await.unwrap().entry;

        assert!(matches!(
            planner.unschedule(OTHER, entry.id),
            Err(PlanError::Forbidden(_))
        ));
        planner.unschedule(OWNER, entry.id).unwrap();
        assert!(matches!(
            planner.unschedule(OWNER, entry.id),
            Err(PlanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_grocery_list_scenario_with_boundaries() {
        let planner = planner();
        // Monday and Tuesday
        planner.schedule(OWNER, d(4), MealSlot::Breakfast, 1, None).await.unwrap();
        planner.schedule(OWNER, d(5), MealSlot::Lunch, 2, None).await.unwrap();
        planner.schedule(OWNER, d(6), MealSlot::Lunch, 2, None).await.unwrap();
        planner.schedule(OTHER, d(4), MealSlot::Lunch, 2, None).await.unwrap();

        let list = planner
            .grocery_list(OWNER, DateRange::new(d(4), d(5)).unwrap())
            .await
            .unwrap();
        assert_eq!(list.total_items, 3);
        assert_eq!(list.source_entry_count, 2);
        let flour = list.find("flour", "cup").unwrap();
        assert_eq!(flour.total_quantity, Quantity::whole(3));
        assert_eq!(flour.category, Category::Pantry);
        assert_eq!(list.find("egg", "").unwrap().total_quantity, Quantity::whole(2));
    }

    #[tokio::test]
    async fn test_grocery_list_survives_missing_recipe() {
        let mut src = source();
        src.recipes.insert(5, recipe(5, "Soon Gone", &[("milk", Some("1"), "cup")]));
        let planner = planner_with(src);
        planner.schedule(OWNER, d(4), MealSlot::Breakfast, 1, None).await.unwrap();
        let doomed = planner.schedule(OWNER, d(4), MealSlot::Dinner, 5, None).await.unwrap().entry;

        // the recipe disappears after scheduling
        let planner = Planner {
            source: Arc::new(source()),
            ..planner
        };
        let list = planner
            .grocery_list(OWNER, DateRange::single(d(4)))
            .await
            .unwrap();
        assert_eq!(list.source_entry_count, 1);
        assert_eq!(list.total_items, 2);
        assert_eq!(list.warnings.len(), 1);
        assert_eq!(list.warnings[0].entry_id, doomed.id);
        assert_eq!(list.warnings[0].reason, "recipe not found");
    }

    #[tokio::test]
    async fn test_grocery_list_cancelled_when_dropped() {
        let mut src = source();
        src.delays.insert(2, Duration::from_secs(30));
        let planner = planner_with(src).with_lookup_timeout(Duration::from_secs(60));
        planner.schedule(OWNER, d(4), MealSlot::Breakfast, 1, None).await.unwrap();
        // schedule needs the slow lookup too, so insert directly
        planner
            .db()
            .upsert_meal_plan(&NewMealPlanEntry {
                owner_id: OWNER,
                date: d(4),
                slot: MealSlot::Lunch,
                recipe_id: 2,
                notes: None,
            })
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            planner.grocery_list(OWNER, DateRange::single(d(4))),
        )
        .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_export_ical_round_trip() {
        let planner = planner();
        planner
            .schedule(OWNER, d(4), MealSlot::Breakfast, 1, Some("double batch".into()))
            .await
            .unwrap();
        planner.schedule(OWNER, d(5), MealSlot::Dessert, 2, None).await.unwrap();

        let ics = planner
            .export_ical(OWNER, DateRange::new(d(4), d(5)).unwrap())
            .await
            .unwrap();
        let events = parse_ics(&ics).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, d(4));
        assert_eq!(events[0].slot_and_title(), Some((MealSlot::Breakfast, "Recipe A")));
        assert_eq!(events[0].description.as_deref(), Some("double batch"));
        assert_eq!(events[1].slot_and_title(), Some((MealSlot::Dessert, "Recipe B")));
    }

    #[tokio::test]
    async fn test_grid() {
        let planner = planner();
        planner.schedule(OWNER, d(4), MealSlot::Dinner, 1, None).await.unwrap();
        let grid = planner
            .grid(OWNER, DateRange::new(d(3), d(5)).unwrap())
            .await
            .unwrap();
        assert_eq!(grid.len(), 3);
        let meal = grid[1].cell(MealSlot::Dinner).unwrap();
        assert_eq!(meal.recipe_title.as_deref(), Some("Recipe A"));
    }

    #[tokio::test]
    async fn test_grid_rejects_oversized_range() {
        let planner = planner();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let leap_year = DateRange::new(start, end).unwrap();
        assert_eq!(planner.grid(OWNER, leap_year).await.unwrap().len(), 366);

        let everything = DateRange::new(
            NaiveDate::from_ymd_opt(1, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(9999, 12, 31).unwrap(),
        )
        .unwrap();
        let err = planner.grid(OWNER, everything).await.unwrap_err();
        assert!(matches!(err, PlanError::Validation { field: "end_date", .. }));
    }

    #[tokio::test]
    async fn test_run_intents_in_order() {
        let planner = planner();
        let (intent_tx, intent_rx) = mpsc::channel(8);
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        let intents = vec![
            ScheduleIntent { recipe_id: 1, date: d(4), slot: MealSlot::Lunch, notes: None },
            ScheduleIntent { recipe_id: 99, date: d(4), slot: MealSlot::Dinner, notes: None },
            ScheduleIntent { recipe_id: 2, date: d(4), slot: MealSlot::Lunch, notes: None },
        ];
        for intent in intents.clone() {
            intent_tx.send(intent).await.unwrap();
        }
        drop(intent_tx);

        let applied = planner.run_intents(OWNER, intent_rx, reply_tx).await;
        assert_eq!(applied, 2);

        let mut outcomes = Vec::new();
        while let Some(outcome) = reply_rx.recv().await {
            outcomes.push(outcome);
        }
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].intent, intents[0]);
        assert!(matches!(outcomes[1].result, Err(PlanError::InvalidReference(99))));

        let entries = planner.list(OWNER, DateRange::single(d(4))).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].recipe_id, 2);
    }
}
