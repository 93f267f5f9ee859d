use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::PlanResult;
use crate::models::{
    MealPlanEntry, MealSlot, NewMealPlanEntry, NewRecipe, Recipe, RecipeIngredient, Scheduled,
};
use crate::quantity::Quantity;
use crate::range::DateRange;

pub struct Database {
    conn: Connection,
}

const MEAL_PLAN_COLUMNS: &str =
    "id, uuid, owner_id, date, slot, recipe_id, notes, created_at, updated_at";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    title TEXT NOT NULL,
                    author_id INTEGER,
                    is_public INTEGER NOT NULL DEFAULT 1,
                    instructions TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    quantity_hundredths INTEGER,
                    unit TEXT NOT NULL DEFAULT '',
                    notes TEXT NOT NULL DEFAULT ''
                );

                -- no foreign key on recipe_id: removing a recipe leaves
                -- scheduled entries in place
                CREATE TABLE IF NOT EXISTS meal_plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    owner_id INTEGER NOT NULL,
                    date TEXT NOT NULL,
                    slot TEXT NOT NULL,
                    recipe_id INTEGER NOT NULL,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE(owner_id, date, slot)
                );

                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_meal_plans_owner_date ON meal_plans(owner_id, date);

                PRAGMA user_version = 1;",
            )?;
        }

        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    // --- Row mapping ---

    fn meal_plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealPlanEntry> {
        let date_str: String = row.get(3)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let slot_str: String = row.get(4)?;
        let slot: MealSlot = slot_str
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(MealPlanEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            owner_id: row.get(2)?,
            date,
            slot,
            recipe_id: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeIngredient> {
        Ok(RecipeIngredient {
            name: row.get(0)?,
            quantity: row
                .get::<_, Option<i64>>(1)?
                .map(Quantity::from_hundredths),
            unit: row.get(2)?,
            notes: row.get(3)?,
        })
    }

    // --- Recipe catalog ---

    /// Store a recipe with its ingredients. A recipe carrying an explicit id
    /// replaces the stored recipe with that id.
    pub fn insert_recipe(&self, recipe: &NewRecipe) -> PlanResult<Recipe> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO recipes (id, uuid, title, author_id, is_public, instructions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author_id = excluded.author_id,
                is_public = excluded.is_public,
                instructions = excluded.instructions,
                updated_at = excluded.updated_at",
            params![
                recipe.id,
                uuid,
                recipe.title,
                recipe.author_id,
                recipe.is_public,
                recipe.instructions,
                now,
                now,
            ],
        )?;
        let id = match recipe.id {
            Some(id) => id,
            None => tx.last_insert_rowid(),
        };

        tx.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_id = ?1",
            params![id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recipe_ingredients (recipe_id, position, name, quantity_hundredths, unit, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, ing) in recipe.ingredients.iter().enumerate() {
                stmt.execute(params![
                    id,
                    position as i64,
                    ing.name,
                    ing.quantity.map(Quantity::hundredths),
                    ing.unit,
                    ing.notes,
                ])?;
            }
        }
        tx.commit()?;

        debug!(recipe_id = id, ingredients = recipe.ingredients.len(), "stored recipe");
        Ok(recipe.clone().into_recipe(id))
    }

    pub fn get_recipe(&self, id: i64) -> PlanResult<Option<Recipe>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, title, author_id, is_public, instructions FROM recipes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(NewRecipe {
                        id: Some(row.get(0)?),
                        title: row.get(1)?,
                        author_id: row.get(2)?,
                        is_public: row.get(3)?,
                        ingredients: Vec::new(),
                        instructions: row.get(4)?,
                    })
                },
            )
            .optional()?;
        let Some(mut recipe) = header else {
            return Ok(None);
        };
        recipe.ingredients = self.get_recipe_ingredients(id)?;
        Ok(Some(recipe.into_recipe(id)))
    }

    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> PlanResult<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, quantity_hundredths, unit, notes
             FROM recipe_ingredients WHERE recipe_id = ?1
             ORDER BY position",
        )?;
        let ingredients = stmt
            .query_map(params![recipe_id], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Every recipe visible to `owner_id`, ordered by title.
    pub fn list_recipes(&self, owner_id: i64) -> PlanResult<Vec<Recipe>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM recipes
                 WHERE is_public = 1 OR author_id = ?1
                 ORDER BY title COLLATE NOCASE, id",
            )?;
            stmt.query_map(params![owner_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut recipes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(recipe) = self.get_recipe(id)? {
                recipes.push(recipe);
            }
        }
        Ok(recipes)
    }

    pub fn delete_recipe(&self, id: i64) -> PlanResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Meal plans ---

    /// Entries of `owner_id` dated within `range`, both ends inclusive,
    /// ordered by date then slot.
    pub fn list_meal_plans(&self, owner_id: i64, range: DateRange) -> PlanResult<Vec<MealPlanEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_PLAN_COLUMNS} FROM meal_plans
             WHERE owner_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date, id"
        ))?;
        let mut entries = stmt
            .query_map(
                params![
                    owner_id,
                    range.start.format("%Y-%m-%d").to_string(),
                    range.end.format("%Y-%m-%d").to_string(),
                ],
                Self::meal_plan_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| (e.date, e.slot));
        Ok(entries)
    }

    /// Create the entry for `(owner, date, slot)`, or point the existing one
    /// at the new recipe. The existing row keeps its id and uuid, so a
    /// returned uuid other than the one offered marks a replacement.
    pub fn upsert_meal_plan(&self, entry: &NewMealPlanEntry) -> PlanResult<Scheduled> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let date_str = entry.date.format("%Y-%m-%d").to_string();
        let stored = self.conn.query_row(
            &format!(
                "INSERT INTO meal_plans (uuid, owner_id, date, slot, recipe_id, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(owner_id, date, slot) DO UPDATE SET
                    recipe_id = excluded.recipe_id,
                    notes = excluded.notes,
                    updated_at = excluded.updated_at
                 RETURNING {MEAL_PLAN_COLUMNS}"
            ),
            params![
                uuid,
                entry.owner_id,
                date_str,
                entry.slot.as_str(),
                entry.recipe_id,
                entry.notes,
                now,
                now,
            ],
            Self::meal_plan_from_row,
        )?;
        let created = stored.uuid == uuid;
        debug!(entry_id = stored.id, created, "upserted meal plan");
        Ok(Scheduled {
            entry: stored,
            created,
        })
    }

    pub fn get_meal_plan(&self, id: i64) -> PlanResult<Option<MealPlanEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_PLAN_COLUMNS} FROM meal_plans WHERE id = ?1"),
                params![id],
                Self::meal_plan_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn update_meal_plan_recipe(&self, id: i64, recipe_id: i64) -> PlanResult<Option<MealPlanEntry>> {
        let now = Local::now().to_rfc3339();
        let entry = self
            .conn
            .query_row(
                &format!(
                    "UPDATE meal_plans SET recipe_id = ?1, updated_at = ?2 WHERE id = ?3
                     RETURNING {MEAL_PLAN_COLUMNS}"
                ),
                params![recipe_id, now, id],
                Self::meal_plan_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn delete_meal_plan(&self, id: i64) -> PlanResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meal_plans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
