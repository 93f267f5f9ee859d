use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::db::Database;
use crate::error::PlanResult;
use crate::models::Recipe;

/// Where recipes come from. Recipe storage is owned elsewhere; the planner
/// only ever reads through this seam.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// `Ok(None)` when the recipe does not exist.
    async fn fetch(&self, id: i64) -> PlanResult<Option<Recipe>>;
}

/// Recipes from the local SQLite catalog.
pub struct CatalogSource {
    db: Arc<Mutex<Database>>,
}

impl CatalogSource {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipeSource for CatalogSource {
    async fn fetch(&self, id: i64) -> PlanResult<Option<Recipe>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_recipe(id)
    }
}

/// Outcome of a fan-out lookup: recipes that resolved and are visible, plus
/// a reason for every id that did not.
#[derive(Debug, Default)]
pub struct Lookup {
    pub recipes: HashMap<i64, Recipe>,
    pub failures: HashMap<i64, String>,
}

/// Fetch every distinct id concurrently, each bounded by `timeout`. Lookups
/// that fail, time out, or return a recipe `owner_id` may not see are
/// reported in `failures`; the rest are still returned.
pub async fn fetch_all(
    source: &dyn RecipeSource,
    ids: impl IntoIterator<Item = i64>,
    owner_id: i64,
    timeout: Duration,
) -> Lookup {
    let distinct: BTreeSet<i64> = ids.into_iter().collect();
    let lookups = distinct.into_iter().map(|id| async move {
        let outcome = match tokio::time::timeout(timeout, source.fetch(id)).await {
            Ok(Ok(Some(recipe))) if recipe.is_visible_to(owner_id) => Ok(recipe),
            Ok(Ok(Some(_))) => Err("recipe is not visible to this owner".to_string()),
            Ok(Ok(None)) => Err("recipe not found".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("lookup timed out after {}ms", timeout.as_millis())),
        };
        (id, outcome)
    });

    let mut lookup = Lookup::default();
    for (id, outcome) in join_all(lookups).await {
        match outcome {
            Ok(recipe) => {
                lookup.recipes.insert(id, recipe);
            }
            Err(reason) => {
                warn!(recipe_id = id, %reason, "recipe lookup failed");
                lookup.failures.insert(id, reason);
            }
        }
    }
    lookup
}


#[cfg(test)]
mod tests {
    use super::testing::{MemorySource, recipe};
    use super::*;
    use crate::models::NewRecipe;

    #[tokio::test]
    async fn test_fetch_all_partial_results() {
        let mut private = recipe(3, "Private", &[]);
        private.is_public = false;
        private.author_id = Some(9);
        let mut source = MemorySource::with(vec![recipe(1, "A", &[]), recipe(2, "B", &[]), private]);
        source.broken.insert(2);

        let lookup = fetch_all(&source, [1, 1, 2, 3, 4], 1, Duration::from_secs(1)).await;
        assert_eq!(lookup.recipes.len(), 1);
        assert!(lookup.recipes.contains_key(&1));
        assert_eq!(lookup.failures.len(), 3);
        assert!(lookup.failures[&2].contains("backend unavailable"));
        assert_eq!(lookup.failures[&3], "recipe is not visible to this owner");
        assert_eq!(lookup.failures[&4], "recipe not found");
    }

    #[tokio::test]
    async fn test_fetch_all_times_out_slow_lookups() {
        let mut source = MemorySource::with(vec![recipe(1, "Fast", &[]), recipe(2, "Slow", &[])]);
        source.delays.insert(2, Duration::from_secs(5));

        let lookup = fetch_all(&source, [1, 2], 1, Duration::from_millis(50)).await;
        assert!(lookup.recipes.contains_key(&1));
        assert!(lookup.failures[&2].starts_with("lookup timed out"));
    }

    #[tokio::test]
    async fn test_catalog_source() {
        let db = Database::open_in_memory().unwrap();
        let stored = db
            .insert_recipe(&NewRecipe {
                id: None,
                title: "Toast".into(),
                author_id: None,
                is_public: true,
                ingredients: Vec::new(),
                instructions: String::new(),
            })
            .unwrap();
        let source = CatalogSource::new(Arc::new(Mutex::new(db)));

        assert_eq!(source.fetch(stored.id).await.unwrap().unwrap().title, "Toast");
        assert!(source.fetch(stored.id + 1).await.unwrap().is_none());
    }
}
