use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use larder_core::error::{PlanError, PlanResult};
use larder_core::models::{Recipe, RecipePayload};
use larder_core::source::RecipeSource;

/// Recipes served by a remote backend at `GET {base}/recipes/{id}`.
pub struct HttpRecipeSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecipeSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let url = format!("{}/recipes/{id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach recipe backend")?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => return Ok(None),
            status if !status.is_success() => {
                anyhow::bail!("Recipe backend returned {status} for recipe {id}")
            }
            _ => {}
        }

        let payload: RecipePayload = resp
            .json()
            .await
            .context("Failed to parse recipe backend response")?;
        let recipe = payload
            .validate(id)
            .with_context(|| format!("Recipe backend sent an invalid recipe {id}"))?;
        Ok(Some(recipe))
    }
}

#[async_trait]
impl RecipeSource for HttpRecipeSource {
    async fn fetch(&self, id: i64) -> PlanResult<Option<Recipe>> {
        self.fetch_recipe(id).await.map_err(PlanError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};

    async fn serve_fixture() -> String {
        async fn recipe(Path(id): Path<i64>) -> Result<Json<serde_json::Value>, StatusCode> {
            match id {
                1 => Ok(Json(serde_json::json!({
                    "title": "Pancakes",
                    "ingredients": [
                        {"name": "flour", "quantity": "1.5", "unit": "cup"},
                        {"name": "salt"}
                    ],
                    "instructions": "Mix\nFry"
                }))),
                2 => Ok(Json(serde_json::json!({"title": "  ", "ingredients": []}))),
                3 => Err(StatusCode::INTERNAL_SERVER_ERROR),
                _ => Err(StatusCode::NOT_FOUND),
            }
        }

        let app = Router::new().route("/recipes/{id}", get(recipe));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_fetch_valid_recipe() {
        let source = HttpRecipeSource::new(&serve_fixture().await).unwrap();
        let recipe = source.fetch(1).await.unwrap().unwrap();
        assert_eq!(recipe.id, 1);
        assert_eq!(recipe.title, "Pancakes");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.ingredients[0].quantity.unwrap().hundredths(), 150);
        assert!(recipe.ingredients[1].quantity.is_none());
        assert_eq!(recipe.instructions.steps().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_missing_recipe_is_none() {
        let source = HttpRecipeSource::new(&serve_fixture().await).unwrap();
        assert!(source.fetch(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_invalid_payload_and_server_error() {
        let source = HttpRecipeSource::new(&serve_fixture().await).unwrap();
        let err = source.fetch(2).await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid recipe 2"));
        assert!(source.fetch(3).await.is_err());
    }
}
