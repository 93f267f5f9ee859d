use anyhow::{Context, Result, bail};
use std::fmt::Write as _;
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{NewRecipe, RecipeIngredient, RecipePayload};
use larder_core::quantity::Quantity;
use larder_core::service::Planner;

use super::helpers::{exit_if_missing, truncate};

/// Import recipes into the local catalog from a `.json` file (one recipe
/// or an array) or a Cooklang `.cook` file.
pub(crate) fn cmd_recipe_import(
    planner: &Planner,
    owner_id: i64,
    file: &Path,
    private: bool,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let is_cook = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cook"));

    let mut recipes = if is_cook {
        vec![parse_cooklang(&input, file)?]
    } else {
        parse_json_recipes(&input)?
    };

    for recipe in &mut recipes {
        if recipe.author_id.is_none() {
            recipe.author_id = Some(owner_id);
        }
        if private {
            recipe.is_public = false;
        }
    }

    let mut stored = Vec::with_capacity(recipes.len());
    for recipe in &recipes {
        stored.push(planner.import_recipe(recipe)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        for r in &stored {
            println!(
                "Imported recipe {}: {} ({} ingredients, {} steps)",
                r.id,
                r.title,
                r.ingredients.len(),
                r.instructions.steps().len()
            );
        }
    }
    Ok(())
}

fn parse_json_recipes(input: &str) -> Result<Vec<NewRecipe>> {
    let value: serde_json::Value =
        serde_json::from_str(input).context("Failed to parse recipe JSON")?;
    let payloads: Vec<RecipePayload> = if value.is_array() {
        serde_json::from_value(value).context("Invalid recipe in JSON array")?
    } else {
        vec![serde_json::from_value(value).context("Invalid recipe JSON")?]
    };
    if payloads.is_empty() {
        bail!("No recipes found in file");
    }
    payloads
        .into_iter()
        .map(|p| p.into_new_recipe().map_err(Into::into))
        .collect()
}

fn parse_cooklang(input: &str, file: &Path) -> Result<NewRecipe> {
    let (recipe_data, _report) = cooklang::parse(input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let title = recipe_data
        .metadata
        .title()
        .map(String::from)
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe title")?;

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);

    let ingredients = grouped
        .iter()
        .map(|gi| cooklang_ingredient(gi))
        .collect::<Result<Vec<_>>>()?;

    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let payload = RecipePayload {
        id: None,
        title,
        author_id: None,
        is_public: true,
        ingredients: Vec::new(),
        instructions: Some(cooklang_steps(&recipe_data)),
    };
    let mut recipe = payload.into_new_recipe()?;
    recipe.ingredients = ingredients;
    Ok(recipe)
}

fn cooklang_ingredient(
    gi: &cooklang::ingredient_list::GroupedIngredient<'_>,
) -> Result<RecipeIngredient> {
    let name = gi.ingredient.display_name().trim().to_string();
    let (quantity, unit) = match gi.quantity.iter().next() {
        None => (None, String::new()),
        Some(qty) => {
            let value = match qty.value() {
                cooklang::Value::Number(n) => Some(Quantity::from_f64(n.value())?),
                cooklang::Value::Range { start, .. } => Some(Quantity::from_f64(start.value())?),
                // "a pinch" and friends carry no amount
                cooklang::Value::Text(t) => t.parse::<Quantity>().ok(),
            };
            (value, qty.unit().unwrap_or_default().to_string())
        }
    };

    if name.is_empty() {
        bail!("Cooklang ingredient without a name");
    }
    Ok(RecipeIngredient {
        name,
        quantity,
        unit,
        notes: gi.ingredient.note.clone().unwrap_or_default(),
    })
}

/// Step text of a parsed Cooklang recipe, one line per step. Ingredient,
/// cookware and timer references are written out; text paragraphs are notes
/// and stay out of the steps.
fn cooklang_steps(recipe: &cooklang::Recipe) -> String {
    recipe
        .sections
        .iter()
        .flat_map(|section| &section.content)
        .filter_map(|content| match content {
            cooklang::Content::Step(step) => Some(step_text(recipe, step)),
            cooklang::Content::Text(_) => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn step_text(recipe: &cooklang::Recipe, step: &cooklang::Step) -> String {
    let mut text = String::new();
    for item in &step.items {
        match item {
            cooklang::Item::Text { value } => text.push_str(value),
            cooklang::Item::Ingredient { index } => {
                if let Some(ingredient) = recipe.ingredients.get(*index) {
                    text.push_str(&ingredient.display_name());
                }
            }
            cooklang::Item::Cookware { index } => {
                if let Some(cookware) = recipe.cookware.get(*index) {
                    text.push_str(cookware.display_name());
                }
            }
            cooklang::Item::Timer { index } => match recipe.timers.get(*index) {
                Some(cooklang::Timer {
                    quantity: Some(q), ..
                }) => {
                    let _ = write!(text, "{q}");
                }
                Some(cooklang::Timer {
                    name: Some(name), ..
                }) => text.push_str(name),
                _ => {}
            },
            cooklang::Item::InlineQuantity { index } => {
                if let Some(q) = recipe.inline_quantities.get(*index) {
                    let _ = write!(text, "{q}");
                }
            }
        }
    }
    // comments leave doubled spaces behind
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) async fn cmd_recipe_show(
    planner: &Planner,
    owner_id: i64,
    recipe_id: i64,
    json: bool,
) -> Result<()> {
    let recipe = planner
        .visible_recipe(owner_id, recipe_id)
        .await
        .map_err(|e| exit_if_missing(e, json))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    println!("=== {} ===", recipe.title);
    let visibility = if recipe.is_public { "public" } else { "private" };
    println!("  Recipe {}  |  {visibility}\n", recipe.id);

    println!("  INGREDIENTS:");
    for ing in &recipe.ingredients {
        let amount = match ing.quantity {
            Some(q) if ing.unit.is_empty() => format!("{q} "),
            Some(q) => format!("{q} {} ", ing.unit),
            None => String::new(),
        };
        if ing.notes.is_empty() {
            println!("    {amount}{}", ing.name);
        } else {
            println!("    {amount}{} ({})", ing.name, ing.notes);
        }
    }

    let steps = recipe.instructions.steps();
    if !steps.is_empty() {
        println!("\n  STEPS:");
        for (i, step) in steps.iter().enumerate() {
            println!("    {}. {}", i + 1, step.text);
            if let Some(url) = &step.image_url {
                println!("       [image: {url}]");
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(planner: &Planner, owner_id: i64, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Visibility")]
        visibility: &'static str,
    }

    let recipes = planner.list_catalog(owner_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }
    if recipes.is_empty() {
        eprintln!("No recipes found. Import one with `larder recipe import FILE`");
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 40),
            ingredients: r.ingredients.len(),
            visibility: if r.is_public { "public" } else { "private" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::instructions::{Instructions, parse_instructions};

    fn steps_of(input: &str) -> String {
        let (recipe, _report) = cooklang::parse(input)
            .into_result()
            .map_err(|e| e.to_string())
            .unwrap();
        cooklang_steps(&recipe)
    }

    #[test]
    fn test_cooklang_steps() {
        let input = "---\ntitle: Pancakes\n---\n\
                     Whisk @eggs{2} and @milk{1%cup}. -- keep cold\n\
                     Fold in @flour{1.5%cup}.\n\n\
                     Fry in a #pan{} for ~{3%minutes}.\n";
        let steps = steps_of(input);
        assert_eq!(
            steps,
            "Whisk eggs and milk. Fold in flour.\nFry in a pan for 3 minutes."
        );
        match parse_instructions(&steps) {
            Instructions::PlainText { lines } => assert_eq!(lines.len(), 2),
            other => panic!("expected plain text, got {other:?}"),
        }
    }

    #[test]
    fn test_cooklang_notes_and_block_comments_stay_out_of_steps() {
        let input = "> Family favourite, serves four.\n\n\
                     Stir @flour{1%cup} [- grandma says slowly -] into the bowl.\n";
        assert_eq!(steps_of(input), "Stir flour into the bowl.");
    }

    #[test]
    fn test_cooklang_multiword_names() {
        let input = "Add @olive oil{2%tbsp} to the #frying pan{}.\n";
        assert_eq!(steps_of(input), "Add olive oil to the frying pan.");
    }

    #[test]
    fn test_parse_json_recipes_single_and_array() {
        let single = parse_json_recipes(
            r#"{"title": "Toast", "ingredients": [{"name": "bread", "quantity": 2}]}"#,
        )
        .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].ingredients[0].quantity, Some(Quantity::whole(2)));

        let many = parse_json_recipes(r#"[{"title": "A"}, {"title": "B", "is_public": false}]"#)
            .unwrap();
        assert_eq!(many.len(), 2);
        assert!(!many[1].is_public);

        assert!(parse_json_recipes("[]").is_err());
        assert!(parse_json_recipes(r#"{"title": ""}"#).is_err());
    }

    #[test]
    fn test_parse_cooklang_recipe() {
        let input = "---\ntitle: Weeknight Pancakes\n---\n\
                     Whisk @eggs{2}, @milk{1%cup} and @flour{1.5%cup}.\n\n\
                     Season with @salt.\n";
        let recipe = parse_cooklang(input, Path::new("pancakes.cook")).unwrap();
        assert_eq!(recipe.title, "Weeknight Pancakes");
        let flour = recipe.ingredients.iter().find(|i| i.name == "flour").unwrap();
        assert_eq!(flour.quantity.map(Quantity::hundredths), Some(150));
        assert_eq!(flour.unit, "cup");
        let salt = recipe.ingredients.iter().find(|i| i.name == "salt").unwrap();
        assert!(salt.quantity.is_none());
        assert!(recipe.instructions.contains("Season with salt."));
    }
}
