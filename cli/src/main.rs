mod backend;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::backend::HttpRecipeSource;
use crate::commands::{
    RangeSelection, cmd_export_ical, cmd_grocery, cmd_ical_preview, cmd_plan_apply, cmd_plan_grid,
    cmd_plan_list, cmd_plan_reassign, cmd_plan_remove, cmd_plan_schedule, cmd_recipe_import,
    cmd_recipe_list, cmd_recipe_show, resolve_range,
};
use crate::config::Config;
use larder_core::db::Database;
use larder_core::grocery::AggregateOptions;
use larder_core::service::Planner;
use larder_core::source::{CatalogSource, RecipeSource};

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Plan meals on a calendar and turn them into a grocery list"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Date range selection shared by every command that reads the plan.
#[derive(Args, Debug)]
struct RangeArgs {
    /// First day of the range (YYYY-MM-DD or today/yesterday/tomorrow)
    #[arg(long)]
    start: Option<String>,
    /// Last day of the range (inclusive, default: same as --start)
    #[arg(long)]
    end: Option<String>,
    /// Day inside the week or month to show (default: today)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    anchor: Option<String>,
    /// Range around the anchor: week (Sunday to Saturday) or month
    #[arg(long, conflicts_with_all = ["start", "end"])]
    view: Option<String>,
    /// Move the anchor by N weeks or months (negative moves back)
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        conflicts_with_all = ["start", "end"]
    )]
    shift: i32,
}

impl From<RangeArgs> for RangeSelection {
    fn from(args: RangeArgs) -> Self {
        RangeSelection {
            start: args.start,
            end: args.end,
            anchor: args.anchor,
            view: args.view,
            shift: args.shift,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// View and edit the meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Build the grocery list for a date range
    Grocery {
        #[command(flatten)]
        range: RangeArgs,
        /// Output format: text, json or csv
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Merge spellings of the same unit (tbsp/tbs, cups/cup)
        #[arg(long)]
        canonical_units: bool,
        /// Output as JSON (same as --format json)
        #[arg(long)]
        json: bool,
    },
    /// Export planned meals as an iCalendar file
    ExportIcal {
        #[command(flatten)]
        range: RangeArgs,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// List the events in an iCalendar file
    IcalPreview {
        /// Path to the .ics file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the local recipe catalog
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
        /// Merge spellings of the same unit in grocery lists
        #[arg(long)]
        canonical_units: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// List planned meals
    List {
        #[command(flatten)]
        range: RangeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put a recipe on a date and slot, replacing whatever was there
    Schedule {
        /// Recipe ID
        recipe_id: i64,
        /// Slot: breakfast, lunch, dinner, snack or dessert
        #[arg(short, long, default_value = "dinner")]
        slot: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Point a planned meal at another recipe
    Reassign {
        /// Meal plan entry ID
        entry_id: i64,
        /// New recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a planned meal
    Remove {
        /// Meal plan entry ID
        entry_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the plan as a calendar grid
    Grid {
        #[command(flatten)]
        range: RangeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a JSON array of {recipe_id, date, slot, notes} intents in order
    Apply {
        /// Path to the JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Import recipes from a .json or Cooklang (.cook) file
    Import {
        /// Path to the recipe file
        file: PathBuf,
        /// Only visible to you
        #[arg(long)]
        private: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes you can schedule
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details (ingredients and steps)
    Show {
        /// Recipe ID
        recipe_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Logs go to stderr. `LARDER_LOG` overrides the default level.
fn init_logging(serving: bool) {
    let default = if serving { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("LARDER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_planner(config: &Config, canonical_units: bool) -> Result<Planner> {
    let db = Arc::new(Mutex::new(Database::open(&config.db_path)?));
    let source: Arc<dyn RecipeSource> = match &config.backend_url {
        Some(url) => {
            info!(%url, "using remote recipe backend");
            Arc::new(HttpRecipeSource::new(url)?)
        }
        None => Arc::new(CatalogSource::new(Arc::clone(&db))),
    };
    Ok(Planner::new(db, source).with_options(AggregateOptions { canonical_units }))
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let canonical_units = matches!(
        cli.command,
        Commands::Grocery {
            canonical_units: true,
            ..
        } | Commands::Serve {
            canonical_units: true,
            ..
        }
    );
    let planner = build_planner(&config, canonical_units)?;
    let owner = config.owner_id;

    match cli.command {
        Commands::Plan { command } => match command {
            PlanCommands::List { range, json } => {
                let range = resolve_range(range.into())?;
                cmd_plan_list(&planner, owner, range, json).await
            }
            PlanCommands::Schedule {
                recipe_id,
                slot,
                date,
                notes,
                json,
            } => cmd_plan_schedule(&planner, owner, recipe_id, date, &slot, notes, json).await,
            PlanCommands::Reassign {
                entry_id,
                recipe_id,
                json,
            } => cmd_plan_reassign(&planner, owner, entry_id, recipe_id, json).await,
            PlanCommands::Remove { entry_id, json } => {
                cmd_plan_remove(&planner, owner, entry_id, json)
            }
            PlanCommands::Grid { range, json } => {
                let range = resolve_range(range.into())?;
                cmd_plan_grid(&planner, owner, range, json).await
            }
            PlanCommands::Apply { file, json } => {
                cmd_plan_apply(&planner, owner, &file, json).await
            }
        },
        Commands::Grocery {
            range,
            format,
            out,
            canonical_units: _,
            json,
        } => {
            let range = resolve_range(range.into())?;
            cmd_grocery(&planner, owner, range, &format, out.as_deref(), json).await
        }
        Commands::ExportIcal { range, out } => {
            let range = resolve_range(range.into())?;
            cmd_export_ical(&planner, owner, range, out.as_deref()).await
        }
        Commands::IcalPreview { file, json } => cmd_ical_preview(&file, json),
        Commands::Recipe { command } => match command {
            RecipeCommands::Import {
                file,
                private,
                json,
            } => cmd_recipe_import(&planner, owner, &file, private, json),
            RecipeCommands::List { json } => cmd_recipe_list(&planner, owner, json),
            RecipeCommands::Show { recipe_id, json } => {
                cmd_recipe_show(&planner, owner, recipe_id, json).await
            }
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
            canonical_units: _,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            server::start_server(Arc::new(planner), port, &bind, api_key, owner).await
        }
    }
}
