mod commands;
mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    LogArgs, cmd_dates, cmd_day, cmd_entry_delete, cmd_export, cmd_fav_list, cmd_fav_toggle,
    cmd_import, cmd_log, cmd_person_add, cmd_person_delete, cmd_person_list, cmd_recent, cmd_seed,
    cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_range, cmd_wipe,
};
use crate::config::Config;
use macrotrack_core::models::{MacroTargets, Nutrition};
use macrotrack_core::{DatastoreConfig, StoreHandle};

#[derive(Parser)]
#[command(
    name = "macrotrack",
    version,
    about = "A local-first food and weight logger for one household"
)]
struct Cli {
    /// Person to act on, by id or name (default: the only person)
    #[arg(long, global = true)]
    person: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Nutrition per 100 g, all optional.
#[derive(Args)]
struct NutritionArgs {
    /// Calories per 100 g
    #[arg(long)]
    kcal: Option<f64>,
    /// Protein grams per 100 g
    #[arg(long)]
    protein: Option<f64>,
    /// Carbohydrate grams per 100 g
    #[arg(long)]
    carb: Option<f64>,
    /// Fat grams per 100 g
    #[arg(long)]
    fat: Option<f64>,
}

impl From<NutritionArgs> for Nutrition {
    fn from(args: NutritionArgs) -> Self {
        Nutrition {
            kcal_per_100g: args.kcal,
            protein_per_100g: args.protein,
            carb_per_100g: args.carb,
            fat_per_100g: args.fat,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the people in this household
    Person {
        #[command(subcommand)]
        command: PersonCommands,
    },
    /// Log a food entry
    Log {
        /// Food name
        food: String,
        /// Amount eaten (e.g. "150", "150g"); defaults to the last portion of this food
        amount: Option<String>,
        /// Stable food id (default: derived from the name)
        #[arg(long)]
        food_id: Option<String>,
        #[command(flatten)]
        nutrition: NutritionArgs,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time of day (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one day's entries and totals
    Day {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the days that have entries
    Dates {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a logged entry
    Delete {
        /// Entry id
        entry_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record and review body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage favorite foods
    Fav {
        #[command(subcommand)]
        command: FavCommands,
    },
    /// Show recently logged foods
    Recent {
        /// Maximum number of foods to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export every collection as a JSON snapshot
    Export {
        /// Write to this file instead of stdout
        file: Option<PathBuf>,
        /// Output a JSON summary (only with a file)
        #[arg(long)]
        json: bool,
    },
    /// Replace all data with a JSON snapshot
    Import {
        /// Snapshot file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace people and their logs with sample data
    Seed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all data
    Wipe {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PersonCommands {
    /// Add a person
    Add {
        /// Display name
        name: String,
        /// Daily calorie goal
        #[arg(long, default_value_t = 2000.0)]
        kcal_goal: f64,
        /// Daily protein target in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Daily carbohydrate target in grams
        #[arg(long)]
        carb: Option<f64>,
        /// Daily fat target in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List people
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a person and everything they logged
    Delete {
        /// Person id or name
        selector: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Record a weigh-in
    Log {
        /// Weight value
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weigh-ins, newest first
    History {
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weigh-ins between two dates, oldest first
    Range {
        /// First day (YYYY-MM-DD)
        start: String,
        /// Last day (YYYY-MM-DD, default: today)
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weigh-in
    Delete {
        /// Weight log id
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FavCommands {
    /// Add a food to favorites, or remove it if already there
    Toggle {
        /// Food name
        food: String,
        /// Stable food id (default: derived from the name)
        #[arg(long)]
        food_id: Option<String>,
        #[command(flatten)]
        nutrition: NutritionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List favorites
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(path = %config.db_path.display(), "Using database");
    let store = StoreHandle::open(config.db_path, DatastoreConfig::default()).await?;

    let result = dispatch(&store, cli).await;
    store.close().await?;
    result
}

#[allow(clippy::too_many_lines)]
async fn dispatch(store: &StoreHandle, cli: Cli) -> Result<()> {
    let person = cli.person.as_deref();

    match cli.command {
        Commands::Person { command } => match command {
            PersonCommands::Add {
                name,
                kcal_goal,
                protein,
                carb,
                fat,
                json,
            } => {
                let targets = MacroTargets { protein, carb, fat };
                cmd_person_add(store, &name, kcal_goal, targets, json).await
            }
            PersonCommands::List { json } => cmd_person_list(store, json).await,
            PersonCommands::Delete { selector, json } => {
                cmd_person_delete(store, &selector, json).await
            }
        },
        Commands::Log {
            food,
            amount,
            food_id,
            nutrition,
            date,
            time,
            json,
        } => {
            let args = LogArgs {
                food,
                amount,
                food_id,
                nutrition: nutrition.into(),
                date,
                time,
            };
            cmd_log(store, person, args, json).await
        }
        Commands::Day { date, json } => cmd_day(store, person, date, json).await,
        Commands::Dates { json } => cmd_dates(store, person, json).await,
        Commands::Delete { entry_id, json } => cmd_entry_delete(store, &entry_id, json).await,
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                json,
            } => cmd_weight_log(store, person, value, &unit, date, json).await,
            WeightCommands::History { limit, json } => {
                cmd_weight_history(store, person, limit, json).await
            }
            WeightCommands::Range { start, end, json } => {
                cmd_weight_range(store, person, start, end, json).await
            }
            WeightCommands::Delete { id, json } => cmd_weight_delete(store, id, json).await,
        },
        Commands::Fav { command } => match command {
            FavCommands::Toggle {
                food,
                food_id,
                nutrition,
                json,
            } => cmd_fav_toggle(store, person, &food, food_id, nutrition.into(), json).await,
            FavCommands::List { json } => cmd_fav_list(store, person, json).await,
        },
        Commands::Recent { limit, json } => cmd_recent(store, person, limit, json).await,
        Commands::Export { file, json } => cmd_export(store, file, json).await,
        Commands::Import { file, json } => cmd_import(store, &file, json).await,
        Commands::Seed { json } => cmd_seed(store, json).await,
        Commands::Wipe { yes, json } => cmd_wipe(store, yes, json).await,
    }
}
