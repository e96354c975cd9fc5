//! Matchday console
//!
//! Field setup, schedule generation and the live match clock for one
//! tournament, backed by a local data directory.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use matchday::{
    db::{helpers::parse_slot, MatchStore},
    eligibility::EligibilityChecker,
    fields::FieldRegistry,
    init_logging,
    live::LiveBoard,
    models::Score,
    orchestrator::{LiveEvent, StartReport},
    registry::{MatchRegistry, PlacementContext},
    schedule::{day_slots, place_pairings, Pairing},
    AppState,
};

#[derive(Parser)]
#[command(name = "matchday")]
#[command(about = "Tournament field eligibility and live match clock", long_about = None)]
struct Cli {
    /// Directory holding the database, settings and clock cache
    #[arg(long, global = true, default_value = "matchday-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and seed the default fields
    Init,

    /// Inspect or change the field configuration
    Fields {
        #[command(subcommand)]
        command: FieldCommands,
    },

    /// Manage registered teams
    Teams {
        #[command(subcommand)]
        command: TeamCommands,
    },

    /// Check whether a category may play on a field on a date
    Check {
        category: String,
        field: String,
        date: NaiveDate,
    },

    /// Place pairings from a JSON file on the first free slots of a day
    Generate {
        date: NaiveDate,
        /// JSON array of `{ "category", "home", "away" }`
        pairings: PathBuf,
    },

    /// Print the live board of a day
    Board {
        date: NaiveDate,
        /// Time of day to evaluate the board at (defaults to now)
        #[arg(long, value_parser = slot_arg)]
        at: Option<NaiveTime>,
    },

    /// Start every match of a slot, or the given matches
    Start {
        date: NaiveDate,
        #[arg(value_parser = slot_arg)]
        slot: Option<NaiveTime>,
        /// Match id to start; repeatable
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Finish a match now
    End {
        date: NaiveDate,
        match_id: String,
        /// Final score as HOME:AWAY
        #[arg(long, value_parser = score_arg)]
        score: Option<Score>,
    },

    /// Run the clock loop and stream live events until Ctrl-C
    Live {
        /// Day to drive (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum FieldCommands {
    /// List fields with their allowed categories
    List,

    /// Replace the configuration with the built-in field set
    Reset,

    /// Set the allowed categories of a field; an empty list allows all
    Allow {
        field: String,
        /// Only for this day; an empty list clears the override
        #[arg(long)]
        date: Option<NaiveDate>,
        categories: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TeamCommands {
    /// Register teams for a category
    Add {
        category: String,
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List registered teams per category
    List,
}

fn slot_arg(value: &str) -> Result<NaiveTime> {
    parse_slot(value, "slot")
}

fn score_arg(value: &str) -> Result<Score> {
    let Some((home, away)) = value.split_once(':') else {
        bail!("score must look like HOME:AWAY, got '{value}'");
    };
    Ok(Score {
        home: home.trim().parse().context("invalid home score")?,
        away: away.trim().parse().context("invalid away score")?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let app = AppState::open(&cli.data_dir)?;

    match cli.command {
        Commands::Init => {
            if app.db.load_field_configs().await?.is_empty() {
                app.db
                    .save_field_configs(FieldRegistry::defaults().as_slice())
                    .await?;
                println!("Seeded default fields");
            }
            app.settings.update(app.settings.get())?;
            println!("Data directory ready at {}", app.data_dir().display());
        }

        Commands::Fields { command } => run_fields(&app, command).await?,

        Commands::Teams { command } => match command {
            TeamCommands::Add { category, names } => {
                for name in &names {
                    app.db.register_team(&category, name).await?;
                }
                println!("Registered {} team(s) for {category}", names.len());
            }
            TeamCommands::List => {
                let roster = app.db.load_roster().await?;
                for (category, teams) in roster.categories() {
                    println!("{category}: {}", teams.join(", "));
                }
            }
        },

        Commands::Check {
            category,
            field,
            date,
        } => {
            let fields = app.field_registry().await?;
            let rules = app.settings.get().category_rules();
            let checker = EligibilityChecker::new(&fields, &rules);
            match checker.check_placement(&category, &field, date) {
                Ok(()) => println!("{category} may play on {field} on {date}"),
                Err(err) => println!("Not allowed: {err}"),
            }
        }

        Commands::Generate { date, pairings } => {
            let contents = fs::read_to_string(&pairings)
                .with_context(|| format!("failed to read {}", pairings.display()))?;
            let pairings: Vec<Pairing> =
                serde_json::from_str(&contents).context("pairings file is not valid JSON")?;

            let settings = app.settings.get();
            let fields = app.field_registry().await?;
            let rules = settings.category_rules();
            let roster = app.db.load_roster().await?;
            let mut registry: MatchRegistry =
                app.db.list_matches_for_date(date).await?.into_iter().collect();

            let slots = day_slots(settings.first_slot, settings.last_slot, settings.slot_minutes);
            let ctx = PlacementContext {
                fields: &fields,
                rules: &rules,
                roster: &roster,
                fallback_minutes: settings.fallback_match_minutes,
            };
            let report = place_pairings(pairings, date, &slots, &mut registry, ctx);

            for record in &report.placed {
                app.db.upsert_match(record).await?;
                println!(
                    "{} {:<12} {} vs {} ({})",
                    record.slot.format("%H:%M"),
                    record.field_id,
                    record.home,
                    record.away,
                    record.category
                );
            }
            for (pairing, err) in &report.unplaced {
                println!(
                    "Not placed: {} vs {} ({}): {err}",
                    pairing.home, pairing.away, pairing.category
                );
            }
        }

        Commands::Board { date, at } => {
            let matches = app.db.list_matches_for_date(date).await?;
            let now = at.unwrap_or_else(|| Local::now().time());
            let board = LiveBoard::build(date, &matches, now);
            println!("{}", serde_json::to_string_pretty(&board)?);
        }

        Commands::Start { date, slot, ids } => {
            let controller = app.controller();
            controller.load_day(date).await?;
            let reports = match (slot, ids.is_empty()) {
                (_, false) => controller.start_eligible(&ids).await,
                (Some(slot), true) => controller.start_slot(slot).await,
                (None, true) => bail!("give a slot or at least one --id"),
            };
            print_reports(&reports);
            controller.shutdown().await;
        }

        Commands::End {
            date,
            match_id,
            score,
        } => {
            let controller = app.controller();
            controller.load_day(date).await?;
            controller.end_match(&match_id, score).await?;
            println!("Match {match_id} finished");
            controller.shutdown().await;
        }

        Commands::Live { date } => run_live(&app, date).await?,
    }

    Ok(())
}

async fn run_fields(app: &AppState, command: FieldCommands) -> Result<()> {
    match command {
        FieldCommands::List => {
            for field in app.field_registry().await?.iter() {
                let allowed = if field.categories.is_empty() {
                    "all categories".to_string()
                } else {
                    field.categories.join(", ")
                };
                let halves = if field.two_halves { " (2 halves)" } else { "" };
                println!(
                    "{:<12} {:<12} {} min{halves}: {allowed}",
                    field.id, field.name, field.match_minutes
                );
                for (date, categories) in &field.date_categories {
                    println!("{:<12}   on {date}: {}", "", categories.join(", "));
                }
            }
        }
        FieldCommands::Reset => {
            app.db
                .save_field_configs(FieldRegistry::defaults().as_slice())
                .await?;
            println!("Field configuration reset to defaults");
        }
        FieldCommands::Allow {
            field,
            date,
            categories,
        } => {
            let mut fields = app.field_registry().await?;
            match date {
                Some(date) => fields.set_date_categories(&field, date, categories)?,
                None => fields.set_default_categories(&field, categories)?,
            }
            app.db.save_field_configs(fields.as_slice()).await?;
            println!("Updated {field}");
        }
    }
    Ok(())
}

async fn run_live(app: &AppState, date: Option<NaiveDate>) -> Result<()> {
    let controller = app.controller();
    // An explicit day stays fixed; otherwise the poller follows the calendar.
    controller.pin_date(date).await;
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let board = controller.load_day(date).await?;
    info!(
        "Driving {date}: {} live, {} upcoming",
        board.live.len(),
        board.upcoming.len()
    );

    let mut events = controller.subscribe();
    controller.spawn().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Display fell behind; skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Stopping live loop");
                break;
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn print_event(event: &LiveEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!("Failed to serialize live event: {err}"),
    }
}

fn print_reports(reports: &[StartReport]) {
    if reports.is_empty() {
        println!("Nothing to start");
    }
    for report in reports {
        match &report.result {
            Ok(outcome) => println!("{}: {outcome:?}", report.match_id),
            Err(err) => println!("{}: {err}", report.match_id),
        }
    }
}
