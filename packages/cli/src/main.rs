#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for police force and neighbourhood boundary imports.
//!
//! Uses `indicatif-log-bridge` (via [`police_areas_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use police_areas_cli_utils::IndicatifProgress;
use police_areas_database::area_db::{self, DuckDbAreaStore};
use police_areas_database::{AreaStore, DbError, paths};
use police_areas_ingest::force_table::{all_force_areas, forces_from_admin};
use police_areas_ingest::{ImportOptions, import};

#[derive(Parser)]
#[command(
    name = "police_areas",
    about = "Import police force and neighbourhood boundaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import neighbourhood boundaries from KML and build force boundaries
    Import {
        /// Directory holding one sub-directory of `.kml` files per force
        kml_path: PathBuf,
        /// Directory holding `forces.json` and `<force>_neighbourhoods.json`
        names_path: PathBuf,
        /// Save changes (without this the run only reports)
        #[arg(long)]
        commit: bool,
        /// Write anomaly reports and print a summary
        #[arg(long)]
        debug_data: bool,
        /// Root directory for anomaly reports (overrides `POLICE_AREAS_DEBUG_DIR`)
        #[arg(long)]
        debug_dir: Option<PathBuf>,
        /// Names files expected beyond one per KML force
        #[arg(long, default_value = "1")]
        extra_name_files: usize,
        /// Areas database (overrides `POLICE_AREAS_DB`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Build force boundaries from administrative areas already imported
    ForcesFromAdmin {
        /// Save changes (without this the run only reports)
        #[arg(long)]
        commit: bool,
        /// Areas database (overrides `POLICE_AREAS_DB`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Manage area generations
    Generation {
        #[command(subcommand)]
        action: GenerationAction,
        /// Areas database (overrides `POLICE_AREAS_DB`)
        #[arg(long, global = true)]
        db: Option<PathBuf>,
    },
    /// List the forces and the administrative areas they cover
    Forces,
}

#[derive(Subcommand)]
enum GenerationAction {
    /// Create a new pending generation for the next import
    New {
        /// Free-text description of the import
        description: String,
    },
    /// Make the pending generation active
    Activate,
    /// Show the active and pending generations
    Show,
}

fn open_store(db: Option<PathBuf>) -> Result<DuckDbAreaStore, DbError> {
    let path = db.unwrap_or_else(paths::areas_db_path);
    log::info!("Using areas database {}", path.display());
    area_db::open(&path)
}

fn generation(action: GenerationAction, db: Option<PathBuf>) -> Result<(), DbError> {
    let mut store = open_store(db)?;
    match action {
        GenerationAction::New { description } => {
            let generation = store.create_generation(&description)?;
            log::info!(
                "Created pending generation {} ({})",
                generation.id,
                generation.description
            );
        }
        GenerationAction::Activate => match store.activate_pending_generation()? {
            Some(generation) => log::info!("Generation {} is now active", generation.id),
            None => log::warn!("No pending generation to activate"),
        },
        GenerationAction::Show => {
            for (label, generation) in [
                ("active", store.active_generation()?),
                ("pending", store.pending_generation()?),
            ] {
                match generation {
                    Some(g) => println!("{label:<10} {:<6} {}", g.id, g.description),
                    None => println!("{label:<10} -"),
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = police_areas_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            kml_path,
            names_path,
            commit,
            debug_data,
            debug_dir,
            extra_name_files,
            db,
        } => {
            let mut store = open_store(db)?;
            let options = ImportOptions {
                commit,
                collect_debug_data: debug_data,
                extra_name_files,
                debug_dir,
            };
            let progress = IndicatifProgress::neighbourhoods_bar(&multi);

            let outcome = import(&mut store, &kml_path, &names_path, &options, &progress)
                .inspect_err(|e| log::error!("Import failed: {e}"))?;

            for line in &outcome.summary {
                println!("{line}");
            }
            if !commit {
                log::info!("Dry run: nothing was saved (pass --commit to save)");
            }
        }
        Commands::ForcesFromAdmin { commit, db } => {
            let mut store = open_store(db)?;
            let count = forces_from_admin(&mut store, commit)
                .inspect_err(|e| log::error!("Building forces failed: {e}"))?;
            log::info!("Processed {count} forces");
        }
        Commands::Generation { action, db } => generation(action, db)?,
        Commands::Forces => {
            let forces = all_force_areas();
            println!("{:<28} NAME", "CODE");
            println!("{}", "-".repeat(70));
            for force in &forces {
                println!("{:<28} {}", force.code, force.name);
                for lookup in &force.lookup {
                    println!("{:<28}   {} {}", "", lookup.type_code, lookup.name.trim_end());
                }
                if force.london_boroughs {
                    println!("{:<28}   LBO (all except City of London)", "");
                }
            }
            println!();
            println!("{} forces", forces.len());
        }
    }

    Ok(())
}
