use crate::models::Mode;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weatherbit-ingest")]
#[command(about = "Incremental Weatherbit history/forecast ingestion into deduplicated CSV partitions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "JSON configuration file [default: config.json]")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, merge and store data for the locations of a trigger event
    Run {
        #[arg(
            short,
            long,
            help = "Trigger event JSON file",
            conflicts_with_all = ["point", "lat", "lon"]
        )]
        event: Option<PathBuf>,

        #[arg(long, help = "Single location name", requires_all = ["lat", "lon"])]
        point: Option<String>,

        #[arg(long, allow_hyphen_values = true, requires = "point")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "point")]
        lon: Option<f64>,

        #[arg(short, long, help = "History target date (YYYY-MM-DD); the previous day is ingested")]
        date: Option<NaiveDate>,

        #[arg(short, long, help = "history or forecast [default: DATA_MODE]")]
        mode: Option<Mode>,

        #[arg(long, help = "Forecast horizon in hours (1-240)")]
        hours: Option<u32>,

        #[arg(short, long, help = "Suppress progress output")]
        quiet: bool,
    },

    /// Parse and validate a trigger event without fetching anything
    Validate {
        #[arg(short, long, help = "Trigger event JSON file")]
        event: PathBuf,
    },

    /// Show the contents of a stored partition
    Inspect {
        #[arg(short, long)]
        point: String,

        #[arg(short, long, help = "Any date inside the partition (YYYY-MM-DD)")]
        date: NaiveDate,

        #[arg(short, long, help = "history or forecast [default: DATA_MODE]")]
        mode: Option<Mode>,

        #[arg(short, long, default_value = "5")]
        sample: usize,
    },
}
