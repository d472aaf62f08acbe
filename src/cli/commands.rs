use crate::cli::args::{Cli, Commands};
use crate::client::WeatherbitClient;
use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::models::{Location, Mode, PartitionKey, TriggerPayload};
use crate::processors::FetchOrchestrator;
use crate::storage::gateway_from_settings;
use crate::utils::logging::init_tracing;
use crate::utils::progress::ProgressReporter;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use validator::Validate;

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run {
            event,
            point,
            lat,
            lon,
            date,
            mode,
            hours,
            quiet,
        } => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            if let Some(mode) = mode {
                settings = settings.with_data_mode(mode);
            }
            if let Some(hours) = hours {
                settings = settings.with_forecast_hours(hours)?;
            }

            let payload = build_payload(event, point, lat, lon)?.with_date(date);
            if date.is_some() && settings.data_mode == Mode::Forecast {
                info!("--date only applies to history runs; ignored");
            }

            let client = WeatherbitClient::builder(settings.api_key()?)
                .with_timeout(Duration::from_secs(settings.http_timeout_secs))
                .with_max_retries(settings.http_max_retries)
                .with_verify_ssl(settings.verify_ssl)
                .with_proxy_url(settings.proxy_url.clone())
                .build()
                .map_err(|e| IngestError::Config(format!("HTTP client: {}", e)))?;
            let gateway = gateway_from_settings(&settings)?;
            let orchestrator = FetchOrchestrator::new(settings.pipeline()?, client, gateway);

            let progress = ProgressReporter::new(
                payload.locations.len() as u64,
                &format!("Ingesting {} data", settings.data_mode),
                quiet,
            );
            let report = orchestrator.run(&payload, Some(&progress)).await?;
            progress.finish_with_message(&report.summary());

            for location in &report.locations {
                progress.println(&format!(
                    "{:<20} {:<8} fetched={} malformed={} appended={} written={} unchanged={}",
                    location.point_name,
                    location.state.to_string(),
                    location.fetched_records,
                    location.malformed_records,
                    location.rows_appended,
                    location.partitions_written,
                    location.partitions_unchanged
                ));
                for error in &location.errors {
                    progress.println(&format!("    error: {}", error));
                }
            }

            report.into_result()?;
        }

        Commands::Validate { event } => {
            let payload = TriggerPayload::from_file(&event)?;
            println!("Trigger event is valid: {} location(s)", payload.locations.len());
            for location in &payload.locations {
                println!(
                    "  {:<20} lat={:>9.4} lon={:>9.4}",
                    location.point_name, location.latitude, location.longitude
                );
            }
            if let Some(date) = payload.date {
                println!("  target date: {}", date);
            }
        }

        Commands::Inspect {
            point,
            date,
            mode,
            sample,
        } => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            if let Some(mode) = mode {
                settings = settings.with_data_mode(mode);
            }
            inspect(&settings, &point, date, sample).await?;
        }
    }

    Ok(())
}

fn build_payload(
    event: Option<PathBuf>,
    point: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<TriggerPayload> {
    match (event, point, lat, lon) {
        (Some(path), _, _, _) => TriggerPayload::from_file(&path),
        (None, Some(point), Some(lat), Some(lon)) => {
            let payload = TriggerPayload::new(vec![Location::new(point, lat, lon)]);
            payload.validate()?;
            Ok(payload)
        }
        _ => Err(IngestError::InvalidTrigger(
            "either --event or --point with --lat and --lon is required".to_string(),
        )),
    }
}

async fn inspect(settings: &Settings, point: &str, date: NaiveDate, sample: usize) -> Result<()> {
    let gateway = gateway_from_settings(settings)?;
    let key = PartitionKey::for_date(point, date, settings.data_mode.granularity());
    let path = gateway.object_path(&key);

    let Some(partition) = gateway.read_raw(&key).await? else {
        println!("Partition {} does not exist ({})", key, path);
        return Ok(());
    };

    let expected = settings.data_mode.header();
    let header_ok = partition.header.iter().map(String::as_str).eq(expected.iter().copied());

    println!("Partition: {}", key);
    println!("Object:    {}", path);
    println!("Rows:      {}", partition.records.len());
    println!(
        "Header:    {} columns ({})",
        partition.header.len(),
        if header_ok { "matches schema" } else { "does NOT match schema" }
    );

    let sample = sample.min(partition.records.len());
    if sample > 0 {
        println!("\nFirst {} row(s):", sample);
        for row in partition.records.iter().take(sample) {
            let preview: Vec<String> = partition
                .header
                .iter()
                .zip(row)
                .filter(|(_, v)| !v.is_empty())
                .take(8)
                .map(|(h, v)| format!("{}={}", h, v))
                .collect();
            println!("  {}", preview.join(" "));
        }
    }

    Ok(())
}
