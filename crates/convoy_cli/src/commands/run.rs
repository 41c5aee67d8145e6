//! The `run` command: drive a bulk migration to its terminal state.

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use convoy::{
    AggregateProgress, BulkJob, GitTransferClient, JobEvent, MigrateOptions, MigrationContext,
    RetryConfig,
};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::RunArgs;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown;

use super::shared::load_manifest;

pub(crate) async fn handle_run(
    manifest: &Path,
    args: RunArgs,
    config: Config,
) -> Result<ExitCode, Box<dyn Error>> {
    let keys = load_manifest(manifest)?;
    let options = merge_options(&args, &config);

    let client = match config.git.binary {
        Some(ref binary) => GitTransferClient::with_binary(binary),
        None => GitTransferClient::new(),
    };

    let reporter = Arc::new(ProgressReporter::new());
    let shutdown_flag = shutdown::setup_shutdown_handler();

    let ctx = MigrationContext::builder()
        .client(client)
        .options(options)
        .progress(reporter.as_callback())
        .shutdown_flag(shutdown_flag)
        .build()?;

    let job = ctx.create_job(keys);
    tracing::info!(job = %job, "Starting bulk migration");

    let mut stream = ctx.subscribe(&job)?;
    let mut terminal: Option<(BulkJob, AggregateProgress)> = None;

    while let Some(event) = stream.next().await {
        match event {
            JobEvent::Update { job, aggregate } => {
                terminal = Some((job, aggregate));
            }
            JobEvent::Error { message } => {
                eprintln!("status stream error: {message}");
            }
        }
    }
    reporter.finish();

    let Some((snapshot, aggregate)) = terminal else {
        return Err("status stream ended without a snapshot".into());
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job": snapshot,
                "aggregate": aggregate,
            }))?
        );
    } else {
        print_summary(&snapshot, &aggregate);
    }

    Ok(if aggregate.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// CLI flags beat config values beat library defaults.
fn merge_options(args: &RunArgs, config: &Config) -> MigrateOptions {
    let retries = args.retries.unwrap_or(config.migrate.retries);
    MigrateOptions {
        batch_size: args.batch_size.unwrap_or(config.migrate.batch_size),
        max_concurrent_batches: args
            .max_concurrent_batches
            .unwrap_or(config.migrate.max_concurrent_batches),
        per_batch_concurrency: args
            .per_batch_concurrency
            .unwrap_or(config.migrate.per_batch_concurrency),
        operation_timeout: Duration::from_secs(
            args.timeout_secs.unwrap_or(config.migrate.timeout_secs),
        ),
        retry: RetryConfig {
            max_retries: retries,
            ..RetryConfig::default()
        },
        force: args.force,
        work_root: args
            .work_root
            .clone()
            .or_else(|| config.migrate.work_root.clone()),
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Steps")]
    steps: String,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Error")]
    error: String,
}

fn print_summary(snapshot: &BulkJob, aggregate: &AggregateProgress) {
    let rows: Vec<SummaryRow> = snapshot
        .keys
        .iter()
        .filter_map(|key| snapshot.repo(key))
        .map(|status| SummaryRow {
            source: status.key.source.clone(),
            state: if status.overwritten {
                format!("{} (overwritten)", status.state)
            } else {
                status.state.to_string()
            },
            steps: format!("{}/{}", status.steps_done, status.steps_total),
            retries: status.retries,
            error: status.error.clone().unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::sharp()));
    println!(
        "\n{} of {} migrated in {}s; {} failed",
        aggregate.completed, aggregate.total, aggregate.elapsed_secs, aggregate.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args() -> RunArgs {
        RunArgs {
            batch_size: None,
            max_concurrent_batches: None,
            per_batch_concurrency: None,
            retries: None,
            timeout_secs: None,
            force: false,
            json: false,
            work_root: None,
        }
    }

    #[test]
    fn test_merge_uses_config_defaults() {
        let options = merge_options(&default_args(), &Config::default());
        let defaults = MigrateOptions::default();
        assert_eq!(options.batch_size, defaults.batch_size);
        assert_eq!(options.max_concurrent_batches, defaults.max_concurrent_batches);
        assert_eq!(options.operation_timeout, defaults.operation_timeout);
        assert_eq!(options.retry.max_retries, defaults.retry.max_retries);
        assert!(!options.force);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let args = RunArgs {
            batch_size: Some(3),
            retries: Some(7),
            timeout_secs: Some(60),
            force: true,
            ..default_args()
        };

        let options = merge_options(&args, &Config::default());
        assert_eq!(options.batch_size, 3);
        assert_eq!(options.retry.max_retries, 7);
        assert_eq!(options.operation_timeout, Duration::from_secs(60));
        assert!(options.force);
    }
}
