//! The `plan` command: show how a manifest would be batched.

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use convoy::plan_batches;

use crate::config::Config;

use super::shared::load_manifest;

pub(crate) fn handle_plan(
    manifest: &Path,
    batch_size: Option<usize>,
    config: &Config,
) -> Result<ExitCode, Box<dyn Error>> {
    let keys = load_manifest(manifest)?;
    let batch_size = batch_size.unwrap_or(config.migrate.batch_size);
    let plan = plan_batches(&keys, batch_size);

    println!(
        "{} repositories in {} batches (batch size {})",
        keys.len(),
        plan.len(),
        batch_size
    );
    for (index, batch) in plan.iter().enumerate() {
        println!("\nBatch {}:", index + 1);
        for key in batch {
            println!("  {key}");
        }
    }

    Ok(ExitCode::SUCCESS)
}
