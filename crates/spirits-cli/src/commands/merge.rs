use std::path::Path;

use spirits_core::export::parse_json_export;

use crate::commands::common::open_data_layer;
use crate::config::CliConfig;
use crate::error::CliError;

/// Counts reported after a merge
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub merged: usize,
    pub skipped: usize,
}

pub async fn run_merge(
    file: &Path,
    db_path: &Path,
    config: &CliConfig,
) -> Result<MergeSummary, CliError> {
    let raw = std::fs::read_to_string(file)?;
    let models = parse_json_export(&raw)?;

    let db = open_data_layer(db_path, config).await?;
    let mut summary = MergeSummary::default();
    for model in &models {
        if model.id().is_owned_by(db.site_id()) {
            eprintln!("Skipping {}: written by this device", model.id());
            summary.skipped += 1;
            continue;
        }
        db.save(model, true).await?;
        summary.merged += 1;
    }

    tracing::info!("Merged {} check-ins from {}", summary.merged, file.display());
    println!("merged {}, skipped {}", summary.merged, summary.skipped);
    Ok(summary)
}
