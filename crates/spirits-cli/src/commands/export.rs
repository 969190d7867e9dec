use std::path::Path;

use chrono::{DateTime, Utc};
use spirits_core::export::render_export;
use spirits_core::Visibility;

use crate::cli::ExportFormat;
use crate::commands::common::{open_data_layer, sort_by_time};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    include_deleted: bool,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let db = open_data_layer(db_path, config).await?;
    let visibility = Visibility {
        include_deleted,
        ..Visibility::LIVE
    };
    let (mut models, _) = db
        .get_models(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC, None, visibility)
        .await?;
    sort_by_time(&mut models);

    let rendered = render_export(&models, format.into())?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
