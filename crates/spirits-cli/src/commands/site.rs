use std::path::Path;

use crate::commands::common::open_data_layer;
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_site(db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let db = open_data_layer(db_path, config).await?;
    println!("{}", db.site_id());
    Ok(())
}
