use std::path::Path;

use crate::commands::common::{open_data_layer, parse_checkin_id};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_approve(
    id: &str,
    revoke: bool,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let db = open_data_layer(db_path, config).await?;
    let id = parse_checkin_id(id, db.site_id())?;

    let id = db.set_external_approval(id, !revoke).await?;
    println!("{id}");
    Ok(())
}
