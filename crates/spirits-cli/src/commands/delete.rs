use std::path::Path;

use crate::commands::common::{load_checkin, open_data_layer};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let db = open_data_layer(db_path, config).await?;
    let model = load_checkin(&db, id).await?;

    let id = db.delete(model.id()).await?;
    println!("{id}");
    Ok(())
}
