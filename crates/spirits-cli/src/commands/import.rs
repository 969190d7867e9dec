use std::path::Path;

use spirits_core::Model;

use crate::cli::DrinkArgs;
use crate::commands::common::{checkin_time, drink_from_args, open_data_layer};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_import(
    external_id: u64,
    args: &DrinkArgs,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let drink = drink_from_args(args)?;
    let time = checkin_time(args)?;

    let db = open_data_layer(db_path, config).await?;
    if let Some(existing) = db.load_by_external_id(external_id).await? {
        eprintln!("External check-in {external_id} was already imported");
        println!("{}", existing.id());
        return Ok(());
    }

    let model = Model::imported(db.site_id(), external_id, time, drink);
    let id = db.save(&model, false).await?;
    println!("{id}");
    Ok(())
}
