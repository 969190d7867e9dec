use std::path::Path;

use spirits_core::Model;

use crate::cli::DrinkArgs;
use crate::commands::common::{checkin_time, drink_from_args, open_data_layer};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_add(args: &DrinkArgs, db_path: &Path, config: &CliConfig) -> Result<(), CliError> {
    let drink = drink_from_args(args)?;
    let time = checkin_time(args)?;

    let db = open_data_layer(db_path, config).await?;
    let model = Model::new(db.site_id(), time, drink);
    let id = db.save(&model, false).await?;

    println!("{id}");
    Ok(())
}
