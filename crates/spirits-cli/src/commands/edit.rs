use std::path::Path;

use crate::cli::DrinkArgs;
use crate::commands::common::{apply_drink_args, load_checkin, open_data_layer, parse_time};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    args: &DrinkArgs,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let db = open_data_layer(db_path, config).await?;
    let mut model = load_checkin(&db, id).await?;

    if !apply_drink_args(&mut model.check_in.drink, args)? {
        return Err(CliError::NothingToEdit);
    }
    if let Some(at) = args.at.as_deref() {
        model.check_in.time = parse_time(at)?;
    }

    let id = db.save(&model, false).await?;
    println!("{id}");
    Ok(())
}
