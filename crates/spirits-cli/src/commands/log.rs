use std::path::Path;

use spirits_core::models::OperationLog;

use crate::commands::common::{open_data_layer, parse_token};
use crate::config::CliConfig;
use crate::error::CliError;

pub async fn run_log(
    since: Option<&str>,
    as_json: bool,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let since = parse_token(since)?;
    let db = open_data_layer(db_path, config).await?;
    let log = db.operation_log(since.as_ref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        for line in format_log_lines(&log) {
            println!("{line}");
        }
    }
    Ok(())
}

/// One line per operation: `<site>:<index> -> <target>`
pub fn format_log_lines(log: &OperationLog) -> Vec<String> {
    log.iter()
        .flat_map(|(site, entry)| {
            entry
                .indexed()
                .map(move |(index, target)| format!("{site}:{index} -> {target}"))
        })
        .collect()
}
