use std::path::Path;

use chrono::{Duration, Local};
use spirits_core::Visibility;

use crate::commands::common::{
    checkin_to_list_item, format_checkin_lines, open_data_layer, parse_day, parse_token,
    recent_days_range, sort_by_time, CheckInPage,
};
use crate::config::CliConfig;
use crate::error::CliError;

pub struct ListOptions<'a> {
    pub days: u32,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub include_deleted: bool,
    pub include_pending: bool,
    pub since: Option<&'a str>,
    pub as_json: bool,
}

pub async fn run_list(
    options: &ListOptions<'_>,
    db_path: &Path,
    config: &CliConfig,
) -> Result<(), CliError> {
    let (default_from, default_to) = recent_days_range(options.days, Local::now());
    let from = options.from.map(parse_day).transpose()?.unwrap_or(default_from);
    let to = match options.to {
        Some(day) => parse_day(day)?,
        None if options.from.is_some() => default_to.max(from + Duration::days(1)),
        None => default_to,
    };
    let since = parse_token(options.since)?;
    let visibility = Visibility {
        include_deleted: options.include_deleted,
        include_pending_external: options.include_pending,
    };

    let db = open_data_layer(db_path, config).await?;
    let (mut models, token) = db
        .get_models(from, to, since.as_ref(), visibility)
        .await?;
    sort_by_time(&mut models);

    if options.as_json {
        let page = CheckInPage {
            checkins: models.iter().map(checkin_to_list_item).collect(),
            token,
        };
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        for line in format_checkin_lines(&models, db.site_id()) {
            println!("{line}");
        }
    }

    Ok(())
}
