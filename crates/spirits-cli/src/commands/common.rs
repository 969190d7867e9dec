use std::path::Path;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use spirits_core::db::LibSqlStore;
use spirits_core::models::{Drink, DrinkStyle, OperationIndex, Volume};
use spirits_core::{DataLayer, GlobalId, Model, SiteId, Token, Visibility};

use crate::cli::DrinkArgs;
use crate::config::{normalize_text_option, CliConfig};
use crate::error::CliError;

pub type CliDataLayer = DataLayer<LibSqlStore>;

#[derive(Debug, Serialize)]
pub struct CheckInListItem {
    pub id: String,
    pub time: String,
    pub relative_time: String,
    pub style: String,
    pub name: Option<String>,
    pub abv_percent: f64,
    pub volume_ml: f64,
    pub price: Option<f64>,
    pub external_id: Option<u64>,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckInPage {
    pub checkins: Vec<CheckInListItem>,
    pub token: Token,
}

/// Open the store at `path`, pinning its site when the config asks for one
pub async fn open_data_layer(path: &Path, config: &CliConfig) -> Result<CliDataLayer, CliError> {
    let store = LibSqlStore::open(path).await?;
    if let Some(site) = config.site_override().map_err(CliError::Config)? {
        store.set_owner_site(site).await?;
    }
    let owner = store.owner_site().await?;
    tracing::debug!("Opened {} as site {owner}", path.display());
    Ok(DataLayer::new(store, owner))
}

/// Accepts a full `<site>:<index>` ID, or a bare index on this device's site
pub fn parse_checkin_id(value: &str, local_site: SiteId) -> Result<GlobalId, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyCheckInId);
    }

    if let Ok(index) = trimmed.parse::<OperationIndex>() {
        return Ok(GlobalId::new(local_site, index));
    }
    let id = trimmed
        .parse::<GlobalId>()
        .map_err(|_| CliError::InvalidCheckInId(trimmed.to_string()))?;
    if id.is_wildcard() {
        return Err(CliError::InvalidCheckInId(trimmed.to_string()));
    }
    Ok(id)
}

/// Load a check-in that is not deleted, including imports awaiting approval
pub async fn load_checkin(db: &CliDataLayer, id: &str) -> Result<Model, CliError> {
    let id = parse_checkin_id(id, db.site_id())?;
    let visibility = Visibility {
        include_pending_external: true,
        ..Visibility::LIVE
    };
    db.load(id, visibility)
        .await?
        .ok_or_else(|| CliError::CheckInNotFound(id.to_string()))
}

pub fn parse_token(value: Option<&str>) -> Result<Option<Token>, CliError> {
    value
        .map(|raw| {
            serde_json::from_str::<Token>(raw).map_err(|error| CliError::InvalidToken(error.to_string()))
        })
        .transpose()
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM`, or `YYYY-MM-DD` (local midnight)
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, CliError> {
    let trimmed = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive, trimmed);
    }
    parse_day(trimmed)
}

/// Local midnight at the start of `YYYY-MM-DD`
pub fn parse_day(value: &str) -> Result<DateTime<Utc>, CliError> {
    let trimmed = value.trim();
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| CliError::InvalidTime(trimmed.to_string()))?;
    local_to_utc(date.and_time(chrono::NaiveTime::MIN), trimmed)
}

fn local_to_utc(naive: NaiveDateTime, original: &str) -> Result<DateTime<Utc>, CliError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| CliError::InvalidTime(original.to_string()))
}

/// `[start of the day `days - 1` days ago, start of tomorrow)`, in local time
pub fn recent_days_range(days: u32, now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let tomorrow = today + Duration::days(1);
    let first = today - Duration::days(i64::from(days.saturating_sub(1)));
    let start_of = |date: NaiveDate| {
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        Local
            .from_local_datetime(&midnight)
            .earliest()
            .map_or_else(|| midnight.and_utc(), |time| time.with_timezone(&Utc))
    };
    (start_of(first), start_of(tomorrow))
}

/// Build a new drink from command-line fields
pub fn drink_from_args(args: &DrinkArgs) -> Result<Drink, CliError> {
    let style = args.style.map(DrinkStyle::from).unwrap_or_default();
    let volume = match args.volume.as_deref() {
        Some(raw) => raw.parse::<Volume>()?,
        None => default_volume(style),
    };
    let mut drink = Drink::new(style, volume);
    apply_drink_args(&mut drink, args)?;
    Ok(drink)
}

/// Overwrite the drink fields that were passed.
///
/// Returns whether the arguments ask for any change, counting `--at`, which
/// the caller applies to the check-in itself.
pub fn apply_drink_args(drink: &mut Drink, args: &DrinkArgs) -> Result<bool, CliError> {
    let mut changed = false;

    if let Some(style) = args.style {
        let style = DrinkStyle::from(style);
        if args.abv.is_none() && drink.style != style {
            drink.abv = style.default_abv();
        }
        drink.style = style;
        changed = true;
    }
    if let Some(name) = args.name.clone() {
        drink.name = normalize_text_option(Some(name));
        changed = true;
    }
    if let Some(abv) = args.abv {
        if !(0.0..=100.0).contains(&abv) {
            return Err(CliError::InvalidAbv(abv));
        }
        drink.abv = abv / 100.0;
        changed = true;
    }
    if let Some(volume) = args.volume.as_deref() {
        drink.volume = volume.parse()?;
        changed = true;
    }
    if let Some(price) = args.price {
        if !price.is_finite() || price < 0.0 {
            return Err(CliError::InvalidPrice(price));
        }
        drink.price = Some(price);
        changed = true;
    }

    Ok(changed || args.at.is_some())
}

/// Typical serving for a style
pub const fn default_volume(style: DrinkStyle) -> Volume {
    match style {
        DrinkStyle::Beer => Volume::milliliters(473.0),
        DrinkStyle::Wine => Volume::milliliters(150.0),
        DrinkStyle::Sake => Volume::milliliters(180.0),
    }
}

pub fn checkin_time(args: &DrinkArgs) -> Result<DateTime<Utc>, CliError> {
    args.at.as_deref().map_or_else(|| Ok(Utc::now()), parse_time)
}

pub fn sort_by_time(models: &mut [Model]) {
    models.sort_by(|a, b| {
        a.check_in
            .time
            .cmp(&b.check_in.time)
            .then_with(|| a.id().cmp(&b.id()))
    });
}

pub fn checkin_to_list_item(model: &Model) -> CheckInListItem {
    let now_ms = Utc::now().timestamp_millis();
    let drink = &model.check_in.drink;

    CheckInListItem {
        id: model.id().to_string(),
        time: model.check_in.time.to_rfc3339(),
        relative_time: format_relative_time(model.check_in.time.timestamp_millis(), now_ms),
        style: drink.style.to_string(),
        name: drink.name.clone(),
        abv_percent: drink.abv * 100.0,
        volume_ml: drink.volume.as_milliliters(),
        price: drink.price,
        external_id: model.check_in.external_id,
        deleted: model.metadata.deleted,
    }
}

pub fn format_checkin_lines(models: &[Model], local_site: SiteId) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    models
        .iter()
        .map(|model| {
            let drink = &model.check_in.drink;
            let id = if model.id().is_owned_by(local_site) {
                model.id().index.to_string()
            } else {
                model.id().to_string()
            };
            let name = drink.name.as_deref().unwrap_or("-");
            let relative_time =
                format_relative_time(model.check_in.time.timestamp_millis(), now_ms);
            let mut line = format!(
                "{id:>5}  {:<4}  {name:<24}  {:>5.1}%  {:>7}  {relative_time}",
                drink.style,
                drink.abv * 100.0,
                drink.volume.to_string(),
            );
            if let Some(price) = drink.price {
                line.push_str(&format!("  ${price:.2}"));
            }
            if model.metadata.deleted {
                line.push_str("  [deleted]");
            }
            if let Some(external_id) = model.check_in.external_id {
                line.push_str(&format!("  [import {external_id}]"));
            }
            line
        })
        .collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    if timestamp_ms > now_ms {
        return "upcoming".to_string();
    }

    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
