use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone, Utc};
use spirits_core::export::parse_json_export;
use spirits_core::models::{Drink, DrinkStyle, OperationLogEntry, Volume};
use spirits_core::{GlobalId, Model, SiteId, Visibility};

use crate::cli::{CompletionShell, DrinkArgs, ExportFormat, StyleArg};
use crate::commands::add::run_add;
use crate::commands::approve::run_approve;
use crate::commands::common::{
    apply_drink_args, drink_from_args, format_checkin_lines, format_relative_time,
    open_data_layer, parse_checkin_id, parse_time, parse_token, recent_days_range,
};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::log::format_log_lines;
use crate::commands::merge::{run_merge, MergeSummary};
use crate::config::CliConfig;
use crate::error::CliError;

#[test]
fn parse_checkin_id_accepts_bare_index_and_full_id() {
    let local = SiteId::new();
    let remote = SiteId::new();

    assert_eq!(
        parse_checkin_id(" 3 ", local).unwrap(),
        GlobalId::new(local, 3)
    );
    assert_eq!(
        parse_checkin_id(&format!("{remote}:7"), local).unwrap(),
        GlobalId::new(remote, 7)
    );
}

#[test]
fn parse_checkin_id_rejects_empty_and_wildcard() {
    let local = SiteId::new();
    assert!(matches!(
        parse_checkin_id(" \n ", local),
        Err(CliError::EmptyCheckInId)
    ));
    assert!(matches!(
        parse_checkin_id(&format!("{local}:*"), local),
        Err(CliError::InvalidCheckInId(_))
    ));
    assert!(matches!(
        parse_checkin_id("nope", local),
        Err(CliError::InvalidCheckInId(_))
    ));
}

#[test]
fn parse_time_accepts_supported_formats() {
    assert_eq!(
        parse_time("2024-05-01T18:30:00Z").unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap()
    );

    let local_evening = Local
        .with_ymd_and_hms(2024, 5, 1, 18, 30, 0)
        .earliest()
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(parse_time("2024-05-01 18:30").unwrap(), local_evening);

    let local_midnight = Local
        .with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
        .earliest()
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(parse_time("2024-05-01").unwrap(), local_midnight);

    assert!(matches!(
        parse_time("last tuesday"),
        Err(CliError::InvalidTime(_))
    ));
}

#[test]
fn recent_days_range_covers_today() {
    let now = Local::now();
    let (from, to) = recent_days_range(1, now);
    let now = now.with_timezone(&Utc);
    assert!(from <= now && now < to);

    let (week_from, week_to) = recent_days_range(7, Local::now());
    assert_eq!(week_to, to);
    assert!(week_from < from);
}

#[test]
fn parse_token_reads_json_clock() {
    let site = SiteId::new();
    let token = parse_token(Some(&format!("{{\"{site}\": 4}}")))
        .unwrap()
        .unwrap();
    assert_eq!(token.get(site), Some(4));

    assert!(parse_token(None).unwrap().is_none());
    assert!(matches!(
        parse_token(Some("[1, 2]")),
        Err(CliError::InvalidToken(_))
    ));
}

#[test]
fn drink_args_apply_style_defaults_and_percent_abv() {
    let args = DrinkArgs {
        style: Some(StyleArg::Sake),
        name: Some("  Dassai 45 ".to_string()),
        ..DrinkArgs::default()
    };
    let drink = drink_from_args(&args).unwrap();
    assert_eq!(drink.style, DrinkStyle::Sake);
    assert_eq!(drink.name.as_deref(), Some("Dassai 45"));
    assert!((drink.abv - 0.17).abs() < f64::EPSILON);
    assert!((drink.volume.as_milliliters() - 180.0).abs() < f64::EPSILON);

    let mut edited = drink;
    let changed = apply_drink_args(
        &mut edited,
        &DrinkArgs {
            abv: Some(15.5),
            volume: Some("300ml".to_string()),
            ..DrinkArgs::default()
        },
    )
    .unwrap();
    assert!(changed);
    assert!((edited.abv - 0.155).abs() < 1e-9);
    assert!((edited.volume.as_milliliters() - 300.0).abs() < 1e-9);
}

#[test]
fn drink_args_reject_out_of_range_abv() {
    let args = DrinkArgs {
        abv: Some(140.0),
        ..DrinkArgs::default()
    };
    assert!(matches!(drink_from_args(&args), Err(CliError::InvalidAbv(_))));
}

#[test]
fn drink_args_reject_unusable_price() {
    for price in [f64::NAN, f64::INFINITY, -2.5] {
        let args = DrinkArgs {
            price: Some(price),
            ..DrinkArgs::default()
        };
        assert!(matches!(drink_from_args(&args), Err(CliError::InvalidPrice(_))));
    }

    let free = DrinkArgs {
        price: Some(0.0),
        ..DrinkArgs::default()
    };
    assert_eq!(drink_from_args(&free).unwrap().price, Some(0.0));
}

#[test]
fn empty_drink_args_change_nothing() {
    let mut drink = Drink::new(DrinkStyle::Beer, Volume::milliliters(330.0));
    assert!(!apply_drink_args(&mut drink, &DrinkArgs::default()).unwrap());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now + 60_000, now), "upcoming");
}

#[test]
fn format_checkin_lines_shorten_local_ids() {
    let local = SiteId::new();
    let remote = SiteId::new();

    let mut mine = Model::new(
        local,
        Utc::now(),
        Drink::new(DrinkStyle::Beer, Volume::milliliters(473.0)),
    );
    mine.metadata.id = GlobalId::new(local, 12);
    mine.check_in.drink.price = Some(8.0);

    let mut theirs = Model::new(
        remote,
        Utc::now(),
        Drink::new(DrinkStyle::Wine, Volume::milliliters(150.0)),
    );
    theirs.metadata.id = GlobalId::new(remote, 2);
    theirs.metadata.deleted = true;

    let lines = format_checkin_lines(&[mine, theirs], local);
    assert!(lines[0].trim_start().starts_with("12  beer"));
    assert!(lines[0].contains("$8.00"));
    assert!(lines[1].starts_with(&format!("{remote}:2")));
    assert!(lines[1].contains("[deleted]"));
}

#[test]
fn format_log_lines_lists_each_operation() {
    let site = SiteId::new();
    let remote = SiteId::new();
    let mut log = spirits_core::models::OperationLog::new();
    log.insert(
        site,
        OperationLogEntry::new(3, vec![GlobalId::new(site, 3), GlobalId::new(remote, 0)]),
    );

    assert_eq!(
        format_log_lines(&log),
        vec![
            format!("{site}:3 -> {site}:3"),
            format!("{site}:4 -> {remote}:0"),
        ]
    );
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn add_edit_delete_roundtrip() {
    let config = CliConfig::default();
    let db_path = unique_test_db_path();

    run_add(
        &DrinkArgs {
            style: Some(StyleArg::Beer),
            name: Some("Heady Topper".to_string()),
            ..DrinkArgs::default()
        },
        &db_path,
        &config,
    )
    .await
    .unwrap();

    run_edit(
        "0",
        &DrinkArgs {
            price: Some(5.5),
            ..DrinkArgs::default()
        },
        &db_path,
        &config,
    )
    .await
    .unwrap();

    let db = open_data_layer(&db_path, &config).await.unwrap();
    let id = GlobalId::new(db.site_id(), 0);
    let edited = db.load(id, Visibility::LIVE).await.unwrap().unwrap();
    assert_eq!(edited.check_in.drink.price, Some(5.5));
    assert_eq!(edited.check_in.drink.name.as_deref(), Some("Heady Topper"));
    drop(db);

    let error = run_edit("0", &DrinkArgs::default(), &db_path, &config)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::NothingToEdit));

    run_delete("0", &db_path, &config).await.unwrap();
    let db = open_data_layer(&db_path, &config).await.unwrap();
    assert!(db.load(id, Visibility::LIVE).await.unwrap().is_none());
    assert!(db.load(id, Visibility::ALL).await.unwrap().unwrap().metadata.deleted);
    drop(db);

    let error = run_delete("0", &db_path, &config).await.unwrap_err();
    assert!(matches!(error, CliError::CheckInNotFound(_)));

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn import_is_deduplicated_and_needs_approval() {
    let config = CliConfig::default();
    let db_path = unique_test_db_path();
    let args = DrinkArgs {
        style: Some(StyleArg::Wine),
        ..DrinkArgs::default()
    };

    run_import(4242, &args, &db_path, &config).await.unwrap();
    run_import(4242, &args, &db_path, &config).await.unwrap();

    let db = open_data_layer(&db_path, &config).await.unwrap();
    let imported = db.load_by_external_id(4242).await.unwrap().unwrap();
    assert_eq!(imported.id(), GlobalId::new(db.site_id(), 0));
    assert!(db.load(imported.id(), Visibility::LIVE).await.unwrap().is_none());
    let log = db.operation_log(None).await.unwrap();
    assert_eq!(log[&db.site_id()].operations.len(), 1);
    drop(db);

    run_approve("0", false, &db_path, &config).await.unwrap();
    let db = open_data_layer(&db_path, &config).await.unwrap();
    assert!(db.load(imported.id(), Visibility::LIVE).await.unwrap().is_some());

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn config_site_pins_the_store_identity() {
    let db_path = unique_test_db_path();
    let site = SiteId::new();
    let config = CliConfig {
        site_id: Some(site.to_string()),
        ..CliConfig::default()
    };

    run_add(&DrinkArgs::default(), &db_path, &config).await.unwrap();

    let db = open_data_layer(&db_path, &config).await.unwrap();
    assert_eq!(db.site_id(), site);
    let added = db.load(GlobalId::new(site, 0), Visibility::LIVE).await.unwrap();
    assert!(added.is_some());
    drop(db);

    // Without the pin, the store keeps the identity it was given
    let db = open_data_layer(&db_path, &CliConfig::default()).await.unwrap();
    assert_eq!(db.site_id(), site);
    drop(db);

    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn export_then_merge_into_another_device() {
    let config = CliConfig::default();
    let source_path = unique_test_db_path();
    let target_path = unique_test_db_path();
    let export_path = unique_test_file_path("json");

    for style in [StyleArg::Beer, StyleArg::Sake] {
        run_add(
            &DrinkArgs {
                style: Some(style),
                ..DrinkArgs::default()
            },
            &source_path,
            &config,
        )
        .await
        .unwrap();
    }
    run_export(ExportFormat::Json, Some(&export_path), false, &source_path, &config)
        .await
        .unwrap();

    let exported = parse_json_export(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(exported.len(), 2);

    let summary = run_merge(&export_path, &target_path, &config).await.unwrap();
    assert_eq!(
        summary,
        MergeSummary {
            merged: 2,
            skipped: 0
        }
    );

    let target = open_data_layer(&target_path, &config).await.unwrap();
    for model in &exported {
        let merged = target.load(model.id(), Visibility::LIVE).await.unwrap().unwrap();
        assert_eq!(merged.check_in.drink, model.check_in.drink);
    }
    let log = target.operation_log(None).await.unwrap();
    assert_eq!(log[&target.site_id()].operations.len(), 2);
    drop(target);

    // Replaying the same export is a no-op
    run_merge(&export_path, &target_path, &config).await.unwrap();
    let target = open_data_layer(&target_path, &config).await.unwrap();
    let log = target.operation_log(None).await.unwrap();
    assert_eq!(log[&target.site_id()].operations.len(), 2);
    drop(target);

    let summary = run_merge(&export_path, &source_path, &config).await.unwrap();
    assert_eq!(
        summary,
        MergeSummary {
            merged: 0,
            skipped: 2
        }
    );

    let _ = std::fs::remove_file(export_path);
    cleanup_db_files(&source_path);
    cleanup_db_files(&target_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn export_markdown_skips_deleted_by_default() {
    let config = CliConfig::default();
    let db_path = unique_test_db_path();
    let output_path = unique_test_file_path("md");

    for name in ["Keeper", "Gone"] {
        run_add(
            &DrinkArgs {
                name: Some(name.to_string()),
                ..DrinkArgs::default()
            },
            &db_path,
            &config,
        )
        .await
        .unwrap();
    }
    run_delete("1", &db_path, &config).await.unwrap();

    run_export(ExportFormat::Markdown, Some(&output_path), false, &db_path, &config)
        .await
        .unwrap();
    let rendered = std::fs::read_to_string(&output_path).unwrap();
    assert!(rendered.contains("# Keeper"));
    assert!(!rendered.contains("# Gone"));

    run_export(ExportFormat::Markdown, Some(&output_path), true, &db_path, &config)
        .await
        .unwrap();
    let rendered = std::fs::read_to_string(&output_path).unwrap();
    assert!(rendered.contains("# Gone"));
    assert!(rendered.contains("deleted: true"));

    let _ = std::fs::remove_file(output_path);
    cleanup_db_files(&db_path);
}

#[test]
fn run_completions_writes_bash_script_file() {
    let output_path = unique_test_file_path("bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_spirits()"));
    assert!(script.contains("complete -F _spirits"));

    let _ = std::fs::remove_file(output_path);
}

fn unique_suffix() -> String {
    static NEXT_TEST_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("{timestamp}-{sequence}")
}

fn unique_test_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("spirits-cli-test-{}.db", unique_suffix()))
}

fn unique_test_file_path(extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("spirits-cli-test-{}.{extension}", unique_suffix()))
}

fn cleanup_db_files(path: &Path) {
    // On Windows, libsql can keep file handles alive briefly after drop.
    if cfg!(windows) {
        return;
    }

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
}
