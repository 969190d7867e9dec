//! libSQL implementation of the store contract

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use tokio::sync::{broadcast, Mutex, MutexGuard};

use super::connection::Database;
use super::store::{DataAccess, Store, StoreChanged, TransactionMode};
use crate::error::{Error, Result};
use crate::models::{
    DrinkStyle, ExternalId, GlobalId, LamportClock, OperationIndex, OperationLog,
    OperationLogEntry, PersistedRecord, SiteId, Token, WILDCARD_INDEX,
};

const LAMPORT_KEY: &str = "lamport";
const CHANGE_CHANNEL_CAPACITY: usize = 64;

const RECORD_COLUMNS: &str = "site_id, operation_index, lamport, is_deleted, created_at, \
     checkin_time, drink_name, drink_style, drink_abv, drink_price, drink_volume_ml, \
     external_id, external_approved, last_op_site, last_op_index";

/// Store backed by a single libSQL connection.
///
/// Transactions are serialized through a mutex, so there is exactly one
/// writer at a time and readers never observe a partial write.
pub struct LibSqlStore {
    db: Mutex<Database>,
    changes: broadcast::Sender<StoreChanged>,
}

impl LibSqlStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Mutex::new(db),
            changes,
        }
    }

    /// Open a file-backed store, creating it if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| Error::CouldNotOpenStore(error.to_string()))?;
        }
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory store (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// The site that owns this store
    pub async fn owner_site(&self) -> Result<SiteId> {
        self.db.lock().await.owner_site().await
    }

    /// Pin the owning site
    pub async fn set_owner_site(&self, site: SiteId) -> Result<()> {
        self.db.lock().await.set_owner_site(site).await
    }

    async fn begin(&self, mode: TransactionMode) -> Result<LibSqlTransaction<'_>> {
        let db = self.db.lock().await;
        let statement = match mode {
            TransactionMode::Read => "BEGIN DEFERRED",
            TransactionMode::ReadWrite => "BEGIN IMMEDIATE",
        };

        if let Err(error) = db.connection().execute(statement, ()).await {
            // A caller that dropped its transaction mid-flight leaves it open
            tracing::warn!("Could not begin transaction ({error}); rolling back stale transaction");
            db.connection().execute("ROLLBACK", ()).await.ok();
            db.connection().execute(statement, ()).await?;
        }

        Ok(LibSqlTransaction {
            db,
            mode,
            wrote: AtomicBool::new(false),
            changes: &self.changes,
        })
    }
}

impl Store for LibSqlStore {
    type Transaction<'a> = LibSqlTransaction<'a>;

    async fn read_transaction(&self) -> Result<LibSqlTransaction<'_>> {
        self.begin(TransactionMode::Read).await
    }

    async fn read_write_transaction(&self) -> Result<LibSqlTransaction<'_>> {
        self.begin(TransactionMode::ReadWrite).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChanged> {
        self.changes.subscribe()
    }
}

/// One open transaction; holds the store lock until completed or aborted
pub struct LibSqlTransaction<'a> {
    db: MutexGuard<'a, Database>,
    mode: TransactionMode,
    wrote: AtomicBool,
    changes: &'a broadcast::Sender<StoreChanged>,
}

impl LibSqlTransaction<'_> {
    fn conn(&self) -> &libsql::Connection {
        self.db.connection()
    }

    fn require_write(&self, operation: &str) -> Result<()> {
        if self.mode == TransactionMode::ReadWrite {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "{operation} requires a read-write transaction"
            )))
        }
    }

    fn mark_written(&self) {
        self.wrote.store(true, Ordering::Release);
    }

    async fn query_records(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<(PersistedRecord, GlobalId)>> {
        let mut rows = self
            .conn()
            .query(sql, libsql::params_from_iter(params))
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record(&row)?);
        }
        Ok(records)
    }

    async fn stored_lamport(&self) -> Result<LamportClock> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM store_meta WHERE key = ?", [LAMPORT_KEY])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(0);
        };
        let value: String = row.get(0)?;
        value
            .parse()
            .map_err(|_| Error::Internal(format!("corrupt Lamport clock: {value}")))
    }

    async fn store_lamport(&self, value: LamportClock) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?, ?)",
                libsql::params![LAMPORT_KEY, value.to_string()],
            )
            .await?;
        Ok(())
    }

    /// Keep the clock at or above every stamp written to the store
    async fn raise_lamport(&self, at_least: LamportClock) -> Result<()> {
        if self.stored_lamport().await? < at_least {
            self.store_lamport(at_least).await?;
        }
        Ok(())
    }

    async fn raise_site_index(&self, site: SiteId, next_index: u64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO site_indices (site_id, next_index) VALUES (?, ?)
                 ON CONFLICT(site_id) DO UPDATE SET next_index = MAX(next_index, excluded.next_index)",
                libsql::params![site.as_str(), to_sql_integer(next_index)?],
            )
            .await?;
        Ok(())
    }

    /// Number of operations of `site` the log accounts for
    async fn known_operation_count(&self, site: SiteId) -> Result<u64> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COALESCE(MAX(operation_index) + 1, 0) FROM operations WHERE site_id = ?",
                libsql::params![site.as_str()],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| Error::Internal(format!("negative operation count {count}")))
    }

    async fn operation_target(&self, operation: GlobalId) -> Result<Option<GlobalId>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT target_site, target_index FROM operations
                 WHERE site_id = ? AND operation_index = ?",
                libsql::params![operation.site.as_str(), i64::from(operation.index)],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(GlobalId::new(
            parse_site(&row.get::<String>(0)?)?,
            parse_index(row.get::<i64>(1)?)?,
        )))
    }

    async fn append_operation(&self, operation: GlobalId, target: GlobalId) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO operations (site_id, operation_index, target_site, target_index)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    operation.site.as_str(),
                    i64::from(operation.index),
                    target.site.as_str(),
                    i64::from(target.index)
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_record(&self, record: &PersistedRecord, operation: GlobalId) -> Result<()> {
        let external_id = record
            .external_id
            .map(|id| to_sql_integer(id).map(Value::Integer))
            .transpose()?
            .unwrap_or(Value::Null);
        let params = vec![
            Value::Text(record.id.site.as_str()),
            Value::Integer(i64::from(record.id.index)),
            Value::Integer(to_sql_integer(record.lamport)?),
            Value::Integer(i64::from(record.deleted)),
            Value::Integer(record.creation_time.timestamp_millis()),
            Value::Integer(record.time.timestamp_millis()),
            record.drink_name.clone().map_or(Value::Null, Value::Text),
            Value::Text(record.drink_style.as_str().to_string()),
            Value::Real(record.drink_abv),
            record.drink_price.map_or(Value::Null, Value::Real),
            Value::Real(record.drink_volume_ml),
            external_id,
            Value::Integer(i64::from(record.external_approved)),
            Value::Text(operation.site.as_str()),
            Value::Integer(i64::from(operation.index)),
        ];

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO checkins ({RECORD_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(site_id, operation_index) DO UPDATE SET
                        lamport = excluded.lamport,
                        is_deleted = excluded.is_deleted,
                        created_at = excluded.created_at,
                        checkin_time = excluded.checkin_time,
                        drink_name = excluded.drink_name,
                        drink_style = excluded.drink_style,
                        drink_abv = excluded.drink_abv,
                        drink_price = excluded.drink_price,
                        drink_volume_ml = excluded.drink_volume_ml,
                        external_id = excluded.external_id,
                        external_approved = excluded.external_approved,
                        last_op_site = excluded.last_op_site,
                        last_op_index = excluded.last_op_index"
                ),
                libsql::params_from_iter(params),
            )
            .await?;
        Ok(())
    }

    async fn record_exists(&self, id: GlobalId) -> Result<bool> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM checkins WHERE site_id = ? AND operation_index = ?",
                libsql::params![id.site.as_str(), i64::from(id.index)],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

impl DataAccess for LibSqlTransaction<'_> {
    async fn lamport_timestamp(&self) -> Result<LamportClock> {
        self.require_write("Lamport allocation")?;
        let current = self.stored_lamport().await?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| Error::Internal("Lamport clock exhausted".into()))?;
        self.store_lamport(next).await?;
        Ok(current)
    }

    async fn next_operation_index(&self, site: SiteId) -> Result<OperationIndex> {
        self.require_write("operation index allocation")?;
        let mut rows = self
            .conn()
            .query(
                "SELECT next_index FROM site_indices WHERE site_id = ?",
                libsql::params![site.as_str()],
            )
            .await?;
        let next = match rows.next().await? {
            Some(row) => parse_index(row.get::<i64>(0)?)?,
            None => 0,
        };
        if next == WILDCARD_INDEX {
            return Err(Error::Internal(format!(
                "operation index space exhausted for site {site}"
            )));
        }
        self.raise_site_index(site, u64::from(next) + 1).await?;
        Ok(next)
    }

    async fn data_for_id(&self, id: GlobalId) -> Result<Option<PersistedRecord>> {
        let records = self
            .query_records(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM checkins WHERE site_id = ? AND operation_index = ?"
                ),
                vec![
                    Value::Text(id.site.as_str()),
                    Value::Integer(i64::from(id.index)),
                ],
            )
            .await?;
        Ok(records.into_iter().next().map(|(record, _)| record))
    }

    async fn data_for_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<PersistedRecord>> {
        let records = self
            .query_records(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM checkins WHERE external_id = ? ORDER BY rowid LIMIT 1"
                ),
                vec![Value::Integer(to_sql_integer(external_id)?)],
            )
            .await?;
        Ok(records.into_iter().next().map(|(record, _)| record))
    }

    async fn data_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<&Token>,
    ) -> Result<(Vec<PersistedRecord>, Token)> {
        let scanned = self
            .query_records(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM checkins
                     WHERE checkin_time >= ? AND checkin_time < ?"
                ),
                vec![
                    Value::Integer(from.timestamp_millis()),
                    Value::Integer(to.timestamp_millis()),
                ],
            )
            .await?;

        let mut token = after.cloned().unwrap_or_default();
        let mut records = Vec::new();
        for (record, operation) in scanned {
            if after.is_none_or(|seen| seen.is_unobserved(operation)) {
                token.observe(operation);
                records.push(record);
            }
        }
        Ok((records, token))
    }

    async fn pending_external(&self) -> Result<(Vec<PersistedRecord>, Token)> {
        let scanned = self
            .query_records(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM checkins
                     WHERE external_id IS NOT NULL AND external_approved = 0 AND is_deleted = 0"
                ),
                Vec::new(),
            )
            .await?;

        let token = scanned.iter().map(|(_, operation)| *operation).collect();
        let records = scanned.into_iter().map(|(record, _)| record).collect();
        Ok((records, token))
    }

    async fn commit(&self, data: PersistedRecord, site: SiteId) -> Result<GlobalId> {
        self.require_write("commit")?;

        if data.id.is_wildcard() {
            if !data.id.is_owned_by(site) {
                return Err(Error::ImproperOperationFormat(format!(
                    "wildcard id {} cannot be committed by site {site}",
                    data.id
                )));
            }
        } else if !self.record_exists(data.id).await? {
            if data.id.is_owned_by(site) {
                return Err(Error::MismatchedOperation {
                    operation: data.id,
                    reason: "id was never allocated by this site".into(),
                });
            }
            // Foreign ids enter the store through sync only
            return Err(Error::WrongSyncCommitChoice(format!(
                "{} belongs to another site and has not been synced",
                data.id
            )));
        }

        let index = self.next_operation_index(site).await?;
        let operation = GlobalId::new(site, index);
        let id = if data.id.is_wildcard() {
            operation
        } else {
            data.id
        };
        let record = PersistedRecord { id, ..data };

        self.append_operation(operation, id).await?;
        self.upsert_record(&record, operation).await?;
        self.raise_lamport(record.lamport).await?;
        self.mark_written();

        tracing::debug!("Committed {id} as operation {operation}");
        Ok(id)
    }

    async fn sync(&self, data: Vec<PersistedRecord>, log: &OperationLog) -> Result<()> {
        self.require_write("sync")?;

        // Validate the whole payload before touching anything
        let mut witnesses: HashMap<GlobalId, GlobalId> = HashMap::new();
        for (site, entry) in log {
            if entry.operations.is_empty() {
                return Err(Error::ImproperOperationFormat(format!(
                    "empty operation list for site {site}"
                )));
            }
            if entry.end_index() > u64::from(WILDCARD_INDEX) {
                return Err(Error::ImproperOperationFormat(format!(
                    "operations for site {site} run into the wildcard index"
                )));
            }
            for (index, target) in entry.indexed() {
                if target.is_wildcard() {
                    return Err(Error::ImproperOperationFormat(format!(
                        "operation {site}:{index} targets unassigned id {target}"
                    )));
                }
                witnesses.insert(target, GlobalId::new(*site, narrow_index(index)?));
            }
        }
        for record in &data {
            if !witnesses.contains_key(&record.id) {
                return Err(Error::ImproperOperationFormat(format!(
                    "record {} is not covered by the operation log",
                    record.id
                )));
            }
        }

        let mut applied = HashSet::new();
        for (site, entry) in log {
            let known = self.known_operation_count(*site).await?;
            if u64::from(entry.starting_index) > known {
                return Err(Error::MissingPrecedingOperations {
                    site: *site,
                    starting_index: entry.starting_index,
                    known,
                });
            }

            for (index, target) in entry.indexed() {
                let operation = GlobalId::new(*site, narrow_index(index)?);
                match self.operation_target(operation).await? {
                    Some(existing) if existing != target => {
                        return Err(Error::MismatchedOperation {
                            operation,
                            reason: format!("stored target {existing}, incoming target {target}"),
                        });
                    }
                    Some(_) => {}
                    None => {
                        self.append_operation(operation, target).await?;
                        applied.insert(operation);
                    }
                }
            }
            self.raise_site_index(*site, entry.end_index()).await?;
        }

        for record in data {
            let witness = witnesses[&record.id];
            if !applied.contains(&witness) {
                tracing::debug!("Skipping {}: operation {witness} already applied", record.id);
                continue;
            }
            self.upsert_record(&record, witness).await?;
            self.raise_lamport(record.lamport).await?;
        }

        if !applied.is_empty() {
            self.mark_written();
        }
        Ok(())
    }

    async fn last_added_data(&self) -> Result<Option<PersistedRecord>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM checkins ORDER BY rowid DESC"),
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let (record, _) = parse_record(&row)?;
            if record.is_live() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn operation_log(&self, after: Option<&Token>) -> Result<OperationLog> {
        let mut rows = self
            .conn()
            .query(
                "SELECT site_id, operation_index, target_site, target_index
                 FROM operations ORDER BY site_id, operation_index",
                (),
            )
            .await?;

        let mut log: OperationLog = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            let operation = GlobalId::new(
                parse_site(&row.get::<String>(0)?)?,
                parse_index(row.get::<i64>(1)?)?,
            );
            if after.is_some_and(|seen| !seen.is_unobserved(operation)) {
                continue;
            }
            let target = GlobalId::new(
                parse_site(&row.get::<String>(2)?)?,
                parse_index(row.get::<i64>(3)?)?,
            );

            let entry = log
                .entry(operation.site)
                .or_insert_with(|| OperationLogEntry::new(operation.index, Vec::new()));
            if entry.end_index() != u64::from(operation.index) {
                tracing::warn!("Operation log for {} has a gap before {operation}", operation.site);
                continue;
            }
            entry.operations.push(target);
        }
        Ok(log)
    }

    async fn complete(self) -> Result<()> {
        if let Err(error) = self.conn().execute("COMMIT", ()).await {
            self.conn().execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        let Self {
            db, wrote, changes, ..
        } = self;
        // Release the store before anyone hears about the change
        drop(db);

        if wrote.into_inner() {
            let changes = changes.clone();
            tokio::spawn(async move {
                let receivers = changes.send(StoreChanged).unwrap_or(0);
                tracing::debug!("Store change delivered to {receivers} subscribers");
            });
        }
        Ok(())
    }

    async fn abort(self) -> Result<()> {
        self.conn().execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

fn parse_record(row: &Row) -> Result<(PersistedRecord, GlobalId)> {
    let id = GlobalId::new(
        parse_site(&row.get::<String>(0)?)?,
        parse_index(row.get::<i64>(1)?)?,
    );
    let lamport = u64::try_from(row.get::<i64>(2)?)
        .map_err(|_| Error::Internal(format!("negative Lamport stamp on {id}")))?;
    let external_id = optional_integer(row, 11)?
        .map(|value| {
            u64::try_from(value)
                .map_err(|_| Error::Internal(format!("negative external id on {id}")))
        })
        .transpose()?;
    let operation = GlobalId::new(
        parse_site(&row.get::<String>(13)?)?,
        parse_index(row.get::<i64>(14)?)?,
    );

    let record = PersistedRecord {
        id,
        lamport,
        deleted: row.get::<i64>(3)? != 0,
        creation_time: parse_millis(row.get::<i64>(4)?)?,
        time: parse_millis(row.get::<i64>(5)?)?,
        drink_name: optional_text(row, 6)?,
        drink_style: row
            .get::<String>(7)?
            .parse::<DrinkStyle>()
            .map_err(|error| Error::Internal(error.to_string()))?,
        drink_abv: row.get::<f64>(8)?,
        drink_price: optional_real(row, 9)?,
        drink_volume_ml: row.get::<f64>(10)?,
        external_id,
        external_approved: row.get::<i64>(12)? != 0,
    };
    Ok((record, operation))
}

fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Internal(format!(
            "expected text in column {idx}, found {other:?}"
        ))),
    }
}

fn optional_real(row: &Row, idx: i32) -> Result<Option<f64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Real(value) => Ok(Some(value)),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(value) => Ok(Some(value as f64)),
        other => Err(Error::Internal(format!(
            "expected real in column {idx}, found {other:?}"
        ))),
    }
}

fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Internal(format!(
            "expected integer in column {idx}, found {other:?}"
        ))),
    }
}

fn parse_site(value: &str) -> Result<SiteId> {
    value
        .parse()
        .map_err(|_| Error::Internal(format!("corrupt site id: {value}")))
}

fn parse_index(value: i64) -> Result<OperationIndex> {
    OperationIndex::try_from(value)
        .map_err(|_| Error::Internal(format!("operation index out of range: {value}")))
}

fn narrow_index(value: u64) -> Result<OperationIndex> {
    OperationIndex::try_from(value)
        .map_err(|_| Error::ImproperOperationFormat(format!("operation index out of range: {value}")))
}

fn parse_millis(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| Error::Internal(format!("timestamp out of range: {value}")))
}

fn to_sql_integer(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::InvalidInput(format!("{value} does not fit in SQLite")))
}
