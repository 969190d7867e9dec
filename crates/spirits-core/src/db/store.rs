//! Transactional store contract consumed by the data layer

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{
    ExternalId, GlobalId, LamportClock, OperationIndex, OperationLog, PersistedRecord, SiteId,
    Token,
};

/// Whether a transaction may allocate and write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    Read,
    ReadWrite,
}

/// Payload-free notice that a committing transaction changed the store.
///
/// Consumers re-query to find out what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChanged;

/// Operations available inside one transaction.
///
/// Every allocation and write must happen inside a read-write transaction;
/// implementations reject them with `Error::Internal` otherwise.
#[allow(async_fn_in_trait)]
pub trait DataAccess {
    /// Read-and-advance the store-global Lamport clock, returning the value before the advance
    async fn lamport_timestamp(&self) -> Result<LamportClock>;

    /// Read-and-advance the operation counter of `site`
    async fn next_operation_index(&self, site: SiteId) -> Result<OperationIndex>;

    async fn data_for_id(&self, id: GlobalId) -> Result<Option<PersistedRecord>>;

    async fn data_for_external_id(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<PersistedRecord>>;

    /// Records with check-in time in `[from, to)` last written by an operation
    /// `after` has not observed, plus `after` advanced past every record scanned
    async fn data_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after: Option<&Token>,
    ) -> Result<(Vec<PersistedRecord>, Token)>;

    /// Imported records still awaiting approval
    async fn pending_external(&self) -> Result<(Vec<PersistedRecord>, Token)>;

    /// Write `data` as a new operation of `site`, minting its id if it carries the wildcard index
    async fn commit(&self, data: PersistedRecord, site: SiteId) -> Result<GlobalId>;

    /// Apply records produced elsewhere together with the operations that witness them
    async fn sync(&self, data: Vec<PersistedRecord>, log: &OperationLog) -> Result<()>;

    /// Most recently added live record
    async fn last_added_data(&self) -> Result<Option<PersistedRecord>>;

    /// Operations `after` has not observed, grouped per site
    async fn operation_log(&self, after: Option<&Token>) -> Result<OperationLog>;

    /// Commit the transaction
    async fn complete(self) -> Result<()>
    where
        Self: Sized;

    /// Roll the transaction back, discarding every allocation and write
    async fn abort(self) -> Result<()>
    where
        Self: Sized;

    /// Commit on success, roll back on failure, and hand `outcome` through
    async fn finish<T>(self, outcome: Result<T>) -> Result<T>
    where
        Self: Sized,
    {
        match outcome {
            Ok(value) => {
                self.complete().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.abort().await {
                    tracing::warn!("Rollback after failed transaction also failed: {rollback_error}");
                }
                Err(error)
            }
        }
    }
}

/// A persistence engine able to run scoped transactions and announce changes
#[allow(async_fn_in_trait)]
pub trait Store {
    type Transaction<'a>: DataAccess
    where
        Self: 'a;

    async fn read_transaction(&self) -> Result<Self::Transaction<'_>>;

    async fn read_write_transaction(&self) -> Result<Self::Transaction<'_>>;

    /// Notifications fire after a committing transaction has released the store
    fn subscribe(&self) -> broadcast::Receiver<StoreChanged>;
}
