//! Write/merge engine and change-feed reader over a transactional store.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::db::{DataAccess, LibSqlStore, Store, StoreChanged};
use crate::error::{Error, Result};
use crate::models::{
    ExternalId, GlobalId, Model, OperationLog, OperationLogEntry, PersistedRecord, SiteId, Token,
    Visibility,
};

/// How a save reaches the store.
///
/// A site commits its own writes and syncs everyone else's; the origin of
/// the target id is checked before either handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteIntent {
    /// A write originating on this site
    LocalWrite,
    /// A write another site originated, incorporated here
    ForeignMerge,
}

impl WriteIntent {
    #[must_use]
    pub const fn from_syncing(syncing: bool) -> Self {
        if syncing {
            Self::ForeignMerge
        } else {
            Self::LocalWrite
        }
    }

    fn check_origin(self, id: GlobalId, owner: SiteId) -> Result<()> {
        match self {
            Self::LocalWrite => Ok(()),
            Self::ForeignMerge if id.is_owned_by(owner) => Err(Error::WrongSyncCommitChoice(
                format!("{id} belongs to this site and must be committed, not synced"),
            )),
            Self::ForeignMerge if id.is_wildcard() => Err(Error::ImproperOperationFormat(format!(
                "cannot merge {id}: foreign writes must carry an assigned index"
            ))),
            Self::ForeignMerge => Ok(()),
        }
    }
}

enum SaveOutcome {
    /// Content matched the stored record; nothing was allocated
    Unchanged(GlobalId),
    Written(GlobalId),
}

/// The data layer one site uses to read and write its primary store.
pub struct DataLayer<S: Store> {
    store: S,
    owner: SiteId,
}

impl DataLayer<LibSqlStore> {
    /// Open the libSQL store at `path` and bind to its owning site
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = LibSqlStore::open(path).await?;
        let owner = store.owner_site().await?;
        Ok(Self::new(store, owner))
    }

    /// In-memory data layer (primarily for tests)
    pub async fn open_in_memory() -> Result<Self> {
        let store = LibSqlStore::open_in_memory().await?;
        let owner = store.owner_site().await?;
        Ok(Self::new(store, owner))
    }
}

impl<S: Store> DataLayer<S> {
    pub const fn new(store: S, owner: SiteId) -> Self {
        Self { store, owner }
    }

    /// The site this data layer writes as
    pub const fn site_id(&self) -> SiteId {
        self.owner
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Notifications fire once per committed write, never for no-op saves
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChanged> {
        self.store.subscribe()
    }

    /// Persist `model`, committing it as a local write or merging it as a foreign one.
    ///
    /// Saving content identical to what is stored returns the stored id and
    /// leaves every counter untouched.
    pub async fn save(&self, model: &Model, syncing: bool) -> Result<GlobalId> {
        self.save_with_intent(model, WriteIntent::from_syncing(syncing))
            .await
    }

    pub async fn save_with_intent(&self, model: &Model, intent: WriteIntent) -> Result<GlobalId> {
        intent.check_origin(model.id(), self.owner)?;

        let tx = self.store.read_write_transaction().await?;
        let outcome = self.write_model(&tx, model, intent).await;
        Self::settle(tx, outcome).await
    }

    /// Tombstone a check-in. Deleting twice is a no-op.
    pub async fn delete(&self, id: GlobalId) -> Result<GlobalId> {
        let mut model = self
            .load(id, Visibility::ALL)
            .await?
            .ok_or_else(|| Error::NotFound(format!("check-in {id}")))?;
        model.metadata.deleted = true;
        self.save(&model, false).await
    }

    /// Approve or withdraw an imported check-in
    pub async fn set_external_approval(&self, id: GlobalId, approved: bool) -> Result<GlobalId> {
        let tx = self.store.read_write_transaction().await?;
        let outcome = self.write_approval(&tx, id, approved).await;
        Self::settle(tx, outcome).await
    }

    async fn write_model<'t>(
        &self,
        tx: &S::Transaction<'t>,
        model: &Model,
        intent: WriteIntent,
    ) -> Result<SaveOutcome>
    where
        S: 't,
    {
        let t = tx.lamport_timestamp().await?;
        let existing = tx.data_for_id(model.id()).await?;
        let data = PersistedRecord::from_model(model, t + 1, existing.as_ref());
        self.write_record(tx, data, existing.as_ref(), intent).await
    }

    async fn write_approval<'t>(
        &self,
        tx: &S::Transaction<'t>,
        id: GlobalId,
        approved: bool,
    ) -> Result<SaveOutcome>
    where
        S: 't,
    {
        let t = tx.lamport_timestamp().await?;
        let existing = tx
            .data_for_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("check-in {id}")))?;
        if existing.external_id.is_none() {
            return Err(Error::InvalidInput(format!(
                "check-in {id} was not imported and has nothing to approve"
            )));
        }

        let data = PersistedRecord {
            lamport: t + 1,
            external_approved: approved,
            ..existing.clone()
        };
        self.write_record(tx, data, Some(&existing), WriteIntent::LocalWrite)
            .await
    }

    async fn write_record<'t>(
        &self,
        tx: &S::Transaction<'t>,
        data: PersistedRecord,
        existing: Option<&PersistedRecord>,
        intent: WriteIntent,
    ) -> Result<SaveOutcome>
    where
        S: 't,
    {
        if existing.is_some_and(|stored| stored.same_content(&data)) {
            tracing::debug!("Check-in {} unchanged; skipping write", data.id);
            return Ok(SaveOutcome::Unchanged(data.id));
        }

        match intent {
            WriteIntent::LocalWrite => {
                let id = tx.commit(data, self.owner).await?;
                tracing::debug!("Committed local check-in {id}");
                Ok(SaveOutcome::Written(id))
            }
            WriteIntent::ForeignMerge => {
                let id = data.id;
                let witness = tx.next_operation_index(self.owner).await?;
                let mut log = OperationLog::new();
                log.insert(self.owner, OperationLogEntry::new(witness, vec![id]));
                tx.sync(vec![data], &log).await?;
                tracing::debug!("Merged foreign check-in {id} as {}:{witness}", self.owner);
                Ok(SaveOutcome::Written(id))
            }
        }
    }

    /// Commit written transactions; roll back no-ops so nothing they allocated survives
    async fn settle<'t>(tx: S::Transaction<'t>, outcome: Result<SaveOutcome>) -> Result<GlobalId>
    where
        S: 't,
    {
        match outcome {
            Ok(SaveOutcome::Unchanged(id)) => {
                tx.abort().await?;
                Ok(id)
            }
            Ok(SaveOutcome::Written(id)) => {
                tx.complete().await?;
                Ok(id)
            }
            Err(error) => tx.finish(Err(error)).await,
        }
    }

    /// Check-ins in `[from, to)` written after `since`, with the token to resume from.
    ///
    /// Result order is unspecified; callers sort by check-in time.
    pub async fn get_models(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        since: Option<&Token>,
        visibility: Visibility,
    ) -> Result<(Vec<Model>, Token)> {
        let tx = self.store.read_transaction().await?;
        let outcome = Self::read_models(&tx, from, to, since, visibility).await;
        tx.finish(outcome).await
    }

    async fn read_models<'t>(
        tx: &S::Transaction<'t>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        since: Option<&Token>,
        visibility: Visibility,
    ) -> Result<(Vec<Model>, Token)>
    where
        S: 't,
    {
        let (records, scanned) = tx.data_in_range(from, to, since).await?;
        let token = since.map_or_else(Token::new, Clone::clone).merged(&scanned);

        let mut seen = HashSet::new();
        let mut models = Vec::new();
        for record in records.iter().filter(|record| visibility.admits(record)) {
            seen.insert(record.id);
            models.push(record.to_model());
        }

        if visibility.include_pending_external {
            let (pending, _) = tx.pending_external().await?;
            for record in pending {
                if seen.insert(record.id) {
                    models.push(record.to_model());
                }
            }
        }

        Ok((models, token))
    }

    /// One check-in, if it exists and `visibility` admits it
    pub async fn load(&self, id: GlobalId, visibility: Visibility) -> Result<Option<Model>> {
        let tx = self.store.read_transaction().await?;
        let outcome = tx.data_for_id(id).await;
        let record = tx.finish(outcome).await?;
        Ok(record
            .filter(|record| visibility.admits(record))
            .map(|record| record.to_model()))
    }

    /// An imported check-in by its external id, in any state
    pub async fn load_by_external_id(&self, external_id: ExternalId) -> Result<Option<Model>> {
        let tx = self.store.read_transaction().await?;
        let outcome = tx.data_for_external_id(external_id).await;
        let record = tx.finish(outcome).await?;
        Ok(record.map(|record| record.to_model()))
    }

    /// Most recently added live check-in
    pub async fn last_added_model(&self) -> Result<Option<Model>> {
        let tx = self.store.read_transaction().await?;
        let outcome = tx.last_added_data().await;
        let record = tx.finish(outcome).await?;
        Ok(record.map(|record| record.to_model()))
    }

    /// Operations `after` has not observed
    pub async fn operation_log(&self, after: Option<&Token>) -> Result<OperationLog> {
        let tx = self.store.read_transaction().await?;
        let outcome = tx.operation_log(after).await;
        tx.finish(outcome).await
    }
}
