//! Persisted record shape and its conversion to and from `Model`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check_in::{CheckIn, Drink, DrinkStyle, ExternalId, Metadata, Model, Volume};
use super::ids::{GlobalId, LamportClock};

/// Durable shape of a check-in and the unit of conflict resolution.
///
/// Times are held at millisecond precision so that a record survives a
/// round trip through the store unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: GlobalId,
    pub lamport: LamportClock,
    pub deleted: bool,
    pub creation_time: DateTime<Utc>,
    pub time: DateTime<Utc>,
    pub drink_name: Option<String>,
    pub drink_style: DrinkStyle,
    pub drink_abv: f64,
    pub drink_price: Option<f64>,
    pub drink_volume_ml: f64,
    pub external_id: Option<ExternalId>,
    pub external_approved: bool,
}

impl PersistedRecord {
    /// Merge `model` over `existing`, stamping it with `lamport`.
    ///
    /// Fields the model does not carry (external approval) come from
    /// `existing`; a record with no predecessor starts unapproved.
    #[must_use]
    pub fn from_model(
        model: &Model,
        lamport: LamportClock,
        existing: Option<&Self>,
    ) -> Self {
        let drink = &model.check_in.drink;
        Self {
            id: model.metadata.id,
            lamport,
            deleted: model.metadata.deleted,
            creation_time: truncate_to_millis(model.metadata.creation_time),
            time: truncate_to_millis(model.check_in.time),
            drink_name: drink.name.clone(),
            drink_style: drink.style,
            drink_abv: drink.abv,
            drink_price: drink.price,
            drink_volume_ml: drink.volume.as_milliliters(),
            external_id: model.check_in.external_id,
            external_approved: existing.is_some_and(|record| record.external_approved),
        }
    }

    /// Project to the application-facing shape
    #[must_use]
    pub fn to_model(&self) -> Model {
        Model {
            metadata: Metadata {
                id: self.id,
                creation_time: self.creation_time,
                deleted: self.deleted,
            },
            check_in: CheckIn {
                external_id: self.external_id,
                time: self.time,
                drink: Drink {
                    name: self.drink_name.clone(),
                    style: self.drink_style,
                    abv: self.drink_abv,
                    price: self.drink_price,
                    volume: Volume::milliliters(self.drink_volume_ml),
                },
            },
        }
    }

    /// Field-for-field equality, ignoring the Lamport stamp
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        Self {
            lamport: other.lamport,
            ..self.clone()
        } == *other
    }

    /// Imported from the external service and still awaiting approval
    #[must_use]
    pub const fn is_pending_external(&self) -> bool {
        self.external_id.is_some() && !self.external_approved
    }

    /// Default-visible: not tombstoned and not awaiting external approval
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !self.deleted && !self.is_pending_external()
    }
}

/// Which non-live records a read is allowed to surface.
///
/// Every path that hands records to callers filters through `admits`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    pub include_deleted: bool,
    pub include_pending_external: bool,
}

impl Visibility {
    /// Only live records
    pub const LIVE: Self = Self {
        include_deleted: false,
        include_pending_external: false,
    };

    /// Every record, regardless of state
    pub const ALL: Self = Self {
        include_deleted: true,
        include_pending_external: true,
    };

    #[must_use]
    pub const fn admits(self, record: &PersistedRecord) -> bool {
        (self.include_deleted || !record.deleted)
            && (self.include_pending_external || !record.is_pending_external())
    }
}

/// Drop sub-millisecond precision, which the store does not keep.
fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}
