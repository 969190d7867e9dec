//! Data models for Good Spirits

mod check_in;
mod ids;
mod operation_log;
mod record;
mod vector_clock;

pub use check_in::{CheckIn, Drink, DrinkStyle, ExternalId, Metadata, Model, Volume};
pub use ids::{GlobalId, LamportClock, OperationIndex, SiteId, WILDCARD_INDEX};
pub use operation_log::{OperationLog, OperationLogEntry};
pub use record::{PersistedRecord, Visibility};
pub use vector_clock::{Token, VectorClock};
