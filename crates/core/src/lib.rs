pub mod cache;
pub mod clock;
pub mod edit;
pub mod entity_type;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod presence;

pub use cache::{CacheError, LeaseCache, MemoryLeaseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use edit::{AuditAction, Caller, Direction, EditPayload, FieldErrors, OrderGroup};
pub use entity_type::{BodySource, EntityType, GroupAttr, QuestionKind};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use presence::{EditorPresence, LeaseMap, PresenceEntry, lease_key};
