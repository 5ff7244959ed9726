//! User module - identity and subscription state of a single account.

mod auth_event;
mod profile;
mod record;

pub use auth_event::AuthEvent;
pub use profile::{AuthUserProfile, OwnedTable};
pub use record::{SubscriptionUpdate, UserRecord, FREE_TIER};
