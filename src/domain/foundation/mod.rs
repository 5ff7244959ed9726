//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, the timestamp value object with calendar
//! arithmetic, the state machine trait, and error types used by the
//! billing, credit and user modules.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{TransactionId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::{add_calendar_months, Timestamp};
