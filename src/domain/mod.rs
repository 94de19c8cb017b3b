//! Exchange-agnostic domain types.
//!
//! Everything in this module is pure: no I/O, no clocks beyond envelope
//! timestamping at construction, no dependencies on the bus or stores.

pub mod envelope;
pub mod id;
pub mod intent;
pub mod payload;
pub mod plan;
pub mod read_model;
pub mod reducer;
pub mod topic;

pub use envelope::EventEnvelope;
pub use id::{CorrelationId, EventId, IntentId, PlanId, TxHash};
pub use intent::{Asset, ExecutionStyle, Intent, IntentConstraints, IntentType, SubmitIntent};
pub use payload::{FailureReason, Payload};
pub use plan::{ExecutionPlan, PlanStep};
pub use read_model::{IntentReadModel, IntentState, PlanReadModel, PlanStatus};
pub use topic::{Pattern, Topic, TopicClass};
