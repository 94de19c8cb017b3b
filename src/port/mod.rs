//! Trait seams between the application services and the outside world.
//!
//! These are the primary integration points: the event bus, the durable
//! stores, the venue adapter, and the route function. Application code
//! depends only on these traits; `infrastructure` provides the shipped
//! implementations and `testkit` the scripted ones.

pub mod bus;
pub mod route;
pub mod store;
pub mod venue;

pub use bus::{AckHandle, Delivery, EphemeralSubscription, EventBus, PublishOutcome, QueueSubscription, ResumeFrom};
pub use route::{Route, RouteSource};
pub use store::{AppendOutcome, EventLog, ReadModelStore};
pub use venue::{BuiltTx, PriceQuote, ReceiptStatus, TxReceipt, VenueAdapter};
