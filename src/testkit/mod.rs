//! Shared test utilities available to both unit and integration tests.
//!
//! # Modules
//!
//! - [`venue`] - [`ScriptedVenueAdapter`](venue::ScriptedVenueAdapter):
//!   deterministic venue double with scripted receipts and failures.
//! - [`route`] - [`StaticRouteSource`](route::StaticRouteSource):
//!   scripted route function.
//! - [`bus`] - [`FlakyBus`](bus::FlakyBus): failure-injecting bus
//!   wrapper.
//! - [`domain`] - builders for assets, submissions, and envelopes.

pub mod bus;
pub mod domain;
pub mod route;
pub mod venue;
