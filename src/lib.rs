//! Swapsmith - intent-driven trading execution core.
//!
//! Clients submit a declarative trading goal (an intent to acquire or
//! dispose of an asset under constraints). The core validates it, gates it
//! on risk, plans a single-step swap, drives execution through a venue
//! adapter, and exposes the whole lifecycle as an append-only event log
//! with materialized read models.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/          # Pure types: ids, envelopes, topics, intents,
//! │                    # plans, read models, the projection reducer
//! ├── port/            # Trait seams: event bus, stores, venue adapter
//! ├── application/     # Services: intent manager, risk gate, planner,
//! │                    # orchestrator, state coordinator, gateway
//! ├── infrastructure/  # Adapters: in-process bus, in-memory stores,
//! │                    # Uniswap v3 venue, configuration
//! ├── app/             # Process wiring and health checks
//! └── testkit/         # Scripted doubles shared by unit and
//!                      # integration tests
//! ```
//!
//! Every durable mutation flows through the state coordinator: producers
//! publish envelopes to the bus, the coordinator is the single writer to
//! the event log and the read-model store.

pub mod app;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;
pub mod testkit;
