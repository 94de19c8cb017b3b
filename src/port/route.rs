//! Route function port.
//!
//! Route optimization itself is external to the core: the planner only
//! needs deterministic output given pool snapshots. Failures map onto
//! the `NO_ROUTE` / `ROUTE_TIMEOUT` / `ROUTE_INTERNAL` rejection
//! reasons.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::intent::Asset;
use crate::error::RouteError;

/// Best route found for one swap.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub amount_out: Decimal,
    /// Asset addresses along the path, input first.
    pub path: Vec<String>,
}

/// External pure route function.
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn best_route(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
    ) -> Result<Route, RouteError>;
}
