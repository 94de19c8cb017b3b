//! Single-hop route source quoting the configured venue adapter.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::intent::Asset;
use crate::error::{RouteError, VenueError};
use crate::port::route::{Route, RouteSource};
use crate::port::venue::VenueAdapter;

/// Routes every swap directly through one venue.
pub struct VenueRouter {
    venue: Arc<dyn VenueAdapter>,
}

impl VenueRouter {
    #[must_use]
    pub fn new(venue: Arc<dyn VenueAdapter>) -> Self {
        Self { venue }
    }
}

#[async_trait]
impl RouteSource for VenueRouter {
    async fn best_route(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
    ) -> Result<Route, RouteError> {
        let price = self
            .venue
            .price_quote(base, quote, amount_in)
            .await
            .map_err(|e| match e {
                VenueError::UnsupportedPair { .. } => RouteError::NoRoute,
                VenueError::ReceiptTimeout { .. } => RouteError::Timeout,
                other => RouteError::Internal(other.to_string()),
            })?;
        if price.amount_out <= Decimal::ZERO {
            return Err(RouteError::NoRoute);
        }
        Ok(Route {
            amount_out: price.amount_out,
            path: vec![base.address.clone(), quote.address.clone()],
        })
    }
}
