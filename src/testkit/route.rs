//! Scripted route function double.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::intent::Asset;
use crate::error::RouteError;
use crate::port::route::{Route, RouteSource};

/// Route double. Unscripted calls succeed with the default output.
pub struct StaticRouteSource {
    default_amount_out: Decimal,
    results: Mutex<VecDeque<Result<Route, RouteError>>>,
}

impl StaticRouteSource {
    #[must_use]
    pub fn quoting(default_amount_out: Decimal) -> Self {
        Self {
            default_amount_out,
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_result(&self, result: Result<Route, RouteError>) {
        self.results.lock().push_back(result);
    }
}

#[async_trait]
impl RouteSource for StaticRouteSource {
    async fn best_route(
        &self,
        base: &Asset,
        quote: &Asset,
        _amount_in: Decimal,
    ) -> Result<Route, RouteError> {
        if let Some(scripted) = self.results.lock().pop_front() {
            return scripted;
        }
        Ok(Route {
            amount_out: self.default_amount_out,
            path: vec![base.address.clone(), quote.address.clone()],
        })
    }
}
