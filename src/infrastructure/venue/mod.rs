//! Venue adapter implementations.

mod uniswap_v3;

pub use uniswap_v3::{PoolState, UniswapV3Adapter};
