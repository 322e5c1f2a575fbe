mod breaker;
mod client;
mod cost;
mod limiter;
mod retry;

pub use breaker::{BreakerOpen, CircuitBreaker};
pub use client::{GenerateError, ProtectedClient};
pub use cost::{CostExceeded, CostGuard, CostLedger, ModelPrice, PriceTable};
pub use limiter::RateLimiter;
pub use retry::RetryPolicy;
