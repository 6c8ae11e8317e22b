//! Fault isolation for advisory providers.
//!
//! - **CircuitBreaker**: three-state breaker per provider with permit-based settlement.
//! - **CircuitBreakerRegistry**: one breaker per capability, owned and injected.
//! - **execute_guarded**: breaker + timeout + fallback around a single provider call.

mod breaker;
mod guard;
mod registry;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CallPermit, CircuitBreaker};
pub use guard::{Guarded, execute_guarded};
pub use registry::CircuitBreakerRegistry;
