//! hy-core: stable foundation for the hybrid ODE engine.
//!
//! Contains:
//! - numeric (Real + tolerances + weighted error norm + float helpers)
//! - ids (compact index ids for events and rules)
//! - error (shared error types)
//! - timing (opt-in wall-clock timers)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;

pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
