//! Compute Gate Meter - token-gated admission of compute requests
//!
//! Each `authorize(requester, units)` call runs one pass of a small state
//! machine:
//!
//! ```text
//! Pricing -> BalanceCheck -> Denied
//!                         -> Charging -> Admitted
//!                                     -> ChargeFailed
//! ```
//!
//! - Invalid input (zero units, overflowing or zero price, malformed
//!   requester) fails before any ledger I/O.
//! - A failed balance read is `MeteringUnavailable`, never a denial.
//! - Balance and charge are two separate ledger calls. Two concurrent
//!   requests may both pass the balance check; the ledger's own settlement
//!   rejects the one it cannot fund, which surfaces as `ChargeFailed`.
//! - A charge whose outcome is unknown is never admitted.

pub mod config;
pub mod meter;
pub mod outcome;

pub use config::{MeterConfig, MeterSettings, RetryConfig};
pub use meter::{price_request, ComputeMeter};
pub use outcome::Authorization;

pub use computegate_types::{ComputeUnits, GateError, GateResult, Identity, TokenAmount};
