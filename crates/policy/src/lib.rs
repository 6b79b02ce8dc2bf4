//! Risk tiers, expiring session trust and the approval decision function.
//!
//! Everything in this crate is synchronous and free of I/O so the decision
//! can be evaluated on every tool call without suspending.

pub mod approval;
pub mod clock;
pub mod config;
pub mod error;
pub mod risk;
pub mod trust;

pub use approval::{ApprovalPolicy, AutoAllowBasis, PolicyDecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PolicyConfig;
pub use error::PolicyError;
pub use risk::{RiskClassifier, RiskTier};
pub use trust::{SessionTrustRecord, SessionTrustStore};
