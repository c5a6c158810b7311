//! Requity attribution & payout engine.
//!
//! Attributes e-commerce conversions to the referring website, proves the
//! website's ownership of its domain, and settles a fixed reward to the
//! verified owner's wallet. Earnings for unverified websites are escrowed
//! and drained once ownership is proven.

pub mod engine;
pub mod ledger;
pub mod verifier;

pub use engine::{AttributionEngine, DrainOutcome, EngineError, EngineSettings, OrderInfo, RegistrationOutcome};
pub use ledger::{LedgerClient, LedgerError, PaymentsApiClient, validate_address};
pub use verifier::{HttpDomainVerifier, OwnershipCheck, VerifyError};
