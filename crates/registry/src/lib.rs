//! Certificate registry core
//!
//! Issuing organizations are registered in a global table; each
//! organization's certificates live in their own storage scope. The
//! [`CertifyContract`] checks who authorized a call, runs exactly one
//! registry operation under a contract-wide lock and reports the effect.
//! Batches of actions commit together or not at all.

pub mod auth;
pub mod certificates;
pub mod contract;
pub mod errors;
pub mod organizations;

pub use auth::CallContext;
pub use certificates::CertificateRegistry;
pub use contract::{CertifyContract, Effect, Receipt};
pub use errors::*;
pub use organizations::OrganizationRegistry;
