//! Core types shared by the certificate registry crates.
//!
//! Organizations and certificates are plain serde records. The operations
//! that mutate them are described by [`Action`], which also carries the
//! authorization policy each operation requires.

pub mod account;
pub mod action;
pub mod certificate;
pub mod organization;

pub use account::*;
pub use action::*;
pub use certificate::*;
pub use organization::*;
