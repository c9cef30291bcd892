//! Store Errors
//!
//! The engine has exactly one failure mode a caller can observe: reading a
//! store with no provider mounted above the consumer. It is surfaced as an
//! explicit error value (plus a logged diagnostic at the call site) so
//! callers can detect the misuse deterministically instead of scraping logs.
//! Dependency-snapshot divergence is the normal signal path, not an error,
//! and is never surfaced.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// A consumer read a store with no provider ancestor (or before the
    /// provider published a first value). The read has no backing container,
    /// so there is no data to return.
    #[error("store accessed without a mounted provider above the consumer")]
    UninitializedAccess,
}
