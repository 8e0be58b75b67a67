//! LOTUS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the LOTUS import tools.
//!
//! # Overview
//!
//! - **Error Handling**: [`LotusError`] and its [`ErrorKind`] classification
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: natural keys, surrogate ids, remote ids and the imported entities
//!
//! # Example
//!
//! ```no_run
//! use lotus_common::{ErrorKind, LotusError, Result};
//!
//! fn check(title: Option<&str>) -> Result<()> {
//!     title
//!         .map(|_| ())
//!         .ok_or_else(|| LotusError::validation("10.1/a", "missing title"))
//! }
//!
//! assert_eq!(check(None).unwrap_err().kind(), ErrorKind::Validation);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Classify, ErrorKind, LotusError, Result};
