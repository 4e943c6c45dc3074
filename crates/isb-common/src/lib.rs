//! iSamples Common Library
//!
//! Shared utilities for the iSamples harvesting workspace.
//!
//! - **Error Handling**: the shared [`IsbError`] type and [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Time**: lenient timestamp parsing and the fixed storage format
//!
//! # Example
//!
//! ```no_run
//! use isb_common::time::parse_timestamp;
//!
//! fn watermark() -> isb_common::Result<()> {
//!     let ts = parse_timestamp("2018-01-01")?;
//!     tracing::info!(watermark = %ts, "Using watermark");
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod time;

pub use error::{IsbError, Result};
