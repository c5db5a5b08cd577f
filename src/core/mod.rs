// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout bagstream.
//!
//! - [`BagError`] - Error taxonomy for open, chunk loading and iteration
//! - [`Time`] - ROS `{sec, nsec}` timestamp
//! - [`BagConfig`] - Reader configuration

pub mod config;
pub mod error;
pub mod time;

pub use config::BagConfig;
pub use error::{BagError, BoxError, Result};
pub use time::Time;
