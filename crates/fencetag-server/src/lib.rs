//! # fencetag-server
//!
//! HTTP server library for fencetag.
//!
//! Provides the API handlers, state wiring and logging setup used by the
//! `fencetag-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
