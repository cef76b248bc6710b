#![cfg_attr(docsrs, feature(doc_cfg))]
//! # bmubench_lib
//!
//! This crate provides a library for testing battery packs through their
//! battery management unit (BMU). It covers the serial polling protocol,
//! sample decoding, pass/fail classification and the session defect registry
//! used by the `bmubench` diagnostic station.
//!
//! ## Features
//!
//! This crate uses a feature-based system to keep dependencies minimal.
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `bmubench` command-line tool.
//! - `serialport`: Enables the blocking serial transport using the `serialport` crate.
//! - `bin-dependencies`: Enables all features required by the `bmubench` binary executable (currently `serialport` plus the CLI stack).
//!
//! The protocol, telemetry, classification and registry modules work without
//! any feature, which allows testing them against a scripted transport.

/// Pass/fail rules and limits for a telemetry sample.
pub mod classify;
/// Contains error types for the library.
mod error;
/// Defines the BMU polling protocol.
pub mod protocol;
/// Session bookkeeping of tested and defective packs.
pub mod registry;
/// Sample assembly over an abstract transport.
pub mod telemetry;

pub use error::Error;

/// Blocking serial transport for BMU communication.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
