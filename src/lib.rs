//! Resolves packages to their source repositories and mirrors the VEX
//! documents published there.
//!
//! # Modules
//!
//! - [`purl`]: Package URL parsing
//! - [`hub`]: Hub configuration (mirror root and package list)
//! - [`source`]: Source URL normalization and registry locators
//! - [`oci`]: Container image references, registry client and source detection
//! - [`crawl`]: Router, crawlers, orchestrator and failure policy
//! - [`mirror`]: Git checkouts and the on-disk VEX mirror
//! - [`events`]: Structured event sink
//! - [`config`]: Collector configuration and data directories
//! - [`logging`]: Tracing subscriber initialization

pub mod config;
pub mod crawl;
pub mod events;
pub mod hub;
pub mod logging;
pub mod mirror;
pub mod oci;
pub mod purl;
pub mod source;
