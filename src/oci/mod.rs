//! Container registry support
//!
//! Container images do not carry a registry-side pointer to their source code.
//! Images built with provenance metadata carry it as the
//! `org.opencontainers.image.source` label in their config blob, which is what
//! [`detector::ImageSourceDetector`] reads.
//!
//! # Modules
//!
//! - [`reference`]: Image reference parsing (`registry/repository:tag`)
//! - [`client`]: Registry client trait and HTTP implementation
//! - [`detector`]: Source detection from image labels

pub mod client;
pub mod detector;
pub mod reference;

pub use client::{HttpRegistryClient, ImageConfig, RegistryClient, RegistryError};
pub use detector::{DetectError, IMAGE_SOURCE_LABEL, ImageSourceDetector, SourceDetector};
pub use reference::{ImageReference, ReferenceError};
