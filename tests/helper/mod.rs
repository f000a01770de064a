//! Shared test utilities

mod mirror;
mod registry;

#[allow(unused_imports)]
pub use mirror::*;
#[allow(unused_imports)]
pub use registry::*;
