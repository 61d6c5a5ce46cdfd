//! Common test utilities and fixtures.

pub mod contract;

#[allow(unused_imports)]
pub use contract::*;
