//! HTTP request handlers.

pub mod discovery;
pub mod modules;

pub use discovery::*;
pub use modules::*;
