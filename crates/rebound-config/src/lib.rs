//! Configuration types for the rebound HTTP client.
//!
//! A `ClientConfig` can be built in code, loaded from a YAML file, or
//! adjusted through `REBOUND_*` environment variables. Every field has a
//! default, so partial documents merge over the built-in values.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
