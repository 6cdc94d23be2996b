//! Logging bootstrap shared by the fleet binaries.
mod logger;
pub use logger::*;
