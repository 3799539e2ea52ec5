//! Versioned, typed bundle layer: the system's lingua franca (spec §4.2).
//!
//! Every stage reads and writes these types; nothing downstream of ingest
//! touches a raw `serde_json::Value`.

pub mod analysis;
pub mod common;
pub mod correlation;
pub mod evidence;

pub use analysis::*;
pub use common::{round4, Validate, CURRENT_SCHEMA_VERSION, KNOWN_SCHEMA_VERSIONS};
pub use correlation::*;
pub use evidence::*;
