//! Moniker grammar: parsing, canonical serialization and version semantics.

pub mod parser;
pub mod types;
pub mod version;

pub use parser::{is_valid_namespace, is_valid_segment, parse_moniker};
pub use types::{Moniker, MONIKER_SCHEME};
pub use version::{parse_yyyymmdd, Frequency, LookbackUnit, VersionType};
