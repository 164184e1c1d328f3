//! Key resolution
//!
//! [`template`] turns `{{placeholder}}` patterns into concrete key values,
//! [`unique`] derives the sentinel keys that reserve unique attribute values.

pub mod template;
pub mod unique;

pub use template::{index_keys, interpolate, placeholder_names, primary_key};
pub use unique::{DEFAULT_UNIQUE_PREFIX, build_unique_key};
