//! Row structs for the document service tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row and
//! a `TryFrom` conversion into the core entity. Enum columns are stored as
//! text and parsed with the core `from_str` helpers.

pub mod system_injectable;
pub mod template_version;
