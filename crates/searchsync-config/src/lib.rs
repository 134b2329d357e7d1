//! # searchsync-config
//!
//! Resolves which indexes a record type or document belongs to, which fields
//! are projected into each index, and which batch size applies.
//!
//! Field declarations are validated and flattened per type when an
//! [`IndexConfiguration`] is built, so lookups at indexing time never walk
//! the type hierarchy.

pub mod configuration;
pub mod filter;
pub mod projection;

pub use configuration::IndexConfiguration;
pub use filter::{FnFilter, IndexMembershipFilter};
pub use projection::{parse_field, FieldDeclaration, FieldTable};
