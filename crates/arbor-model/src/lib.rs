//! Arbor Model
//!
//! Maps directory entries to typed mappings: lookups, object class rules,
//! validation before writes, belongs-to associations and LDIF export.

pub mod association;
pub mod entry;
pub mod ldif;
pub mod mapping;
pub mod object_class;
pub mod validation;

#[cfg(test)]
mod testing;

pub use association::BelongsTo;
pub use entry::MappedEntry;
pub use mapping::Mapping;
pub use object_class::ClassValue;
