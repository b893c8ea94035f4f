//! Arbor Schema
//!
//! RFC 4512 schema parsing and the per-session schema registry.

pub mod parser;
pub mod registry;
pub mod standard;

pub use parser::{AttributeTypeDef, ClassKind, Definition, ObjectClassDef, SyntaxDef};
pub use registry::{AttributeType, ObjectClass, RequiredAttribute, SchemaRegistry, Syntax};
