//! Core types for Arbor

mod attribute;
mod operation;
mod scope;
mod validation;

pub use attribute::*;
pub use operation::*;
pub use scope::*;
pub use validation::*;
