//! Domain models for the clinic.
//!
//! Each entity has a record type (what is stored, including system-managed
//! fields) and a form type (what an operator may submit).

mod encounter;
mod exam;
mod insurance;
mod meta;
mod patient;
mod prescription;
mod staff;

pub use encounter::*;
pub use exam::*;
pub use insurance::*;
pub use meta::*;
pub use patient::*;
pub use prescription::*;
pub use staff::*;
