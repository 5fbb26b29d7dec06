//! Domain Layer
//!
//! Entities, value objects, ports and pure services of the control plane.
//! Depends on nothing outside this module except serialization and frame parsing.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
