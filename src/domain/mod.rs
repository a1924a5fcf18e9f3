//! Domain layer for reqforge
//!
//! Pure data types, invariants, and the port traits that the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    DeliveryError, DocumentError, DomainError, DomainResult, OracleCallError, OracleError,
    PipelineError,
};
