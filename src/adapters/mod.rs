//! Adapters implementing the domain ports.

pub mod documents;
pub mod oracle;
