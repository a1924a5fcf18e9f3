//! Document source adapters.

pub mod filesystem;

pub use filesystem::FsDocumentSource;
