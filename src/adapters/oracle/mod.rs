//! Generation oracle adapters.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiOracle;
pub use scripted::{clean_verification, ScriptedOracle};
