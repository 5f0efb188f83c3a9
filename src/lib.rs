pub mod error;
pub mod context;
pub mod template;
pub mod layout;
pub mod campaign;
pub mod generator;

pub use campaign::{Artifact, Campaign};
pub use error::{Error, Result};
pub use generator::{generate, run, FailurePolicy, GenerateOptions, GenerationReport};
