pub mod config;
pub mod error;
pub mod types;
pub mod validation;

pub use config::InookeyConfig;
pub use error::{InookeyError, Result};
pub use types::*;
pub use validation::ValidationError;
