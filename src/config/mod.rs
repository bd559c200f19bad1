//! Configuration parsing and types.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{find_config_file, load_and_validate, load_config};
pub use types::*;
