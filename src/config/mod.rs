//! Configuration system
//!
//! Schemas are declared with `config_struct!` (defaults embedded), loaded from
//! TOML, and passed to components at construction.

#[macro_use]
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::*;
pub use utils::{load_config_from_path, load_config_protected, parse_config, CONFIG_FILE_PATH};
