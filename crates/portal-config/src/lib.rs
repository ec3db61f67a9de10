//! Configuration for the campus portal client.
//!
//! TOML files layered from the user config directory and the project
//! directory, merged section by section. See [`types`] for the schema.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, load_config, load_config_file,
    load_config_with_options, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
