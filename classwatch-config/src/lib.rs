//! Shared configuration library for Classwatch.
//!
//! Configuration is layered: a TOML file (explicit path, `CLASSWATCH_CONFIG`,
//! or a default location), an optional `.env` file, then process environment
//! variables, which win over everything else. Loaded values pass through
//! [`validation::apply_guard_rails`] before they are handed out.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use models::{
    AuthConfig, Config, ConfigMetadata, ServerConfig, TrackingConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
