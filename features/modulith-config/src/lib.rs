//! Modulith Config provides a global registry of configs that can be injected in the rest of the
//! modules.
//!
//! Modulith Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs
//! 2. Config<T>: A wrapper type to be able to resolve and retrieve configs
//!
//! # Examples
//!
//! ```rust
//! use modulith_config::{config::ConfigModule, provider::ConfigProvider};
//!
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let mut config_provider = ConfigProvider::new();
//! config_provider
//!     .add_config(AppConfig {
//!         host: "localhost".to_string(),
//!         port: 8080_u16,
//!     })
//!     .unwrap();
//!
//! let retrieved_config = config_provider.get_config::<AppConfig>().unwrap().unwrap();
//! assert_eq!(retrieved_config.host, "localhost");
//! assert_eq!(retrieved_config.port, 8080);
//!
//! // A global module exposing the config to every other module
//! let config_module = ConfigModule::for_root(config_provider);
//! assert!(config_module.is_global());
//! ```
//!
//! Modulith Config consists of the following components:
//!
//! 1. Config - for injecting a config and exposing the registry as a module
//! 2. Provider - for creating a registry of configs, adding and retrieving configs
//! 3. Errors - for config errors

pub mod config;
pub mod errors;
pub mod provider;
