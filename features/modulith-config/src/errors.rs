use modulith_di::TypeInfo;

/// Errors when registering or retrieving a config
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The config type was registered before
    #[error("The config type '{0}' is already registered")]
    ConfigAlreadyRegistered(TypeInfo),
    /// The stored config is not of the requested type
    #[error("The config stored for '{0}' could not be read as that type")]
    ConfigMissing(TypeInfo),
}
