use std::{ops::Deref, sync::Arc};

use modulith_di::{
    Arguments, DependencyInfo, InjectError, Injectable, ModuleBuilder, ModuleRef, Provider, Token,
};

use crate::provider::ConfigProvider;

/// A wrapper type to allow for config injections
///
/// Configs are registered under their own type token, so declaring
/// [`Config::dependency`] in a constructor is enough to receive them.
///
/// # Example
/// ```rust
/// use modulith_config::{config::Config, provider::ConfigProvider};
/// use modulith_di::{Arguments, Constructible, DependencyInfo, DynError};
///
/// pub struct MyModuleConfig {
///     enabled: bool,
/// }
///
/// struct MyService {
///     config: Config<MyModuleConfig>,
/// }
/// impl Constructible for MyService {
///     fn parameters() -> Vec<DependencyInfo> {
///         vec![Config::<MyModuleConfig>::dependency()]
///     }
///
///     fn construct(mut args: Arguments) -> Result<Self, DynError> {
///         Ok(MyService {
///             config: Config::from_arguments(&mut args)?,
///         })
///     }
/// }
///
/// let mut config_provider = ConfigProvider::new();
/// config_provider.add_config(MyModuleConfig { enabled: true }).unwrap();
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Config<T> {
    /// Dependency slot to declare for this config
    pub fn dependency() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }

    /// Takes the next constructor argument as this config
    pub fn from_arguments(args: &mut Arguments) -> Result<Self, InjectError> {
        Ok(Config {
            inner: args.next::<T>()?,
        })
    }

    /// Like [`Config::from_arguments`] for a slot declared optional
    pub fn maybe_from_arguments(args: &mut Arguments) -> Result<Option<Self>, InjectError> {
        Ok(args.next_optional::<T>()?.map(|inner| Config { inner }))
    }
}

/// Global module exposing every registered config
pub struct ConfigModule;
impl ConfigModule {
    /// Each config becomes a value provider under its type token, and so does
    /// the [`ConfigProvider`] itself. The module is global, nothing needs to
    /// import it.
    pub fn for_root(provider: ConfigProvider) -> ModuleRef {
        let mut builder = ModuleBuilder::new("ConfigModule").global();
        for config in provider.configs() {
            let token = Token::Type(config.info);
            builder = builder
                .provider(Provider::instance(token.clone(), config.clone()))
                .export(token);
        }

        tracing::debug!("Exposing {} configs", provider.len());
        builder
            .provider(Provider::value(Token::of::<ConfigProvider>(), provider))
            .export(Token::of::<ConfigProvider>())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use modulith_di::{Application, ModuleBuilder};

    use super::*;

    struct Database {
        url: String,
    }

    #[tokio::test]
    async fn configs_are_visible_without_import() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(Database {
                url: "postgres://localhost".into(),
            })
            .unwrap();
        let config = ConfigModule::for_root(provider);
        let app_module = ModuleBuilder::new("App").build();

        let app = Application::builder(&app_module)
            .add_module(&config)
            .build()
            .await
            .unwrap();

        let database = app.resolve::<Database>(&app_module).await.unwrap();
        assert_eq!(database.url, "postgres://localhost");
        let registry = app.resolve::<ConfigProvider>(&app_module).await.unwrap();
        assert!(Arc::ptr_eq(
            &registry.get_config::<Database>().unwrap().unwrap(),
            &database
        ));
    }
}
