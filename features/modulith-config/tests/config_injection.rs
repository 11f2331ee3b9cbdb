use modulith_config::{
    config::{Config, ConfigModule},
    provider::ConfigProvider,
};
use modulith_di::{
    Application, Arguments, Constructible, DependencyInfo, DynError, InitError, ModuleBuilder,
    Provider,
};

struct ServerConfig {
    host: String,
    port: u16,
}

struct FeatureFlags {
    beta: bool,
}

struct Server {
    config: Config<ServerConfig>,
    flags: Option<Config<FeatureFlags>>,
}
impl Server {
    fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}
impl Constructible for Server {
    fn parameters() -> Vec<DependencyInfo> {
        vec![
            Config::<ServerConfig>::dependency(),
            Config::<FeatureFlags>::dependency().optional(),
        ]
    }

    fn construct(mut args: Arguments) -> Result<Self, DynError> {
        Ok(Server {
            config: Config::from_arguments(&mut args)?,
            flags: Config::maybe_from_arguments(&mut args)?,
        })
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "localhost".into(),
        port: 8080,
    }
}

#[tokio::test]
async fn configs_are_injected_into_constructors() {
    let mut provider = ConfigProvider::new();
    provider
        .add_config(server_config())
        .unwrap()
        .add_config(FeatureFlags { beta: true })
        .unwrap();
    let config = ConfigModule::for_root(provider);
    let app_module = ModuleBuilder::new("App")
        .provider(Provider::class::<Server>())
        .build();

    let app = Application::builder(&app_module)
        .add_module(&config)
        .build()
        .await
        .unwrap();

    let server = app.get::<Server>().await.unwrap();
    assert_eq!(server.address(), "localhost:8080");
    assert!(server.flags.as_ref().is_some_and(|flags| flags.beta));
}

#[tokio::test]
async fn optional_configs_may_be_missing() {
    let mut provider = ConfigProvider::new();
    provider
        .maybe_add_config(Some(server_config()))
        .unwrap()
        .maybe_add_config::<FeatureFlags>(None)
        .unwrap();
    let config = ConfigModule::for_root(provider);
    let app_module = ModuleBuilder::new("App")
        .import(&config)
        .provider(Provider::class::<Server>())
        .build();

    let app = Application::builder(&app_module).build().await.unwrap();

    let server = app.get::<Server>().await.unwrap();
    assert!(server.flags.is_none());
}

#[tokio::test]
async fn required_configs_must_be_registered() {
    let config = ConfigModule::for_root(ConfigProvider::new());
    let app_module = ModuleBuilder::new("App")
        .import(&config)
        .provider(Provider::class::<Server>())
        .build();

    let error = Application::builder(&app_module).build().await.unwrap_err();
    assert!(matches!(error, InitError::DependencyGraph(_)));
}
