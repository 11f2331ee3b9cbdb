use std::sync::Arc;

use modulith_di::{
    Application, Arguments, Constructible, DependencyInfo, DynError, ModuleBuilder, ModuleRef,
    Provider, Token, REQUEST,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct LoggerService;
impl LoggerService {
    fn log(&self, message: &str) {
        tracing::info!("{message}");
    }
}
impl Constructible for LoggerService {
    fn construct(_: Arguments) -> Result<Self, DynError> {
        Ok(LoggerService)
    }
}

#[derive(Debug)]
struct IncomingRequest {
    id: String,
}

/// Request scoped through its dependency on the current request
struct UserService {
    logger: Arc<LoggerService>,
    request: Arc<IncomingRequest>,
}
impl Constructible for UserService {
    fn parameters() -> Vec<DependencyInfo> {
        vec![
            DependencyInfo::of::<LoggerService>(),
            DependencyInfo::token(REQUEST.clone()),
        ]
    }

    fn construct(mut args: Arguments) -> Result<Self, DynError> {
        Ok(UserService {
            logger: args.next()?,
            request: args.next()?,
        })
    }
}

struct UserController {
    users: Arc<UserService>,
    greeting: Arc<String>,
}
impl UserController {
    fn handle(&self) -> String {
        self.users
            .logger
            .log(&format!("Handling request {}", self.users.request.id));
        format!("{} user {}", self.greeting, self.users.request.id)
    }
}
impl Constructible for UserController {
    fn parameters() -> Vec<DependencyInfo> {
        vec![
            DependencyInfo::of::<UserService>(),
            DependencyInfo::token("GREETING"),
        ]
    }

    fn construct(mut args: Arguments) -> Result<Self, DynError> {
        Ok(UserController {
            users: args.next()?,
            greeting: args.next()?,
        })
    }
}

fn modules() -> ModuleRef {
    let logger = ModuleBuilder::new("Logger")
        .provider(Provider::class::<LoggerService>())
        .export(Token::of::<LoggerService>())
        .build();
    ModuleBuilder::new("User")
        .import(&logger)
        .provider(Provider::class::<UserService>())
        .provider(Provider::value("GREETING", String::from("Hello")))
        .controller::<UserController>()
        .build()
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let user = modules();
    let app = Application::builder(&user).build().await?;
    tracing::debug!("{:?}", app.container());

    for id in ["a", "b"] {
        let request = app.create_request_context();
        request.register_request(IncomingRequest { id: id.into() })?;
        let controller = request.resolve::<UserController>(&user).await?;
        println!("{}", controller.handle());
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(error) = futures::executor::block_on(run()) {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}
