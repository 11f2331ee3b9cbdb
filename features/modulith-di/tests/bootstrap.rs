use std::{sync::LazyLock, time::Duration};

use modulith_di::{
    dependency_graph::DependencyGraphError, Application, Arguments, Constructible, Container,
    ContextId, DependencyInfo, DynError, InitError, InjectError, Instance, ModuleBuilder,
    ModuleGraphError, ModuleRef, Provider, Token,
};

static ORDERS: LazyLock<ModuleRef> = LazyLock::new(|| {
    ModuleBuilder::new("Orders")
        .import_forward(|| BILLING.clone())
        .build()
});
static BILLING: LazyLock<ModuleRef> =
    LazyLock::new(|| ModuleBuilder::new("Billing").import(&ORDERS).build());

#[tokio::test]
async fn import_cycles_fail_the_bootstrap() {
    let error = Application::builder(&ORDERS).build().await.unwrap_err();

    let InitError::ModuleGraph(ModuleGraphError::CircularImport { chain }) = &error else {
        panic!("expected an import cycle, got {error}");
    };
    assert_eq!(*chain, ["Orders", "Billing", "Orders"]);
}

#[tokio::test]
async fn missing_providers_fail_the_bootstrap() {
    let module = ModuleBuilder::new("App")
        .provider(
            Provider::factory("report", |_| async { Ok::<_, DynError>(()) }).inject(["database"]),
        )
        .build();

    let error = Application::builder(&module).build().await.unwrap_err();
    let InitError::DependencyGraph(errors) = &error else {
        panic!("expected dependency graph errors, got {error}");
    };
    assert!(matches!(
        &errors.errors[..],
        [DependencyGraphError::MissingDependency { dependency, .. }] if *dependency == Token::from("database")
    ));
}

struct Left;
struct Right;
impl Constructible for Left {
    fn parameters() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Right>()]
    }

    fn construct(_: Arguments) -> Result<Self, DynError> {
        Ok(Left)
    }
}
impl Constructible for Right {
    fn parameters() -> Vec<DependencyInfo> {
        vec![DependencyInfo::of::<Left>()]
    }

    fn construct(_: Arguments) -> Result<Self, DynError> {
        Ok(Right)
    }
}

#[tokio::test]
async fn provider_cycles_fail_the_bootstrap() {
    let module = ModuleBuilder::new("App")
        .provider(Provider::class::<Left>())
        .provider(Provider::class::<Right>())
        .build();

    let error = Application::builder(&module).build().await.unwrap_err();
    let InitError::DependencyGraph(errors) = &error else {
        panic!("expected dependency graph errors, got {error}");
    };
    assert!(errors
        .errors
        .iter()
        .any(|error| matches!(error, DependencyGraphError::CircularDependency { .. })));
}

#[tokio::test]
async fn duplicate_tokens_fail_the_bootstrap() {
    let module = ModuleBuilder::new("App")
        .provider(Provider::value("x", 1_u8))
        .provider(Provider::value("x", 2_u8))
        .build();

    let error = Application::builder(&module).build().await.unwrap_err();
    assert!(matches!(
        error,
        InitError::ModuleGraph(ModuleGraphError::DuplicateProvider { .. })
    ));
}

#[tokio::test]
async fn failing_singletons_abort_the_bootstrap() {
    let module = ModuleBuilder::new("App")
        .provider(Provider::factory("broken", |_| async {
            Err::<u8, DynError>("cannot connect".into())
        }))
        .build();

    let error = Application::builder(&module).build().await.unwrap_err();
    assert!(matches!(
        error,
        InitError::Inject(InjectError::ConstructionFailed { ref token, .. }) if *token == Token::from("broken")
    ));
}

#[tokio::test]
async fn slow_singletons_time_out() {
    let module = ModuleBuilder::new("App")
        .provider(Provider::factory("stuck", |_| {
            futures::future::pending::<Result<u8, DynError>>()
        }))
        .build();

    let error = Application::builder(&module)
        .build_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(error, InitError::Timeout));
}

#[tokio::test]
async fn extra_root_modules_are_registered() {
    let entry = ModuleBuilder::new("App").build();
    let extra = ModuleBuilder::new("Extra")
        .provider(Provider::value("extra", 3_u8))
        .build();

    let app = Application::builder(&entry)
        .add_module(&extra)
        .build()
        .await
        .unwrap();

    assert!(app.container().module(extra.id()).is_some());
    let value = app.get_token(&Token::from("extra")).await.unwrap();
    assert_eq!(*value.downcast::<u8>().unwrap(), 3);
}

#[test]
fn request_registration_before_scan_is_rejected() {
    let container = Container::new();

    let error = container
        .register_request_provider(Instance::new("GET /"), ContextId::next())
        .unwrap_err();
    assert!(matches!(error, InjectError::AmbientModuleMissing));
}

#[test]
fn scan_binds_the_core_module_everywhere() {
    let leaf = ModuleBuilder::new("Leaf").build();
    let entry = ModuleBuilder::new("App").import(&leaf).build();
    let mut container = Container::new();
    container.scan(&entry).unwrap();

    let core = container.core_module().unwrap();
    assert!(core.is_global());
    for module in [entry.id(), leaf.id()] {
        assert!(container.module(module).unwrap().imports().contains(&core.id()));
    }
    assert!(container.is_linked());
}
