use std::sync::Arc;

use modulith_di::{
    Application, Container, InjectError, Injector, ModuleBuilder, ModuleRef, Provider,
    RequireError, Token,
};

fn injector(entry: &ModuleRef) -> Injector {
    let mut container = Container::new();
    container.scan(entry).unwrap();
    Injector::new(Arc::new(container))
}

#[test]
fn exported_tokens_resolve_to_the_declaring_wrapper() {
    let logger = ModuleBuilder::new("Logger")
        .provider(Provider::value("LoggerService", String::from("logger")))
        .export("LoggerService")
        .build();
    let user = ModuleBuilder::new("User").import(&logger).build();
    let injector = injector(&user);

    let (from_user, owner) = injector
        .resolve(&Token::from("LoggerService"), user.id())
        .unwrap();
    let (from_logger, _) = injector
        .resolve(&Token::from("LoggerService"), logger.id())
        .unwrap();

    assert_eq!(from_user.id(), from_logger.id());
    assert_eq!(owner, logger.id());
}

#[test]
fn unexported_tokens_stay_private() {
    let logger = ModuleBuilder::new("Logger")
        .provider(Provider::value("internal", 1_u8))
        .build();
    let user = ModuleBuilder::new("User").import(&logger).build();
    let injector = injector(&user);

    let error = injector
        .resolve(&Token::from("internal"), user.id())
        .unwrap_err();
    assert!(matches!(
        error,
        InjectError::Require(RequireError::ProviderNotFound { ref module, .. }) if module == "User"
    ));
    // The declaring module still sees it
    assert!(injector
        .resolve(&Token::from("internal"), logger.id())
        .is_ok());
}

#[test]
fn exports_are_not_transitive_without_re_export() {
    let inner = ModuleBuilder::new("Inner")
        .provider(Provider::value("deep", 1_u8))
        .export("deep")
        .build();
    let middle = ModuleBuilder::new("Middle").import(&inner).build();
    let re_exporting = ModuleBuilder::new("ReExporting")
        .import(&inner)
        .export_module(&inner)
        .build();
    let plain = ModuleBuilder::new("Plain").import(&middle).build();
    let facade = ModuleBuilder::new("Facade").import(&re_exporting).build();
    let root = ModuleBuilder::new("Root")
        .import(&plain)
        .import(&facade)
        .build();
    let injector = injector(&root);

    assert!(injector.resolve(&Token::from("deep"), plain.id()).is_err());
    let (wrapper, owner) = injector.resolve(&Token::from("deep"), facade.id()).unwrap();
    assert_eq!(owner, inner.id());
    assert_eq!(wrapper.host(), inner.id());
}

#[test]
fn global_exports_are_visible_everywhere() {
    let global = ModuleBuilder::new("Shared")
        .provider(Provider::value("g", 7_u8))
        .export("g")
        .global()
        .build();
    let leaf = ModuleBuilder::new("Leaf").build();
    let root = ModuleBuilder::new("Root")
        .import(&leaf)
        .import(&global)
        .build();
    let injector = injector(&root);

    assert!(injector.resolve(&Token::from("g"), leaf.id()).is_ok());
    assert!(injector.resolve(&Token::from("g"), root.id()).is_ok());
}

#[test]
fn first_import_in_declaration_order_wins() {
    let first = ModuleBuilder::new("First")
        .provider(Provider::value("shared", 1_u8))
        .export("shared")
        .build();
    let second = ModuleBuilder::new("Second")
        .provider(Provider::value("shared", 2_u8))
        .export("shared")
        .build();
    let root = ModuleBuilder::new("Root")
        .import(&first)
        .import(&second)
        .build();
    let injector = injector(&root);

    let (_, owner) = injector.resolve(&Token::from("shared"), root.id()).unwrap();
    assert_eq!(owner, first.id());
}

#[test]
fn re_exports_of_an_earlier_import_beat_later_imports() {
    let deep = ModuleBuilder::new("Deep")
        .provider(Provider::value("t", 1_u8))
        .export("t")
        .build();
    let facade = ModuleBuilder::new("Facade")
        .import(&deep)
        .export_module(&deep)
        .build();
    let direct = ModuleBuilder::new("Direct")
        .provider(Provider::value("t", 2_u8))
        .export("t")
        .build();
    let root = ModuleBuilder::new("Root")
        .import(&facade)
        .import(&direct)
        .build();
    let injector = injector(&root);

    let (_, owner) = injector.resolve(&Token::from("t"), root.id()).unwrap();
    assert_eq!(owner, deep.id());
}

#[test]
fn local_providers_shadow_imports() {
    let other = ModuleBuilder::new("Other")
        .provider(Provider::value("name", "imported"))
        .export("name")
        .build();
    let root = ModuleBuilder::new("Root")
        .import(&other)
        .provider(Provider::value("name", "local"))
        .build();
    let injector = injector(&root);

    let (_, owner) = injector.resolve(&Token::from("name"), root.id()).unwrap();
    assert_eq!(owner, root.id());
}

#[tokio::test]
async fn request_token_is_visible_from_every_module() {
    let leaf = ModuleBuilder::new("Leaf").build();
    let root = ModuleBuilder::new("Root").import(&leaf).build();
    let app = Application::builder(&root).build().await.unwrap();

    let core = app.container().core_module().unwrap();
    for module in [leaf.id(), root.id()] {
        let (wrapper, owner) = app
            .injector()
            .resolve(&modulith_di::REQUEST, module)
            .unwrap();
        assert_eq!(owner, core.id());
        assert!(!wrapper.is_dependency_tree_static());
    }
}
