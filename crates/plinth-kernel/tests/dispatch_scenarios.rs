//! Integration tests: end-to-end dispatch over both channels.

use plinth_kernel::{
    Api, Constraint, DispatchError, Dispatcher, InterceptorChain, ParamKind, ParamSpec,
    RegistryTree, SharedRegistry, TracingInterceptor, ValidationInterceptor,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Calc {
    calls: AtomicUsize,
}

#[derive(Default)]
struct Shop {
    inserted: AtomicUsize,
}

fn calc_api(chain: InterceptorChain) -> Api<Calc> {
    let mut api = Api::new("calc").with_chain(chain);
    api.method("add")
        .param(ParamSpec::new("a", ParamKind::Int))
        .param(ParamSpec::new("b", ParamKind::Int))
        .returns(ParamKind::Int)
        .blocking(|calc: &Calc, args| {
            calc.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(args.int("a")? + args.int("b")?))
        })
        .expect("add should declare");
    api.method("square")
        .param(ParamSpec::new("n", ParamKind::Int))
        .suspending(|calc: Arc<Calc>, args| async move {
            calc.calls.fetch_add(1, Ordering::SeqCst);
            let n = args.int("n")?;
            tokio::task::yield_now().await;
            Ok(json!(n * n))
        })
        .expect("square should declare");
    api
}

fn shop_api() -> Api<Shop> {
    let mut api = Api::new("shop");
    api.method("add")
        .param(ParamSpec::new("name", ParamKind::Str))
        .param(ParamSpec::new("price", ParamKind::Float).constrain(Constraint::Gt(0.0)))
        .param(
            ParamSpec::new("category", ParamKind::choice(["food", "tools"])).with_default("food"),
        )
        .blocking(|shop: &Shop, args| {
            shop.inserted.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"name": args.str("name")?, "price": args.float("price")?}))
        })
        .expect("shop add should declare");
    api
}

fn setup() -> (Dispatcher, Arc<Calc>, Arc<Shop>) {
    let calc = Arc::new(Calc::default());
    let shop = Arc::new(Shop::default());
    let tree: SharedRegistry = RegistryTree::shared();
    {
        let mut guard = tree.write();
        let root = guard.root();
        guard
            .mount(root, &calc_api(InterceptorChain::standard()).bind(Arc::clone(&calc)))
            .expect("calc should mount");
        guard.mount(root, &shop_api().bind(Arc::clone(&shop))).expect("shop should mount");
    }
    (Dispatcher::new(tree), calc, shop)
}

#[test]
fn cli_tokens_add_ten_and_twenty() {
    let (dispatcher, _, _) = setup();
    let result = dispatcher.call_cli(&["calc", "add", "10", "20"]).expect("add should succeed");
    assert_eq!(result, json!(30));
}

#[test]
fn cli_named_flags_bind_by_name() {
    let (dispatcher, _, _) = setup();
    let result = dispatcher
        .call_cli(&["calc", "add", "--b=20", "--a", "10"])
        .expect("add should succeed");
    assert_eq!(result, json!(30));
}

#[test]
fn cli_unknown_method_is_not_found() {
    let (dispatcher, _, _) = setup();
    let err = dispatcher.call_cli(&["calc", "mul", "2", "3"]).expect_err("mul does not exist");
    assert_eq!(err, DispatchError::NotFound("calc mul".to_string()));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn cli_option_without_value_never_reaches_the_method() {
    let (dispatcher, _, shop) = setup();
    let err = dispatcher
        .call_cli(&["shop", "add", "--price", "3", "--name"])
        .expect_err("--name has no value");
    match &err {
        DispatchError::Validation(validation) => assert!(validation.mentions("name")),
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
    assert_eq!(shop.inserted.load(Ordering::SeqCst), 0);

    dispatcher
        .call_cli(&["shop", "add", "--name", "--price", "3"])
        .expect_err("--name is followed by another option");
    assert_eq!(shop.inserted.load(Ordering::SeqCst), 0);
}

#[test]
fn cli_drives_suspending_methods_to_completion() {
    let (dispatcher, _, _) = setup();
    let result = dispatcher.call_cli(&["calc", "square", "7"]).expect("square should succeed");
    assert_eq!(result, json!(49));
}

#[test]
fn suspending_method_without_bridge_fails_in_blocking_context() {
    let chain = InterceptorChain::new().with(TracingInterceptor).with(ValidationInterceptor);
    let tree = RegistryTree::shared();
    {
        let mut guard = tree.write();
        let root = guard.root();
        guard
            .mount(root, &calc_api(chain).bind(Arc::new(Calc::default())))
            .expect("calc should mount");
    }
    let err = Dispatcher::new(tree)
        .call_cli(&["calc", "square", "3"])
        .expect_err("no bridge available");
    assert_eq!(err.kind(), "bridge");
}

#[tokio::test]
async fn network_body_with_string_numbers_is_coerced() {
    let (dispatcher, _, _) = setup();
    let handle = tokio::runtime::Handle::current();
    let result = dispatcher
        .call_network("calc/add", json!({"a": "10", "b": "20"}), handle)
        .resolve()
        .await
        .expect("add should succeed");
    assert_eq!(result, json!(30));
}

#[tokio::test]
async fn network_validation_names_the_field_and_skips_the_call() {
    let (dispatcher, calc, _) = setup();
    let handle = tokio::runtime::Handle::current();
    let err = dispatcher
        .call_network("calc/add", json!({"a": "ten", "b": "20"}), handle)
        .resolve()
        .await
        .expect_err("a is not an int");
    let validation = err.as_validation().expect("should be a validation error");
    assert_eq!(validation.fields(), vec!["a"]);
    assert_eq!(calc.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn negative_price_is_rejected_before_side_effects() {
    let (dispatcher, _, shop) = setup();
    let handle = tokio::runtime::Handle::current();
    let err = dispatcher
        .call_network("shop/add", json!({"name": "hammer", "price": -5}), handle.clone())
        .resolve()
        .await
        .expect_err("price must be positive");
    assert!(err.as_validation().is_some_and(|v| v.mentions("price")));
    assert_eq!(shop.inserted.load(Ordering::SeqCst), 0);

    let err = dispatcher
        .call_network("shop/add", json!({"name": "saw", "price": 3, "category": "cars"}), handle)
        .resolve()
        .await
        .expect_err("cars is not a category");
    assert!(err.as_validation().is_some_and(|v| v.mentions("category")));
    assert_eq!(shop.inserted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn network_awaits_suspending_and_offloads_blocking() {
    let (dispatcher, _, _) = setup();
    let handle = tokio::runtime::Handle::current();
    let square = dispatcher.call_network("calc/square", json!({"n": 4}), handle.clone());
    assert!(square.is_pending());
    assert_eq!(square.resolve().await.expect("square should succeed"), json!(16));

    let add = dispatcher.call_network("calc.add", json!({"a": 1, "b": 2}), handle);
    assert!(add.is_pending());
    assert_eq!(add.resolve().await.expect("add should succeed"), json!(3));
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let (dispatcher, _, _) = setup();
    let handle = tokio::runtime::Handle::current();
    let err = dispatcher
        .call_network("calc/add", json!([10, 20]), handle)
        .resolve()
        .await
        .expect_err("arrays are not bodies");
    assert!(err.as_validation().is_some_and(|v| v.mentions("body")));
}
