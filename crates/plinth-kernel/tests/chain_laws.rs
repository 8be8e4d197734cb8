//! Integration tests: ordering and balance laws of the interceptor chain.

use parking_lot::Mutex;
use plinth_kernel::{
    Api, CallContext, Channel, CommitPolicy, DispatchError, HandlerError, Interceptor,
    InterceptorChain, Invocation, ParamKind, ParamSpec, RawArgs, RegistryTree, ResourceInterceptor,
    ResourceProvider, ValidationInterceptor,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    id: usize,
    log: Log,
    fail_before: bool,
}

impl Recorder {
    fn new(id: usize, log: &Log) -> Self {
        Self {
            id,
            log: Arc::clone(log),
            fail_before: false,
        }
    }

    fn failing(id: usize, log: &Log) -> Self {
        Self {
            fail_before: true,
            ..Self::new(id, log)
        }
    }
}

impl Interceptor for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn before(&self, _call: &mut Invocation) -> Result<(), DispatchError> {
        self.log.lock().push(format!("before:{}", self.id));
        if self.fail_before {
            return Err(DispatchError::Resource(format!("layer {} refused", self.id)));
        }
        Ok(())
    }

    fn after(&self, _call: &mut Invocation, result: Value) -> Result<Value, DispatchError> {
        self.log.lock().push(format!("after:{}", self.id));
        Ok(result)
    }

    fn on_error(
        &self,
        _call: &mut Invocation,
        error: DispatchError,
    ) -> Result<Value, DispatchError> {
        self.log.lock().push(format!("error:{}", self.id));
        Err(error)
    }
}

struct Traced {
    log: Log,
}

fn traced_api(chain: InterceptorChain) -> Api<Traced> {
    let mut api = Api::new("traced").with_chain(chain);
    api.method("echo")
        .param(ParamSpec::new("value", ParamKind::Json))
        .blocking(|traced: &Traced, args| {
            traced.log.lock().push("call".to_string());
            Ok(args.get("value").cloned().unwrap_or(Value::Null))
        })
        .expect("echo should declare");
    api.method("fail")
        .blocking(|traced: &Traced, _| {
            traced.log.lock().push("call".to_string());
            Err(HandlerError::new("domain failure"))
        })
        .expect("fail should declare");
    api
}

fn invoke(
    api: &Api<Traced>,
    log: &Log,
    method: &str,
    raw: RawArgs,
) -> Result<Value, DispatchError> {
    let mut tree = RegistryTree::new();
    let binding = api.bind(Arc::new(Traced { log: Arc::clone(log) }));
    tree.mount(tree.root(), &binding).expect("traced should mount");
    let resolved = tree.resolve(&format!("traced.{method}")).expect("method should resolve");
    resolved
        .entry
        .invoke(&resolved.path, raw, Channel::Cli, CallContext::Blocking)
        .into_ready()
}

fn three_layers(log: &Log) -> InterceptorChain {
    InterceptorChain::new()
        .with(Recorder::new(1, log))
        .with(Recorder::new(2, log))
        .with(Recorder::new(3, log))
}

#[test]
fn onion_order_on_success() {
    let log: Log = Arc::default();
    let api = traced_api(three_layers(&log));
    invoke(&api, &log, "echo", RawArgs::new().with("value", 1)).expect("echo should succeed");
    assert_eq!(
        *log.lock(),
        vec!["before:1", "before:2", "before:3", "call", "after:3", "after:2", "after:1"]
    );
}

#[test]
fn onion_order_on_error() {
    let log: Log = Arc::default();
    let api = traced_api(three_layers(&log));
    let err = invoke(&api, &log, "fail", RawArgs::new()).expect_err("fail should fail");
    assert_eq!(err.kind(), "runtime");
    assert_eq!(
        *log.lock(),
        vec!["before:1", "before:2", "before:3", "call", "error:3", "error:2", "error:1"]
    );
}

#[test]
fn failing_before_short_circuits_inner_layers() {
    let log: Log = Arc::default();
    let chain = InterceptorChain::new()
        .with(Recorder::new(1, &log))
        .with(Recorder::failing(2, &log))
        .with(Recorder::new(3, &log));
    let api = traced_api(chain);
    let err = invoke(&api, &log, "echo", RawArgs::new().with("value", 1))
        .expect_err("layer 2 refuses");
    assert!(matches!(err, DispatchError::Resource(_)));
    assert_eq!(*log.lock(), vec!["before:1", "before:2", "error:1"]);
}

#[test]
fn observing_layers_pass_results_through_unchanged() {
    let log: Log = Arc::default();
    let api = traced_api(InterceptorChain::standard().with(Recorder::new(1, &log)));
    let payload = json!({"nested": [1, 2, {"k": "v"}], "n": 1.5});
    let result = invoke(&api, &log, "echo", RawArgs::new().with("value", payload.clone()))
        .expect("echo should succeed");
    assert_eq!(result, payload);
}

#[test]
fn validation_failure_never_reaches_the_callable() {
    let log: Log = Arc::default();
    let chain = InterceptorChain::new()
        .with(Recorder::new(1, &log))
        .with(ValidationInterceptor)
        .with(Recorder::new(2, &log));
    let api = traced_api(chain);
    let err = invoke(&api, &log, "echo", RawArgs::new().with("other", 1))
        .expect_err("unexpected field");
    assert!(err.as_validation().is_some_and(|v| v.mentions("other")));
    assert_eq!(*log.lock(), vec!["before:1", "error:1"]);
}

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    released: AtomicUsize,
}

struct CountingProvider {
    counters: Arc<Counters>,
    fail_commit: bool,
}

struct Ticket(usize);

impl ResourceProvider for CountingProvider {
    type Handle = Ticket;

    fn acquire(&self, _call: &Invocation) -> Result<Ticket, String> {
        Ok(Ticket(self.counters.acquired.fetch_add(1, Ordering::SeqCst)))
    }

    fn commit(&self, _handle: &Ticket) -> Result<(), String> {
        if self.fail_commit {
            return Err("disk full".to_string());
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _handle: &Ticket) -> Result<(), String> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, _handle: &Ticket) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct Store;

fn store_api(counters: &Arc<Counters>, fail_commit: bool, policy: CommitPolicy) -> Api<Store> {
    let provider = Arc::new(CountingProvider {
        counters: Arc::clone(counters),
        fail_commit,
    });
    let chain = InterceptorChain::standard_with(
        ResourceInterceptor::new("ticket", provider).with_policy(policy),
    );
    let mut api = Api::new("store").with_chain(chain);
    api.method("ok")
        .param(ParamSpec::new("ticket", ParamKind::Json))
        .param(ParamSpec::new("n", ParamKind::Int).with_default(1))
        .blocking(|_: &Store, args| {
            let ticket = args.resource::<Ticket>("ticket")?;
            Ok(json!(ticket.0))
        })
        .expect("ok should declare");
    api.method("fails")
        .blocking(|_: &Store, _| Err(HandlerError::new("handled failure")))
        .expect("fails should declare");
    api.method("panics")
        .blocking(|_: &Store, _| -> plinth_kernel::HandlerResult { panic!("unhandled failure") })
        .expect("panics should declare");
    api.method("slow")
        .suspending(|_store: Arc<Store>, args| async move {
            let ticket = args.resource::<Ticket>("ticket")?;
            tokio::task::yield_now().await;
            Ok(json!(ticket.0))
        })
        .expect("slow should declare");
    api
}

fn call_store(api: &Api<Store>, method: &str, raw: RawArgs) -> Result<Value, DispatchError> {
    let mut tree = RegistryTree::new();
    tree.mount(tree.root(), &api.bind(Arc::new(Store))).expect("store should mount");
    let resolved = tree.resolve(&format!("store.{method}")).expect("method should resolve");
    resolved
        .entry
        .invoke(&resolved.path, raw, Channel::Cli, CallContext::Blocking)
        .into_ready()
}

fn balanced(counters: &Counters) -> (usize, usize) {
    (
        counters.acquired.load(Ordering::SeqCst),
        counters.released.load(Ordering::SeqCst),
    )
}

#[test]
fn injected_resource_is_hidden_from_schema() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, false, CommitPolicy::Auto);
    let spec = api.specs().next().expect("ok should be declared");
    assert_eq!(spec.schema.fields.len(), 1);
    assert_eq!(spec.schema.fields[0].name, "n");
}

#[test]
fn acquire_and_release_balance_on_every_path() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, false, CommitPolicy::Auto);

    call_store(&api, "ok", RawArgs::new()).expect("ok should succeed");
    assert_eq!(balanced(&counters), (1, 1));
    assert_eq!(counters.committed.load(Ordering::SeqCst), 1);

    let err = call_store(&api, "fails", RawArgs::new()).expect_err("fails should fail");
    assert_eq!(err.to_string(), "handled failure");
    assert_eq!(balanced(&counters), (2, 2));

    let err = call_store(&api, "panics", RawArgs::new()).expect_err("panic should surface");
    assert!(err.to_string().contains("unhandled failure"));
    assert_eq!(balanced(&counters), (3, 3));

    assert_eq!(counters.rolled_back.load(Ordering::SeqCst), 2);
    assert_eq!(counters.committed.load(Ordering::SeqCst), 1);
}

#[test]
fn validation_failure_acquires_nothing() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, false, CommitPolicy::Auto);
    let err = call_store(&api, "ok", RawArgs::new().with("n", "many"))
        .expect_err("n is not an int");
    assert!(err.as_validation().is_some_and(|v| v.mentions("n")));
    assert_eq!(balanced(&counters), (0, 0));
}

#[test]
fn failed_commit_rolls_back_then_releases() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, true, CommitPolicy::Auto);
    let err = call_store(&api, "ok", RawArgs::new()).expect_err("commit should fail");
    assert_eq!(err.kind(), "resource");
    assert_eq!(counters.rolled_back.load(Ordering::SeqCst), 1);
    assert_eq!(balanced(&counters), (1, 1));
}

#[test]
fn per_call_override_beats_chain_policy() {
    let counters = Arc::new(Counters::default());
    let auto = store_api(&counters, false, CommitPolicy::Auto);
    call_store(&auto, "ok", RawArgs::new().with("autocommit", "false")).expect("ok should succeed");
    assert_eq!(counters.committed.load(Ordering::SeqCst), 0);

    let manual = store_api(&counters, false, CommitPolicy::Manual);
    call_store(&manual, "ok", RawArgs::new()).expect("ok should succeed");
    assert_eq!(counters.committed.load(Ordering::SeqCst), 0);
    call_store(&manual, "ok", RawArgs::new().with("autocommit", true)).expect("ok should succeed");
    assert_eq!(counters.committed.load(Ordering::SeqCst), 1);
    assert_eq!(balanced(&counters), (3, 3));
}

#[test]
fn invalid_override_is_a_validation_error() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, false, CommitPolicy::Auto);
    let err = call_store(&api, "ok", RawArgs::new().with("autocommit", "sometimes"))
        .expect_err("override must be a bool");
    assert!(err.as_validation().is_some_and(|v| v.mentions("autocommit")));
    assert_eq!(balanced(&counters), (0, 0));
}

#[tokio::test]
async fn pending_calls_balance_when_awaited_or_dropped() {
    let counters = Arc::new(Counters::default());
    let api = store_api(&counters, false, CommitPolicy::Auto);
    let mut tree = RegistryTree::new();
    tree.mount(tree.root(), &api.bind(Arc::new(Store))).expect("store should mount");
    let resolved = tree.resolve("store.slow").expect("slow should resolve");
    let context = CallContext::Scheduled(tokio::runtime::Handle::current());

    let outcome = resolved
        .entry
        .invoke(&resolved.path, RawArgs::new(), Channel::Network, context.clone());
    assert!(outcome.is_pending());
    outcome.resolve().await.expect("slow should succeed");
    assert_eq!(balanced(&counters), (1, 1));

    let dropped = resolved
        .entry
        .invoke(&resolved.path, RawArgs::new(), Channel::Network, context);
    drop(dropped);
    assert_eq!(balanced(&counters), (2, 2));
    assert_eq!(counters.committed.load(Ordering::SeqCst), 1);
}
