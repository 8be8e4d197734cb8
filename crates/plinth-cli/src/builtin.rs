//! Handler types compiled into the `plinth` binary.
//!
//! Source units name these types in their `types` list:
//!
//! ```toml
//! module = "shop"
//! default = "Shop"
//! types = ["Shop", "Calculator"]
//! ```

use parking_lot::Mutex;
use plinth_apps::{ApiFactory, HandlerCatalog};
use plinth_kernel::{
    Api, Constraint, HandlerError, InterceptorChain, Invocation, ParamKind, ParamSpec,
    RegistryError, ResourceInterceptor, ResourceProvider,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub fn catalog() -> Result<HandlerCatalog, RegistryError> {
    let mut catalog = HandlerCatalog::new();
    catalog.register(
        ApiFactory::new(calculator_api()?, |args| {
            Ok(Calculator {
                precision: args.int("precision")?,
            })
        })
        .with_constructor(&[ParamSpec::new("precision", ParamKind::Int)
            .with_default(2)
            .constrain(Constraint::Ge(0.0))
            .describe("Decimal places kept by `div`")])?,
    )?;
    catalog.register(
        ApiFactory::with_builder(shop_api()?, |api, args| {
            let ledger = Arc::new(Ledger::default());
            let shop = Shop {
                name: args.str("name")?.to_string(),
                ledger: Arc::clone(&ledger),
            };
            let articles = articles_api(Arc::clone(&ledger))
                .map_err(|e| HandlerError::new(e.to_string()))?
                .bind(Arc::new(Articles { ledger }))
                .renamed("articles");
            Ok(api.bind(Arc::new(shop)).with_child(articles))
        })
        .with_constructor(&[ParamSpec::new("name", ParamKind::Str)
            .with_default("plinth shop")
            .constrain(Constraint::MinLen(1))])?
        .describe_child("articles", &articles_api(Arc::default())?),
    )?;
    Ok(catalog)
}

pub struct Calculator {
    precision: i64,
}

impl Calculator {
    fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision.clamp(0, 12) as i32);
        (value * scale).round() / scale
    }
}

fn calculator_api() -> Result<Api<Calculator>, RegistryError> {
    let mut api = Api::new("Calculator").describe("Integer and decimal arithmetic");
    api.method("add")
        .doc("Add two integers")
        .param(ParamSpec::new("a", ParamKind::Int))
        .param(ParamSpec::new("b", ParamKind::Int))
        .returns(ParamKind::Int)
        .blocking(|_: &Calculator, args| {
            let (a, b) = (args.int("a")?, args.int("b")?);
            a.checked_add(b)
                .map(|sum| json!(sum))
                .ok_or_else(|| HandlerError::new(format!("{a} + {b} overflows")))
        })?;
    api.method("sub")
        .doc("Subtract b from a")
        .param(ParamSpec::new("a", ParamKind::Int))
        .param(ParamSpec::new("b", ParamKind::Int))
        .returns(ParamKind::Int)
        .blocking(|_: &Calculator, args| {
            let (a, b) = (args.int("a")?, args.int("b")?);
            a.checked_sub(b)
                .map(|difference| json!(difference))
                .ok_or_else(|| HandlerError::new(format!("{a} - {b} overflows")))
        })?;
    api.method("div")
        .doc("Divide a by b, rounded to the configured precision")
        .param(ParamSpec::new("a", ParamKind::Float))
        .param(ParamSpec::new("b", ParamKind::Float))
        .returns(ParamKind::Float)
        .blocking(|calc: &Calculator, args| {
            let divisor = args.float("b")?;
            if divisor == 0.0 {
                return Err(
                    HandlerError::new("division by zero").with_detail(json!({ "b": divisor }))
                );
            }
            Ok(json!(calc.round(args.float("a")? / divisor)))
        })?;
    api.method("square")
        .doc("Square an integer")
        .param(ParamSpec::new("x", ParamKind::Int))
        .returns(ParamKind::Int)
        .suspending(|_calc: Arc<Calculator>, args| async move {
            let x = args.int("x")?;
            tokio::task::yield_now().await;
            x.checked_mul(x)
                .map(|squared| json!(squared))
                .ok_or_else(|| HandlerError::new(format!("{x} squared overflows")))
        })?;
    Ok(api)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub name: String,
    pub price: f64,
    pub category: String,
}

enum Change {
    Put(Article),
    Delete(String),
}

/// Committed articles of one shop instance.
#[derive(Default)]
pub struct Ledger {
    articles: Mutex<BTreeMap<String, Article>>,
}

impl Ledger {
    fn contains(&self, name: &str) -> bool {
        self.articles.lock().contains_key(name)
    }

    fn snapshot(&self) -> Vec<Article> {
        self.articles.lock().values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.articles.lock().len()
    }
}

/// Changes staged by one call; applied only on commit.
#[derive(Default)]
pub struct LedgerTx {
    staged: Mutex<Vec<Change>>,
}

impl LedgerTx {
    fn stage(&self, change: Change) {
        self.staged.lock().push(change);
    }
}

pub struct LedgerProvider {
    ledger: Arc<Ledger>,
}

impl ResourceProvider for LedgerProvider {
    type Handle = LedgerTx;

    fn acquire(&self, call: &Invocation) -> Result<LedgerTx, String> {
        debug!(path = %call.path, "ledger transaction opened");
        Ok(LedgerTx::default())
    }

    fn commit(&self, handle: &LedgerTx) -> Result<(), String> {
        let staged = std::mem::take(&mut *handle.staged.lock());
        let mut articles = self.ledger.articles.lock();
        for change in staged {
            match change {
                Change::Put(article) => {
                    articles.insert(article.name.clone(), article);
                }
                Change::Delete(name) => {
                    articles.remove(&name);
                }
            }
        }
        Ok(())
    }

    fn rollback(&self, handle: &LedgerTx) -> Result<(), String> {
        handle.staged.lock().clear();
        Ok(())
    }

    fn release(&self, handle: &LedgerTx) {
        let pending = handle.staged.lock().len();
        if pending > 0 {
            debug!(pending, "ledger transaction released with uncommitted changes");
        }
    }
}

pub struct Shop {
    name: String,
    ledger: Arc<Ledger>,
}

fn shop_api() -> Result<Api<Shop>, RegistryError> {
    let mut api = Api::new("Shop").describe("A small shop over a transactional article ledger");
    api.method("info")
        .doc("Shop name and committed article count")
        .returns(ParamKind::Json)
        .blocking(|shop: &Shop, _| {
            Ok(json!({ "name": shop.name, "articles": shop.ledger.len() }))
        })?;
    Ok(api)
}

pub struct Articles {
    ledger: Arc<Ledger>,
}

fn articles_api(ledger: Arc<Ledger>) -> Result<Api<Articles>, RegistryError> {
    let provider = Arc::new(LedgerProvider { ledger });
    let chain = InterceptorChain::standard_with(ResourceInterceptor::new("ledger", provider));
    let mut api = Api::new("Articles")
        .describe("Articles for sale; every change runs in a ledger transaction")
        .with_chain(chain);
    api.method("add")
        .doc("Add or replace an article")
        .param(ParamSpec::new("name", ParamKind::Str).constrain(Constraint::MinLen(1)))
        .param(ParamSpec::new("price", ParamKind::Float).constrain(Constraint::Gt(0.0)))
        .param(
            ParamSpec::new("category", ParamKind::choice(["food", "tools", "books"]))
                .with_default("food"),
        )
        .param(ParamSpec::new("ledger", ParamKind::Json))
        .returns(ParamKind::Json)
        .blocking(|_: &Articles, args| {
            let tx = args.resource::<LedgerTx>("ledger")?;
            let article = Article {
                name: args.str("name")?.to_string(),
                price: args.float("price")?,
                category: args.str("category")?.to_string(),
            };
            let result = serde_json::to_value(&article)?;
            tx.stage(Change::Put(article));
            Ok(result)
        })?;
    api.method("remove")
        .doc("Remove an article by name")
        .param(ParamSpec::new("name", ParamKind::Str))
        .param(ParamSpec::new("ledger", ParamKind::Json))
        .returns(ParamKind::Bool)
        .blocking(|articles: &Articles, args| {
            let tx = args.resource::<LedgerTx>("ledger")?;
            let name = args.str("name")?;
            if !articles.ledger.contains(name) {
                return Err(HandlerError::new(format!("no article named `{name}`")));
            }
            tx.stage(Change::Delete(name.to_string()));
            Ok(json!(true))
        })?;
    api.method("list")
        .doc("Committed articles, by name")
        .param(ParamSpec::new("ledger", ParamKind::Json))
        .returns(ParamKind::Json)
        .blocking(|articles: &Articles, _| Ok(serde_json::to_value(articles.ledger.snapshot())?))?;
    Ok(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_kernel::{CallContext, Channel, Dispatcher, RawArgs, RegistryTree};

    fn shop_dispatcher() -> Dispatcher {
        let catalog = catalog().expect("builtin catalog should build");
        let binding = catalog
            .instantiate("Shop", &[json!("corner")], &BTreeMap::new())
            .expect("shop should instantiate");
        let tree = RegistryTree::shared();
        {
            let mut guard = tree.write();
            let root = guard.root();
            guard.mount(root, &binding.renamed("shop")).expect("shop should mount");
        }
        Dispatcher::new(tree)
    }

    #[test]
    fn committed_articles_are_listed() {
        let dispatcher = shop_dispatcher();
        dispatcher
            .call_cli(&["shop", "articles", "add", "apple", "1.5"])
            .expect("add should succeed");
        let listed = dispatcher
            .call_cli(&["shop", "articles", "list"])
            .expect("list should succeed");
        assert_eq!(listed, json!([{"name": "apple", "price": 1.5, "category": "food"}]));
        let info = dispatcher.call_cli(&["shop", "info"]).expect("info should succeed");
        assert_eq!(info, json!({"name": "corner", "articles": 1}));
    }

    #[test]
    fn manual_commit_leaves_the_ledger_untouched() {
        let dispatcher = shop_dispatcher();
        dispatcher
            .call_cli(&["shop", "articles", "add", "saw", "12", "tools", "--autocommit", "false"])
            .expect("add should succeed");
        let listed = dispatcher
            .call_cli(&["shop", "articles", "list"])
            .expect("list should succeed");
        assert_eq!(listed, json!([]));
    }

    #[test]
    fn invalid_price_never_stages_a_change() {
        let dispatcher = shop_dispatcher();
        let err = dispatcher
            .call_cli(&["shop", "articles", "add", "pear", "-5"])
            .expect_err("price must be positive");
        assert!(err.as_validation().is_some_and(|v| v.mentions("price")));
        let err = dispatcher
            .call_cli(&["shop", "articles", "add", "pear", "2", "toys"])
            .expect_err("toys is not a category");
        assert!(err.as_validation().is_some_and(|v| v.mentions("category")));
        let err = dispatcher
            .call_cli(&["shop", "articles", "remove", "pear"])
            .expect_err("pear was never added");
        assert_eq!(err.kind(), "runtime");
    }

    #[test]
    fn shop_rejects_empty_names_and_describes_articles() {
        let catalog = catalog().expect("builtin catalog should build");
        let err = catalog
            .instantiate("Shop", &[json!("")], &BTreeMap::new())
            .expect_err("an empty name is rejected");
        assert!(err.to_string().contains("name"));
        let description = catalog.describe("Shop").expect("Shop should describe");
        let articles = description.child("articles").expect("articles should be described");
        assert_eq!(articles.method("add").map(|m| m.path.as_str()), Some("Shop.articles.add"));
        let add = articles.method("add").expect("articles should describe add");
        assert!(add.parameters.iter().all(|p| p.name != "ledger"));
    }

    #[test]
    fn calculator_rounds_division() {
        let catalog = catalog().expect("builtin catalog should build");
        let kwargs = BTreeMap::from([("precision".to_string(), json!("1"))]);
        let binding = catalog
            .instantiate("Calculator", &[], &kwargs)
            .expect("calculator should instantiate");
        let mut tree = RegistryTree::new();
        let root = tree.root();
        tree.mount(root, &binding.renamed("calc")).expect("calc should mount");
        let resolved = tree.resolve("calc.div").expect("div should resolve");
        let result = resolved
            .entry
            .invoke(
                &resolved.path,
                RawArgs::new().with("a", 10).with("b", 3),
                Channel::Cli,
                CallContext::Blocking,
            )
            .into_ready()
            .expect("div should succeed");
        assert_eq!(result, json!(3.3));
    }

    #[test]
    fn calculator_reports_integer_overflow() {
        let catalog = catalog().expect("builtin catalog should build");
        let binding = catalog
            .instantiate("Calculator", &[], &BTreeMap::new())
            .expect("calculator should instantiate");
        let tree = RegistryTree::shared();
        {
            let mut guard = tree.write();
            let root = guard.root();
            guard.mount(root, &binding.renamed("calc")).expect("calc should mount");
        }
        let dispatcher = Dispatcher::new(tree);
        let max = i64::MAX.to_string();
        let min = i64::MIN.to_string();

        let err = dispatcher
            .call_cli(&["calc", "add", max.as_str(), "1"])
            .expect_err("i64::MAX + 1 should overflow");
        assert_eq!(err.kind(), "runtime");
        assert!(err.to_string().contains("overflows"));

        let err = dispatcher
            .call_cli(&["calc", "sub", "--a", min.as_str(), "--b", "1"])
            .expect_err("i64::MIN - 1 should overflow");
        assert_eq!(err.kind(), "runtime");
    }
}
