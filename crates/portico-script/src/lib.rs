//! # portico-script: sandboxed script transport
//!
//! Functions are rhai source text. Every call builds a fresh interpreter,
//! so no mutable state survives between calls, trading per-call startup
//! cost for isolation. Execution races against the effective timeout on the
//! caller's side; when the timer wins, the interpreter keeps running only
//! until its next progress tick observes the cancellation flag.
//!
//! Dropping the in-flight `call` future has the same effect as a timeout
//! loss: the cancellation flag is raised from a drop guard, and the
//! interpreter stops at its next progress tick.
//!
//! Addresses look like `script://{engine}/{name}/{id}` and resolve only
//! within the issuing portal's live registry.

use async_trait::async_trait;
use parking_lot::RwLock;
use portico_core::{
    Address, CallContext, Function, Portal, PortalError, PortalResult, address_id,
};
use portico_schema::FunctionSchema;
use rhai::{Dynamic, Engine, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{instrument, warn};

/// How much the interpreter is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// Limits applied and `eval` disabled.
    Sandboxed,
    /// Limits applied, language surface left intact.
    Permissive,
}

/// Per-portal interpreter configuration. Immutable for the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPortalConfig {
    /// Engine tag embedded in addresses. Only `rhai` is supported.
    pub engine: String,
    /// Rough per-value size budget, mapped onto the interpreter's string,
    /// array, and map size limits.
    pub memory_limit: usize,
    /// Maximum call-stack depth inside the interpreter.
    pub stack_size: usize,
    pub default_timeout: Duration,
    pub security_policy: SecurityPolicy,
}

impl Default for ScriptPortalConfig {
    fn default() -> Self {
        Self {
            engine: "rhai".to_owned(),
            memory_limit: 1 << 20,
            stack_size: 64,
            default_timeout: Duration::from_secs(5),
            security_policy: SecurityPolicy::Sandboxed,
        }
    }
}

/// Implementation payload: function source plus optional overrides.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub source: String,
    /// Entry-point function name; defaults to the registered name.
    pub entry: Option<String>,
    /// Per-function timeout override.
    pub timeout: Option<Duration>,
}

impl ScriptSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry: None,
            timeout: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Portal whose functions run inside an embedded rhai interpreter.
pub struct ScriptPortal {
    config: ScriptPortalConfig,
    registry: RwLock<HashMap<String, Arc<ScriptFunction>>>,
}

impl ScriptPortal {
    pub fn new(config: ScriptPortalConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ScriptPortalConfig {
        &self.config
    }

    pub fn clear(&self) {
        self.registry.write().clear();
    }

    /// Split `script://{engine}/{name}/{id}` into engine, name, id.
    fn parse_script_address(&self, address: &Address) -> PortalResult<(String, String, String)> {
        if address.scheme() != self.scheme() {
            return Err(PortalError::address(
                address.as_str(),
                "not a script:// address",
            ));
        }
        let segments: Vec<&str> = address.routing().split('/').collect();
        let [engine, name, id] = segments.as_slice() else {
            return Err(PortalError::address(
                address.as_str(),
                "expected script://{engine}/{name}/{id}",
            ));
        };
        if *engine != self.config.engine {
            return Err(PortalError::address(
                address.as_str(),
                format!("unsupported engine `{engine}`"),
            ));
        }
        Ok(((*engine).to_owned(), (*name).to_owned(), (*id).to_owned()))
    }
}

#[async_trait]
impl Portal for ScriptPortal {
    type Payload = ScriptSource;

    fn scheme(&self) -> &'static str {
        "script"
    }

    fn generate_address(&self, name: &str, _payload: &ScriptSource) -> PortalResult<Address> {
        if name.is_empty() || name.contains('/') {
            return Err(PortalError::address(name, "invalid function name"));
        }
        Address::parse(format!(
            "script://{}/{}/{}",
            self.config.engine,
            name,
            address_id()
        ))
    }

    async fn apply(
        &self,
        address: &Address,
        schema: FunctionSchema,
        payload: ScriptSource,
    ) -> PortalResult<Arc<dyn Function>> {
        let (_, name, _) = self.parse_script_address(address)?;
        let function = Arc::new(ScriptFunction {
            address: address.clone(),
            entry: payload.entry.clone().unwrap_or(name),
            schema,
            source: payload,
            config: self.config.clone(),
        });
        self.registry
            .write()
            .insert(address.as_str().to_owned(), function.clone());
        Ok(function)
    }

    async fn resolve_function(&self, address: &Address) -> PortalResult<Arc<dyn Function>> {
        self.parse_script_address(address)?;
        self.registry
            .read()
            .get(address.as_str())
            .cloned()
            .map(|f| f as Arc<dyn Function>)
            .ok_or_else(|| {
                PortalError::address(address.as_str(), "not registered in this portal")
            })
    }
}

struct ScriptFunction {
    address: Address,
    entry: String,
    schema: FunctionSchema,
    source: ScriptSource,
    config: ScriptPortalConfig,
}

/// Raises the interpreter's cancellation flag when dropped, whether the
/// call timed out, finished, or the caller dropped the future mid-flight.
/// Firing after a completed run is a harmless store.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl ScriptFunction {
    /// A fresh engine per call, with the configured limits applied and a
    /// cooperative cancellation hook installed.
    fn build_engine(config: &ScriptPortalConfig, cancelled: Arc<AtomicBool>) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_call_levels(config.stack_size);
        engine.set_max_string_size(config.memory_limit);
        engine.set_max_array_size(config.memory_limit / 16);
        engine.set_max_map_size(config.memory_limit / 16);
        if config.security_policy == SecurityPolicy::Sandboxed {
            engine.disable_symbol("eval");
        }
        engine.on_progress(move |_ops| {
            if cancelled.load(Ordering::Relaxed) {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });
        engine
    }

    /// Compile, locate the entry point, marshal, and run: the blocking
    /// part executed off the async runtime.
    fn execute_blocking(
        config: &ScriptPortalConfig,
        cancelled: Arc<AtomicBool>,
        source: &str,
        entry: &str,
        schema: &FunctionSchema,
        params: &Value,
    ) -> PortalResult<Value> {
        let engine = Self::build_engine(config, cancelled);

        let ast = engine
            .compile(source)
            .map_err(|e| PortalError::syntax(e.to_string()))?;

        if !ast.iter_functions().any(|f| f.name == entry) {
            return Err(PortalError::syntax(format!(
                "entry point `{entry}` not found in source"
            )));
        }

        // Named parameters become positional arguments in the schema's
        // declared input order; a missing optional input passes unit.
        let args: Vec<Dynamic> = schema
            .inputs()
            .iter()
            .map(|(name, _)| match params.get(name) {
                Some(value) => rhai::serde::to_dynamic(value).map_err(|e| {
                    PortalError::execution(format!("cannot marshal parameter `{name}`: {e}"))
                }),
                None => Ok(Dynamic::UNIT),
            })
            .collect::<PortalResult<_>>()?;

        let result: Dynamic = engine
            .call_fn(&mut Scope::new(), &ast, entry, args)
            .map_err(|e| PortalError::execution_with_source(e.to_string(), Box::new(e)))?;

        rhai::serde::from_dynamic::<Value>(&result)
            .map_err(|e| PortalError::execution(format!("cannot marshal result: {e}")))
    }
}

#[async_trait]
impl Function for ScriptFunction {
    #[instrument(skip(self, ctx, params), fields(address = %self.address, entry = %self.entry))]
    async fn call(&self, ctx: &CallContext, params: Value) -> PortalResult<Value> {
        let outcome = self.schema.validate_params(&params);
        if !outcome.is_valid() {
            return Err(PortalError::invalid_params(outcome.issues));
        }

        // Caller deadline beats the per-function override beats the default.
        let limit = ctx
            .timeout()
            .or(self.source.timeout)
            .unwrap_or(self.config.default_timeout);

        let cancelled = Arc::new(AtomicBool::new(false));
        // Fires on every exit path, including the caller dropping this
        // future mid-flight.
        let _cancel_guard = CancelOnDrop(cancelled.clone());
        let config = self.config.clone();
        let flag = cancelled.clone();
        let source = self.source.source.clone();
        let entry = self.entry.clone();
        let schema = self.schema.clone();
        let task = tokio::task::spawn_blocking(move || {
            Self::execute_blocking(&config, flag, &source, &entry, &schema, &params)
        });

        let result = match tokio::time::timeout(limit, task).await {
            Err(_) => {
                // Timer won: the guard raises the flag on return and the
                // interpreter stops at its next progress tick; the
                // resources it holds until then are the documented
                // cleanup limitation.
                return Err(PortalError::Timeout { limit });
            }
            Ok(Err(join_error)) => {
                return Err(PortalError::execution_with_source(
                    "script worker failed",
                    Box::new(join_error),
                ));
            }
            Ok(Ok(result)) => result?,
        };

        let check = self.schema.validate_result(&result);
        if !check.is_valid() {
            warn!(
                address = %self.address,
                issues = check.issues.len(),
                "result does not match declared output schema"
            );
        }
        Ok(result)
    }

    fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    fn address(&self) -> &Address {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::ExecutionStage;
    use portico_schema::ValueSchema;
    use serde_json::json;
    use std::time::Instant;

    fn add_schema() -> FunctionSchema {
        FunctionSchema::builder("add")
            .required_input("a", ValueSchema::Integer)
            .required_input("b", ValueSchema::Integer)
            .output(ValueSchema::Integer)
            .build()
    }

    async fn registered(
        portal: &ScriptPortal,
        name: &str,
        schema: FunctionSchema,
        source: ScriptSource,
    ) -> Arc<dyn Function> {
        let address = portal.generate_address(name, &source).unwrap();
        portal.apply(&address, schema, source).await.unwrap()
    }

    #[tokio::test]
    async fn add_inside_the_interpreter() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn add(a, b) { a + b }");
        let function = registered(&portal, "add", add_schema(), source).await;

        assert!(function.address().as_str().starts_with("script://rhai/add/"));
        let result = function
            .call(&CallContext::background(), json!({"a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn round_trip_resolution() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn add(a, b) { a + b }");
        let address = portal.generate_address("add", &source).unwrap();
        portal.apply(&address, add_schema(), source).await.unwrap();

        let function = portal.resolve_function(&address).await.unwrap();
        assert_eq!(function.schema(), &add_schema());
    }

    #[tokio::test]
    async fn parse_failure_is_a_syntax_error() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn add(a, { nope");
        let function = registered(&portal, "add", add_schema(), source).await;

        let error = function
            .call(&CallContext::background(), json!({"a": 1, "b": 2}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            PortalError::Execution { stage: ExecutionStage::Syntax, .. }
        ));
    }

    #[tokio::test]
    async fn missing_entry_point_is_a_syntax_error() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn something_else() { 1 }");
        let function = registered(&portal, "add", add_schema(), source).await;

        let error = function
            .call(&CallContext::background(), json!({"a": 1, "b": 2}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            PortalError::Execution { stage: ExecutionStage::Syntax, .. }
        ));
        assert!(error.to_string().contains("add"));
    }

    #[tokio::test]
    async fn runtime_exception_is_an_execution_error() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new(r#"fn boom() { throw "kaboom" }"#);
        let schema = FunctionSchema::builder("boom").build();
        let function = registered(&portal, "boom", schema, source).await;

        let error = function
            .call(&CallContext::background(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            PortalError::Execution { stage: ExecutionStage::Runtime, .. }
        ));
        assert!(error.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn validation_gates_before_the_interpreter_runs() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        // unparseable on purpose: validation must reject first
        let source = ScriptSource::new("fn add(a, { nope");
        let function = registered(&portal, "add", add_schema(), source).await;

        let error = function
            .call(&CallContext::background(), json!({"a": 1, "b": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(error, PortalError::Validation { .. }));
    }

    #[tokio::test]
    async fn infinite_loop_times_out_within_the_bound() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source =
            ScriptSource::new("fn spin() { loop { } }").with_timeout(Duration::from_millis(100));
        let schema = FunctionSchema::builder("spin").build();
        let function = registered(&portal, "spin", schema, source).await;

        let started_at = Instant::now();
        let error = function
            .call(&CallContext::background(), json!({}))
            .await
            .unwrap_err();
        assert!(error.is_timeout(), "expected timeout, got {error}");
        assert!(started_at.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn caller_deadline_wins_over_function_override() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source =
            ScriptSource::new("fn spin() { loop { } }").with_timeout(Duration::from_secs(60));
        let schema = FunctionSchema::builder("spin").build();
        let function = registered(&portal, "spin", schema, source).await;

        let started_at = Instant::now();
        let error = function
            .call(
                &CallContext::with_timeout(Duration::from_millis(100)),
                json!({}),
            )
            .await
            .unwrap_err();
        assert!(error.is_timeout());
        assert!(started_at.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_optional_input_passes_unit() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let schema = FunctionSchema::builder("greet")
            .required_input("name", ValueSchema::String)
            .input("title", ValueSchema::String)
            .output(ValueSchema::String)
            .build();
        let source = ScriptSource::new(
            r#"fn greet(name, title) { if title == () { "hi " + name } else { title + " " + name } }"#,
        );
        let function = registered(&portal, "greet", schema, source).await;

        let plain = function
            .call(&CallContext::background(), json!({"name": "ada"}))
            .await
            .unwrap();
        assert_eq!(plain, json!("hi ada"));

        let titled = function
            .call(
                &CallContext::background(),
                json!({"name": "ada", "title": "dr"}),
            )
            .await
            .unwrap();
        assert_eq!(titled, json!("dr ada"));
    }

    #[tokio::test]
    async fn custom_entry_point_is_honored() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn plus(a, b) { a + b }").with_entry("plus");
        let function = registered(&portal, "add", add_schema(), source).await;

        let result = function
            .call(&CallContext::background(), json!({"a": 4, "b": 6}))
            .await
            .unwrap();
        assert_eq!(result, json!(10));
    }

    #[test]
    fn dropping_the_call_future_stops_the_interpreter() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let portal = ScriptPortal::new(ScriptPortalConfig::default());
            let source = ScriptSource::new("fn spin() { loop { } }")
                .with_timeout(Duration::from_secs(600));
            let schema = FunctionSchema::builder("spin").build();
            let function = registered(&portal, "spin", schema, source).await;

            let call = tokio::spawn(async move {
                function.call(&CallContext::background(), json!({})).await
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
            call.abort();
            let _ = call.await;
        });

        // Shutdown waits for the blocking pool; a leaked interpreter
        // thread would keep spinning until the 600s override.
        let started_at = Instant::now();
        runtime.shutdown_timeout(Duration::from_secs(2));
        assert!(
            started_at.elapsed() < Duration::from_millis(500),
            "interpreter kept running after the call future was dropped"
        );
    }

    #[tokio::test]
    async fn foreign_engine_rejected() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let address = Address::parse("script://lua/add/1").unwrap();
        let error = portal.resolve_function(&address).await.err().unwrap();
        assert!(matches!(error, PortalError::Address { .. }));
    }

    #[tokio::test]
    async fn clear_forgets_registrations() {
        let portal = ScriptPortal::new(ScriptPortalConfig::default());
        let source = ScriptSource::new("fn add(a, b) { a + b }");
        let address = portal.generate_address("add", &source).unwrap();
        portal.apply(&address, add_schema(), source).await.unwrap();

        portal.clear();
        assert!(portal.resolve_function(&address).await.is_err());
    }
}
