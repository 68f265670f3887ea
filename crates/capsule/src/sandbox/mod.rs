//! Sandboxed script execution.
//!
//! Runs a script as the body of a function whose parameters are the only
//! ambient names it can see: `require`, `module`, `exports`, `console`,
//! `process`, `global`, `__filename`, `__dirname`, `Buffer` and the timer
//! functions. Every execution gets a fresh engine, so nothing leaks between
//! runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use capsule::ExecutionSandbox;
//!
//! let sandbox = ExecutionSandbox::new();
//! let result = sandbox.execute("module.exports = 1 + 1;", "index.js").await;
//! assert!(result.success);
//! assert_eq!(result.exports, Some(serde_json::json!(2)));
//! ```

mod console;
pub(crate) mod convert;
mod event_loop;
mod output;
mod process;
mod timers;

pub use event_loop::EventLoop;
pub use output::{CollectingSink, OutputLevel, OutputLine, OutputSink, TracingSink};

use std::fmt;
use std::sync::Arc;

use rquickjs::convert::Coerced;
use rquickjs::function::{Opt, This};
use rquickjs::{Context, Ctx, Function, IntoJs, Object, Runtime, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::SandboxConfig;
use crate::modules::{ModuleEnv, ModuleRegistry, load_module, path};
use event_loop::Settlement;

/// Names bound as the wrapper function's parameters, in order.
const PARAMETERS: [&str; 15] = [
    "require",
    "module",
    "exports",
    "console",
    "process",
    "global",
    "__filename",
    "__dirname",
    "Buffer",
    "setTimeout",
    "setInterval",
    "clearTimeout",
    "clearInterval",
    "setImmediate",
    "clearImmediate",
];

/// An uncaught error from a script.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct ScriptFailure {
    /// Error name, e.g. `TypeError`
    pub name: String,
    /// Error message
    pub message: String,
    /// Engine stack trace, when available
    pub stack: Option<String>,
}

impl ScriptFailure {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            name: "InternalError".to_string(),
            message: message.into(),
            stack: None,
        }
    }
}

/// Errors that end an execution.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The engine could not be set up
    #[error("engine error: {0}")]
    Engine(#[from] rquickjs::Error),
    /// The script threw or its promise rejected
    #[error("{0}")]
    Script(ScriptFailure),
}

impl SandboxError {
    fn into_failure(self) -> ScriptFailure {
        match self {
            SandboxError::Engine(e) => ScriptFailure::internal(e.to_string()),
            SandboxError::Script(failure) => failure,
        }
    }
}

/// Execution statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Wall-clock time in milliseconds
    pub wall_time_ms: u64,
    /// Timer callbacks fired
    pub timers_fired: usize,
}

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the script completed without an uncaught error
    pub success: bool,
    /// The script's completion value (awaited if it was a promise)
    pub value: Option<serde_json::Value>,
    /// `module.exports` after the run
    pub exports: Option<serde_json::Value>,
    /// Message of the uncaught error
    pub failure_message: Option<String>,
    /// Execution statistics
    pub stats: ExecutionStats,
}

/// Executes untrusted scripts against the builtin module registry.
///
/// Cheap to share: the registry and sink are reference counted.
#[derive(Clone)]
pub struct ExecutionSandbox {
    registry: Arc<ModuleRegistry>,
    sink: Arc<dyn OutputSink>,
    config: SandboxConfig,
}

impl fmt::Debug for ExecutionSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSandbox")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ExecutionSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSandbox {
    /// Standard registry, default config, output to `tracing`.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ModuleRegistry::standard()),
            sink: Arc::new(TracingSink),
            config: SandboxConfig::default(),
        }
    }

    /// Send console output to `sink`.
    pub fn with_sink(self, sink: impl OutputSink + 'static) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    /// Send console output to a shared sink.
    pub fn with_shared_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the module registry.
    pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Run `script` as if it were the file `filename`.
    ///
    /// Never fails: uncaught errors, rejected promises and engine failures
    /// are reported to the sink as `"<name>: <message>"` followed by the
    /// stack, and returned as `success: false`.
    #[allow(clippy::future_not_send)]
    pub async fn execute(&self, script: &str, filename: &str) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!(filename, bytes = script.len(), "executing script");

        let (outcome, timers_fired) = match Session::new(&self.config) {
            Ok(session) => {
                let outcome = session.run(self, script, filename).await;
                (outcome, session.events.fired())
            }
            Err(e) => (Err(e), 0),
        };
        let stats = ExecutionStats {
            wall_time_ms: started.elapsed().as_millis() as u64,
            timers_fired,
        };

        match outcome {
            Ok(completion) => {
                tracing::info!(filename, wall_time_ms = stats.wall_time_ms, "script completed");
                ExecutionResult {
                    success: true,
                    value: completion.value,
                    exports: completion.exports,
                    failure_message: None,
                    stats,
                }
            }
            Err(e) => {
                let failure = e.into_failure();
                tracing::warn!(filename, error = %failure, "script failed");
                self.report(&failure);
                ExecutionResult {
                    success: false,
                    value: None,
                    exports: None,
                    failure_message: Some(failure.message),
                    stats,
                }
            }
        }
    }

    fn report(&self, failure: &ScriptFailure) {
        self.sink.emit(OutputLevel::Error, &failure.to_string());
        if let Some(stack) = &failure.stack {
            self.sink.emit(OutputLevel::Error, stack);
        }
    }
}

struct Completion {
    value: Option<serde_json::Value>,
    exports: Option<serde_json::Value>,
}

/// One engine instance. Field order matters: engine values pinned by the
/// event loop are released in `Drop` before the context and runtime go.
struct Session {
    events: EventLoop,
    context: Context,
    runtime: Runtime,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.events.clear();
    }
}

impl Session {
    fn new(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let runtime = Runtime::new()?;
        let deadline = Instant::now() + config.event_loop_timeout;
        runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));
        let context = Context::full(&runtime)?;
        Ok(Self {
            events: EventLoop::new(),
            context,
            runtime,
        })
    }

    async fn run(&self, sandbox: &ExecutionSandbox, script: &str, filename: &str) -> Result<Completion, SandboxError> {
        self.context.with(|ctx| {
            let value = self.invoke(&ctx, sandbox, script, filename).map_err(|e| caught(&ctx, e))?;
            self.await_value(&ctx, value).map_err(|e| caught(&ctx, e))
        })?;
        self.drive(&sandbox.config).await?;
        self.context.with(|ctx| self.finish(&ctx))
    }

    /// Build the bindings, compile the wrapper and call it with `this` set
    /// to `global`.
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        sandbox: &ExecutionSandbox,
        script: &str,
        filename: &str,
    ) -> rquickjs::Result<Value<'js>> {
        let env = ModuleEnv {
            sink: Arc::clone(&sandbox.sink),
            cwd: sandbox.config.cwd.clone(),
            events: self.events.clone(),
        };

        let require = {
            let registry = Arc::clone(&sandbox.registry);
            let env = env.clone();
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, name: Coerced<String>| {
                load_module(&ctx, &registry, &env, &name.0)
            })?
            .with_name("require")?
        };

        let exports = Object::new(ctx.clone())?;
        let module = Object::new(ctx.clone())?;
        module.set("exports", exports.clone())?;
        module.set("filename", filename)?;
        module.set("id", filename)?;
        self.events.set_module_record(ctx, module.clone());

        let global = Object::new(ctx.clone())?;
        let buffer: Value<'js> = if sandbox.registry.contains("buffer") {
            load_module(ctx, &sandbox.registry, &env, "buffer")?.get("Buffer")?
        } else {
            Value::new_undefined(ctx.clone())
        };
        let timers = timers::install(ctx, &self.events)?;

        let mut source = PARAMETERS
            .iter()
            .map(|name| (*name).into_js(ctx))
            .collect::<rquickjs::Result<Vec<_>>>()?;
        source.push(script.into_js(ctx)?);
        let wrapper: Function<'js> = convert::construct(ctx, "Function", source)?;

        let args = vec![
            require.into_value(),
            module.into_value(),
            exports.into_value(),
            console::install(ctx, &sandbox.sink)?.into_value(),
            process::install(ctx, &sandbox.config, &sandbox.sink)?.into_value(),
            global.clone().into_value(),
            filename.into_js(ctx)?,
            path::dirname(filename).into_js(ctx)?,
            buffer,
            timers.set_timeout.into_value(),
            timers.set_interval.into_value(),
            timers.clear_timeout.into_value(),
            timers.clear_interval.into_value(),
            timers.set_immediate.into_value(),
            timers.clear_immediate.into_value(),
        ];
        convert::apply(ctx, &wrapper, global.into_value(), args)
    }

    /// Settle immediately for plain values; subscribe to thenables.
    fn await_value<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<()> {
        let then = match value.as_object() {
            Some(object) => object.get::<_, Value<'js>>("then")?.into_function(),
            None => None,
        };
        let Some(then) = then else {
            self.events.settle(Settlement::Fulfilled(convert::js_to_json(ctx, value)));
            return Ok(());
        };

        let fulfilled = self.events.clone();
        let on_fulfilled = Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Opt<Value<'js>>| {
            let json = value.0.and_then(|value| convert::js_to_json(&ctx, value));
            fulfilled.settle(Settlement::Fulfilled(json));
        })?;
        let rejected = self.events.clone();
        let on_rejected = Function::new(ctx.clone(), move |ctx: Ctx<'js>, reason: Opt<Value<'js>>| {
            let reason = reason.0.unwrap_or_else(|| Value::new_undefined(ctx.clone()));
            rejected.settle(Settlement::Rejected(failure_from_value(&ctx, reason)));
        })?;
        let _: Value<'js> = then.call((This(value), on_fulfilled, on_rejected))?;
        Ok(())
    }

    /// Drive promise jobs and timers until nothing is pending or a bound is
    /// reached.
    async fn drive(&self, config: &SandboxConfig) -> Result<(), SandboxError> {
        let deadline = Instant::now() + config.event_loop_timeout;
        loop {
            self.run_jobs()?;
            if let Settlement::Rejected(failure) = self.events.settlement() {
                return Err(SandboxError::Script(failure));
            }

            let Some(next) = self.events.next_deadline() else {
                return Ok(());
            };
            if next > deadline {
                tracing::warn!(
                    pending = self.events.pending_timers(),
                    "event loop timeout reached, dropping pending timers"
                );
                return Ok(());
            }
            if self.events.fired() >= config.max_timer_callbacks {
                tracing::warn!(
                    fired = self.events.fired(),
                    "timer callback limit reached, dropping pending timers"
                );
                return Ok(());
            }

            tokio::time::sleep_until(next).await;
            let now = Instant::now();
            self.context.with(|ctx| {
                self.events
                    .fire_due(&ctx, now)
                    .map(|_| ())
                    .map_err(|e| caught(&ctx, e))
            })?;
        }
    }

    fn run_jobs(&self) -> Result<(), SandboxError> {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(_) => {
                    let failure = self.context.with(|ctx| {
                        let exception = ctx.catch();
                        failure_from_value(&ctx, exception)
                    });
                    return Err(SandboxError::Script(failure));
                }
            }
        }
    }

    fn finish(&self, ctx: &Ctx<'_>) -> Result<Completion, SandboxError> {
        let value = match self.events.settlement() {
            Settlement::Fulfilled(value) => value,
            Settlement::Pending => {
                tracing::warn!("script promise never settled");
                None
            }
            Settlement::Rejected(failure) => return Err(SandboxError::Script(failure)),
        };
        let exports = match self.events.module_record(ctx)? {
            Some(module) => {
                let exports: Value<'_> = module.get("exports").map_err(|e| caught(ctx, e))?;
                convert::js_to_json(ctx, exports)
            }
            None => None,
        };
        Ok(Completion { value, exports })
    }
}

/// Turn an engine error into a failure, taking the pending exception if
/// there is one.
fn caught(ctx: &Ctx<'_>, error: rquickjs::Error) -> SandboxError {
    if matches!(error, rquickjs::Error::Exception) {
        SandboxError::Script(failure_from_value(ctx, ctx.catch()))
    } else {
        SandboxError::Engine(error)
    }
}

/// Read `name`, `message` and `stack` off a thrown value.
fn failure_from_value<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> ScriptFailure {
    let Some(object) = value.as_object() else {
        return ScriptFailure {
            name: "Error".to_string(),
            message: convert::display(ctx, value).unwrap_or_default(),
            stack: None,
        };
    };
    let field = |key: &str| {
        object
            .get::<_, Option<Coerced<String>>>(key)
            .ok()
            .flatten()
            .map(|s| s.0)
    };
    ScriptFailure {
        name: field("name").unwrap_or_else(|| "Error".to_string()),
        message: field("message").unwrap_or_default(),
        stack: field("stack").filter(|stack| !stack.trim().is_empty()),
    }
}
