//! btx-sandbox
//!
//! Turns untrusted user-supplied strategy source into a callable strategy
//! object without granting it access to arbitrary host capabilities.
//!
//! A systems-language rewrite cannot reuse the "exec untrusted source in the
//! same process" model a scripting-language host relies on. Here the source
//! never runs as native code at all: it is parsed and interpreted by an
//! embedded engine (`rhai`) that has no filesystem, network, process, or
//! reflection capability registered into its namespace. The "no imports, no
//! dunder introspection, no dangerous builtins" guarantees are therefore
//! structural rather than enforced by walking a syntax tree and denying a
//! list of names.

use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rhai::{Dynamic, Engine, Scope, AST};

/// Maximum strategy source length, in characters.
pub const MAX_SOURCE_LEN: usize = 50_000;

/// Wall-clock deadline for strategy construction (initial script evaluation).
pub const CONSTRUCTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq)]
pub enum SandboxError {
    SourceTooLong { len: usize, max: usize },
    SourceEmpty,
    ParseError(String),
    MissingUpdateHook,
    ConstructionTimedOut,
    RuntimeError(String),
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxError::SourceTooLong { len, max } => {
                write!(f, "strategy source exceeds maximum length ({len} > {max})")
            }
            SandboxError::SourceEmpty => write!(f, "strategy code cannot be empty"),
            SandboxError::ParseError(msg) => write!(f, "syntax error: {msg}"),
            SandboxError::MissingUpdateHook => {
                write!(f, "strategy code must define an `update` function")
            }
            SandboxError::ConstructionTimedOut => write!(
                f,
                "strategy construction timed out after {}s",
                CONSTRUCTION_TIMEOUT.as_secs()
            ),
            SandboxError::RuntimeError(msg) => write!(f, "strategy execution error: {msg}"),
        }
    }
}

impl std::error::Error for SandboxError {}

/// One bar's OHLC plus its integer position, the only data surface exposed
/// to strategy code.
#[derive(Clone, Copy, Debug)]
pub struct BarView {
    pub index: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// An order a strategy requested during `start`/`update`/`end`. The sandbox
/// never executes these itself; the backtest driver drains them after each
/// hook call and routes them through a `btx-portfolio::Portfolio`.
#[derive(Clone, Debug, PartialEq)]
pub enum OrderIntent {
    EnterLong { qty: f64 },
    EnterShort { qty: f64 },
    Exit { qty: f64 },
}

type IntentBuffer = Arc<Mutex<Vec<OrderIntent>>>;

/// A hardened engine with no import/file/eval capability, shared by every
/// compiled strategy.
fn hardened_engine() -> Engine {
    let mut engine = Engine::new();
    // No `import "..."` can resolve to anything: structurally removes the
    // module/file-load surface rather than denylisting the keyword.
    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
    // Rhai's built-in `eval` re-enters the interpreter on a string at
    // runtime; disabling it removes the one remaining dynamic-code-execution
    // primitive.
    engine.disable_symbol("eval");
    engine.set_max_string_size(MAX_SOURCE_LEN * 4);
    engine.set_max_expr_depths(64, 32);
    engine
}

/// A validated, compiled strategy ready to be driven bar by bar.
pub struct CompiledStrategy {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    intents: IntentBuffer,
    has_start: bool,
    has_end: bool,
}

impl CompiledStrategy {
    /// Parses and validates `code`, then runs it once (within the
    /// construction deadline) to establish any top-level strategy state.
    /// Requires an `update(bar)` function; `start(bar)`/`end(bar)` are
    /// optional no-ops when absent.
    pub fn compile(code: &str) -> Result<Self, SandboxError> {
        if code.trim().is_empty() {
            return Err(SandboxError::SourceEmpty);
        }
        if code.len() > MAX_SOURCE_LEN {
            return Err(SandboxError::SourceTooLong { len: code.len(), max: MAX_SOURCE_LEN });
        }

        let intents: IntentBuffer = Arc::new(Mutex::new(Vec::new()));
        let mut engine = hardened_engine();
        register_strategy_api(&mut engine, intents.clone());

        let ast = engine
            .compile(code)
            .map_err(|e| SandboxError::ParseError(e.to_string()))?;

        let has_update = ast.iter_functions().any(|f| f.name == "update");
        if !has_update {
            return Err(SandboxError::MissingUpdateHook);
        }
        let has_start = ast.iter_functions().any(|f| f.name == "start");
        let has_end = ast.iter_functions().any(|f| f.name == "end");

        let mut scope = Scope::new();
        run_with_deadline(CONSTRUCTION_TIMEOUT, {
            let engine = engine.clone();
            let ast = ast.clone();
            move || {
                let mut scope = Scope::new();
                engine
                    .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
                    .map(|_| scope)
                    .map_err(|e| e.to_string())
            }
        })?
        .map(|s| scope = s)
        .map_err(SandboxError::RuntimeError)?;

        Ok(Self { engine, ast, scope, intents, has_start, has_end })
    }

    fn call_hook(&mut self, name: &str, bar: BarView) -> Result<Vec<OrderIntent>, SandboxError> {
        self.intents.lock().unwrap().clear();
        let result: Result<Dynamic, _> =
            self.engine.call_fn(&mut self.scope, &self.ast, name, (bar,));
        result.map_err(|e| SandboxError::RuntimeError(e.to_string()))?;
        Ok(std::mem::take(&mut *self.intents.lock().unwrap()))
    }

    pub fn start(&mut self, bar: BarView) -> Result<Vec<OrderIntent>, SandboxError> {
        if !self.has_start {
            return Ok(Vec::new());
        }
        self.call_hook("start", bar)
    }

    pub fn update(&mut self, bar: BarView) -> Result<Vec<OrderIntent>, SandboxError> {
        self.call_hook("update", bar)
    }

    pub fn end(&mut self, bar: BarView) -> Result<Vec<OrderIntent>, SandboxError> {
        if !self.has_end {
            return Ok(Vec::new());
        }
        self.call_hook("end", bar)
    }
}

fn register_strategy_api(engine: &mut Engine, intents: IntentBuffer) {
    engine
        .register_type_with_name::<BarView>("Bar")
        .register_get("index", |b: &mut BarView| b.index)
        .register_get("open", |b: &mut BarView| b.open)
        .register_get("high", |b: &mut BarView| b.high)
        .register_get("low", |b: &mut BarView| b.low)
        .register_get("close", |b: &mut BarView| b.close);

    let buy_intents = intents.clone();
    engine.register_fn("buy", move |qty: f64| {
        buy_intents.lock().unwrap().push(OrderIntent::EnterLong { qty });
    });

    let sell_intents = intents.clone();
    engine.register_fn("sell", move |qty: f64| {
        sell_intents.lock().unwrap().push(OrderIntent::EnterShort { qty });
    });

    let exit_intents = intents;
    engine.register_fn("exit_position", move |qty: f64| {
        exit_intents.lock().unwrap().push(OrderIntent::Exit { qty });
    });
}

/// Runs `f` on a worker thread, failing with [`SandboxError::ConstructionTimedOut`]
/// if it does not finish within `deadline`. The worker is detached (not
/// joined) on timeout; it shares no host resources beyond the hardened
/// engine, so a runaway script cannot touch anything but its own scope.
fn run_with_deadline<F, T>(deadline: Duration, f: F) -> Result<Result<T, String>, SandboxError>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(deadline) {
        Ok(result) => Ok(result),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SandboxError::ConstructionTimedOut),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(SandboxError::RuntimeError("strategy construction worker panicked".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(index: i64, close: f64) -> BarView {
        BarView { index, open: close, high: close, low: close, close }
    }

    #[test]
    fn rejects_empty_source() {
        assert_eq!(CompiledStrategy::compile("").unwrap_err(), SandboxError::SourceEmpty);
    }

    #[test]
    fn rejects_source_over_length_cap() {
        let code = "// ".to_string() + &"x".repeat(MAX_SOURCE_LEN);
        let err = CompiledStrategy::compile(&code).unwrap_err();
        assert!(matches!(err, SandboxError::SourceTooLong { .. }));
    }

    #[test]
    fn requires_an_update_function() {
        let err = CompiledStrategy::compile("fn start(bar) {}").unwrap_err();
        assert_eq!(err, SandboxError::MissingUpdateHook);
    }

    #[test]
    fn rejects_syntax_errors() {
        let err = CompiledStrategy::compile("fn update(bar { }").unwrap_err();
        assert!(matches!(err, SandboxError::ParseError(_)));
    }

    #[test]
    fn compiles_and_drives_a_minimal_buy_and_hold_strategy() {
        let code = r#"
            let bought = false;

            fn update(bar) {
                if !this.bought {
                    buy(10.0);
                    this.bought = true;
                }
            }
        "#;
        let mut strategy = CompiledStrategy::compile(code).unwrap();
        let intents = strategy.update(bar(0, 10.0)).unwrap();
        assert_eq!(intents, vec![OrderIntent::EnterLong { qty: 10.0 }]);
        let intents = strategy.update(bar(1, 11.0)).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn import_statements_cannot_reach_the_filesystem() {
        let code = r#"
            import "whatever" as m;
            fn update(bar) {}
        "#;
        let err = CompiledStrategy::compile(code).unwrap_err();
        assert!(matches!(err, SandboxError::ParseError(_) | SandboxError::RuntimeError(_)));
    }
}
