//! # Dispatcher
//!
//! Resolves `(operation, type, backend)` to a registered handler and runs it.
//!
//! ## Resolution
//!
//! For each requested operation (in caller order) the target's dispatch
//! chain is searched: its own type, its ancestors in declaration order, then
//! the untyped entry. The backend type is the logical type of the named
//! backend, or none. The first hit wins.
//!
//! ## Call stack
//!
//! Every running handler owns a `Frame` that points at its parent. Nested
//! calls made through `Invocation::dispatch` extend the chain; at most
//! `MAX_DISPATCH_DEPTH` frames are active at once.
//!
//! ## Error routing
//!
//! An error escaping a nested call is offered to the nearest enclosing
//! frame whose handler supplies a context hook. The first hook that answers
//! wraps the error in `TesseraError::Contextual`; wrapped errors and depth
//! violations pass through untouched.

use crate::backend::{Backend, Connection};
use crate::object::Object;
use crate::primitives::MAX_DISPATCH_DEPTH;
use crate::store::Store;
use crate::types::{Output, TesseraError};
use serde_json::Value;
use std::fmt;

// =============================================================================
// HANDLERS
// =============================================================================

/// Behaviour bound to one or more dispatch keys.
pub trait Command: Sync {
    /// Applicability predicate. A handler that declines returns no output.
    fn condition(&self, _inv: &Invocation<'_>) -> bool {
        true
    }

    /// Run the handler.
    fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError>;

    /// Framing text for errors raised by calls nested under this handler.
    fn context(&self, _frame: &Frame<'_>) -> Option<String> {
        None
    }
}

/// A handler definition as listed in a module root.
pub struct CommandDef {
    /// Handler name, unique within its root.
    pub name: &'static str,
    /// Operation from the allow-list.
    pub operation: &'static str,
    /// Types the handler is bound to; `None` registers the untyped entry.
    pub types: &'static [Option<&'static str>],
    /// Backend type the handler is bound to.
    pub backend: Option<&'static str>,
    pub handler: &'static dyn Command,
}

impl fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("operation", &self.operation)
            .field("types", &self.types)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CALLS
// =============================================================================

/// One dispatch request.
///
/// Operations are tried in insertion order. The connection, when present,
/// is lent to whichever handler answers.
pub struct DispatchCall<'c> {
    operations: Vec<(&'static str, Value)>,
    connection: Option<&'c mut (dyn Connection + 'static)>,
    backend: Option<String>,
    namespace: String,
    optional: bool,
}

impl<'c> DispatchCall<'c> {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            operations: Vec::new(),
            connection: None,
            backend: None,
            namespace: namespace.into(),
            optional: false,
        }
    }

    /// Request an operation with its arguments.
    #[must_use]
    pub fn op(mut self, operation: &'static str, params: Value) -> Self {
        self.operations.push((operation, params));
        self
    }

    /// Select a configured backend by name.
    #[must_use]
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    /// Lend an open connection to the handler.
    #[must_use]
    pub fn connection(mut self, connection: &'c mut (dyn Connection + 'static)) -> Self {
        self.connection = Some(connection);
        self
    }

    /// A missing handler yields `Ok(None)` instead of `NoHandler`.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Requested operation names in caller order.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|(name, _)| *name).collect()
    }

    #[must_use]
    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl fmt::Debug for DispatchCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchCall")
            .field("operations", &self.operation_names())
            .field("backend", &self.backend)
            .field("namespace", &self.namespace)
            .field("optional", &self.optional)
            .field("connection", &self.connection.is_some())
            .finish()
    }
}

// =============================================================================
// FRAMES & INVOCATIONS
// =============================================================================

/// One active handler on the call stack.
#[derive(Debug)]
pub struct Frame<'a> {
    command: &'static CommandDef,
    target: &'a Object,
    namespace: &'a str,
    backend: Option<&'a str>,
    parent: Option<&'a Frame<'a>>,
    depth: usize,
}

impl<'a> Frame<'a> {
    #[must_use]
    pub fn command(&self) -> &'static CommandDef {
        self.command
    }

    #[must_use]
    pub fn target(&self) -> &'a Object {
        self.target
    }

    #[must_use]
    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    #[must_use]
    pub fn backend(&self) -> Option<&'a str> {
        self.backend
    }

    #[must_use]
    pub fn parent(&self) -> Option<&'a Frame<'a>> {
        self.parent
    }

    /// Number of frames on the stack, this one included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Everything a running handler can reach.
pub struct Invocation<'a> {
    store: &'a Store,
    target: &'a Object,
    params: Value,
    connection: Option<&'a mut (dyn Connection + 'static)>,
    backend: Option<&'a dyn Backend>,
    frame: &'a Frame<'a>,
}

impl<'a> Invocation<'a> {
    #[must_use]
    pub fn store(&self) -> &'a Store {
        self.store
    }

    #[must_use]
    pub fn target(&self) -> &'a Object {
        self.target
    }

    /// Look up one argument by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    #[must_use]
    pub fn namespace(&self) -> &'a str {
        self.frame.namespace
    }

    #[must_use]
    pub fn backend(&self) -> Option<&'a dyn Backend> {
        self.backend
    }

    #[must_use]
    pub fn frame(&self) -> &'a Frame<'a> {
        self.frame
    }

    /// The connection lent by the caller.
    pub fn connection(&mut self) -> Result<&mut (dyn Connection + 'static), TesseraError> {
        match self.connection.as_deref_mut() {
            Some(connection) => Ok(connection),
            None => Err(TesseraError::MissingConnection(
                self.frame.command.operation.to_string(),
            )),
        }
    }

    /// Report a domain error.
    #[must_use]
    pub fn fail(&self, message: impl Into<String>) -> TesseraError {
        TesseraError::Handler(message.into())
    }

    /// Dispatch a nested call below this handler.
    ///
    /// A call without its own connection borrows this invocation's one.
    pub fn dispatch<'s>(
        &'s mut self,
        target: &Object,
        mut call: DispatchCall<'s>,
    ) -> Result<Option<Output>, TesseraError> {
        if call.connection.is_none() {
            call.connection = self.connection.as_deref_mut();
        }
        self.store.run(target, call, Some(self.frame))
    }
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("target", &self.target.to_string())
            .field("params", &self.params)
            .field("backend", &self.backend.map(|b| b.name()))
            .field("frame", &self.frame.command.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

impl Store {
    /// Find the handler answering `call` for `target`.
    ///
    /// Returns the index of the matched operation and its handler, or
    /// `None` when nothing matches.
    pub fn resolve(
        &self,
        target: &Object,
        call: &DispatchCall<'_>,
    ) -> Result<Option<(usize, &'static CommandDef)>, TesseraError> {
        let backend_type = match call.backend_name() {
            Some(name) => Some(self.backend(name)?.type_name()),
            None => None,
        };
        let chain = target.schema().dispatch_chain();
        let operations = call.operation_names();
        Ok(self.commands().resolve(&operations, &chain, backend_type))
    }

    /// Resolve and run `call` against `target`.
    ///
    /// `stack` is the frame of the calling handler, `None` at top level.
    pub fn run(
        &self,
        target: &Object,
        call: DispatchCall<'_>,
        stack: Option<&Frame<'_>>,
    ) -> Result<Option<Output>, TesseraError> {
        let depth = stack.map_or(0, Frame::depth);
        if depth >= MAX_DISPATCH_DEPTH {
            return Err(TesseraError::DispatchDepthExceeded {
                depth: depth + 1,
                max: MAX_DISPATCH_DEPTH,
            });
        }

        let resolved = self.resolve(target, &call).map_err(|e| route(stack, e))?;
        let Some((index, command)) = resolved else {
            if call.optional {
                tracing::debug!(target = %target, call = ?call, "optional call without handler");
                return Ok(None);
            }
            return Err(route(
                stack,
                TesseraError::NoHandler {
                    operations: call
                        .operation_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    target: target.to_string(),
                    backend: call.backend_name().map(str::to_string),
                },
            ));
        };

        let backend = match call.backend.as_deref() {
            Some(name) => Some(self.backend(name)?),
            None => None,
        };

        let DispatchCall {
            operations,
            connection,
            backend: backend_name,
            namespace,
            ..
        } = call;
        let params = operations
            .into_iter()
            .nth(index)
            .map_or(Value::Null, |(_, params)| params);

        tracing::debug!(
            handler = command.name,
            operation = command.operation,
            target = %target,
            depth = depth + 1,
            "dispatch"
        );

        let frame = Frame {
            command,
            target,
            namespace: &namespace,
            backend: backend_name.as_deref(),
            parent: stack,
            depth: depth + 1,
        };
        let mut inv = Invocation {
            store: self,
            target,
            params,
            connection,
            backend,
            frame: &frame,
        };

        if !command.handler.condition(&inv) {
            return Ok(None);
        }
        command.handler.execute(&mut inv).map_err(|e| route(stack, e))
    }
}

/// Hand an error to the nearest enclosing frame with a context hook.
fn route(stack: Option<&Frame<'_>>, err: TesseraError) -> TesseraError {
    if err.is_routed() {
        return err;
    }
    let mut frame = stack;
    while let Some(current) = frame {
        if let Some(context) = current.command.handler.context(current) {
            tracing::debug!(handler = current.command.name, error = %err, "error contextualized");
            return TesseraError::Contextual {
                context,
                source: Box::new(err),
            };
        }
        frame = current.parent();
    }
    err
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::registry::ModuleRoot;
    use crate::schema::TypeDef;
    use serde_json::json;

    struct Echo(&'static str);

    impl Command for Echo {
        fn execute(&self, _inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
            Ok(Some(Output::Value(json!(self.0))))
        }
    }

    struct Declined;

    impl Command for Declined {
        fn condition(&self, inv: &Invocation<'_>) -> bool {
            inv.param("run").and_then(Value::as_bool).unwrap_or(false)
        }

        fn execute(&self, _inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
            Ok(Some(Output::Value(json!("ran"))))
        }
    }

    /// Re-dispatches `check` on its own target and reports the depth reached.
    struct Recurse;

    impl Command for Recurse {
        fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
            let limit = inv.param("limit").and_then(Value::as_u64).unwrap_or(u64::MAX);
            let depth = inv.frame().depth();
            if depth as u64 >= limit {
                return Ok(Some(Output::Value(json!(depth))));
            }
            let target = inv.target();
            let namespace = inv.namespace();
            inv.dispatch(
                target,
                DispatchCall::new(namespace).op("check", json!({ "limit": limit })),
            )
        }
    }

    /// Fans out to `serialize` and frames whatever goes wrong.
    struct Framing;

    impl Command for Framing {
        fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
            let target = inv.target();
            inv.dispatch(target, DispatchCall::new("default").op("serialize", Value::Null))
        }

        fn context(&self, frame: &Frame<'_>) -> Option<String> {
            Some(format!("  in {}", frame.target()))
        }
    }

    struct Broken;

    impl Command for Broken {
        fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
            Err(inv.fail("broken"))
        }
    }

    static ECHO_BASE: Echo = Echo("base");
    static ECHO_CHILD: Echo = Echo("child");
    static ECHO_ANY: Echo = Echo("any");
    static DECLINED: Declined = Declined;
    static RECURSE: Recurse = Recurse;
    static FRAMING: Framing = Framing;
    static BROKEN: Broken = Broken;

    static ROOT: ModuleRoot = ModuleRoot {
        name: "tests.dispatch",
        types: &[
            TypeDef::new("base"),
            TypeDef::new("child").bases(&["base"]),
            TypeDef::new("loop"),
            TypeDef::new("outer"),
            TypeDef::new("inner"),
        ],
        commands: &[
            CommandDef {
                name: "BaseSerialize",
                operation: "serialize",
                types: &[Some("base")],
                backend: None,
                handler: &ECHO_BASE,
            },
            CommandDef {
                name: "ChildCheck",
                operation: "check",
                types: &[Some("child")],
                backend: None,
                handler: &ECHO_CHILD,
            },
            CommandDef {
                name: "AnyPush",
                operation: "push",
                types: &[None],
                backend: None,
                handler: &ECHO_ANY,
            },
            CommandDef {
                name: "Declined",
                operation: "manifest.check",
                types: &[Some("base")],
                backend: None,
                handler: &DECLINED,
            },
            CommandDef {
                name: "Recurse",
                operation: "check",
                types: &[Some("loop")],
                backend: None,
                handler: &RECURSE,
            },
            CommandDef {
                name: "Framing",
                operation: "check",
                types: &[Some("outer")],
                backend: None,
                handler: &FRAMING,
            },
            CommandDef {
                name: "FramingInner",
                operation: "check",
                types: &[Some("inner")],
                backend: None,
                handler: &FRAMING,
            },
            CommandDef {
                name: "Broken",
                operation: "serialize",
                types: &[Some("outer")],
                backend: None,
                handler: &BROKEN,
            },
        ],
    };

    fn store() -> Store {
        Store::new(&[&ROOT]).expect("store")
    }

    fn value(output: Option<Output>) -> Value {
        output.and_then(Output::into_value).expect("value output")
    }

    #[test]
    fn falls_back_along_the_chain() {
        let store = store();
        let child = store.instantiate("child").expect("child");
        let call = DispatchCall::new("default").op("serialize", Value::Null);
        let out = store.run(&child, call, None).expect("run");
        assert_eq!(value(out), json!("base"));
    }

    #[test]
    fn operations_outer_chain_inner() {
        let store = store();
        let child = store.instantiate("child").expect("child");
        // `serialize` only matches on the base type, `check` on the child
        // itself; caller order decides.
        let call = DispatchCall::new("default")
            .op("serialize", Value::Null)
            .op("check", Value::Null);
        assert_eq!(value(store.run(&child, call, None).expect("run")), json!("base"));

        let call = DispatchCall::new("default")
            .op("check", Value::Null)
            .op("serialize", Value::Null);
        assert_eq!(value(store.run(&child, call, None).expect("run")), json!("child"));
    }

    #[test]
    fn untyped_handler_answers_last() {
        let store = store();
        let base = store.instantiate("base").expect("base");
        let call = DispatchCall::new("default").op("push", Value::Null);
        assert_eq!(value(store.run(&base, call, None).expect("run")), json!("any"));
    }

    #[test]
    fn missing_handler() {
        let store = store();
        let base = store.instantiate("base").expect("base");

        let call = DispatchCall::new("default").op("backend.migrate", Value::Null);
        let err = store.run(&base, call, None).expect_err("no handler");
        assert!(matches!(err, TesseraError::NoHandler { .. }));

        let call = DispatchCall::new("default")
            .op("backend.migrate", Value::Null)
            .optional();
        assert!(store.run(&base, call, None).expect("optional").is_none());
    }

    #[test]
    fn condition_gates_execution() {
        let store = store();
        let base = store.instantiate("base").expect("base");

        let call = DispatchCall::new("default").op("manifest.check", json!({ "run": false }));
        assert!(store.run(&base, call, None).expect("declined").is_none());

        let call = DispatchCall::new("default").op("manifest.check", json!({ "run": true }));
        assert_eq!(value(store.run(&base, call, None).expect("run")), json!("ran"));
    }

    #[test]
    fn ten_frames_allowed() {
        let store = store();
        let target = store.instantiate("loop").expect("loop");
        let call = DispatchCall::new("default").op("check", json!({ "limit": 10 }));
        assert_eq!(value(store.run(&target, call, None).expect("run")), json!(10));
    }

    #[test]
    fn eleventh_frame_fails() {
        let store = store();
        let target = store.instantiate("loop").expect("loop");
        let call = DispatchCall::new("default").op("check", json!({}));
        let err = store.run(&target, call, None).expect_err("too deep");
        assert!(matches!(
            err,
            TesseraError::DispatchDepthExceeded { depth: 11, max: 10 }
        ));
    }

    #[test]
    fn nested_errors_get_context_once() {
        let store = store();
        let outer = store.instantiate("outer").expect("outer");
        let call = DispatchCall::new("default").op("check", Value::Null);
        let err = store.run(&outer, call, None).expect_err("broken");
        match &err {
            TesseraError::Contextual { context, source } => {
                assert_eq!(context, "  in <outer>");
                assert!(matches!(**source, TesseraError::Handler(ref m) if m == "broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_missing_handler_gets_context() {
        let store = store();
        let inner = store.instantiate("inner").expect("inner");
        let call = DispatchCall::new("default").op("check", Value::Null);
        let err = store.run(&inner, call, None).expect_err("no serialize for inner");
        match &err {
            TesseraError::Contextual { context, source } => {
                assert_eq!(context, "  in <inner>");
                assert!(matches!(
                    **source,
                    TesseraError::NoHandler { ref target, .. } if target == "<inner>"
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn frames_link_to_their_caller() {
        struct Ancestry;
        impl Command for Ancestry {
            fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
                let mut names = Vec::new();
                let mut frame = Some(inv.frame());
                while let Some(current) = frame {
                    names.push(json!(current.command().name));
                    frame = current.parent();
                }
                Ok(Some(Output::Value(Value::Array(names))))
            }
        }
        struct Forward;
        impl Command for Forward {
            fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
                let target = inv.target();
                inv.dispatch(target, DispatchCall::new("default").op("serialize", Value::Null))
            }
        }
        static ANCESTRY: Ancestry = Ancestry;
        static FORWARD: Forward = Forward;
        static ROOT: ModuleRoot = ModuleRoot {
            name: "tests.ancestry",
            types: &[TypeDef::new("thing")],
            commands: &[
                CommandDef {
                    name: "Forward",
                    operation: "check",
                    types: &[Some("thing")],
                    backend: None,
                    handler: &FORWARD,
                },
                CommandDef {
                    name: "Ancestry",
                    operation: "serialize",
                    types: &[Some("thing")],
                    backend: None,
                    handler: &ANCESTRY,
                },
            ],
        };

        let store = Store::new(&[&ROOT]).expect("store");
        let thing = store.instantiate("thing").expect("thing");
        let out = store
            .run(&thing, DispatchCall::new("default").op("check", Value::Null), None)
            .expect("run");
        assert_eq!(value(out), json!(["Ancestry", "Forward"]));
    }

    #[test]
    fn top_level_errors_propagate_raw() {
        let store = store();
        let outer = store.instantiate("outer").expect("outer");
        let call = DispatchCall::new("default").op("serialize", Value::Null);
        let err = store.run(&outer, call, None).expect_err("broken");
        assert!(matches!(err, TesseraError::Handler(_)));
    }

    #[test]
    fn unknown_backend_selector() {
        let store = store();
        let base = store.instantiate("base").expect("base");
        let call = DispatchCall::new("default")
            .op("push", Value::Null)
            .backend("nowhere");
        let err = store.run(&base, call, None).expect_err("no backend");
        assert!(matches!(err, TesseraError::BackendNotConfigured(ref name) if name == "nowhere"));
    }

    #[test]
    fn handlers_without_connection() {
        struct NeedsConnection;
        impl Command for NeedsConnection {
            fn execute(&self, inv: &mut Invocation<'_>) -> Result<Option<Output>, TesseraError> {
                inv.connection()?;
                Ok(None)
            }
        }
        static NEEDS: NeedsConnection = NeedsConnection;
        static ROOT: ModuleRoot = ModuleRoot {
            name: "tests.connection",
            types: &[TypeDef::new("thing")],
            commands: &[CommandDef {
                name: "NeedsConnection",
                operation: "push",
                types: &[Some("thing")],
                backend: None,
                handler: &NEEDS,
            }],
        };

        let store = Store::new(&[&ROOT]).expect("store");
        let thing = store.instantiate("thing").expect("thing");
        let err = store
            .run(&thing, DispatchCall::new("default").op("push", Value::Null), None)
            .expect_err("missing connection");
        assert!(matches!(err, TesseraError::MissingConnection(ref op) if op == "push"));
    }
}
