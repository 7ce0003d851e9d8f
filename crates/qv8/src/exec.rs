//! Script Execution Helper
//!
//! Semantics QuickJS exposes no direct primitive for are expressed as
//! fixed host snippets (see `snippets.rs`). A snippet is compiled once per
//! isolate into a function taking positional parameters `_1.._n`; callers
//! pass values, never source text.

use rquickjs::context::EvalOptions;
use rquickjs::function::Args;
use rquickjs::{Function, Persistent, Value};
use rustc_hash::FxHashMap;

use crate::Scope;

/// A reviewed host snippet
#[derive(Debug)]
pub(crate) struct Snippet {
    pub(crate) name: &'static str,
    pub(crate) arity: usize,
    pub(crate) prelude: &'static str,
    pub(crate) body: &'static str,
}

impl Snippet {
    pub(crate) const fn new(name: &'static str, arity: usize, body: &'static str) -> Self {
        Self { name, arity, prelude: "", body }
    }

    pub(crate) const fn with_prelude(
        name: &'static str,
        arity: usize,
        prelude: &'static str,
        body: &'static str,
    ) -> Self {
        Self { name, arity, prelude, body }
    }

    /// Source of the factory expression that yields the snippet function
    pub(crate) fn source(&self) -> String {
        let params = (1..=self.arity)
            .map(|i| format!("_{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "(function () {{ {} return function ({}) {{ {} }}; }})()",
            self.prelude, params, self.body
        )
    }
}

/// Compiled snippets of one isolate
#[derive(Default)]
pub(crate) struct SnippetCache {
    compiled: FxHashMap<&'static str, Persistent<Function<'static>>>,
}

impl SnippetCache {
    pub(crate) fn len(&self) -> usize {
        self.compiled.len()
    }
}

/// Global, non-strict evaluation, the mode embedders expect for scripts
pub(crate) fn sloppy() -> EvalOptions {
    let mut options = EvalOptions::default();
    options.strict = false;
    options
}

/// Evaluate a snippet with positional arguments
pub(crate) fn exec<'js>(
    scope: &Scope<'js>,
    snippet: &Snippet,
    args: &[Value<'js>],
) -> rquickjs::Result<Value<'js>> {
    assert_eq!(
        args.len(),
        snippet.arity,
        "snippet {} called with {} arguments",
        snippet.name,
        args.len()
    );
    let function = compiled(scope, snippet)?;
    let mut call = Args::new(scope.ctx().clone(), args.len());
    for arg in args {
        call.push_arg(arg.clone())?;
    }
    tracing::trace!("exec snippet {}", snippet.name);
    function.call_arg(call)
}

fn compiled<'js>(scope: &Scope<'js>, snippet: &Snippet) -> rquickjs::Result<Function<'js>> {
    let cached = {
        let state = scope.lock();
        let cache = state.snippets.borrow();
        cache.compiled.get(snippet.name).cloned()
    };
    if let Some(function) = cached {
        return function.restore(scope.ctx());
    }

    let function: Function = scope.ctx().eval_with_options(snippet.source(), sloppy())?;
    let state = scope.lock();
    state
        .snippets
        .borrow_mut()
        .compiled
        .insert(snippet.name, Persistent::save(scope.ctx(), function.clone()));
    Ok(function)
}

/// Compile every catalogued snippet
pub(crate) fn warm(scope: &Scope<'_>) -> rquickjs::Result<()> {
    for snippet in crate::snippets::ALL {
        compiled(scope, snippet)?;
    }
    tracing::debug!("Compiled {} bridge snippets", crate::snippets::ALL.len());
    Ok(())
}
