//! Isolates and entered scopes
//!
//! An [`Isolate`] owns one QuickJS runtime and context. All bridge work
//! happens inside [`Isolate::enter`], which hands out a [`Scope`]: the
//! entered context plus the exception slots `TryCatch` observes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rquickjs::{Context, Ctx, Persistent, Runtime, Value};
use rustc_hash::FxHashMap;

use crate::exec::{self, SnippetCache};
use crate::shadow::{RecordId, ShadowStore};
use crate::value::{ArrayRef, Maybe, ObjectRef, ValueRef};
use crate::{BridgeError, ExceptionChannel, IsolateConfig};

static NEXT_ISOLATE_ID: AtomicU32 = AtomicU32::new(1);

/// One execution group: a host runtime, its context, and the bridge state
pub struct Isolate {
    // Field order matters: the inner state holds persistent host references
    // and must be released before the context and runtime go away.
    inner: Rc<IsolateInner>,
    context: Context,
    runtime: Runtime,
}

pub(crate) struct IsolateInner {
    id: u32,
    state: ReentrantMutex<IsolateState>,
}

/// Mutable bridge state, reached only through the isolate lock
pub(crate) struct IsolateState {
    pub(crate) shadow: RefCell<ShadowStore>,
    pub(crate) orphans: RefCell<Vec<RecordId>>,
    pub(crate) snippets: RefCell<SnippetCache>,
    pub(crate) roots: RefCell<RootTable>,
    pub(crate) callback_depth: Cell<u32>,
    pub(crate) pending_gc: Cell<bool>,
    pub(crate) collections: Cell<u64>,
    pub(crate) live_accessors: Cell<usize>,
}

/// Snapshot of isolate bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsolateStats {
    pub shadow_records: usize,
    pub accessors: usize,
    pub protected_roots: usize,
    pub compiled_snippets: usize,
    pub collections: u64,
}

impl Isolate {
    /// Create an isolate with the given configuration
    pub fn new(config: IsolateConfig) -> Result<Self, BridgeError> {
        config.validate()?;

        let runtime = Runtime::new()?;
        runtime.set_memory_limit(config.memory_limit);
        runtime.set_max_stack_size(config.max_stack_size);
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let context = Context::full(&runtime)?;

        let id = NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed);
        let inner = Rc::new(IsolateInner {
            id,
            state: ReentrantMutex::new(IsolateState::new(config.identity_hash_seed)),
        });
        let isolate = Self { inner, context, runtime };

        if config.warm_snippets {
            isolate.context.with(|ctx| {
                let scope = Scope::new(ctx, isolate.inner.clone(), ScopeKind::Entry);
                crate::exec::warm(&scope)
            })?;
        }

        tracing::debug!("Created isolate {}", id);
        Ok(isolate)
    }

    /// Create an isolate with default settings
    pub fn with_defaults() -> Result<Self, BridgeError> {
        Self::new(IsolateConfig::default())
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Enter the context and run `f` with a fresh scope.
    ///
    /// Garbage collection requested outside any callback runs once `f`
    /// returns.
    pub fn enter<R>(&self, f: impl for<'js> FnOnce(&Scope<'js>) -> R) -> R {
        let result = self.context.with(|ctx| {
            let scope = Scope::new(ctx, self.inner.clone(), ScopeKind::Entry);
            f(&scope)
        });
        self.run_pending_gc();
        result
    }

    /// Run a host collection now
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
        let state = self.inner.lock();
        state.pending_gc.set(false);
        state.collections.set(state.collections.get() + 1);
        state.drain_orphans();
        tracing::debug!("Isolate {} collected garbage", self.inner.id);
    }

    pub fn stats(&self) -> IsolateStats {
        let state = self.inner.lock();
        state.drain_orphans();
        IsolateStats {
            shadow_records: state.shadow.borrow().len(),
            accessors: state.live_accessors.get(),
            protected_roots: state.roots.borrow().len(),
            compiled_snippets: state.snippets.borrow().len(),
            collections: state.collections.get(),
        }
    }

    fn run_pending_gc(&self) {
        let due = {
            let state = self.inner.lock();
            state.callback_depth.get() == 0 && state.pending_gc.get()
        };
        if due {
            tracing::debug!("Running deferred collection on isolate {}", self.inner.id);
            self.collect_garbage();
        }
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        tracing::debug!("Dropping isolate {}", self.inner.id);
    }
}

impl IsolateInner {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, IsolateState> {
        self.state.lock()
    }

    /// Reclaim a shadow record whose host object was collected.
    ///
    /// Finalizers can fire while the store is borrowed; such ids are
    /// queued and removed on the next store access.
    pub(crate) fn release_record(&self, id: RecordId) {
        let state = self.lock();
        let removed = match state.shadow.try_borrow_mut() {
            Ok(mut store) => store.remove(id),
            Err(_) => {
                state.orphans.borrow_mut().push(id);
                false
            }
        };
        if removed {
            tracing::debug!("Reclaimed shadow record {:?}", id);
        }
    }
}

impl IsolateState {
    fn new(hash_seed: u32) -> Self {
        Self {
            shadow: RefCell::new(ShadowStore::new(hash_seed)),
            orphans: RefCell::new(Vec::new()),
            snippets: RefCell::new(SnippetCache::default()),
            roots: RefCell::new(RootTable::default()),
            callback_depth: Cell::new(0),
            pending_gc: Cell::new(false),
            collections: Cell::new(0),
            live_accessors: Cell::new(0),
        }
    }

    /// Collect now, from inside the context, and settle the bookkeeping
    pub(crate) fn collect(&self, ctx: &Ctx<'_>) {
        ctx.run_gc();
        self.pending_gc.set(false);
        self.collections.set(self.collections.get() + 1);
        self.drain_orphans();
    }

    pub(crate) fn drain_orphans(&self) {
        let orphans = std::mem::take(&mut *self.orphans.borrow_mut());
        if orphans.is_empty() {
            return;
        }
        let mut store = self.shadow.borrow_mut();
        for id in orphans {
            store.remove(id);
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// Opened by `Isolate::enter`
    Entry,
    /// Opened for one native callback invocation
    Callback,
}

/// An entered context.
///
/// Carries the exception slots of the bridge: an exception raised by a
/// bridge operation goes to the innermost [`crate::TryCatch`], or is kept as
/// the scope's uncaught exception when none is installed.
pub struct Scope<'js> {
    ctx: Ctx<'js>,
    isolate: Rc<IsolateInner>,
    kind: ScopeKind,
    pub(crate) try_catches: RefCell<Vec<Option<Value<'js>>>>,
    uncaught: RefCell<Option<Value<'js>>>,
    scheduled: RefCell<Option<Value<'js>>>,
}

impl<'js> Scope<'js> {
    pub(crate) fn new(ctx: Ctx<'js>, isolate: Rc<IsolateInner>, kind: ScopeKind) -> Self {
        Self {
            ctx,
            isolate,
            kind,
            try_catches: RefCell::new(Vec::new()),
            uncaught: RefCell::new(None),
            scheduled: RefCell::new(None),
        }
    }

    /// The host context this scope is entered in
    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub fn isolate_id(&self) -> u32 {
        self.isolate.id
    }

    pub(crate) fn isolate(&self) -> &Rc<IsolateInner> {
        &self.isolate
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, IsolateState> {
        self.isolate.lock()
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    pub fn undefined(&self) -> ValueRef<'js> {
        ValueRef::from_host(Value::new_undefined(self.ctx.clone()))
    }

    pub fn null(&self) -> ValueRef<'js> {
        ValueRef::from_host(Value::new_null(self.ctx.clone()))
    }

    pub fn boolean(&self, value: bool) -> ValueRef<'js> {
        ValueRef::from_host(Value::new_bool(self.ctx.clone(), value))
    }

    pub fn number(&self, value: f64) -> ValueRef<'js> {
        ValueRef::from_host(Value::new_float(self.ctx.clone(), value))
    }

    pub fn integer(&self, value: i32) -> ValueRef<'js> {
        ValueRef::from_host(Value::new_int(self.ctx.clone(), value))
    }

    pub fn string(&self, value: &str) -> Maybe<ValueRef<'js>> {
        let _lock = self.lock();
        let mut channel = ExceptionChannel::new(self);
        channel
            .check(rquickjs::String::from_str(self.ctx.clone(), value))
            .map(|s| ValueRef::from_host(s.into_value()))
    }

    /// The context's global object
    pub fn global(&self) -> ObjectRef<'js> {
        ObjectRef::from_host(self.ctx.globals())
    }

    pub fn new_object(&self) -> Maybe<ObjectRef<'js>> {
        ObjectRef::new(self)
    }

    pub fn new_array(&self, elements: &[ValueRef<'js>]) -> Maybe<ArrayRef<'js>> {
        ArrayRef::new(self, elements)
    }

    /// Compile and run guest source, non-strict, in this scope's context
    pub fn run_script(&self, source: &str) -> Maybe<ValueRef<'js>> {
        let _lock = self.lock();
        let mut channel = ExceptionChannel::new(self);
        channel
            .check(self.ctx.eval_with_options::<Value, _>(source, exec::sloppy()))
            .map(ValueRef::from_host)
    }

    // ------------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------------

    /// Throw `exception` at the guest.
    ///
    /// Inside a native callback the value is scheduled and rethrown when the
    /// callback returns; elsewhere it is reported like any bridge exception.
    pub fn throw_exception(&self, exception: &ValueRef<'js>) -> ValueRef<'js> {
        match self.kind {
            ScopeKind::Callback => {
                *self.scheduled.borrow_mut() = Some(exception.host().clone());
            }
            ScopeKind::Entry => self.report_exception(exception.host().clone()),
        }
        self.undefined()
    }

    /// Last exception no `TryCatch` observed
    pub fn last_uncaught_exception(&self) -> Option<ValueRef<'js>> {
        self.uncaught.borrow().clone().map(ValueRef::from_host)
    }

    pub(crate) fn report_exception(&self, exception: Value<'js>) {
        if let Some(slot) = self.try_catches.borrow_mut().last_mut() {
            *slot = Some(exception);
            return;
        }
        if self.kind == ScopeKind::Entry {
            tracing::warn!("Uncaught exception in isolate {}", self.isolate.id);
        }
        *self.uncaught.borrow_mut() = Some(exception);
    }

    /// Pending exception a callback must rethrow, if any
    pub(crate) fn take_callback_exception(&self) -> Option<Value<'js>> {
        let uncaught = self.uncaught.borrow_mut().take();
        let scheduled = self.scheduled.borrow_mut().take();
        uncaught.or(scheduled)
    }

    // ------------------------------------------------------------------------
    // Roots and collection
    // ------------------------------------------------------------------------

    /// Root `value` beyond this scope until the returned handle is dropped
    pub fn protect(&self, value: &ValueRef<'js>) -> Protected {
        let state = self.lock();
        let id = state
            .roots
            .borrow_mut()
            .insert(Persistent::save(&self.ctx, value.host().clone()));
        Protected {
            id,
            isolate_id: self.isolate.id,
            isolate: Rc::downgrade(&self.isolate),
        }
    }

    /// Release one protection of a value
    pub fn unprotect(&self, handle: Protected) {
        drop(handle);
    }

    /// Ask for a host collection.
    ///
    /// Inside a native callback it runs when the outermost callback
    /// returns; otherwise when the entry scope is left.
    pub fn request_garbage_collection(&self) {
        let state = self.lock();
        state.pending_gc.set(true);
        tracing::debug!(
            "Collection requested at callback depth {}",
            state.callback_depth.get()
        );
    }

    pub fn pending_garbage_collection(&self) -> bool {
        self.lock().pending_gc.get()
    }

    /// Number of native callbacks currently on the stack
    pub fn callback_depth(&self) -> u32 {
        self.lock().callback_depth.get()
    }
}

// ============================================================================
// Protected roots
// ============================================================================

#[derive(Default)]
pub(crate) struct RootTable {
    next_id: u32,
    entries: FxHashMap<u32, RootEntry>,
}

struct RootEntry {
    value: Persistent<Value<'static>>,
    count: usize,
}

impl RootTable {
    fn insert(&mut self, value: Persistent<Value<'static>>) -> u32 {
        self.next_id += 1;
        self.entries.insert(self.next_id, RootEntry { value, count: 1 });
        self.next_id
    }

    fn retain(&mut self, id: u32) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.count += 1;
        }
    }

    /// Drop one reference, handing back the root once the count reaches zero
    fn release(&mut self, id: u32) -> Option<Persistent<Value<'static>>> {
        let entry = self.entries.get_mut(&id)?;
        entry.count -= 1;
        if entry.count > 0 {
            return None;
        }
        self.entries.remove(&id).map(|entry| entry.value)
    }

    fn get(&self, id: u32) -> Option<Persistent<Value<'static>>> {
        self.entries.get(&id).map(|entry| entry.value.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A protected (GC-rooted) value.
///
/// Cloning adds a protection, dropping removes one; the root is released
/// when the last handle goes.
pub struct Protected {
    id: u32,
    isolate_id: u32,
    isolate: Weak<IsolateInner>,
}

impl Protected {
    /// The rooted value, when `scope` belongs to the owning isolate
    pub fn get<'js>(&self, scope: &Scope<'js>) -> Option<ValueRef<'js>> {
        if scope.isolate_id() != self.isolate_id {
            return None;
        }
        let root = scope.lock().roots.borrow().get(self.id)?;
        root.restore(scope.ctx()).ok().map(ValueRef::from_host)
    }
}

impl Clone for Protected {
    fn clone(&self) -> Self {
        if let Some(isolate) = self.isolate.upgrade() {
            isolate.lock().roots.borrow_mut().retain(self.id);
        }
        Self {
            id: self.id,
            isolate_id: self.isolate_id,
            isolate: self.isolate.clone(),
        }
    }
}

impl Drop for Protected {
    fn drop(&mut self) {
        let Some(isolate) = self.isolate.upgrade() else {
            return;
        };
        let state = isolate.lock();
        let released = state.roots.borrow_mut().release(self.id);
        // The host value is freed outside the table borrow.
        drop(released);
    }
}

impl std::fmt::Debug for Protected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected")
            .field("id", &self.id)
            .field("isolate", &self.isolate_id)
            .finish()
    }
}
