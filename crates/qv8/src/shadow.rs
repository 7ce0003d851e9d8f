//! Shadow Record Store
//!
//! Metadata QuickJS objects cannot carry themselves (internal fields,
//! identity hash, private map, hidden-prototype links, construction
//! template) lives in a side table.
//!
//! The host side keeps a `WeakMap` from the annotated object to a holder
//! object. The holder stores the host-valued metadata and a native token
//! function whose Rust state owns the record id: when the object becomes
//! unreachable, the holder and token go with it, and dropping the token's
//! state reclaims the Rust record. Records are only created on first use.

use std::ffi::c_void;
use std::rc::{Rc, Weak};

use rquickjs::{Array, Function, Object, Persistent, Value};
use rustc_hash::FxHashMap;

use crate::config::DEFAULT_HASH_SEED;
use crate::exec::exec;
use crate::isolate::IsolateInner;
use crate::snippets;
use crate::template::{FunctionTemplate, ObjectTemplate};
use crate::Scope;

/// Internal fields with a fast-path embedder pointer slot
pub(crate) const EMBEDDER_POINTER_SLOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RecordId(pub(crate) i32);

/// Rust half of a shadow record
pub(crate) struct ShadowRecord {
    pub(crate) identity_hash: i32,
    pub(crate) internal_field_count: usize,
    pub(crate) is_hidden_prototype: bool,
    pub(crate) template: Option<ObjectTemplate>,
    pub(crate) constructor: Option<FunctionTemplate>,
    pub(crate) embedder_pointers: [*mut c_void; EMBEDDER_POINTER_SLOTS],
    pub(crate) external: Option<*mut c_void>,
}

pub(crate) struct ShadowStore {
    records: FxHashMap<RecordId, ShadowRecord>,
    next_id: i32,
    hash_state: u32,
    map: Option<Persistent<Object<'static>>>,
}

impl ShadowStore {
    pub(crate) fn new(seed: u32) -> Self {
        Self {
            records: FxHashMap::default(),
            next_id: 0,
            hash_state: if seed == 0 { DEFAULT_HASH_SEED } else { seed },
            map: None,
        }
    }

    fn insert(&mut self) -> RecordId {
        self.next_id += 1;
        let id = RecordId(self.next_id);
        let identity_hash = self.next_hash();
        self.records.insert(
            id,
            ShadowRecord {
                identity_hash,
                internal_field_count: 0,
                is_hidden_prototype: false,
                template: None,
                constructor: None,
                embedder_pointers: [std::ptr::null_mut(); EMBEDDER_POINTER_SLOTS],
                external: None,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> bool {
        self.records.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Next value of a xorshift sequence, masked to a positive Smi range
    fn next_hash(&mut self) -> i32 {
        let mut x = self.hash_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.hash_state = x;
        match (x & 0x3fff_ffff) as i32 {
            0 => 1,
            hash => hash,
        }
    }
}

/// Owned by the holder's token function; reclaims the record on drop
struct RecordGuard {
    id: RecordId,
    isolate: Weak<IsolateInner>,
}

impl RecordGuard {
    fn raw_id(&self) -> i32 {
        self.id.0
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        if let Some(isolate) = self.isolate.upgrade() {
            isolate.release_record(self.id);
        }
    }
}

/// A record together with its host-side holder
#[derive(Debug, Clone)]
pub(crate) struct ShadowHandle<'js> {
    pub(crate) id: RecordId,
    holder: Object<'js>,
}

fn weak_map<'js>(scope: &Scope<'js>) -> rquickjs::Result<Object<'js>> {
    let existing = {
        let state = scope.lock();
        let store = state.shadow.borrow();
        store.map.clone()
    };
    if let Some(map) = existing {
        return map.restore(scope.ctx());
    }

    let map = expect_object(exec(scope, &snippets::NEW_WEAK_MAP, &[])?)?;
    let state = scope.lock();
    state.shadow.borrow_mut().map = Some(Persistent::save(scope.ctx(), map.clone()));
    Ok(map)
}

pub(crate) fn expect_object(value: Value<'_>) -> rquickjs::Result<Object<'_>> {
    value
        .into_object()
        .ok_or_else(|| rquickjs::Error::new_from_js("value", "object"))
}

/// The record of `value`, if it has one
pub(crate) fn lookup<'js>(
    scope: &Scope<'js>,
    value: &Value<'js>,
) -> rquickjs::Result<Option<ShadowHandle<'js>>> {
    if !value.is_object() {
        return Ok(None);
    }
    let map = weak_map(scope)?;
    let found = exec(scope, &snippets::SHADOW_LOOKUP, &[map.into_value(), value.clone()])?;
    let Some(holder) = found.into_object() else {
        return Ok(None);
    };
    let id: i32 = holder.get("id")?;
    Ok(Some(ShadowHandle { id: RecordId(id), holder }))
}

/// The record of `value`, created on first use
pub(crate) fn ensure<'js>(scope: &Scope<'js>, value: &Value<'js>) -> rquickjs::Result<ShadowHandle<'js>> {
    if let Some(handle) = lookup(scope, value)? {
        return Ok(handle);
    }

    let id = {
        let state = scope.lock();
        state.drain_orphans();
        let mut store = state.shadow.borrow_mut();
        store.insert()
    };
    let guard = RecordGuard {
        id,
        isolate: Rc::downgrade(scope.isolate()),
    };
    let token = Function::new(scope.ctx().clone(), move || guard.raw_id())?;

    let map = weak_map(scope)?;
    let holder = expect_object(exec(
        scope,
        &snippets::SHADOW_ATTACH,
        &[
            map.into_value(),
            value.clone(),
            Value::new_int(scope.ctx().clone(), id.0),
            token.into_value(),
        ],
    )?)?;
    tracing::debug!("Created shadow record {:?}", id);
    Ok(ShadowHandle { id, holder })
}

/// Read the Rust half of a record.
///
/// The record must exist: a holder without its record means the store is
/// corrupt.
pub(crate) fn with_record<R>(scope: &Scope<'_>, id: RecordId, f: impl FnOnce(&ShadowRecord) -> R) -> R {
    let state = scope.lock();
    let store = state.shadow.borrow();
    let Some(record) = store.records.get(&id) else {
        panic!("shadow record {:?} missing from the store", id);
    };
    f(record)
}

pub(crate) fn with_record_mut<R>(
    scope: &Scope<'_>,
    id: RecordId,
    f: impl FnOnce(&mut ShadowRecord) -> R,
) -> R {
    let state = scope.lock();
    let mut store = state.shadow.borrow_mut();
    let Some(record) = store.records.get_mut(&id) else {
        panic!("shadow record {:?} missing from the store", id);
    };
    f(record)
}

/// Whether `value` carries the hidden-prototype marker
pub(crate) fn is_hidden<'js>(scope: &Scope<'js>, value: &Value<'js>) -> rquickjs::Result<bool> {
    Ok(match lookup(scope, value)? {
        Some(handle) => with_record(scope, handle.id, |record| record.is_hidden_prototype),
        None => false,
    })
}

impl<'js> ShadowHandle<'js> {
    pub(crate) fn fields(&self) -> rquickjs::Result<Array<'js>> {
        self.holder.get("fields")
    }

    /// Size the internal field array, filling new slots with `undefined`
    pub(crate) fn init_fields(&self, scope: &Scope<'js>, count: usize) -> rquickjs::Result<()> {
        let fields = self.fields()?;
        for index in fields.len()..count {
            fields.set(index, Value::new_undefined(scope.ctx().clone()))?;
        }
        with_record_mut(scope, self.id, |record| record.internal_field_count = count);
        Ok(())
    }

    /// The private-property map, created when `create` is set
    pub(crate) fn private_map(&self, scope: &Scope<'js>, create: bool) -> rquickjs::Result<Option<Object<'js>>> {
        let current: Value = self.holder.get("priv")?;
        if let Some(map) = current.into_object() {
            return Ok(Some(map));
        }
        if !create {
            return Ok(None);
        }
        let map = expect_object(exec(scope, &snippets::NEW_PLAIN_MAP, &[])?)?;
        self.holder.set("priv", map.clone())?;
        Ok(Some(map))
    }

    /// Real object behind a security proxy
    pub(crate) fn security_target(&self) -> rquickjs::Result<Option<Object<'js>>> {
        let target: Value = self.holder.get("security")?;
        Ok(target.into_object())
    }

    pub(crate) fn set_security_target(&self, target: &Object<'js>) -> rquickjs::Result<()> {
        self.holder.set("security", target.clone())
    }

    /// Proxy standing in for this hidden object
    pub(crate) fn hidden_proxy(&self) -> rquickjs::Result<Option<Object<'js>>> {
        let proxy: Value = self.holder.get("hiddenProxy")?;
        Ok(proxy.into_object())
    }

    pub(crate) fn set_hidden_proxy(&self, proxy: &Object<'js>) -> rquickjs::Result<()> {
        self.holder.set("hiddenProxy", proxy.clone())
    }

    /// Register a hidden-prototype child; false when already registered
    pub(crate) fn add_child(&self, scope: &Scope<'js>, child: &Value<'js>) -> rquickjs::Result<bool> {
        let added = exec(
            scope,
            &snippets::CHILDREN_ADD,
            &[self.holder.clone().into_value(), child.clone()],
        )?;
        Ok(added.as_bool().unwrap_or(false))
    }

    /// Live registered children, in registration order
    pub(crate) fn children(&self, scope: &Scope<'js>) -> rquickjs::Result<Vec<Object<'js>>> {
        let list = exec(scope, &snippets::CHILDREN_LIST, &[self.holder.clone().into_value()])?;
        let Some(list) = list.into_array() else {
            return Ok(Vec::new());
        };
        let mut children = Vec::with_capacity(list.len());
        for index in 0..list.len() {
            let child: Value = list.get(index)?;
            if let Some(child) = child.into_object() {
                children.push(child);
            }
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_sequence_non_zero_and_masked() {
        let mut store = ShadowStore::new(1);
        for _ in 0..10_000 {
            let hash = store.next_hash();
            assert!(hash > 0);
            assert!(hash <= 0x3fff_ffff);
        }
    }

    #[test]
    fn test_zero_seed_uses_default() {
        let mut a = ShadowStore::new(0);
        let mut b = ShadowStore::new(DEFAULT_HASH_SEED);
        assert_eq!(a.next_hash(), b.next_hash());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut store = ShadowStore::new(7);
        let a = store.insert();
        let b = store.insert();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert!(store.remove(a));
        assert!(!store.remove(a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_records_created_lazily() {
        let isolate = crate::Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            assert!(lookup(scope, &object.raw()).unwrap().is_none());
            assert_eq!(isolate.stats().shadow_records, 0);

            let first = ensure(scope, &object.raw()).unwrap();
            let second = ensure(scope, &object.raw()).unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(isolate.stats().shadow_records, 1);
        });
    }

    #[test]
    fn test_record_reclaimed_with_object() {
        let isolate = crate::Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            ensure(scope, &object.raw()).unwrap();
        });
        isolate.collect_garbage();
        assert_eq!(isolate.stats().shadow_records, 0);
    }
}
