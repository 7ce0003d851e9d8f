//! Native callback frames
//!
//! Embedder callbacks receive an info object built from [`ImplicitArgs`]
//! instead of a host call frame. The info owns the callback's scope, so
//! bridge calls made from inside a callback go through `info.scope()`.

use std::cell::RefCell;

use rquickjs::Value;

use crate::value::{ObjectRef, ValueRef};
use crate::Scope;

/// Getter installed by `ObjectRef::set_accessor`
pub type AccessorNameGetterCallback = for<'js> fn(ValueRef<'js>, &PropertyCallbackInfo<'js>);

/// Setter installed by `ObjectRef::set_accessor`
pub type AccessorNameSetterCallback = for<'js> fn(ValueRef<'js>, ValueRef<'js>, &PropertyCallbackInfo<'js>);

/// Call handler of a callable object template
pub type FunctionCallback = for<'js> fn(&FunctionCallbackInfo<'js>);

/// Frame data handed to an accessor callback
#[derive(Debug, Clone)]
pub struct ImplicitArgs<'js> {
    pub should_throw: bool,
    pub holder: ValueRef<'js>,
    pub isolate_id: u32,
    pub data: ValueRef<'js>,
    pub this: ValueRef<'js>,
}

/// Settable result slot of a callback
pub struct ReturnValue<'a, 'js> {
    slot: &'a RefCell<Option<Value<'js>>>,
    scope: &'a Scope<'js>,
}

impl<'js> ReturnValue<'_, 'js> {
    pub fn set(&self, value: &ValueRef<'js>) {
        *self.slot.borrow_mut() = Some(value.host().clone());
    }

    pub fn set_bool(&self, value: bool) {
        self.set(&self.scope.boolean(value));
    }

    pub fn set_int(&self, value: i32) {
        self.set(&self.scope.integer(value));
    }

    pub fn set_double(&self, value: f64) {
        self.set(&self.scope.number(value));
    }

    pub fn set_undefined(&self) {
        self.set(&self.scope.undefined());
    }

    pub fn set_null(&self) {
        self.set(&self.scope.null());
    }

    /// Current value; `undefined` until set
    pub fn get(&self) -> ValueRef<'js> {
        match &*self.slot.borrow() {
            Some(value) => ValueRef::from_host(value.clone()),
            None => self.scope.undefined(),
        }
    }
}

/// Info passed to accessor getters and setters
pub struct PropertyCallbackInfo<'js> {
    scope: Scope<'js>,
    implicit: ImplicitArgs<'js>,
    return_value: RefCell<Option<Value<'js>>>,
}

impl<'js> PropertyCallbackInfo<'js> {
    pub(crate) fn new(scope: Scope<'js>, implicit: ImplicitArgs<'js>) -> Self {
        Self {
            scope,
            implicit,
            return_value: RefCell::new(None),
        }
    }

    pub fn scope(&self) -> &Scope<'js> {
        &self.scope
    }

    /// The receiver of the property access
    pub fn this(&self) -> &ValueRef<'js> {
        &self.implicit.this
    }

    /// The object the accessor was installed on, or the object that
    /// satisfied its signature
    pub fn holder(&self) -> Option<ObjectRef<'js>> {
        self.implicit.holder.as_object()
    }

    pub fn data(&self) -> &ValueRef<'js> {
        &self.implicit.data
    }

    pub fn should_throw_on_error(&self) -> bool {
        self.implicit.should_throw
    }

    pub fn isolate_id(&self) -> u32 {
        self.implicit.isolate_id
    }

    pub fn get_return_value(&self) -> ReturnValue<'_, 'js> {
        ReturnValue {
            slot: &self.return_value,
            scope: &self.scope,
        }
    }

    pub(crate) fn take_return_value(&self) -> Option<Value<'js>> {
        self.return_value.borrow_mut().take()
    }
}

/// Info passed to function callbacks
pub struct FunctionCallbackInfo<'js> {
    scope: Scope<'js>,
    this: ValueRef<'js>,
    arguments: Vec<ValueRef<'js>>,
    data: ValueRef<'js>,
    is_construct_call: bool,
    return_value: RefCell<Option<Value<'js>>>,
}

impl<'js> FunctionCallbackInfo<'js> {
    pub(crate) fn new(
        scope: Scope<'js>,
        this: ValueRef<'js>,
        arguments: Vec<ValueRef<'js>>,
        data: ValueRef<'js>,
        is_construct_call: bool,
    ) -> Self {
        Self {
            scope,
            this,
            arguments,
            data,
            is_construct_call,
            return_value: RefCell::new(None),
        }
    }

    pub fn scope(&self) -> &Scope<'js> {
        &self.scope
    }

    pub fn length(&self) -> usize {
        self.arguments.len()
    }

    /// Argument `index`; `undefined` past the end
    pub fn get(&self, index: usize) -> ValueRef<'js> {
        self.arguments
            .get(index)
            .cloned()
            .unwrap_or_else(|| self.scope.undefined())
    }

    pub fn this(&self) -> &ValueRef<'js> {
        &self.this
    }

    pub fn data(&self) -> &ValueRef<'js> {
        &self.data
    }

    pub fn is_construct_call(&self) -> bool {
        self.is_construct_call
    }

    pub fn get_return_value(&self) -> ReturnValue<'_, 'js> {
        ReturnValue {
            slot: &self.return_value,
            scope: &self.scope,
        }
    }

    pub(crate) fn take_return_value(&self) -> Option<Value<'js>> {
        self.return_value.borrow_mut().take()
    }
}
