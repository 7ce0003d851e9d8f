//! Value Reference Layer
//!
//! Handles over host values. They borrow the host's own reference counting
//! and never outlive the scope they were produced in; use
//! [`crate::Scope::protect`] to keep a value beyond it.

use std::ffi::c_void;

use rquickjs::{Array, Object, Value};

use crate::exec::exec;
use crate::shadow;
use crate::snippets;
use crate::{ExceptionChannel, Scope};

/// Result of a fallible bridge operation; `None` means the operation
/// produced nothing (check the scope's `TryCatch` for an exception).
pub type Maybe<T> = Option<T>;

/// Handle to any host value
#[derive(Debug, Clone)]
pub struct ValueRef<'js> {
    value: Value<'js>,
}

impl<'js> ValueRef<'js> {
    pub fn from_host(value: Value<'js>) -> Self {
        Self { value }
    }

    pub fn host(&self) -> &Value<'js> {
        &self.value
    }

    pub fn into_host(self) -> Value<'js> {
        self.value
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_undefined()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn is_null_or_undefined(&self) -> bool {
        self.is_null() || self.is_undefined()
    }

    pub fn is_boolean(&self) -> bool {
        self.value.is_bool()
    }

    pub fn is_number(&self) -> bool {
        self.value.is_number()
    }

    pub fn is_string(&self) -> bool {
        self.value.is_string()
    }

    pub fn is_symbol(&self) -> bool {
        self.value.is_symbol()
    }

    pub fn is_object(&self) -> bool {
        self.value.is_object()
    }

    pub fn is_function(&self) -> bool {
        self.value.is_function()
    }

    pub fn is_array(&self) -> bool {
        self.value.is_array()
    }

    pub fn as_object(&self) -> Option<ObjectRef<'js>> {
        self.value.clone().into_object().map(ObjectRef::from_host)
    }

    pub fn as_array(&self) -> Option<ArrayRef<'js>> {
        self.value.clone().into_array().map(ArrayRef::from_host)
    }

    pub fn boolean_value(&self) -> Option<bool> {
        self.value.as_bool()
    }

    pub fn number_value(&self) -> Option<f64> {
        self.value
            .as_int()
            .map(f64::from)
            .or_else(|| self.value.as_float())
    }

    /// Integer view of a number that has an exact `i32` representation
    pub fn int32_value(&self) -> Option<i32> {
        if let Some(int) = self.value.as_int() {
            return Some(int);
        }
        let float = self.value.as_float()?;
        let int = float as i32;
        (f64::from(int) == float).then_some(int)
    }

    /// Contents of a string value
    pub fn to_rust_string(&self) -> Option<String> {
        self.value.as_string()?.to_string().ok()
    }

    /// `===` comparison; an absent operand compares as `null`
    pub fn strict_equals(&self, scope: &Scope<'js>, other: Option<&ValueRef<'js>>) -> bool {
        let other = other.map_or_else(|| scope.null(), Clone::clone);
        let _lock = scope.lock();
        let mut channel = ExceptionChannel::new(scope);
        channel
            .check(exec(scope, &snippets::STRICT_EQUALS, &[self.value.clone(), other.value]))
            .and_then(|result| result.as_bool())
            .unwrap_or(false)
    }
}

/// Handle to a host object
#[derive(Debug, Clone)]
pub struct ObjectRef<'js> {
    object: Object<'js>,
}

impl<'js> ObjectRef<'js> {
    /// A new empty plain object
    pub fn new(scope: &Scope<'js>) -> Maybe<Self> {
        let _lock = scope.lock();
        let mut channel = ExceptionChannel::new(scope);
        channel.check(Object::new(scope.ctx().clone())).map(Self::from_host)
    }

    pub fn from_host(object: Object<'js>) -> Self {
        Self { object }
    }

    pub fn host(&self) -> &Object<'js> {
        &self.object
    }

    pub fn as_value(&self) -> ValueRef<'js> {
        ValueRef::from_host(self.raw())
    }

    pub(crate) fn raw(&self) -> Value<'js> {
        self.object.as_value().clone()
    }

    pub fn strict_equals(&self, scope: &Scope<'js>, other: &ObjectRef<'js>) -> bool {
        self.as_value().strict_equals(scope, Some(&other.as_value()))
    }
}

impl<'js> From<ObjectRef<'js>> for ValueRef<'js> {
    fn from(object: ObjectRef<'js>) -> Self {
        object.as_value()
    }
}

/// Handle to a host array
#[derive(Debug, Clone)]
pub struct ArrayRef<'js> {
    array: Array<'js>,
}

impl<'js> ArrayRef<'js> {
    pub fn new(scope: &Scope<'js>, elements: &[ValueRef<'js>]) -> Maybe<Self> {
        let _lock = scope.lock();
        let mut channel = ExceptionChannel::new(scope);
        let array = channel.check(Array::new(scope.ctx().clone()))?;
        for (index, element) in elements.iter().enumerate() {
            channel.check(array.set(index, element.host().clone()))?;
        }
        Some(Self { array })
    }

    pub(crate) fn from_host(array: Array<'js>) -> Self {
        Self { array }
    }

    pub(crate) fn from_value(value: Value<'js>) -> rquickjs::Result<Self> {
        value
            .into_array()
            .map(Self::from_host)
            .ok_or_else(|| rquickjs::Error::new_from_js("value", "array"))
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`; holes and reads past the end are `undefined`
    pub fn get(&self, index: usize) -> Option<ValueRef<'js>> {
        self.array.get::<Value>(index).ok().map(ValueRef::from_host)
    }

    pub fn to_vec(&self) -> Vec<ValueRef<'js>> {
        (0..self.len()).filter_map(|index| self.get(index)).collect()
    }

    /// String elements, in order; other elements are skipped
    pub fn to_strings(&self) -> Vec<String> {
        self.to_vec().iter().filter_map(ValueRef::to_rust_string).collect()
    }

    pub fn as_value(&self) -> ValueRef<'js> {
        ValueRef::from_host(self.raw())
    }

    pub(crate) fn raw(&self) -> Value<'js> {
        self.array.as_value().clone()
    }
}

/// Key of a private property: a unique host symbol never exposed as an
/// ordinary property key of the annotated object
#[derive(Debug, Clone)]
pub struct Private<'js> {
    symbol: Value<'js>,
}

impl<'js> Private<'js> {
    pub fn new(scope: &Scope<'js>, name: &str) -> Maybe<Self> {
        let name = scope.string(name)?;
        let _lock = scope.lock();
        let mut channel = ExceptionChannel::new(scope);
        channel
            .check(exec(scope, &snippets::NEW_PRIVATE, &[name.into_host()]))
            .map(|symbol| Self { symbol })
    }

    pub(crate) fn key(&self) -> &Value<'js> {
        &self.symbol
    }
}

/// Opaque host object carrying a raw embedder pointer
#[derive(Debug, Clone)]
pub struct External<'js> {
    object: ObjectRef<'js>,
}

impl<'js> External<'js> {
    pub fn new(scope: &Scope<'js>, pointer: *mut c_void) -> Maybe<Self> {
        let _lock = scope.lock();
        let mut channel = ExceptionChannel::new(scope);
        let value = channel.check(exec(scope, &snippets::NEW_EXTERNAL, &[]))?;
        let handle = channel.check(shadow::ensure(scope, &value))?;
        shadow::with_record_mut(scope, handle.id, |record| record.external = Some(pointer));
        let object = value.into_object().map(ObjectRef::from_host)?;
        Some(Self { object })
    }

    /// View `value` as an external, when it is one
    pub fn cast(scope: &Scope<'js>, value: &ValueRef<'js>) -> Option<Self> {
        let _lock = scope.lock();
        let handle = shadow::lookup(scope, value.host()).ok().flatten()?;
        let is_external = shadow::with_record(scope, handle.id, |record| record.external.is_some());
        if !is_external {
            return None;
        }
        value.as_object().map(|object| Self { object })
    }

    pub fn value(&self, scope: &Scope<'js>) -> *mut c_void {
        let _lock = scope.lock();
        match shadow::lookup(scope, &self.object.raw()) {
            Ok(Some(handle)) => shadow::with_record(scope, handle.id, |record| {
                record.external.unwrap_or(std::ptr::null_mut())
            }),
            _ => std::ptr::null_mut(),
        }
    }

    pub fn as_value(&self) -> ValueRef<'js> {
        self.object.as_value()
    }
}

#[cfg(test)]
mod tests {
    use crate::Isolate;

    #[test]
    fn test_primitive_views() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            assert_eq!(scope.integer(7).int32_value(), Some(7));
            assert_eq!(scope.number(2.5).number_value(), Some(2.5));
            assert_eq!(scope.number(3.0).int32_value(), Some(3));
            assert_eq!(scope.number(3.5).int32_value(), None);
            assert_eq!(scope.boolean(true).boolean_value(), Some(true));
            assert!(scope.undefined().is_null_or_undefined());
            assert_eq!(scope.string("hi").unwrap().to_rust_string().as_deref(), Some("hi"));
        });
    }

    #[test]
    fn test_strict_equals_absent_is_null() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            assert!(scope.null().strict_equals(scope, None));
            assert!(!scope.undefined().strict_equals(scope, None));
            let a = scope.new_object().unwrap();
            let b = scope.new_object().unwrap();
            assert!(a.strict_equals(scope, &a.clone()));
            assert!(!a.strict_equals(scope, &b));
        });
    }

    #[test]
    fn test_external_round_trip() {
        let isolate = Isolate::with_defaults().unwrap();
        let mut payload = 17u64;
        let pointer = (&mut payload as *mut u64).cast();
        isolate.enter(|scope| {
            let external = crate::External::new(scope, pointer).unwrap();
            assert_eq!(external.value(scope), pointer);

            let value = external.as_value();
            let cast = crate::External::cast(scope, &value).unwrap();
            assert_eq!(cast.value(scope), pointer);

            let plain = scope.new_object().unwrap().as_value();
            assert!(crate::External::cast(scope, &plain).is_none());
        });
    }

    #[test]
    fn test_array_views() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let a = scope.string("a").unwrap();
            let b = scope.string("b").unwrap();
            let array = scope.new_array(&[a, b]).unwrap();
            assert_eq!(array.len(), 2);
            assert_eq!(array.to_strings(), vec!["a".to_string(), "b".to_string()]);
            assert!(array.get(5).unwrap().is_undefined());
        });
    }
}
