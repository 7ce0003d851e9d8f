//! Property descriptors
//!
//! Only fields explicitly set are emitted into the host descriptor object,
//! so a descriptor with no `writable` leaves the host default in place.

use rquickjs::Object;

use crate::exec::exec;
use crate::value::ValueRef;
use crate::{shadow, snippets, Scope};

/// Descriptor for `ObjectRef::define_property`
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor<'js> {
    value: Option<ValueRef<'js>>,
    get: Option<ValueRef<'js>>,
    set: Option<ValueRef<'js>>,
    writable: Option<bool>,
    enumerable: Option<bool>,
    configurable: Option<bool>,
}

impl<'js> PropertyDescriptor<'js> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data descriptor with only a value
    pub fn with_value(value: ValueRef<'js>) -> Self {
        Self { value: Some(value), ..Self::default() }
    }

    /// Data descriptor with a value and writability
    pub fn with_value_writable(value: ValueRef<'js>, writable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            ..Self::default()
        }
    }

    /// Accessor descriptor; either side may be `undefined`
    pub fn with_accessors(get: ValueRef<'js>, set: ValueRef<'js>) -> Self {
        Self {
            get: Some(get),
            set: Some(set),
            ..Self::default()
        }
    }

    pub fn set_enumerable(&mut self, enumerable: bool) -> &mut Self {
        self.enumerable = Some(enumerable);
        self
    }

    pub fn set_configurable(&mut self, configurable: bool) -> &mut Self {
        self.configurable = Some(configurable);
        self
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&ValueRef<'js>> {
        self.value.as_ref()
    }

    pub fn has_get(&self) -> bool {
        self.get.is_some()
    }

    pub fn get(&self) -> Option<&ValueRef<'js>> {
        self.get.as_ref()
    }

    pub fn has_set(&self) -> bool {
        self.set.is_some()
    }

    pub fn set(&self) -> Option<&ValueRef<'js>> {
        self.set.as_ref()
    }

    pub fn has_writable(&self) -> bool {
        self.writable.is_some()
    }

    pub fn writable(&self) -> Option<bool> {
        self.writable
    }

    pub fn has_enumerable(&self) -> bool {
        self.enumerable.is_some()
    }

    pub fn enumerable(&self) -> Option<bool> {
        self.enumerable
    }

    pub fn has_configurable(&self) -> bool {
        self.configurable.is_some()
    }

    pub fn configurable(&self) -> Option<bool> {
        self.configurable
    }

    /// Build the host descriptor object, without a prototype so inherited
    /// fields cannot leak into the definition
    pub(crate) fn to_host(&self, scope: &Scope<'js>) -> rquickjs::Result<Object<'js>> {
        let descriptor = shadow::expect_object(exec(scope, &snippets::NEW_PLAIN_MAP, &[])?)?;
        if let Some(value) = &self.value {
            descriptor.set("value", value.host().clone())?;
        }
        if let Some(get) = &self.get {
            descriptor.set("get", get.host().clone())?;
        }
        if let Some(set) = &self.set {
            descriptor.set("set", set.host().clone())?;
        }
        if let Some(writable) = self.writable {
            descriptor.set("writable", writable)?;
        }
        if let Some(enumerable) = self.enumerable {
            descriptor.set("enumerable", enumerable)?;
        }
        if let Some(configurable) = self.configurable {
            descriptor.set("configurable", configurable)?;
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Isolate, PropertyAttribute};

    #[test]
    fn test_only_present_fields_emitted() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let mut descriptor = PropertyDescriptor::with_value(scope.integer(1));
            descriptor.set_enumerable(false);
            let host = descriptor.to_host(scope).unwrap();

            assert!(host.contains_key("value").unwrap());
            assert!(host.contains_key("enumerable").unwrap());
            assert!(!host.contains_key("writable").unwrap());
            assert!(!host.contains_key("get").unwrap());
            assert!(!host.contains_key("configurable").unwrap());
        });
    }

    #[test]
    fn test_inherited_fields_ignored() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            scope.run_script("Object.prototype.writable = true; Object.prototype.enumerable = true").unwrap();
            let object = scope.new_object().unwrap();
            let key = scope.string("sealed").unwrap();

            let descriptor = PropertyDescriptor::with_value(scope.integer(1));
            assert_eq!(object.define_property(scope, &key, &descriptor), Some(true));
            assert_eq!(
                object.get_property_attributes(scope, &key),
                Some(PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_ENUM | PropertyAttribute::DONT_DELETE)
            );

            let other = scope.string("plain").unwrap();
            object.define_own_property(scope, &other, &scope.integer(2), PropertyAttribute::READ_ONLY).unwrap();
            assert_eq!(object.get_property_attributes(scope, &other), Some(PropertyAttribute::READ_ONLY));
        });
    }
}
