//! Property Bridge
//!
//! Get/set/has/delete/define and key enumeration on [`ObjectRef`].
//! Indexed variants convert the index to its string key and take the named
//! path.

use rquickjs::Value;

use crate::exception::bridged;
use crate::exec::exec;
use crate::value::{ArrayRef, Maybe, ObjectRef, ValueRef};
use crate::{hidden, shadow, snippets};
use crate::{IndexFilter, KeyCollectionMode, PropertyAttribute, PropertyDescriptor, PropertyFilter, Scope};

/// String form of an array index
pub(crate) fn index_key<'js>(scope: &Scope<'js>, index: u32) -> rquickjs::Result<Value<'js>> {
    rquickjs::String::from_str(scope.ctx().clone(), &index.to_string()).map(|key| key.into_value())
}

pub(crate) fn str_key<'js>(scope: &Scope<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
    rquickjs::String::from_str(scope.ctx().clone(), name).map(|key| key.into_value())
}

fn truthy(value: Value<'_>) -> bool {
    value.as_bool().unwrap_or(false)
}

impl<'js> ObjectRef<'js> {
    // ========================================================================
    // Get / Set
    // ========================================================================

    /// `obj[key]`; a missing property is `undefined`, not an error
    pub fn get(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<ValueRef<'js>> {
        self.get_key(scope, Ok(key.host().clone()))
    }

    pub fn get_index(&self, scope: &Scope<'js>, index: u32) -> Maybe<ValueRef<'js>> {
        self.get_key(scope, index_key(scope, index))
    }

    pub fn get_str(&self, scope: &Scope<'js>, name: &str) -> Maybe<ValueRef<'js>> {
        self.get_key(scope, str_key(scope, name))
    }

    fn get_key(&self, scope: &Scope<'js>, key: rquickjs::Result<Value<'js>>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            let key = channel.check(key)?;
            channel
                .check(exec(scope, &snippets::GET, &[self.raw(), key]))
                .map(ValueRef::from_host)
        })
    }

    /// Assign `obj[key] = value`.
    ///
    /// `Some(false)` when the host refuses the write without throwing
    /// (frozen object, read-only property, setter-less accessor).
    pub fn set(&self, scope: &Scope<'js>, key: &ValueRef<'js>, value: &ValueRef<'js>) -> Maybe<bool> {
        self.set_key(scope, Ok(key.host().clone()), value)
    }

    pub fn set_index(&self, scope: &Scope<'js>, index: u32, value: &ValueRef<'js>) -> Maybe<bool> {
        self.set_key(scope, index_key(scope, index), value)
    }

    pub fn set_str(&self, scope: &Scope<'js>, name: &str, value: &ValueRef<'js>) -> Maybe<bool> {
        self.set_key(scope, str_key(scope, name), value)
    }

    fn set_key(
        &self,
        scope: &Scope<'js>,
        key: rquickjs::Result<Value<'js>>,
        value: &ValueRef<'js>,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let key = channel.check(key)?;
            let args = [self.raw(), key.clone(), value.host().clone()];
            let stored = truthy(channel.check(exec(scope, &snippets::SET, &args))?);
            if stored {
                channel.check(hidden::after_define(scope, &self.raw(), &key))?;
            }
            Some(stored)
        })
    }

    // ========================================================================
    // Define
    // ========================================================================

    /// Define a writable, enumerable, configurable data property
    pub fn create_data_property(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
        value: &ValueRef<'js>,
    ) -> Maybe<bool> {
        self.define_own_property(scope, key, value, PropertyAttribute::NONE)
    }

    pub fn create_data_property_index(
        &self,
        scope: &Scope<'js>,
        index: u32,
        value: &ValueRef<'js>,
    ) -> Maybe<bool> {
        self.define_own_key(scope, index_key(scope, index), value, PropertyAttribute::NONE)
    }

    /// Define a data property with attribute bits
    pub fn define_own_property(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
        value: &ValueRef<'js>,
        attributes: PropertyAttribute,
    ) -> Maybe<bool> {
        self.define_own_key(scope, Ok(key.host().clone()), value, attributes)
    }

    fn define_own_key(
        &self,
        scope: &Scope<'js>,
        key: rquickjs::Result<Value<'js>>,
        value: &ValueRef<'js>,
        attributes: PropertyAttribute,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let key = channel.check(key)?;
            let bits = Value::new_int(scope.ctx().clone(), i32::from(attributes.bits()));
            let args = [self.raw(), key.clone(), value.host().clone(), bits];
            let defined = truthy(channel.check(exec(scope, &snippets::DEFINE_OWN, &args))?);
            if defined {
                channel.check(hidden::after_define(scope, &self.raw(), &key))?;
            }
            Some(defined)
        })
    }

    /// Replace any own `key` with a property built from `descriptor`.
    ///
    /// A rejected definition is `Some(false)` and leaves no exception.
    pub fn define_property(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
        descriptor: &PropertyDescriptor<'js>,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let host = channel.check(descriptor.to_host(scope))?;
            let args = [self.raw(), key.host().clone(), host.into_value()];
            let defined = truthy(channel.check(exec(scope, &snippets::DEFINE_DESCRIPTOR, &args))?);
            if defined {
                channel.check(hidden::after_define(scope, &self.raw(), key.host()))?;
            }
            Some(defined)
        })
    }

    // ========================================================================
    // Has / Delete
    // ========================================================================

    /// `key in obj`
    pub fn has(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<bool> {
        self.test_key(scope, &snippets::HAS, Ok(key.host().clone()))
    }

    pub fn has_index(&self, scope: &Scope<'js>, index: u32) -> Maybe<bool> {
        self.test_key(scope, &snippets::HAS, index_key(scope, index))
    }

    pub fn has_own_property(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<bool> {
        self.test_key(scope, &snippets::HAS_OWN, Ok(key.host().clone()))
    }

    pub fn has_own_property_index(&self, scope: &Scope<'js>, index: u32) -> Maybe<bool> {
        self.test_key(scope, &snippets::HAS_OWN, index_key(scope, index))
    }

    pub fn delete(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<bool> {
        self.test_key(scope, &snippets::DELETE, Ok(key.host().clone()))
    }

    pub fn delete_index(&self, scope: &Scope<'js>, index: u32) -> Maybe<bool> {
        self.test_key(scope, &snippets::DELETE, index_key(scope, index))
    }

    /// Own descriptor check on the real object behind any security proxy
    pub fn has_real_named_property(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<bool> {
        self.test_real_key(scope, Ok(key.host().clone()))
    }

    pub fn has_real_indexed_property(&self, scope: &Scope<'js>, index: u32) -> Maybe<bool> {
        self.test_real_key(scope, index_key(scope, index))
    }

    fn test_key(
        &self,
        scope: &Scope<'js>,
        snippet: &crate::exec::Snippet,
        key: rquickjs::Result<Value<'js>>,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let key = channel.check(key)?;
            channel.check(exec(scope, snippet, &[self.raw(), key])).map(truthy)
        })
    }

    fn test_real_key(&self, scope: &Scope<'js>, key: rquickjs::Result<Value<'js>>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let key = channel.check(key)?;
            let target = channel.check(self.real_target(scope))?;
            channel
                .check(exec(scope, &snippets::HAS_REAL_NAMED, &[target, key]))
                .map(truthy)
        })
    }

    /// This object, or the object a security proxy stands in front of
    pub(crate) fn real_target(&self, scope: &Scope<'js>) -> rquickjs::Result<Value<'js>> {
        if let Some(handle) = shadow::lookup(scope, &self.raw())? {
            if let Some(target) = handle.security_target()? {
                return Ok(target.into_value());
            }
        }
        Ok(self.raw())
    }

    // ========================================================================
    // Key enumeration
    // ========================================================================

    /// `Object.getOwnPropertyNames(obj)`
    pub fn own_property_names(&self, scope: &Scope<'js>) -> Maybe<ArrayRef<'js>> {
        bridged(scope, |channel| {
            let names = channel.check(exec(scope, &snippets::OWN_NAMES, &[self.raw()]))?;
            channel.check(ArrayRef::from_value(names))
        })
    }

    /// Own keys passing `filter`: strings first, then symbols
    pub fn get_own_property_names(&self, scope: &Scope<'js>, filter: PropertyFilter) -> Maybe<ArrayRef<'js>> {
        bridged(scope, |channel| {
            let keys = channel.check(own_keys(scope, &self.raw(), filter))?;
            channel.check(ArrayRef::from_value(keys))
        })
    }

    /// The keys a `for-in` loop over this object visits
    pub fn get_property_names(&self, scope: &Scope<'js>) -> Maybe<ArrayRef<'js>> {
        bridged(scope, |channel| {
            let keys = channel.check(exec(scope, &snippets::FOR_IN_KEYS, &[self.raw()]))?;
            channel.check(ArrayRef::from_value(keys))
        })
    }

    /// Filtered keys of this object and, per `mode`, of every prototype;
    /// a key shadowed further down the chain is listed once
    pub fn get_property_names_with(
        &self,
        scope: &Scope<'js>,
        mode: KeyCollectionMode,
        filter: PropertyFilter,
        index_filter: IndexFilter,
    ) -> Maybe<ArrayRef<'js>> {
        bridged(scope, |channel| {
            let mut keys = channel.check(own_keys(scope, &self.raw(), filter))?;
            if mode == KeyCollectionMode::IncludePrototypes {
                let mut proto = channel.check(exec(scope, &snippets::GET_PROTO, &[self.raw()]))?;
                while proto.is_object() {
                    let more = channel.check(own_keys(scope, &proto, filter))?;
                    keys = channel.check(exec(scope, &snippets::CONCAT, &[keys, more]))?;
                    proto = channel.check(exec(scope, &snippets::GET_PROTO, &[proto]))?;
                }
                // Forwarded keys of hidden prototypes show up on both sides
                keys = channel.check(exec(scope, &snippets::UNIQUE_KEYS, &[keys]))?;
            }
            if index_filter == IndexFilter::SkipIndices {
                keys = channel.check(exec(scope, &snippets::SKIP_INDICES, &[keys]))?;
            }
            channel.check(ArrayRef::from_value(keys))
        })
    }

    // ========================================================================
    // Attributes and descriptors
    // ========================================================================

    /// Attributes of `key` found on this object or its chain; `NONE` when
    /// the key is absent everywhere
    pub fn get_property_attributes(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<PropertyAttribute> {
        bridged(scope, |channel| {
            let bits = channel.check(attribute_bits(scope, &self.raw(), key.host()))?;
            Some(bits.unwrap_or(PropertyAttribute::NONE))
        })
    }

    /// Attributes from real descriptors only, starting behind any security
    /// proxy; `None` without an exception when the key is absent
    pub fn get_real_named_property_attributes(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
    ) -> Maybe<PropertyAttribute> {
        bridged(scope, |channel| {
            let target = channel.check(self.real_target(scope))?;
            channel.check(attribute_bits(scope, &target, key.host()))?
        })
    }

    pub fn get_real_named_property_attributes_in_prototype_chain(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
    ) -> Maybe<PropertyAttribute> {
        let proto = self.get_prototype(scope)?.as_object()?;
        proto.get_real_named_property_attributes(scope, key)
    }

    /// Value of `key` from real descriptors only.
    ///
    /// Accessors run their getter with this object as receiver. Nothing is
    /// found: `None` with no exception.
    pub fn get_real_named_property(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            let target = channel.check(self.real_target(scope))?;
            let args = [target, key.host().clone(), self.raw()];
            let found = channel.check(exec(scope, &snippets::GET_REAL_NAMED, &args))?;
            let found = channel.check(ArrayRef::from_value(found))?;
            if found.is_empty() {
                return None;
            }
            found.get(0)
        })
    }

    pub fn get_real_named_property_in_prototype_chain(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
    ) -> Maybe<ValueRef<'js>> {
        let proto = self.get_prototype(scope)?.as_object()?;
        proto.get_real_named_property(scope, key)
    }

    /// The own descriptor object of `key`, or `undefined`
    pub fn get_own_property_descriptor(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            channel
                .check(exec(scope, &snippets::GET_OWN_DESCRIPTOR, &[self.raw(), key.host().clone()]))
                .map(ValueRef::from_host)
        })
    }
}

fn own_keys<'js>(scope: &Scope<'js>, object: &Value<'js>, filter: PropertyFilter) -> rquickjs::Result<Value<'js>> {
    let bits = Value::new_int(scope.ctx().clone(), i32::from(filter.bits()));
    exec(scope, &snippets::OWN_KEYS_FILTERED, &[object.clone(), bits])
}

/// Attribute bits of the first descriptor for `key` on the chain from `start`
fn attribute_bits<'js>(
    scope: &Scope<'js>,
    start: &Value<'js>,
    key: &Value<'js>,
) -> rquickjs::Result<Option<PropertyAttribute>> {
    let bits = exec(scope, &snippets::ATTRIBUTES, &[start.clone(), key.clone()])?;
    Ok(match bits.as_int() {
        Some(bits) if bits >= 0 => Some(PropertyAttribute::from_bits_truncate(bits as u8)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use crate::{Isolate, PropertyAttribute, TryCatch};

    #[test]
    fn test_get_missing_is_undefined() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            let try_catch = TryCatch::new(scope);
            let value = object.get_str(scope, "absent").unwrap();
            assert!(value.is_undefined());
            assert!(!try_catch.has_caught());
        });
    }

    #[test]
    fn test_indexed_access_uses_string_keys() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            assert_eq!(object.set_index(scope, 3, &scope.integer(9)), Some(true));
            let named = scope.string("3").unwrap();
            assert_eq!(object.get(scope, &named).unwrap().int32_value(), Some(9));
            assert_eq!(object.has_index(scope, 3), Some(true));
            assert_eq!(object.has_own_property_index(scope, 3), Some(true));
            assert_eq!(object.delete_index(scope, 3), Some(true));
            assert_eq!(object.has_index(scope, 3), Some(false));
        });
    }

    #[test]
    fn test_delete_non_configurable_is_false() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            let key = scope.string("fixed").unwrap();
            object
                .define_own_property(scope, &key, &scope.integer(1), PropertyAttribute::DONT_DELETE)
                .unwrap();
            let try_catch = TryCatch::new(scope);
            assert_eq!(object.delete(scope, &key), Some(false));
            assert!(!try_catch.has_caught());
        });
    }

    #[test]
    fn test_absent_attributes() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            let key = scope.string("nowhere").unwrap();
            assert_eq!(object.get_property_attributes(scope, &key), Some(PropertyAttribute::NONE));

            let try_catch = TryCatch::new(scope);
            assert_eq!(object.get_real_named_property_attributes(scope, &key), None);
            assert!(object.get_real_named_property(scope, &key).is_none());
            assert!(!try_catch.has_caught());
        });
    }
}
