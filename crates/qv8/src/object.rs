//! Object operations
//!
//! Internal fields, private properties, identity hashes and the call and
//! integrity helpers of [`ObjectRef`]. Everything that needs per-object
//! metadata goes through the shadow store and creates the record lazily.

use std::ffi::c_void;

use rquickjs::{Array, Value};

use crate::exception::bridged;
use crate::exec::exec;
use crate::shadow::{self, EMBEDDER_POINTER_SLOTS};
use crate::template::FunctionTemplate;
use crate::value::{Maybe, ObjectRef, ValueRef};
use crate::{snippets, External, IntegrityLevel, Private, Scope};

impl<'js> ObjectRef<'js> {
    // ========================================================================
    // Internal fields
    // ========================================================================

    /// Number of internal fields; zero for objects not built from a template
    pub fn internal_field_count(&self, scope: &Scope<'js>) -> usize {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::lookup(scope, &self.raw()))??;
            Some(shadow::with_record(scope, handle.id, |record| record.internal_field_count))
        })
        .unwrap_or(0)
    }

    /// Value of internal field `index`; empty when out of range
    pub fn get_internal_field(&self, scope: &Scope<'js>, index: usize) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::lookup(scope, &self.raw()))??;
            let count = shadow::with_record(scope, handle.id, |record| record.internal_field_count);
            if index >= count {
                tracing::warn!("Internal field {} read out of range ({} fields)", index, count);
                return None;
            }
            let fields = channel.check(handle.fields())?;
            channel.check(fields.get::<Value>(index)).map(ValueRef::from_host)
        })
    }

    /// Store `value` in internal field `index`.
    ///
    /// Out-of-range writes are ignored and never create a record.
    pub fn set_internal_field(&self, scope: &Scope<'js>, index: usize, value: &ValueRef<'js>) {
        bridged(scope, |channel| {
            let fields = channel.check(self.field_slots(scope, index))??;
            channel.check(fields.set(index, value.host().clone()))
        });
    }

    /// Store a raw pointer in internal field `index`.
    ///
    /// The field holds an [`External`]; the first two fields also keep the
    /// pointer on the record for direct reads.
    pub fn set_aligned_pointer_in_internal_field(&self, scope: &Scope<'js>, index: usize, pointer: *mut c_void) {
        bridged(scope, |channel| {
            let fields = channel.check(self.field_slots(scope, index))??;
            let external = External::new(scope, pointer)?;
            channel.check(fields.set(index, external.as_value().into_host()))?;
            if index < EMBEDDER_POINTER_SLOTS {
                let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
                shadow::with_record_mut(scope, handle.id, |record| record.embedder_pointers[index] = pointer);
            }
            Some(())
        });
    }

    /// Batch form of [`ObjectRef::set_aligned_pointer_in_internal_field`]
    pub fn set_aligned_pointer_in_internal_fields(&self, scope: &Scope<'js>, entries: &[(usize, *mut c_void)]) {
        for &(index, pointer) in entries {
            self.set_aligned_pointer_in_internal_field(scope, index, pointer);
        }
    }

    /// Pointer stored by `set_aligned_pointer_in_internal_field`; null when
    /// the field holds anything else
    pub fn get_aligned_pointer_from_internal_field(&self, scope: &Scope<'js>, index: usize) -> *mut c_void {
        let fast = bridged(scope, |channel| {
            let handle = channel.check(shadow::lookup(scope, &self.raw()))??;
            shadow::with_record(scope, handle.id, |record| {
                (index < EMBEDDER_POINTER_SLOTS && index < record.internal_field_count)
                    .then(|| record.embedder_pointers[index])
                    .filter(|pointer| !pointer.is_null())
            })
        });
        if let Some(pointer) = fast {
            return pointer;
        }

        self.get_internal_field(scope, index)
            .and_then(|field| External::cast(scope, &field))
            .map_or(std::ptr::null_mut(), |external| external.value(scope))
    }

    /// Field array when `index` is in range
    fn field_slots(&self, scope: &Scope<'js>, index: usize) -> rquickjs::Result<Option<Array<'js>>> {
        let Some(handle) = shadow::lookup(scope, &self.raw())? else {
            tracing::warn!("Internal field {} written on an object without fields", index);
            return Ok(None);
        };
        let count = shadow::with_record(scope, handle.id, |record| record.internal_field_count);
        if index >= count {
            tracing::warn!("Internal field {} written out of range ({} fields)", index, count);
            return Ok(None);
        }
        handle.fields().map(Some)
    }

    // ========================================================================
    // Private properties
    // ========================================================================

    pub fn has_private(&self, scope: &Scope<'js>, key: &Private<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            let Some(map) = channel.check(handle.private_map(scope, false))? else {
                return Some(false);
            };
            let found = channel.check(exec(scope, &snippets::HAS, &[map.into_value(), key.key().clone()]))?;
            Some(found.as_bool() == Some(true))
        })
    }

    /// Private value of `key`; `undefined` when never set
    pub fn get_private(&self, scope: &Scope<'js>, key: &Private<'js>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            let Some(map) = channel.check(handle.private_map(scope, false))? else {
                return Some(scope.undefined());
            };
            channel
                .check(exec(scope, &snippets::GET, &[map.into_value(), key.key().clone()]))
                .map(ValueRef::from_host)
        })
    }

    pub fn set_private(&self, scope: &Scope<'js>, key: &Private<'js>, value: &ValueRef<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            let map = channel.check(handle.private_map(scope, true))??;
            let args = [map.into_value(), key.key().clone(), value.host().clone()];
            channel.check(exec(scope, &snippets::SET, &args))?;
            Some(true)
        })
    }

    pub fn delete_private(&self, scope: &Scope<'js>, key: &Private<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            let Some(map) = channel.check(handle.private_map(scope, false))? else {
                return Some(true);
            };
            let deleted = channel.check(exec(scope, &snippets::DELETE, &[map.into_value(), key.key().clone()]))?;
            Some(deleted.as_bool() == Some(true))
        })
    }

    // ========================================================================
    // Identity and copies
    // ========================================================================

    /// Non-zero hash, stable for the object's lifetime
    pub fn get_identity_hash(&self, scope: &Scope<'js>) -> i32 {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            Some(shadow::with_record(scope, handle.id, |record| record.identity_hash))
        })
        .unwrap_or(1)
    }

    /// Shallow copy of the own enumerable properties, same prototype
    pub fn clone_object(&self, scope: &Scope<'js>) -> Maybe<ObjectRef<'js>> {
        bridged(scope, |channel| {
            let copy = channel.check(exec(scope, &snippets::CLONE, &[self.raw()]))?;
            channel.check(shadow::expect_object(copy)).map(ObjectRef::from_host)
        })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Functions, and instances of templates with a call handler
    pub fn is_callable(&self, scope: &Scope<'js>) -> bool {
        if self.raw().is_function() {
            return true;
        }
        bridged(scope, |channel| {
            let handle = channel.check(shadow::lookup(scope, &self.raw()))??;
            shadow::with_record(scope, handle.id, |record| {
                record.template.as_ref().map(|template| template.has_call_handler())
            })
        })
        .unwrap_or(false)
    }

    pub fn is_constructor(&self, scope: &Scope<'js>) -> bool {
        bridged(scope, |channel| {
            let result = channel.check(exec(scope, &snippets::IS_CONSTRUCTOR, &[self.raw()]))?;
            result.as_bool()
        })
        .unwrap_or(false)
    }

    /// Call this object with `receiver` as `this`
    pub fn call_as_function(
        &self,
        scope: &Scope<'js>,
        receiver: &ValueRef<'js>,
        args: &[ValueRef<'js>],
    ) -> Maybe<ValueRef<'js>> {
        let list = scope.new_array(args)?;
        bridged(scope, |channel| {
            let call = [self.raw(), receiver.host().clone(), list.raw()];
            channel
                .check(exec(scope, &snippets::CALL_AS_FUNCTION, &call))
                .map(ValueRef::from_host)
        })
    }

    /// `new this(...args)`
    pub fn call_as_constructor(&self, scope: &Scope<'js>, args: &[ValueRef<'js>]) -> Maybe<ValueRef<'js>> {
        let list = scope.new_array(args)?;
        bridged(scope, |channel| {
            channel
                .check(exec(scope, &snippets::CALL_AS_CONSTRUCTOR, &[self.raw(), list.raw()]))
                .map(ValueRef::from_host)
        })
    }

    // ========================================================================
    // Misc
    // ========================================================================

    /// Freeze or seal; true when the host hands back the same object
    pub fn set_integrity_level(&self, scope: &Scope<'js>, level: IntegrityLevel) -> Maybe<bool> {
        bridged(scope, |channel| {
            let sealed = Value::new_bool(scope.ctx().clone(), level == IntegrityLevel::Sealed);
            let result = channel.check(exec(scope, &snippets::SET_INTEGRITY, &[self.raw(), sealed]))?;
            Some(result.as_bool() == Some(true))
        })
    }

    /// `Object.prototype.toString` as it was before guest code ran
    pub fn object_proto_to_string(&self, scope: &Scope<'js>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            channel
                .check(exec(scope, &snippets::OBJECT_PROTO_TO_STRING, &[self.raw()]))
                .map(ValueRef::from_host)
        })
    }

    pub fn get_constructor_name(&self, scope: &Scope<'js>) -> Maybe<String> {
        bridged(scope, |channel| {
            let name = channel.check(exec(scope, &snippets::CONSTRUCTOR_NAME, &[self.raw()]))?;
            Some(ValueRef::from_host(name).to_rust_string().unwrap_or_default())
        })
    }

    /// First object on the chain, starting here, built from `template` or
    /// a template inheriting it
    pub fn find_instance_in_prototype_chain(
        &self,
        scope: &Scope<'js>,
        template: &FunctionTemplate,
    ) -> Option<ObjectRef<'js>> {
        bridged(scope, |channel| {
            let mut current = self.raw();
            while current.is_object() {
                if let Some(handle) = channel.check(shadow::lookup(scope, &current))? {
                    let matches = shadow::with_record(scope, handle.id, |record| {
                        record
                            .constructor
                            .as_ref()
                            .is_some_and(|constructor| constructor.is_or_inherits(template))
                    });
                    if matches {
                        return current.into_object().map(ObjectRef::from_host);
                    }
                }
                current = channel.check(exec(scope, &snippets::GET_PROTO, &[current]))?;
            }
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;

    use crate::{FunctionTemplate, IntegrityLevel, Isolate, ObjectTemplate, Private};

    #[test]
    fn test_fields_need_a_template() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            assert_eq!(object.internal_field_count(scope), 0);
            object.set_internal_field(scope, 0, &scope.integer(1));
            assert!(object.get_internal_field(scope, 0).is_none());
            assert_eq!(isolate.stats().shadow_records, 0);
        });
    }

    #[test]
    fn test_aligned_pointers() {
        let isolate = Isolate::with_defaults().unwrap();
        let mut slots = [0u8; 4];
        let base = slots.as_mut_ptr();
        isolate.enter(|scope| {
            let template = ObjectTemplate::new();
            template.set_internal_field_count(4);
            let object = template.new_instance(scope).unwrap();

            let entries: Vec<(usize, *mut c_void)> = (0..4).map(|i| (i, base.wrapping_add(i).cast())).collect();
            object.set_aligned_pointer_in_internal_fields(scope, &entries);
            for (index, pointer) in entries {
                assert_eq!(object.get_aligned_pointer_from_internal_field(scope, index), pointer);
            }
            assert!(object.get_aligned_pointer_from_internal_field(scope, 9).is_null());
        });
    }

    #[test]
    fn test_private_properties() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            let key = Private::new(scope, "secret").unwrap();

            assert_eq!(object.has_private(scope, &key), Some(false));
            assert!(object.get_private(scope, &key).unwrap().is_undefined());

            object.set_private(scope, &key, &scope.integer(5)).unwrap();
            assert_eq!(object.has_private(scope, &key), Some(true));
            assert_eq!(object.get_private(scope, &key).unwrap().int32_value(), Some(5));
            assert_eq!(object.own_property_names(scope).unwrap().len(), 0);

            assert_eq!(object.delete_private(scope, &key), Some(true));
            assert_eq!(object.has_private(scope, &key), Some(false));
        });
    }

    #[test]
    fn test_clone_keeps_prototype() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let original = scope
                .run_script("var proto = { kind: 'p' }; var o = Object.create(proto); o.x = 1; o")
                .unwrap()
                .as_object()
                .unwrap();
            let copy = original.clone_object(scope).unwrap();
            assert!(!copy.strict_equals(scope, &original));
            assert_eq!(copy.get_str(scope, "x").unwrap().int32_value(), Some(1));
            assert_eq!(copy.get_str(scope, "kind").unwrap().to_rust_string().as_deref(), Some("p"));
        });
    }

    #[test]
    fn test_call_helpers() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let function = scope
                .run_script("(function Point(x) { if (new.target) { this.x = x; } else { return x * 2; } })")
                .unwrap()
                .as_object()
                .unwrap();
            assert!(function.is_callable(scope));
            assert!(function.is_constructor(scope));

            let doubled = function
                .call_as_function(scope, &scope.undefined(), &[scope.integer(4)])
                .unwrap();
            assert_eq!(doubled.int32_value(), Some(8));

            let point = function.call_as_constructor(scope, &[scope.integer(3)]).unwrap();
            let point = point.as_object().unwrap();
            assert_eq!(point.get_str(scope, "x").unwrap().int32_value(), Some(3));
            assert_eq!(point.get_constructor_name(scope).as_deref(), Some("Point"));

            let arrow = scope.run_script("(() => 1)").unwrap().as_object().unwrap();
            assert!(arrow.is_callable(scope));
            assert!(!arrow.is_constructor(scope));
            assert!(!scope.new_object().unwrap().is_callable(scope));
        });
    }

    #[test]
    fn test_integrity_and_to_string() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let object = scope.new_object().unwrap();
            assert_eq!(object.set_integrity_level(scope, IntegrityLevel::Sealed), Some(true));
            assert_eq!(
                object.set(scope, &scope.string("fresh").unwrap(), &scope.integer(1)),
                Some(false)
            );

            let tag = object.object_proto_to_string(scope).unwrap();
            assert_eq!(tag.to_rust_string().as_deref(), Some("[object Object]"));
        });
    }

    #[test]
    fn test_find_instance_in_chain() {
        let isolate = Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let base = FunctionTemplate::new();
            let derived = FunctionTemplate::new();
            derived.inherit(&base);
            let other = FunctionTemplate::new();

            let instance = derived.new_instance(scope).unwrap();
            let child = scope.new_object().unwrap();
            child.set_prototype(scope, &instance.as_value()).unwrap();

            let found = child.find_instance_in_prototype_chain(scope, &base).unwrap();
            assert!(found.strict_equals(scope, &instance));
            assert!(child.find_instance_in_prototype_chain(scope, &other).is_none());
        });
    }
}
