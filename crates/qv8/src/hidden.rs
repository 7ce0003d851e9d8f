//! Hidden-Prototype Propagation Engine
//!
//! A hidden prototype supplies properties to the objects that name it as
//! prototype without behaving as a chain link of its own. Each child gets a
//! forwarding accessor per property of the hidden object: reads go through
//! to the hidden object, writes define an own data property on the child
//! (shadowing). Children are registered on the hidden object so properties
//! added later are forwarded too, transitively through hidden children.

use rquickjs::{Object, Value};

use crate::exception::bridged;
use crate::exec::exec;
use crate::shadow;
use crate::value::{Maybe, ObjectRef, ValueRef};
use crate::{snippets, PropertyFilter, Scope};

impl<'js> ObjectRef<'js> {
    /// The real prototype, hidden or not
    pub fn get_prototype(&self, scope: &Scope<'js>) -> Maybe<ValueRef<'js>> {
        bridged(scope, |channel| {
            channel
                .check(exec(scope, &snippets::GET_PROTO, &[self.raw()]))
                .map(ValueRef::from_host)
        })
    }

    /// Link `prototype` as this object's prototype.
    ///
    /// A hidden prototype registers this object as its child and forwards
    /// its current own properties first. A hidden security proxy is
    /// replaced by the object it guards.
    pub fn set_prototype(&self, scope: &Scope<'js>, prototype: &ValueRef<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let mut target = prototype.host().clone();
            let hidden = channel.check(shadow::is_hidden(scope, &target))?;
            if hidden {
                target = channel.check(unwrap_hidden_proxy(scope, target))?;
                let handle = channel.check(shadow::ensure(scope, &target))?;
                channel.check(handle.add_child(scope, &self.raw()))?;
                channel.check(forward_all(scope, &target, self.host()))?;
                tracing::debug!("Linked hidden prototype record {:?}", handle.id);
            }

            channel.check(exec(scope, &snippets::SET_PROTO, &[self.raw(), target]))?;

            if hidden {
                return Some(true);
            }
            let linked = channel.check(exec(scope, &snippets::GET_PROTO, &[self.raw()]))?;
            let same = channel.check(exec(
                scope,
                &snippets::STRICT_EQUALS,
                &[linked, prototype.host().clone()],
            ))?;
            if same.as_bool() == Some(true) { Some(true) } else { None }
        })
    }

    /// Mark this object as a hidden prototype
    pub fn mark_as_hidden_prototype(&self, scope: &Scope<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            let handle = channel.check(shadow::ensure(scope, &self.raw()))?;
            shadow::with_record_mut(scope, handle.id, |record| record.is_hidden_prototype = true);
            Some(true)
        })
    }

    pub fn is_hidden_prototype(&self, scope: &Scope<'js>) -> bool {
        bridged(scope, |channel| channel.check(shadow::is_hidden(scope, &self.raw()))).unwrap_or(false)
    }

    /// A pass-through proxy whose "real" lookups resolve on `target`.
    ///
    /// When `target` is a hidden prototype the proxy becomes its hidden
    /// placeholder: linking the proxy as a prototype links `target`.
    pub fn new_security_proxy(scope: &Scope<'js>, target: &ObjectRef<'js>) -> Maybe<ObjectRef<'js>> {
        bridged(scope, |channel| {
            let proxy = channel.check(exec(scope, &snippets::NEW_SECURITY_PROXY, &[target.raw()]))?;
            let proxy = channel.check(shadow::expect_object(proxy))?;
            let handle = channel.check(shadow::ensure(scope, proxy.as_value()))?;
            channel.check(handle.set_security_target(target.host()))?;

            if channel.check(shadow::is_hidden(scope, &target.raw()))? {
                shadow::with_record_mut(scope, handle.id, |record| record.is_hidden_prototype = true);
                channel.check(handle.set_hidden_proxy(&proxy))?;
            }
            Some(ObjectRef::from_host(proxy))
        })
    }

    /// Forward own property `key` of this hidden object to `child`.
    ///
    /// Does nothing when the child already has its own `key`; returns
    /// whether a forwarder was installed.
    pub fn propagate_own_property_to_child(
        &self,
        scope: &Scope<'js>,
        key: &ValueRef<'js>,
        child: &ObjectRef<'js>,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            channel.check(forward_key(scope, &self.raw(), key.host(), child.host()))
        })
    }

    /// Forward own property `key` to every registered child
    pub fn propagate_own_property_to_children(&self, scope: &Scope<'js>, key: &ValueRef<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            channel.check(forward_key_to_children(scope, &self.raw(), key.host()))?;
            Some(true)
        })
    }

    /// Forward every own property of this hidden object to `child`
    pub fn propagate_own_properties_to_child(&self, scope: &Scope<'js>, child: &ObjectRef<'js>) -> Maybe<bool> {
        bridged(scope, |channel| {
            channel.check(forward_all(scope, &self.raw(), child.host()))?;
            Some(true)
        })
    }
}

/// Substitute the guarded object for a hidden security proxy placeholder
fn unwrap_hidden_proxy<'js>(scope: &Scope<'js>, proto: Value<'js>) -> rquickjs::Result<Value<'js>> {
    let Some(handle) = shadow::lookup(scope, &proto)? else {
        return Ok(proto);
    };
    let Some(placeholder) = handle.hidden_proxy()? else {
        return Ok(proto);
    };
    let same = exec(scope, &snippets::STRICT_EQUALS, &[placeholder.into_value(), proto.clone()])?;
    if same.as_bool() != Some(true) {
        return Ok(proto);
    }
    Ok(match handle.security_target()? {
        Some(target) => target.into_value(),
        None => proto,
    })
}

/// Re-forward `key` after it was defined on `object`, if `object` is hidden
pub(crate) fn after_define<'js>(scope: &Scope<'js>, object: &Value<'js>, key: &Value<'js>) -> rquickjs::Result<()> {
    if shadow::is_hidden(scope, object)? {
        forward_key_to_children(scope, object, key)?;
    }
    Ok(())
}

fn forward_key<'js>(
    scope: &Scope<'js>,
    source: &Value<'js>,
    key: &Value<'js>,
    child: &Object<'js>,
) -> rquickjs::Result<bool> {
    let child_value = child.as_value().clone();
    let installed = exec(
        scope,
        &snippets::FORWARD_PROPERTY,
        &[child_value.clone(), source.clone(), key.clone()],
    )?
    .as_bool()
        == Some(true);
    if installed && shadow::is_hidden(scope, &child_value)? {
        forward_key_to_children(scope, &child_value, key)?;
    }
    Ok(installed)
}

fn forward_key_to_children<'js>(scope: &Scope<'js>, source: &Value<'js>, key: &Value<'js>) -> rquickjs::Result<()> {
    let Some(handle) = shadow::lookup(scope, source)? else {
        return Ok(());
    };
    for child in handle.children(scope)? {
        forward_key(scope, source, key, &child)?;
    }
    Ok(())
}

fn forward_all<'js>(scope: &Scope<'js>, source: &Value<'js>, child: &Object<'js>) -> rquickjs::Result<()> {
    let filter = Value::new_int(scope.ctx().clone(), i32::from(PropertyFilter::ALL_PROPERTIES.bits()));
    let keys = exec(scope, &snippets::OWN_KEYS_FILTERED, &[source.clone(), filter])?;
    let Some(keys) = keys.into_array() else {
        return Ok(());
    };
    for index in 0..keys.len() {
        let key: Value = keys.get(index)?;
        forward_key(scope, source, &key, child)?;
    }
    Ok(())
}
