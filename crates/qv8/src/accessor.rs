//! Accessor Bridge
//!
//! Accessors are host functions built from a fixed trampoline that passes
//! the receiver, argument count, assigned value, property name, data and
//! holder to one native function. The native side owns an
//! [`AccessorDescriptor`] holding only Rust state; the name, data and
//! holder stay alive through the trampoline's host closure, so collecting
//! the accessor releases everything.

use std::rc::{Rc, Weak};

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Value};

use crate::callback::{AccessorNameGetterCallback, AccessorNameSetterCallback, ImplicitArgs, PropertyCallbackInfo};
use crate::exception::bridged;
use crate::exec::exec;
use crate::isolate::{IsolateInner, IsolateState, ScopeKind};
use crate::template::Signature;
use crate::value::{Maybe, ObjectRef, ValueRef};
use crate::{hidden, shadow, snippets, PropertyAttribute, Scope};

/// Native half of an installed accessor
pub(crate) struct AccessorDescriptor {
    getter: Option<AccessorNameGetterCallback>,
    setter: Option<AccessorNameSetterCallback>,
    signature: Option<Signature>,
    isolate: Weak<IsolateInner>,
}

impl AccessorDescriptor {
    fn new(
        scope: &Scope<'_>,
        getter: Option<AccessorNameGetterCallback>,
        setter: Option<AccessorNameSetterCallback>,
        signature: Option<Signature>,
    ) -> Self {
        let state = scope.lock();
        state.live_accessors.set(state.live_accessors.get() + 1);
        Self {
            getter,
            setter,
            signature,
            isolate: Rc::downgrade(scope.isolate()),
        }
    }

    fn invoke<'js>(&self, ctx: Ctx<'js>, args: Vec<Value<'js>>) -> rquickjs::Result<Value<'js>> {
        let Some(isolate) = self.isolate.upgrade() else {
            return Ok(Value::new_undefined(ctx));
        };
        let lock = isolate.lock();
        let scope = Scope::new(ctx.clone(), isolate.clone(), ScopeKind::Callback);

        let arg = |index: usize| {
            args.get(index)
                .cloned()
                .unwrap_or_else(|| Value::new_undefined(ctx.clone()))
        };
        let receiver = arg(0);
        let argc = arg(1).as_int().unwrap_or(0);
        let value = arg(2);
        let name = arg(3);
        let data = arg(4);
        let mut holder = arg(5);

        if let Some(signature) = &self.signature {
            match signature_holder(&scope, &receiver, signature)? {
                Some(matched) => holder = matched,
                None => {
                    tracing::debug!("Accessor signature mismatch");
                    let error = exec(&scope, &snippets::ILLEGAL_INVOCATION, &[])?;
                    return Err(ctx.throw(error));
                }
            }
        }

        let should_throw = exec(&scope, &snippets::STRICT_DETECT, &[])?
            .as_bool()
            .unwrap_or(false);

        let _depth = CallbackDepthGuard::enter(&lock, &ctx);
        let info = PropertyCallbackInfo::new(
            scope,
            ImplicitArgs {
                should_throw,
                holder: ValueRef::from_host(holder),
                isolate_id: isolate.id(),
                data: ValueRef::from_host(data),
                this: ValueRef::from_host(receiver),
            },
        );

        let name = ValueRef::from_host(name);
        if argc == 0 {
            if let Some(getter) = self.getter {
                getter(name, &info);
            }
        } else if let Some(setter) = self.setter {
            setter(name, ValueRef::from_host(value), &info);
        }

        let pending = info.scope().take_callback_exception();
        let result = info.take_return_value();
        drop(info);

        match pending {
            Some(exception) => Err(ctx.throw(exception)),
            None if argc == 0 => Ok(result.unwrap_or_else(|| Value::new_undefined(ctx.clone()))),
            None => Ok(Value::new_undefined(ctx.clone())),
        }
    }
}

impl Drop for AccessorDescriptor {
    fn drop(&mut self) {
        if let Some(isolate) = self.isolate.upgrade() {
            let state = isolate.lock();
            state.live_accessors.set(state.live_accessors.get().saturating_sub(1));
        }
    }
}

/// Tracks native callback nesting for the isolate.
///
/// Leaving the outermost callback runs any collection requested inside it.
pub(crate) struct CallbackDepthGuard<'a, 'js> {
    state: &'a IsolateState,
    ctx: Ctx<'js>,
}

impl<'a, 'js> CallbackDepthGuard<'a, 'js> {
    pub(crate) fn enter(state: &'a IsolateState, ctx: &Ctx<'js>) -> Self {
        state.callback_depth.set(state.callback_depth.get() + 1);
        Self { state, ctx: ctx.clone() }
    }
}

impl Drop for CallbackDepthGuard<'_, '_> {
    fn drop(&mut self) {
        let depth = self.state.callback_depth.get().saturating_sub(1);
        self.state.callback_depth.set(depth);
        if depth == 0 && self.state.pending_gc.get() {
            tracing::debug!("Running collection requested during a callback");
            self.state.collect(&self.ctx);
        }
    }
}

/// Object on the receiver's chain that satisfies `signature`.
///
/// Only the receiver itself and hidden prototypes directly behind it are
/// candidates; the walk stops at the first non-hidden prototype.
fn signature_holder<'js>(
    scope: &Scope<'js>,
    receiver: &Value<'js>,
    signature: &Signature,
) -> rquickjs::Result<Option<Value<'js>>> {
    let mut current = receiver.clone();
    let mut handle = shadow::lookup(scope, &current)?;
    let mut first = true;

    while current.is_object() {
        if let Some(found) = &handle {
            let (hidden, constructor) = shadow::with_record(scope, found.id, |record| {
                (record.is_hidden_prototype, record.constructor.clone())
            });
            if first || hidden {
                if let Some(constructor) = constructor {
                    if constructor.is_or_inherits(signature.template()) {
                        return Ok(Some(current));
                    }
                }
            }
        }
        first = false;

        current = exec(scope, &snippets::GET_PROTO, &[current])?;
        handle = shadow::lookup(scope, &current)?;
        let next_hidden = match &handle {
            Some(found) => shadow::with_record(scope, found.id, |record| record.is_hidden_prototype),
            None => false,
        };
        if !next_hidden {
            break;
        }
    }
    Ok(None)
}

/// Install a native accessor pair on `object`
pub(crate) fn install<'js>(
    scope: &Scope<'js>,
    object: &Value<'js>,
    name: &Value<'js>,
    getter: Option<AccessorNameGetterCallback>,
    setter: Option<AccessorNameSetterCallback>,
    data: Value<'js>,
    attributes: PropertyAttribute,
    signature: Option<Signature>,
) -> rquickjs::Result<bool> {
    let has_getter = getter.is_some();
    let has_setter = setter.is_some();
    let descriptor = AccessorDescriptor::new(scope, getter, setter, signature);
    let native = Function::new(
        scope.ctx().clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| descriptor.invoke(ctx, args.0),
    )?;

    let trampoline = exec(
        scope,
        &snippets::ACCESSOR_TRAMPOLINE,
        &[native.into_value(), name.clone(), data, object.clone()],
    )?;
    let undefined = Value::new_undefined(scope.ctx().clone());
    let get = if has_getter { trampoline.clone() } else { undefined.clone() };
    let set = if has_setter { trampoline } else { undefined };
    let defined = define_accessor_pair(scope, object, name, get, set, attributes)?;
    if defined {
        tracing::debug!("Installed native accessor");
    } else {
        tracing::debug!("Native accessor rejected by a non-configurable property");
    }
    Ok(defined)
}

fn define_accessor_pair<'js>(
    scope: &Scope<'js>,
    object: &Value<'js>,
    name: &Value<'js>,
    get: Value<'js>,
    set: Value<'js>,
    attributes: PropertyAttribute,
) -> rquickjs::Result<bool> {
    let bits = Value::new_int(scope.ctx().clone(), i32::from(attributes.bits()));
    let defined = exec(
        scope,
        &snippets::SET_ACCESSOR_PROPERTY,
        &[object.clone(), name.clone(), get, set, bits],
    )?;
    if defined.as_bool() != Some(true) {
        return Ok(false);
    }
    hidden::after_define(scope, object, name)?;
    Ok(true)
}

impl<'js> ObjectRef<'js> {
    /// Install a native accessor property.
    ///
    /// Without a setter, a write replaces the accessor with a plain data
    /// property unless `READ_ONLY` is set.
    pub fn set_accessor(
        &self,
        scope: &Scope<'js>,
        name: &ValueRef<'js>,
        getter: AccessorNameGetterCallback,
        setter: Option<AccessorNameSetterCallback>,
        data: Option<&ValueRef<'js>>,
        attributes: PropertyAttribute,
    ) -> Maybe<bool> {
        self.install_accessor(scope, name, getter, setter, data, attributes, None)
    }

    /// As [`ObjectRef::set_accessor`], but the callbacks only run for
    /// receivers built from `signature`'s template (or one inheriting it);
    /// other receivers get an "Illegal invocation" `TypeError`
    pub fn set_accessor_with_signature(
        &self,
        scope: &Scope<'js>,
        name: &ValueRef<'js>,
        getter: AccessorNameGetterCallback,
        setter: Option<AccessorNameSetterCallback>,
        data: Option<&ValueRef<'js>>,
        attributes: PropertyAttribute,
        signature: &Signature,
    ) -> Maybe<bool> {
        self.install_accessor(scope, name, getter, setter, data, attributes, Some(signature.clone()))
    }

    /// Native data property: an accessor without a signature
    pub fn set_native_data_property(
        &self,
        scope: &Scope<'js>,
        name: &ValueRef<'js>,
        getter: AccessorNameGetterCallback,
        setter: Option<AccessorNameSetterCallback>,
        data: Option<&ValueRef<'js>>,
        attributes: PropertyAttribute,
    ) -> Maybe<bool> {
        self.set_accessor(scope, name, getter, setter, data, attributes)
    }

    #[allow(clippy::too_many_arguments)]
    fn install_accessor(
        &self,
        scope: &Scope<'js>,
        name: &ValueRef<'js>,
        getter: AccessorNameGetterCallback,
        setter: Option<AccessorNameSetterCallback>,
        data: Option<&ValueRef<'js>>,
        attributes: PropertyAttribute,
        signature: Option<Signature>,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let data = data.map_or_else(|| scope.undefined(), Clone::clone);
            channel.check(install(
                scope,
                &self.raw(),
                name.host(),
                Some(getter),
                setter,
                data.into_host(),
                attributes,
                signature,
            ))
        })
    }

    /// Define `name` as an accessor built from host functions.
    ///
    /// Only a getter: writes redefine the property as writable data unless
    /// `READ_ONLY` is set. Only a setter: reads yield `undefined`.
    pub fn set_accessor_property(
        &self,
        scope: &Scope<'js>,
        name: &ValueRef<'js>,
        getter: Option<&ObjectRef<'js>>,
        setter: Option<&ObjectRef<'js>>,
        attributes: PropertyAttribute,
    ) -> Maybe<bool> {
        bridged(scope, |channel| {
            let undefined = || Value::new_undefined(scope.ctx().clone());
            let get = getter.map_or_else(undefined, ObjectRef::raw);
            let set = setter.map_or_else(undefined, ObjectRef::raw);
            channel.check(define_accessor_pair(scope, &self.raw(), name.host(), get, set, attributes))
        })
    }
}
