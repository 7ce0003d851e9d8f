//! Construction templates
//!
//! Templates are isolate-independent descriptions of objects: internal
//! field count, template-level accessors and an optional call handler.
//! `ObjectTemplate::new_instance` realises one in a scope and stamps the
//! instance's shadow record with the template it came from, which is what
//! signature checks and `find_instance_in_prototype_chain` look at.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

use crate::accessor::{self, CallbackDepthGuard};
use crate::callback::{AccessorNameGetterCallback, AccessorNameSetterCallback, FunctionCallback, FunctionCallbackInfo};
use crate::exception::bridged;
use crate::exec::exec;
use crate::isolate::{IsolateInner, ScopeKind};
use crate::property::str_key;
use crate::value::{Maybe, ObjectRef, ValueRef};
use crate::{shadow, snippets, PropertyAttribute, Scope};

// ============================================================================
// FunctionTemplate
// ============================================================================

/// A constructor description; instances remember it for signature checks
#[derive(Clone)]
pub struct FunctionTemplate(Rc<FunctionTemplateInner>);

struct FunctionTemplateInner {
    class_name: RefCell<Option<String>>,
    parent: RefCell<Option<FunctionTemplate>>,
    hidden_prototype: Cell<bool>,
    instance_template: OnceCell<ObjectTemplate>,
}

impl FunctionTemplate {
    pub fn new() -> Self {
        Self(Rc::new(FunctionTemplateInner {
            class_name: RefCell::new(None),
            parent: RefCell::new(None),
            hidden_prototype: Cell::new(false),
            instance_template: OnceCell::new(),
        }))
    }

    /// Make instances of this template count as instances of `parent`
    pub fn inherit(&self, parent: &FunctionTemplate) {
        *self.0.parent.borrow_mut() = Some(parent.clone());
    }

    pub fn parent(&self) -> Option<FunctionTemplate> {
        self.0.parent.borrow().clone()
    }

    pub fn set_class_name(&self, name: &str) {
        *self.0.class_name.borrow_mut() = Some(name.to_string());
    }

    pub fn class_name(&self) -> Option<String> {
        self.0.class_name.borrow().clone()
    }

    /// Instances created from this template are hidden prototypes
    pub fn set_hidden_prototype(&self, hidden: bool) {
        self.0.hidden_prototype.set(hidden);
    }

    pub fn hidden_prototype(&self) -> bool {
        self.0.hidden_prototype.get()
    }

    /// The template every instance of this constructor is built from.
    ///
    /// Created on first use and shared afterwards.
    pub fn instance_template(&self) -> ObjectTemplate {
        self.0
            .instance_template
            .get_or_init(|| ObjectTemplate::with_constructor(Rc::downgrade(&self.0)))
            .clone()
    }

    /// Shorthand for `instance_template().new_instance(scope)`
    pub fn new_instance<'js>(&self, scope: &Scope<'js>) -> Maybe<ObjectRef<'js>> {
        self.instance_template().new_instance(scope)
    }

    /// Whether this template is `other` or inherits from it
    pub(crate) fn is_or_inherits(&self, other: &FunctionTemplate) -> bool {
        let mut current = Some(self.clone());
        while let Some(template) = current {
            if Rc::ptr_eq(&template.0, &other.0) {
                return true;
            }
            current = template.parent();
        }
        false
    }
}

impl Default for FunctionTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTemplate")
            .field("class_name", &self.class_name())
            .field("hidden_prototype", &self.hidden_prototype())
            .finish()
    }
}

// ============================================================================
// Signature
// ============================================================================

/// Receiver requirement of a signature-checked accessor
#[derive(Debug, Clone)]
pub struct Signature {
    template: FunctionTemplate,
}

impl Signature {
    pub fn new(template: &FunctionTemplate) -> Self {
        Self {
            template: template.clone(),
        }
    }

    pub fn template(&self) -> &FunctionTemplate {
        &self.template
    }
}

// ============================================================================
// ObjectTemplate
// ============================================================================

struct TemplateAccessor {
    name: String,
    getter: AccessorNameGetterCallback,
    setter: Option<AccessorNameSetterCallback>,
    attributes: PropertyAttribute,
    signature: Option<Signature>,
}

/// Description of instance objects
#[derive(Clone)]
pub struct ObjectTemplate(Rc<ObjectTemplateInner>);

struct ObjectTemplateInner {
    constructor: Weak<FunctionTemplateInner>,
    internal_field_count: Cell<usize>,
    call_handler: Cell<Option<FunctionCallback>>,
    accessors: RefCell<Vec<TemplateAccessor>>,
}

impl ObjectTemplate {
    /// A template with no constructor
    pub fn new() -> Self {
        Self::with_constructor(Weak::new())
    }

    fn with_constructor(constructor: Weak<FunctionTemplateInner>) -> Self {
        Self(Rc::new(ObjectTemplateInner {
            constructor,
            internal_field_count: Cell::new(0),
            call_handler: Cell::new(None),
            accessors: RefCell::new(Vec::new()),
        }))
    }

    /// The function template this is the instance template of
    pub fn constructor(&self) -> Option<FunctionTemplate> {
        self.0.constructor.upgrade().map(FunctionTemplate)
    }

    pub fn set_internal_field_count(&self, count: usize) {
        self.0.internal_field_count.set(count);
    }

    pub fn internal_field_count(&self) -> usize {
        self.0.internal_field_count.get()
    }

    /// Make instances callable; calls and `new` run `handler`
    pub fn set_call_as_function_handler(&self, handler: FunctionCallback) {
        self.0.call_handler.set(Some(handler));
    }

    pub fn has_call_handler(&self) -> bool {
        self.0.call_handler.get().is_some()
    }

    /// Accessor installed on every new instance
    pub fn set_accessor(
        &self,
        name: &str,
        getter: AccessorNameGetterCallback,
        setter: Option<AccessorNameSetterCallback>,
        attributes: PropertyAttribute,
        signature: Option<&Signature>,
    ) {
        self.0.accessors.borrow_mut().push(TemplateAccessor {
            name: name.to_string(),
            getter,
            setter,
            attributes,
            signature: signature.cloned(),
        });
    }

    /// Realise the template in `scope`
    pub fn new_instance<'js>(&self, scope: &Scope<'js>) -> Maybe<ObjectRef<'js>> {
        bridged(scope, |channel| channel.check(self.instantiate(scope)).map(ObjectRef::from_host))
    }

    fn instantiate<'js>(&self, scope: &Scope<'js>) -> rquickjs::Result<Object<'js>> {
        let value = match self.0.call_handler.get() {
            Some(callback) => callable_instance(scope, callback)?,
            None => Object::new(scope.ctx().clone())?.into_value(),
        };
        let object = shadow::expect_object(value.clone())?;

        let constructor = self.constructor();
        let hidden = constructor.as_ref().is_some_and(FunctionTemplate::hidden_prototype);
        let handle = shadow::ensure(scope, &value)?;
        shadow::with_record_mut(scope, handle.id, |record| {
            record.template = Some(self.clone());
            record.constructor = constructor;
            record.is_hidden_prototype = hidden;
        });
        handle.init_fields(scope, self.internal_field_count())?;

        let accessors = self.0.accessors.borrow();
        for entry in accessors.iter() {
            let name = str_key(scope, &entry.name)?;
            accessor::install(
                scope,
                &value,
                &name,
                Some(entry.getter),
                entry.setter,
                Value::new_undefined(scope.ctx().clone()),
                entry.attributes,
                entry.signature.clone(),
            )?;
        }
        tracing::debug!(
            "Instantiated template with {} fields and {} accessors",
            self.internal_field_count(),
            accessors.len()
        );
        Ok(object)
    }
}

impl Default for ObjectTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTemplate")
            .field("internal_field_count", &self.internal_field_count())
            .field("callable", &self.has_call_handler())
            .finish()
    }
}

/// Native half of a callable instance
struct CallHandler {
    callback: FunctionCallback,
    isolate: Weak<IsolateInner>,
}

impl CallHandler {
    fn invoke<'js>(&self, ctx: Ctx<'js>, args: Vec<Value<'js>>) -> rquickjs::Result<Value<'js>> {
        let Some(isolate) = self.isolate.upgrade() else {
            return Ok(Value::new_undefined(ctx));
        };
        let lock = isolate.lock();
        let scope = Scope::new(ctx.clone(), isolate.clone(), ScopeKind::Callback);

        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or_else(|| Value::new_undefined(ctx.clone()));
        let this = next();
        let is_construct_call = next().as_bool().unwrap_or(false);
        let list = next();
        let data = next();

        let mut arguments = Vec::new();
        if let Some(list) = list.into_array() {
            for index in 0..list.len() {
                arguments.push(ValueRef::from_host(list.get::<Value>(index)?));
            }
        }

        let _depth = CallbackDepthGuard::enter(&lock, &ctx);
        let info = FunctionCallbackInfo::new(
            scope,
            ValueRef::from_host(this),
            arguments,
            ValueRef::from_host(data),
            is_construct_call,
        );
        (self.callback)(&info);

        let pending = info.scope().take_callback_exception();
        let result = info.take_return_value();
        drop(info);
        match pending {
            Some(exception) => Err(ctx.throw(exception)),
            None => Ok(result.unwrap_or_else(|| Value::new_undefined(ctx.clone()))),
        }
    }
}

fn callable_instance<'js>(scope: &Scope<'js>, callback: FunctionCallback) -> rquickjs::Result<Value<'js>> {
    let handler = CallHandler {
        callback,
        isolate: Rc::downgrade(scope.isolate()),
    };
    let native = Function::new(
        scope.ctx().clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| handler.invoke(ctx, args.0),
    )?;
    exec(
        scope,
        &snippets::FUNCTION_TRAMPOLINE,
        &[native.into_value(), Value::new_undefined(scope.ctx().clone())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inheritance_chain() {
        let base = FunctionTemplate::new();
        let derived = FunctionTemplate::new();
        let unrelated = FunctionTemplate::new();
        derived.inherit(&base);

        assert!(derived.is_or_inherits(&base));
        assert!(derived.is_or_inherits(&derived));
        assert!(!base.is_or_inherits(&derived));
        assert!(!unrelated.is_or_inherits(&base));
    }

    #[test]
    fn test_instance_template_shared() {
        let template = FunctionTemplate::new();
        let first = template.instance_template();
        first.set_internal_field_count(3);
        assert_eq!(template.instance_template().internal_field_count(), 3);
        assert!(first.constructor().is_some());
        assert!(ObjectTemplate::new().constructor().is_none());
    }

    #[test]
    fn test_class_name() {
        let template = FunctionTemplate::new();
        assert_eq!(template.class_name(), None);
        template.set_class_name("Widget");
        assert_eq!(template.class_name().as_deref(), Some("Widget"));
    }

    fn add_args(info: &FunctionCallbackInfo<'_>) {
        let sum = (0..info.length())
            .filter_map(|index| info.get(index).int32_value())
            .sum::<i32>();
        info.get_return_value().set_int(sum);
    }

    #[test]
    fn test_callable_instance() {
        let isolate = crate::Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let template = ObjectTemplate::new();
            template.set_call_as_function_handler(add_args);
            let instance = template.new_instance(scope).unwrap();
            assert!(instance.as_value().is_function());

            scope.global().set_str(scope, "add", &instance.as_value()).unwrap();
            let result = scope.run_script("add(1, 2, 3)").unwrap();
            assert_eq!(result.int32_value(), Some(6));
        });
    }

    #[test]
    fn test_instance_records_template() {
        let isolate = crate::Isolate::with_defaults().unwrap();
        isolate.enter(|scope| {
            let constructor = FunctionTemplate::new();
            constructor.set_hidden_prototype(true);
            constructor.instance_template().set_internal_field_count(2);

            let instance = constructor.new_instance(scope).unwrap();
            assert!(instance.is_hidden_prototype(scope));
            assert_eq!(instance.internal_field_count(scope), 2);
        });
    }
}
