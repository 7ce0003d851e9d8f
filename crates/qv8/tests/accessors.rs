//! Native accessor dispatch
//!
//! Getter and setter frames, signature checks, exceptions raised from
//! callbacks and collections requested while a callback runs.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use qv8::*;

fn install_global<'js>(scope: &Scope<'js>, name: &str, object: &ObjectRef<'js>) {
    scope.global().set_str(scope, name, &object.as_value()).unwrap();
}

// ============================================================================
// GETTERS AND SETTERS
// ============================================================================

static STORED: AtomicI32 = AtomicI32::new(0);

fn stored_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    info.get_return_value().set_int(STORED.load(Ordering::SeqCst));
}

fn stored_setter(_name: ValueRef<'_>, value: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    STORED.store(value.int32_value().unwrap_or(-1), Ordering::SeqCst);
    assert!(info.holder().is_some());
}

#[test]
fn test_getter_and_setter_dispatch() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("stored").unwrap();
        let installed = object.set_accessor(
            scope,
            &name,
            stored_getter,
            Some(stored_setter),
            None,
            PropertyAttribute::NONE,
        );
        assert_eq!(installed, Some(true));

        install_global(scope, "target", &object);
        let result = scope.run_script("target.stored = 41; target.stored + 1").unwrap();
        assert_eq!(result.int32_value(), Some(42));
        assert_eq!(STORED.load(Ordering::SeqCst), 41);
    });
    assert_eq!(isolate.stats().accessors, 1);
}

fn name_and_data_getter(name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    let scope = info.scope();
    let label = format!(
        "{}:{}",
        name.to_rust_string().unwrap_or_default(),
        info.data().to_rust_string().unwrap_or_default()
    );
    if let Some(value) = scope.string(&label) {
        info.get_return_value().set(&value);
    }
}

#[test]
fn test_callback_sees_name_and_data() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("label").unwrap();
        let data = scope.string("payload").unwrap();
        object
            .set_native_data_property(scope, &name, name_and_data_getter, None, Some(&data), PropertyAttribute::NONE)
            .unwrap();
        let value = object.get(scope, &name).unwrap();
        assert_eq!(value.to_rust_string().as_deref(), Some("label:payload"));
    });
}

fn constant_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    info.get_return_value().set_int(1);
}

#[test]
fn test_getter_only_write_becomes_data() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("lazy").unwrap();
        object
            .set_accessor(scope, &name, constant_getter, None, None, PropertyAttribute::NONE)
            .unwrap();
        install_global(scope, "lazy", &object);

        let result = scope.run_script("lazy.lazy = 5; lazy.lazy").unwrap();
        assert_eq!(result.int32_value(), Some(5));
        let descriptor = object.get_own_property_descriptor(scope, &name).unwrap();
        let descriptor = descriptor.as_object().unwrap();
        assert_eq!(descriptor.get_str(scope, "writable").unwrap().boolean_value(), Some(true));
    });
}

#[test]
fn test_read_only_accessor_ignores_write() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("fixed").unwrap();
        object
            .set_accessor(scope, &name, constant_getter, None, None, PropertyAttribute::READ_ONLY)
            .unwrap();
        assert_eq!(object.set(scope, &name, &scope.integer(9)), Some(false));
        assert_eq!(object.get(scope, &name).unwrap().int32_value(), Some(1));
        assert_eq!(object.get_property_attributes(scope, &name), Some(PropertyAttribute::READ_ONLY));
    });
}

#[test]
fn test_accessor_over_non_configurable_is_false() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("pinned").unwrap();
        object
            .define_own_property(scope, &name, &scope.integer(7), PropertyAttribute::DONT_DELETE)
            .unwrap();
        let getter = scope.run_script("(function () { return 'replaced'; })").unwrap().as_object().unwrap();

        let try_catch = TryCatch::new(scope);
        let installed = object.set_accessor(scope, &name, constant_getter, None, None, PropertyAttribute::NONE);
        assert_eq!(installed, Some(false));
        let defined = object.set_accessor_property(scope, &name, Some(&getter), None, PropertyAttribute::NONE);
        assert_eq!(defined, Some(false));
        assert!(!try_catch.has_caught());
        assert_eq!(object.get(scope, &name).unwrap().int32_value(), Some(7));
    });
}

#[test]
fn test_accessor_property_from_functions() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let getter = scope.run_script("(function () { return 'got'; })").unwrap().as_object().unwrap();
        let name = scope.string("viaFunction").unwrap();
        let attributes = PropertyAttribute::DONT_ENUM;
        assert_eq!(object.set_accessor_property(scope, &name, Some(&getter), None, attributes), Some(true));
        assert_eq!(object.get(scope, &name).unwrap().to_rust_string().as_deref(), Some("got"));

        let enumerable = object.get_own_property_names(scope, PropertyFilter::ONLY_ENUMERABLE).unwrap();
        assert!(enumerable.is_empty());
    });
}

static SHOULD_THROW_SEEN: AtomicUsize = AtomicUsize::new(0);
static SHOULD_THROW_READS: AtomicUsize = AtomicUsize::new(0);

fn mode_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    SHOULD_THROW_READS.fetch_add(1, Ordering::SeqCst);
    if info.should_throw_on_error() {
        SHOULD_THROW_SEEN.fetch_add(1, Ordering::SeqCst);
    }
    info.get_return_value().set_int(1);
}

#[test]
fn test_should_throw_on_error_is_false() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("mode").unwrap();
        object
            .set_accessor(scope, &name, mode_getter, None, None, PropertyAttribute::NONE)
            .unwrap();
        install_global(scope, "moded", &object);

        scope.run_script("(function () { return moded.mode; })()").unwrap();
        scope.run_script("(function () { 'use strict'; return moded.mode; })()").unwrap();
        object.get(scope, &name).unwrap();
    });
    assert_eq!(SHOULD_THROW_READS.load(Ordering::SeqCst), 3);
    assert_eq!(SHOULD_THROW_SEEN.load(Ordering::SeqCst), 0);
}

// ============================================================================
// SIGNATURES
// ============================================================================

static SIGNED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn signed_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    SIGNED_CALLS.fetch_add(1, Ordering::SeqCst);
    info.get_return_value().set_bool(true);
}

#[test]
fn test_signature_mismatch_is_illegal_invocation() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let required = FunctionTemplate::new();
        let unrelated = FunctionTemplate::new();
        let signature = Signature::new(&required);
        let name = scope.string("guarded").unwrap();

        let stranger = unrelated.new_instance(scope).unwrap();
        stranger
            .set_accessor_with_signature(scope, &name, signed_getter, None, None, PropertyAttribute::NONE, &signature)
            .unwrap();

        let try_catch = TryCatch::new(scope);
        assert!(stranger.get(scope, &name).is_none());
        assert!(try_catch.has_caught());
        assert_eq!(try_catch.message().as_deref(), Some("Illegal invocation"));
        assert_eq!(SIGNED_CALLS.load(Ordering::SeqCst), 0);
    });
}

static INHERITED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn inherited_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    INHERITED_CALLS.fetch_add(1, Ordering::SeqCst);
    let holder = info.holder().unwrap();
    let field = holder.get_internal_field(info.scope(), 0).unwrap();
    info.get_return_value().set(&field);
}

#[test]
fn test_signature_matches_derived_template() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let base = FunctionTemplate::new();
        let derived = FunctionTemplate::new();
        derived.inherit(&base);
        derived.instance_template().set_internal_field_count(1);
        derived
            .instance_template()
            .set_accessor("tag", inherited_getter, None, PropertyAttribute::NONE, Some(&Signature::new(&base)));

        let instance = derived.new_instance(scope).unwrap();
        instance.set_internal_field(scope, 0, &scope.integer(77));
        assert_eq!(instance.get_str(scope, "tag").unwrap().int32_value(), Some(77));
        assert_eq!(INHERITED_CALLS.load(Ordering::SeqCst), 1);

        // A plain object reached through a normal prototype link is not a
        // valid receiver.
        install_global(scope, "instance", &instance);
        let try_catch = TryCatch::new(scope);
        assert!(scope.run_script("Object.create(instance).tag").is_none());
        assert_eq!(try_catch.message().as_deref(), Some("Illegal invocation"));
        assert_eq!(INHERITED_CALLS.load(Ordering::SeqCst), 1);
    });
}

static HIDDEN_CALLS: AtomicUsize = AtomicUsize::new(0);

fn hidden_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    HIDDEN_CALLS.fetch_add(1, Ordering::SeqCst);
    info.get_return_value().set_int(5);
}

#[test]
fn test_signature_accepts_hidden_ancestor() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let template = FunctionTemplate::new();
        template.set_hidden_prototype(true);
        let signature = Signature::new(&template);
        let holder = template.new_instance(scope).unwrap();
        let name = scope.string("inner").unwrap();
        holder
            .set_accessor_with_signature(scope, &name, hidden_getter, None, None, PropertyAttribute::NONE, &signature)
            .unwrap();

        let child = scope.new_object().unwrap();
        child.set_prototype(scope, &holder.as_value()).unwrap();
        assert_eq!(child.get(scope, &name).unwrap().int32_value(), Some(5));
        assert_eq!(HIDDEN_CALLS.load(Ordering::SeqCst), 1);
    });
}

// ============================================================================
// EXCEPTIONS AND COLLECTION FROM CALLBACKS
// ============================================================================

fn throwing_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    let scope = info.scope();
    if let Some(message) = scope.string("from native") {
        scope.throw_exception(&message);
    }
    info.get_return_value().set_int(1);
}

#[test]
fn test_scheduled_exception_rethrown() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("explodes").unwrap();
        object
            .set_accessor(scope, &name, throwing_getter, None, None, PropertyAttribute::NONE)
            .unwrap();

        let try_catch = TryCatch::new(scope);
        assert!(object.get(scope, &name).is_none());
        let caught = try_catch.exception().unwrap();
        assert_eq!(caught.to_rust_string().as_deref(), Some("from native"));

        install_global(scope, "bomb", &object);
        let guarded = scope
            .run_script("(function () { try { return bomb.explodes; } catch (e) { return 'caught ' + e; } })()")
            .unwrap();
        assert_eq!(guarded.to_rust_string().as_deref(), Some("caught from native"));
    });
}

static DEPTH_SEEN: AtomicUsize = AtomicUsize::new(0);

fn collecting_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    let scope = info.scope();
    scope.request_garbage_collection();
    DEPTH_SEEN.store(scope.callback_depth() as usize, Ordering::SeqCst);
    info.get_return_value().set_bool(scope.pending_garbage_collection());
}

#[test]
fn test_collection_runs_when_callbacks_unwind() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("collect").unwrap();
        object
            .set_accessor(scope, &name, collecting_getter, None, None, PropertyAttribute::NONE)
            .unwrap();

        // Still pending while the getter runs, done once it has returned.
        let pending = object.get(scope, &name).unwrap();
        assert_eq!(pending.boolean_value(), Some(true));
        assert_eq!(DEPTH_SEEN.load(Ordering::SeqCst), 1);
        assert_eq!(scope.callback_depth(), 0);
        assert!(!scope.pending_garbage_collection());
        assert_eq!(isolate.stats().collections, 1);
    });
    assert_eq!(isolate.stats().collections, 1);
}

#[test]
fn test_accessor_released_with_object() {
    let isolate = Isolate::with_defaults().unwrap();
    isolate.enter(|scope| {
        let object = scope.new_object().unwrap();
        let name = scope.string("temp").unwrap();
        object
            .set_accessor(scope, &name, constant_getter, None, None, PropertyAttribute::NONE)
            .unwrap();
    });
    isolate.collect_garbage();
    assert_eq!(isolate.stats().accessors, 0);
}
