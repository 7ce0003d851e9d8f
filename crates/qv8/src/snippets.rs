//! Snippet catalogue
//!
//! Every host-side helper the bridge evaluates lives here. Arguments are
//! positional (`_1`, `_2`, ...). Preludes run once per isolate when the
//! snippet is compiled and capture the intrinsics the body relies on.

use crate::exec::Snippet;

// ============================================================================
// Property access
// ============================================================================

pub(crate) const GET: Snippet = Snippet::new("get", 2, "return _1[_2];");

pub(crate) const SET: Snippet = Snippet::with_prelude(
    "set",
    3,
    "var set = Reflect.set;",
    "return set(_1, _2, _3);",
);

pub(crate) const DEFINE_OWN: Snippet = Snippet::with_prelude(
    "define_own",
    4,
    "var define = Reflect.defineProperty, create = Object.create;",
    "var d = create(null);
    d.value = _3;
    d.writable = !(_4 & 1);
    d.enumerable = !(_4 & 2);
    d.configurable = !(_4 & 4);
    return define(_1, _2, d);",
);

pub(crate) const DEFINE_DESCRIPTOR: Snippet = Snippet::with_prelude(
    "define_descriptor",
    3,
    "var define = Reflect.defineProperty;",
    "try {
        delete _1[_2];
        return define(_1, _2, _3);
    } catch (e) {
        return false;
    }",
);

pub(crate) const HAS: Snippet = Snippet::new("has", 2, "return _2 in _1;");

pub(crate) const HAS_OWN: Snippet = Snippet::with_prelude(
    "has_own",
    2,
    "var apply = Reflect.apply, hasOwn = Object.prototype.hasOwnProperty;",
    "return apply(hasOwn, _1, [_2]);",
);

pub(crate) const HAS_REAL_NAMED: Snippet = Snippet::with_prelude(
    "has_real_named",
    2,
    "var gopd = Reflect.getOwnPropertyDescriptor;",
    "return gopd(_1, _2) !== undefined;",
);

pub(crate) const DELETE: Snippet = Snippet::new("delete", 2, "return delete _1[_2];");

pub(crate) const GET_OWN_DESCRIPTOR: Snippet = Snippet::with_prelude(
    "get_own_descriptor",
    2,
    "var gopd = Object.getOwnPropertyDescriptor;",
    "return gopd(_1, _2);",
);

// ============================================================================
// Key enumeration
// ============================================================================

pub(crate) const OWN_KEYS_FILTERED: Snippet = Snippet::with_prelude(
    "own_keys_filtered",
    2,
    "var names = Object.getOwnPropertyNames,
         symbols = Object.getOwnPropertySymbols,
         gopd = Object.getOwnPropertyDescriptor;
    function keep(d, f) {
        if ((f & 1) && !d.writable) return false;
        if ((f & 2) && !d.enumerable) return false;
        if ((f & 4) && !d.configurable) return false;
        return true;
    }
    function collect(o, keys, f, out) {
        for (var i = 0; i < keys.length; i++) {
            var d = gopd(o, keys[i]);
            if (d !== undefined && keep(d, f)) out.push(keys[i]);
        }
    }",
    "var out = [];
    if (!(_2 & 8)) collect(_1, names(_1), _2, out);
    if (!(_2 & 16)) collect(_1, symbols(_1), _2, out);
    return out;",
);

pub(crate) const OWN_NAMES: Snippet = Snippet::with_prelude(
    "own_names",
    1,
    "var names = Object.getOwnPropertyNames;",
    "return names(_1);",
);

pub(crate) const FOR_IN_KEYS: Snippet = Snippet::new(
    "for_in_keys",
    1,
    "var keys = [];
    for (var k in _1) keys.push(k);
    return keys;",
);

pub(crate) const CONCAT: Snippet = Snippet::with_prelude(
    "concat",
    2,
    "var apply = Reflect.apply, concat = Array.prototype.concat;",
    "return apply(concat, _1, [_2]);",
);

pub(crate) const SKIP_INDICES: Snippet = Snippet::with_prelude(
    "skip_indices",
    1,
    "var apply = Reflect.apply, filter = Array.prototype.filter, toStr = String;
    function notIndex(k) {
        return typeof k !== 'string' || toStr(k >>> 0) !== k || k === '4294967295';
    }",
    "return apply(filter, _1, [notIndex]);",
);

pub(crate) const UNIQUE_KEYS: Snippet = Snippet::with_prelude(
    "unique_keys",
    1,
    "var S = Set, apply = Reflect.apply, has = Set.prototype.has, add = Set.prototype.add;",
    "var seen = new S(), out = [];
    for (var i = 0; i < _1.length; i++) {
        var k = _1[i];
        if (apply(has, seen, [k])) continue;
        apply(add, seen, [k]);
        out[out.length] = k;
    }
    return out;",
);

// ============================================================================
// Attributes and real lookups
// ============================================================================

pub(crate) const ATTRIBUTES: Snippet = Snippet::with_prelude(
    "attributes",
    2,
    "var gopd = Object.getOwnPropertyDescriptor, protoOf = Object.getPrototypeOf;",
    "for (var o = _1; o !== null; o = protoOf(o)) {
        var d = gopd(o, _2);
        if (d === undefined) continue;
        var a = 0;
        if ('value' in d ? !d.writable : d.set === undefined) a |= 1;
        if (!d.enumerable) a |= 2;
        if (!d.configurable) a |= 4;
        return a;
    }
    return -1;",
);

pub(crate) const GET_REAL_NAMED: Snippet = Snippet::with_prelude(
    "get_real_named",
    3,
    "var gopd = Object.getOwnPropertyDescriptor,
         protoOf = Object.getPrototypeOf,
         apply = Reflect.apply;",
    "for (var o = _1; o !== null; o = protoOf(o)) {
        var d = gopd(o, _2);
        if (d === undefined) continue;
        if ('value' in d) return [d.value];
        return [d.get === undefined ? undefined : apply(d.get, _3, [])];
    }
    return [];",
);

// ============================================================================
// Prototype and identity
// ============================================================================

pub(crate) const GET_PROTO: Snippet = Snippet::with_prelude(
    "get_proto",
    1,
    "var protoOf = Object.getPrototypeOf;",
    "return protoOf(_1);",
);

pub(crate) const SET_PROTO: Snippet = Snippet::with_prelude(
    "set_proto",
    2,
    "var setProto = Object.setPrototypeOf;",
    "setProto(_1, _2);
    return true;",
);

pub(crate) const STRICT_EQUALS: Snippet = Snippet::new("strict_equals", 2, "return _1 === _2;");

// ============================================================================
// Shadow records
// ============================================================================

pub(crate) const NEW_WEAK_MAP: Snippet = Snippet::with_prelude(
    "new_weak_map",
    0,
    "var WM = WeakMap;",
    "return new WM();",
);

pub(crate) const NEW_PLAIN_MAP: Snippet = Snippet::with_prelude(
    "new_plain_map",
    0,
    "var create = Object.create;",
    "return create(null);",
);

pub(crate) const SHADOW_LOOKUP: Snippet = Snippet::with_prelude(
    "shadow_lookup",
    2,
    "var apply = Reflect.apply, get = WeakMap.prototype.get;",
    "var h = apply(get, _1, [_2]);
    return h === undefined ? null : h;",
);

pub(crate) const SHADOW_ATTACH: Snippet = Snippet::with_prelude(
    "shadow_attach",
    4,
    "var apply = Reflect.apply, set = WeakMap.prototype.set, create = Object.create;",
    "var h = create(null);
    h.id = _3;
    h.fields = [];
    h.priv = null;
    h.children = null;
    h.security = null;
    h.hiddenProxy = null;
    h.token = _4;
    apply(set, _1, [_2, h]);
    return h;",
);

pub(crate) const CHILDREN_ADD: Snippet = Snippet::with_prelude(
    "children_add",
    2,
    "var WR = typeof WeakRef === 'function' ? WeakRef : null;
    function deref(r) { return WR !== null && r instanceof WR ? r.deref() : r; }",
    "var list = _1.children;
    if (list === null) {
        list = [];
        _1.children = list;
    }
    for (var i = 0; i < list.length; i++) {
        if (deref(list[i]) === _2) return false;
    }
    list.push(WR !== null ? new WR(_2) : _2);
    return true;",
);

pub(crate) const CHILDREN_LIST: Snippet = Snippet::with_prelude(
    "children_list",
    1,
    "var WR = typeof WeakRef === 'function' ? WeakRef : null;
    function deref(r) { return WR !== null && r instanceof WR ? r.deref() : r; }",
    "var list = _1.children, out = [], live = [];
    if (list === null) return out;
    for (var i = 0; i < list.length; i++) {
        var c = deref(list[i]);
        if (c === undefined) continue;
        out.push(c);
        live.push(list[i]);
    }
    _1.children = live;
    return out;",
);

// ============================================================================
// Hidden prototypes
// ============================================================================

pub(crate) const FORWARD_PROPERTY: Snippet = Snippet::with_prelude(
    "forward_property",
    3,
    "var gopd = Object.getOwnPropertyDescriptor,
         define = Object.defineProperty,
         create = Object.create,
         apply = Reflect.apply;
    function dataDesc(v) {
        var d = create(null);
        d.value = v;
        d.writable = true;
        d.enumerable = true;
        d.configurable = true;
        return d;
    }
    function forwarder(src, key, source) {
        var f = create(null);
        f.get = function () {
            var d = gopd(src, key);
            if (d === undefined) return src[key];
            if ('value' in d) return d.value;
            return d.get === undefined ? undefined : apply(d.get, this, []);
        };
        if ('value' in source ? source.writable : source.set !== undefined) {
            f.set = function (v) {
                var d = gopd(src, key);
                if (d !== undefined && !('value' in d)) {
                    if (d.set !== undefined) apply(d.set, this, [v]);
                    return;
                }
                if (d !== undefined && !d.writable) return;
                define(this, key, dataDesc(v));
            };
        }
        f.enumerable = source.enumerable;
        f.configurable = true;
        return f;
    }",
    "if (gopd(_1, _3) !== undefined) return false;
    var d = gopd(_2, _3);
    if (d === undefined) return false;
    define(_1, _3, forwarder(_2, _3, d));
    return true;",
);

// ============================================================================
// Accessors
// ============================================================================

pub(crate) const ACCESSOR_TRAMPOLINE: Snippet = Snippet::new(
    "accessor_trampoline",
    4,
    "var native = _1, name = _2, data = _3, holder = _4;
    return function (v) {
        return native(this, arguments.length, v, name, data, holder);
    };",
);

pub(crate) const SET_ACCESSOR_PROPERTY: Snippet = Snippet::with_prelude(
    "set_accessor_property",
    5,
    "var define = Reflect.defineProperty,
         defineOrThrow = Object.defineProperty,
         create = Object.create;
    function dataSetter(key) {
        return function (v) {
            var d = create(null);
            d.value = v;
            d.writable = true;
            d.enumerable = true;
            d.configurable = true;
            defineOrThrow(this, key, d);
        };
    }",
    "if (!delete _1[_2]) return false;
    var desc = create(null);
    desc.enumerable = !(_5 & 2);
    desc.configurable = !(_5 & 4);
    if (_4 === undefined) {
        desc.get = _3;
        if (!(_5 & 1)) desc.set = dataSetter(_2);
    } else if (_3 === undefined) {
        desc.set = _4;
    } else {
        desc.get = _3;
        desc.set = _4;
    }
    return define(_1, _2, desc);",
);

pub(crate) const FUNCTION_TRAMPOLINE: Snippet = Snippet::with_prelude(
    "function_trampoline",
    2,
    "var slice = Array.prototype.slice, apply = Reflect.apply;",
    "var native = _1, data = _2;
    return function () {
        return native(this, new.target !== undefined, apply(slice, arguments, []), data);
    };",
);

pub(crate) const ILLEGAL_INVOCATION: Snippet = Snippet::with_prelude(
    "illegal_invocation",
    0,
    "var TE = TypeError;",
    "return new TE('Illegal invocation');",
);

pub(crate) const STRICT_DETECT: Snippet = Snippet::new(
    "strict_detect",
    0,
    "return (function () { return !this; })();",
);

pub(crate) const NEW_ERROR: Snippet = Snippet::with_prelude(
    "new_error",
    1,
    "var E = Error;",
    "return new E(_1);",
);

// ============================================================================
// Object operations
// ============================================================================

pub(crate) const CLONE: Snippet = Snippet::with_prelude(
    "clone",
    1,
    "var assign = Object.assign, create = Object.create, protoOf = Object.getPrototypeOf;",
    "return assign(create(protoOf(_1)), _1);",
);

pub(crate) const IS_CONSTRUCTOR: Snippet = Snippet::with_prelude(
    "is_constructor",
    1,
    "var construct = Reflect.construct, S = String;",
    "if (typeof _1 !== 'function') return false;
    try {
        construct(S, [], _1);
        return true;
    } catch (e) {
        return false;
    }",
);

pub(crate) const CALL_AS_FUNCTION: Snippet = Snippet::with_prelude(
    "call_as_function",
    3,
    "var apply = Reflect.apply;",
    "return apply(_1, _2, _3);",
);

pub(crate) const CALL_AS_CONSTRUCTOR: Snippet = Snippet::with_prelude(
    "call_as_constructor",
    2,
    "var construct = Reflect.construct;",
    "return construct(_1, _2);",
);

pub(crate) const OBJECT_PROTO_TO_STRING: Snippet = Snippet::with_prelude(
    "object_proto_to_string",
    1,
    "var apply = Reflect.apply, toString = Object.prototype.toString;",
    "return apply(toString, _1, []);",
);

pub(crate) const CONSTRUCTOR_NAME: Snippet = Snippet::new(
    "constructor_name",
    1,
    "var c = _1.constructor;
    if (c === null || (typeof c !== 'object' && typeof c !== 'function')) return '';
    var n = c.name;
    return typeof n === 'string' ? n : '';",
);

pub(crate) const SET_INTEGRITY: Snippet = Snippet::with_prelude(
    "set_integrity",
    2,
    "var freeze = Object.freeze, seal = Object.seal;",
    "return (_2 ? seal(_1) : freeze(_1)) === _1;",
);

pub(crate) const NEW_EXTERNAL: Snippet = Snippet::with_prelude(
    "new_external",
    0,
    "var freeze = Object.freeze, create = Object.create;",
    "return freeze(create(null));",
);

pub(crate) const NEW_PRIVATE: Snippet = Snippet::with_prelude(
    "new_private",
    1,
    "var Sym = Symbol;",
    "return Sym(_1);",
);

pub(crate) const NEW_SECURITY_PROXY: Snippet = Snippet::with_prelude(
    "new_security_proxy",
    1,
    "var P = Proxy;",
    "return new P(_1, {});",
);

/// Every snippet, compiled up front when warm-up is enabled
pub(crate) const ALL: &[&Snippet] = &[
    &GET,
    &SET,
    &DEFINE_OWN,
    &DEFINE_DESCRIPTOR,
    &HAS,
    &HAS_OWN,
    &HAS_REAL_NAMED,
    &DELETE,
    &GET_OWN_DESCRIPTOR,
    &OWN_KEYS_FILTERED,
    &OWN_NAMES,
    &FOR_IN_KEYS,
    &CONCAT,
    &SKIP_INDICES,
    &UNIQUE_KEYS,
    &ATTRIBUTES,
    &GET_REAL_NAMED,
    &GET_PROTO,
    &SET_PROTO,
    &STRICT_EQUALS,
    &NEW_WEAK_MAP,
    &NEW_PLAIN_MAP,
    &SHADOW_LOOKUP,
    &SHADOW_ATTACH,
    &CHILDREN_ADD,
    &CHILDREN_LIST,
    &FORWARD_PROPERTY,
    &ACCESSOR_TRAMPOLINE,
    &SET_ACCESSOR_PROPERTY,
    &FUNCTION_TRAMPOLINE,
    &ILLEGAL_INVOCATION,
    &STRICT_DETECT,
    &NEW_ERROR,
    &CLONE,
    &IS_CONSTRUCTOR,
    &CALL_AS_FUNCTION,
    &CALL_AS_CONSTRUCTOR,
    &OBJECT_PROTO_TO_STRING,
    &CONSTRUCTOR_NAME,
    &SET_INTEGRITY,
    &NEW_EXTERNAL,
    &NEW_PRIVATE,
    &NEW_SECURITY_PROXY,
];

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_snippet_names_unique() {
        let mut seen = FxHashSet::default();
        for snippet in ALL {
            assert!(seen.insert(snippet.name), "duplicate snippet {}", snippet.name);
        }
    }

    #[test]
    fn test_snippet_bodies_only_use_declared_arguments() {
        for snippet in ALL {
            let next = format!("_{}", snippet.arity + 1);
            assert!(
                !snippet.body.contains(&next),
                "{} reads {} beyond its arity",
                snippet.name,
                next
            );
        }
    }
}
