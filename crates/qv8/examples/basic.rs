//! Example: a templated object with a native accessor
//!
//! Run with `RUST_LOG=qv8=debug` to see the bridge's own tracing.

use qv8::{FunctionTemplate, Isolate, PropertyAttribute, PropertyCallbackInfo, Signature, ValueRef};
use tracing_subscriber::EnvFilter;

fn width_getter(_name: ValueRef<'_>, info: &PropertyCallbackInfo<'_>) {
    let Some(holder) = info.holder() else { return };
    if let Some(field) = holder.get_internal_field(info.scope(), 0) {
        info.get_return_value().set(&field);
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let isolate = match Isolate::with_defaults() {
        Ok(isolate) => isolate,
        Err(e) => {
            eprintln!("isolate creation failed: {}", e);
            return;
        }
    };

    let shape = FunctionTemplate::new();
    shape.set_class_name("Shape");
    let instances = shape.instance_template();
    instances.set_internal_field_count(1);
    instances.set_accessor("width", width_getter, None, PropertyAttribute::READ_ONLY, Some(&Signature::new(&shape)));

    isolate.enter(|scope| {
        let Some(square) = shape.new_instance(scope) else { return };
        square.set_internal_field(scope, 0, &scope.integer(12));
        scope.global().set_str(scope, "square", &square.as_value());

        match scope.run_script("'width is ' + square.width") {
            Some(result) => println!("{}", result.to_rust_string().unwrap_or_default()),
            None => println!("script threw: {:?}", scope.last_uncaught_exception().and_then(|e| e.to_rust_string())),
        }
    });

    println!("{:?}", isolate.stats());
}
