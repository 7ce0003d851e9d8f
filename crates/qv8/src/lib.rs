//! qv8 Object Model Bridge
//!
//! V8-style embedding object semantics over QuickJS (via rquickjs).
//!
//! Features:
//! - Property get/set/has/delete/define with V8 attribute and filter bitmasks
//! - Native accessors with signature-checked dispatch
//! - Hidden prototypes emulated with forwarding accessors
//! - Internal fields, private properties and identity hashes kept in a
//!   lazily created shadow record per object
//! - Out-of-band exceptions observed through `TryCatch`

mod accessor;
mod attributes;
mod callback;
mod config;
mod descriptor;
mod error;
mod exception;
mod exec;
mod hidden;
mod isolate;
mod object;
mod property;
mod shadow;
mod snippets;
mod template;
mod value;

pub use attributes::{IndexFilter, IntegrityLevel, KeyCollectionMode, PropertyAttribute, PropertyFilter};
pub use callback::{
    AccessorNameGetterCallback, AccessorNameSetterCallback, FunctionCallback, FunctionCallbackInfo, ImplicitArgs,
    PropertyCallbackInfo, ReturnValue,
};
pub use config::IsolateConfig;
pub use descriptor::PropertyDescriptor;
pub use error::BridgeError;
pub use exception::TryCatch;
pub use isolate::{Isolate, IsolateStats, Protected, Scope};
pub use template::{FunctionTemplate, ObjectTemplate, Signature};
pub use value::{ArrayRef, External, Maybe, ObjectRef, Private, ValueRef};

pub(crate) use exception::ExceptionChannel;
