//! Exception Channel
//!
//! Bridge operations return `Maybe<T>` and report thrown values out of band.
//! Callers check both signals: an empty result and a caught exception are
//! independent.

use rquickjs::{Error, Value};

use crate::exec::exec;
use crate::snippets;
use crate::value::ValueRef;
use crate::Scope;

/// Per-operation exception slot.
///
/// Whatever it holds when dropped is reported to the scope.
pub(crate) struct ExceptionChannel<'s, 'js> {
    scope: &'s Scope<'js>,
    exception: Option<Value<'js>>,
}

impl<'s, 'js> ExceptionChannel<'s, 'js> {
    pub(crate) fn new(scope: &'s Scope<'js>) -> Self {
        Self { scope, exception: None }
    }

    /// Unwrap a host result, capturing the thrown value on failure
    pub(crate) fn check<T>(&mut self, result: rquickjs::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.capture(error);
                None
            }
        }
    }

    pub(crate) fn capture(&mut self, error: Error) {
        let exception = match error {
            Error::Exception => self.scope.ctx().catch(),
            other => self.host_error(other),
        };
        self.exception = Some(exception);
    }

    /// Whether an exception is pending on this channel
    pub(crate) fn should_throw(&self) -> bool {
        self.exception.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.exception = None;
    }

    /// Wrap a non-exception host failure in an `Error` object
    fn host_error(&self, error: Error) -> Value<'js> {
        let ctx = self.scope.ctx();
        let built = rquickjs::String::from_str(ctx.clone(), &error.to_string())
            .and_then(|message| exec(self.scope, &snippets::NEW_ERROR, &[message.into_value()]));
        match built {
            Ok(value) => value,
            Err(_) => {
                // Building the error threw; surface whatever is pending.
                ctx.catch()
            }
        }
    }
}

impl Drop for ExceptionChannel<'_, '_> {
    fn drop(&mut self) {
        if let Some(exception) = self.exception.take() {
            self.scope.report_exception(exception);
        }
    }
}

/// Catches exceptions reported to its scope while it is alive.
///
/// Instances nest; the innermost one catches.
pub struct TryCatch<'s, 'js> {
    scope: &'s Scope<'js>,
    depth: usize,
}

impl<'s, 'js> TryCatch<'s, 'js> {
    pub fn new(scope: &'s Scope<'js>) -> Self {
        let mut slots = scope.try_catches.borrow_mut();
        slots.push(None);
        let depth = slots.len();
        Self { scope, depth }
    }

    pub fn has_caught(&self) -> bool {
        self.slot().is_some()
    }

    /// The caught value
    pub fn exception(&self) -> Option<ValueRef<'js>> {
        self.slot().map(ValueRef::from_host)
    }

    /// `message` of the caught value, for `Error` instances
    pub fn message(&self) -> Option<String> {
        let exception = self.slot()?;
        let object = exception.as_object()?;
        object.get::<_, Option<String>>("message").ok().flatten()
    }

    /// Forget the caught exception
    pub fn reset(&self) {
        if let Some(slot) = self.scope.try_catches.borrow_mut().get_mut(self.depth - 1) {
            *slot = None;
        }
    }

    /// Hand the caught exception to the enclosing handler
    pub fn rethrow(self) {
        let scope = self.scope;
        let exception = self.slot();
        drop(self);
        if let Some(exception) = exception {
            scope.report_exception(exception);
        }
    }

    fn slot(&self) -> Option<Value<'js>> {
        self.scope
            .try_catches
            .borrow()
            .get(self.depth - 1)
            .cloned()
            .flatten()
    }
}

impl Drop for TryCatch<'_, '_> {
    fn drop(&mut self) {
        let mut slots = self.scope.try_catches.borrow_mut();
        debug_assert_eq!(slots.len(), self.depth, "TryCatch dropped out of order");
        slots.truncate(self.depth - 1);
    }
}

/// Run a bridge operation under the isolate lock with a fresh channel
pub(crate) fn bridged<'js, T>(
    scope: &Scope<'js>,
    op: impl FnOnce(&mut ExceptionChannel<'_, 'js>) -> Option<T>,
) -> Option<T> {
    let _lock = scope.lock();
    let mut channel = ExceptionChannel::new(scope);
    op(&mut channel)
}
