//! Claim values that are resolved when a token part is written, not when it
//! is built.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// A value produced on demand at serialization time.
///
/// Wrapping a closure in a `ValueSupplier` defers its evaluation to the
/// moment the surrounding value is encoded: a token built ahead of time
/// picks up whatever the closure returns at write time, and a token written
/// twice evaluates it twice. The wrapper encodes transparently, as if the
/// produced value had been in its place all along.
#[derive(Clone)]
pub struct ValueSupplier<T> {
    supplier: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> ValueSupplier<T> {
    /// Wraps `supplier` for write-time evaluation.
    pub fn new(supplier: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            supplier: Arc::new(supplier),
        }
    }

    /// Invokes the wrapped closure, producing the current value.
    pub fn get(&self) -> T {
        (self.supplier)()
    }
}

impl<T> fmt::Debug for ValueSupplier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSupplier").finish_non_exhaustive()
    }
}

impl<T> Serialize for ValueSupplier<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.get().serialize(serializer)
    }
}
