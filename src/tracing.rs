//! Module containing extension traits to support code instrumentation
//! of the serialization seam using the `tracing` crate.

use std::fmt::{Debug, Display};
use std::io::Write;
use std::marker::PhantomData;

use tracing::instrument;

use crate::serde::{Deserializer, Serializer};

/// [`Serializer`] type wrapper that provides instrumentation features
/// through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedSerializer<T, Inner>
where
    Inner: Serializer<T>,
{
    inner: Inner,
    value_type: PhantomData<T>,
}

impl<T, Inner> Serializer<T> for InstrumentedSerializer<T, Inner>
where
    T: Send + Sync,
    Inner: Serializer<T>,
    Inner::Error: Debug + Display,
{
    type Error = Inner::Error;

    #[instrument(name = "Serializer.serialize", ret, err, skip(self, value, out))]
    fn serialize(&self, value: &T, out: &mut dyn Write) -> Result<(), Self::Error> {
        self.inner.serialize(value, out)
    }
}

/// Extension trait for any [`Serializer`] type to provide instrumentation
/// features through the `tracing` crate.
pub trait SerializerExt<T>: Serializer<T> + Sized {
    /// Returns an instrumented version of the [`Serializer`] instance.
    fn with_tracing(self) -> InstrumentedSerializer<T, Self> {
        InstrumentedSerializer {
            inner: self,
            value_type: PhantomData,
        }
    }
}

impl<S, T> SerializerExt<T> for S where S: Serializer<T> {}

/// [`Deserializer`] type wrapper that provides instrumentation features
/// through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedDeserializer<T, Inner>
where
    Inner: Deserializer<T>,
{
    inner: Inner,
    value_type: PhantomData<T>,
}

impl<T, Inner> Deserializer<T> for InstrumentedDeserializer<T, Inner>
where
    T: Debug + Send + Sync,
    Inner: Deserializer<T>,
    Inner::Error: Debug + Display,
{
    type Error = Inner::Error;

    #[instrument(
        name = "Deserializer.deserialize",
        ret,
        err,
        skip(self, data),
        fields(len = data.len())
    )]
    fn deserialize(&self, data: &[u8]) -> Result<T, Self::Error> {
        self.inner.deserialize(data)
    }
}

/// Extension trait for any [`Deserializer`] type to provide instrumentation
/// features through the `tracing` crate.
pub trait DeserializerExt<T>: Deserializer<T> + Sized {
    /// Returns an instrumented version of the [`Deserializer`] instance.
    fn with_tracing(self) -> InstrumentedDeserializer<T, Self> {
        InstrumentedDeserializer {
            inner: self,
            value_type: PhantomData,
        }
    }
}

impl<D, T> DeserializerExt<T> for D where D: Deserializer<T> {}
