//! The pluggable serialization seam a token processing pipeline invokes.
//!
//! Pipelines hold a [`Serializer`] to encode token parts they build and a
//! [`Deserializer`] to decode token parts they parse. Both traits are
//! dyn-compatible, so a pipeline can store boxed adapters chosen at runtime.
//! The [`json`][crate::json] module provides the JSON implementations.

use std::io::Write;

/// A serializer that encodes values of type `T` into a caller-supplied
/// output sink.
pub trait Serializer<T>: Send + Sync {
    /// The error returned by [`Serializer::serialize`].
    type Error: Send + Sync;

    /// Encodes `value` into `out`.
    ///
    /// Implementations write through the borrow and never close, consume, or
    /// flush the sink: its lifecycle stays with the caller. On failure, bytes
    /// already written to the sink stay written.
    fn serialize(&self, value: &T, out: &mut dyn Write) -> Result<(), Self::Error>;
}

/// A deserializer that decodes values of type `T` from an encoded byte
/// slice.
pub trait Deserializer<T>: Send + Sync {
    /// The error returned by [`Deserializer::deserialize`].
    type Error: Send + Sync;

    /// Decodes a single value of type `T` from `data`.
    fn deserialize(&self, data: &[u8]) -> Result<T, Self::Error>;
}

/// A [`Serializer`] and [`Deserializer`] over the same wire format.
pub trait Serde<T>: Serializer<T> + Deserializer<T> {}

impl<S, T> Serde<T> for S where S: Serializer<T> + Deserializer<T> {}

#[cfg(test)]
mod test {
    use std::fmt::Debug;
    use std::io::Write;

    use super::*;
    use crate::{ClaimValue, Error, JsonDeserializer, JsonSerializer};

    struct ClaimsSerde {
        serializer: JsonSerializer<ClaimValue>,
        deserializer: JsonDeserializer,
    }

    impl Serializer<ClaimValue> for ClaimsSerde {
        type Error = Error;

        fn serialize(&self, value: &ClaimValue, out: &mut dyn Write) -> Result<(), Self::Error> {
            self.serializer.serialize(value, out)
        }
    }

    impl Deserializer<ClaimValue> for ClaimsSerde {
        type Error = Error;

        fn deserialize(&self, data: &[u8]) -> Result<ClaimValue, Self::Error> {
            self.deserializer.deserialize(data)
        }
    }

    fn roundtrip<S>(serde: &S, data: &[u8]) -> ClaimValue
    where
        S: Serde<ClaimValue>,
        <S as Serializer<ClaimValue>>::Error: Debug,
        <S as Deserializer<ClaimValue>>::Error: Debug,
    {
        let claims = serde.deserialize(data).expect("decoding should not fail");

        let mut sink = Vec::new();
        serde
            .serialize(&claims, &mut sink)
            .expect("encoding should not fail");

        serde.deserialize(&sink).expect("re-decoding should not fail")
    }

    #[test]
    fn the_blanket_serde_impl_covers_both_capabilities() {
        let serde = ClaimsSerde {
            serializer: JsonSerializer::new(),
            deserializer: JsonDeserializer::new(),
        };

        let data = br#"{"iss":"issuer","aud":["a","b"],"active":true}"#;
        let original = serde.deserialize(data).expect("decoding should not fail");

        assert_eq!(original, roundtrip(&serde, data));
    }
}
