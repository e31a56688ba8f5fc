//! JSON implementations of the [`Serializer`] and [`Deserializer`] seam
//! traits, built on the crate's [`JsonMapper`].

use std::io::Write;
use std::marker::PhantomData;

use serde::Serialize;

use crate::claims::{ClaimTypeMap, ClaimValue};
use crate::mapper::{Error, JsonMapper};
use crate::serde::{Deserializer, Serializer};

/// [`Serializer`] implementation encoding values as JSON through a
/// [`JsonMapper`].
#[derive(Debug, Clone)]
pub struct JsonSerializer<T>
where
    T: Serialize,
{
    mapper: JsonMapper,
    value_type: PhantomData<T>,
}

impl<T> JsonSerializer<T>
where
    T: Serialize,
{
    /// Creates a serializer backed by the shared default mapper.
    pub fn new() -> Self {
        Self::with_mapper(JsonMapper::shared().clone())
    }

    /// Creates a serializer backed by the supplied mapper.
    ///
    /// The mapper is taken by value: the serializer owns its configuration,
    /// and later customization of the caller's own instances has no effect
    /// on it.
    pub fn with_mapper(mapper: JsonMapper) -> Self {
        Self {
            mapper,
            value_type: PhantomData,
        }
    }

    /// The mapper backing this serializer.
    pub fn mapper(&self) -> &JsonMapper {
        &self.mapper
    }

    /// Encodes `value` as compact JSON into `out`.
    ///
    /// The sink stays open: the adapter writes through the borrow and leaves
    /// flushing and disposal to the caller, so several token parts can be
    /// written to one sink back to back.
    ///
    /// # Errors
    ///
    /// - [`Error::Unsupported`] when `value` contains something the engine
    ///   cannot encode.
    /// - [`Error::Io`] when the sink rejects a write; bytes already written
    ///   stay written.
    pub fn serialize(&self, value: &T, out: &mut dyn Write) -> Result<(), Error> {
        self.mapper.write_value(value, out)
    }
}

impl<T> Default for JsonSerializer<T>
where
    T: Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: Serialize + Send + Sync,
{
    type Error = Error;

    fn serialize(&self, value: &T, out: &mut dyn Write) -> Result<(), Self::Error> {
        JsonSerializer::serialize(self, value, out)
    }
}

/// [`Deserializer`] implementation decoding token parts into generic
/// [`ClaimValue`] graphs through a [`JsonMapper`], optionally decoding named
/// claims into concrete types.
///
/// A common usage example is decoding a custom `User` object out of a claim.
/// Given the payload:
///
/// ```json
/// {
///     "issuer": "https://issuer.example.com",
///     "user": {
///         "firstName": "Jill",
///         "lastName": "Coder"
///     }
/// }
/// ```
///
/// building the deserializer with a [`ClaimTypeMap`] carrying
/// `with_claim_type::<User>("user")` makes the `user` claim decode into a
/// `User` instance (wrapped in [`ClaimValue::Typed`]), while `issuer` and
/// every other claim keep the default generic representation.
#[derive(Debug, Clone)]
pub struct JsonDeserializer {
    mapper: JsonMapper,
}

impl JsonDeserializer {
    /// Creates a deserializer backed by the shared default mapper.
    pub fn new() -> Self {
        Self::with_mapper(JsonMapper::shared().clone())
    }

    /// Creates a deserializer backed by the supplied mapper.
    pub fn with_mapper(mapper: JsonMapper) -> Self {
        Self { mapper }
    }

    /// Creates a deserializer that decodes the claims named in `claim_types`
    /// into their registered concrete types.
    ///
    /// Claim-type support always derives a dedicated private mapper with the
    /// default policy bundle; the shared default mapper is left untouched,
    /// so other adapters keep its exact behavior. To combine claim types
    /// with your own mapper configuration, use
    /// [`JsonDeserializer::with_mapper_and_claim_types`].
    pub fn with_claim_types(claim_types: ClaimTypeMap) -> Self {
        Self::with_mapper(JsonMapper::new().with_claim_types(claim_types))
    }

    /// Creates a deserializer from the supplied mapper, with the claims
    /// named in `claim_types` layered on top.
    ///
    /// The supplied mapper is consumed: clones the caller made beforehand
    /// stay exactly as configured and never observe the claim-type
    /// registration.
    pub fn with_mapper_and_claim_types(mapper: JsonMapper, claim_types: ClaimTypeMap) -> Self {
        Self::with_mapper(mapper.with_claim_types(claim_types))
    }

    /// The mapper backing this deserializer.
    pub fn mapper(&self) -> &JsonMapper {
        &self.mapper
    }

    /// Decodes a single JSON value from `data`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `data` is empty; nothing is read.
    /// - [`Error::Parse`] when the input is not exactly one well-formed JSON
    ///   value.
    /// - [`Error::DuplicateField`] when an object repeats a key and the
    ///   mapper has strict duplicate detection enabled.
    /// - [`Error::ClaimConversion`] when a mapped claim cannot be decoded
    ///   into its registered type.
    pub fn deserialize(&self, data: &[u8]) -> Result<ClaimValue, Error> {
        self.mapper.read_value(data)
    }
}

impl Default for JsonDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<ClaimValue> for JsonDeserializer {
    type Error = Error;

    fn deserialize(&self, data: &[u8]) -> Result<ClaimValue, Self::Error> {
        JsonDeserializer::deserialize(self, data)
    }
}
