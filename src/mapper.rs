//! The configured JSON engine the serialization adapters delegate to.
//!
//! A [`JsonMapper`] bundles the policy a token pipeline requires from its
//! JSON engine: strict duplicate-key detection (a payload repeating a key is
//! rejected, never silently collapsed) and unknown-field tolerance (claims
//! with no registered schema decode fine). `serde_json` has no strict parse
//! mode of its own, so the duplicate-detecting read is implemented here with
//! a [`serde::de::DeserializeSeed`] driving the `serde_json` deserializer.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use lazy_static::lazy_static;
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::error::Category;
use serde_json::Number;

use crate::claims::{ClaimTypeMap, ClaimValue};

/// All possible errors returned by the JSON mapper and the adapters built on
/// top of it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a required argument is degenerate, such as an empty
    /// input slice passed to [`JsonMapper::read_value`]. Nothing has been
    /// read or written when this error surfaces.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Returned when the input is not well-formed JSON, is truncated, or
    /// carries trailing content after the first value.
    #[error("malformed json: {0}")]
    Parse(#[source] serde_json::Error),

    /// Returned when a JSON object repeats a key and the mapper has strict
    /// duplicate detection enabled.
    #[error("duplicate field \"{name}\" in json object")]
    DuplicateField {
        /// The repeated key.
        name: String,
    },

    /// Returned when a claim's value is structurally incompatible with the
    /// concrete type registered for it in a [`ClaimTypeMap`].
    #[error("failed to convert claim \"{claim}\" into {type_name}: {source}")]
    ClaimConversion {
        /// The name of the claim that failed to convert.
        claim: String,
        /// The target type registered for the claim.
        type_name: &'static str,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Returned when serialization encounters a value the engine cannot
    /// encode, such as a [`ClaimValue::Typed`] node.
    #[error("value cannot be encoded as json: {0}")]
    Unsupported(#[source] serde_json::Error),

    /// Returned when writing to the output sink fails. Bytes already written
    /// to the sink stay written; the sink itself is left untouched.
    #[error("failed to write json to output sink: {0}")]
    Io(#[source] io::Error),
}

lazy_static! {
    static ref SHARED: JsonMapper = JsonMapper::default();
}

/// A JSON engine instance carrying a fixed policy bundle.
///
/// The default bundle is the one token processing requires: strict
/// duplicate-key detection enabled, no claim types registered. Mappers are
/// immutable once built; every customization method consumes the mapper and
/// returns a new value, so a shared instance can never change behind its
/// users' backs.
#[derive(Debug, Clone)]
pub struct JsonMapper {
    strict_duplicate_detection: bool,
    claim_types: ClaimTypeMap,
}

impl Default for JsonMapper {
    fn default() -> Self {
        Self {
            strict_duplicate_detection: true,
            claim_types: ClaimTypeMap::new(),
        }
    }
}

impl JsonMapper {
    /// Creates a mapper with the default policy bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide shared mapper, built once on first use.
    ///
    /// The shared instance is safe for concurrent use and immutable:
    /// customization always derives a new mapper value (see
    /// [`JsonMapper::with_claim_types`]) and never touches this one.
    pub fn shared() -> &'static JsonMapper {
        &SHARED
    }

    /// Returns a mapper with duplicate-key detection set to `enabled`.
    ///
    /// With detection disabled the engine falls back to its lenient default:
    /// the last value wins when an object repeats a key.
    #[must_use]
    pub fn with_strict_duplicate_detection(mut self, enabled: bool) -> Self {
        self.strict_duplicate_detection = enabled;
        self
    }

    /// Returns a mapper that decodes the claims named in `claim_types` into
    /// their registered concrete types.
    ///
    /// Replaces any claim types the mapper already carried.
    #[must_use]
    pub fn with_claim_types(mut self, claim_types: ClaimTypeMap) -> Self {
        self.claim_types = claim_types;
        self
    }

    /// The claim types this mapper decodes into concrete values.
    pub fn claim_types(&self) -> &ClaimTypeMap {
        &self.claim_types
    }

    /// Reads a single JSON value from `data` into a generic [`ClaimValue`]
    /// graph, decoding any claims registered in the claim-type map into
    /// their concrete types.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `data` is empty; nothing is read.
    /// - [`Error::Parse`] when the input is not exactly one well-formed JSON
    ///   value.
    /// - [`Error::DuplicateField`] when an object repeats a key and strict
    ///   duplicate detection is enabled.
    /// - [`Error::ClaimConversion`] when a mapped claim cannot be decoded
    ///   into its registered type.
    pub fn read_value(&self, data: &[u8]) -> Result<ClaimValue, Error> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("no json content to read"));
        }

        let failure = Cell::new(None);
        let mut deserializer = serde_json::Deserializer::from_slice(data);

        let seed = ValueSeed {
            mapper: self,
            failure: &failure,
        };

        seed.deserialize(&mut deserializer)
            .and_then(|value| deserializer.end().map(|()| value))
            .map_err(|err| match failure.take() {
                Some(ReadFailure::DuplicateField { name }) => Error::DuplicateField { name },
                Some(ReadFailure::ClaimConversion {
                    claim,
                    type_name,
                    source,
                }) => Error::ClaimConversion {
                    claim,
                    type_name,
                    source,
                },
                None => match err.classify() {
                    Category::Io => Error::Io(err.into()),
                    _ => Error::Parse(err),
                },
            })
    }

    /// Writes `value` as compact JSON into `out`.
    ///
    /// The sink is borrowed for the duration of the call: it is never
    /// closed or flushed, and its lifecycle stays with the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::Unsupported`] when `value` contains something the engine
    ///   cannot encode.
    /// - [`Error::Io`] when the sink rejects a write; bytes already written
    ///   stay written.
    pub fn write_value<T>(&self, value: &T, out: &mut dyn Write) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_writer(out, value).map_err(|err| match err.classify() {
            Category::Io => Error::Io(err.into()),
            _ => Error::Unsupported(err),
        })
    }
}

/// What actually went wrong inside a strict read.
///
/// `serde` forces deserialization failures through the deserializer's own
/// error type, which flattens everything into a message string. The seeds
/// record the structured cause here before erroring out, and
/// [`JsonMapper::read_value`] recovers it once the engine unwinds.
enum ReadFailure {
    DuplicateField {
        name: String,
    },
    ClaimConversion {
        claim: String,
        type_name: &'static str,
        source: serde_json::Error,
    },
}

fn duplicate_field<E>(failure: &Cell<Option<ReadFailure>>, name: String) -> E
where
    E: de::Error,
{
    let error = E::custom(format_args!("duplicate field \"{name}\""));
    failure.set(Some(ReadFailure::DuplicateField { name }));
    error
}

/// Seed decoding an arbitrary JSON value into a [`ClaimValue`] graph,
/// consulting the mapper's claim-type map at every object field.
#[derive(Clone, Copy)]
struct ValueSeed<'a> {
    mapper: &'a JsonMapper,
    failure: &'a Cell<Option<ReadFailure>>,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = ClaimValue;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = ClaimValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("any json value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::Number(Number::from(value)))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::Number(Number::from(value)))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Number::from_f64(value)
            .map(ClaimValue::Number)
            .ok_or_else(|| E::custom("non-finite json number"))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::String(value.to_owned()))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::String(value))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(ClaimValue::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));

        while let Some(item) = seq.next_element_seed(self)? {
            items.push(item);
        }

        Ok(ClaimValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = BTreeMap::new();

        while let Some(name) = map.next_key::<String>()? {
            if self.mapper.strict_duplicate_detection && fields.contains_key(&name) {
                return Err(duplicate_field(self.failure, name));
            }

            let value = if let Some(converter) = self.mapper.claim_types.get(&name) {
                let type_name = converter.type_name();

                // The claim's value goes through a transient tree first, so
                // the concrete type decodes from a complete value rather
                // than a half-consumed token stream.
                let tree = map.next_value_seed(TreeSeed {
                    strict: self.mapper.strict_duplicate_detection,
                    failure: self.failure,
                })?;

                match converter.convert(tree) {
                    Ok(claim) => ClaimValue::Typed(claim),
                    Err(source) => {
                        let error = de::Error::custom(format_args!(
                            "claim \"{name}\" is not a valid {type_name}",
                        ));
                        self.failure.set(Some(ReadFailure::ClaimConversion {
                            claim: name,
                            type_name,
                            source,
                        }));
                        return Err(error);
                    },
                }
            } else {
                map.next_value_seed(self)?
            };

            fields.insert(name, value);
        }

        Ok(ClaimValue::Object(fields))
    }
}

/// Seed decoding a mapped claim's value into a transient
/// [`serde_json::Value`] tree, still under duplicate-key detection, before
/// conversion into the registered concrete type.
#[derive(Clone, Copy)]
struct TreeSeed<'a> {
    strict: bool,
    failure: &'a Cell<Option<ReadFailure>>,
}

impl<'de> DeserializeSeed<'de> for TreeSeed<'_> {
    type Value = serde_json::Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for TreeSeed<'_> {
    type Value = serde_json::Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("any json value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Number(Number::from(value)))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Number(Number::from(value)))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Number::from_f64(value)
            .map(serde_json::Value::Number)
            .ok_or_else(|| E::custom("non-finite json number"))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::String(value.to_owned()))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::String(value))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(serde_json::Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));

        while let Some(item) = seq.next_element_seed(self)? {
            items.push(item);
        }

        Ok(serde_json::Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = serde_json::Map::new();

        while let Some(name) = map.next_key::<String>()? {
            if self.strict && fields.contains_key(&name) {
                return Err(duplicate_field(self.failure, name));
            }

            let value = map.next_value_seed(self)?;
            fields.insert(name, value);
        }

        Ok(serde_json::Value::Object(fields))
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use lazy_static::lazy_static;

    use super::*;
    use crate::claims::TypedClaim;

    #[derive(Debug, PartialEq, Eq, serde::Deserialize)]
    struct User {
        #[serde(rename = "firstName")]
        first_name: String,
        #[serde(rename = "lastName")]
        last_name: String,
    }

    lazy_static! {
        static ref CLAIM_TYPES: ClaimTypeMap =
            ClaimTypeMap::new().with_claim_type::<User>("user");
    }

    #[test]
    fn reads_a_generic_claims_graph() {
        let claims = JsonMapper::shared()
            .read_value(br#"{"iss":"token-issuer","exp":1700000000,"flags":[true,null,3.5],"nested":{"scope":"read"}}"#)
            .expect("reading well-formed json should not fail");

        assert_eq!(Some("token-issuer"), claims.get("iss").and_then(ClaimValue::as_str));
        assert_eq!(Some(1_700_000_000), claims.get("exp").and_then(ClaimValue::as_i64));

        let flags = claims
            .get("flags")
            .and_then(ClaimValue::as_array)
            .expect("the flags claim is an array");
        assert_eq!(Some(true), flags[0].as_bool());
        assert!(flags[1].is_null());
        assert_eq!(Some(3.5), flags[2].as_f64());

        assert_eq!(
            Some("read"),
            claims
                .get("nested")
                .and_then(|nested| nested.get("scope"))
                .and_then(ClaimValue::as_str),
        );
    }

    #[test]
    fn the_shared_mapper_is_referentially_stable() {
        assert!(std::ptr::eq(JsonMapper::shared(), JsonMapper::shared()));
        assert!(JsonMapper::shared().claim_types().is_empty());
    }

    #[test]
    fn rejects_duplicate_top_level_fields() {
        let err = JsonMapper::shared()
            .read_value(br#"{"a":1,"a":2}"#)
            .expect_err("a repeated key should be rejected");

        if let Error::DuplicateField { name } = err {
            return assert_eq!("a", name);
        }

        panic!("expected duplicate field error, received: {err}");
    }

    #[test]
    fn rejects_duplicate_nested_fields() {
        let err = JsonMapper::shared()
            .read_value(br#"{"outer":{"inner":true,"inner":false}}"#)
            .expect_err("a repeated nested key should be rejected");

        if let Error::DuplicateField { name } = err {
            return assert_eq!("inner", name);
        }

        panic!("expected duplicate field error, received: {err}");
    }

    #[test]
    fn a_lenient_mapper_keeps_the_last_value() {
        let mapper = JsonMapper::new().with_strict_duplicate_detection(false);

        let claims = mapper
            .read_value(br#"{"a":1,"a":2}"#)
            .expect("a lenient mapper should accept repeated keys");

        assert_eq!(Some(2), claims.get("a").and_then(ClaimValue::as_i64));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = JsonMapper::shared()
            .read_value(br#"{"iss":"#)
            .expect_err("truncated json should be rejected");

        assert!(matches!(err, Error::Parse(_)), "received: {err}");
    }

    #[test]
    fn rejects_trailing_content() {
        let err = JsonMapper::shared()
            .read_value(br#"{"iss":"a"} trailing"#)
            .expect_err("trailing content should be rejected");

        assert!(matches!(err, Error::Parse(_)), "received: {err}");
    }

    #[test]
    fn rejects_empty_input_without_reading() {
        let err = JsonMapper::shared()
            .read_value(b"")
            .expect_err("empty input should be rejected");

        assert!(matches!(err, Error::InvalidArgument(_)), "received: {err}");
    }

    #[test]
    fn decodes_mapped_claims_into_their_registered_type() {
        let mapper = JsonMapper::new().with_claim_types(CLAIM_TYPES.clone());

        let claims = mapper
            .read_value(br#"{"issuer":"https://issuer.example.com","user":{"firstName":"Jill","lastName":"Coder"},"address":{"city":"Amsterdam"}}"#)
            .expect("reading should not fail");

        assert_eq!(
            Some("https://issuer.example.com"),
            claims.get("issuer").and_then(ClaimValue::as_str),
        );

        let user = claims
            .get("user")
            .and_then(ClaimValue::as_typed)
            .expect("the user claim is typed");
        assert_eq!(
            Some(&User {
                first_name: "Jill".to_owned(),
                last_name: "Coder".to_owned(),
            }),
            user.downcast_ref::<User>(),
        );

        // Unmapped objects keep the generic representation.
        assert!(claims.get("address").and_then(ClaimValue::as_object).is_some());
    }

    #[test]
    fn decodes_mapped_claims_at_any_depth() {
        let mapper = JsonMapper::new().with_claim_types(CLAIM_TYPES.clone());

        let claims = mapper
            .read_value(br#"{"payload":{"user":{"firstName":"Jill","lastName":"Coder"}}}"#)
            .expect("reading should not fail");

        let user = claims
            .get("payload")
            .and_then(|payload| payload.get("user"))
            .and_then(ClaimValue::as_typed)
            .expect("the nested user claim is typed");

        assert!(user.is::<User>());
    }

    #[test]
    fn tolerates_unknown_fields_in_mapped_claims() {
        let mapper = JsonMapper::new().with_claim_types(CLAIM_TYPES.clone());

        let claims = mapper
            .read_value(br#"{"user":{"firstName":"Jill","lastName":"Coder","age":40}}"#)
            .expect("unknown fields inside a mapped claim should be ignored");

        assert!(claims.get("user").and_then(ClaimValue::as_typed).is_some());
    }

    #[test]
    fn rejects_duplicate_fields_inside_mapped_claims() {
        let mapper = JsonMapper::new().with_claim_types(CLAIM_TYPES.clone());

        let err = mapper
            .read_value(br#"{"user":{"firstName":"Jill","firstName":"Jack","lastName":"Coder"}}"#)
            .expect_err("a repeated key inside a mapped claim should be rejected");

        if let Error::DuplicateField { name } = err {
            return assert_eq!("firstName", name);
        }

        panic!("expected duplicate field error, received: {err}");
    }

    #[test]
    fn reports_structurally_incompatible_mapped_claims() {
        let mapper = JsonMapper::new().with_claim_types(CLAIM_TYPES.clone());

        let err = mapper
            .read_value(br#"{"user":42}"#)
            .expect_err("a number cannot decode into the user type");

        if let Error::ClaimConversion {
            claim, type_name, ..
        } = err
        {
            assert_eq!("user", claim);
            return assert!(type_name.contains("User"));
        }

        panic!("expected claim conversion error, received: {err}");
    }

    #[test]
    fn writes_compact_json() {
        let mut sink = Vec::new();

        JsonMapper::shared()
            .write_value(&serde_json::json!({"alg": "none", "typ": "JWT"}), &mut sink)
            .expect("writing should not fail");

        assert_eq!(br#"{"alg":"none","typ":"JWT"}"#.to_vec(), sink);
    }

    #[test]
    fn refuses_to_encode_typed_claims() {
        let mut sink = Vec::new();

        let err = JsonMapper::shared()
            .write_value(&ClaimValue::Typed(TypedClaim::new(42u32)), &mut sink)
            .expect_err("typed claims are decode-side only");

        assert!(matches!(err, Error::Unsupported(_)), "received: {err}");
    }

    #[test]
    fn surfaces_sink_errors() {
        struct FailingSink;

        impl io::Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = JsonMapper::shared()
            .write_value(&serde_json::json!({"iss": "a"}), &mut FailingSink)
            .expect_err("the sink rejects every write");

        assert!(matches!(err, Error::Io(_)), "received: {err}");
    }
}
