//! The generic claims value graph, and the registry used to decode named
//! claims into concrete Rust types.

use std::any::{self, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::Serialize;
use serde_json::Number;

/// A JSON value decoded from a token part.
///
/// Mirrors the shape of a plain JSON document, with one extra variant:
/// [`ClaimValue::Typed`] holds a claim that was decoded into a concrete Rust
/// type through a [`ClaimTypeMap`] entry.
///
/// Re-encoding a graph that contains a [`ClaimValue::Typed`] node fails,
/// since the concrete type has been erased: typed claims are a decode-side
/// convenience, not a storage format.
#[derive(Debug)]
pub enum ClaimValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(Number),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<ClaimValue>),
    /// JSON object.
    Object(BTreeMap<String, ClaimValue>),
    /// A claim decoded into a concrete type registered in a [`ClaimTypeMap`].
    Typed(TypedClaim),
}

impl ClaimValue {
    /// Whether this value is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// This value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// This value as an `i64`, if it is a number representable as one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => value.as_i64(),
            _ => None,
        }
    }

    /// This value as a `u64`, if it is a number representable as one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(value) => value.as_u64(),
            _ => None,
        }
    }

    /// This value as an `f64`, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => value.as_f64(),
            _ => None,
        }
    }

    /// This value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// This value as a slice of elements, if it is an array.
    pub fn as_array(&self) -> Option<&[ClaimValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// This value as a map of fields, if it is an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, ClaimValue>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// This value as a typed claim, if it was decoded through a
    /// [`ClaimTypeMap`] entry.
    pub fn as_typed(&self) -> Option<&TypedClaim> {
        match self {
            Self::Typed(claim) => Some(claim),
            _ => None,
        }
    }

    /// Looks up a field by name, if this value is an object.
    pub fn get(&self, claim: &str) -> Option<&ClaimValue> {
        match self {
            Self::Object(fields) => fields.get(claim),
            _ => None,
        }
    }
}

impl PartialEq for ClaimValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            // Typed claims are type-erased and never compare equal.
            _ => false,
        }
    }
}

impl From<serde_json::Value> for ClaimValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(value) => Self::Number(value),
            serde_json::Value::String(value) => Self::String(value),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            },
            serde_json::Value::Object(fields) => Self::Object(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, value.into()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for ClaimValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Number(value) => value.serialize(serializer),
            Self::String(value) => serializer.serialize_str(value),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            },
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            },
            Self::Typed(claim) => Err(S::Error::custom(format_args!(
                "claim of type {} cannot be encoded back to json",
                claim.type_name(),
            ))),
        }
    }
}

/// A claim value decoded into a concrete Rust type.
///
/// The concrete type is erased so typed claims can live inside a generic
/// [`ClaimValue`] graph; callers recover the value through
/// [`TypedClaim::downcast_ref`] or [`TypedClaim::downcast`].
pub struct TypedClaim {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl TypedClaim {
    /// Wraps `value`, erasing its concrete type.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            type_name: any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// The fully-qualified name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the wrapped value as a `T`, if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Consumes the wrapper, returning the wrapped value.
    ///
    /// # Errors
    ///
    /// Returns the wrapper unchanged when the value is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, TypedClaim> {
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                type_name: self.type_name,
                value,
            }),
        }
    }
}

impl fmt::Debug for TypedClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedClaim")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

type ConvertFn = dyn Fn(serde_json::Value) -> Result<TypedClaim, serde_json::Error> + Send + Sync;

/// The conversion strategy from a transient JSON tree into one registered
/// concrete claim type.
pub(crate) struct ClaimConverter {
    type_name: &'static str,
    convert: Box<ConvertFn>,
}

impl ClaimConverter {
    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn convert(&self, tree: serde_json::Value) -> Result<TypedClaim, serde_json::Error> {
        (self.convert)(tree)
    }
}

impl fmt::Debug for ClaimConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimConverter")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Associates claim names with the concrete types their values should be
/// decoded into.
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
/// registering `with_claim_type::<User>("user")` makes the `user` claim
/// decode into a [`TypedClaim`] wrapping a `User` instance, instead of the
/// default generic object. Matching is by exact claim name, at every object
/// depth of the payload; claims whose name is not registered decode through
/// the generic path.
///
/// The map is a plain value: mappers and adapters take it by value and own
/// their copy, so later changes to a caller's own map never affect an
/// adapter already built from it.
#[derive(Debug, Clone, Default)]
pub struct ClaimTypeMap {
    converters: HashMap<String, Arc<ClaimConverter>>,
}

impl ClaimTypeMap {
    /// Creates an empty map: every claim decodes through the generic path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` as the concrete type for the claim named `claim`.
    ///
    /// Unknown fields encountered while decoding the claim into `T` are
    /// ignored, unless `T` itself opts out with `#[serde(deny_unknown_fields)]`.
    /// Registering the same name twice replaces the earlier entry.
    #[must_use]
    pub fn with_claim_type<T>(mut self, claim: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Any + Send + Sync,
    {
        let converter = ClaimConverter {
            type_name: any::type_name::<T>(),
            convert: Box::new(|tree| serde_json::from_value::<T>(tree).map(TypedClaim::new)),
        };

        self.converters.insert(claim.into(), Arc::new(converter));
        self
    }

    /// Whether no claim types have been registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// The number of registered claim types.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Whether a concrete type is registered for `claim`.
    pub fn contains(&self, claim: &str) -> bool {
        self.converters.contains_key(claim)
    }

    pub(crate) fn get(&self, claim: &str) -> Option<&ClaimConverter> {
        self.converters.get(claim).map(Arc::as_ref)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq, Eq, serde::Deserialize)]
    struct Session {
        id: String,
    }

    #[test]
    fn accessors_follow_the_value_shape() {
        let value = ClaimValue::from(serde_json::json!({
            "iss": "issuer",
            "exp": 1_700_000_000,
            "ratio": 0.5,
            "active": true,
            "aud": ["a", "b"],
            "sub": null,
        }));

        assert_eq!(Some("issuer"), value.get("iss").and_then(ClaimValue::as_str));
        assert_eq!(
            Some(1_700_000_000),
            value.get("exp").and_then(ClaimValue::as_i64),
        );
        assert_eq!(
            Some(1_700_000_000),
            value.get("exp").and_then(ClaimValue::as_u64),
        );
        assert_eq!(Some(0.5), value.get("ratio").and_then(ClaimValue::as_f64));
        assert_eq!(Some(true), value.get("active").and_then(ClaimValue::as_bool));
        assert_eq!(
            Some(2),
            value
                .get("aud")
                .and_then(ClaimValue::as_array)
                .map(|audience| audience.len()),
        );
        assert!(value.get("sub").is_some_and(ClaimValue::is_null));
        assert!(value.as_object().is_some());
        assert!(value.get("missing").is_none());
        assert!(value.get("iss").and_then(ClaimValue::as_typed).is_none());
    }

    #[test]
    fn typed_claims_downcast_to_their_concrete_type() {
        let claim = TypedClaim::new(Session {
            id: "abc".to_owned(),
        });

        assert!(claim.is::<Session>());
        assert!(!claim.is::<String>());
        assert!(claim.type_name().contains("Session"));
        assert_eq!(
            Some("abc"),
            claim.downcast_ref::<Session>().map(|session| session.id.as_str()),
        );

        let claim = claim
            .downcast::<String>()
            .expect_err("downcast to the wrong type should return the wrapper");

        let session = claim
            .downcast::<Session>()
            .expect("downcast to the wrapped type should not fail");
        assert_eq!("abc", session.id);
    }

    #[test]
    fn typed_claims_never_compare_equal() {
        let left = ClaimValue::Typed(TypedClaim::new(1u32));
        let right = ClaimValue::Typed(TypedClaim::new(1u32));

        assert_ne!(left, right);
        assert_ne!(left, ClaimValue::Null);
    }

    #[test]
    fn registering_a_claim_twice_replaces_the_entry() {
        let claim_types = ClaimTypeMap::new()
            .with_claim_type::<String>("session")
            .with_claim_type::<Session>("session");

        assert_eq!(1, claim_types.len());
        assert!(!claim_types.is_empty());
        assert!(claim_types.contains("session"));
        assert!(!claim_types.contains("user"));

        let converter = claim_types.get("session").expect("the entry is registered");
        let claim = converter
            .convert(serde_json::json!({"id": "abc"}))
            .expect("conversion into the replacement type should not fail");

        assert!(claim.is::<Session>());
    }
}
