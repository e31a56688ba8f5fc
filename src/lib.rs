//! Pluggable JSON serialization adapters for JWT claims processing.
//!
//! A token processing pipeline does not encode or decode payloads itself: it
//! delegates to the [`Serializer`][crate::serde::Serializer] and
//! [`Deserializer`][crate::serde::Deserializer] capabilities defined in the
//! [`serde`][crate::serde] module. This crate implements those capabilities
//! on top of the `serde`/`serde_json` ecosystem, configured the way token
//! payloads require:
//!
//! - objects that repeat a key are rejected instead of silently keeping the
//!   last value (strict duplicate detection);
//! - unknown fields are tolerated, since tokens routinely carry claims the
//!   application has no schema for.
//!
//! All adapters share a process-wide, immutable default [`JsonMapper`];
//! customization always derives a new mapper value and never touches the
//! shared instance.
//!
//! Named claims can be decoded into concrete Rust types by registering them
//! in a [`ClaimTypeMap`]:
//!
//! ```
//! use jwt_json::{ClaimTypeMap, JsonDeserializer};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct User {
//!     #[serde(rename = "firstName")]
//!     first_name: String,
//!     #[serde(rename = "lastName")]
//!     last_name: String,
//! }
//!
//! let claim_types = ClaimTypeMap::new().with_claim_type::<User>("user");
//! let deserializer = JsonDeserializer::with_claim_types(claim_types);
//!
//! let claims = deserializer.deserialize(
//!     br#"{"issuer":"https://issuer.example.com","user":{"firstName":"Jill","lastName":"Coder"}}"#,
//! )?;
//!
//! let user = claims
//!     .get("user")
//!     .and_then(|claim| claim.as_typed())
//!     .and_then(|claim| claim.downcast_ref::<User>())
//!     .expect("the user claim decodes into the registered type");
//!
//! assert_eq!("Jill", user.first_name);
//! # Ok::<(), jwt_json::Error>(())
//! ```

pub mod claims;
pub mod json;
pub mod mapper;
pub mod serde;
pub mod supplier;
#[cfg(feature = "tracing")]
pub mod tracing;

pub use crate::claims::{ClaimTypeMap, ClaimValue, TypedClaim};
pub use crate::json::{JsonDeserializer, JsonSerializer};
pub use crate::mapper::{Error, JsonMapper};
pub use crate::supplier::ValueSupplier;
