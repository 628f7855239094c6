//! Authentication and authorization for the ecommerce backend.
//!
//! Authentication: a signed bearer token proves who the caller is, and the
//! account is re-checked against the user store on every request.
//! Authorization: a closed set of rules decides what the caller may do,
//! optionally against the owner of the resource being acted on.

pub mod claims;
pub mod error;
pub mod keys;
pub mod rule;
pub mod verifier;

pub use claims::Claims;
pub use error::AuthError;
pub use keys::{KeyLookup, KeyStore};
pub use rule::{Rule, authorize};
pub use verifier::Authenticator;
