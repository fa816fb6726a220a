//! NewType wrappers for identities and credentials.
//!
//! Access and refresh tokens are both JWT strings on the wire; keeping them
//! as distinct types makes it impossible to hand a refresh token to code
//! that expects an access token (or the reverse).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generates a string newtype with the shared accessors and conversions.
///
/// The `secret` form redacts `Debug` output so credentials never leak into
/// logs through `{:?}`.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        newtype_string!(@common $name);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
    (
        secret
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        newtype_string!(@common $name);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(<redacted>)", stringify!($name))
            }
        }
    };
    (@common $name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Stable, immutable identifier of a user.
    ///
    /// This is the key part of the `user:<uid>` record and the `sub` claim of
    /// every token issued for the user.
    UserId
);

newtype_string!(
    secret
    /// Short-lived signed credential presented on each protected request.
    AccessToken
);

newtype_string!(
    secret
    /// Long-lived signed credential exchanged for a new token pair.
    ///
    /// Exactly one refresh token per user is valid at a time; it is stored
    /// server-side and rotated on every use.
    RefreshToken
);

impl UserId {
    /// Generate a fresh identifier.
    ///
    /// The `u` prefix keeps the key a plain identifier in SurrealQL (a bare
    /// leading digit would force escaping).
    pub fn generate() -> Self {
        Self(format!("u{}", uuid::Uuid::new_v4().simple()))
    }
}
