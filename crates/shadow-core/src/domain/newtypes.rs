//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identifiers that
//! flow through every layer of the shadow manager. Each newtype enforces
//! validity at construction time so downstream code never has to
//! re-check a name's length or character set.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ShadowError;

/// Character set shared by thing names and shadow names.
fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-'
}

fn validate_charset(field: &str, value: &str) -> Result<(), ShadowError> {
    if value.is_empty() || !value.chars().all(is_valid_char) {
        return Err(ShadowError::InvalidArguments(format!(
            "{field} must match [a-zA-Z0-9:_-]+: {value:?}"
        )));
    }
    Ok(())
}

/// The logical device identity that owns one or more shadows.
///
/// Validation: non-empty, at most 128 characters, matching
/// `[a-zA-Z0-9:_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThingName(String);

impl ThingName {
    /// Maximum length in characters.
    pub const MAX_LEN: usize = 128;

    /// Creates a validated `ThingName`.
    ///
    /// # Errors
    /// Returns `ShadowError::InvalidArguments` if the name is empty,
    /// exceeds [`Self::MAX_LEN`], or contains characters outside
    /// `[a-zA-Z0-9:_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ShadowError> {
        let name = name.into();
        if name.len() > Self::MAX_LEN {
            return Err(ShadowError::InvalidArguments(format!(
                "thing name exceeds {} characters",
                Self::MAX_LEN
            )));
        }
        validate_charset("thing name", &name)?;
        Ok(Self(name))
    }

    /// Returns the inner string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ThingName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThingName {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ThingName {
    type Error = ShadowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ThingName> for String {
    fn from(name: ThingName) -> Self {
        name.0
    }
}

/// The name of a named shadow. `None` (or the empty string on the wire)
/// denotes the classic, unnamed shadow of a thing.
///
/// Validation: at most 64 characters, matching `[a-zA-Z0-9:_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShadowName(String);

impl ShadowName {
    /// Maximum length in characters.
    pub const MAX_LEN: usize = 64;

    /// Creates a validated `ShadowName`. An empty string is rejected;
    /// use `Option<ShadowName> = None` to represent the classic shadow.
    ///
    /// # Errors
    /// Returns `ShadowError::InvalidArguments` if the name is empty,
    /// exceeds [`Self::MAX_LEN`], or contains characters outside
    /// `[a-zA-Z0-9:_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ShadowError> {
        let name = name.into();
        if name.len() > Self::MAX_LEN {
            return Err(ShadowError::InvalidArguments(format!(
                "shadow name exceeds {} characters",
                Self::MAX_LEN
            )));
        }
        validate_charset("shadow name", &name)?;
        Ok(Self(name))
    }

    /// Parses an optional shadow name, treating the empty string as the
    /// classic shadow (`None`).
    ///
    /// # Errors
    /// Returns `ShadowError::InvalidArguments` if a non-empty name fails
    /// validation.
    pub fn parse_optional(name: &str) -> Result<Option<Self>, ShadowError> {
        if name.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::new(name)?))
        }
    }

    /// Returns the inner string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShadowName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ShadowName {
    type Error = ShadowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ShadowName> for String {
    fn from(name: ShadowName) -> Self {
        name.0
    }
}

/// The identity key of a shadow: a `(thing, shadow-name)` pair.
///
/// Used as the map key everywhere a shadow is addressed: the local
/// store, the write-lock registry, the sync request queues, and the
/// rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShadowKey {
    /// The owning thing.
    pub thing: ThingName,
    /// The named shadow, or `None` for the classic shadow.
    pub shadow: Option<ShadowName>,
}

impl ShadowKey {
    /// Creates a new shadow key.
    #[must_use]
    pub fn new(thing: ThingName, shadow: Option<ShadowName>) -> Self {
        Self { thing, shadow }
    }

    /// Creates the key for a thing's classic (unnamed) shadow.
    #[must_use]
    pub fn classic(thing: ThingName) -> Self {
        Self { thing, shadow: None }
    }

    /// True if this key addresses the classic shadow.
    #[must_use]
    pub fn is_classic(&self) -> bool {
        self.shadow.is_none()
    }

    /// The shadow-name segment as it appears in an MQTT topic: empty
    /// string for the classic shadow.
    #[must_use]
    pub fn shadow_name_str(&self) -> &str {
        self.shadow.as_ref().map_or("", ShadowName::as_str)
    }

    /// The resource identifier used for authorization checks:
    /// `"<thing>/shadow"` or `"<thing>/shadow/<name>"`.
    #[must_use]
    pub fn resource_id(&self) -> String {
        match &self.shadow {
            Some(name) => format!("{}/shadow/{}", self.thing, name),
            None => format!("{}/shadow", self.thing),
        }
    }
}

impl Display for ShadowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.shadow {
            Some(name) => write!(f, "{}/{}", self.thing, name),
            None => write!(f, "{}", self.thing),
        }
    }
}

/// An opaque client-supplied correlation token echoed back in responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientToken(String);

impl ClientToken {
    /// Maximum length in characters.
    pub const MAX_LEN: usize = 64;

    /// Creates a validated `ClientToken`.
    ///
    /// # Errors
    /// Returns `ShadowError::InvalidArguments` if the token is empty or
    /// exceeds [`Self::MAX_LEN`].
    pub fn new(token: impl Into<String>) -> Result<Self, ShadowError> {
        let token = token.into();
        if token.is_empty() || token.len() > Self::MAX_LEN {
            return Err(ShadowError::InvalidArguments(format!(
                "client token must be 1..={} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Self(token))
    }

    /// Returns the inner string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ClientToken {
    type Error = ShadowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ClientToken> for String {
    fn from(token: ClientToken) -> Self {
        token.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod thing_name_tests {
        use super::*;

        #[test]
        fn test_valid_name() {
            let name = ThingName::new("edge-gateway_01:A").unwrap();
            assert_eq!(name.as_str(), "edge-gateway_01:A");
        }

        #[test]
        fn test_empty_fails() {
            assert!(ThingName::new("").is_err());
        }

        #[test]
        fn test_max_len_accepted() {
            let name = "a".repeat(ThingName::MAX_LEN);
            assert!(ThingName::new(name).is_ok());
        }

        #[test]
        fn test_over_max_len_rejected() {
            let name = "a".repeat(ThingName::MAX_LEN + 1);
            assert!(ThingName::new(name).is_err());
        }

        #[test]
        fn test_invalid_char_rejected() {
            assert!(ThingName::new("bad/name").is_err());
            assert!(ThingName::new("bad name").is_err());
        }
    }

    mod shadow_name_tests {
        use super::*;

        #[test]
        fn test_empty_is_classic() {
            assert_eq!(ShadowName::parse_optional("").unwrap(), None);
        }

        #[test]
        fn test_non_empty_named() {
            let parsed = ShadowName::parse_optional("config").unwrap();
            assert_eq!(parsed.unwrap().as_str(), "config");
        }

        #[test]
        fn test_max_len_boundary() {
            let ok = "s".repeat(ShadowName::MAX_LEN);
            assert!(ShadowName::new(ok).is_ok());
            let bad = "s".repeat(ShadowName::MAX_LEN + 1);
            assert!(ShadowName::new(bad).is_err());
        }
    }

    mod shadow_key_tests {
        use super::*;

        #[test]
        fn test_classic_resource_id() {
            let key = ShadowKey::classic(ThingName::new("T1").unwrap());
            assert_eq!(key.resource_id(), "T1/shadow");
            assert!(key.is_classic());
            assert_eq!(key.shadow_name_str(), "");
        }

        #[test]
        fn test_named_resource_id() {
            let key = ShadowKey::new(
                ThingName::new("T1").unwrap(),
                Some(ShadowName::new("config").unwrap()),
            );
            assert_eq!(key.resource_id(), "T1/shadow/config");
            assert_eq!(key.to_string(), "T1/config");
        }
    }

    mod client_token_tests {
        use super::*;

        #[test]
        fn test_roundtrip() {
            let token = ClientToken::new("abc-123").unwrap();
            let json = serde_json::to_string(&token).unwrap();
            let parsed: ClientToken = serde_json::from_str(&json).unwrap();
            assert_eq!(token, parsed);
        }

        #[test]
        fn test_empty_rejected() {
            assert!(ClientToken::new("").is_err());
        }
    }
}
