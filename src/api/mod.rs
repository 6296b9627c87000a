//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod account;
mod authorization;
mod challenge;
mod directory;
mod finalize;
mod identifier;
mod order;
mod revocation;

pub use self::{
    account::{Account, AccountStatus},
    authorization::{Authorization, AuthorizationStatus},
    challenge::{Challenge, ChallengeStatus},
    directory::{Directory, DirectoryMeta},
    finalize::Finalize,
    identifier::Identifier,
    order::{Order, OrderStatus},
    revocation::Revocation,
};

/// Serializes to `""`.
///
/// The payload of a POST-as-GET request ([RFC 8555 §6.3]).
///
/// [RFC 8555 §6.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.3
pub struct EmptyString;

impl Serialize for EmptyString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

/// Serializes to `{}`.
///
/// The payload that triggers validation of a challenge.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

/// Serializes to `{"status":"deactivated"}`.
///
/// Shared by account and authorization deactivation requests.
pub struct Deactivation;

impl Serialize for Deactivation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("status", "deactivated")?;
        map.end()
    }
}

/// Error document per [RFC 7807], as returned by ACME servers with
/// `Content-Type: application/problem+json`.
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Problem type URI; `urn:ietf:params:acme:error:*` for ACME-defined
    /// errors. Absent means `about:blank`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// URL the user should visit to resolve the problem, e.g. updated
    /// terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// HTTP status code, when the server chose to repeat it in the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    /// The `urn:ietf:params:acme:error:` suffix, if this is an ACME error.
    pub fn acme_error(&self) -> Option<&str> {
        self.type_uri
            .as_deref()
            .and_then(|uri| uri.strip_prefix("urn:ietf:params:acme:error:"))
    }

    /// Returns true if problem type is `badNonce`.
    pub fn is_bad_nonce(&self) -> bool {
        self.acme_error() == Some("badNonce")
    }

    /// Finds the subproblem concerning the given identifier value.
    pub fn subproblem(&self, identifier_value: &str) -> Option<&Subproblem> {
        self.subproblems.iter().flatten().find(|sub| {
            sub.identifier
                .as_ref()
                .is_some_and(|id| id.value == identifier_value)
        })
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_uri = self.type_uri.as_deref().unwrap_or("about:blank");

        match &self.detail {
            Some(detail) => write!(f, "{type_uri}: {detail}"),
            None => f.write_str(type_uri),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,
}
