//! Provisioning certificates from ACME (Automatic Certificate Management Environment) providers
//! such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! It follows the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) spec, using ACME v2 to
//! issue, renew and revoke certificates.
//!
//! # Usage
//!
//! 1. Create a [`Session`] for the CA's directory URL and register (or load) an [`Account`];
//!    every request from here on is signed with the account's key pair.
//! 2. Place an [`Order`](order::Order) for the domain names and/or IP addresses the certificate
//!    should cover.
//! 3. Prove control over each identifier by completing one challenge per pending
//!    [`Authorization`](authz::Authorization).
//! 4. Finalize the order with a CSR, poll until the certificate is issued, then download it.
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For ACME, this means proving you control either:
//!
//! - a server answering TLS or HTTP requests for that domain;
//! - the DNS server answering name lookups against the domain.
//!
//! To use this library, there are points in the flow where you would need to modify either the web
//! server or DNS server before progressing to get the certificate; which one depends on the
//! challenge type you pick:
//!
//! - [`http-01`](authz::Challenge::http_proof): serve a token file over plain HTTP
//! - [`dns-01`](authz::Challenge::dns_proof): publish a `TXT` record
//! - [`tls-alpn-01`](authz::Challenge::tls_alpn_proof): answer a TLS handshake under the
//!   `acme-tls/1` ALPN protocol
//!
//! ## Multiple Domains
//!
//! When creating a new order, it's possible to provide multiple alt-names that will also be part
//! of the certificate. The ACME API requires you to prove ownership of each such domain. See
//! [`Order::authorizations()`](order::Order::authorizations).
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused.
//! It might be tempting to put the poll interval really low in some of this library's polling
//! calls, but balance this against the real risk of having access cut off. Server-supplied
//! `Retry-After` deadlines are honored automatically, and rate-limit rejections surface as
//! [`ServerErrorKind::RateLimited`] with the earliest sensible retry time attached.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the
//! rate limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod account;
mod cert;
mod csr;
mod error;
mod jws;
mod key;
mod login;
mod req;
mod session;
mod trans;
mod util;

pub mod api;
pub mod authz;
pub mod order;

#[cfg(test)]
mod test;

pub use crate::{
    account::{Account, AccountConfig, AccountUpdate},
    cert::{Certificate, RevocationReason},
    csr::{create_csr, write_csr_pem, CsrConfig},
    error::{Error, Result, ServerError, ServerErrorKind},
    key::{create_p256_key, create_p384_key, create_p521_key, create_rsa_key, KeyPair},
    login::Login,
    session::{DirectoryUrl, Resource, Session, SessionConfig},
};
