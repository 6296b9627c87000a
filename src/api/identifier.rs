use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::{error::Result, util::to_ace};

/// An identifier a certificate can be requested for.
///
/// See [RFC 8555 §7.1.3] for `dns` and [RFC 8738] for `ip`.
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
/// [RFC 8738]: https://datatracker.ietf.org/doc/html/rfc8738
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    pub const TYPE_DNS: &'static str = "dns";
    pub const TYPE_IP: &'static str = "ip";

    /// DNS identifier. IDN domain names are ACE encoded.
    pub fn dns(domain: &str) -> Result<Self> {
        Ok(Self {
            type_: Self::TYPE_DNS.to_owned(),
            value: to_ace(domain)?,
        })
    }

    /// IP address identifier.
    pub fn ip(addr: IpAddr) -> Self {
        Self {
            type_: Self::TYPE_IP.to_owned(),
            value: addr.to_string(),
        }
    }

    pub fn is_type_dns(&self) -> bool {
        self.type_ == Self::TYPE_DNS
    }

    pub fn is_type_ip(&self) -> bool {
        self.type_ == Self::TYPE_IP
    }
}
