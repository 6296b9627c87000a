use std::{fmt, io, net::IpAddr};

use der::{
    asn1::{Ia5String, OctetString},
    Encode as _,
};
use x509_cert::{
    builder::{Builder as _, RequestBuilder},
    ext::pkix::{name::GeneralName, SubjectAltName},
    name::Name,
    request::CertReq,
};

use crate::{
    error::{Error, Result},
    key::KeyPair,
    util::{to_ace, write_pem},
};

/// Contents of a certificate signing request, see [`create_csr()`].
///
/// At least one domain or IP address is required. The first domain becomes
/// the subject's common name; every domain is added to the Subject
/// Alternative Name extension as a dNSName and every IP address as an
/// iPAddress.
#[derive(Debug, Clone, Default)]
pub struct CsrConfig {
    /// Domain names. IDN names are ACE encoded. Wildcard domains carry a
    /// `*.` prefix.
    pub domains: Vec<String>,

    /// IP addresses, for CAs that issue to IP identifiers.
    pub ips: Vec<IpAddr>,

    /// Subject `O`. At the CA's discretion whether it ends up in the
    /// certificate.
    pub organization: Option<String>,

    /// Subject `OU`.
    pub organizational_unit: Option<String>,

    /// Subject `L`.
    pub locality: Option<String>,

    /// Subject `ST`.
    pub state: Option<String>,

    /// Subject `C`.
    pub country: Option<String>,
}

/// Builds a PKCS#10 certificate signing request and signs it with `key`,
/// returning the DER encoding.
///
/// RSA keys sign with SHA256withRSA, EC keys with SHA256withECDSA (their
/// curve's standard digest for P-384/P-521).
pub fn create_csr(config: &CsrConfig, key: &KeyPair) -> Result<Vec<u8>> {
    let domains = config
        .domains
        .iter()
        .map(|domain| to_ace(domain))
        .collect::<Result<Vec<_>>>()?;

    if domains.is_empty() && config.ips.is_empty() {
        return Err(Error::Usage(
            "a CSR needs at least one domain or IP address".to_owned(),
        ));
    }

    let subject = subject_name(config, domains.first().map(String::as_str))?;

    let mut names = Vec::with_capacity(domains.len() + config.ips.len());
    for domain in &domains {
        let name = Ia5String::new(domain)
            .map_err(|err| Error::Usage(format!("invalid SAN {domain:?}: {err}")))?;
        names.push(GeneralName::DnsName(name));
    }
    for ip in &config.ips {
        let octets = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        names.push(GeneralName::IpAddress(
            OctetString::new(octets).map_err(csr_err)?,
        ));
    }
    let san = SubjectAltName(names);

    let csr = match key {
        KeyPair::Rsa(signer) => {
            let mut builder = RequestBuilder::new(subject, signer).map_err(csr_err)?;
            builder.add_extension(&san).map_err(csr_err)?;
            builder.build::<rsa::pkcs1v15::Signature>().map_err(csr_err)?
        }
        KeyPair::P256(signer) => {
            let mut builder = RequestBuilder::new(subject, signer).map_err(csr_err)?;
            builder.add_extension(&san).map_err(csr_err)?;
            builder
                .build::<p256::ecdsa::DerSignature>()
                .map_err(csr_err)?
        }
        KeyPair::P384(signer) => {
            let mut builder = RequestBuilder::new(subject, signer).map_err(csr_err)?;
            builder.add_extension(&san).map_err(csr_err)?;
            builder
                .build::<p384::ecdsa::DerSignature>()
                .map_err(csr_err)?
        }
        KeyPair::P521(signer) => {
            let mut builder = RequestBuilder::new(subject, signer).map_err(csr_err)?;
            builder.add_extension(&san).map_err(csr_err)?;
            builder
                .build::<p521::ecdsa::DerSignature>()
                .map_err(csr_err)?
        }
    };

    csr.to_der().map_err(csr_err)
}

/// Writes a DER-encoded CSR as PEM.
pub fn write_csr_pem(csr_der: &[u8], writer: &mut dyn io::Write) -> Result<()> {
    write_pem(csr_der, "CERTIFICATE REQUEST", writer)
        .map_err(|err| Error::Usage(format!("cannot write CSR: {err}")))
}

fn csr_err<E: fmt::Display>(err: E) -> Error {
    Error::Usage(format!("cannot build CSR: {err}"))
}

/// X.500 subject with the RDNs in insertion order: CN (the first domain),
/// then O, OU, L, ST, C as configured.
fn subject_name(config: &CsrConfig, common_name: Option<&str>) -> Result<Name> {
    let mut rdns = Vec::new();

    if let Some(cn) = common_name {
        rdns.push(format!("CN={}", escape_rdn_value(cn)));
    }
    for (kind, value) in [
        ("O", &config.organization),
        ("OU", &config.organizational_unit),
        ("L", &config.locality),
        ("ST", &config.state),
        ("C", &config.country),
    ] {
        if let Some(value) = value {
            rdns.push(format!("{kind}={}", escape_rdn_value(value)));
        }
    }

    if rdns.is_empty() {
        return Ok(Name::default());
    }

    // RFC 4514 strings list RDNs in reverse of the encoded sequence
    rdns.reverse();
    rdns.join(",")
        .parse::<Name>()
        .map_err(|err| Error::Usage(format!("invalid subject: {err}")))
}

/// Escapes an attribute value per RFC 4514 §2.4.
fn escape_rdn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, '"' | '+' | ',' | ';' | '<' | '>' | '\\')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');

        if needs_escape {
            out.push('\\');
        }
        out.push(ch);
    }

    out
}
