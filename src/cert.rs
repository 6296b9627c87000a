use std::{
    io::{self, BufReader, Cursor},
    time::SystemTime,
};

use der::Decode as _;

use crate::{
    error::{Error, Result},
    key::KeyPair,
    login::Login,
    req::{req_header, req_links, req_safe_read_body, CONTENT_TYPE_PEM_CHAIN},
    session::{Resource, Session},
    trans::Transport,
    util::write_pem,
    api,
};

/// Enumeration of reasons for revocation.
///
/// The reason codes are taken from [RFC 5280 §5.3.1].
///
/// [RFC 5280 §5.3.1]: https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CACompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    // value 7 is not used
    RemoveFromCRL = 8,
    PrivilegeWithdrawn = 9,
    AACompromise = 10,
}

impl RevocationReason {
    // > the reason code CRL entry extension SHOULD be absent instead of
    // > using the unspecified (0) reasonCode value
    // see <https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1>
    pub(crate) fn to_code(reason: Option<RevocationReason>) -> Option<usize> {
        match reason {
            None | Some(RevocationReason::Unspecified) => None,
            Some(reason) => Some(reason as usize),
        }
    }
}

#[derive(Debug)]
struct Downloaded {
    pem: String,
    chain_der: Vec<Vec<u8>>,
    alternates: Vec<String>,
}

/// An issued certificate, downloadable once its order is valid.
///
/// Construction via [`Order::certificate()`](crate::order::Order::certificate)
/// is cheap; the chain is only fetched by [`download()`](Self::download)
/// and immutable afterwards.
#[derive(Debug)]
pub struct Certificate {
    login: Login,
    url: String,
    downloaded: Option<Downloaded>,
}

impl Certificate {
    pub(crate) fn new(login: Login, url: String) -> Certificate {
        Certificate {
            login,
            url,
            downloaded: None,
        }
    }

    /// The certificate download URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the certificate chain. A no-op when already downloaded.
    ///
    /// The response must be `application/pem-certificate-chain`; URLs of
    /// alternate chains are collected from `Link: rel="alternate"`
    /// headers.
    pub async fn download(&mut self) -> Result<()> {
        if self.downloaded.is_some() {
            return Ok(());
        }

        let res = self
            .login
            .post_as_get_accept(&self.url, CONTENT_TYPE_PEM_CHAIN)
            .await?;

        let content_type = req_header(&res, "content-type").unwrap_or_default();
        if !content_type.starts_with(CONTENT_TYPE_PEM_CHAIN) {
            return Err(Error::Protocol(format!(
                "expected {CONTENT_TYPE_PEM_CHAIN}, got {content_type:?}"
            )));
        }

        let alternates = req_links(&res, "alternate");
        let pem = req_safe_read_body(res).await;

        let mut reader = BufReader::new(Cursor::new(pem.as_bytes()));
        let chain_der = rustls_pemfile::certs(&mut reader)
            .map(|cert| cert.map(|der| der.to_vec()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|err| Error::Protocol(format!("invalid certificate chain: {err}")))?;

        if chain_der.is_empty() {
            return Err(Error::Protocol(
                "certificate response contained no certificates".to_owned(),
            ));
        }

        self.downloaded = Some(Downloaded {
            pem,
            chain_der,
            alternates,
        });

        Ok(())
    }

    fn downloaded(&self) -> Result<&Downloaded> {
        self.downloaded.as_ref().ok_or_else(|| {
            Error::Usage("certificate is not downloaded yet; call download() first".to_owned())
        })
    }

    /// The certificate chain in PEM format, as sent by the CA.
    pub fn certificate_pem(&self) -> Result<&str> {
        Ok(&self.downloaded()?.pem)
    }

    /// The certificate chain in DER format, end-entity certificate first.
    pub fn certificate_der_chain(&self) -> Result<&[Vec<u8>]> {
        Ok(&self.downloaded()?.chain_der)
    }

    /// The end-entity certificate in DER format.
    pub fn certificate_der(&self) -> Result<&[u8]> {
        // chain is verified non-empty at download
        Ok(&self.downloaded()?.chain_der[0])
    }

    /// URLs of alternate certificate chains offered by the CA, e.g.
    /// chains to a different root.
    pub fn alternates(&self) -> Result<&[String]> {
        Ok(&self.downloaded()?.alternates)
    }

    /// Writes the certificate chain as PEM.
    pub fn write_pem(&self, writer: &mut dyn io::Write) -> Result<()> {
        for der in self.certificate_der_chain()? {
            write_pem(der, "CERTIFICATE", writer)
                .map_err(|err| Error::Usage(format!("cannot write certificate: {err}")))?;
        }
        Ok(())
    }

    /// Counts the number of whole days the end-entity certificate is
    /// still valid. Negative for an expired certificate.
    ///
    /// The validity period is the CA's choice; Let's Encrypt issues for 90
    /// days, so a fresh certificate reports 89 whole days.
    pub fn valid_days_left(&self) -> Result<i64> {
        let cert = x509_cert::Certificate::from_der(self.certificate_der()?)
            .map_err(|err| Error::Protocol(format!("invalid certificate: {err}")))?;

        let not_after = SystemTime::UNIX_EPOCH
            + cert
                .tbs_certificate
                .validity
                .not_after
                .to_date_time()
                .unix_duration();

        const DAY: u64 = 24 * 60 * 60;
        let days = match not_after.duration_since(SystemTime::now()) {
            Ok(left) => (left.as_secs() / DAY) as i64,
            Err(past) => -((past.duration().as_secs() / DAY) as i64),
        };

        Ok(days)
    }

    /// Revokes this certificate, authorized by the account that ordered
    /// it.
    pub async fn revoke(&self, reason: Option<RevocationReason>) -> Result<()> {
        log::debug!("revoke");

        let url = self
            .login
            .session()
            .resource_url(Resource::RevokeCert)
            .await?;

        let revocation =
            api::Revocation::new(self.certificate_der()?, RevocationReason::to_code(reason));
        self.login.post(&url, &revocation).await?;

        Ok(())
    }

    /// Revokes a certificate without an account, authorized by the
    /// certificate's own key pair: the request is signed with `cert_key`
    /// and carries its public key as an embedded JWK.
    pub async fn revoke_with_key(
        session: &Session,
        cert_key: &KeyPair,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        log::debug!("revoke using the certificate key pair");

        let url = session.resource_url(Resource::RevokeCert).await?;

        let revocation = api::Revocation::new(cert_der, RevocationReason::to_code(reason));
        Transport::new(session)
            .call_jwk(&url, cert_key, &revocation)
            .await?;

        Ok(())
    }
}
