//! Loading the signing identity from a password-protected PKCS#12 store.

use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::{X509NameRef, X509Ref, X509};
use x509_parser::prelude::FromDer;

use crate::error::NameError;
use crate::CredentialLoadError;

const MEMORY_STORE: &str = "<memory>";

/// The private key and certificate every signature is produced with.
///
/// Immutable once loaded. openssl keys and certificates are reference counted
/// and safe to use from several threads, so one identity can back concurrent
/// signing calls.
pub struct SigningIdentity {
    private_key: PKey<Private>,
    certificate: X509,
    issuer_name: String,
    serial_number: String,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("issuer", &self.issuer_name)
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    /// Opens the store at `path` and unlocks it with `password`.
    ///
    /// The store must hold exactly one private key and the one certificate that
    /// belongs to it. Any other content is a configuration error.
    pub fn load<P: AsRef<Path>>(path: P, password: &str) -> Result<Self, CredentialLoadError> {
        let path = path.as_ref();
        let store = path.display().to_string();
        let der = std::fs::read(path).map_err(|source| CredentialLoadError::Io {
            store: store.clone(),
            source,
        })?;
        Self::from_der(&der, password, store)
    }

    /// Same as [`SigningIdentity::load`] for a store already read into memory.
    pub fn from_pkcs12_der(der: &[u8], password: &str) -> Result<Self, CredentialLoadError> {
        Self::from_der(der, password, MEMORY_STORE.to_string())
    }

    fn from_der(der: &[u8], password: &str, store: String) -> Result<Self, CredentialLoadError> {
        let pkcs12 = Pkcs12::from_der(der).map_err(|source| CredentialLoadError::Format {
            store: store.clone(),
            source,
        })?;
        let parsed = pkcs12
            .parse2(password)
            .map_err(|source| CredentialLoadError::Unlock {
                store: store.clone(),
                source,
            })?;

        let extra_certificates = parsed.ca.as_ref().map_or(0, |ca| ca.len());
        let (private_key, certificate) = match (parsed.pkey, parsed.cert) {
            (Some(private_key), Some(certificate)) if extra_certificates == 0 => {
                (private_key, certificate)
            }
            (pkey, cert) => {
                return Err(CredentialLoadError::EntryCount {
                    store,
                    keys: usize::from(pkey.is_some()),
                    certificates: usize::from(cert.is_some()) + extra_certificates,
                })
            }
        };

        let public_key = certificate
            .public_key()
            .map_err(|source| CredentialLoadError::Certificate {
                store: store.clone(),
                source,
            })?;
        if !private_key.public_eq(&public_key) {
            return Err(CredentialLoadError::KeyMismatch { store });
        }

        let serial_number = certificate
            .serial_number()
            .to_bn()
            .and_then(|serial| serial.to_dec_str().map(|s| s.to_string()))
            .map_err(|source| CredentialLoadError::Certificate {
                store: store.clone(),
                source,
            })?;
        let issuer_name = x509_name_to_string(certificate.issuer_name()).map_err(|source| {
            CredentialLoadError::IssuerName {
                store: store.clone(),
                source,
            }
        })?;
        log::debug!(
            "loaded signing identity from {}: issuer {}, serial {}",
            store,
            issuer_name,
            serial_number
        );

        Ok(SigningIdentity {
            private_key,
            certificate,
            issuer_name,
            serial_number,
        })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// Issuer distinguished name in RFC 4514 string form.
    pub fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    /// Certificate serial number in decimal.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

fn escape_rdn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            '\0' => escaped.push_str("\\00"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Number of attributes in each RDN of a DER encoded name, in encoding order.
fn rdn_sizes(name: &X509NameRef) -> Result<Vec<usize>, NameError> {
    let der = name.to_der()?;
    let (_, parsed) = x509_parser::x509::X509Name::from_der(&der)
        .map_err(|e| NameError::Malformed(e.to_string()))?;
    Ok(parsed.iter().map(|rdn| rdn.iter().count()).collect())
}

/// Formats a distinguished name the RFC 4514 way: most specific RDN first,
/// RDNs separated by commas, the attributes of a multi-valued RDN joined by
/// `+`, special characters escaped.
pub fn x509_name_to_string(name: &X509NameRef) -> Result<String, NameError> {
    let mut entries = name.entries();
    let mut rdns = Vec::new();
    for size in rdn_sizes(name)? {
        let mut attributes = Vec::with_capacity(size);
        for e in entries.by_ref().take(size) {
            let attribute_type = match e.object().nid().short_name() {
                Ok(s) => s.to_string(),
                Err(_) => e.object().to_string(),
            };
            let value = e
                .data()
                .as_utf8()
                .map_err(|_| NameError::NonStringValue(attribute_type.clone()))?;
            attributes.push(format!(
                "{}={}",
                attribute_type,
                escape_rdn_value(&value.to_string())
            ));
        }
        if attributes.len() != size {
            return Err(NameError::Malformed(
                "attribute count differs from the encoded name".to_string(),
            ));
        }
        rdns.push(attributes.join("+"));
    }
    if entries.next().is_some() {
        return Err(NameError::Malformed(
            "attribute count differs from the encoded name".to_string(),
        ));
    }
    rdns.reverse();
    Ok(rdns.join(","))
}

#[cfg(test)]
mod tests {
    use super::SigningIdentity;
    use crate::testing;
    use crate::CredentialLoadError;

    #[test]
    fn loads_single_identity() {
        let fixture = testing::identity();
        let der = testing::pkcs12(
            Some(&fixture.private_key),
            Some(&fixture.certificate),
            &[],
            testing::PASSWORD,
        );
        let identity = SigningIdentity::from_pkcs12_der(&der, testing::PASSWORD).unwrap();

        let cert_key = identity.certificate().public_key().unwrap();
        assert!(identity.private_key().public_eq(&cert_key));
        assert_eq!(
            identity.issuer_name(),
            "CN=Assinante de Teste,O=Banco Exemplo S.A.,C=BR"
        );
        assert_eq!(identity.serial_number(), testing::SERIAL.to_string());
    }

    #[test]
    fn loads_from_file() {
        let fixture = testing::identity();
        let der = testing::pkcs12(
            Some(&fixture.private_key),
            Some(&fixture.certificate),
            &[],
            testing::PASSWORD,
        );
        let path = testing::write_temp("single.p12", &der);
        let identity = SigningIdentity::load(&path, testing::PASSWORD).unwrap();
        assert_eq!(identity.serial_number(), testing::SERIAL.to_string());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SigningIdentity::load("/nonexistent/signature.p12", testing::PASSWORD)
            .unwrap_err();
        assert!(matches!(err, CredentialLoadError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/signature.p12"));
    }

    #[test]
    fn wrong_password_rejected() {
        let fixture = testing::identity();
        let der = testing::pkcs12(
            Some(&fixture.private_key),
            Some(&fixture.certificate),
            &[],
            testing::PASSWORD,
        );
        let err = SigningIdentity::from_pkcs12_der(&der, "not-the-password").unwrap_err();
        assert!(matches!(err, CredentialLoadError::Unlock { .. }));
        assert!(!err.to_string().contains("not-the-password"));
    }

    #[test]
    fn unrecognized_format_rejected() {
        let err = SigningIdentity::from_pkcs12_der(b"-----BEGIN CERTIFICATE-----", testing::PASSWORD)
            .unwrap_err();
        assert!(matches!(err, CredentialLoadError::Format { .. }));
    }

    #[test]
    fn store_with_two_entries_rejected() {
        let fixture = testing::identity();
        let other = testing::other_identity();
        let der = testing::pkcs12(
            Some(&fixture.private_key),
            Some(&fixture.certificate),
            &[other.certificate.clone()],
            testing::PASSWORD,
        );
        let err = SigningIdentity::from_pkcs12_der(&der, testing::PASSWORD).unwrap_err();
        match err {
            CredentialLoadError::EntryCount {
                keys, certificates, ..
            } => {
                assert_eq!(keys, 1);
                assert_eq!(certificates, 2);
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn store_without_identity_rejected() {
        let fixture = testing::identity();
        let der = testing::pkcs12(
            None,
            None,
            &[fixture.certificate.clone()],
            testing::PASSWORD,
        );
        let err = SigningIdentity::from_pkcs12_der(&der, testing::PASSWORD).unwrap_err();
        assert!(matches!(
            err,
            CredentialLoadError::EntryCount { keys: 0, .. }
        ));
    }

    #[test]
    fn distinguished_name_escaping() {
        let mut name = openssl::x509::X509NameBuilder::new().unwrap();
        name.append_entry_by_text("C", "BR").unwrap();
        name.append_entry_by_text("O", "Pagamentos, Ltda + Cia").unwrap();
        name.append_entry_by_text("CN", " #raiz").unwrap();
        let name = name.build();
        assert_eq!(
            super::x509_name_to_string(&name).unwrap(),
            r"CN=\ #raiz,O=Pagamentos\, Ltda \+ Cia,C=BR"
        );
    }

    #[test]
    fn trailing_space_after_backslash_escaped() {
        assert_eq!(super::escape_rdn_value("a\\ "), r"a\\\ ");
        assert_eq!(super::escape_rdn_value("#a#"), r"\#a#");
        assert_eq!(super::escape_rdn_value(" "), r"\ ");
        assert_eq!(super::escape_rdn_value(""), "");
    }

    #[test]
    fn multi_valued_rdn_joined_with_plus() {
        // C=BR / OU=Pix+O=Banco / CN=Ana
        let der: &[u8] = &[
            0x30, 0x37, //
            0x31, 0x0b, 0x30, 0x09, 0x06, 0x03, 0x55, 0x04, 0x06, 0x13, 0x02, b'B', b'R', //
            0x31, 0x1a, //
            0x30, 0x0a, 0x06, 0x03, 0x55, 0x04, 0x0b, 0x0c, 0x03, b'P', b'i', b'x', //
            0x30, 0x0c, 0x06, 0x03, 0x55, 0x04, 0x0a, 0x0c, 0x05, b'B', b'a', b'n', b'c', b'o',
            0x31, 0x0c, 0x30, 0x0a, 0x06, 0x03, 0x55, 0x04, 0x03, 0x0c, 0x03, b'A', b'n', b'a',
        ];
        let name = openssl::x509::X509Name::from_der(der).unwrap();
        assert_eq!(name.entries().count(), 4);
        assert_eq!(
            super::x509_name_to_string(&name).unwrap(),
            "CN=Ana,OU=Pix+O=Banco,C=BR"
        );
    }
}
