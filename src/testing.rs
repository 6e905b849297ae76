//! Test fixtures: self-signed identities and PKCS#12 stores built on the fly.

use std::path::PathBuf;
use std::sync::OnceLock;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509NameBuilder, X509};

use crate::{SigningIdentity, XmlSigner};

pub const PASSWORD: &str = "chave-de-teste";
pub const SERIAL: u32 = 4_242_424;

pub struct Fixture {
    pub private_key: PKey<Private>,
    pub certificate: X509,
}

fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn self_signed(private_key: PKey<Private>, common_name: &str, serial: u32) -> Fixture {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("C", "BR").unwrap();
    name.append_entry_by_text("O", "Banco Exemplo S.A.").unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&private_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(&private_key, MessageDigest::sha256()).unwrap();

    Fixture {
        private_key,
        certificate: builder.build(),
    }
}

pub fn identity() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| self_signed(rsa_key(), "Assinante de Teste", SERIAL))
}

pub fn other_identity() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| self_signed(rsa_key(), "Outro Assinante", SERIAL + 1))
}

pub fn ec_identity() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private_key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        self_signed(private_key, "Assinante EC", SERIAL + 2)
    })
}

pub fn pkcs12(
    private_key: Option<&PKey<Private>>,
    certificate: Option<&X509>,
    extra_certificates: &[X509],
    password: &str,
) -> Vec<u8> {
    let mut builder = Pkcs12::builder();
    builder.name("dict-signature");
    if let Some(private_key) = private_key {
        builder.pkey(private_key);
    }
    if let Some(certificate) = certificate {
        builder.cert(certificate);
    }
    if !extra_certificates.is_empty() {
        let mut ca = Stack::new().unwrap();
        for certificate in extra_certificates {
            ca.push(certificate.clone()).unwrap();
        }
        builder.ca(ca);
    }
    builder.build2(password).unwrap().to_der().unwrap()
}

pub fn write_temp(file_name: &str, contents: &[u8]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dict-xmlsig-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn signer() -> XmlSigner {
    signer_for(identity())
}

pub fn signer_for(fixture: &Fixture) -> XmlSigner {
    let _ = pretty_env_logger::try_init();
    let der = pkcs12(
        Some(&fixture.private_key),
        Some(&fixture.certificate),
        &[],
        PASSWORD,
    );
    XmlSigner::new(SigningIdentity::from_pkcs12_der(&der, PASSWORD).unwrap())
}
