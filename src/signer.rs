//! The enveloped signature builder.

use std::path::Path;

use openssl::hash::MessageDigest;
use openssl::pkey::Id;
use xml::reader::XmlEvent;

use crate::proto;
use crate::transforms::{self, AlgorithmData};
use crate::{
    CredentialLoadError, Document, SigningError, SigningIdentity, CANONICAL_EXCLUSIVE_1_0,
    DIGEST_SHA256, KEY_INFO_ID, ROOT_URI, SIGNATURE_RSA_SHA256, TRANSFORM_ENVELOPED_SIGNATURE,
    XMLDSIG_NAMESPACE,
};

/// Signs documents with one loaded [`SigningIdentity`].
///
/// The algorithm suite is fixed: the directory only accepts Exclusive C14N,
/// SHA-256 and RSA-SHA256, so none of it is configurable.
#[derive(Debug)]
pub struct XmlSigner {
    identity: SigningIdentity,
}

fn reference(uri: &str, transforms: &[&str]) -> proto::ds::Reference {
    proto::ds::Reference {
        transforms: Some(proto::ds::Transforms {
            transforms: transforms
                .iter()
                .map(|algorithm| proto::ds::Transform {
                    algorithm: algorithm.to_string(),
                })
                .collect(),
        }),
        digest_method: proto::ds::DigestMethod {
            algorithm: DIGEST_SHA256.to_string(),
        },
        digest_value: String::new(),
        uri: Some(uri.to_string()),
    }
}

/// Reference A: the `KeyInfo` element, by id.
fn key_info_reference() -> proto::ds::Reference {
    reference(&format!("#{}", KEY_INFO_ID), &[CANONICAL_EXCLUSIVE_1_0])
}

/// Reference B: the whole document, minus the signature itself.
fn root_reference() -> proto::ds::Reference {
    reference(
        ROOT_URI,
        &[TRANSFORM_ENVELOPED_SIGNATURE, CANONICAL_EXCLUSIVE_1_0],
    )
}

/// Serializes a proto element and parses it back, so digests and the signature
/// are computed over exactly the events a verifier will see.
///
/// The serializer indents its output. Indentation depends on nesting depth, so
/// it is dropped here: the `KeyInfo` serialized alone and the one inside the
/// full `Signature` must produce the same events.
fn to_parsed_events<T: serde::Serialize>(value: &T) -> Result<Vec<XmlEvent>, SigningError> {
    let serialized = xml_serde::to_string_custom(
        value,
        xml_serde::Options {
            include_schema_location: false,
        },
    )
    .map_err(|e| SigningError::Serialization(e.to_string()))?;
    Ok(crate::parse_events(serialized.as_bytes())?
        .into_iter()
        .filter(|e| !matches!(e, XmlEvent::Whitespace(_)))
        .collect())
}

/// Exclusive canonical form of the first element named `local_name` in the
/// `ds` namespace.
fn canonical_ds_element(events: &[XmlEvent], local_name: &str) -> Result<String, SigningError> {
    let start = events
        .iter()
        .position(|e| match e {
            XmlEvent::StartElement { name, .. } => {
                name.namespace.as_deref() == Some(XMLDSIG_NAMESPACE) && name.local_name == local_name
            }
            _ => false,
        })
        .ok_or_else(|| SigningError::Serialization(format!("no ds:{} element", local_name)))?;
    let end = crate::document::subtree_end(events, start)
        .ok_or_else(|| SigningError::Serialization(format!("ds:{} is not closed", local_name)))?;
    crate::c14n::exclusive_canonical(&events[start..end + 1]).map_err(SigningError::Transform)
}

fn key_info_digest(
    key_info_ref: &proto::ds::Reference,
    events: &[XmlEvent],
) -> Result<String, SigningError> {
    let subtree = crate::document::find_by_id(events, KEY_INFO_ID)
        .ok_or_else(|| SigningError::UnresolvedReference(format!("#{}", KEY_INFO_ID)))?;
    transforms::digest(key_info_ref, AlgorithmData::NodeSet(subtree)).map_err(SigningError::Transform)
}

impl XmlSigner {
    pub fn new(identity: SigningIdentity) -> Self {
        XmlSigner { identity }
    }

    /// Loads the identity from a PKCS#12 file. The password is only used to
    /// unlock the store and is not kept.
    pub fn from_pkcs12_file<P: AsRef<Path>>(
        path: P,
        password: &str,
    ) -> Result<Self, CredentialLoadError> {
        Ok(Self::new(SigningIdentity::load(path, password)?))
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    fn key_info(&self) -> proto::ds::KeyInfo {
        proto::ds::KeyInfo {
            keys_info: vec![proto::ds::KeyInfoType::X509Data(proto::ds::X509Data {
                x509_data: vec![proto::ds::X509Datum::IssuerSerial(
                    proto::ds::X509IssuerSerial {
                        issuer_name: self.identity.issuer_name().to_string(),
                        serial_number: self.identity.serial_number().to_string(),
                    },
                )],
            })],
            id: Some(KEY_INFO_ID.to_string()),
        }
    }

    fn signature_value(&self, canonical_signed_info: &str) -> Result<String, SigningError> {
        let private_key = self.identity.private_key();
        if private_key.id() != Id::RSA {
            return Err(SigningError::UnsupportedKey(private_key.id()));
        }

        let mut signer = openssl::sign::Signer::new(MessageDigest::sha256(), private_key)?;
        signer.update(canonical_signed_info.as_bytes())?;
        let signature = signer.sign_to_vec()?;

        Ok(base64::encode(signature))
    }

    /// Signs `document` in place.
    ///
    /// The `ds:Signature` element becomes the first child of the root element.
    /// Everything is computed before the document is touched, so on error the
    /// document is exactly as it was passed in.
    pub fn sign(&self, document: &mut Document) -> Result<(), SigningError> {
        if document.has_enveloped_signature() {
            return Err(SigningError::AlreadySigned);
        }
        if document.find_by_id(KEY_INFO_ID).is_some() {
            return Err(SigningError::DuplicateId(KEY_INFO_ID.to_string()));
        }

        let mut root_ref = root_reference();
        root_ref.digest_value =
            transforms::digest(&root_ref, AlgorithmData::NodeSet(document.events()))
                .map_err(SigningError::Transform)?;
        log::trace!("reference {:?} digest {}", ROOT_URI, root_ref.digest_value);

        let key_info = self.key_info();
        let key_info_events = to_parsed_events(&proto::ds::OuterKeyInfo {
            key_info: key_info.clone(),
        })?;
        let mut key_info_ref = key_info_reference();
        key_info_ref.digest_value = key_info_digest(&key_info_ref, &key_info_events)?;
        log::trace!(
            "reference {:?} digest {}",
            key_info_ref.uri,
            key_info_ref.digest_value
        );
        let signed_key_info_ref = key_info_ref.clone();

        let signed_info = proto::ds::SignedInfo {
            canonicalization_method: proto::ds::CanonicalizationMethod {
                algorithm: CANONICAL_EXCLUSIVE_1_0.to_string(),
            },
            signature_method: proto::ds::SignatureMethod {
                algorithm: SIGNATURE_RSA_SHA256.to_string(),
            },
            reference: vec![key_info_ref, root_ref],
        };
        let signed_info_events = to_parsed_events(&proto::ds::OuterSignedInfo {
            signed_info: signed_info.clone(),
        })?;
        let canonical_signed_info = canonical_ds_element(&signed_info_events, "SignedInfo")?;

        let signature = proto::ds::OuterSignature {
            signature: proto::ds::Signature {
                signed_info,
                signature_value: proto::ds::SignatureValue {
                    value: self.signature_value(&canonical_signed_info)?,
                },
                key_info: Some(key_info),
            },
        };
        let signature_events = to_parsed_events(&signature)?;

        // The inserted element must carry exactly what was digested and signed.
        if key_info_digest(&signed_key_info_ref, &signature_events)?
            != signed_key_info_ref.digest_value
            || canonical_ds_element(&signature_events, "SignedInfo")? != canonical_signed_info
        {
            return Err(SigningError::Serialization(
                "serialized signature differs from the signed content".to_string(),
            ));
        }

        document.insert_as_first_child_of_root(signature_events)?;
        log::debug!(
            "inserted enveloped signature by {}",
            self.identity.issuer_name()
        );

        Ok(())
    }

    /// Parses, signs and serializes a document.
    pub fn sign_str(&self, source_xml: &str) -> Result<String, SigningError> {
        let mut document = Document::parse(source_xml)?;
        self.sign(&mut document)?;
        document.to_xml_string()
    }
}
