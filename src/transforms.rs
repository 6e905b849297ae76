//! Reference processing: the transforms a `Reference` declares, applied in
//! order, followed by the SHA-256 digest.

use xml::reader::XmlEvent;

use crate::proto;
use crate::{
    CANONICAL_EXCLUSIVE_1_0, DIGEST_SHA256, TRANSFORM_ENVELOPED_SIGNATURE, XMLDSIG_NAMESPACE,
};

enum InnerAlgorithmData<'a> {
    NodeSet(&'a [XmlEvent]),
    OctetStream(&'a str),
}

/// Data flowing between transforms: a node-set (event slice) or an octet stream.
#[derive(Debug)]
pub enum AlgorithmData<'a> {
    NodeSet(&'a [XmlEvent]),
    OwnedNodeSet(Vec<XmlEvent>),
    OwnedOctetStream(String),
}

impl<'a> AlgorithmData<'a> {
    fn as_inner_data(&self) -> InnerAlgorithmData<'_> {
        match self {
            AlgorithmData::NodeSet(n) => InnerAlgorithmData::NodeSet(n),
            AlgorithmData::OwnedNodeSet(n) => InnerAlgorithmData::NodeSet(n),
            AlgorithmData::OwnedOctetStream(o) => InnerAlgorithmData::OctetStream(o),
        }
    }
}

pub fn exclusive_canonical_xml_1_0<'a>(
    events: AlgorithmData<'a>,
) -> Result<AlgorithmData<'static>, String> {
    let events = match events.as_inner_data() {
        InnerAlgorithmData::NodeSet(e) => e,
        _ => return Err("unsupported input format for exclusive canonical XML 1.0".to_string()),
    };

    let canon_output = crate::c14n::exclusive_canonical(events)?;

    Ok(AlgorithmData::OwnedOctetStream(canon_output))
}

/// Drops every `ds:Signature` child of the root element, with its subtree.
pub fn enveloped_signature<'a>(events: AlgorithmData<'a>) -> Result<AlgorithmData<'static>, String> {
    let events = match events.as_inner_data() {
        InnerAlgorithmData::NodeSet(e) => e,
        _ => return Err("unsupported input format for enveloped signature transform".to_string()),
    };

    let mut level = 0;
    let mut output = vec![];
    let mut should_output = true;

    for evt in events {
        match evt {
            XmlEvent::StartElement { name, .. } => {
                level += 1;
                if level == 2
                    && name.namespace.as_deref() == Some(XMLDSIG_NAMESPACE)
                    && name.local_name == "Signature"
                {
                    should_output = false
                }
                if should_output {
                    output.push(evt.clone());
                }
            }
            XmlEvent::EndElement { name } => {
                if should_output {
                    output.push(evt.clone());
                }
                if level == 2
                    && name.namespace.as_deref() == Some(XMLDSIG_NAMESPACE)
                    && name.local_name == "Signature"
                {
                    should_output = true;
                }
                level -= 1;
            }
            e => {
                if should_output {
                    output.push(e.clone());
                }
            }
        }
    }

    Ok(AlgorithmData::OwnedNodeSet(output))
}

/// Runs the transforms a reference declares, in the order listed, and returns
/// the resulting octet stream.
pub fn apply_transforms(
    reference: &proto::ds::Reference,
    mut signed_data: AlgorithmData<'_>,
) -> Result<String, String> {
    if let Some(transforms) = &reference.transforms {
        for transform in &transforms.transforms {
            signed_data = match transform.algorithm.as_str() {
                TRANSFORM_ENVELOPED_SIGNATURE => enveloped_signature(signed_data)?,
                CANONICAL_EXCLUSIVE_1_0 => exclusive_canonical_xml_1_0(signed_data)?,
                u => {
                    return Err(format!("unsupported transformation: {}", u));
                }
            };
        }
    }

    Ok(match signed_data.as_inner_data() {
        InnerAlgorithmData::OctetStream(o) => o.to_string(),
        _ => return Err("transforms did not output octet stream".to_string()),
    })
}

/// Base64 digest of a reference's transformed data, using its declared digest method.
pub fn digest(reference: &proto::ds::Reference, data: AlgorithmData<'_>) -> Result<String, String> {
    if reference.digest_method.algorithm != DIGEST_SHA256 {
        return Err(format!(
            "unsupported digest: {}",
            reference.digest_method.algorithm
        ));
    }
    let octets = apply_transforms(reference, data)?;
    let digest = openssl::hash::hash(openssl::hash::MessageDigest::sha256(), octets.as_bytes())
        .map_err(|e| format!("openssl error: {}", e))?;
    Ok(base64::encode(digest))
}
