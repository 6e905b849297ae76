//! Enveloped XML-DSig signatures for messages submitted to the directory service.
//!
//! The directory verifies every request body against a fixed algorithm suite:
//! Exclusive C14N, SHA-256 digests and RSA-SHA256, with one reference over the
//! signer's `KeyInfo` and one over the whole document. [`XmlSigner`] produces
//! exactly that signature and places it as the first child of the root element.
//!
//! ```no_run
//! use dict_xmlsig::{Document, XmlSigner};
//!
//! # fn main() -> dict_xmlsig::Result<()> {
//! let signer = XmlSigner::from_pkcs12_file("signature.p12", "changeit")?;
//! let mut document = Document::parse("<CreateEntryRequest><Entry/></CreateEntryRequest>")?;
//! signer.sign(&mut document)?;
//! let body = document.to_xml_string()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate serde_derive;

pub mod c14n;
pub mod document;
pub mod error;
pub mod keystore;
pub mod proto;
pub mod signer;
pub mod transforms;

#[cfg(test)]
pub(crate) mod testing;

pub use document::Document;
pub use error::{CredentialLoadError, Error, NameError, Result, SigningError};
pub use keystore::SigningIdentity;
pub use signer::XmlSigner;

pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XMLDSIG_PREFIX: &str = "ds";

pub const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

pub const TRANSFORM_ENVELOPED_SIGNATURE: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

pub const CANONICAL_EXCLUSIVE_1_0: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

pub const SIGNATURE_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// Identifier of the `KeyInfo` element, referenced from `SignedInfo` as `#key-info-id`.
pub const KEY_INFO_ID: &str = "key-info-id";

/// Reference URI selecting the whole document.
pub const ROOT_URI: &str = "";

pub(crate) fn parse_events(
    source: impl std::io::Read,
) -> std::result::Result<Vec<xml::reader::XmlEvent>, SigningError> {
    xml::reader::EventReader::new_with_config(
        source,
        xml::ParserConfig::new()
            .ignore_comments(false)
            .trim_whitespace(false)
            .coalesce_characters(false)
            .ignore_root_level_whitespace(true),
    )
    .into_iter()
    .collect::<std::result::Result<Vec<_>, _>>()
    .map_err(|e| SigningError::MalformedDocument(e.to_string()))
}

/// Re-escapes the character data of a parsed event for output.
///
/// Tab, line feed and carriage return are written as character references so
/// that a receiving parser sees the same values the digests were computed over
/// instead of normalizing them to spaces and line feeds.
fn escaped_for_output(event: &xml::reader::XmlEvent) -> xml::reader::XmlEvent {
    match event {
        xml::reader::XmlEvent::StartElement {
            name,
            attributes,
            namespace,
        } => xml::reader::XmlEvent::StartElement {
            name: name.clone(),
            attributes: attributes
                .iter()
                .map(|a| xml::attribute::OwnedAttribute {
                    name: a.name.clone(),
                    value: c14n::escape_attr(&a.value),
                })
                .collect(),
            namespace: namespace.clone(),
        },
        xml::reader::XmlEvent::Characters(data)
        | xml::reader::XmlEvent::CData(data)
        | xml::reader::XmlEvent::Whitespace(data) => {
            xml::reader::XmlEvent::Characters(c14n::escape_text(data))
        }
        e => e.clone(),
    }
}

/// Writes reader events back out as XML text.
///
/// The declaration, when present, is always written as UTF-8 since that is the
/// encoding the output is produced in.
pub(crate) fn write_events<W: std::io::Write>(
    events: &[xml::reader::XmlEvent],
    sink: W,
) -> std::result::Result<(), SigningError> {
    let mut output_writer = xml::writer::EventWriter::new_with_config(
        sink,
        xml::writer::EmitterConfig {
            perform_indent: false,
            perform_escaping: false,
            write_document_declaration: true,
            autopad_comments: false,
            cdata_to_characters: true,
            line_separator: std::borrow::Cow::Borrowed("\n"),
            normalize_empty_elements: false,
            ..std::default::Default::default()
        },
    );

    for event in events {
        let escaped = escaped_for_output(event);
        let writer_event = match &escaped {
            xml::reader::XmlEvent::StartDocument {
                version,
                standalone,
                ..
            } => Some(xml::writer::XmlEvent::StartDocument {
                version: *version,
                encoding: Some("UTF-8"),
                standalone: *standalone,
            }),
            e => e.as_writer_event(),
        };
        if let Some(e) = writer_event {
            output_writer
                .write(e)
                .map_err(|e| SigningError::Serialization(e.to_string()))?;
        }
    }

    Ok(())
}

pub(crate) fn events_to_string(
    events: &[xml::reader::XmlEvent],
) -> std::result::Result<String, SigningError> {
    let mut output = Vec::new();
    write_events(events, &mut output)?;
    String::from_utf8(output).map_err(|e| SigningError::Serialization(e.to_string()))
}
