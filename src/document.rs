//! The XML document a signature is placed into, held as the parser's event list.

use std::io::{Read, Write};
use std::str::FromStr;

use xml::reader::XmlEvent;

use crate::{SigningError, XMLDSIG_NAMESPACE, XMLDSIG_PREFIX};

/// A parsed XML document.
///
/// Comments, processing instructions and whitespace inside the root element are
/// kept so that the serialized form round-trips what the caller produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    events: Vec<XmlEvent>,
}

fn is_signature_element(name: &xml::name::OwnedName) -> bool {
    name.namespace.as_deref() == Some(XMLDSIG_NAMESPACE) && name.local_name == "Signature"
}

/// Index of the end event matching the start element at `start`.
pub(crate) fn subtree_end(events: &[XmlEvent], start: usize) -> Option<usize> {
    let mut level = 0usize;
    for (i, evt) in events.iter().enumerate().skip(start) {
        match evt {
            XmlEvent::StartElement { .. } => level += 1,
            XmlEvent::EndElement { .. } => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The events of the first element whose unprefixed `Id` attribute (in any
/// letter case) equals `id`, from its start event to its end event.
pub fn find_by_id<'a>(events: &'a [XmlEvent], id: &str) -> Option<&'a [XmlEvent]> {
    let start = events.iter().position(|evt| match evt {
        XmlEvent::StartElement { attributes, .. } => attributes.iter().any(|a| {
            a.name.prefix.is_none()
                && a.name.namespace.is_none()
                && a.name.local_name.eq_ignore_ascii_case("id")
                && a.value == id
        }),
        _ => false,
    })?;
    let end = subtree_end(events, start)?;
    Some(&events[start..end + 1])
}

impl Document {
    pub fn parse(source_xml: &str) -> Result<Self, SigningError> {
        Self::from_reader(source_xml.as_bytes())
    }

    pub fn from_reader<R: Read>(source: R) -> Result<Self, SigningError> {
        let events = crate::parse_events(source)?;
        let document = Document { events };
        if document.root_index().is_none() {
            return Err(SigningError::MissingRoot);
        }
        Ok(document)
    }

    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    /// Position of the root element's start event.
    pub fn root_index(&self) -> Option<usize> {
        self.events
            .iter()
            .position(|e| matches!(e, XmlEvent::StartElement { .. }))
    }

    /// See [`find_by_id`].
    pub fn find_by_id(&self, id: &str) -> Option<&[XmlEvent]> {
        find_by_id(&self.events, id)
    }

    /// Whether a `ds:Signature` element is already a child of the root element.
    pub fn has_enveloped_signature(&self) -> bool {
        let mut level = 0usize;
        for evt in &self.events {
            match evt {
                XmlEvent::StartElement { name, .. } => {
                    level += 1;
                    if level == 2 && is_signature_element(name) {
                        return true;
                    }
                }
                XmlEvent::EndElement { .. } => level -= 1,
                _ => {}
            }
        }
        false
    }

    /// Inserts an element subtree as the first child of the root element,
    /// ahead of any existing child node.
    ///
    /// The inserted start elements take the root's in-scope namespaces plus the
    /// `ds` binding, exactly as if they had been parsed in place.
    pub fn insert_as_first_child_of_root(
        &mut self,
        subtree: Vec<XmlEvent>,
    ) -> Result<(), SigningError> {
        let root_i = self.root_index().ok_or(SigningError::MissingRoot)?;
        let root_namespace = match &self.events[root_i] {
            XmlEvent::StartElement { namespace, .. } => namespace.clone(),
            _ => return Err(SigningError::MissingRoot),
        };

        let subtree = subtree
            .into_iter()
            .filter_map(|evt| match evt {
                XmlEvent::StartDocument { .. } | XmlEvent::EndDocument => None,
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let mut namespace = root_namespace.clone();
                    namespace
                        .0
                        .insert(XMLDSIG_PREFIX.to_string(), XMLDSIG_NAMESPACE.to_string());
                    Some(XmlEvent::StartElement {
                        name,
                        attributes,
                        namespace,
                    })
                }
                e => Some(e),
            })
            .collect::<Vec<_>>();

        let insert_at = root_i + 1;
        self.events.splice(insert_at..insert_at, subtree);
        Ok(())
    }

    pub fn write_to<W: Write>(&self, sink: W) -> Result<(), SigningError> {
        crate::write_events(&self.events, sink)
    }

    pub fn to_xml_string(&self) -> Result<String, SigningError> {
        crate::events_to_string(&self.events)
    }
}

impl FromStr for Document {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Document::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::Document;

    #[test]
    fn find_by_id_returns_whole_subtree() {
        let doc = Document::parse(
            r#"<Root><Entry Id="e1"><Entry>nested</Entry></Entry><Other ID="e2"/></Root>"#,
        )
        .unwrap();
        let entry = doc.find_by_id("e1").unwrap();
        assert_eq!(
            crate::c14n::exclusive_canonical(entry).unwrap(),
            r#"<Entry Id="e1"><Entry>nested</Entry></Entry>"#
        );
        let other = doc.find_by_id("e2").unwrap();
        assert_eq!(other.len(), 2);
        assert!(doc.find_by_id("missing").is_none());
    }

    #[test]
    fn prefixed_id_attributes_are_ignored() {
        let doc = Document::parse(r#"<Root xmlns:x="urn:x"><A x:Id="a"/></Root>"#).unwrap();
        assert!(doc.find_by_id("a").is_none());
    }

    #[test]
    fn detects_enveloped_signature_only_under_root() {
        let signed = Document::parse(
            r#"<Root><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/><Body/></Root>"#,
        )
        .unwrap();
        assert!(signed.has_enveloped_signature());

        let nested = Document::parse(
            r#"<Root><Body><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/></Body></Root>"#,
        )
        .unwrap();
        assert!(!nested.has_enveloped_signature());

        let foreign = Document::parse(r#"<Root><Signature/></Root>"#).unwrap();
        assert!(!foreign.has_enveloped_signature());
    }

    #[test]
    fn inserts_before_existing_first_child() {
        let mut doc = Document::parse("<Root><Body>X</Body></Root>").unwrap();
        let fragment = crate::parse_events(
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignatureValue>c2ln</ds:SignatureValue></ds:Signature>"#
                .as_bytes(),
        )
        .unwrap();
        doc.insert_as_first_child_of_root(fragment).unwrap();

        assert!(doc.has_enveloped_signature());
        assert_eq!(
            crate::c14n::exclusive_canonical(doc.events()).unwrap(),
            r#"<Root><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignatureValue>c2ln</ds:SignatureValue></ds:Signature><Body>X</Body></Root>"#
        );
    }

    #[test]
    fn serialization_round_trips() {
        let source_xml = r#"<Root xmlns="urn:dict" a="1"><!-- note --><Body>a &amp; b</Body></Root>"#;
        let doc = Document::parse(source_xml).unwrap();
        let reparsed = Document::parse(&doc.to_xml_string().unwrap()).unwrap();
        assert_eq!(
            crate::c14n::exclusive_canonical(doc.events()).unwrap(),
            crate::c14n::exclusive_canonical(reparsed.events()).unwrap()
        );
    }

    #[test]
    fn whitespace_in_values_written_as_references() {
        let doc = Document::parse(
            r#"<Root a="x&#x9;y&#xA;z&#xD;" b='say "hi"'><Body>a&#xD;b &lt; c</Body></Root>"#,
        )
        .unwrap();
        let output = doc.to_xml_string().unwrap();
        assert!(output.contains(r#"a="x&#x9;y&#xA;z&#xD;""#));
        assert!(output.contains(r#"b="say &quot;hi&quot;""#));
        assert!(output.contains("a&#xD;b &lt; c"));

        let reparsed = Document::parse(&output).unwrap();
        assert_eq!(
            crate::c14n::exclusive_canonical(reparsed.events()).unwrap(),
            crate::c14n::exclusive_canonical(doc.events()).unwrap()
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            Document::parse("<Root><Body></Root>"),
            Err(crate::SigningError::MalformedDocument(_))
        ));
        assert!(matches!(
            "".parse::<Document>(),
            Err(crate::SigningError::MalformedDocument(_)) | Err(crate::SigningError::MissingRoot)
        ));
    }
}
