//! Exclusive XML Canonicalization 1.0, without comments and without an
//! inclusive namespace prefix list (`http://www.w3.org/2001/10/xml-exc-c14n#`).

use std::collections::BTreeMap;

use xml::reader::XmlEvent;

pub(crate) fn escape_text(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    for ch in data.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn qualified_name(name: &xml::name::OwnedName) -> String {
    match name.prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, name.local_name),
        _ => name.local_name.clone(),
    }
}

/// Canonicalizes an event slice.
///
/// The slice is either a whole document or a single element subtree, as
/// produced by [`crate::Document::find_by_id`]. Namespace declarations are
/// taken from the in-scope namespaces the parser recorded on each start
/// element, so a subtree canonicalizes the same way in or out of its document.
pub fn exclusive_canonical(events: &[XmlEvent]) -> Result<String, String> {
    let mut output = String::new();
    // Declarations rendered by output ancestors, innermost last.
    let mut rendered_ns: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];
    let mut level: usize = 0;
    let mut seen_element = false;

    for event in events {
        match event {
            XmlEvent::StartDocument { .. } | XmlEvent::EndDocument => {}
            XmlEvent::ProcessingInstruction { name, data } => {
                if level == 0 && seen_element {
                    output.push('\n');
                }
                output.push_str("<?");
                output.push_str(name);
                if let Some(data) = data.as_deref().filter(|d| !d.is_empty()) {
                    output.push(' ');
                    output.push_str(&data.replace('\r', "&#xD;"));
                }
                output.push_str("?>");
                if level == 0 && !seen_element {
                    output.push('\n');
                }
            }
            XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } => {
                level += 1;
                seen_element = true;

                let inherited = rendered_ns.last().cloned().unwrap_or_default();

                let mut utilized = vec![name.prefix.clone().unwrap_or_default()];
                for attr in attributes {
                    if let Some(prefix) = attr.name.prefix.as_deref() {
                        if prefix != "xml" && !utilized.iter().any(|p| p == prefix) {
                            utilized.push(prefix.to_string());
                        }
                    }
                }

                let mut declarations = BTreeMap::new();
                for prefix in utilized {
                    let uri = namespace.0.get(&prefix).cloned().unwrap_or_default();
                    match inherited.get(&prefix) {
                        Some(existing) if *existing == uri => continue,
                        None if uri.is_empty() => continue,
                        _ => {}
                    }
                    if !prefix.is_empty() && uri.is_empty() {
                        return Err(format!("namespace prefix {} is not bound", prefix));
                    }
                    declarations.insert(prefix, uri);
                }

                let mut sorted_attrs = attributes.iter().collect::<Vec<_>>();
                sorted_attrs.sort_by(|a, b| {
                    let a_ns = a.name.namespace.as_deref().unwrap_or_default();
                    let b_ns = b.name.namespace.as_deref().unwrap_or_default();
                    a_ns.cmp(b_ns)
                        .then_with(|| a.name.local_name.cmp(&b.name.local_name))
                });

                output.push('<');
                output.push_str(&qualified_name(name));
                for (prefix, uri) in &declarations {
                    if prefix.is_empty() {
                        output.push_str(" xmlns=\"");
                    } else {
                        output.push_str(" xmlns:");
                        output.push_str(prefix);
                        output.push_str("=\"");
                    }
                    output.push_str(&escape_attr(uri));
                    output.push('"');
                }
                for attr in sorted_attrs {
                    output.push(' ');
                    output.push_str(&qualified_name(&attr.name));
                    output.push_str("=\"");
                    output.push_str(&escape_attr(&attr.value));
                    output.push('"');
                }
                output.push('>');

                let mut in_scope = inherited;
                in_scope.extend(declarations);
                rendered_ns.push(in_scope);
            }
            XmlEvent::EndElement { name } => {
                if level == 0 {
                    return Err(format!("unbalanced end element {}", name));
                }
                level -= 1;
                rendered_ns.pop();
                output.push_str("</");
                output.push_str(&qualified_name(name));
                output.push('>');
            }
            XmlEvent::Characters(data) | XmlEvent::CData(data) | XmlEvent::Whitespace(data) => {
                if level > 0 {
                    output.push_str(&escape_text(data));
                }
            }
            _ => {}
        }
    }

    if level != 0 {
        return Err("element subtree is not closed".to_string());
    }

    Ok(output)
}
