pub mod description;
pub mod dial;
pub mod http;

pub use description::{render_device_description, DEVICE_DESCRIPTION_PATH};
pub use dial::{DialState, MAX_PAYLOAD_LEN};
pub use http::HttpWorker;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::{DialError, Result};

/// `<name>text</name>`
pub(crate) fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.into()));
    element
}

/// Serializes `root` as a complete, indented XML document.
pub(crate) fn write_document(root: &Element) -> Result<String> {
    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    root.write_with_config(&mut buf, config)
        .map_err(|e| DialError::Xml(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| DialError::Xml(e.to_string()))
}

/// Whether `name` can be used as an unprefixed XML element name: ASCII
/// letters, digits, `-`, `_` and `.`, starting with a letter or `_`, and not
/// starting with `xml` in any case.
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if name.len() >= 3 && name[..3].eq_ignore_ascii_case("xml") {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_document_escapes_text() {
        let mut root = Element::new("root");
        root.children
            .push(XMLNode::Element(text_element("title", "a <b> & \"c\"")));

        let xml = write_document(&root).unwrap();
        assert!(xml.starts_with("<?xml"));

        let parsed = Element::parse(xml.as_bytes()).unwrap();
        let title = parsed.get_child("title").unwrap().get_text().unwrap();
        assert_eq!(title, "a <b> & \"c\"");
    }

    #[test]
    fn test_is_xml_name() {
        for name in ["resume", "_id", "track.no", "play-list2"] {
            assert!(is_xml_name(name), "{name}");
        }
        for name in ["", "resume token", "2fast", "a<b", "XmlThing", "é", "a:b"] {
            assert!(!is_xml_name(name), "{name}");
        }
    }
}
