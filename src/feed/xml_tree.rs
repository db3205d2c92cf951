//! A small owned XML tree built from `quick-xml` events.
//!
//! Feeds are tiny compared to memory, and field extraction needs to look at
//! siblings in priority order, so the parser first materializes the whole
//! document and then queries it.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// SEC-003: Maximum element nesting depth accepted from a feed document.
const MAX_DEPTH: usize = 256;

/// An element with its attributes and mixed content, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Qualified name as written, e.g. `content:encoded`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub content: Vec<XmlContent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlContent {
    Element(XmlNode),
    Text(String),
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Self, String> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(v) => v.into_owned(),
                // Unknown entities (&nbsp; in an href): keep the raw value
                Err(_) => decode_lossy(reader, &attr.value),
            };
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            content: Vec::new(),
        })
    }

    /// Name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.content.iter().filter_map(|c| match c {
            XmlContent::Element(node) => Some(node),
            XmlContent::Text(_) => None,
        })
    }

    /// Child elements with the given qualified name.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.elements().filter(move |n| n.name == name)
    }

    pub fn child<'a>(&'a self, name: &'a str) -> Option<&'a XmlNode> {
        self.children(name).next()
    }

    /// Concatenated direct text content, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for c in &self.content {
            if let XmlContent::Text(t) = c {
                out.push_str(t);
            }
        }
        out.trim().to_string()
    }

    /// Re-serializes everything between this element's tags.
    ///
    /// Used for Atom `type="xhtml"` bodies whose markup arrives as child
    /// elements rather than escaped text.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for c in &self.content {
            match c {
                XmlContent::Text(t) => out.push_str(&escape(t.as_str())),
                XmlContent::Element(node) => node.write_markup(&mut out),
            }
        }
        out.trim().to_string()
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v.as_str()));
            out.push('"');
        }
        if self.content.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for c in &self.content {
            match c {
                XmlContent::Text(t) => out.push_str(&escape(t.as_str())),
                XmlContent::Element(node) => node.write_markup(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Decodes raw bytes in the document's declared encoding, replacing anything
/// undecodable rather than failing.
fn decode_lossy(reader: &Reader<&[u8]>, bytes: &[u8]) -> String {
    match reader.decoder().decode(bytes) {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Parses a complete document and returns its root element.
///
/// # Errors
///
/// Returns a description of the problem when the bytes are not well-formed
/// XML, when elements are left unclosed, or when there is no root element.
///
/// # Security
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations. Only the
/// five XML builtins are resolved; any other entity in text is kept verbatim.
///
/// The encoding comes from the BOM or the `<?xml encoding=...?>` declaration
/// (UTF-8 when neither is present), so Latin-1 and windows-1252 feeds decode
/// to proper text.
pub fn parse_document(bytes: &[u8]) -> Result<XmlNode, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{} at byte {}", e, reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err("content after the root element".to_string());
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(format!("nesting deeper than {MAX_DEPTH} levels"));
                }
                stack.push(XmlNode::from_start(&start, &reader)?);
            }
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start, &reader)?;
                match stack.last_mut() {
                    Some(parent) => parent.content.push(XmlContent::Element(node)),
                    None if root.is_none() => root = Some(node),
                    None => return Err("content after the root element".to_string()),
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| "unexpected closing tag".to_string())?;
                match stack.last_mut() {
                    Some(parent) => parent.content.push(XmlContent::Element(node)),
                    None => root = Some(node),
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = match text.unescape() {
                        Ok(v) => v.into_owned(),
                        Err(_) => decode_lossy(&reader, &text),
                    };
                    parent.content.push(XmlContent::Text(value));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent.content.push(XmlContent::Text(decode_lossy(&reader, &data)));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree_with_attributes_and_text() {
        let doc = br#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blog &amp; Co</title>
  <link rel="alternate" href="https://example.com/"/>
</feed>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "feed");
        assert_eq!(root.child("title").unwrap().text(), "Blog & Co");
        assert_eq!(
            root.child("link").unwrap().attr("href"),
            Some("https://example.com/")
        );
    }

    #[test]
    fn test_cdata_and_prefixed_names() {
        let doc = br#"<item><content:encoded><![CDATA[<p>Hi</p>]]></content:encoded></item>"#;
        let root = parse_document(doc).unwrap();
        let encoded = root.child("content:encoded").unwrap();
        assert_eq!(encoded.text(), "<p>Hi</p>");
        assert_eq!(encoded.local_name(), "encoded");
    }

    #[test]
    fn test_inner_markup_preserves_order() {
        let doc = br#"<content type="xhtml"><div><p>Hello <b>bold</b> world</p></div></content>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(
            root.inner_markup(),
            "<div><p>Hello <b>bold</b> world</p></div>"
        );
    }

    #[test]
    fn test_unknown_entity_kept_verbatim() {
        let root = parse_document(b"<t>a&nbsp;b</t>").unwrap();
        assert_eq!(root.text(), "a&nbsp;b");
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(parse_document(b"<not valid xml").is_err());
        assert!(parse_document(b"<a><b></a>").is_err());
        assert!(parse_document(b"<a><b></b>").is_err());
        assert!(parse_document(b"just some text").is_err());
        assert!(parse_document(b"").is_err());
    }

    #[test]
    fn test_declared_single_byte_encodings_are_decoded() {
        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t title=\"Z\xFCrich\">Caf\xE9</t>";
        let root = parse_document(latin1).unwrap();
        assert_eq!(root.text(), "Caf\u{e9}");
        assert_eq!(root.attr("title"), Some("Z\u{fc}rich"));

        let cp1252 =
            b"<?xml version=\"1.0\" encoding=\"windows-1252\"?><t><![CDATA[It\x92s \x80 5]]></t>";
        assert_eq!(parse_document(cp1252).unwrap().text(), "It\u{2019}s \u{20ac} 5");
    }

    #[test]
    fn test_undeclared_encoding_is_utf8() {
        let root = parse_document("<t>Caf\u{e9} \u{2014} ok</t>".as_bytes()).unwrap();
        assert_eq!(root.text(), "Caf\u{e9} \u{2014} ok");
    }

    #[test]
    fn test_depth_limit() {
        let doc = format!("{}{}", "<a>".repeat(MAX_DEPTH + 1), "</a>".repeat(MAX_DEPTH + 1));
        assert!(parse_document(doc.as_bytes()).is_err());
    }
}
