// XML helpers shared by the control client and the event decoder.
//
// Requests are small fixed-shape documents, so they are built as a tiny
// element tree and rendered in one pass. Responses are parsed with
// `roxmltree` and queried by absolute element paths.

use roxmltree::{Document, Node};

use crate::error::Error;

/// Literal token the device places in every failed response body.
pub const ERROR_MARKER: &str = "ERROR";

// ── Request building ─────────────────────────────────────────────────

/// An element in an outgoing request document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    name: &'static str,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            text: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn text(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub(crate) fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Render without an XML declaration, the way the device expects it.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        let empty = self.children.is_empty() && self.text.as_deref().is_none_or(str::is_empty);
        if empty {
            out.push('<');
            out.push_str(self.name);
            out.push_str("/>");
            return;
        }
        out.push('<');
        out.push_str(self.name);
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&quick_xml::escape::escape(text.as_str()));
        }
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(self.name);
        out.push('>');
    }
}

// ── Response parsing ─────────────────────────────────────────────────

pub(crate) fn parse(body: &str) -> Result<Document<'_>, Error> {
    Document::parse(body).map_err(|e| Error::Xml {
        message: e.to_string(),
        body: body.chars().take(200).collect(),
    })
}

/// Fail with [`Error::Device`] if the body carries the error marker.
pub(crate) fn check_device_error(body: &str) -> Result<(), Error> {
    if body.contains(ERROR_MARKER) {
        return Err(Error::Device {
            message: error_message(body),
        });
    }
    Ok(())
}

/// The human-readable message in `/response/msg`, or empty if absent.
pub(crate) fn error_message(body: &str) -> String {
    parse(body)
        .ok()
        .and_then(|doc| first_text(&doc, &["response", "msg"]).map(str::to_owned))
        .unwrap_or_default()
}

/// All elements reached by following `path` from the document root.
///
/// `path[0]` must name the root element; each further step selects every
/// child element with that name, so repeated elements fan out.
pub(crate) fn select<'a, 'i>(doc: &'a Document<'i>, path: &[&str]) -> Vec<Node<'a, 'i>> {
    let root = doc.root_element();
    let Some((first, rest)) = path.split_first() else {
        return Vec::new();
    };
    if root.tag_name().name() != *first {
        return Vec::new();
    }
    let mut current = vec![root];
    for step in rest {
        current = current
            .into_iter()
            .flat_map(|node| children_named(node, step))
            .collect();
    }
    current
}

/// Text of the first element at `path`.
pub(crate) fn first_text<'a>(doc: &'a Document<'_>, path: &[&str]) -> Option<&'a str> {
    select(doc, path).into_iter().find_map(|n| n.text())
}

/// Text of every element at `path` (elements without text are skipped).
pub(crate) fn texts(doc: &Document<'_>, path: &[&str]) -> Vec<String> {
    select(doc, path)
        .into_iter()
        .filter_map(|n| n.text())
        .map(str::to_owned)
        .collect()
}

pub(crate) fn children_named<'a, 'i>(
    node: Node<'a, 'i>,
    name: &str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// First descendant element (excluding `node` itself) with the given name.
pub(crate) fn descendant<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants()
        .skip(1)
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Text of the first descendant with the given name, trimmed.
pub(crate) fn descendant_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    descendant(node, name).and_then(|n| n.text()).map(str::trim)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_elements() {
        let xml = Element::new("request")
            .child(Element::text("class", "ReadDataOp"))
            .child(Element::new("power"))
            .render();
        assert_eq!(xml, "<request><class>ReadDataOp</class><power/></request>");
    }

    #[test]
    fn escapes_text_content() {
        let xml = Element::text("loc", "a<b & c").render();
        assert_eq!(xml, "<loc>a&lt;b &amp; c</loc>");
    }

    #[test]
    fn select_fans_out_over_repeated_elements() {
        let body = "<response><data><devices>\
            <device><id>d1</id></device>\
            <device><id>d2</id></device>\
            </devices></data></response>";
        let doc = parse(body).unwrap();
        assert_eq!(
            texts(&doc, &["response", "data", "devices", "device", "id"]),
            vec!["d1".to_owned(), "d2".to_owned()]
        );
    }

    #[test]
    fn select_requires_matching_root() {
        let doc = parse("<other><msg>x</msg></other>").unwrap();
        assert!(first_text(&doc, &["response", "msg"]).is_none());
    }

    #[test]
    fn device_error_carries_message() {
        let body = "<response><status>ERROR</status><msg>Bad bank</msg></response>";
        let err = check_device_error(body).unwrap_err();
        assert_eq!(err.device_message(), Some("Bad bank"));
    }

    #[test]
    fn device_error_without_parsable_body() {
        let err = check_device_error("ERROR: unavailable").unwrap_err();
        assert_eq!(err.device_message(), Some(""));
    }

    #[test]
    fn success_body_passes_check() {
        assert!(check_device_error("<response><data><result>OK</result></data></response>").is_ok());
    }
}
