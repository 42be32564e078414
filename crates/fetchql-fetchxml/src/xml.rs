//! A tiny in-memory XML element tree, rendered through `quick_xml` rather
//! than built up via string concatenation.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct XmlElem {
    pub name: &'static str,
    pub attrs: Vec<(&'static str, String)>,
    pub children: Vec<XmlElem>,
    pub text: Option<String>,
}

impl XmlElem {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Builds a leaf element whose content is a text node rather than
    /// attributes, e.g. `<value>42</value>` inside an `in`/`between`
    /// condition.
    pub fn with_text(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    pub fn maybe_attr(self, key: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    /// Adds an attribute in place, unless one with the same key is already
    /// present. Used to merge a later pass's attribute (e.g. GROUP BY's
    /// `groupby="true"`) onto an element an earlier pass already emitted.
    pub fn set_attr(&mut self, key: &'static str, value: impl Into<String>) {
        if !self.attrs.iter().any(|(k, _)| *k == key) {
            self.attrs.push((key, value.into()));
        }
    }

    pub fn child(mut self, child: XmlElem) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = XmlElem>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn render(&self) -> String {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        self.write(&mut writer);
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).expect("quick_xml output is always valid UTF-8")
    }

    fn write(&self, writer: &mut Writer<Cursor<Vec<u8>>>) {
        if let Some(text) = &self.text {
            let mut start = BytesStart::new(self.name);
            for (k, v) in &self.attrs {
                start.push_attribute((*k, v.as_str()));
            }
            writer.write_event(Event::Start(start)).expect("in-memory write never fails");
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .expect("in-memory write never fails");
            writer
                .write_event(Event::End(BytesEnd::new(self.name)))
                .expect("in-memory write never fails");
            return;
        }
        if self.children.is_empty() {
            let mut start = BytesStart::new(self.name);
            for (k, v) in &self.attrs {
                start.push_attribute((*k, v.as_str()));
            }
            writer.write_event(Event::Empty(start)).expect("in-memory write never fails");
            return;
        }
        let mut start = BytesStart::new(self.name);
        for (k, v) in &self.attrs {
            start.push_attribute((*k, v.as_str()));
        }
        writer.write_event(Event::Start(start)).expect("in-memory write never fails");
        for child in &self.children {
            child.write(writer);
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name)))
            .expect("in-memory write never fails");
    }
}

/// Used only by tests that need to confirm escaping; production code never
/// emits raw text nodes (FetchXML has none).
#[allow(dead_code)]
pub fn escaped_text(s: &str) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Text(BytesText::new(s)))
        .expect("in-memory write never fails");
    String::from_utf8(writer.into_inner().into_inner()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_attributes() {
        let elem = XmlElem::new("fetch").attr("top", "50").child(
            XmlElem::new("entity")
                .attr("name", "account")
                .child(XmlElem::new("attribute").attr("name", "name")),
        );
        let xml = elem.render();
        assert!(xml.contains(r#"<fetch top="50">"#));
        assert!(xml.contains(r#"<entity name="account">"#));
        assert!(xml.contains(r#"<attribute name="name"/>"#));
    }

    #[test]
    fn escapes_special_characters_in_attribute_values() {
        let elem = XmlElem::new("condition").attr("value", "A & B < C");
        let xml = elem.render();
        assert!(xml.contains("A &amp; B &lt; C"));
    }
}
