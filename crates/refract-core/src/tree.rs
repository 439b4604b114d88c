//! The XML tag tree that visitors traverse and rewrite.
//!
//! Manifests are parsed once into this tree; recipes read and replace tags,
//! and the modified tree is handed back to the driver. Attributes and mixed
//! content are not modeled; POM-style documents only carry element structure
//! and text.

use quick_xml::events::Event;
use quick_xml::Reader;

use refract_util::errors::RefractError;

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlTag,
}

/// A single tag: a name, optional text content, and child tags in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlTag {
    pub name: String,
    pub value: Option<String>,
    pub children: Vec<XmlTag>,
}

impl XmlTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlTag> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlTag> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Text content of the first child with the given name.
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.value.as_deref())
    }

    /// All children with the given name, in declaration order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlTag> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

impl XmlDocument {
    /// Parse an XML string into a tag tree.
    pub fn parse(xml: &str) -> miette::Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlTag> = Vec::new();
        let mut root: Option<XmlTag> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    stack.push(XmlTag::new(name));
                }
                Ok(Event::Empty(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let tag = XmlTag::new(name);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(tag),
                        None => root = Some(tag),
                    }
                }
                Ok(Event::Text(ref e)) => {
                    let text = e.unescape().unwrap_or_default().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(top) = stack.last_mut() {
                        top.value = Some(text);
                    }
                }
                Ok(Event::End(_)) => {
                    let finished = match stack.pop() {
                        Some(tag) => tag,
                        None => {
                            return Err(RefractError::Xml {
                                message: "unbalanced closing tag".to_string(),
                            }
                            .into())
                        }
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(finished),
                        None => root = Some(finished),
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(RefractError::Xml {
                        message: format!("{e}"),
                    }
                    .into())
                }
                _ => {}
            }
        }

        match root {
            Some(root) => Ok(Self { root }),
            None => Err(RefractError::Xml {
                message: "document has no root element".to_string(),
            }
            .into()),
        }
    }

    /// Render the tree back to indented XML text.
    pub fn render(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        render_tag(&self.root, 0, &mut out);
        out
    }
}

fn render_tag(tag: &XmlTag, depth: usize, out: &mut String) {
    let indent = "    ".repeat(depth);
    if tag.children.is_empty() {
        match &tag.value {
            Some(v) => {
                out.push_str(&format!("{indent}<{0}>{1}</{0}>\n", tag.name, escape(v)));
            }
            None => out.push_str(&format!("{indent}<{}/>\n", tag.name)),
        }
    } else {
        out.push_str(&format!("{indent}<{}>\n", tag.name));
        for child in &tag.children {
            render_tag(child, depth + 1, out);
        }
        out.push_str(&format!("{indent}</{}>\n", tag.name));
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
    <groupId>org.example</groupId>
    <artifactId>app</artifactId>
    <version>1.0.0</version>
    <dependencies>
        <dependency>
            <groupId>junit</groupId>
            <artifactId>junit</artifactId>
            <version>4.13.2</version>
        </dependency>
    </dependencies>
</project>"#;

    #[test]
    fn parse_nested_tags() {
        let doc = XmlDocument::parse(POM).unwrap();
        assert_eq!(doc.root.name, "project");
        assert_eq!(doc.root.child_value("groupId"), Some("org.example"));
        let deps = doc.root.child("dependencies").unwrap();
        let dep = deps.child("dependency").unwrap();
        assert_eq!(dep.child_value("artifactId"), Some("junit"));
    }

    #[test]
    fn parse_self_closing() {
        let doc = XmlDocument::parse("<project><modules/></project>").unwrap();
        let modules = doc.root.child("modules").unwrap();
        assert!(modules.children.is_empty());
        assert!(modules.value.is_none());
    }

    #[test]
    fn render_round_trips() {
        let doc = XmlDocument::parse(POM).unwrap();
        let rendered = doc.render();
        let reparsed = XmlDocument::parse(&rendered).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn render_escapes_text() {
        let doc = XmlDocument {
            root: XmlTag::with_value("name", "a < b & c"),
        };
        let rendered = doc.render();
        assert!(rendered.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn unbalanced_document_fails() {
        assert!(XmlDocument::parse("</project>").is_err());
        assert!(XmlDocument::parse("").is_err());
    }

    #[test]
    fn children_named_preserves_order() {
        let doc = XmlDocument::parse(
            "<versions><version>1.0</version><version>2.0</version></versions>",
        )
        .unwrap();
        let versions: Vec<_> = doc
            .root
            .children_named("version")
            .filter_map(|t| t.value.as_deref())
            .collect();
        assert_eq!(versions, vec!["1.0", "2.0"]);
    }
}
