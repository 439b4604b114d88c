//! Tree visitors: variant-dispatched traversal over the XML tag tree.
//!
//! A visitor is a set of per-node-kind function values. The default
//! traversal routes each node to its handler and recurses into children;
//! overriding a hook means replacing one function field. Handlers may
//! schedule follow-up visitors through the execution context.

use std::sync::Arc;

use crate::execution::ExecutionContext;
use crate::tree::{XmlDocument, XmlTag};

/// Ancestor tag names of the node currently being visited, root first.
///
/// A handler visiting `<version>` inside `<parent>` inside `<project>`
/// sees `["project", "parent"]`.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    pub path: &'a [String],
}

impl Cursor<'_> {
    /// Ancestor path joined with `/`, e.g. `project/parent`.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

pub type DocumentFn =
    Arc<dyn Fn(XmlDocument, &mut ExecutionContext) -> miette::Result<XmlDocument> + Send + Sync>;
pub type TagFn =
    Arc<dyn Fn(XmlTag, &Cursor<'_>, &mut ExecutionContext) -> miette::Result<XmlTag> + Send + Sync>;

/// A traversal over [`XmlDocument`] with replaceable per-node hooks.
#[derive(Clone, Default)]
pub struct TreeVisitor {
    pub visit_document: Option<DocumentFn>,
    pub visit_tag: Option<TagFn>,
}

impl TreeVisitor {
    /// A visitor that only overrides the tag hook.
    pub fn for_tags(
        f: impl Fn(XmlTag, &Cursor<'_>, &mut ExecutionContext) -> miette::Result<XmlTag>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            visit_document: None,
            visit_tag: Some(Arc::new(f)),
        }
    }

    /// A visitor that only overrides the document hook.
    pub fn for_document(
        f: impl Fn(XmlDocument, &mut ExecutionContext) -> miette::Result<XmlDocument>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            visit_document: Some(Arc::new(f)),
            visit_tag: None,
        }
    }

    /// Run one full traversal over the document.
    ///
    /// The document hook runs first, then every tag is handed to the tag
    /// hook in pre-order before its (possibly replaced) children are
    /// traversed.
    pub fn visit(
        &self,
        doc: XmlDocument,
        ctx: &mut ExecutionContext,
    ) -> miette::Result<XmlDocument> {
        ctx.check_cancelled()?;
        let doc = match &self.visit_document {
            Some(f) => f(doc, ctx)?,
            None => doc,
        };
        let mut path = Vec::new();
        let root = self.visit_tag_recursive(doc.root, &mut path, ctx)?;
        Ok(XmlDocument { root })
    }

    fn visit_tag_recursive(
        &self,
        tag: XmlTag,
        path: &mut Vec<String>,
        ctx: &mut ExecutionContext,
    ) -> miette::Result<XmlTag> {
        let mut tag = match &self.visit_tag {
            Some(f) => f(tag, &Cursor { path: path.as_slice() }, ctx)?,
            None => tag,
        };
        path.push(tag.name.clone());
        let children = std::mem::take(&mut tag.children);
        for child in children {
            tag.children.push(self.visit_tag_recursive(child, path, ctx)?);
        }
        path.pop();
        Ok(tag)
    }
}

/// A visitor that rewrites the text of one tag.
///
/// Matches tags whose ancestor path joins to `parent_path`, whose name is
/// `tag_name`, and whose current value is `old_value`; the value is
/// replaced with `new_value`. Running the visitor again after the rewrite
/// is a no-op, since `old_value` no longer matches.
pub fn change_tag_value(
    parent_path: impl Into<String>,
    tag_name: impl Into<String>,
    old_value: impl Into<String>,
    new_value: impl Into<String>,
) -> TreeVisitor {
    let parent_path = parent_path.into();
    let tag_name = tag_name.into();
    let old_value = old_value.into();
    let new_value = new_value.into();
    TreeVisitor::for_tags(move |mut tag, cursor, _ctx| {
        if tag.name == tag_name
            && cursor.path_string() == parent_path
            && tag.value.as_deref() == Some(old_value.as_str())
        {
            tag.value = Some(new_value.clone());
        }
        Ok(tag)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml).unwrap()
    }

    #[test]
    fn default_visitor_is_identity() {
        let doc = parse("<project><a>1</a><b><c>2</c></b></project>");
        let mut ctx = ExecutionContext::new();
        let out = TreeVisitor::default().visit(doc.clone(), &mut ctx).unwrap();
        assert_eq!(out, doc);
    }

    #[test]
    fn tag_hook_sees_ancestor_path() {
        let doc = parse("<project><parent><version>1.0</version></parent></project>");
        let mut ctx = ExecutionContext::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let visitor = TreeVisitor::for_tags(move |tag, cursor, _| {
            seen2
                .lock()
                .unwrap()
                .push(format!("{}:{}", cursor.path_string(), tag.name));
            Ok(tag)
        });
        visitor.visit(doc, &mut ctx).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ":project".to_string(),
                "project:parent".to_string(),
                "project/parent:version".to_string()
            ]
        );
    }

    #[test]
    fn change_tag_value_rewrites_matching_tag_only() {
        let doc = parse(
            "<project><version>1.0</version><parent><version>1.0</version></parent></project>",
        );
        let mut ctx = ExecutionContext::new();
        let visitor = change_tag_value("project/parent", "version", "1.0", "2.0");
        let out = visitor.visit(doc, &mut ctx).unwrap();
        assert_eq!(out.root.child_value("version"), Some("1.0"));
        assert_eq!(
            out.root.child("parent").unwrap().child_value("version"),
            Some("2.0")
        );
    }

    #[test]
    fn change_tag_value_is_idempotent() {
        let doc = parse("<project><parent><version>1.0</version></parent></project>");
        let mut ctx = ExecutionContext::new();
        let visitor = change_tag_value("project/parent", "version", "1.0", "2.0");
        let once = visitor.visit(doc, &mut ctx).unwrap();
        let twice = visitor.visit(once.clone(), &mut ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn cancelled_context_stops_traversal() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mut ctx = ExecutionContext::with_cancellation(flag);
        let doc = parse("<project/>");
        assert!(TreeVisitor::default().visit(doc, &mut ctx).is_err());
    }
}
