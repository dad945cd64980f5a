//! Mutable document model used by the render pipeline.
//!
//! Stages only talk to [`MutableDocument`]: create nodes, find a node by
//! path, read and replace inner content, and move children around. The
//! shipped implementation, [`HtmlDocument`], is a small arena of elements
//! and raw markup fragments; it does not parse HTML. Markup added through
//! [`MutableDocument::create_markup`] or
//! [`MutableDocument::set_inner_html`] is kept verbatim and emitted as-is.
//!
//! Paths are `/`-separated tag names starting below the document root, for
//! example `html/body`. Each segment picks the first matching child element.

use anyhow::Result;
use std::fmt::Write as _;

use crate::core::GadgetError;
use crate::gadget::RenderMode;
use crate::utils::html_escape;

/// Path of the head element in iframe documents.
pub const IFRAME_HEAD: &str = "html/head";
/// Path of the body element in iframe documents.
pub const IFRAME_BODY: &str = "html/body";
/// Path of the wrapper element in inline documents.
pub const INLINE_WRAPPER: &str = "div";

/// Handle to a node of a [`MutableDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Document mutation primitives the render stages depend on.
///
/// Handles are only meaningful for the document that created them;
/// mutations given a foreign or stale handle do nothing.
pub trait MutableDocument: Send {
    /// The invisible node above the top-level elements.
    fn root(&self) -> NodeId;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> NodeId;

    /// Create a detached raw markup fragment.
    fn create_markup(&mut self, markup: &str) -> NodeId;

    /// First node matching `path`.
    fn select(&self, path: &str) -> Option<NodeId>;

    /// Tag of an element, `None` for markup fragments and the root.
    fn tag_name(&self, node: NodeId) -> Option<&str>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    /// Rendered children of an element, or the text of a markup fragment.
    fn inner_html(&self, node: NodeId) -> String;

    /// Replace the children of an element with one markup fragment, or
    /// replace the text of a markup fragment.
    fn set_inner_html(&mut self, node: NodeId, html: &str);

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Attach `child` as the last child of `parent`, detaching it first.
    fn append_child(&mut self, parent: NodeId, child: NodeId);

    /// Attach `child` as the first child of `parent`, detaching it first.
    fn prepend_child(&mut self, parent: NodeId, child: NodeId);

    /// Attach `child` right before `reference`, a child of `parent`.
    /// Appends when `reference` is not a child of `parent`.
    fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId);

    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    /// Serialize the whole document.
    fn render(&self) -> String;
}

/// Find the node at `path` or fail.
///
/// # Errors
///
/// Returns [`GadgetError::Other`] when the document has no such node.
pub fn require_node(document: &dyn MutableDocument, path: &str) -> Result<NodeId> {
    document.select(path).ok_or_else(|| {
        GadgetError::Other {
            message: format!("document has no '{path}' node"),
        }
        .into()
    })
}

/// Node that receives gadget content: the body (iframe) or the wrapper
/// (inline).
///
/// # Errors
///
/// Fails when the document was not built for `mode`.
pub fn content_node(document: &dyn MutableDocument, mode: RenderMode) -> Result<NodeId> {
    match mode {
        RenderMode::Iframe => require_node(document, IFRAME_BODY),
        RenderMode::Inline => require_node(document, INLINE_WRAPPER),
    }
}

/// Node that receives feature scripts: the head (iframe) or the wrapper
/// (inline).
///
/// # Errors
///
/// Fails when the document was not built for `mode`.
pub fn script_node(document: &dyn MutableDocument, mode: RenderMode) -> Result<NodeId> {
    match mode {
        RenderMode::Iframe => require_node(document, IFRAME_HEAD),
        RenderMode::Inline => require_node(document, INLINE_WRAPPER),
    }
}

/// Nodes whose markup the substitution stages rewrite.
///
/// # Errors
///
/// Fails when the document was not built for `mode`.
pub fn text_roots(document: &dyn MutableDocument, mode: RenderMode) -> Result<Vec<NodeId>> {
    match mode {
        RenderMode::Iframe => {
            Ok(vec![require_node(document, IFRAME_HEAD)?, require_node(document, IFRAME_BODY)?])
        }
        RenderMode::Inline => Ok(vec![require_node(document, INLINE_WRAPPER)?]),
    }
}

/// Apply `rewrite` to every markup fragment beneath `node`.
pub fn rewrite_markup(
    document: &mut dyn MutableDocument,
    node: NodeId,
    rewrite: &mut dyn FnMut(&str) -> String,
) {
    for child in document.children(node) {
        if document.tag_name(child).is_some() {
            rewrite_markup(document, child, rewrite);
        } else {
            let current = document.inner_html(child);
            let rewritten = rewrite(&current);
            if rewritten != current {
                document.set_inner_html(child, &rewritten);
            }
        }
    }
}

/// Apply `rewrite` to the gadget content under `node`: its direct markup
/// fragments. Elements the stages inserted, such as feature scripts, are
/// left alone.
pub fn rewrite_content(
    document: &mut dyn MutableDocument,
    node: NodeId,
    rewrite: &mut dyn FnMut(&str) -> String,
) {
    for child in document.children(node) {
        if document.tag_name(child).is_none() {
            let current = document.inner_html(child);
            let rewritten = rewrite(&current);
            if rewritten != current {
                document.set_inner_html(child, &rewritten);
            }
        }
    }
}

/// `<script>` element with an inline body.
pub fn inline_script(document: &mut dyn MutableDocument, source: &str) -> NodeId {
    let script = document.create_element("script");
    document.set_inner_html(script, source);
    script
}

/// `<script src="...">` element.
pub fn external_script(document: &mut dyn MutableDocument, src: &str) -> NodeId {
    let script = document.create_element("script");
    document.set_attribute(script, "src", src);
    script
}

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Markup(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed [`MutableDocument`].
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    nodes: Vec<Node>,
}

impl HtmlDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The skeleton for a render mode: `html/head` + `html/body` for
    /// iframes, a single `div` for inline rendering.
    pub fn for_mode(mode: RenderMode) -> Self {
        let mut document = Self::new();
        let root = document.root();
        match mode {
            RenderMode::Iframe => {
                let html = document.create_element("html");
                let head = document.create_element("head");
                let body = document.create_element("body");
                document.append_child(root, html);
                document.append_child(html, head);
                document.append_child(html, body);
            }
            RenderMode::Inline => {
                let wrapper = document.create_element("div");
                document.append_child(root, wrapper);
            }
        }
        document
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes.get(child.0).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = None;
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, position: Option<usize>) {
        if parent == child || self.nodes.get(parent.0).is_none() || self.nodes.get(child.0).is_none() {
            return;
        }
        self.detach(child);
        let Some(parent_node) = self.nodes.get_mut(parent.0) else {
            return;
        };
        let index = position.unwrap_or(parent_node.children.len()).min(parent_node.children.len());
        parent_node.children.insert(index, child);
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.kind {
            NodeKind::Root => self.write_children(node, out),
            NodeKind::Markup(markup) => out.push_str(markup),
            NodeKind::Element {
                tag,
                attributes,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {}=\"{}\"", name, html_escape(value));
                }
                out.push('>');
                self.write_children(node, out);
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn write_children(&self, node: &Node, out: &mut String) {
        for child in &node.children {
            self.write_node(*child, out);
        }
    }
}

impl Default for HtmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableDocument for HtmlDocument {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    fn create_markup(&mut self, markup: &str) -> NodeId {
        self.push(NodeKind::Markup(markup.to_string()))
    }

    fn select(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self
                .nodes
                .get(current.0)?
                .children
                .iter()
                .copied()
                .find(|child| self.tag_name(*child).is_some_and(|tag| tag.eq_ignore_ascii_case(segment)))?;
        }
        Some(current)
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element {
                tag, ..
            } => Some(tag),
            NodeKind::Root | NodeKind::Markup(_) => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element {
                attributes, ..
            } => attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str()),
            NodeKind::Root | NodeKind::Markup(_) => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element {
                attributes, ..
            },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    fn inner_html(&self, node: NodeId) -> String {
        let Some(data) = self.nodes.get(node.0) else {
            return String::new();
        };
        match &data.kind {
            NodeKind::Markup(markup) => markup.clone(),
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.write_children(data, &mut out);
                out
            }
        }
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) {
        let is_markup = match self.nodes.get_mut(node.0) {
            Some(Node {
                kind: NodeKind::Markup(markup),
                ..
            }) => {
                *markup = html.to_string();
                true
            }
            Some(_) => false,
            None => return,
        };
        if is_markup {
            return;
        }

        for child in self.children(node) {
            self.detach(child);
        }
        if !html.is_empty() {
            let markup = self.create_markup(html);
            self.attach(node, markup, None);
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes.get(node.0).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child, None);
    }

    fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child, Some(0));
    }

    fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        if child == reference {
            return;
        }
        self.detach(child);
        let position = self.nodes.get(parent.0).and_then(|p| p.children.iter().position(|c| *c == reference));
        self.attach(parent, child, position);
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.parent(child) == Some(parent) {
            self.detach(child);
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root(), &mut out);
        out
    }
}
