use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: HashMap<String, String>,
    pub(crate) disabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Dom {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
}

pub(crate) const STOP_PROPAGATION_SUFFIX: &str = ":stoppropagation";

pub(crate) fn has_class(element: &Element, class_name: &str) -> bool {
    element
        .attrs
        .get("class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
}

pub(crate) fn escape_html_text_for_serialization(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_html_attr_for_serialization(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Form controls for which the `disabled` attribute has an effect.
fn is_disableable_control(tag: &str) -> bool {
    matches!(tag, "button" | "input" | "textarea" | "select")
}

fn is_whitespace_text(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

impl Dom {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                node_type: NodeType::Document,
            }],
            root: NodeId(0),
        }
    }

    pub(crate) fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let disabled = attrs.contains_key("disabled") && is_disableable_control(&tag_name);
        self.push_node(
            parent,
            NodeType::Element(Element {
                tag_name,
                attrs,
                disabled,
            }),
        )
    }

    pub(crate) fn create_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.push_node(parent, NodeType::Text(text))
    }

    fn push_node(&mut self, parent: NodeId, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            node_type,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|element| element.tag_name.as_str())
    }

    pub(crate) fn text(&self, node_id: NodeId) -> Option<&str> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Text(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.parent
    }

    /// Parent element of `node_id`; the document node is not an element.
    pub(crate) fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        self.parent(node_id)
            .filter(|parent| self.element(*parent).is_some())
    }

    pub(crate) fn element_children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes[node_id.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// Elements and non-whitespace text nodes, the children that count for
    /// structural paths and diffs.
    pub(crate) fn significant_children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.nodes[node_id.0]
            .children
            .iter()
            .copied()
            .filter(|child| match &self.nodes[child.0].node_type {
                NodeType::Text(text) => !is_whitespace_text(text),
                _ => true,
            })
            .collect()
    }

    fn previous_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let siblings = self.element_children(parent);
        let pos = siblings.iter().position(|sibling| *sibling == node_id)?;
        pos.checked_sub(1).map(|prev| siblings[prev])
    }

    fn is_first_element_child(&self, node_id: NodeId) -> bool {
        self.parent(node_id)
            .and_then(|parent| self.element_children(parent).first().copied())
            == Some(node_id)
    }

    fn is_last_element_child(&self, node_id: NodeId) -> bool {
        self.parent(node_id)
            .and_then(|parent| self.element_children(parent).last().copied())
            == Some(node_id)
    }

    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node_id, &mut out);
        out
    }

    fn collect_text(&self, node_id: NodeId, out: &mut String) {
        match &self.nodes[node_id.0].node_type {
            NodeType::Text(text) => out.push_str(text),
            _ => {
                for child in &self.nodes[node_id.0].children {
                    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                        self.collect_text(*child, out)
                    });
                }
            }
        }
    }

    pub(crate) fn all_elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements_dfs(self.root, &mut out);
        out
    }

    fn collect_elements_dfs(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[node_id.0].children {
            if self.element(*child).is_some() {
                out.push(*child);
                stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                    self.collect_elements_dfs(*child, out)
                });
            }
        }
    }

    pub(crate) fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let groups = parse_selector_groups(selector)?;
        Ok(self
            .all_elements()
            .into_iter()
            .filter(|node| {
                groups
                    .iter()
                    .any(|chain| self.matches_selector_chain(*node, chain))
            })
            .collect())
    }

    pub(crate) fn matches_selector_chain(&self, node_id: NodeId, steps: &[SelectorPart]) -> bool {
        let Some((last, rest)) = steps.split_last() else {
            return false;
        };
        if !self.matches_step(node_id, &last.step) {
            return false;
        }
        let mut current = node_id;
        let mut combinator = last.combinator;
        for part in rest.iter().rev() {
            let step = &part.step;
            let matched = match combinator.unwrap_or(SelectorCombinator::Descendant) {
                SelectorCombinator::Child => self
                    .parent_element(current)
                    .filter(|parent| self.matches_step(*parent, step)),
                SelectorCombinator::Descendant => {
                    let mut cursor = self.parent_element(current);
                    while let Some(parent) = cursor {
                        if self.matches_step(parent, step) {
                            break;
                        }
                        cursor = self.parent_element(parent);
                    }
                    cursor
                }
                SelectorCombinator::AdjacentSibling => self
                    .previous_element_sibling(current)
                    .filter(|sibling| self.matches_step(*sibling, step)),
                SelectorCombinator::GeneralSibling => {
                    let mut cursor = self.previous_element_sibling(current);
                    while let Some(sibling) = cursor {
                        if self.matches_step(sibling, step) {
                            break;
                        }
                        cursor = self.previous_element_sibling(sibling);
                    }
                    cursor
                }
            };
            let Some(matched) = matched else {
                return false;
            };
            current = matched;
            combinator = part.combinator;
        }
        true
    }

    pub(crate) fn matches_step(&self, node_id: NodeId, step: &SelectorStep) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };

        if let Some(tag) = &step.tag {
            if !element.tag_name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &step.id {
            if element.attrs.get("id") != Some(id) {
                return false;
            }
        }
        if step
            .classes
            .iter()
            .any(|class_name| !has_class(element, class_name))
        {
            return false;
        }

        let attr_matches = step.attrs.iter().all(|cond| match cond {
            SelectorAttrCondition::Exists { key } => element.attrs.contains_key(key),
            SelectorAttrCondition::Eq { key, value } => element.attrs.get(key) == Some(value),
            SelectorAttrCondition::StartsWith { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|attr| attr.starts_with(value)),
            SelectorAttrCondition::EndsWith { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|attr| attr.ends_with(value)),
            SelectorAttrCondition::Contains { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|attr| attr.contains(value)),
            SelectorAttrCondition::Includes { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|attr| attr.split_whitespace().any(|token| token == value)),
            SelectorAttrCondition::DashMatch { key, value } => element
                .attrs
                .get(key)
                .is_some_and(|attr| attr == value || attr.starts_with(&format!("{value}-"))),
        });
        if !attr_matches {
            return false;
        }

        step.pseudo_classes.iter().all(|pseudo| match pseudo {
            SelectorPseudoClass::FirstChild => self.is_first_element_child(node_id),
            SelectorPseudoClass::LastChild => self.is_last_element_child(node_id),
            SelectorPseudoClass::Disabled => element.disabled,
            SelectorPseudoClass::Enabled => !element.disabled,
            SelectorPseudoClass::Empty => self.nodes[node_id.0].children.is_empty(),
            SelectorPseudoClass::Not(inners) => !inners
                .iter()
                .any(|inner| self.matches_selector_chain(node_id, inner)),
        })
    }

    /// Positions among significant children, from the document down.
    pub(crate) fn path_of(&self, node_id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = node_id;
        while let Some(parent) = self.parent(current) {
            let Some(pos) = self
                .significant_children(parent)
                .iter()
                .position(|child| *child == current)
            else {
                break;
            };
            path.push(pos);
            current = parent;
        }
        path.reverse();
        path
    }

    pub(crate) fn resolve_path(&self, path: &[usize]) -> Option<NodeId> {
        let mut current = self.root;
        for index in path {
            current = *self.significant_children(current).get(*index)?;
        }
        Some(current)
    }

    /// `div(0) > span(1)` style rendering of a path.
    pub(crate) fn describe_path(&self, path: &[usize]) -> String {
        let mut current = self.root;
        let mut segments = Vec::with_capacity(path.len());
        for index in path {
            let Some(child) = self.significant_children(current).get(*index).copied() else {
                segments.push(format!("?({index})"));
                break;
            };
            segments.push(format!("{}({index})", self.node_label(child)));
            current = child;
        }
        segments.join(" > ")
    }

    pub(crate) fn node_label(&self, node_id: NodeId) -> &str {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => "#document",
            NodeType::Element(element) => &element.tag_name,
            NodeType::Text(_) => "#text",
        }
    }

    /// Short description for diagnostics, e.g. `<button#save.primary>`.
    pub(crate) fn describe_element(&self, node_id: NodeId) -> String {
        let Some(element) = self.element(node_id) else {
            return self.node_label(node_id).to_string();
        };
        let mut out = format!("<{}", element.tag_name);
        if let Some(id) = element.attrs.get("id") {
            out.push('#');
            out.push_str(id);
        }
        if let Some(classes) = element.attrs.get("class") {
            for class_name in classes.split_whitespace() {
                out.push('.');
                out.push_str(class_name);
            }
        }
        out.push('>');
        out
    }

    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node_id, &mut out);
        out
    }

    fn write_node(&self, node_id: NodeId, out: &mut String) {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => {
                for child in &self.nodes[node_id.0].children {
                    self.write_node(*child, out);
                }
            }
            NodeType::Text(text) => out.push_str(&escape_html_text_for_serialization(text)),
            NodeType::Element(element) => {
                out.push('<');
                out.push_str(&element.tag_name);
                let mut attrs = element.attrs.iter().collect::<Vec<_>>();
                attrs.sort_by(|(left, _), (right, _)| left.cmp(right));
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_html_attr_for_serialization(value));
                        out.push('"');
                    }
                }
                out.push('>');
                if is_void_tag(&element.tag_name) {
                    return;
                }
                let raw_text = is_raw_text_tag(&element.tag_name);
                for child in &self.nodes[node_id.0].children {
                    match (&self.nodes[child.0].node_type, raw_text) {
                        (NodeType::Text(text), true) => out.push_str(text),
                        _ => stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                            self.write_node(*child, out)
                        }),
                    }
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
            }
        }
    }
}

/// A parsed snapshot of rendered markup.
///
/// Cheap to clone. Each parse carries a generation number; element
/// references from an older generation are re-resolved by structural path
/// before they are used to dispatch events.
#[derive(Clone)]
pub struct Nodes {
    dom: Arc<Dom>,
    generation: u64,
    attribute_prefix: Arc<str>,
}

impl Nodes {
    pub(crate) fn parse(markup: &str, generation: u64, attribute_prefix: Arc<str>) -> Result<Self> {
        Ok(Self {
            dom: Arc::new(parse_html(markup)?),
            generation,
            attribute_prefix,
        })
    }

    pub(crate) fn dom(&self) -> &Dom {
        &self.dom
    }

    pub(crate) fn same_snapshot(&self, other: &Nodes) -> bool {
        Arc::ptr_eq(&self.dom, &other.dom)
    }

    pub(crate) fn attribute_prefix(&self) -> &str {
        &self.attribute_prefix
    }

    pub(crate) fn element_ref(&self, node: NodeId) -> ElementRef {
        ElementRef {
            nodes: self.clone(),
            node,
            path: self.dom.path_of(node),
        }
    }

    pub fn query(&self, selector: &str) -> Result<Option<ElementRef>> {
        Ok(self
            .dom
            .query_selector_all(selector)?
            .first()
            .map(|node| self.element_ref(*node)))
    }

    pub fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        Ok(self
            .dom
            .query_selector_all(selector)?
            .into_iter()
            .map(|node| self.element_ref(node))
            .collect())
    }

    /// Top-level elements of the markup, in document order.
    pub fn roots(&self) -> Vec<ElementRef> {
        self.dom
            .element_children(self.dom.root)
            .into_iter()
            .map(|node| self.element_ref(node))
            .collect()
    }

    pub fn element_count(&self) -> usize {
        self.dom.all_elements().len()
    }

    pub fn to_html(&self) -> String {
        self.dom.dump_node(self.dom.root)
    }
}

impl fmt::Debug for Nodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nodes")
            .field("generation", &self.generation)
            .field("elements", &self.element_count())
            .finish()
    }
}

/// An element inside a [`Nodes`] snapshot.
#[derive(Clone)]
pub struct ElementRef {
    nodes: Nodes,
    node: NodeId,
    path: Vec<usize>,
}

impl ElementRef {
    fn element(&self) -> Option<&Element> {
        self.nodes.dom.element(self.node)
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub(crate) fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn tag_name(&self) -> &str {
        self.nodes.dom.tag_name(self.node).unwrap_or_default()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element()?
            .attrs
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn is_disabled(&self) -> bool {
        self.element().is_some_and(|element| element.disabled)
    }

    pub fn text_content(&self) -> String {
        self.nodes.dom.text_content(self.node)
    }

    pub fn outer_html(&self) -> String {
        self.nodes.dom.dump_node(self.node)
    }

    pub fn inner_html(&self) -> String {
        self.nodes.dom.nodes[self.node.0]
            .children
            .iter()
            .map(|child| self.nodes.dom.dump_node(*child))
            .collect()
    }

    pub fn parent(&self) -> Option<ElementRef> {
        self.nodes
            .dom
            .parent_element(self.node)
            .map(|parent| self.nodes.element_ref(parent))
    }

    pub fn children(&self) -> Vec<ElementRef> {
        self.nodes
            .dom
            .element_children(self.node)
            .into_iter()
            .map(|child| self.nodes.element_ref(child))
            .collect()
    }

    /// Descendants of this element matching `selector`.
    pub fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let dom = &self.nodes.dom;
        Ok(dom
            .query_selector_all(selector)?
            .into_iter()
            .filter(|node| {
                let mut cursor = dom.parent(*node);
                while let Some(parent) = cursor {
                    if parent == self.node {
                        return true;
                    }
                    cursor = dom.parent(parent);
                }
                false
            })
            .map(|node| self.nodes.element_ref(node))
            .collect())
    }

    /// Handler attribute names (`onclick`, ...) carried by this element,
    /// without the renderer's attribute prefix.
    pub fn handler_events(&self) -> Vec<String> {
        let prefix = self.nodes.attribute_prefix();
        let mut events = self
            .element()
            .map(|element| {
                element
                    .attrs
                    .keys()
                    .filter_map(|name| name.strip_prefix(prefix))
                    .filter(|event| !event.ends_with(STOP_PROPAGATION_SUFFIX))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        events.sort();
        events
    }

    /// `div(0) > button(1)` path of this element within its snapshot.
    pub fn path_string(&self) -> String {
        self.nodes.dom.describe_path(&self.path)
    }

    pub fn describe(&self) -> String {
        self.nodes.dom.describe_element(self.node)
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("element", &self.describe())
            .field("path", &self.path_string())
            .field("generation", &self.nodes.generation)
            .finish()
    }
}
