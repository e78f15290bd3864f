use super::*;
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

const REGEX_ATTRIBUTE_SUFFIX: &str = ":regex";

/// One structural difference between two renderings.
///
/// Paths name each node by tag (or `#text`) and its position among the
/// parent's significant children, e.g. `div(0) > ul(1) > li(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupChange {
    NodeAdded {
        path: String,
        markup: String,
    },
    NodeRemoved {
        path: String,
        markup: String,
    },
    AttributeChanged {
        path: String,
        name: String,
        old: Option<String>,
        new: Option<String>,
    },
    TextChanged {
        path: String,
        old: String,
        new: String,
    },
}

impl MarkupChange {
    pub fn path(&self) -> &str {
        match self {
            Self::NodeAdded { path, .. }
            | Self::NodeRemoved { path, .. }
            | Self::AttributeChanged { path, .. }
            | Self::TextChanged { path, .. } => path,
        }
    }
}

impl fmt::Display for MarkupChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeAdded { path, markup } => write!(f, "added {path}: {markup}"),
            Self::NodeRemoved { path, markup } => write!(f, "removed {path}: {markup}"),
            Self::AttributeChanged {
                path,
                name,
                old,
                new,
            } => write!(
                f,
                "attribute {name} at {path}: {} -> {}",
                old.as_deref().unwrap_or("(absent)"),
                new.as_deref().unwrap_or("(absent)")
            ),
            Self::TextChanged { path, old, new } => {
                write!(f, "text at {path}: {old:?} -> {new:?}")
            }
        }
    }
}

pub(crate) struct MarkupDiffer<'a> {
    ignored_prefix: &'a str,
    /// Treat `name:regex="pattern"` on the old side as a pattern for `name`.
    regex_attributes: bool,
}

impl<'a> MarkupDiffer<'a> {
    pub(crate) fn new(ignored_prefix: &'a str) -> Self {
        Self {
            ignored_prefix,
            regex_attributes: false,
        }
    }

    pub(crate) fn with_regex_attributes(mut self) -> Self {
        self.regex_attributes = true;
        self
    }

    pub(crate) fn diff(&self, old: &Dom, new: &Dom) -> Result<Vec<MarkupChange>> {
        let mut changes = Vec::new();
        self.diff_children(old, old.root, new, new.root, &mut Vec::new(), &mut changes)?;
        Ok(changes)
    }

    fn diff_children(
        &self,
        old: &Dom,
        old_parent: NodeId,
        new: &Dom,
        new_parent: NodeId,
        path: &mut Vec<String>,
        changes: &mut Vec<MarkupChange>,
    ) -> Result<()> {
        let old_children = old.significant_children(old_parent);
        let new_children = new.significant_children(new_parent);
        for index in 0..old_children.len().max(new_children.len()) {
            match (old_children.get(index), new_children.get(index)) {
                (Some(old_child), Some(new_child)) => {
                    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || {
                        self.diff_node(old, *old_child, new, *new_child, index, path, changes)
                    })?;
                }
                (Some(old_child), None) => changes.push(MarkupChange::NodeRemoved {
                    path: join_path(path, old.node_label(*old_child), index),
                    markup: old.dump_node(*old_child),
                }),
                (None, Some(new_child)) => changes.push(MarkupChange::NodeAdded {
                    path: join_path(path, new.node_label(*new_child), index),
                    markup: new.dump_node(*new_child),
                }),
                (None, None) => {}
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_node(
        &self,
        old: &Dom,
        old_node: NodeId,
        new: &Dom,
        new_node: NodeId,
        index: usize,
        path: &mut Vec<String>,
        changes: &mut Vec<MarkupChange>,
    ) -> Result<()> {
        if let (Some(old_text), Some(new_text)) = (old.text(old_node), new.text(new_node)) {
            let (old_text, new_text) = (normalize_text(old_text), normalize_text(new_text));
            if old_text != new_text {
                changes.push(MarkupChange::TextChanged {
                    path: join_path(path, "#text", index),
                    old: old_text,
                    new: new_text,
                });
            }
            return Ok(());
        }

        let same_element = match (old.element(old_node), new.element(new_node)) {
            (Some(old_element), Some(new_element)) => {
                old_element.tag_name == new_element.tag_name
            }
            _ => false,
        };
        if !same_element {
            changes.push(MarkupChange::NodeRemoved {
                path: join_path(path, old.node_label(old_node), index),
                markup: old.dump_node(old_node),
            });
            changes.push(MarkupChange::NodeAdded {
                path: join_path(path, new.node_label(new_node), index),
                markup: new.dump_node(new_node),
            });
            return Ok(());
        }

        path.push(format!("{}({index})", new.node_label(new_node)));
        let here = path.join(" > ");
        if let (Some(old_element), Some(new_element)) = (old.element(old_node), new.element(new_node))
        {
            self.diff_attributes(old_element, new_element, &here, changes)?;
        }
        let result = self.diff_children(old, old_node, new, new_node, path, changes);
        path.pop();
        result
    }

    fn diff_attributes(
        &self,
        old: &Element,
        new: &Element,
        path: &str,
        changes: &mut Vec<MarkupChange>,
    ) -> Result<()> {
        let old_attrs = self.comparable_attributes(old);
        let new_attrs = self.comparable_attributes(new);

        let mut patterns = BTreeMap::new();
        let mut plain = BTreeMap::new();
        for (name, value) in old_attrs {
            match name.strip_suffix(REGEX_ATTRIBUTE_SUFFIX) {
                Some(target) if self.regex_attributes => {
                    patterns.insert(target, value);
                }
                _ => {
                    plain.insert(name, value);
                }
            }
        }

        for (name, pattern) in &patterns {
            let actual = new_attrs.get(name).copied();
            let matched = match actual {
                Some(actual) => full_match(pattern, actual)?,
                None => false,
            };
            if !matched {
                changes.push(MarkupChange::AttributeChanged {
                    path: path.to_string(),
                    name: (*name).to_string(),
                    old: Some(format!("/{pattern}/")),
                    new: actual.map(ToString::to_string),
                });
            }
        }

        let names = plain
            .keys()
            .chain(new_attrs.keys())
            .copied()
            .filter(|name| !patterns.contains_key(name))
            .collect::<std::collections::BTreeSet<_>>();
        for name in names {
            let old_value = plain.get(name).copied();
            let new_value = new_attrs.get(name).copied();
            if old_value != new_value {
                changes.push(MarkupChange::AttributeChanged {
                    path: path.to_string(),
                    name: name.to_string(),
                    old: old_value.map(ToString::to_string),
                    new: new_value.map(ToString::to_string),
                });
            }
        }
        Ok(())
    }

    fn comparable_attributes<'e>(&self, element: &'e Element) -> BTreeMap<&'e str, &'e str> {
        element
            .attrs
            .iter()
            .filter(|(name, _)| !name.starts_with(self.ignored_prefix))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}

fn join_path(parent: &[String], label: &str, index: usize) -> String {
    let leaf = format!("{label}({index})");
    if parent.is_empty() {
        leaf
    } else {
        format!("{} > {leaf}", parent.join(" > "))
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().nfc().collect()
}

fn full_match(pattern: &str, value: &str) -> Result<bool> {
    let anchored = format!("^(?:{pattern})$");
    let regex = fancy_regex::Regex::new(&anchored).map_err(|err| Error::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })?;
    regex.is_match(value).map_err(|err| Error::InvalidRegex {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}
