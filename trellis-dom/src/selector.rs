//! Small selector engine for `query_all`.
//!
//! Supported: `*`, `tag`, `.class`, `#id`, `[attr]`, `[attr=value]`,
//! compounds of those (`li.done[data-id="3"]`), descendant combinators
//! (`ul li`) and comma-separated groups.

use crate::document::{Document, NodeId};
use crate::error::DomError;

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleSelector {
    Universal,
    Tag(String),
    Class(String),
    Id(String),
    Attr { name: String, value: Option<String> },
}

impl SimpleSelector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        match self {
            SimpleSelector::Universal => true,
            SimpleSelector::Tag(t) => el.tag.eq_ignore_ascii_case(t),
            SimpleSelector::Class(c) => el.has_class(c),
            SimpleSelector::Id(id) => el.attrs.get("id").is_some_and(|v| v == id),
            SimpleSelector::Attr { name, value: None } => el.attrs.contains_key(name),
            SimpleSelector::Attr {
                name,
                value: Some(expected),
            } => el.attrs.get(name).is_some_and(|v| v == expected),
        }
    }
}

/// All simple selectors must match one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound(pub Vec<SimpleSelector>);

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.element(node).is_some() && self.0.iter().all(|s| s.matches(doc, node))
    }
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector(pub Vec<Compound>);

impl Selector {
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.0.split_last() else {
            return false;
        };
        if !last.matches(doc, node) {
            return false;
        }
        // Greedy match of the remaining compounds against the ancestor chain.
        let mut remaining = ancestors.iter().rev().peekable();
        let mut current = doc.parent(node);
        while let (Some(compound), Some(n)) = (remaining.peek(), current) {
            if compound.matches(doc, n) {
                remaining.next();
            }
            current = doc.parent(n);
        }
        remaining.peek().is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(pub Vec<Selector>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, DomError> {
        let invalid = |reason: &str| DomError::InvalidSelector {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let mut list = Vec::new();
        for group in input.split(',') {
            let mut compounds = Vec::new();
            for part in group.split_whitespace() {
                compounds.push(parse_compound(part).map_err(|reason| invalid(&reason))?);
            }
            if compounds.is_empty() {
                return Err(invalid("empty selector"));
            }
            list.push(Selector(compounds));
        }
        Ok(SelectorList(list))
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.0.iter().any(|s| s.matches(doc, node))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn take_ident(rest: &mut &str) -> Result<String, String> {
    let end = rest
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(rest.len());
    if end == 0 {
        return Err("expected a name".to_string());
    }
    let ident = rest[..end].to_string();
    *rest = &rest[end..];
    Ok(ident)
}

fn parse_compound(part: &str) -> Result<Compound, String> {
    let mut parts = Vec::new();
    let mut rest = part;

    if let Some(after) = rest.strip_prefix('*') {
        parts.push(SimpleSelector::Universal);
        rest = after;
    } else if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        parts.push(SimpleSelector::Tag(take_ident(&mut rest)?.to_ascii_lowercase()));
    }

    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        match c {
            '.' => parts.push(SimpleSelector::Class(take_ident(&mut rest)?)),
            '#' => parts.push(SimpleSelector::Id(take_ident(&mut rest)?)),
            '[' => {
                let close = rest.find(']').ok_or("unclosed `[`")?;
                let inner = &rest[..close];
                rest = &rest[close + 1..];
                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim();
                        let value = value
                            .strip_prefix('"')
                            .and_then(|v| v.strip_suffix('"'))
                            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                            .unwrap_or(value);
                        (name.trim(), Some(value.to_string()))
                    }
                    None => (inner.trim(), None),
                };
                if name.is_empty() {
                    return Err("empty attribute name".to_string());
                }
                parts.push(SimpleSelector::Attr {
                    name: name.to_string(),
                    value,
                });
            }
            other => return Err(format!("unexpected `{other}`")),
        }
    }

    if parts.is_empty() {
        return Err("empty compound".to_string());
    }
    Ok(Compound(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compounds_and_groups() {
        let list = SelectorList::parse("li.done[data-id='3'], #main").unwrap();
        assert_eq!(
            list.0[0].0[0].0,
            vec![
                SimpleSelector::Tag("li".into()),
                SimpleSelector::Class("done".into()),
                SimpleSelector::Attr {
                    name: "data-id".into(),
                    value: Some("3".into())
                },
            ]
        );
        assert_eq!(list.0[1].0[0].0, vec![SimpleSelector::Id("main".into())]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("li[").is_err());
        assert!(SelectorList::parse("a > b").is_err());
    }
}
