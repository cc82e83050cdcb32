//! Directive extraction in two phases: plan every binding of a subtree
//! without touching it, then strip directive attributes and register the
//! planned bindings. A broken template therefore leaves no bindings behind.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;
use trellis_core::Scope;
use trellis_dom::{Document, Element, NodeId};
use trellis_template::AttrKind;

use crate::binding::loops::LoopSpec;
use crate::binding::{
    Binding, BindingKind, BindingParts, ConditionBinding, DataBinding, EventBinding, LoopBinding,
    ModelBinding, Site, StateBinding,
};
use crate::component::ComponentFactory;
use crate::error::ConfigError;
use crate::registry::Registry;
use crate::runtime::Engine;

enum Target {
    Node(NodeId),
    /// `site` carries `data-for` and is swapped for an anchor; `stencil` is
    /// kept detached and cloned per row.
    Loop { site: NodeId, stencil: NodeId },
}

struct Planned {
    target: Target,
    tag: String,
    parts: BindingParts,
}

#[derive(Clone, Copy)]
struct Planner<'a> {
    doc: &'a Document,
    registry: &'a Registry,
    components: &'a HashMap<String, ComponentFactory>,
    /// Stencil being validated; its own `data-for` is not a nested loop.
    stencil_root: Option<NodeId>,
}

impl Planner<'_> {
    /// Plan a run of siblings. An element's `data-if` stays open for the next
    /// element sibling only; text in between does not close it.
    fn siblings(&self, nodes: &[NodeId], out: &mut Vec<Planned>) -> Result<(), ConfigError> {
        let mut open_if: Option<String> = None;
        for &node in nodes {
            if self.doc.element(node).is_none() {
                continue;
            }
            open_if = self.node(node, open_if.take(), out)?;
        }
        Ok(())
    }

    /// Plan one element and its subtree. Returns the element's own `data-if`
    /// expression so a following `data-else` can pair with it.
    fn node(
        &self,
        node: NodeId,
        open_if: Option<String>,
        out: &mut Vec<Planned>,
    ) -> Result<Option<String>, ConfigError> {
        let Some(el) = self.doc.element(node) else {
            return Ok(None);
        };
        if self.registry.is_mapped(node) {
            self.siblings(self.doc.children(node), out)?;
            return Ok(None);
        }
        let tag = el.tag.as_str();
        let directives: Vec<(&str, &str, AttrKind)> = el
            .attrs
            .iter()
            .filter_map(|(name, value)| {
                let kind = AttrKind::classify(name);
                kind.is_directive()
                    .then_some((name.as_str(), value.as_str(), kind))
            })
            .collect();
        let has = |wanted: &AttrKind| directives.iter().any(|(_, _, kind)| kind == wanted);

        if has(&AttrKind::For) && self.stencil_root != Some(node) {
            if has(&AttrKind::Else) {
                return Err(ConfigError::ConflictingDirectives {
                    tag: tag.to_string(),
                    reason: "data-else cannot share a node with data-for".to_string(),
                });
            }
            out.push(self.plan_loop(node, el)?);
            return Ok(None);
        }
        if has(&AttrKind::If) && has(&AttrKind::Else) {
            return Err(ConfigError::ConflictingDirectives {
                tag: tag.to_string(),
                reason: "data-if and data-else on the same node".to_string(),
            });
        }

        let mut own_if = None;
        for (name, value, kind) in directives {
            let site = Site { tag, attribute: name };
            let parts = match kind {
                AttrKind::Static | AttrKind::For => continue,
                AttrKind::If => {
                    own_if = Some(value.to_string());
                    BindingParts {
                        kind: BindingKind::Condition(ConditionBinding::new(false)),
                        attribute: name.to_string(),
                        expression: value.to_string(),
                        modifier: None,
                        evaluator: site.compile(value, &[])?,
                    }
                }
                AttrKind::Else => {
                    let Some(partner) = &open_if else {
                        return Err(ConfigError::OrphanElse {
                            tag: tag.to_string(),
                        });
                    };
                    let expression = format!("!({partner})");
                    BindingParts {
                        kind: BindingKind::Condition(ConditionBinding::new(true)),
                        attribute: name.to_string(),
                        evaluator: site.compile(&expression, &[])?,
                        expression,
                        modifier: None,
                    }
                }
                AttrKind::Bind(prop) => BindingParts {
                    kind: BindingKind::Data(DataBinding::new(&prop)),
                    attribute: name.to_string(),
                    expression: value.to_string(),
                    evaluator: site.compile(value, &[])?,
                    modifier: Some(prop),
                },
                AttrKind::Model => {
                    let input_type = el.attrs.get("type").map(String::as_str);
                    let (model, reader) = ModelBinding::parse(&site, value, input_type)?;
                    BindingParts {
                        kind: BindingKind::Model(model),
                        attribute: name.to_string(),
                        expression: value.to_string(),
                        modifier: None,
                        evaluator: reader,
                    }
                }
                AttrKind::On(event) => BindingParts {
                    evaluator: site.compile_assignable(value, &["$event"])?,
                    kind: BindingKind::Event(EventBinding::new(event.clone())),
                    attribute: name.to_string(),
                    expression: value.to_string(),
                    modifier: Some(event),
                },
                AttrKind::State(child) => {
                    if !self.components.contains_key(&tag.to_ascii_lowercase()) {
                        return Err(ConfigError::UnknownComponent {
                            tag: tag.to_string(),
                            attribute: name.to_string(),
                        });
                    }
                    BindingParts {
                        evaluator: site.compile(value, &[])?,
                        kind: BindingKind::State(StateBinding::new(child.clone())),
                        attribute: name.to_string(),
                        expression: value.to_string(),
                        modifier: Some(child),
                    }
                }
            };
            out.push(Planned {
                target: Target::Node(node),
                tag: tag.to_string(),
                parts,
            });
        }

        self.siblings(self.doc.children(node), out)?;
        Ok(own_if)
    }

    fn plan_loop(&self, node: NodeId, el: &Element) -> Result<Planned, ConfigError> {
        let text = el.attrs.get("data-for").map(String::as_str).unwrap_or_default();
        let spec = LoopSpec::parse(text)?;

        let stencil = if el.tag == "template" {
            let first = self
                .doc
                .children(node)
                .iter()
                .copied()
                .find(|&child| self.doc.element(child).is_some());
            let stencil = first.ok_or_else(|| ConfigError::InvalidLoop {
                expression: text.to_string(),
                reason: "<template> has no element to repeat".to_string(),
            })?;
            if self.doc.has_attr(stencil, "data-for") {
                return Err(ConfigError::ConflictingDirectives {
                    tag: "template".to_string(),
                    reason: "the repeated element cannot carry its own data-for".to_string(),
                });
            }
            stencil
        } else {
            node
        };
        let stencil_tag = self.doc.tag(stencil).unwrap_or_default();

        let key_source = self
            .doc
            .attr(stencil, "data-bind:key")
            .ok_or_else(|| ConfigError::MissingKey {
                expression: text.to_string(),
            })?;
        let key = Site {
            tag: stencil_tag,
            attribute: "data-bind:key",
        }
        .compile(key_source, &[])?;
        let iterable = Site {
            tag: &el.tag,
            attribute: "data-for",
        }
        .compile(&spec.iterable, &[])?;

        // Rows are mapped lazily, but a broken stencil is still a compile error.
        let validator = Planner {
            stencil_root: Some(stencil),
            ..*self
        };
        validator.node(stencil, None, &mut Vec::new())?;

        Ok(Planned {
            target: Target::Loop {
                site: node,
                stencil,
            },
            tag: stencil_tag.to_string(),
            parts: BindingParts {
                kind: BindingKind::Loop(LoopBinding::new(&spec, stencil, key)),
                attribute: "data-for".to_string(),
                expression: text.to_string(),
                modifier: None,
                evaluator: iterable,
            },
        })
    }
}

/// Map `nodes` (treated as siblings) and their subtrees into bindings that
/// evaluate against `scope`. Returns the number of bindings created.
pub(crate) fn map(engine: &Rc<Engine>, nodes: &[NodeId], scope: &Scope) -> Result<usize, ConfigError> {
    let planned = {
        let doc = engine.doc.borrow();
        let registry = engine.registry.borrow();
        let components = engine.components.borrow();
        let planner = Planner {
            doc: &doc,
            registry: &registry,
            components: &components,
            stencil_root: None,
        };
        let mut out = Vec::new();
        planner.siblings(nodes, &mut out)?;
        out
    };
    apply(engine, planned, scope)
}

fn apply(engine: &Rc<Engine>, planned: Vec<Planned>, scope: &Scope) -> Result<usize, ConfigError> {
    let count = planned.len();
    for Planned { target, tag, parts } in planned {
        let node = match target {
            Target::Node(node) => {
                engine.doc.borrow_mut().remove_attr(node, &parts.attribute)?;
                node
            }
            Target::Loop { site, stencil } => {
                let mut doc = engine.doc.borrow_mut();
                let anchor = doc.create_anchor(parts.expression.as_str());
                doc.replace(site, anchor)?;
                if stencil == site {
                    doc.remove_attr(stencil, "data-for")?;
                } else {
                    doc.detach(stencil)?;
                    doc.remove(site)?;
                }
                anchor
            }
        };
        let binding = Rc::new(Binding::new(parts, node, &tag, scope.clone()));
        let id = engine.registry.borrow_mut().register(Rc::clone(&binding));
        binding.bind(id, engine)?;
    }
    if count > 0 {
        debug!(bindings = count, "mapped subtree");
    }
    Ok(count)
}
