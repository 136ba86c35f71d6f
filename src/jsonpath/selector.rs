use std::mem;

use log::warn;

use crate::{
    ast::{normalize_index, Slice},
    evaluator::DynamicResources,
    jsonpath::{filter::FilterExpr, Node},
    path::PathElement,
    value::Value,
};

/// One link in a compiled JSONPath chain.
///
/// Every selector either forwards what it matched to its `tail` or, at the end of the
/// chain, emits it into the accumulator together with its location.
#[derive(Debug, Clone)]
pub struct Selector {
    pub kind: SelectorKind,
    pub tail: Option<Box<Selector>>,
}

#[derive(Debug, Clone)]
pub enum SelectorKind {
    /// `$`; `id` keys the per-evaluation cache for root paths inside filters
    Root { id: usize },
    /// `@`
    CurrentNode,
    /// `^`, repeated for each level; re-resolved from the root along the path stem
    Parent(usize),
    /// `.name` or `['name']`; `length` on an array yields its size
    Identifier(String),
    Index(i64),
    Slice(Slice),
    /// `*`: array elements or object values
    Wildcard,
    /// `..`: the tail applies to every container at or below the current node
    RecursiveDescent,
    /// `[?expr]`
    Filter(FilterExpr),
    /// `[a, b, ...]`
    Union(Vec<Selector>),
}

impl Selector {
    /// Links `kinds` into a chain, first kind at the head.
    pub fn chain(kinds: Vec<SelectorKind>) -> Option<Selector> {
        kinds.into_iter().rev().fold(None, |tail, kind| {
            Some(Selector {
                kind,
                tail: tail.map(Box::new),
            })
        })
    }

    /// Whether the chain can match at most one node.
    pub fn is_singular(&self) -> bool {
        matches!(
            self.kind,
            SelectorKind::Root { .. }
                | SelectorKind::CurrentNode
                | SelectorKind::Parent(_)
                | SelectorKind::Identifier(_)
                | SelectorKind::Index(_)
        ) && self.tail.as_ref().is_none_or(|tail| tail.is_singular())
    }

    pub fn select<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        stem: &mut Vec<PathElement>,
        current: Value<'a>,
        acc: &mut Vec<Node<'a>>,
    ) {
        if !resources.tick() {
            return;
        }

        match &self.kind {
            SelectorKind::Root { .. } => {
                let root = resources.root();
                self.forward(resources, stem, root, acc);
            }
            SelectorKind::CurrentNode => self.forward(resources, stem, current, acc),
            SelectorKind::Parent(depth) => {
                let Some(keep) = stem.len().checked_sub(*depth) else {
                    return;
                };
                let dropped = stem.split_off(keep);
                if let Some(ancestor) = resolve(resources.root(), stem) {
                    self.forward(resources, stem, ancestor, acc);
                }
                stem.extend(dropped);
            }
            SelectorKind::Identifier(name) => match &current {
                Value::Object(entries) => {
                    if let Some(value) = entries.get(name) {
                        self.visit(resources, stem, PathElement::Name(name.clone()), value, acc);
                    }
                }
                Value::Array(items) if name == "length" => {
                    let length = Value::from(items.len());
                    self.visit(resources, stem, PathElement::Name(name.clone()), length, acc);
                }
                _ => {}
            },
            SelectorKind::Index(index) => {
                if let Some(items) = current.as_array()
                    && let Some(i) = normalize_index(*index, items.len())
                    && let Some(item) = items.get(i)
                {
                    self.visit(resources, stem, PathElement::Index(i), item, acc);
                }
            }
            SelectorKind::Slice(slice) => {
                if let Some(items) = current.as_array() {
                    for i in slice.indices(items.len()) {
                        if let Some(item) = items.get(i) {
                            self.visit(resources, stem, PathElement::Index(i), item, acc);
                        }
                    }
                }
            }
            SelectorKind::Wildcard => match &current {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.visit(resources, stem, PathElement::Index(i), item, acc);
                    }
                }
                Value::Object(entries) => {
                    for (name, value) in entries.iter() {
                        self.visit(resources, stem, PathElement::Name(name.into_owned()), value, acc);
                    }
                }
                _ => {}
            },
            SelectorKind::RecursiveDescent => self.descend(resources, stem, current, acc, 0),
            SelectorKind::Filter(predicate) => match &current {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if predicate.test(resources, &item) {
                            self.visit(resources, stem, PathElement::Index(i), item, acc);
                        }
                    }
                }
                Value::Object(entries) => {
                    for (name, value) in entries.iter() {
                        if predicate.test(resources, &value) {
                            self.visit(resources, stem, PathElement::Name(name.into_owned()), value, acc);
                        }
                    }
                }
                _ => {}
            },
            SelectorKind::Union(branches) => {
                let mut hits = Vec::new();
                for branch in branches {
                    branch.select(resources, stem, current.clone(), &mut hits);
                }
                for hit in hits {
                    let saved = mem::replace(stem, hit.location);
                    self.forward(resources, stem, hit.value, acc);
                    *stem = saved;
                }
            }
        }
    }

    fn forward<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        stem: &mut Vec<PathElement>,
        value: Value<'a>,
        acc: &mut Vec<Node<'a>>,
    ) {
        match &self.tail {
            Some(tail) => tail.select(resources, stem, value, acc),
            None => acc.push(Node {
                location: stem.clone(),
                value,
            }),
        }
    }

    /// Forwards a child of the current node with its location pushed onto the stem.
    fn visit<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        stem: &mut Vec<PathElement>,
        element: PathElement,
        value: Value<'a>,
        acc: &mut Vec<Node<'a>>,
    ) {
        stem.push(element);
        self.forward(resources, stem, value, acc);
        stem.pop();
    }

    /// Pre-order walk: each container is forwarded before its children are visited.
    fn descend<'a>(
        &'a self,
        resources: &mut DynamicResources<'a>,
        stem: &mut Vec<PathElement>,
        current: Value<'a>,
        acc: &mut Vec<Node<'a>>,
        depth: usize,
    ) {
        if !matches!(current, Value::Array(_) | Value::Object(_)) {
            return;
        }
        if depth > resources.max_depth() {
            warn!("recursive descent truncated at depth {depth}");
            return;
        }

        self.forward(resources, stem, current.clone(), acc);
        match &current {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    stem.push(PathElement::Index(i));
                    self.descend(resources, stem, item, acc, depth + 1);
                    stem.pop();
                }
            }
            Value::Object(entries) => {
                for (name, value) in entries.iter() {
                    stem.push(PathElement::Name(name.into_owned()));
                    self.descend(resources, stem, value, acc, depth + 1);
                    stem.pop();
                }
            }
            _ => {}
        }
    }
}

/// Walks `location` down from `root`.
fn resolve<'a>(root: Value<'a>, location: &[PathElement]) -> Option<Value<'a>> {
    location
        .iter()
        .try_fold(root, |value, element| match element {
            PathElement::Index(i) => value.index(*i),
            PathElement::Name(name) => value.get(name),
        })
}
