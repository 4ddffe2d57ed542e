//! Facet trees: per-dimension value counts, optionally hierarchical.
//!
//! Nodes are shared behind `Arc` so a merged tree can adopt a shard's
//! subtree without copying it, and a cached tree can be cloned cheaply and
//! edited (display names, `specified` marks) without touching the original.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::traits::LabelResolver;

pub const PATH_SEPARATOR: char = '.';
/// Internal dimension holding title n-grams.
pub const NGRAM_DIMENSION: &str = "_ngram";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub count: u64,
    /// Global frequency, filled in when the caller asked for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub specified: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Arc<FacetValue>>,
}

impl FacetValue {
    pub fn new(label: impl Into<String>, count: u64) -> Self {
        Self { label: label.into(), display: None, count, total: None, specified: false, children: Vec::new() }
    }

    pub fn with_children(mut self, children: Vec<FacetValue>) -> Self {
        self.children = children.into_iter().map(Arc::new).collect();
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn specified(mut self) -> Self {
        self.specified = true;
        self
    }

    pub fn child(&self, label: &str) -> Option<&Arc<FacetValue>> {
        self.children.iter().find(|c| c.label == label)
    }

    pub fn display_or_label(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.label)
    }

    fn absorb(&mut self, other: &FacetValue) {
        self.count += other.count;
        self.specified |= other.specified;
        self.total = match (self.total, other.total) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        if self.display.is_none() {
            self.display.clone_from(&other.display);
        }
        if self.children.is_empty() {
            self.children = other.children.clone();
        } else {
            merge_values(&mut self.children, &other.children);
        }
    }
}

fn merge_values(into: &mut Vec<Arc<FacetValue>>, from: &[Arc<FacetValue>]) {
    for value in from {
        match into.iter_mut().find(|v| v.label == value.label) {
            Some(existing) => Arc::make_mut(existing).absorb(value),
            None => into.push(Arc::clone(value)),
        }
    }
}

fn sort_values(values: &mut [Arc<FacetValue>], roots: bool) {
    values.sort_by(|a, b| {
        let specified = if roots { b.specified.cmp(&a.specified) } else { std::cmp::Ordering::Equal };
        specified.then_with(|| b.count.cmp(&a.count)).then_with(|| a.label.cmp(&b.label))
    });
    for value in values.iter_mut() {
        if !value.children.is_empty() {
            sort_values(&mut Arc::make_mut(value).children, false);
        }
    }
}

fn join_path(prefix: &str, label: &str) -> String {
    if prefix.is_empty() {
        label.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub values: Vec<Arc<FacetValue>>,
}

impl Facet {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), display: None, values: Vec::new() }
    }

    pub fn with_values(mut self, values: Vec<FacetValue>) -> Self {
        self.values = values.into_iter().map(Arc::new).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, label: &str) -> Option<&Arc<FacetValue>> {
        self.values.iter().find(|v| v.label == label)
    }

    pub fn values_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Arc<FacetValue>> + 'a {
        self.values.iter().filter(move |v| v.label.starts_with(prefix))
    }

    /// Node at a hierarchical path.
    pub fn find(&self, path: &[String]) -> Option<&Arc<FacetValue>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.value(first)?;
        for label in rest {
            node = node.child(label)?;
        }
        Some(node)
    }

    /// Every node with its dotted path, depth first.
    pub fn paths(&self) -> Vec<(String, &FacetValue)> {
        fn walk<'a>(values: &'a [Arc<FacetValue>], prefix: &str, out: &mut Vec<(String, &'a FacetValue)>) {
            for v in values {
                let path = join_path(prefix, &v.label);
                out.push((path.clone(), &**v));
                walk(&v.children, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.values, "", &mut out);
        out
    }

    /// Folds `other` into this facet. Unchanged subtrees stay shared.
    pub fn merge(&mut self, other: &Facet) {
        if self.display.is_none() {
            self.display.clone_from(&other.display);
        }
        merge_values(&mut self.values, &other.values);
    }

    pub fn sort(&mut self) {
        sort_values(&mut self.values, true);
    }

    /// Keeps the first `n` values; `0` keeps everything.
    pub fn trim(&mut self, n: usize) {
        if n > 0 && self.values.len() > n {
            self.values.truncate(n);
        }
    }

    /// With more than `n` values, keeps up to `n` that are specified or
    /// below `threshold`, so a handful of near-universal values don't crowd
    /// out the informative ones. Falls back to the first `n` when too few
    /// qualify.
    pub fn trim_with_threshold(&mut self, threshold: u64, n: usize) {
        if self.values.len() <= n {
            return;
        }
        let kept: Vec<_> = self
            .values
            .iter()
            .filter(|v| v.specified || v.count < threshold)
            .take(n)
            .cloned()
            .collect();
        if kept.len() < n {
            self.values.truncate(n);
        } else {
            self.values = kept;
        }
    }

    /// Keeps nodes whose dotted path is listed, with their ancestors and
    /// descendants. Listed nodes come back `specified`.
    pub fn filter(&self, paths: &[&str]) -> Facet {
        fn walk(values: &[Arc<FacetValue>], prefix: &str, wanted: &HashSet<&str>) -> Vec<Arc<FacetValue>> {
            let mut out = Vec::new();
            for v in values {
                let path = join_path(prefix, &v.label);
                if wanted.contains(path.as_str()) {
                    let mut node = FacetValue::clone(v);
                    node.specified = true;
                    out.push(Arc::new(node));
                    continue;
                }
                let children = walk(&v.children, &path, wanted);
                if !children.is_empty() {
                    out.push(Arc::new(FacetValue { children, ..FacetValue::clone(v) }));
                }
            }
            out
        }
        let wanted: HashSet<&str> = paths.iter().copied().collect();
        Facet { name: self.name.clone(), display: self.display.clone(), values: walk(&self.values, "", &wanted) }
    }

    /// Flags `label` as selected. A selected value that fell outside the
    /// top list is put back in front as long as it has any hits.
    pub fn mark_selected(&mut self, label: &str, count: u64) {
        match self.values.iter_mut().find(|v| v.label == label) {
            Some(existing) => Arc::make_mut(existing).specified = true,
            None if count > 0 => self.values.insert(0, Arc::new(FacetValue::new(label, count).specified())),
            None => {}
        }
    }

    /// Fills in display names. Only nodes that gain a name are copied.
    pub fn resolve_display(&mut self, resolver: &dyn LabelResolver) {
        fn walk(values: &mut [Arc<FacetValue>], dimension: &str, path: &mut Vec<String>, resolver: &dyn LabelResolver) {
            for v in values.iter_mut() {
                path.push(v.label.clone());
                if v.display.is_none() {
                    if let Some(name) = resolver.display_name(dimension, path) {
                        Arc::make_mut(v).display = Some(name);
                    }
                }
                if !v.children.is_empty() {
                    walk(&mut Arc::make_mut(v).children, dimension, path, resolver);
                }
                path.pop();
            }
        }
        if self.display.is_none() {
            self.display = resolver.display_name(&self.name, &[]);
        }
        let name = self.name.clone();
        walk(&mut self.values, &name, &mut Vec::new(), resolver);
    }
}

/// Merges per-shard facet lists dimension by dimension, then sorts each.
/// Dimensions keep the order in which they were first seen.
pub fn merge_facets<I>(lists: I) -> Vec<Facet>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = Facet>,
{
    let mut merged: Vec<Facet> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for list in lists {
        for facet in list {
            match index.get(&facet.name) {
                Some(&i) => merged[i].merge(&facet),
                None => {
                    index.insert(facet.name.clone(), merged.len());
                    merged.push(facet);
                }
            }
        }
    }
    for facet in &mut merged {
        facet.sort();
    }
    merged
}

/// Threshold below which a value counts as informative for `total` hits.
pub fn trim_threshold(total: u64, ratio: f64) -> u64 {
    (total as f64 * ratio + 0.5) as u64
}

/// Builds a hierarchical dimension from its root values. `fetch` receives
/// every path of one tree level and returns the children of each, in order;
/// descent stops at `max_depth` levels or when a level has no children.
pub fn build_hierarchy<F>(roots: Vec<(String, u64)>, max_depth: usize, mut fetch: F) -> Result<Vec<Arc<FacetValue>>>
where
    F: FnMut(&[Vec<String>]) -> Result<Vec<Vec<(String, u64)>>>,
{
    let mut children: HashMap<Vec<String>, Vec<(String, u64)>> = HashMap::new();
    let mut frontier: Vec<Vec<String>> = roots.iter().map(|(label, _)| vec![label.clone()]).collect();

    for _ in 1..max_depth {
        if frontier.is_empty() {
            break;
        }
        let level = fetch(&frontier)?;
        let mut next = Vec::new();
        for (path, kids) in frontier.into_iter().zip(level) {
            if kids.is_empty() {
                continue;
            }
            for (label, _) in &kids {
                let mut child = path.clone();
                child.push(label.clone());
                next.push(child);
            }
            children.insert(path, kids);
        }
        frontier = next;
    }

    fn assemble(path: &mut Vec<String>, label: String, count: u64, children: &HashMap<Vec<String>, Vec<(String, u64)>>) -> Arc<FacetValue> {
        path.push(label.clone());
        let kids = children
            .get(path.as_slice())
            .map(|kids| kids.iter().map(|(l, c)| assemble(path, l.clone(), *c, children)).collect())
            .unwrap_or_default();
        path.pop();
        Arc::new(FacetValue { children: kids, ..FacetValue::new(label, count) })
    }

    let mut path = Vec::new();
    Ok(roots.into_iter().map(|(label, count)| assemble(&mut path, label, count, &children)).collect())
}
