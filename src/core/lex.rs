//! LEX query descriptors and byte-wise lexical matching.
//!
//! A descriptor is either a point lookup (`#`) or a range scan over soul
//! order (`*` prefix, `>` inclusive start, `<` exclusive end, `%` limit,
//! `-` reverse). Matching compares UTF-8 bytes, never locale order - the
//! same ordering the storage contract promises for `list`.

use serde::{Deserialize, Serialize};

use super::node::{GraphData, Node};
use super::soul::Soul;

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Query descriptor, wire field names preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexQuery {
    #[serde(rename = "#", default, skip_serializing_if = "Option::is_none")]
    pub soul: Option<Soul>,
    #[serde(rename = "*", default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(rename = ">", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(rename = "<", default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(rename = "%", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(rename = "-", default, skip_serializing_if = "is_false")]
    pub reverse: bool,
}

impl LexQuery {
    /// Point lookup for one soul.
    pub fn for_soul(soul: Soul) -> Self {
        Self {
            soul: Some(soul),
            ..Self::default()
        }
    }

    /// Canonical string form. Field order is fixed by the struct, so
    /// equivalent descriptors always serialize identically - the graph
    /// store keys its live-query registry on this.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("descriptor serializes")
    }

    fn scoped(&self, path: &str) -> String {
        match &self.soul {
            Some(soul) => format!("{}/{}", soul.as_str(), path),
            None => path.to_string(),
        }
    }

    /// Derive the range-scan window, or `None` for a plain point lookup.
    ///
    /// Range fields given together with a soul are scoped under `soul/`;
    /// a soul with only limit/direction scans its own children.
    pub fn list_options(&self) -> Option<ListOptions> {
        let mut list = ListOptions::default();
        let mut any = false;

        if self.reverse {
            list.reverse = true;
            any = true;
        }
        if let Some(limit) = self.limit {
            list.limit = Some(limit);
            any = true;
        }
        if let Some(prefix) = &self.prefix {
            list.prefix = Some(self.scoped(prefix));
            any = true;
        } else if let (Some(soul), true) = (&self.soul, any) {
            list.prefix = Some(format!("{}/", soul.as_str()));
        }
        if let Some(start) = &self.start {
            list.start = Some(self.scoped(start));
            any = true;
        }
        if let Some(end) = &self.end {
            list.end = Some(self.scoped(end));
            any = true;
        }

        if any {
            Some(list)
        } else {
            None
        }
    }

    /// Whether `soul` is covered by this descriptor.
    pub fn matches(&self, soul: &Soul) -> bool {
        if Some(soul) == self.soul.as_ref() {
            return true;
        }
        match self.list_options() {
            Some(list) => list.matches(soul.as_str()),
            None => false,
        }
    }
}

/// Resolved scan window against plain keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
    pub limit: Option<usize>,
    pub reverse: bool,
}

impl ListOptions {
    pub fn matches(&self, name: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(start) = &self.start {
            if name < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if name >= end.as_str() {
                return false;
            }
        }
        true
    }
}

/// Select nodes from a snapshot matching a descriptor, in scan order,
/// capped by the descriptor's limit. Tombstones never match.
pub fn select_nodes<'a>(graph: &'a GraphData, query: &LexQuery) -> Vec<&'a Node> {
    let mut nodes: Vec<&Node> = graph
        .values()
        .flatten()
        .filter(|node| query.matches(node.soul()))
        .collect();
    nodes.sort_by(|a, b| {
        let ordering = a.soul().cmp(b.soul());
        if query.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    if let Some(limit) = query.limit {
        nodes.truncate(limit);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    fn soul(s: &str) -> Soul {
        Soul::new(s).unwrap()
    }

    fn range(start: &str, end: &str) -> LexQuery {
        LexQuery {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..LexQuery::default()
        }
    }

    #[test]
    fn start_is_inclusive_end_is_exclusive() {
        let query = range("b", "d");
        let matched: Vec<&str> = ["a", "b", "c", "d"]
            .into_iter()
            .filter(|s| query.matches(&soul(s)))
            .collect();
        assert_eq!(matched, vec!["b", "c"]);
    }

    #[test]
    fn prefix_containment() {
        let query = LexQuery {
            prefix: Some("chat/".to_string()),
            ..LexQuery::default()
        };
        assert!(query.matches(&soul("chat/2019")));
        assert!(!query.matches(&soul("mail/2019")));
    }

    #[test]
    fn point_descriptor_is_equality() {
        let query = LexQuery::for_soul(soul("~alice"));
        assert!(query.matches(&soul("~alice")));
        assert!(!query.matches(&soul("~alice/profile")));
        assert!(query.list_options().is_none());
    }

    #[test]
    fn soul_scoped_range() {
        let query = LexQuery {
            soul: Some(soul("chat")),
            start: Some("2019-06-20".to_string()),
            ..LexQuery::default()
        };
        let list = query.list_options().unwrap();
        assert_eq!(list.start.as_deref(), Some("chat/2019-06-20"));
        assert!(query.matches(&soul("chat/2019-06-21T07:37:24.197Z")));
    }

    #[test]
    fn canonical_string_is_stable() {
        let a = range("a", "b").canonical();
        let b = range("a", "b").canonical();
        assert_eq!(a, b);
        assert_ne!(a, LexQuery::for_soul(soul("a")).canonical());
    }

    #[test]
    fn select_respects_direction_and_limit() {
        let mut graph = GraphData::new();
        for s in ["k/a", "k/b", "k/c"] {
            let mut node = Node::new(soul(s));
            node.insert("v", Value::text(s), 1);
            graph.insert(soul(s), Some(node));
        }
        let query = LexQuery {
            prefix: Some("k/".to_string()),
            limit: Some(2),
            reverse: true,
            ..LexQuery::default()
        };
        let picked: Vec<&str> = select_nodes(&graph, &query)
            .iter()
            .map(|n| n.soul().as_str())
            .collect();
        assert_eq!(picked, vec!["k/c", "k/b"]);
    }
}
