//! Wire message shape shared by connectors, peers, and federation.
//!
//! `{ '#': id, '@': reply-to, get, put, err, ok, originators }` - stable
//! across implementations; the core emits and consumes nothing else.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{GraphData, LexQuery, ServerName};

/// Fresh random message id.
pub fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-replication-hop stamp preventing echo loops between servers.
///
/// Wire form: `{ "<server>": 1 }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Originators(BTreeMap<String, u8>);

impl Originators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: &ServerName) -> Self {
        let mut originators = Self::default();
        originators.insert(name);
        originators
    }

    pub fn insert(&mut self, name: &ServerName) {
        self.0.insert(name.as_str().to_string(), 1);
    }

    pub fn contains(&self, name: &ServerName) -> bool {
        self.0.contains_key(name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One protocol message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    #[serde(rename = "#", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "@", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<LexQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<GraphData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub originators: Option<Originators>,
}

impl Message {
    pub fn get_request(query: LexQuery) -> Self {
        Self {
            id: Some(message_id()),
            get: Some(query),
            ..Self::default()
        }
    }

    pub fn put_request(graph: GraphData, originators: Option<Originators>) -> Self {
        Self {
            id: Some(message_id()),
            put: Some(graph),
            originators,
            ..Self::default()
        }
    }

    pub fn put_reply(reply_to: Option<String>, graph: GraphData) -> Self {
        Self {
            id: Some(message_id()),
            reply_to,
            put: Some(graph),
            ..Self::default()
        }
    }

    pub fn ok_reply(reply_to: Option<String>) -> Self {
        Self {
            id: Some(message_id()),
            reply_to,
            ok: Some(true),
            ..Self::default()
        }
    }

    pub fn err_reply(reply_to: Option<String>, err: impl Into<String>) -> Self {
        Self {
            id: Some(message_id()),
            reply_to,
            err: Some(err.into()),
            ok: Some(false),
            ..Self::default()
        }
    }

    /// True when the message carries no graph data.
    pub fn put_is_empty(&self) -> bool {
        self.put.as_ref().map_or(true, |graph| graph.is_empty())
    }
}
