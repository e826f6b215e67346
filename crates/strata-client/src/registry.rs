//! Binds specific topics to specific backend instances so a deployment can
//! shard its document store across more than one [`AsyncClient`].

use std::collections::HashMap;

use strata_kv::OrderedKv;

use crate::client::AsyncClient;
use crate::error::{ClientError, Result};

/// A topic-keyed set of clients, with one designated fallback for topics
/// that have no specific binding.
pub struct MultipleAsyncClients<K: OrderedKv + 'static> {
    default: AsyncClient<K>,
    bindings: HashMap<String, AsyncClient<K>>,
}

impl<K: OrderedKv + 'static> MultipleAsyncClients<K> {
    pub fn new(default: AsyncClient<K>) -> Self {
        Self { default, bindings: HashMap::new() }
    }

    /// Route `topic` to `client` instead of the default.
    pub fn bind(&mut self, topic: impl Into<String>, client: AsyncClient<K>) {
        self.bindings.insert(topic.into(), client);
    }

    pub fn resolve(&self, topic: &str) -> &AsyncClient<K> {
        self.bindings.get(topic).unwrap_or(&self.default)
    }

    /// Like [`Self::resolve`], but errors instead of silently falling back
    /// to the default — for deployments that require every topic to have
    /// an explicit binding.
    pub fn resolve_strict(&self, topic: &str) -> Result<&AsyncClient<K>> {
        self.bindings.get(topic).ok_or_else(|| ClientError::UnroutedTopic(topic.to_string()))
    }
}
