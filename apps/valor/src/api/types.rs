//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use valor_core::{CrudOptions, Identity, MetaData, SessionStats};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Session status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub entities: usize,
    pub collections: std::collections::BTreeMap<String, usize>,
    pub broken_links: usize,
    pub persistent: bool,
}

impl From<SessionStats> for StatusResponse {
    fn from(stats: SessionStats) -> Self {
        Self {
            entities: stats.entities,
            collections: stats.collections,
            broken_links: stats.broken_links,
            persistent: stats.persistent,
        }
    }
}

// =============================================================================
// ENTITY RESPONSES
// =============================================================================

/// One entity: its MetaData row and its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResponse {
    pub meta: MetaData,
    pub data: Option<Value>,
}

/// An ordered list of identities (descendants or trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityList {
    pub items: Vec<Identity>,
}

/// Query string of `GET /entities/{id}/descendants`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescendantsQuery {
    pub depth: Option<usize>,
}

// =============================================================================
// MUTATION REQUESTS
// =============================================================================

/// A single request or a batch of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Body of every `POST /entities/*` route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationBody<T> {
    pub items: OneOrMany<T>,
    #[serde(default)]
    pub options: CrudOptions,
}

impl<T> MutationBody<T> {
    pub fn one(item: T) -> Self {
        Self {
            items: OneOrMany::One(item),
            options: CrudOptions::default(),
        }
    }

    pub fn many(items: Vec<T>) -> Self {
        Self {
            items: OneOrMany::Many(items),
            options: CrudOptions::default(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every non-2xx response produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
