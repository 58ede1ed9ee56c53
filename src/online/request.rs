//! Client requests as seen by the dispatcher.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Request text exactly as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    text: String,
    received_at: DateTime<Utc>,
}

impl RawRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl From<&str> for RawRequest {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawRequest {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Which collaborator handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Image tile or preview extraction.
    TileExtraction,
    /// Conversion of an image volume into the raw format.
    RawConversion,
    /// Pre-computation of a full tile set.
    PreTiling,
    /// Any other named service (data set listing, admin, metadata).
    Service,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TileExtraction => "tile_extraction",
            Self::RawConversion => "raw_conversion",
            Self::PreTiling => "pre_tiling",
            Self::Service => "service",
        }
    }

    /// Map the value of a request's `service` parameter.
    pub fn from_service(service: &str) -> Self {
        match service.trim().to_ascii_lowercase().as_str() {
            "tiling" | "image" => Self::TileExtraction,
            "conversion" => Self::RawConversion,
            "pretiling" => Self::PreTiling,
            _ => Self::Service,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request travelling through the filter chain.
///
/// Filters may classify it (`kind`) and attach parsed parameters; the raw
/// text is kept for collaborators that parse it themselves.
#[derive(Debug, Clone)]
pub struct Request {
    id: Uuid,
    raw: RawRequest,
    kind: Option<RequestKind>,
    parameters: BTreeMap<String, String>,
}

impl Request {
    pub fn new(raw: impl Into<RawRequest>) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw: raw.into(),
            kind: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn raw(&self) -> &RawRequest {
        &self.raw
    }

    pub fn kind(&self) -> Option<RequestKind> {
        self.kind
    }

    pub fn set_kind(&mut self, kind: RequestKind) {
        self.kind = Some(kind);
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn insert_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }
}
