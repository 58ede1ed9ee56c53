//! Request filter chain.
//!
//! Filters run in order; each either passes the (possibly transformed) request
//! on or rejects it with a reason. The first rejection ends the chain.
//! Filters are shared by every dispatching thread and must be stateless or
//! internally synchronized.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::request::{Request, RequestKind};

/// Result of one filter.
#[derive(Debug)]
pub enum FilterOutcome {
    Pass(Request),
    Reject { reason: String },
}

impl FilterOutcome {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }
}

/// A pass/transform/reject stage of the chain.
pub trait RequestFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: Request) -> FilterOutcome;
}

/// Why the chain stopped a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request rejected by {filter}: {reason}")]
pub struct Rejection {
    pub filter: &'static str,
    pub reason: String,
}

/// Ordered list of filters.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn RequestFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanity checks followed by service parameter parsing.
    pub fn standard(max_request_length: usize) -> Self {
        Self::new()
            .with(SanityFilter::with_max_length(max_request_length))
            .with(ServiceParamFilter)
    }

    pub fn with(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn RequestFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run the request through every filter in order.
    pub fn apply(&self, mut request: Request) -> Result<Request, Rejection> {
        for filter in &self.filters {
            match filter.apply(request) {
                FilterOutcome::Pass(next) => request = next,
                FilterOutcome::Reject { reason } => {
                    return Err(Rejection {
                        filter: filter.name(),
                        reason,
                    })
                }
            }
        }
        Ok(request)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

/// Configuration for [`SanityFilter`].
#[derive(Debug, Clone, Deserialize)]
pub struct SanityConfig {
    /// Maximum raw request length in bytes.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Regex patterns that reject a request when they match.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

fn default_max_length() -> usize {
    crate::config::DEFAULT_MAX_REQUEST_LENGTH
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            blocked_patterns: Vec::new(),
        }
    }
}

/// Rejects empty, oversized, control-character and path-traversal requests,
/// plus anything matching a configured pattern.
pub struct SanityFilter {
    max_length: usize,
    compiled_patterns: Vec<Regex>,
}

impl SanityFilter {
    pub fn new(config: SanityConfig) -> Result<Self, regex::Error> {
        let compiled_patterns = config
            .blocked_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            max_length: config.max_length,
            compiled_patterns,
        })
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            compiled_patterns: Vec::new(),
        }
    }

    fn check(&self, text: &str) -> Result<(), String> {
        if text.trim().is_empty() {
            return Err("empty request".to_string());
        }
        if text.len() > self.max_length {
            return Err(format!(
                "request length {} exceeds limit of {}",
                text.len(),
                self.max_length
            ));
        }
        if text.chars().any(|c| c.is_control()) {
            return Err("request contains control characters".to_string());
        }
        if text.contains("../") || text.contains("..\\") {
            return Err("request contains a path traversal sequence".to_string());
        }
        if let Some(pattern) = self.compiled_patterns.iter().find(|p| p.is_match(text)) {
            return Err(format!("request matches blocked pattern '{}'", pattern.as_str()));
        }
        Ok(())
    }
}

impl RequestFilter for SanityFilter {
    fn name(&self) -> &'static str {
        "sanity"
    }

    fn apply(&self, request: Request) -> FilterOutcome {
        match self.check(request.raw().as_str()) {
            Ok(()) => FilterOutcome::Pass(request),
            Err(reason) => FilterOutcome::reject(reason),
        }
    }
}

/// Parses `key=value&...` parameters and classifies the request by its
/// `service` parameter. A query prefix up to `?` is skipped. A request that
/// was already classified keeps its kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceParamFilter;

impl ServiceParamFilter {
    fn query(text: &str) -> &str {
        match text.split_once('?') {
            Some((_, query)) => query,
            None => text,
        }
    }
}

impl RequestFilter for ServiceParamFilter {
    fn name(&self) -> &'static str {
        "service-params"
    }

    fn apply(&self, mut request: Request) -> FilterOutcome {
        let query = Self::query(request.raw().as_str().trim()).to_string();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return FilterOutcome::reject(format!("malformed parameter '{}'", pair));
            }
            request.insert_parameter(key, value.trim().replace('+', " "));
        }

        if request.kind().is_none() {
            if let Some(service) = request.parameter("service").map(RequestKind::from_service) {
                request.set_kind(service);
            }
        }
        FilterOutcome::Pass(request)
    }
}
