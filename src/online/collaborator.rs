//! Collaborators that do the actual request work.
//!
//! The dispatcher only knows them through [`RequestHandler`]; tile
//! extraction, raw conversion, pre-tiling and the generic services live
//! outside this crate and are plugged in at install time.

use std::sync::Arc;

use crate::execution::{JobContext, JobError};

use super::request::{Request, RequestKind};

/// The client connection a request arrived on.
pub trait ClientConnection: Send + Sync {
    /// OS-level descriptor or connection id, for logging.
    fn descriptor(&self) -> i64;

    /// Tell the client its request was refused.
    fn reject(&self, reason: &str);
}

pub type ClientHandle = Arc<dyn ClientConnection>;

/// Handles one parsed request under whatever strategy runs the job.
pub trait RequestHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(
        &self,
        request: &Request,
        client: &dyn ClientConnection,
        ctx: &JobContext<'_>,
    ) -> Result<(), JobError>;

    /// Release resources when the dispatcher shuts down.
    fn shutdown(&self) {}
}

/// Placeholder for a collaborator that was not installed. Every request
/// routed to it fails.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableHandler {
    name: &'static str,
}

impl UnavailableHandler {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl RequestHandler for UnavailableHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(
        &self,
        _request: &Request,
        _client: &dyn ClientConnection,
        _ctx: &JobContext<'_>,
    ) -> Result<(), JobError> {
        Err(JobError::failed(format!("{} is not available", self.name)))
    }
}

/// One handler per request kind. Immutable once the dispatcher owns it.
#[derive(Clone)]
pub struct Collaborators {
    pub tile_extractor: Arc<dyn RequestHandler>,
    pub raw_converter: Arc<dyn RequestHandler>,
    pub pre_tiler: Arc<dyn RequestHandler>,
    pub services: Arc<dyn RequestHandler>,
}

impl Collaborators {
    pub fn for_kind(&self, kind: RequestKind) -> &Arc<dyn RequestHandler> {
        match kind {
            RequestKind::TileExtraction => &self.tile_extractor,
            RequestKind::RawConversion => &self.raw_converter,
            RequestKind::PreTiling => &self.pre_tiler,
            RequestKind::Service => &self.services,
        }
    }

    pub(crate) fn all(&self) -> [&Arc<dyn RequestHandler>; 4] {
        [
            &self.tile_extractor,
            &self.raw_converter,
            &self.pre_tiler,
            &self.services,
        ]
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            tile_extractor: Arc::new(UnavailableHandler::new("tile extraction")),
            raw_converter: Arc::new(UnavailableHandler::new("raw conversion")),
            pre_tiler: Arc::new(UnavailableHandler::new("pre-tiling")),
            services: Arc::new(UnavailableHandler::new("services")),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("tile_extractor", &self.tile_extractor.name())
            .field("raw_converter", &self.raw_converter.name())
            .field("pre_tiler", &self.pre_tiler.name())
            .field("services", &self.services.name())
            .finish()
    }
}
