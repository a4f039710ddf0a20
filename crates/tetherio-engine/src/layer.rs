use tower::Layer;

use crate::config::EngineIoConfig;
use crate::handler::EngineIoHandler;
use crate::service::EngineIoService;

/// A [`tower::Layer`] plugging an engine.io server in an existing service
/// stack.
#[derive(Debug, Clone)]
pub struct EngineIoLayer<H: EngineIoHandler + Clone> {
    config: EngineIoConfig,
    handler: H,
}

impl<H: EngineIoHandler + Clone> EngineIoLayer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            config: EngineIoConfig::default(),
            handler,
        }
    }

    pub fn from_config(handler: H, config: EngineIoConfig) -> Self {
        Self { config, handler }
    }
}

impl<S, H: EngineIoHandler + Clone> Layer<S> for EngineIoLayer<H> {
    type Service = EngineIoService<H, S>;

    fn layer(&self, inner: S) -> Self::Service {
        EngineIoService::with_inner(inner, self.handler.clone(), self.config.clone())
    }
}
