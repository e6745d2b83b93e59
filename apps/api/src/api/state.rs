use std::sync::Arc;

use crate::orchestration::OrchestrationServices;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub services: OrchestrationServices,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(services: OrchestrationServices, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            services,
            jwt_secret: jwt_secret.into(),
        }
    }
}
