use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use shopkit_events::PubSub;
use shopkit_infra::Session;

use crate::errors::HandlerError;

/// Per-request execution context.
///
/// Created once per inbound unit of work. It carries the shared database
/// session and pub/sub transport (explicitly injected, never ambient) plus
/// request-scoped path parameters. Cloning is cheap: handles are `Arc`s.
pub struct Context<S: ?Sized, P> {
    session: Arc<S>,
    pubsub: Arc<P>,
    path_params: HashMap<String, String>,
    request_id: Uuid,
}

impl<S: ?Sized, P> Clone for Context<S, P> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            pubsub: self.pubsub.clone(),
            path_params: self.path_params.clone(),
            request_id: self.request_id,
        }
    }
}

impl<S: ?Sized, P> core::fmt::Debug for Context<S, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

impl<S, P> Context<S, P>
where
    S: Session + ?Sized,
    P: PubSub,
{
    pub fn new(session: Arc<S>, pubsub: Arc<P>) -> Self {
        Self {
            session,
            pubsub,
            path_params: HashMap::new(),
            request_id: Uuid::now_v7(),
        }
    }

    pub fn with_path_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.path_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Replace all path parameters.
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Path parameter that must be present and non-blank.
    pub fn require_param(&self, name: &str) -> Result<&str, HandlerError> {
        self.path_param(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HandlerError::MissingParam(name.to_string()))
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn pubsub(&self) -> &P {
        &self.pubsub
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}
