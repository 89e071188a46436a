use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use shopkit_events::{Headers, PubSub, PublishOptions};
use shopkit_infra::Session;

use crate::context::Context;
use crate::errors::HandlerResult;

/// Payload announcing that something happened to a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopNotice {
    pub id: String,
}

/// Producer/consumer pair on a single topic.
#[derive(Debug, Clone)]
pub struct MessagingHandler {
    topic: String,
}

impl MessagingHandler {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a [`ShopNotice`] for the `id` path parameter, routed by that id.
    ///
    /// Returns no body on success; transport errors pass through unchanged.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id(), topic = %self.topic), err)]
    pub fn producer<S, P>(&self, ctx: &Context<S, P>) -> HandlerResult<Option<JsonValue>>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        let id = ctx.require_param("id")?;
        let notice = ShopNotice { id: id.to_string() };

        let mut headers = Headers::new();
        headers.insert("request_id".to_string(), ctx.request_id().to_string());

        ctx.pubsub()
            .publish_event_with_options(&self.topic, &notice, &headers, &PublishOptions::with_key(id))?;
        Ok(None)
    }

    /// Receive one message and decode it as a [`ShopNotice`].
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()), err)]
    pub fn consumer<S, P>(&self, ctx: &Context<S, P>) -> HandlerResult<ShopNotice>
    where
        S: Session + ?Sized,
        P: PubSub,
    {
        let msg = ctx.pubsub().subscribe()?;
        let notice: ShopNotice = ctx.pubsub().bind(&msg.value)?;
        info!(topic = %msg.topic, offset = %msg.offset, shop_id = %notice.id, "notice received");
        Ok(notice)
    }
}
