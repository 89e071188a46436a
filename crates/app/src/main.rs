use anyhow::Context as _;
use tracing::{error, info, warn};

use shopkit_app::handlers::ShopNotice;
use shopkit_app::{App, AppConfig, wait_for_shutdown};
use shopkit_events::{Message, PubSub};
use shopkit_infra::SubscriberWorker;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    shopkit_observability::init_with(&config.observability);

    let app = App::build(config)?;
    let health = app.pubsub.health_check();
    info!(status = health.status.as_str(), "pubsub health");

    if !app.pubsub.is_set() {
        warn!("no pubsub backend configured; nothing to consume");
        return Ok(());
    }

    let worker = SubscriberWorker::spawn("shop-notices", app.pubsub.clone(), |msg: &Message| {
        let notice: ShopNotice = msg.bind()?;
        info!(shop_id = %notice.id, offset = %msg.offset, "shop notice");
        Ok::<_, shopkit_core::DataError>(())
    })
    .context("spawning subscriber worker")?;

    let waited = wait_for_shutdown();
    if let Err(e) = &waited {
        error!(error = %e, "signal handling failed");
    }

    info!("shutting down");
    worker.shutdown();
    waited
}
