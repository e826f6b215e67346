//! The minimal orchestration entry point: boot configuration, open the
//! configured backend, wire the document store through an async client, a
//! producer-side outbox queue, and an access checker, then resume draining
//! on startup and run until signaled to stop. Everything upstream of this
//! wiring (what to post, when to check access) is left to an embedding
//! application.

mod record;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, Level};

use record::Record;
use strata_acl::{AccessChecker, InMemoryAclCache, NoHierarchy};
use strata_client::AsyncClient;
use strata_db::Store;
use strata_kv::{SurrealConfig, SurrealKv};
use strata_queue::{NotificationSink, OutboxMessage, ProducerQueue, QueueEvent, TransportError, TransportSender};
use strata_task::{StrataConfig, ThreadPool, TopicRouter};
use strata_unit::TopicId;

/// Delivers queued messages by logging them. Stands in for whatever
/// transport (message broker, webhook, replication link) an embedding
/// application would plug in here.
struct LoggingTransport;

#[async_trait]
impl TransportSender for LoggingTransport {
    async fn send(&self, message: &OutboxMessage) -> std::result::Result<(), TransportError> {
        info!(
            producer_id = %message.producer_id,
            object_id = %message.object_id.to_hex(),
            object_type = %message.object_type,
            "delivering outbox message"
        );
        Ok(())
    }
}

struct TracingNotifications;

impl NotificationSink for TracingNotifications {
    fn notify(&self, event: QueueEvent) {
        match event {
            QueueEvent::Sent { object_id, .. } => info!(object_id = %object_id.to_hex(), "outbox message sent"),
            QueueEvent::Failed { object_id, reason, .. } => {
                tracing::warn!(object_id = %object_id.to_hex(), reason = %reason, "outbox message failed")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    strata_task::init_tracing(&strata_task::TelemetryOptions::new(false, Level::INFO));

    let config = StrataConfig::from_env().context("failed to load configuration")?;
    info!(endpoint = %config.db.endpoint, namespace = %config.db.namespace, "starting strata-daemon");

    let kv = SurrealKv::connect(SurrealConfig {
        endpoint: config.db.endpoint.clone(),
        namespace: config.db.namespace.clone(),
        database: config.db.database.clone(),
    })
    .await
    .context("failed to connect to the configured backend")?;

    let store = Arc::new(Store::new(Arc::new(kv)));
    let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let pool = Arc::new(if config.threads.is_empty() {
        ThreadPool::new(0, config.reserve_thread_count)
    } else {
        ThreadPool::from_groups(&config.threads, available)
    });
    let router = Arc::new(TopicRouter::default_worker(0));
    let client = Arc::new(AsyncClient::new(Arc::clone(&store), pool, router, tokio::runtime::Handle::current()));

    let queue: Arc<ProducerQueue<_, Record>> = Arc::new(ProducerQueue::new(
        Arc::clone(&store),
        Arc::new(LoggingTransport),
        Arc::new(TracingNotifications),
        Duration::from_secs(5),
        None,
    ));
    queue.start().await.context("failed to resume draining pending outbox messages")?;
    info!("producer queue drain resumed");

    let _checker = AccessChecker::new(
        Arc::clone(&client),
        TopicId("acl".to_string()),
        Arc::new(InMemoryAclCache::default()),
        None,
        Arc::new(NoHierarchy),
        Arc::new(NoHierarchy),
    );

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    queue.stop();
    Ok(())
}
