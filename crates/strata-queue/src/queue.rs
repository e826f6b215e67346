//! The producer-side outbox: posting rules and the per-topic drain loop.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strata_buf::ByteBuffer;
use strata_db::{Model, PartitionKey, Store};
use strata_index::{FieldClause, Operand as IndexOperand, Predicate, Query};
use strata_kv::OrderedKv;
use strata_task::Scheduler;
use strata_unit::{apply_update, FieldOp, ObjectId, Operand as UnitOperand, Scalar, StoredObject, TopicId, UpdateOp, UpdateRequest};

use crate::error::{QueueError, Result};
use crate::message::{OutboxMessage, OutboxOp, ERROR_MESSAGE_TAG, FAILED_TAG, PAYLOAD_TAG};
use crate::transport::{NotificationSink, QueueEvent, TransportError, TransportSender};

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn lookup_query(topic: &str, producer_id: &str, object_type: &str, object_id: Option<ObjectId>, limit: usize) -> Query {
    let mut clauses = vec![
        FieldClause {
            field_position: 0,
            predicate: Predicate::Eq,
            operand: IndexOperand::Scalar(Scalar::String(producer_id.to_string())),
            descending: false,
        },
        FieldClause {
            field_position: 1,
            predicate: Predicate::Eq,
            operand: IndexOperand::Scalar(Scalar::String(object_type.to_string())),
            descending: false,
        },
    ];
    if let Some(id) = object_id {
        clauses.push(FieldClause {
            field_position: 2,
            predicate: Predicate::Eq,
            operand: IndexOperand::Scalar(Scalar::ObjectId(id)),
            descending: false,
        });
    }
    Query {
        index_id: OutboxMessage::indexes()[0].index_id(),
        clauses,
        topics: Some(vec![topic.to_string()]),
        limit,
        ..Default::default()
    }
}

/// A producer-side outbox for one object model `U`, persisted through a
/// [`Store`] and drained topic-by-topic onto a [`TransportSender`].
pub struct ProducerQueue<K: OrderedKv + 'static, U: Model + Send + 'static> {
    store: Arc<Store<K>>,
    scheduler: Arc<Scheduler>,
    transport: Arc<dyn TransportSender>,
    notifications: Arc<dyn NotificationSink>,
    retry_interval: Duration,
    default_ttl_millis: Option<i64>,
    topic_jobs: Arc<Mutex<HashSet<String>>>,
    stopped: Arc<AtomicBool>,
    _marker: PhantomData<fn() -> U>,
}

impl<K: OrderedKv + 'static, U: Model + Send + 'static> ProducerQueue<K, U> {
    pub fn new(
        store: Arc<Store<K>>,
        transport: Arc<dyn TransportSender>,
        notifications: Arc<dyn NotificationSink>,
        retry_interval: Duration,
        default_ttl_millis: Option<i64>,
    ) -> Self {
        Self {
            store,
            scheduler: Arc::new(Scheduler::new()),
            transport,
            notifications,
            retry_interval,
            default_ttl_millis,
            topic_jobs: Arc::new(Mutex::new(HashSet::new())),
            stopped: Arc::new(AtomicBool::new(false)),
            _marker: PhantomData,
        }
    }

    /// The store this queue persists through, for callers that share one
    /// backend between the queue and their own collections.
    pub fn store_handle(&self) -> Arc<Store<K>> {
        self.store.clone()
    }

    /// A zero configured TTL disables expiry.
    fn expire_at(&self, now: i64) -> Option<i64> {
        self.default_ttl_millis.filter(|ttl| *ttl > 0).map(|ttl| now + ttl)
    }

    /// Enqueue a creation. Rejected if any message for `object_id` is
    /// already in flight for this producer.
    pub async fn post_create(
        &self,
        producer_id: &str,
        topic: &TopicId,
        object_id: ObjectId,
        object: &U,
        notification: Option<Vec<u8>>,
        now: i64,
    ) -> Result<()> {
        let probe = lookup_query(&topic.0, producer_id, U::model_id(), Some(object_id), 1);
        if self.store.find_one::<OutboxMessage>(&probe).await?.is_some() {
            return Err(QueueError::DuplicateObjectId(object_id.to_hex()));
        }
        let mut buf = ByteBuffer::new();
        object.encode(&mut buf);
        let message = OutboxMessage {
            producer_id: producer_id.to_string(),
            object_id,
            object_type: U::model_id().to_string(),
            op: Some(OutboxOp::Create),
            payload: buf.as_slice().to_vec(),
            notification_payload: notification,
            failed: false,
            error_message: None,
            expire_at: self.expire_at(now),
        };
        self.store.create::<OutboxMessage>(topic, message, now).await?;
        self.wake_topic(&topic.0);
        Ok(())
    }

    /// Enqueue an update. If an in-queue `Create` for the same object is
    /// still pending, the update is folded straight into its payload rather
    /// than appended as its own message.
    pub async fn post_update(
        &self,
        producer_id: &str,
        topic: &TopicId,
        object_id: ObjectId,
        request: &UpdateRequest,
        notification: Option<Vec<u8>>,
        now: i64,
    ) -> Result<()> {
        let probe = lookup_query(&topic.0, producer_id, U::model_id(), Some(object_id), 1);
        if let Some(existing) = self.store.find_one::<OutboxMessage>(&probe).await? {
            if existing.object.op == Some(OutboxOp::Create) {
                let mut staged = U::decode(&existing.object.payload)?;
                apply_update(&mut staged, request)?;
                let mut buf = ByteBuffer::new();
                staged.encode(&mut buf);
                let patch = UpdateRequest(vec![FieldOp {
                    path: strata_unit::Path::field(PAYLOAD_TAG),
                    op: UpdateOp::Set,
                    value: UnitOperand::Scalar(Scalar::Bytes(buf.as_slice().to_vec())),
                }]);
                self.store.update::<OutboxMessage>(&topic.0, &existing.id, &patch, None, now).await?;
                self.wake_topic(&topic.0);
                return Ok(());
            }
        }
        let message = OutboxMessage {
            producer_id: producer_id.to_string(),
            object_id,
            object_type: U::model_id().to_string(),
            op: Some(OutboxOp::Update),
            payload: request.encode(),
            notification_payload: notification,
            failed: false,
            error_message: None,
            expire_at: self.expire_at(now),
        };
        self.store.create::<OutboxMessage>(topic, message, now).await?;
        self.wake_topic(&topic.0);
        Ok(())
    }

    /// Enqueue a deletion. Any messages already queued for this object are
    /// superseded: they're removed and replaced by the delete in one
    /// transaction, so consumers only ever observe the delete.
    pub async fn post_delete(
        &self,
        producer_id: &str,
        topic: &TopicId,
        object_id: ObjectId,
        notification: Option<Vec<u8>>,
        now: i64,
    ) -> Result<()> {
        let scope = lookup_query(&topic.0, producer_id, U::model_id(), Some(object_id), 0);
        let stale_ids: Vec<ObjectId> = self.store.find::<OutboxMessage>(&scope).await?.into_iter().map(|m| m.id).collect();

        let message = OutboxMessage {
            producer_id: producer_id.to_string(),
            object_id,
            object_type: U::model_id().to_string(),
            op: Some(OutboxOp::Delete),
            payload: Vec::new(),
            notification_payload: notification,
            failed: false,
            error_message: None,
            expire_at: self.expire_at(now),
        };

        let store = self.store.clone();
        let topic_owned = topic.clone();
        let partition = PartitionKey::default_partition();
        self.store
            .transaction(move |tx| {
                let store = store.clone();
                let topic = topic_owned.clone();
                let partition = partition.clone();
                let stale_ids = stale_ids.clone();
                let message = message.clone();
                Box::pin(async move {
                    for id in &stale_ids {
                        store.delete_object_tx::<OutboxMessage>(tx, &topic.0, &partition, id).await?;
                    }
                    store.create_tx::<OutboxMessage>(tx, &topic, message, now).await?;
                    Ok(())
                })
            })
            .await?;
        self.wake_topic(&topic.0);
        Ok(())
    }

    /// Resume draining every topic with a pending, non-failed message —
    /// called once on startup.
    pub async fn start(&self) -> Result<()> {
        let topics = self.store.list_model_topics::<OutboxMessage>(None, true).await?;
        for topic in topics {
            let pending = self.store.find_all::<OutboxMessage>(&topic.0, None, false).await?;
            if pending.iter().any(|m| !m.object.failed && m.object.object_type == U::model_id()) {
                self.wake_topic(&topic.0);
            }
        }
        Ok(())
    }

    /// Stop draining. Jobs already running are allowed to finish their
    /// current send; nothing new is scheduled afterward.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.scheduler.stop();
        self.topic_jobs.lock().unwrap().clear();
    }

    fn wake_topic(&self, topic: &str) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.schedule_drain(topic.to_string(), Duration::ZERO);
    }

    fn schedule_drain(&self, topic: String, delay: Duration) {
        let store = self.store.clone();
        let transport = self.transport.clone();
        let notifications = self.notifications.clone();
        let topic_jobs = self.topic_jobs.clone();
        let scheduler = self.scheduler.clone();
        let retry_interval = self.retry_interval;
        let stopped = self.stopped.clone();
        self.scheduler.schedule_after(format!("drain::{topic}"), delay, move || {
            tokio::spawn(Self::drain_topic(store, transport, notifications, topic_jobs, scheduler, retry_interval, stopped, topic));
        });
    }

    /// Drains every pending, non-expired message for `topic` in creation
    /// order, one at a time, until the backlog is empty, the queue is
    /// stopped, or a retryable transport error asks for a later attempt.
    /// The `topic_jobs` set keeps at most one drain in flight per topic; a
    /// second entry here while one is running returns without touching
    /// storage.
    #[allow(clippy::too_many_arguments)]
    fn drain_topic(
        store: Arc<Store<K>>,
        transport: Arc<dyn TransportSender>,
        notifications: Arc<dyn NotificationSink>,
        topic_jobs: Arc<Mutex<HashSet<String>>>,
        scheduler: Arc<Scheduler>,
        retry_interval: Duration,
        stopped: Arc<AtomicBool>,
        topic: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        {
            let mut jobs = topic_jobs.lock().unwrap();
            if jobs.contains(&topic) {
                return;
            }
            jobs.insert(topic.clone());
        }

        loop {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            let oldest = match Self::fetch_oldest(&store, &topic).await {
                Ok(Some(message)) => message,
                _ => break,
            };

            let now = now_millis();
            if oldest.object.expire_at.is_some_and(|deadline| now >= deadline) {
                let _ = Self::mark_failed(&store, &topic, &oldest.id, "message expired before it was sent").await;
                notifications.notify(QueueEvent::Failed {
                    object_id: oldest.object.object_id,
                    reason: "expired".to_string(),
                    notification: oldest.object.notification_payload.clone(),
                });
                continue;
            }

            match transport.send(&oldest.object).await {
                Ok(()) => {
                    let _ = store.delete_object::<OutboxMessage>(&topic, &oldest.id, None).await;
                    notifications.notify(QueueEvent::Sent {
                        object_id: oldest.object.object_id,
                        notification: oldest.object.notification_payload.clone(),
                    });
                }
                Err(TransportError::Retryable(reason)) => {
                    tracing::debug!(topic = %topic, reason = %reason, "retrying outbox drain after a transport error");
                    topic_jobs.lock().unwrap().remove(&topic);
                    let store = store.clone();
                    let transport = transport.clone();
                    let notifications = notifications.clone();
                    let topic_jobs2 = topic_jobs.clone();
                    let scheduler2 = scheduler.clone();
                    let stopped = stopped.clone();
                    let topic2 = topic.clone();
                    scheduler.schedule_after(format!("drain::{topic}"), retry_interval, move || {
                        tokio::spawn(Self::drain_topic(store, transport, notifications, topic_jobs2, scheduler2, retry_interval, stopped, topic2));
                    });
                    return;
                }
                Err(TransportError::Fatal(reason)) => {
                    let _ = Self::mark_failed(&store, &topic, &oldest.id, &reason).await;
                    notifications.notify(QueueEvent::Failed {
                        object_id: oldest.object.object_id,
                        reason,
                        notification: oldest.object.notification_payload.clone(),
                    });
                }
            }
        }
        topic_jobs.lock().unwrap().remove(&topic);
        })
    }

    /// The oldest pending message for this queue's own model. The outbox
    /// table is shared by every producer model writing through the same
    /// store, so the type filter keeps one queue's drain from dequeuing a
    /// sibling model's messages into the wrong transport.
    async fn fetch_oldest(store: &Store<K>, topic: &str) -> Result<Option<StoredObject<OutboxMessage>>> {
        let all = store.find_all::<OutboxMessage>(topic, None, false).await?;
        Ok(all
            .into_iter()
            .find(|m| !m.object.failed && m.object.object_type == U::model_id()))
    }

    async fn mark_failed(store: &Store<K>, topic: &str, id: &ObjectId, reason: &str) -> Result<()> {
        let patch = UpdateRequest(vec![
            FieldOp { path: strata_unit::Path::field(FAILED_TAG), op: UpdateOp::Set, value: UnitOperand::Scalar(Scalar::Bool(true)) },
            FieldOp {
                path: strata_unit::Path::field(ERROR_MESSAGE_TAG),
                op: UpdateOp::Set,
                value: UnitOperand::Scalar(Scalar::String(reason.to_string())),
            },
        ]);
        store.update::<OutboxMessage>(topic, id, &patch, None, now_millis()).await?;
        Ok(())
    }

    /// Drop every failed message for `object_type` in `topic`.
    pub async fn remove_local_failed(&self, topic: &str, object_type: &str) -> Result<usize> {
        let all = self.store.find_all::<OutboxMessage>(topic, None, false).await?;
        let mut removed = 0;
        for message in all {
            if message.object.object_type == object_type && message.object.failed {
                self.store.delete_object::<OutboxMessage>(topic, &message.id, None).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drop the message at producer position `pos` (its own store-assigned
    /// id) if it belongs to `object_type`.
    pub async fn remove_local_pos(&self, topic: &str, object_type: &str, pos: ObjectId) -> Result<bool> {
        let all = self.store.find_all::<OutboxMessage>(topic, None, false).await?;
        match all.into_iter().find(|m| m.id == pos && m.object.object_type == object_type) {
            Some(message) => {
                self.store.delete_object::<OutboxMessage>(topic, &message.id, None).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop messages for `object_type`, optionally restricted to specific
    /// target object ids; with no ids, drops every message for that type.
    pub async fn remove_local(&self, topic: &str, object_type: &str, object_ids: Option<&[ObjectId]>) -> Result<usize> {
        let all = self.store.find_all::<OutboxMessage>(topic, None, false).await?;
        let mut removed = 0;
        for message in all {
            if message.object.object_type != object_type {
                continue;
            }
            if let Some(ids) = object_ids {
                if !ids.contains(&message.object.object_id) {
                    continue;
                }
            }
            self.store.delete_object::<OutboxMessage>(topic, &message.id, None).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Read back queued messages for `object_type`, optionally restricted
    /// to specific target object ids.
    pub async fn read_local(&self, topic: &str, object_type: &str, object_ids: Option<&[ObjectId]>) -> Result<Vec<OutboxMessage>> {
        let all = self.store.find_all::<OutboxMessage>(topic, None, false).await?;
        Ok(all
            .into_iter()
            .filter(|m| m.object.object_type == object_type)
            .filter(|m| match object_ids {
                Some(ids) => ids.contains(&m.object.object_id),
                None => true,
            })
            .map(|m| m.object)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strata_kv::InMemoryKv;
    use strata_unit::{Cardinality, FieldDescriptor, FieldValue, UnitSchema, ValueType};

    static FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
        tag: 1,
        name: "amount",
        value_type: ValueType::I32,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    }];
    static SCHEMA: UnitSchema = UnitSchema::new("order", FIELDS);

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Order {
        amount: Option<i32>,
    }

    impl Unit for Order {
        fn schema(&self) -> &'static UnitSchema {
            &SCHEMA
        }

        fn get(&self, tag: u32) -> Option<FieldValue> {
            match tag {
                1 => self.amount.map(Scalar::I32).map(FieldValue::Scalar),
                _ => None,
            }
        }

        fn set(&mut self, tag: u32, value: FieldValue) -> strata_unit::Result<()> {
            match (tag, value) {
                (1, FieldValue::Scalar(Scalar::I32(v))) => self.amount = Some(v),
                (t, _) => return Err(strata_unit::UnitError::InvalidType { tag: t }),
            }
            Ok(())
        }
    }

    impl Model for Order {
        fn model_id() -> &'static str {
            "order"
        }

        fn indexes() -> &'static [strata_db::IndexDef] {
            &[]
        }
    }

    struct RecordingTransport {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TransportSender for RecordingTransport {
        async fn send(&self, message: &OutboxMessage) -> std::result::Result<(), TransportError> {
            self.sent.lock().unwrap().push(message.producer_id.clone());
            Ok(())
        }
    }

    struct RecordingSink {
        events: Arc<Mutex<Vec<QueueEvent>>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, event: QueueEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn queue(transport: Arc<dyn TransportSender>, sink: Arc<dyn NotificationSink>) -> ProducerQueue<InMemoryKv, Order> {
        ProducerQueue::new(
            Arc::new(Store::new(Arc::new(InMemoryKv::new()))),
            transport,
            sink,
            Duration::from_millis(10),
            None,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_create_then_drain_sends_and_removes_the_message() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let q = queue(
            Arc::new(RecordingTransport { sent: sent.clone() }),
            Arc::new(RecordingSink { events: events.clone() }),
        );
        let topic = TopicId::new("orders");
        let object_id = ObjectId::generate();
        q.post_create("writer-1", &topic, object_id, &Order { amount: Some(5) }, Some(vec![7]), 1_000)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*sent.lock().unwrap(), vec!["writer-1".to_string()]);
        assert!(q.read_local("orders", "order", None).await.unwrap().is_empty());

        let events = events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [QueueEvent::Sent { notification: Some(n), .. }] if n == &vec![7]
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_create_twice_for_the_same_object_is_rejected() {
        let q = queue(
            Arc::new(RecordingTransport { sent: Arc::new(Mutex::new(Vec::new())) }),
            Arc::new(crate::transport::NullNotificationSink),
        );
        let topic = TopicId::new("orders");
        let object_id = ObjectId::generate();
        q.post_create("writer-1", &topic, object_id, &Order { amount: Some(5) }, None, 1_000).await.unwrap();
        let err = q
            .post_create("writer-1", &topic, object_id, &Order { amount: Some(7) }, None, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateObjectId(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_update_folds_into_a_pending_create() {
        let q = queue(
            Arc::new(RecordingTransport { sent: Arc::new(Mutex::new(Vec::new())) }),
            Arc::new(crate::transport::NullNotificationSink),
        );
        q.stop();
        let topic = TopicId::new("orders");
        let object_id = ObjectId::generate();
        q.post_create("writer-1", &topic, object_id, &Order { amount: Some(5) }, None, 1_000).await.unwrap();
        let request = UpdateRequest(vec![FieldOp {
            path: strata_unit::Path::field(1),
            op: UpdateOp::Set,
            value: UnitOperand::Scalar(Scalar::I32(9)),
        }]);
        q.post_update("writer-1", &topic, object_id, &request, None, 1_100).await.unwrap();

        let local = q.read_local("orders", "order", None).await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].op, Some(OutboxOp::Create));
        let staged = Order::decode(&local[0].payload).unwrap();
        assert_eq!(staged.amount, Some(9));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_delete_supersedes_every_queued_message_for_the_object() {
        let q = queue(
            Arc::new(RecordingTransport { sent: Arc::new(Mutex::new(Vec::new())) }),
            Arc::new(crate::transport::NullNotificationSink),
        );
        q.stop();
        let topic = TopicId::new("orders");
        let object_id = ObjectId::generate();
        q.post_create("writer-1", &topic, object_id, &Order { amount: Some(5) }, None, 1_000).await.unwrap();
        q.post_delete("writer-1", &topic, object_id, None, 1_200).await.unwrap();

        let local = q.read_local("orders", "order", None).await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].op, Some(OutboxOp::Delete));
    }
}
