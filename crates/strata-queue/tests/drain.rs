//! Drain-loop behavior under transport failures: retryable errors leave the
//! message queued, fatal errors park it as failed, expiry short-circuits the
//! send, and dequeue order follows posting order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use strata_db::{Model, Store};
use strata_kv::InMemoryKv;
use strata_queue::{
    NotificationSink, NullNotificationSink, OutboxMessage, ProducerQueue, QueueEvent,
    TransportError, TransportSender,
};
use strata_unit::{
    Cardinality, FieldDescriptor, FieldValue, ObjectId, Result as UnitResult, Scalar, TopicId,
    Unit, UnitError, UnitSchema, ValueType,
};

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

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (1, FieldValue::Scalar(Scalar::I32(v))) => self.amount = Some(v),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
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

static INVOICE_FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
    tag: 1,
    name: "total",
    value_type: ValueType::I32,
    cardinality: Cardinality::Single,
    required: false,
    default: None,
}];
static INVOICE_SCHEMA: UnitSchema = UnitSchema::new("invoice", INVOICE_FIELDS);

#[derive(Debug, Default, Clone, PartialEq)]
struct Invoice {
    total: Option<i32>,
}

impl Unit for Invoice {
    fn schema(&self) -> &'static UnitSchema {
        &INVOICE_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            1 => self.total.map(Scalar::I32).map(FieldValue::Scalar),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (1, FieldValue::Scalar(Scalar::I32(v))) => self.total = Some(v),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for Invoice {
    fn model_id() -> &'static str {
        "invoice"
    }

    fn indexes() -> &'static [strata_db::IndexDef] {
        &[]
    }
}

/// Fails the first `failures` sends with the given error, then succeeds,
/// recording the object id of every successful delivery.
struct FlakyTransport {
    failures: AtomicUsize,
    error: TransportError,
    delivered: Arc<Mutex<Vec<ObjectId>>>,
}

#[async_trait]
impl TransportSender for FlakyTransport {
    async fn send(&self, message: &OutboxMessage) -> Result<(), TransportError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.delivered.lock().unwrap().push(message.object_id);
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

fn queue_with(
    transport: Arc<dyn TransportSender>,
    sink: Arc<dyn NotificationSink>,
    ttl_millis: Option<i64>,
) -> ProducerQueue<InMemoryKv, Order> {
    ProducerQueue::new(
        Arc::new(Store::new(Arc::new(InMemoryKv::new()))),
        transport,
        sink,
        Duration::from_millis(10),
        ttl_millis,
    )
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[tokio::test(flavor = "multi_thread")]
async fn retryable_error_keeps_the_message_queued_until_a_later_attempt_succeeds() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(FlakyTransport {
        failures: AtomicUsize::new(2),
        error: TransportError::Retryable("connection refused".to_string()),
        delivered: delivered.clone(),
    });
    let q = queue_with(transport, Arc::new(NullNotificationSink), None);

    let topic = TopicId::new("orders");
    let object_id = ObjectId::generate();
    q.post_create("w1", &topic, object_id, &Order { amount: Some(1) }, None, now_millis()).await.unwrap();

    // First attempt fails retryably; the message must still be local.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(q.read_local("orders", "order", None).await.unwrap().len(), 1);

    // Retries drain it once the transport recovers.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*delivered.lock().unwrap(), vec![object_id]);
    assert!(q.read_local("orders", "order", None).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_error_parks_the_message_as_failed() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(FlakyTransport {
        failures: AtomicUsize::new(usize::MAX),
        error: TransportError::Fatal("unknown object type".to_string()),
        delivered: Arc::new(Mutex::new(Vec::new())),
    });
    let q = queue_with(transport, Arc::new(RecordingSink { events: events.clone() }), None);

    let topic = TopicId::new("orders");
    let object_id = ObjectId::generate();
    q.post_create("w1", &topic, object_id, &Order { amount: Some(1) }, None, now_millis()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let local = q.read_local("orders", "order", None).await.unwrap();
    assert_eq!(local.len(), 1);
    assert!(local[0].failed);
    assert_eq!(local[0].error_message.as_deref(), Some("unknown object type"));
    assert!(matches!(events.lock().unwrap().as_slice(), [QueueEvent::Failed { .. }]));

    // Failed messages are reclaimed through the admin surface.
    assert_eq!(q.remove_local_failed("orders", "order").await.unwrap(), 1);
    assert!(q.read_local("orders", "order", None).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn a_message_that_expires_before_sending_fails_without_a_send_attempt() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(FlakyTransport {
        failures: AtomicUsize::new(0),
        error: TransportError::Retryable(String::new()),
        delivered: delivered.clone(),
    });
    let events = Arc::new(Mutex::new(Vec::new()));
    // TTL of 1ms relative to a posting time far in the past: already
    // expired by the time the drain job runs.
    let q = queue_with(transport, Arc::new(RecordingSink { events: events.clone() }), Some(1));

    let topic = TopicId::new("orders");
    let object_id = ObjectId::generate();
    q.post_create("w1", &topic, object_id, &Order { amount: Some(1) }, None, 1_000).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(delivered.lock().unwrap().is_empty());
    let local = q.read_local("orders", "order", None).await.unwrap();
    assert_eq!(local.len(), 1);
    assert!(local[0].failed);
    assert!(matches!(
        events.lock().unwrap().as_slice(),
        [QueueEvent::Failed { reason, .. }] if reason == "expired"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn queues_sharing_a_store_only_drain_their_own_model() {
    let order_deliveries = Arc::new(Mutex::new(Vec::new()));
    let invoice_deliveries = Arc::new(Mutex::new(Vec::new()));

    let orders: ProducerQueue<InMemoryKv, Order> = ProducerQueue::new(
        Arc::new(Store::new(Arc::new(InMemoryKv::new()))),
        Arc::new(FlakyTransport {
            failures: AtomicUsize::new(0),
            error: TransportError::Retryable(String::new()),
            delivered: order_deliveries.clone(),
        }),
        Arc::new(NullNotificationSink),
        Duration::from_millis(10),
        None,
    );
    let invoices: ProducerQueue<InMemoryKv, Invoice> = ProducerQueue::new(
        orders.store_handle(),
        Arc::new(FlakyTransport {
            failures: AtomicUsize::new(0),
            error: TransportError::Retryable(String::new()),
            delivered: invoice_deliveries.clone(),
        }),
        Arc::new(NullNotificationSink),
        Duration::from_millis(10),
        None,
    );

    let topic = TopicId::new("billing");
    let order_id = ObjectId::generate();
    let invoice_id = ObjectId::generate();
    orders.post_create("w1", &topic, order_id, &Order { amount: Some(1) }, None, now_millis()).await.unwrap();
    invoices.post_create("w1", &topic, invoice_id, &Invoice { total: Some(9) }, None, now_millis()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*order_deliveries.lock().unwrap(), vec![order_id]);
    assert_eq!(*invoice_deliveries.lock().unwrap(), vec![invoice_id]);
}

#[tokio::test(flavor = "multi_thread")]
async fn messages_drain_in_posting_order() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(FlakyTransport {
        failures: AtomicUsize::new(0),
        error: TransportError::Retryable(String::new()),
        delivered: delivered.clone(),
    });
    let q = queue_with(transport, Arc::new(NullNotificationSink), None);
    q.stop();

    let topic = TopicId::new("orders");
    let ids: Vec<ObjectId> = (0..5).map(|_| ObjectId::generate()).collect();
    for (i, id) in ids.iter().enumerate() {
        q.post_create("w1", &topic, *id, &Order { amount: Some(i as i32) }, None, now_millis()).await.unwrap();
    }

    // A fresh queue over the same store picks the backlog up on start, in
    // producer-position order.
    let store_view = q.read_local("orders", "order", None).await.unwrap();
    assert_eq!(store_view.len(), 5);
    drop(store_view);

    let q2 = ProducerQueue::<InMemoryKv, Order>::new(
        q_store(&q),
        Arc::new(FlakyTransport {
            failures: AtomicUsize::new(0),
            error: TransportError::Retryable(String::new()),
            delivered: delivered.clone(),
        }),
        Arc::new(NullNotificationSink),
        Duration::from_millis(10),
        None,
    );
    q2.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*delivered.lock().unwrap(), ids);
}

// Test-only accessor: clones the Arc<Store> out of a queue so a second
// queue instance can share its backlog.
fn q_store(q: &ProducerQueue<InMemoryKv, Order>) -> Arc<Store<InMemoryKv>> {
    q.store_handle()
}
