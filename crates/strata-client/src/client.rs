//! The async client facade: every store operation is posted to
//! the worker thread its topic is routed to and resolved through a oneshot
//! channel, so the caller's `.await` observes the same ordering guarantees
//! the underlying [`TaskQueue`] gives that thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use strata_db::{Model, ReturnMode, Store};
use strata_index::Query;
use strata_kv::OrderedKv;
use strata_task::{ThreadPool, TopicRouter};
use strata_unit::{ObjectId, StoredObject, TopicId, UpdateRequest};

use crate::error::{ClientError, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Maps store operations onto topic-routed worker threads. Construct one
/// per `(pool, router, runtime)` triple; cheap to clone (everything it
/// holds is reference-counted).
pub struct AsyncClient<K: OrderedKv + 'static> {
    store: Arc<Store<K>>,
    pool: Arc<ThreadPool>,
    router: Arc<TopicRouter>,
    runtime: tokio::runtime::Handle,
}

impl<K: OrderedKv + 'static> Clone for AsyncClient<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            pool: self.pool.clone(),
            router: self.router.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<K: OrderedKv + 'static> AsyncClient<K> {
    pub fn new(store: Arc<Store<K>>, pool: Arc<ThreadPool>, router: Arc<TopicRouter>, runtime: tokio::runtime::Handle) -> Self {
        Self { store, pool, router, runtime }
    }

    /// Post `work` to `topic`'s worker and await its result. `work` runs
    /// inside that worker thread via a blocked-on future, never inline on
    /// the caller's task.
    async fn dispatch<T, F>(&self, topic: &str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Store<K>) -> BoxFuture<'a, strata_db::Result<T>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let queue = self.router.route(&self.pool, topic);
        let store = self.store.clone();
        let runtime = self.runtime.clone();
        queue
            .post(move || {
                let result = runtime.block_on(work(&store));
                let _ = tx.send(result);
            })
            .map_err(ClientError::from)?;
        rx.await.map_err(|_| ClientError::Cancelled)?.map_err(ClientError::from)
    }

    /// Post topic-less work to a round-robin worker.
    async fn dispatch_round_robin<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a Store<K>) -> BoxFuture<'a, strata_db::Result<T>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let queue = self.router.round_robin(&self.pool);
        let store = self.store.clone();
        let runtime = self.runtime.clone();
        queue
            .post(move || {
                let result = runtime.block_on(work(&store));
                let _ = tx.send(result);
            })
            .map_err(ClientError::from)?;
        rx.await.map_err(|_| ClientError::Cancelled)?.map_err(ClientError::from)
    }

    pub async fn create<U: Model + Send + 'static>(&self, topic: TopicId, object: U, now: i64) -> Result<StoredObject<U>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| Box::pin(async move { store.create::<U>(&topic, object, now).await }))
            .await
    }

    pub async fn create_with_ttl<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        object: U,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move { store.create_with_ttl::<U>(&topic, object, ttl_seconds, now).await })
        })
        .await
    }

    pub async fn read<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        id: ObjectId,
        date: Option<i64>,
        tp_filter: Option<i64>,
    ) -> Result<StoredObject<U>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move { store.read::<U>(&topic.0, &id, date, tp_filter).await })
        })
        .await
    }

    pub async fn update<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        id: ObjectId,
        request: UpdateRequest,
        date: Option<i64>,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move { store.update::<U>(&topic.0, &id, &request, date, now).await })
        })
        .await
    }

    pub async fn read_update<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        id: ObjectId,
        request: UpdateRequest,
        date: Option<i64>,
        now: i64,
        mode: ReturnMode,
    ) -> Result<StoredObject<U>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move { store.read_update::<U>(&topic.0, &id, &request, date, now, mode).await })
        })
        .await
    }

    pub async fn delete_object<U: Model + Send + 'static>(&self, topic: TopicId, id: ObjectId, date: Option<i64>) -> Result<()> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| Box::pin(async move { store.delete_object::<U>(&topic.0, &id, date).await }))
            .await
    }

    /// Runs on the topic's worker when `query` names exactly one topic;
    /// otherwise it has no single destined thread, so it runs round-robin.
    pub async fn find<U: Model + Send + 'static>(&self, query: Query) -> Result<Vec<StoredObject<U>>> {
        match query.topics.as_deref() {
            Some([single]) => {
                let topic = single.clone();
                self.dispatch(&topic, move |store| Box::pin(async move { store.find::<U>(&query).await })).await
            }
            _ => self.dispatch_round_robin(move |store| Box::pin(async move { store.find::<U>(&query).await })).await,
        }
    }

    pub async fn find_one<U: Model + Send + 'static>(&self, query: Query) -> Result<Option<StoredObject<U>>> {
        match query.topics.as_deref() {
            Some([single]) => {
                let topic = single.clone();
                self.dispatch(&topic, move |store| Box::pin(async move { store.find_one::<U>(&query).await })).await
            }
            _ => self.dispatch_round_robin(move |store| Box::pin(async move { store.find_one::<U>(&query).await })).await,
        }
    }

    pub async fn count<U: Model + Send + 'static>(&self, query: Query) -> Result<usize> {
        self.dispatch_round_robin(move |store| Box::pin(async move { store.count::<U>(&query).await })).await
    }

    pub async fn find_all<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        date: Option<i64>,
        descending: bool,
    ) -> Result<Vec<StoredObject<U>>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| Box::pin(async move { store.find_all::<U>(&topic.0, date, descending).await }))
            .await
    }

    pub async fn find_all_partitioned<U: Model + Send + 'static>(
        &self,
        topic: TopicId,
        descending: bool,
    ) -> Result<Vec<StoredObject<U>>> {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move { store.find_all_partitioned::<U>(&topic.0, descending).await })
        })
        .await
    }

    pub async fn delete_many<U: Model + Send + 'static>(&self, query: Query) -> Result<usize> {
        match query.topics.as_deref() {
            Some([single]) => {
                let topic = single.clone();
                self.dispatch(&topic, move |store| Box::pin(async move { store.delete_many::<U>(&query).await })).await
            }
            _ => self.dispatch_round_robin(move |store| Box::pin(async move { store.delete_many::<U>(&query).await })).await,
        }
    }

    pub async fn update_many<U: Model + Send + 'static>(
        &self,
        query: Query,
        request: UpdateRequest,
        now: i64,
    ) -> Result<usize> {
        match query.topics.as_deref() {
            Some([single]) => {
                let topic = single.clone();
                self.dispatch(&topic, move |store| {
                    Box::pin(async move { store.update_many::<U>(&query, &request, now).await })
                })
                .await
            }
            _ => {
                self.dispatch_round_robin(move |store| {
                    Box::pin(async move { store.update_many::<U>(&query, &request, now).await })
                })
                .await
            }
        }
    }

    pub async fn find_update_create<U: Model + Send + 'static>(
        &self,
        query: Query,
        request: UpdateRequest,
        fallback_object: U,
        fallback_topic: TopicId,
        return_mode: ReturnMode,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let t = fallback_topic.0.clone();
        self.dispatch(&t, move |store| {
            Box::pin(async move {
                store
                    .find_update_create::<U>(&query, &request, fallback_object, &fallback_topic, return_mode, now)
                    .await
            })
        })
        .await
    }

    pub async fn list_model_topics<U: Model + Send + 'static>(
        &self,
        date_range: Option<(i64, i64)>,
        only_default_partition: bool,
    ) -> Result<std::collections::BTreeSet<TopicId>> {
        self.dispatch_round_robin(move |store| {
            Box::pin(async move { store.list_model_topics::<U>(date_range, only_default_partition).await })
        })
        .await
    }

    // Partition administration is model-scoped rather than topic-scoped, so
    // it has no destined worker and runs round-robin like the other
    // topic-less operations.

    pub async fn add_date_partitions<U: Model + Send + 'static>(
        &self,
        from_millis: i64,
        to_millis: i64,
    ) -> Result<Vec<strata_db::PartitionKey>> {
        self.dispatch_round_robin(move |store| {
            Box::pin(async move { store.add_date_partitions::<U>(from_millis, to_millis).await })
        })
        .await
    }

    pub async fn list_date_partitions<U: Model + Send + 'static>(&self) -> Result<Vec<strata_db::PartitionKey>> {
        self.dispatch_round_robin(move |store| Box::pin(async move { store.list_date_partitions::<U>().await }))
            .await
    }

    pub async fn delete_date_partitions<U: Model + Send + 'static>(
        &self,
        partitions: Vec<strata_db::PartitionKey>,
    ) -> Result<()> {
        self.dispatch_round_robin(move |store| {
            Box::pin(async move { store.delete_date_partitions::<U>(&partitions).await })
        })
        .await
    }

    /// Always runs on the topic's worker to preserve its serialization,
    /// even though the closure itself may touch multiple objects.
    pub async fn transaction<T, F>(&self, topic: TopicId, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> Fn(&'a mut dyn strata_kv::KvTransaction) -> BoxFuture<'a, strata_db::Result<T>> + Send + Sync + 'static,
    {
        let t = topic.0.clone();
        self.dispatch(&t, move |store| Box::pin(async move { store.transaction(f).await })).await
    }
}
