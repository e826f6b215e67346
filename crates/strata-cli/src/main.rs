//! Command-line interface over the Strata document store, outbox queue,
//! and access checker.

mod document;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use document::Document;
use strata_acl::{AccessChecker, AclObject, InMemoryAclCache, NoHierarchy, Operation, Subject};
use strata_client::AsyncClient;
use strata_db::{Model, PartitionKey, Store};
use strata_index::{FieldClause, Operand, Predicate, Query};
use strata_kv::{SurrealConfig, SurrealKv};
use strata_queue::OutboxMessage;
use strata_task::{StrataConfig, ThreadPool, TopicRouter};
use strata_unit::{FieldOp, ObjectId, Operand as UnitOperand, Path, Scalar, TopicId, UpdateOp, UpdateRequest};

#[derive(Parser)]
#[command(name = "strata")]
#[command(author = "Strata")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Document store, outbox queue, and ACL CLI", long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured backend and confirm it's reachable
    Init,

    /// Create or overwrite a document identified by its key
    Put {
        topic: String,
        key: String,
        /// JSON payload
        json: String,
        #[arg(long)]
        tag: Option<String>,
    },

    /// Fetch a document by key
    Get { topic: String, key: String },

    /// List documents, optionally filtered by tag
    Find {
        topic: String,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Partition administration
    Partitions {
        #[command(subcommand)]
        action: PartitionAction,
    },

    /// Outbox queue inspection
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Evaluate an access-control decision
    Acl {
        #[command(subcommand)]
        action: AclAction,
    },
}

#[derive(Subcommand)]
enum PartitionAction {
    /// Create monthly partitions covering `[from, to)` (unix millis)
    Add { topic: String, from: i64, to: i64 },
    /// List partitions that currently exist
    List { topic: String },
    /// Delete partitions by name (e.g. "2026-01")
    Delete { topic: String, names: Vec<String> },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Summarize pending vs. failed outbox messages for a topic
    Status { topic: String },
}

#[derive(Subcommand)]
enum AclAction {
    /// Check whether a subject may perform an operation on an object
    Check {
        subject_id: String,
        object_id: String,
        #[arg(long, default_value = "document")]
        object_model: String,
        object_topic: String,
        #[arg(long)]
        operation: String,
        #[arg(long, default_value_t = 0)]
        access_mask: u32,
        /// Topic the acl_role_operation / acl_op_family_access tables live in
        #[arg(long)]
        acl_topic: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    strata_task::init_tracing(&strata_task::TelemetryOptions::new(cli.json, level));

    let config = StrataConfig::from_env().context("failed to load configuration")?;
    let kv = SurrealKv::connect(SurrealConfig {
        endpoint: config.db.endpoint.clone(),
        namespace: config.db.namespace.clone(),
        database: config.db.database.clone(),
    })
    .await
    .context("failed to connect to the configured backend")?;
    let store = Arc::new(Store::new(Arc::new(kv)));
    let pool = Arc::new(ThreadPool::new(1, 0));
    let router = Arc::new(TopicRouter::default_worker(0));
    let client = Arc::new(AsyncClient::new(Arc::clone(&store), pool, router, tokio::runtime::Handle::current()));

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Put { topic, key, json, tag } => cmd_put(&client, &topic, &key, &json, tag).await,
        Commands::Get { topic, key } => cmd_get(&client, &topic, &key).await,
        Commands::Find { topic, tag, limit } => cmd_find(&client, &topic, tag.as_deref(), limit).await,
        Commands::Partitions { action } => cmd_partitions(&store, action).await,
        Commands::Queue { action } => cmd_queue(&client, action).await,
        Commands::Acl { action } => cmd_acl(&client, action).await,
    }
}

fn cmd_init(config: &StrataConfig) -> Result<()> {
    println!("Connected to {} (namespace {}, database {})", config.db.endpoint, config.db.namespace, config.db.database);
    println!("Home directory: {:?}", config.home);
    Ok(())
}

fn key_query(topic: &str, key: &str) -> Query {
    Query {
        index_id: Document::indexes()[0].index_id(),
        clauses: vec![FieldClause { field_position: 0, predicate: Predicate::Eq, operand: Operand::Scalar(Scalar::String(key.to_string())), descending: false }],
        topics: Some(vec![topic.to_string()]),
        limit: 1,
        ..Default::default()
    }
}

async fn cmd_put<K: strata_kv::OrderedKv + 'static>(client: &AsyncClient<K>, topic: &str, key: &str, json: &str, tag: Option<String>) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(json).context("payload is not valid JSON")?;
    let data = serde_json::to_vec(&value)?;
    let now = now_millis();
    let existing = client.find::<Document>(key_query(topic, key)).await?.into_iter().next();

    match existing {
        Some(stored) => {
            let mut ops = vec![FieldOp { path: Path::field(3), op: UpdateOp::Set, value: UnitOperand::Scalar(Scalar::Bytes(data)) }];
            if let Some(tag) = tag {
                ops.push(FieldOp { path: Path::field(2), op: UpdateOp::Set, value: UnitOperand::Scalar(Scalar::String(tag)) });
            }
            client.update::<Document>(TopicId(topic.to_string()), stored.id, UpdateRequest(ops), None, now).await?;
            println!("updated {key} in {topic}");
        }
        None => {
            let doc = Document { key: key.to_string(), tag, data };
            let stored = client.create::<Document>(TopicId(topic.to_string()), doc, now).await?;
            println!("created {key} in {topic} ({})", stored.id.to_hex());
        }
    }
    Ok(())
}

async fn cmd_get<K: strata_kv::OrderedKv + 'static>(client: &AsyncClient<K>, topic: &str, key: &str) -> Result<()> {
    let found = client.find::<Document>(key_query(topic, key)).await?.into_iter().next();
    match found {
        Some(stored) => {
            let value: serde_json::Value = serde_json::from_slice(&stored.object.data).unwrap_or(serde_json::Value::Null);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("not found: {key}"),
    }
    Ok(())
}

async fn cmd_find<K: strata_kv::OrderedKv + 'static>(client: &AsyncClient<K>, topic: &str, tag: Option<&str>, limit: usize) -> Result<()> {
    let query = match tag {
        Some(tag) => Query {
            index_id: Document::indexes()[1].index_id(),
            clauses: vec![FieldClause { field_position: 0, predicate: Predicate::Eq, operand: Operand::Scalar(Scalar::String(tag.to_string())), descending: false }],
            topics: Some(vec![topic.to_string()]),
            limit,
            ..Default::default()
        },
        None => Query { index_id: Document::indexes()[0].index_id(), topics: Some(vec![topic.to_string()]), limit, ..Default::default() },
    };
    let docs = client.find::<Document>(query).await?;
    for stored in &docs {
        println!("{}\t{}", stored.object.key, stored.object.tag.as_deref().unwrap_or(""));
    }
    println!("{} document(s)", docs.len());
    Ok(())
}

async fn cmd_partitions<K: strata_kv::OrderedKv + 'static>(store: &Store<K>, action: PartitionAction) -> Result<()> {
    // Topic is accepted for symmetry with the other subcommands but
    // partitions are keyed by model, not topic.
    match action {
        PartitionAction::Add { topic: _, from, to } => {
            let created = store.add_date_partitions::<Document>(from, to).await?;
            for partition in &created {
                println!("{}", partition.0);
            }
            println!("{} partition(s) ensured", created.len());
        }
        PartitionAction::List { topic: _ } => {
            let partitions = store.list_date_partitions::<Document>().await?;
            for partition in &partitions {
                println!("{}", partition.0);
            }
        }
        PartitionAction::Delete { topic: _, names } => {
            let keys: Vec<PartitionKey> = names.into_iter().map(PartitionKey).collect();
            let count = keys.len();
            store.delete_date_partitions::<Document>(&keys).await?;
            println!("{count} partition(s) deleted");
        }
    }
    Ok(())
}

async fn cmd_queue<K: strata_kv::OrderedKv + 'static>(client: &AsyncClient<K>, action: QueueAction) -> Result<()> {
    match action {
        QueueAction::Status { topic } => {
            let query = Query { index_id: OutboxMessage::indexes()[0].index_id(), topics: Some(vec![topic.clone()]), ..Default::default() };
            let messages = client.find::<OutboxMessage>(query).await?;
            let failed = messages.iter().filter(|m| m.object.failed).count();
            let pending = messages.len() - failed;
            println!("topic {topic}: {pending} pending, {failed} failed");
            info!(topic = %topic, pending, failed, "queue status");
            Ok(())
        }
    }
}

async fn cmd_acl<K: strata_kv::OrderedKv + 'static>(client: &Arc<AsyncClient<K>>, action: AclAction) -> Result<()> {
    let AclAction::Check { subject_id, object_id, object_model, object_topic, operation, access_mask, acl_topic } = action;
    let subject = Subject::new(ObjectId::from_hex(&subject_id).context("subject_id is not a valid object id")?);
    let object = AclObject::new(
        ObjectId::from_hex(&object_id).context("object_id is not a valid object id")?,
        leak_str(object_model),
        object_topic,
    );
    let operation_name = leak_str(operation);
    let op = Operation::new(operation_name, operation_name, access_mask);

    let checker = AccessChecker::new(
        Arc::clone(client),
        TopicId(acl_topic),
        Arc::new(InMemoryAclCache::default()),
        None,
        Arc::new(NoHierarchy),
        Arc::new(NoHierarchy),
    );

    match checker.check(subject, object, op).await.into_result() {
        Ok(()) => println!("GRANT"),
        Err(e) => {
            println!("DENY ({e})");
            std::process::exit(1);
        }
    }
    Ok(())
}

/// `Operation`/`AclObject` carry `&'static str` model/operation names since
/// most callers hold compile-time constants; a one-shot CLI process leaking
/// a handful of strings per invocation is a fine trade for not threading an
/// owned-string variant through the checker for this single caller.
fn leak_str(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

fn now_millis() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}
