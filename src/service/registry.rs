// Copyright (c) 2025 - Cowboy AI, Inc.
//! User registry facade
//!
//! [`UserRegistry`] is the entry point for callers. It owns the adapters,
//! builds every handler wrapped in [`Traced`], and hands out the background
//! pieces (projection consumer, outbox relay, rebuild) wired to the same
//! adapters.
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_user_registry::aggregate::CreateUserCommand;
//! use cim_user_registry::service::{Command, Query, UserRegistry};
//! use cim_user_registry::{RegistryConfig, RegistryResult};
//!
//! # async fn run() -> RegistryResult<()> {
//! let registry = UserRegistry::in_memory(RegistryConfig::default())?;
//! let consumer = registry.projection_consumer().start().await?;
//!
//! // Somewhere a relay must drain deferred commits; over NATS the projector runs it
//! let (stop_relay, stop_relay_rx) = tokio::sync::watch::channel(false);
//! let relay = registry.outbox_relay().spawn(stop_relay_rx);
//!
//! let receipt = registry
//!     .execute(Command::Create(CreateUserCommand::new("Alice", "alice@x.com", "secret")))
//!     .await?;
//!
//! let users = registry.query(Query::GetUser { id: receipt.aggregate_id }).await;
//! # consumer.shutdown().await;
//! # let _ = stop_relay.send(true);
//! # let _ = relay.await;
//! # let _ = users;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{CreateUserCommand, DeleteUserCommand, UpdateUserCommand};
use crate::broker::{Broker, InMemoryBroker, JetStreamBroker};
use crate::config::RegistryConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::event_store::{EventStore, InMemoryEventStore, NatsEventStore};
use crate::nats::NatsClient;
use crate::outbox::{InMemoryLedger, KvLedger, OutboxRelay, PublicationLedger};
use crate::projection::{
    rebuild_read_model, system_clock, Clock, DynProjection, ProjectionConsumer, RebuildReport,
    UserReadProjection,
};
use crate::publisher::EventPublisher;
use crate::read_store::{InMemoryReadStore, KvReadStore, ReadStore, UserRead};
use crate::service::commands::{
    CommandHandler, CommandReceipt, CreateUserHandler, DeleteUserHandler, UpdateUserHandler,
    UserRepository,
};
use crate::service::middleware::Traced;
use crate::service::queries::{GetUser, GetUserHandler, ListUsers, ListUsersHandler, QueryHandler};

/// Every write the registry accepts
#[derive(Debug, Clone)]
pub enum Command {
    Create(CreateUserCommand),
    Update(UpdateUserCommand),
    Delete(DeleteUserCommand),
}

impl From<CreateUserCommand> for Command {
    fn from(command: CreateUserCommand) -> Self {
        Command::Create(command)
    }
}

impl From<UpdateUserCommand> for Command {
    fn from(command: UpdateUserCommand) -> Self {
        Command::Update(command)
    }
}

impl From<DeleteUserCommand> for Command {
    fn from(command: DeleteUserCommand) -> Self {
        Command::Delete(command)
    }
}

/// Every read the registry answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    ListUsers,
    GetUser { id: Uuid },
}

/// Command and query entry point
pub struct UserRegistry {
    create: Traced<CreateUserHandler>,
    update: Traced<UpdateUserHandler>,
    delete: Traced<DeleteUserHandler>,
    list: Traced<ListUsersHandler>,
    get: Traced<GetUserHandler>,
    event_store: Arc<dyn EventStore>,
    broker: Arc<dyn Broker>,
    read_store: Arc<dyn ReadStore>,
    publisher: EventPublisher,
    ledger: Arc<dyn PublicationLedger>,
    config: RegistryConfig,
    clock: Clock,
}

/// Assembles a [`UserRegistry`] from its adapters
#[derive(Default)]
pub struct UserRegistryBuilder {
    config: Option<RegistryConfig>,
    event_store: Option<Arc<dyn EventStore>>,
    broker: Option<Arc<dyn Broker>>,
    read_store: Option<Arc<dyn ReadStore>>,
    ledger: Option<Arc<dyn PublicationLedger>>,
    clock: Option<Clock>,
}

impl UserRegistryBuilder {
    /// Defaults to [`RegistryConfig::default`]
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_store(mut self, event_store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(event_store);
        self
    }

    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn read_store(mut self, read_store: Arc<dyn ReadStore>) -> Self {
        self.read_store = Some(read_store);
        self
    }

    /// Defaults to a ledger private to this registry
    pub fn ledger(mut self, ledger: Arc<dyn PublicationLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Defaults to the system clock
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> RegistryResult<UserRegistry> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let missing = |what: &str| RegistryError::Configuration(format!("{} not set", what));
        let event_store = self.event_store.ok_or_else(|| missing("event store"))?;
        let broker = self.broker.ok_or_else(|| missing("broker"))?;
        let read_store = self.read_store.ok_or_else(|| missing("read store"))?;
        let clock = self.clock.unwrap_or_else(system_clock);

        if broker.partition_count() != config.partitions {
            warn!(
                broker_partitions = broker.partition_count(),
                configured_partitions = config.partitions,
                "Broker partition count differs from configuration"
            );
        }

        let publisher =
            EventPublisher::new(broker.clone(), config.topic.clone(), config.publish_timeout);
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryLedger::new()));
        let repository = UserRepository::new(
            event_store.clone(),
            publisher.clone(),
            ledger.clone(),
            config.append_timeout,
        );

        Ok(UserRegistry {
            create: Traced::new(CreateUserHandler::new(repository.clone())),
            update: Traced::new(UpdateUserHandler::new(repository.clone())),
            delete: Traced::new(DeleteUserHandler::new(repository)),
            list: Traced::new(ListUsersHandler::new(read_store.clone())),
            get: Traced::new(GetUserHandler::new(read_store.clone())),
            event_store,
            broker,
            read_store,
            publisher,
            ledger,
            config,
            clock,
        })
    }
}

impl UserRegistry {
    pub fn builder() -> UserRegistryBuilder {
        UserRegistryBuilder::default()
    }

    /// Registry over in-memory adapters
    pub fn in_memory(config: RegistryConfig) -> RegistryResult<Self> {
        let partitions = config.partitions;
        Self::builder()
            .with_config(config)
            .event_store(Arc::new(InMemoryEventStore::new()))
            .broker(Arc::new(InMemoryBroker::new(partitions)))
            .read_store(Arc::new(InMemoryReadStore::new()))
            .build()
    }

    /// Registry over NATS: JetStream event log, partitioned topic, KV read model and ledger
    pub async fn connect(config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        let client = NatsClient::connect(&config.nats).await?;

        let event_store = NatsEventStore::from_config(&client, &config).await?;
        let broker = JetStreamBroker::new(&client, config.partitions);
        let read_store = KvReadStore::open(&client, &config.read_model_bucket).await?;
        let ledger = KvLedger::open(&client, &config.outbox.ledger_bucket).await?;

        info!(
            stream = %config.event_stream,
            topic = %config.topic,
            bucket = %config.read_model_bucket,
            ledger = %config.outbox.ledger_bucket,
            "User registry connected to NATS"
        );

        Self::builder()
            .with_config(config)
            .event_store(Arc::new(event_store))
            .broker(Arc::new(broker))
            .read_store(Arc::new(read_store))
            .ledger(Arc::new(ledger))
            .build()
    }

    /// Run a command
    pub async fn execute(&self, command: Command) -> RegistryResult<CommandReceipt> {
        match command {
            Command::Create(command) => CommandHandler::handle(&self.create, command).await,
            Command::Update(command) => CommandHandler::handle(&self.update, command).await,
            Command::Delete(command) => CommandHandler::handle(&self.delete, command).await,
        }
    }

    /// Run a query against the read store
    pub async fn query(&self, query: Query) -> RegistryResult<Vec<UserRead>> {
        match query {
            Query::ListUsers => QueryHandler::handle(&self.list, ListUsers).await,
            Query::GetUser { id } => {
                let user = QueryHandler::handle(&self.get, GetUser { id }).await?;
                Ok(vec![user])
            }
        }
    }

    /// Single-user read
    pub async fn get_user(&self, id: Uuid) -> RegistryResult<UserRead> {
        QueryHandler::handle(&self.get, GetUser { id }).await
    }

    /// The read-model projection over this registry's read store
    pub fn projection(&self) -> DynProjection {
        Arc::new(UserReadProjection::new(
            self.read_store.clone(),
            self.clock.clone(),
        ))
    }

    /// Consumer feeding the read model from the topic
    pub fn projection_consumer(&self) -> ProjectionConsumer {
        ProjectionConsumer::new(
            self.broker.clone(),
            self.projection(),
            self.config.topic.clone(),
            self.config.consumer_group.clone(),
            self.config.retry.clone(),
        )
    }

    /// Relay sharing this registry's publication ledger
    pub fn outbox_relay(&self) -> OutboxRelay {
        OutboxRelay::new(
            self.event_store.clone(),
            self.publisher.clone(),
            self.ledger.clone(),
            self.config.outbox.clone(),
            self.clock.clone(),
        )
    }

    /// Clear the read store and replay the whole log into it
    ///
    /// Stop the projection consumer first; otherwise live deliveries race the replay.
    pub async fn rebuild_read_model(&self) -> RegistryResult<RebuildReport> {
        rebuild_read_model(
            self.event_store.as_ref(),
            &self.projection(),
            self.config.outbox.batch_size,
        )
        .await
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    pub fn read_store(&self) -> &Arc<dyn ReadStore> {
        &self.read_store
    }

    pub fn ledger(&self) -> &Arc<dyn PublicationLedger> {
        &self.ledger
    }
}
