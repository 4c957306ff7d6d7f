// Copyright (c) 2025 - Cowboy AI, Inc.
//! Handler instrumentation
//!
//! [`Traced`] wraps a command or query handler. Every call runs inside a
//! tracing span named after the handler and ends with one log line carrying
//! the duration and the outcome. The registry wraps every handler it builds.

use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn, Instrument};

use crate::errors::RegistryResult;
use crate::service::commands::{CommandHandler, CommandReceipt};
use crate::service::queries::QueryHandler;

/// Tracing decorator around a handler
pub struct Traced<H> {
    inner: H,
}

impl<H> Traced<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<C, H> CommandHandler<C> for Traced<H>
where
    C: Send + 'static,
    H: CommandHandler<C>,
{
    async fn handle(&self, command: C) -> RegistryResult<CommandReceipt> {
        let name = self.inner.name();
        let span = tracing::info_span!("command", handler = name);
        let started = Instant::now();

        let result = self.inner.handle(command).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let _entered = span.enter();
        match &result {
            Ok(receipt) => info!(
                aggregate_id = %receipt.aggregate_id,
                version = receipt.version,
                publish = ?receipt.publish,
                elapsed_ms = elapsed_ms,
                "Command succeeded"
            ),
            Err(e) => warn!(error = %e, elapsed_ms = elapsed_ms, "Command failed"),
        }
        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[async_trait]
impl<Q, H> QueryHandler<Q> for Traced<H>
where
    Q: Send + 'static,
    H: QueryHandler<Q>,
{
    type Output = H::Output;

    async fn handle(&self, query: Q) -> RegistryResult<H::Output> {
        let name = self.inner.name();
        let span = tracing::info_span!("query", handler = name);
        let started = Instant::now();

        let result = self.inner.handle(query).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let _entered = span.enter();
        match &result {
            Ok(_) => info!(elapsed_ms = elapsed_ms, "Query succeeded"),
            Err(e) => warn!(error = %e, elapsed_ms = elapsed_ms, "Query failed"),
        }
        result
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
