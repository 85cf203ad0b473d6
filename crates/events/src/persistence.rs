//! Durable event persistence.
//!
//! [`EventPersistence`] drains an [`EventBus`](crate::bus::EventBus)
//! receiver and writes every [`PlatformEvent`] to the `events` table until
//! the bus closes or the cancellation token fires.

use std::collections::HashMap;

use edquest_core::types::DbId;
use edquest_db::repositories::EventRepo;
use edquest_db::DbPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;

/// Background service that persists events to the database.
pub struct EventPersistence {
    pool: DbPool,
    /// `event_types.name` -> `event_types.id`, filled lazily.
    type_ids: HashMap<String, DbId>,
}

impl EventPersistence {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            type_ids: HashMap::new(),
        }
    }

    /// Run the persistence loop.
    ///
    /// A failed write is logged and the loop continues; events the
    /// receiver lagged past are counted in a warning.
    pub async fn run(
        mut self,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Event persistence started");
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event persistence stopping");
                    break;
                }
                received = receiver.recv() => received,
            };

            match received {
                Ok(event) => {
                    if let Err(e) = self.persist(&event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Write one event, resolving its type name to `event_types.id`.
    async fn persist(&mut self, event: &PlatformEvent) -> Result<DbId, sqlx::Error> {
        let event_type_id = self.event_type_id(&event.event_type).await?;
        EventRepo::insert(
            &self.pool,
            event_type_id,
            event.source_entity_type.as_deref(),
            event.source_entity_id,
            event.actor_user_id,
            &event.payload,
        )
        .await
    }

    async fn event_type_id(&mut self, name: &str) -> Result<DbId, sqlx::Error> {
        if let Some(id) = self.type_ids.get(name) {
            return Ok(*id);
        }
        let event_type = EventRepo::get_event_type_by_name(&self.pool, name)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        self.type_ids.insert(name.to_string(), event_type.id);
        Ok(event_type.id)
    }
}
