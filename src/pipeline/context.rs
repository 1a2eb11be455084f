use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::clock::Clock;
use crate::db::{ChangeSet, Database, Persist, Transaction};
use crate::error::{Failure, Outcome};
use crate::models::DomainEvent;

/// Audit identity used when a request carries no authenticated user.
pub const SYSTEM_USER: &str = "system";

/// State owned by one pipeline execution.
///
/// Holds the request's change set, its open transaction (commands only) and
/// the events waiting for dispatch. Methods that may touch the store take
/// `&mut self`: the transaction keeps the connection guard, which cannot be
/// shared between threads.
pub struct RequestContext {
    db: Database,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn AuthProvider>,
    user: Option<String>,
    cancel: CancellationToken,
    transaction: Option<Transaction>,
    changes: ChangeSet,
    outbox: Vec<DomainEvent>,
    committed: bool,
}

impl RequestContext {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn AuthProvider>,
        user: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            clock,
            identity,
            user,
            cancel,
            transaction: None,
            changes: ChangeSet::new(),
            outbox: Vec::new(),
            committed: false,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn identity(&self) -> Arc<dyn AuthProvider> {
        self.identity.clone()
    }

    /// Who audit fields are stamped with.
    pub fn audit_user(&self) -> &str {
        self.user.as_deref().unwrap_or(SYSTEM_USER)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// True once this request's transaction has committed.
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Run `f` against the store. Inside a transaction this is the transaction's
    /// connection; otherwise the connection is locked for the call only.
    pub async fn with_conn<R>(&mut self, f: impl FnOnce(&Connection) -> R) -> R {
        if let Some(tx) = self.transaction.as_deref() {
            return f(tx);
        }
        let conn = self.db.lock().await;
        f(&conn)
    }

    /// Load an entity into the change set, or return the tracked copy.
    pub async fn find<T: Persist>(&mut self, id: Uuid) -> Outcome<Option<&mut T>> {
        if let Some(tx) = self.transaction.as_deref() {
            return Ok(self.changes.find(tx, id)?);
        }
        let conn = self.db.lock().await;
        Ok(self.changes.find(&conn, id)?)
    }

    pub fn add<T: Persist>(&mut self, entity: T) {
        self.changes.add(entity);
    }

    pub fn add_with_events<T: Persist>(&mut self, entity: T, events: Vec<DomainEvent>) {
        self.changes.add_with_events(entity, events);
    }

    /// Stage a delete. `None` when the entity does not exist.
    pub async fn remove<T: Persist>(&mut self, id: Uuid) -> Outcome<Option<T>> {
        if let Some(tx) = self.transaction.as_deref() {
            return Ok(self.changes.remove(tx, id)?);
        }
        let conn = self.db.lock().await;
        Ok(self.changes.remove(&conn, id)?)
    }

    /// Queue an event on a tracked entity.
    pub fn raise<T: Persist>(&mut self, id: Uuid, event: DomainEvent) -> Outcome<()> {
        if self.changes.raise::<T>(id, event) {
            Ok(())
        } else {
            Err(anyhow!("cannot raise an event for untracked {} {}", T::KIND.as_str(), id).into())
        }
    }

    pub(crate) async fn begin(&mut self) -> Outcome<()> {
        if self.transaction.is_some() {
            return Err(anyhow!("transaction already open").into());
        }
        self.transaction = Some(self.db.begin().await?);
        Ok(())
    }

    /// Stamp audit fields and flush every pending change into the open
    /// transaction, then move the raised events to the outbox.
    pub(crate) fn save_changes(&mut self) -> Outcome<usize> {
        let now = self.clock.now();
        let user = self.audit_user().to_string();

        let Some(tx) = self.transaction.as_mut() else {
            return Err(anyhow!("no open transaction to save changes into").into());
        };
        let rows = self.changes.save_changes(tx, now, &user)?;
        tx.record_writes(rows);

        self.outbox.extend(self.changes.drain_events());
        Ok(rows)
    }

    pub(crate) fn commit(&mut self) -> Outcome<()> {
        let Some(tx) = self.transaction.take() else {
            return Err(anyhow!("no open transaction to commit").into());
        };
        tx.commit().map_err(Failure::Unexpected)?;
        self.committed = true;
        Ok(())
    }

    pub(crate) fn rollback(&mut self) {
        self.outbox.clear();
        if let Some(tx) = self.transaction.take() {
            if let Err(e) = tx.rollback() {
                tracing::error!("Failed to roll back transaction: {}", e);
            }
        }
    }

    /// Events ready for dispatch. Empty unless the transaction committed.
    pub(crate) fn take_outbox(&mut self) -> Vec<DomainEvent> {
        if !self.committed {
            return Vec::new();
        }
        std::mem::take(&mut self.outbox)
    }
}
