//! Per-request change tracking: the unit of work.
//!
//! Handlers load entities through a [`ChangeSet`], mutate them in memory and
//! stage additions and removals. Nothing reaches the store until
//! [`ChangeSet::save_changes`] runs inside the request's transaction. That call
//! stamps audit fields with a single timestamp, writes every pending change and
//! accepts the new state as the baseline.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Audit, DomainEvent, FamilyMember, ShoppingItem, Task};

/// An entity type the store knows how to load and write.
pub trait Persist: Clone + PartialEq + Send + Sync + Sized + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn load(conn: &Connection, id: Uuid) -> Result<Option<Self>>;
    fn insert(&self, conn: &Connection) -> Result<usize>;
    fn update(&self, conn: &Connection) -> Result<usize>;
    fn delete(conn: &Connection, id: Uuid) -> Result<usize>;

    /// Entities with an embedded audit block return it here.
    fn audit_mut(&mut self) -> Option<&mut Audit> {
        None
    }

    /// Give a queued event the entity's committed state.
    fn refresh_event(&self, event: DomainEvent) -> DomainEvent {
        event
    }

    /// The collection of this type inside a change set, with the set's visit
    /// counter so newly tracked entries get a position in visit order.
    fn collection(changes: &mut ChangeSet) -> (&mut EntitySet<Self>, &mut u64);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Member,
    Task,
    ShoppingItem,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Task => "task",
            Self::ShoppingItem => "shopping_item",
        }
    }
}

/// Lifecycle of a tracked entry.
///
/// - `Added`: Staged for insert
/// - `Unchanged`: Loaded and identical to the stored row
/// - `Modified`: Loaded and changed in memory
/// - `Deleted`: Staged for delete
/// - `Detached`: Deleted and committed, or added then removed before commit
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Added,
    Unchanged,
    Modified,
    Deleted,
    Detached,
}

/// One staged entry, as reported by [`ChangeSet::entries`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StagedEntry {
    pub kind: EntityKind,
    pub id: Uuid,
    pub state: EntryState,
}

#[derive(Debug)]
struct Tracked<T> {
    visit: u64,
    entity: T,
    original: Option<T>,
    state: EntryState,
    events: Vec<DomainEvent>,
}

impl<T: Persist> Tracked<T> {
    fn state(&self) -> EntryState {
        match (self.state, &self.original) {
            (EntryState::Unchanged, Some(original)) if *original != self.entity => {
                EntryState::Modified
            }
            (state, _) => state,
        }
    }
}

/// Tracked entities of one type, in the order they were first visited.
#[derive(Debug)]
pub struct EntitySet<T> {
    entries: Vec<Tracked<T>>,
}

impl<T> Default for EntitySet<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Persist> EntitySet<T> {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.entity.id() == id)
    }

    fn add(&mut self, entity: T, events: Vec<DomainEvent>, visit: &mut u64) {
        *visit += 1;
        self.entries.push(Tracked {
            visit: *visit,
            entity,
            original: None,
            state: EntryState::Added,
            events,
        });
    }

    fn find(&mut self, conn: &Connection, id: Uuid, visit: &mut u64) -> Result<Option<&mut T>> {
        if let Some(pos) = self.position(id) {
            let entry = &mut self.entries[pos];
            return Ok(match entry.state {
                EntryState::Deleted | EntryState::Detached => None,
                _ => Some(&mut entry.entity),
            });
        }

        let Some(entity) = T::load(conn, id)? else {
            return Ok(None);
        };

        *visit += 1;
        self.entries.push(Tracked {
            visit: *visit,
            original: Some(entity.clone()),
            entity,
            state: EntryState::Unchanged,
            events: Vec::new(),
        });
        Ok(self.entries.last_mut().map(|e| &mut e.entity))
    }

    fn remove(&mut self, conn: &Connection, id: Uuid, visit: &mut u64) -> Result<Option<T>> {
        if self.find(conn, id, visit)?.is_none() {
            return Ok(None);
        }
        let Some(pos) = self.position(id) else {
            return Ok(None);
        };

        let entry = &mut self.entries[pos];
        if entry.state == EntryState::Added {
            // Never stored, so there is nothing to delete or announce
            entry.state = EntryState::Detached;
            entry.events.clear();
        } else {
            entry.state = EntryState::Deleted;
        }
        Ok(Some(entry.entity.clone()))
    }

    fn raise(&mut self, id: Uuid, event: DomainEvent) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.entries[pos].events.push(event);
                true
            }
            None => false,
        }
    }

    fn stamp(&mut self, now: DateTime<Utc>, user: &str) {
        for entry in &mut self.entries {
            let state = entry.state();
            if let Some(audit) = entry.entity.audit_mut() {
                match state {
                    EntryState::Added => audit.stamp_created(now, user),
                    EntryState::Modified => audit.stamp_modified(now, user),
                    _ => {}
                }
            }
        }
    }

    fn write(&self, conn: &Connection, phase: EntryState) -> Result<usize> {
        let mut rows = 0;
        for entry in &self.entries {
            if entry.state() != phase {
                continue;
            }
            rows += match phase {
                EntryState::Added => entry.entity.insert(conn)?,
                EntryState::Modified => entry.entity.update(conn)?,
                EntryState::Deleted => T::delete(conn, entry.entity.id())?,
                _ => 0,
            };
        }
        Ok(rows)
    }

    fn accept(&mut self) {
        for entry in &mut self.entries {
            match entry.state {
                EntryState::Deleted => entry.state = EntryState::Detached,
                EntryState::Detached => {}
                _ => {
                    entry.state = EntryState::Unchanged;
                    entry.original = Some(entry.entity.clone());
                }
            }
        }
    }

    fn drain_events(&mut self, out: &mut Vec<(u64, DomainEvent)>) {
        for entry in &mut self.entries {
            for event in entry.events.drain(..) {
                out.push((entry.visit, entry.entity.refresh_event(event)));
            }
        }
    }

    fn staged(&self, out: &mut Vec<(u64, StagedEntry)>) {
        out.extend(self.entries.iter().map(|e| {
            (
                e.visit,
                StagedEntry {
                    kind: T::KIND,
                    id: e.entity.id(),
                    state: e.state(),
                },
            )
        }));
    }
}

/// Everything one request has loaded or staged.
#[derive(Debug, Default)]
pub struct ChangeSet {
    members: EntitySet<FamilyMember>,
    tasks: EntitySet<Task>,
    shopping_items: EntitySet<ShoppingItem>,
    visits: u64,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn split_members(&mut self) -> (&mut EntitySet<FamilyMember>, &mut u64) {
        (&mut self.members, &mut self.visits)
    }

    pub(crate) fn split_tasks(&mut self) -> (&mut EntitySet<Task>, &mut u64) {
        (&mut self.tasks, &mut self.visits)
    }

    pub(crate) fn split_shopping_items(&mut self) -> (&mut EntitySet<ShoppingItem>, &mut u64) {
        (&mut self.shopping_items, &mut self.visits)
    }

    pub fn add<T: Persist>(&mut self, entity: T) {
        self.add_with_events(entity, Vec::new());
    }

    /// Stage a new entity together with the events its creation raised.
    pub fn add_with_events<T: Persist>(&mut self, entity: T, events: Vec<DomainEvent>) {
        let (set, visits) = T::collection(self);
        set.add(entity, events, visits);
    }

    /// Look up a tracked entity, loading it from the store on first access.
    /// Entities staged for deletion are reported as absent.
    pub fn find<T: Persist>(&mut self, conn: &Connection, id: Uuid) -> Result<Option<&mut T>> {
        let (set, visits) = T::collection(self);
        set.find(conn, id, visits)
    }

    /// Stage a delete. Returns the removed entity, or `None` if it does not exist.
    pub fn remove<T: Persist>(&mut self, conn: &Connection, id: Uuid) -> Result<Option<T>> {
        let (set, visits) = T::collection(self);
        set.remove(conn, id, visits)
    }

    /// Queue an event for an entity this change set already tracks.
    /// Returns `false` if the entity is not tracked.
    pub fn raise<T: Persist>(&mut self, id: Uuid, event: DomainEvent) -> bool {
        let (set, _) = T::collection(self);
        set.raise(id, event)
    }

    /// Every tracked entry in visit order.
    pub fn entries(&self) -> Vec<StagedEntry> {
        let mut staged = Vec::new();
        self.members.staged(&mut staged);
        self.tasks.staged(&mut staged);
        self.shopping_items.staged(&mut staged);
        staged.sort_by_key(|(visit, _)| *visit);
        staged.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn has_changes(&self) -> bool {
        self.entries().iter().any(|e| {
            matches!(
                e.state,
                EntryState::Added | EntryState::Modified | EntryState::Deleted
            )
        })
    }

    pub fn pending_events(&self) -> usize {
        self.members.entries.iter().map(|e| e.events.len()).sum::<usize>()
            + self.tasks.entries.iter().map(|e| e.events.len()).sum::<usize>()
            + self
                .shopping_items
                .entries
                .iter()
                .map(|e| e.events.len())
                .sum::<usize>()
    }

    /// Stamp audit fields and write every pending change. Returns the number
    /// of affected rows.
    ///
    /// Must run inside a transaction: a failure part-way leaves earlier writes
    /// in place until the caller rolls back.
    pub fn save_changes(&mut self, conn: &Connection, now: DateTime<Utc>, user: &str) -> Result<usize> {
        self.members.stamp(now, user);
        self.tasks.stamp(now, user);
        self.shopping_items.stamp(now, user);

        // Parents are inserted before children and deleted after them
        let mut rows = 0;
        rows += self.members.write(conn, EntryState::Added)?;
        rows += self.tasks.write(conn, EntryState::Added)?;
        rows += self.shopping_items.write(conn, EntryState::Added)?;
        rows += self.members.write(conn, EntryState::Modified)?;
        rows += self.tasks.write(conn, EntryState::Modified)?;
        rows += self.shopping_items.write(conn, EntryState::Modified)?;
        rows += self.shopping_items.write(conn, EntryState::Deleted)?;
        rows += self.tasks.write(conn, EntryState::Deleted)?;
        rows += self.members.write(conn, EntryState::Deleted)?;

        self.members.accept();
        self.tasks.accept();
        self.shopping_items.accept();

        Ok(rows)
    }

    /// Take every queued event, in the order their entities were visited.
    /// Queues are left empty so no event is handed out twice.
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        self.members.drain_events(&mut events);
        self.tasks.drain_events(&mut events);
        self.shopping_items.drain_events(&mut events);
        events.sort_by_key(|(visit, _)| *visit);
        events.into_iter().map(|(_, event)| event).collect()
    }
}
