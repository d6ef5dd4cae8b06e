//! In-process work item repository.
//!
//! Mirrors `PgWorkItemRepository` row for row: the same transitions, the same
//! claim order, the same ownership checks. A single mutex serializes every
//! operation, which gives the same atomicity the database provides with row
//! locks, but only within one process.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use glossa_core::{
    validate_source_key, ClaimRequest, Completion, Error, ItemId, ItemState, QueueStats, Result,
    SubmitOutcome, WorkItem, WorkItemRepository,
};

#[derive(Default)]
struct Inner {
    next_id: ItemId,
    items: BTreeMap<ItemId, WorkItem>,
}

impl Inner {
    fn by_key_mut(&mut self, source_key: &str) -> Option<&mut WorkItem> {
        self.items.values_mut().find(|i| i.source_key == source_key)
    }

    fn depth(&self) -> i64 {
        self.items.values().filter(|i| !i.state.is_terminal()).count() as i64
    }
}

/// Work item store held entirely in memory.
#[derive(Default)]
pub struct MemoryWorkItemRepository {
    inner: Mutex<Inner>,
}

impl MemoryWorkItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("work item store lock poisoned".into()))
    }

    /// Shift an item's timestamps into the past.
    pub fn backdate(&self, id: ItemId, age: Duration) -> Result<()> {
        let mut inner = self.lock()?;
        let item = inner.items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        item.created_at -= age;
        item.updated_at -= age;
        Ok(())
    }

    /// Snapshot of every item in insertion order.
    pub fn all(&self) -> Result<Vec<WorkItem>> {
        Ok(self.lock()?.items.values().cloned().collect())
    }
}

#[async_trait]
impl WorkItemRepository for MemoryWorkItemRepository {
    async fn submit(&self, source_key: &str) -> Result<SubmitOutcome> {
        validate_source_key(source_key)?;
        let now = Utc::now();
        let mut inner = self.lock()?;

        let mut reactivated = false;
        let item = match inner.by_key_mut(source_key) {
            Some(existing) => {
                if existing.is_reactivatable(now) {
                    existing.state = ItemState::Init;
                    existing.owner = None;
                    existing.fetched_by = None;
                    existing.fail_reason = None;
                    existing.updated_at = now;
                    reactivated = true;
                }
                existing.clone()
            }
            None => {
                inner.next_id += 1;
                let item = WorkItem {
                    id: inner.next_id,
                    source_key: source_key.to_string(),
                    state: ItemState::Init,
                    owner: None,
                    fetched_by: None,
                    fail_reason: None,
                    duration_secs: None,
                    scores: None,
                    created_at: now,
                    updated_at: now,
                };
                inner.items.insert(item.id, item.clone());
                item
            }
        };

        Ok(SubmitOutcome {
            item,
            queue_depth: inner.depth(),
            reactivated,
        })
    }

    async fn lookup(&self, source_key: &str) -> Result<Option<WorkItem>> {
        let inner = self.lock()?;
        Ok(inner
            .items
            .values()
            .find(|i| i.source_key == source_key)
            .cloned())
    }

    async fn get(&self, id: ItemId) -> Result<Option<WorkItem>> {
        Ok(self.lock()?.items.get(&id).cloned())
    }

    async fn claim_next(&self, request: &ClaimRequest<'_>) -> Result<Option<WorkItem>> {
        request.validate()?;
        let mut inner = self.lock()?;

        let candidate = inner
            .items
            .values()
            .filter(|i| request.eligible.contains(&i.state))
            .filter(|i| match request.fetched_by {
                Some(worker) => i.fetched_by.as_deref() == Some(worker),
                None => true,
            })
            .min_by_key(|i| (i.created_at, i.id))
            .map(|i| i.id);

        let Some(id) = candidate else {
            return Ok(None);
        };
        let item = inner.items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        item.state = request.claimed_state;
        item.owner = Some(request.worker_id.to_string());
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn complete(
        &self,
        id: ItemId,
        worker_id: &str,
        completion: &Completion,
    ) -> Result<WorkItem> {
        completion.validate()?;
        let mut inner = self.lock()?;
        let item = inner.items.get_mut(&id).ok_or(Error::ItemNotFound(id))?;

        if !item.state.is_in_progress() || item.owner.as_deref() != Some(worker_id) {
            return Err(Error::OwnershipLost {
                item_id: id,
                worker_id: worker_id.to_string(),
            });
        }

        if completion.state == ItemState::Fetched {
            item.fetched_by = item.owner.take();
        }
        item.state = completion.state;
        item.owner = None;
        item.fail_reason = completion.fail_reason;
        if completion.duration_secs.is_some() {
            item.duration_secs = completion.duration_secs;
        }
        item.scores = completion.scores.clone();
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn bulk_reset(&self, states: &[ItemState], target: ItemState) -> Result<u64> {
        if target.is_in_progress() || target == ItemState::Scored {
            return Err(Error::InvalidInput(format!(
                "cannot bulk reset items into {target}"
            )));
        }
        let now = Utc::now();
        let mut inner = self.lock()?;
        let mut count = 0;
        for item in inner.items.values_mut().filter(|i| states.contains(&i.state)) {
            item.state = target;
            item.owner = None;
            if target == ItemState::Init {
                item.fetched_by = None;
            }
            if target != ItemState::Failed {
                item.fail_reason = None;
            }
            item.scores = None;
            item.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn reset_unclassified_failures(&self) -> Result<u64> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let mut count = 0;
        for item in inner
            .items
            .values_mut()
            .filter(|i| i.state == ItemState::Failed && i.fail_reason.is_none())
        {
            item.state = ItemState::Init;
            item.owner = None;
            item.fetched_by = None;
            item.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn count_fetched_by(&self, worker_id: &str) -> Result<i64> {
        let inner = self.lock()?;
        Ok(inner
            .items
            .values()
            .filter(|i| {
                i.state == ItemState::Fetched && i.fetched_by.as_deref() == Some(worker_id)
            })
            .count() as i64)
    }

    async fn queue_depth(&self) -> Result<i64> {
        Ok(self.lock()?.depth())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let inner = self.lock()?;
        let mut stats = QueueStats::default();
        for item in inner.items.values() {
            stats.add(item.state, 1);
            if item.state == ItemState::Failed && item.fail_reason.is_none() {
                stats.failed_unclassified += 1;
            }
        }
        Ok(stats)
    }

    async fn recreate(&self) -> Result<()> {
        *self.lock()? = Inner::default();
        Ok(())
    }
}
