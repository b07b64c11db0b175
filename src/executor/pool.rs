//! The execution units that chunk invocations run on.
use crate::config::ExecutorConfig;
use crate::error::LiquidError;
use log::info;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A single execution unit. A unit runs at most `slots` chunk invocations
/// at a time and may be taken offline, in which case every invocation sent
/// to it fails with the transient `LiquidError::UnitUnavailable`.
#[derive(Debug)]
pub struct ExecutionUnit {
    id: usize,
    online: AtomicBool,
    slots: Arc<Semaphore>,
    /// Number of map invocations this unit has started
    invocations: AtomicUsize,
}

impl ExecutionUnit {
    fn new(id: usize, slots: usize) -> Self {
        ExecutionUnit {
            id,
            online: AtomicBool::new(true),
            slots: Arc::new(Semaphore::new(slots.max(1))),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// The number of map invocations this unit has started.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub(crate) fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
    }

    /// Waits for a free slot on this unit.
    ///
    /// # Errors
    /// `LiquidError::UnitUnavailable` if the unit is, or goes, offline
    pub(crate) async fn acquire(
        &self,
    ) -> Result<OwnedSemaphorePermit, LiquidError> {
        if !self.is_online() {
            return Err(LiquidError::UnitUnavailable(self.id));
        }
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LiquidError::UnitUnavailable(self.id))?;
        if !self.is_online() {
            return Err(LiquidError::UnitUnavailable(self.id));
        }
        Ok(permit)
    }
}

/// A fixed set of `ExecutionUnit`s, identified by `0..n_units`.
#[derive(Debug)]
pub struct WorkerPool {
    units: Vec<Arc<ExecutionUnit>>,
}

impl WorkerPool {
    pub fn new(config: &ExecutorConfig) -> Self {
        let n_units = config.n_units.max(1);
        info!(
            "Starting worker pool with {} units of {} slots each",
            n_units, config.slots_per_unit
        );
        WorkerPool {
            units: (0..n_units)
                .map(|id| Arc::new(ExecutionUnit::new(id, config.slots_per_unit)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: usize) -> Option<&Arc<ExecutionUnit>> {
        self.units.get(id)
    }

    pub fn units(&self) -> &[Arc<ExecutionUnit>] {
        &self.units
    }

    /// Brings the unit `id` online or takes it offline. Invocations already
    /// running on the unit are not interrupted.
    pub fn set_online(&self, id: usize, online: bool) -> Result<(), LiquidError> {
        let unit = self.unit(id).ok_or_else(|| LiquidError::InvalidParameter {
            name: "unit",
            message: format!("no unit {} in a pool of {}", id, self.len()),
        })?;
        info!(
            "Execution unit {} is now {}",
            id,
            if online { "online" } else { "offline" }
        );
        unit.online.store(online, Ordering::SeqCst);
        Ok(())
    }

    /// The total number of map invocations started across all units.
    pub fn invocations(&self) -> usize {
        self.units.iter().map(|u| u.invocations()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n_units: usize) -> WorkerPool {
        WorkerPool::new(&ExecutorConfig {
            n_units,
            slots_per_unit: 1,
            max_attempts: 3,
        })
    }

    #[tokio::test]
    async fn test_offline_unit_is_unavailable() {
        let pool = pool(2);
        assert_eq!(pool.len(), 2);
        pool.set_online(1, false).unwrap();
        assert!(pool.unit(0).unwrap().acquire().await.is_ok());
        match pool.unit(1).unwrap().acquire().await {
            Err(e @ LiquidError::UnitUnavailable(1)) => assert!(e.is_transient()),
            other => panic!("expected UnitUnavailable, got {:?}", other),
        }
        assert!(pool.set_online(2, false).is_err());
    }

    #[tokio::test]
    async fn test_slots_bound_concurrency() {
        let pool = pool(1);
        let unit = pool.unit(0).unwrap();
        let permit = unit.acquire().await.unwrap();
        assert_eq!(unit.slots.available_permits(), 0);
        drop(permit);
        assert_eq!(unit.slots.available_permits(), 1);
    }
}
