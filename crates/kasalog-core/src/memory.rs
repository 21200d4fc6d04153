//! In-process location repository.
//!
//! Backs the `STORE_BACKEND=memory` demo mode and the workflow tests. Failure
//! injection switches let tests exercise the persistence-error paths, and the
//! call log records every operation that reached the store.
//!
//! ```rust,ignore
//! use kasalog_core::{Coordinate, InMemoryLocationRepository, LocationRepository, NewLocation};
//!
//! let repo = InMemoryLocationRepository::new();
//! let id = repo
//!     .insert(NewLocation::now("UMB-001", Coordinate::new(35.0, 139.0)?))
//!     .await?;
//! assert_eq!(repo.list_all().await?[0].id, id);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Coordinate, LocationRecord, NewLocation};
use crate::traits::LocationRepository;

/// Operation that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Insert(String),
    ListAll,
    Delete(Uuid),
}

#[derive(Debug, Default)]
struct FailureSwitches {
    insert: AtomicBool,
    list: AtomicBool,
    delete: AtomicBool,
}

/// Location repository held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryLocationRepository {
    records: Arc<RwLock<Vec<LocationRecord>>>,
    failures: Arc<FailureSwitches>,
    call_log: Arc<Mutex<Vec<StoreCall>>>,
}

impl InMemoryLocationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert` fail with a store error.
    pub fn fail_inserts(&self, fail: bool) {
        self.failures.insert.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `list_all` fail with a store error.
    pub fn fail_list(&self, fail: bool) {
        self.failures.list.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete` fail with a store error.
    pub fn fail_deletes(&self, fail: bool) {
        self.failures.delete.store(fail, Ordering::SeqCst);
    }

    /// Every call that reached the store, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of `insert` calls that reached the store.
    pub fn insert_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Insert(_)))
            .count()
    }

    /// Seed a record directly, bypassing failure switches and the call log.
    pub async fn seed(&self, record: LocationRecord) {
        let mut records = self.records.write().await;
        records.push(record);
        sort_newest_first(&mut records);
    }

    fn log(&self, call: StoreCall) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(call);
        }
    }
}

fn sort_newest_first(records: &mut [LocationRecord]) {
    records.sort_by(|a, b| {
        b.scanned_at
            .cmp(&a.scanned_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl LocationRepository for InMemoryLocationRepository {
    async fn insert(&self, location: NewLocation) -> Result<Uuid> {
        self.log(StoreCall::Insert(location.umbrella_id.clone()));
        if self.failures.insert.load(Ordering::SeqCst) {
            return Err(Error::Store("insert rejected".to_string()));
        }

        // Re-check the invariant; the coordinate may have been built elsewhere.
        let coordinate = Coordinate::new(
            location.coordinate.latitude(),
            location.coordinate.longitude(),
        )?;

        let id = Uuid::now_v7();
        let mut records = self.records.write().await;
        records.push(LocationRecord {
            id,
            umbrella_id: location.umbrella_id,
            latitude: coordinate.latitude(),
            longitude: coordinate.longitude(),
            scanned_at: location.scanned_at,
        });
        sort_newest_first(&mut records);

        debug!(
            subsystem = "store",
            component = "memory",
            op = "insert",
            record_id = %id,
            record_count = records.len(),
            "Location recorded"
        );
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<LocationRecord>> {
        self.log(StoreCall::ListAll);
        if self.failures.list.load(Ordering::SeqCst) {
            return Err(Error::Store("list rejected".to_string()));
        }
        Ok(self.records.read().await.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.log(StoreCall::Delete(id));
        if self.failures.delete.load(Ordering::SeqCst) {
            return Err(Error::Store("delete rejected".to_string()));
        }
        self.records.write().await.retain(|r| r.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_list_round_trip() {
        let repo = InMemoryLocationRepository::new();
        let before = Utc::now();
        let id = repo
            .insert(NewLocation::now("UMB-001", coord(35.6762, 139.6503)))
            .await
            .unwrap();

        let records = repo.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].latitude, 35.6762);
        assert_eq!(records[0].longitude, 139.6503);
        assert!(records[0].scanned_at >= before);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = InMemoryLocationRepository::new();
        let t1 = Utc::now();
        for (name, offset) in [("T1", 0), ("T2", 1), ("T3", 2)] {
            repo.insert(NewLocation {
                umbrella_id: name.into(),
                coordinate: coord(1.0, 1.0),
                scanned_at: t1 + Duration::seconds(offset),
            })
            .await
            .unwrap();
        }

        let names: Vec<_> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.umbrella_id)
            .collect();
        assert_eq!(names, vec!["T3", "T2", "T1"]);
    }

    #[tokio::test]
    async fn test_delete_twice_is_ok_and_isolated() {
        let repo = InMemoryLocationRepository::new();
        let keep = repo
            .insert(NewLocation::now("KEEP", coord(0.0, 0.0)))
            .await
            .unwrap();
        let gone = repo
            .insert(NewLocation::now("GONE", coord(0.0, 0.0)))
            .await
            .unwrap();

        repo.delete(gone).await.unwrap();
        repo.delete(gone).await.unwrap();

        let records = repo.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, keep);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let repo = InMemoryLocationRepository::new();
        repo.fail_inserts(true);
        let err = repo
            .insert(NewLocation::now("UMB-001", coord(0.0, 0.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        repo.fail_list(true);
        assert!(repo.list_all().await.is_err());

        repo.fail_deletes(true);
        assert!(repo.delete(Uuid::nil()).await.is_err());

        assert_eq!(
            repo.calls(),
            vec![
                StoreCall::Insert("UMB-001".into()),
                StoreCall::ListAll,
                StoreCall::Delete(Uuid::nil())
            ]
        );
        assert_eq!(repo.insert_count(), 1);
    }
}
