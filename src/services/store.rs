use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, sync::broadcast};
use tracing::{debug, warn};

use crate::{
    error::AppError,
    models::{day::ItineraryDay, trip::Trip},
};

const TRIPS_DIR: &str = "trips";
const TRIP_FILE: &str = "trip.json";
const DAYS_DIR: &str = "days";

/// What a write touched. Mirrors the backing store's live-push feed:
/// anyone holding a receiver sees every successful write, with no
/// guarantee it was their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Trip { trip_id: String },
    Days { trip_id: String },
}

/// Document store for trips and their day documents. One JSON document
/// per trip plus one per day; every update is a whole-document
/// replacement. There are no multi-document transactions: writes that
/// logically belong together are issued independently, and the last
/// writer wins on conflict.
#[derive(Clone)]
pub struct TripStore {
    root: Arc<PathBuf>,
    changes: broadcast::Sender<StoreChange>,
}

impl TripStore {
    pub fn new(root: PathBuf) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            root: Arc::new(root),
            changes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Live-change feed. The reorder logic itself never subscribes;
    /// this exists for whatever layer wants to refresh on foreign writes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // Nobody listening is fine.
        let _ = self.changes.send(change);
    }

    pub async fn ensure_structure(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.root().join(TRIPS_DIR)).await?;
        Ok(())
    }

    fn trip_dir(&self, trip_id: &str) -> PathBuf {
        self.root().join(TRIPS_DIR).join(trip_id)
    }

    fn day_path(&self, trip_id: &str, day_id: &str) -> PathBuf {
        self.trip_dir(trip_id)
            .join(DAYS_DIR)
            .join(format!("{day_id}.json"))
    }

    pub async fn save_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let dir = self.trip_dir(&trip.id);
        fs::create_dir_all(dir.join(DAYS_DIR)).await?;
        write_json(&dir.join(TRIP_FILE), trip).await?;
        debug!(trip_id = %trip.id, "trip document written");
        self.notify(StoreChange::Trip {
            trip_id: trip.id.clone(),
        });
        Ok(())
    }

    pub async fn load_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        let path = self.trip_dir(trip_id).join(TRIP_FILE);
        if !fs::try_exists(&path).await? {
            return Err(AppError::NotFound);
        }
        read_json(&path).await
    }

    pub async fn delete_trip(&self, trip_id: &str) -> Result<(), AppError> {
        let dir = self.trip_dir(trip_id);
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
            self.notify(StoreChange::Trip {
                trip_id: trip_id.to_string(),
            });
        }
        Ok(())
    }

    /// All trips owned by `owner_uuid`, newest first. The store keys by
    /// id only, so this is a directory scan.
    pub async fn list_trips_for(&self, owner_uuid: &str) -> Result<Vec<Trip>, AppError> {
        let trips_root = self.root().join(TRIPS_DIR);
        if !fs::try_exists(&trips_root).await? {
            return Ok(Vec::new());
        }
        let mut trips = Vec::new();
        let mut entries = fs::read_dir(&trips_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join(TRIP_FILE);
            if !fs::try_exists(&path).await? {
                continue;
            }
            match read_json::<Trip>(&path).await {
                Ok(trip) if trip.owner_uuid == owner_uuid => trips.push(trip),
                Ok(_) => {}
                Err(err) => warn!(?path, "skipping unreadable trip document: {err}"),
            }
        }
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips)
    }

    /// All day documents of a trip, sorted by their persisted `order`
    /// field. The directory itself guarantees no sequence.
    pub async fn load_days(&self, trip_id: &str) -> Result<Vec<ItineraryDay>, AppError> {
        let days_root = self.trip_dir(trip_id).join(DAYS_DIR);
        if !fs::try_exists(&days_root).await? {
            return Ok(Vec::new());
        }
        let mut days = Vec::new();
        let mut entries = fs::read_dir(&days_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            match read_json::<ItineraryDay>(&entry.path()).await {
                Ok(day) => days.push(day),
                Err(err) => warn!(path = ?entry.path(), "skipping unreadable day document: {err}"),
            }
        }
        days.sort_by_key(|day| day.order);
        Ok(days)
    }

    pub async fn save_day(&self, day: &ItineraryDay) -> Result<(), AppError> {
        let path = self.day_path(&day.trip_id, &day.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_json(&path, day).await?;
        self.notify(StoreChange::Days {
            trip_id: day.trip_id.clone(),
        });
        Ok(())
    }

    pub async fn delete_day(&self, trip_id: &str, day_id: &str) -> Result<(), AppError> {
        let path = self.day_path(trip_id, day_id);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            self.notify(StoreChange::Days {
                trip_id: trip_id.to_string(),
            });
        }
        Ok(())
    }

    /// Persists a full day sequence after a reorder. Each day is its own
    /// document, so this is one independent write per day with no
    /// transaction around them; the first failure aborts and surfaces,
    /// already-written documents stay written.
    pub async fn save_days(&self, trip_id: &str, days: &[ItineraryDay]) -> Result<(), AppError> {
        for day in days {
            let path = self.day_path(trip_id, &day.id);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            write_json(&path, day).await?;
        }
        debug!(trip_id, count = days.len(), "day sequence written");
        self.notify(StoreChange::Days {
            trip_id: trip_id.to_string(),
        });
        Ok(())
    }

    /// Persists a cross-day activity move: exactly two document writes,
    /// issued independently and awaited together. If one fails the other
    /// is not rolled back — an activity can then exist in both days or
    /// neither until the next successful write. The error surfaces to
    /// the caller either way.
    pub async fn save_activity_move(
        &self,
        trip_id: &str,
        source_day: &ItineraryDay,
        dest_day: &ItineraryDay,
    ) -> Result<(), AppError> {
        let source_path = self.day_path(trip_id, &source_day.id);
        let dest_path = self.day_path(trip_id, &dest_day.id);
        if let Some(parent) = source_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let (source_write, dest_write) = tokio::join!(
            write_json(&source_path, source_day),
            write_json(&dest_path, dest_day),
        );
        source_write?;
        dest_write?;

        self.notify(StoreChange::Days {
            trip_id: trip_id.to_string(),
        });
        Ok(())
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let data = serde_json::to_vec_pretty(value).map_err(|err| AppError::Other(err.into()))?;
    fs::write(path, data).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|err| AppError::Other(err.into()))
}
