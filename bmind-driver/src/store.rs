use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Records whose type tag carries this label describe the reporting
/// gateway itself, not a tracked beacon
pub const GATEWAY_TYPE_LABEL: &str = "Gateway";

/// One decoded beacon observation, as reported by a gateway in a status
/// batch. Transient; owned by the [`BeaconStore`], never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconReading {
    pub timestamp: DateTime<Local>,
    #[serde(rename = "type")]
    pub kind: String,
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default)]
    pub battery: i32,
}

impl BeaconReading {
    pub fn age(&self) -> chrono::Duration {
        Local::now().signed_duration_since(self.timestamp)
    }

    pub fn is_gateway(&self) -> bool {
        self.kind == GATEWAY_TYPE_LABEL
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    gateway_mac: Option<String>,
    list: Vec<BeaconReading>,
}

/// Concurrency-safe, deduplicated, TTL-evicted collection of transient
/// beacon records, keyed by mac. Add calls arrive from the transport's
/// delivery task while the sweep task calls [`BeaconStore::clean`], so
/// every access (snapshot reads included) serializes on the one lock
/// covering the whole collection
#[derive(Debug)]
pub struct BeaconStore {
    inner: Mutex<StoreInner>,
    ttl: Duration,
    mutations: AtomicU64,
}

impl BeaconStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            ttl,
            mutations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned store still holds consistent data, keep serving it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, reading: &BeaconReading) -> bool {
        match reading.age().to_std() {
            Ok(age) => age >= self.ttl,
            // Timestamps from the future never expire
            Err(_) => false,
        }
    }

    /// Upsert by mac: replace the stored record in full if one exists for
    /// this identifier, append otherwise. Gateway-identity records only
    /// update the gateway mac field and never enter the keyed list
    pub fn add(&self, reading: BeaconReading) {
        let mut inner = self.lock();
        if reading.is_gateway() {
            inner.gateway_mac = Some(reading.mac);
            self.mutations.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match inner.list.iter_mut().find(|r| r.mac == reading.mac) {
            Some(existing) => *existing = reading,
            None => inner.list.push(reading),
        }
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    /// Tombstone the record's timestamp and remove exactly the entry
    /// matching its mac, if present
    pub fn delete(&self, reading: &mut BeaconReading) {
        reading.timestamp = Local::now();
        if reading.is_gateway() {
            return;
        }
        let mut inner = self.lock();
        if let Some(idx) = inner.list.iter().position(|r| r.mac == reading.mac) {
            inner.list.remove(idx);
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evict every record whose age has reached the TTL. The backing list
    /// is only replaced when something actually expired
    pub fn clean(&self) {
        let mut inner = self.lock();
        let kept: Vec<BeaconReading> = inner
            .list
            .iter()
            .filter(|r| !self.expired(r))
            .cloned()
            .collect();
        if kept.len() != inner.list.len() {
            inner.list = kept;
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().list.is_empty()
    }

    pub fn get(&self, mac: &str) -> Option<BeaconReading> {
        self.lock().list.iter().find(|r| r.mac == mac).cloned()
    }

    pub fn gateway_mac(&self) -> Option<String> {
        self.lock().gateway_mac.clone()
    }

    /// Number of effective mutations since creation. Stops advancing once
    /// the owning driver has stopped
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    /// Serialized view of the store contents, taken under the same lock
    /// as mutation so concurrent adds or sweeps never tear it
    pub fn snapshot(&self) -> Result<serde_json::Value, serde_json::Error> {
        let inner = self.lock();
        Ok(json!({
            "gatewayMac": inner.gateway_mac,
            "list": serde_json::to_value(&inner.list)?,
        }))
    }
}
