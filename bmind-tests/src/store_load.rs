use std::sync::Arc;

use bmind_driver::{BeaconReading, BeaconStore};
use chrono::Local;

/// Hammers one store from many tasks the way a busy gateway would:
/// concurrent upserts racing the eviction sweep. Prints the final size
/// so duplicate identifiers or lost updates are obvious
#[tokio::main]
async fn main() {
    env_logger::init();

    let store = Arc::new(BeaconStore::new(std::time::Duration::from_secs(10)));

    let mut tasks = vec![];
    for worker in 0..8u32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..1000u32 {
                store.add(BeaconReading {
                    timestamp: Local::now(),
                    kind: "iBeacon".to_string(),
                    mac: format!("C8:00:00:00:{worker:02X}:{:02X}", i % 256),
                    rssi: Some(-60),
                    battery: 75,
                });
            }
        }));
    }
    for _ in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..200 {
                store.clean();
                tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
            }
        }));
    }

    for task in tasks {
        task.await.ok();
    }

    // 8 workers x 256 distinct macs, nothing old enough to evict
    log::info!(
        "final store size {:} (expected {:}) after {:} mutations",
        store.len(),
        8 * 256,
        store.mutation_count()
    );
}
