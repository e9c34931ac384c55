//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::SdkBlueprint;
use dispatch_store::{DispatchStore, StoreOptions};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

use super::load_blueprint;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    store: StoreInfo,
    max_in_flight: usize,
    connectivity: String,
    dispatchers: Vec<DispatcherInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    barriers: Vec<BarrierInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<QueueInfo>,
}

#[derive(Serialize)]
struct StoreInfo {
    path: String,
    max_queue_size: i64,
    expiration_secs: u64,
}

#[derive(Serialize)]
struct DispatcherInfo {
    name: String,
    kind: String,
    dispatch_limit: usize,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    params: std::collections::HashMap<String, String>,
}

#[derive(Serialize)]
struct BarrierInfo {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    configuration: serde_json::Map<String, serde_json::Value>,
}

/// Live queue contents read from the store
#[derive(Serialize)]
struct QueueInfo {
    dispatches: usize,
    queue_entries: usize,
    /// Pending per consumer, including consumers no longer configured
    pending: BTreeMap<String, usize>,
}

/// Execute the `info` command
pub async fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config, args.store.as_ref())?;

    let queue = if args.pending {
        Some(read_queue(&blueprint).await?)
    } else {
        None
    };

    let info = build_config_info(&blueprint, args, queue);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

async fn read_queue(blueprint: &SdkBlueprint) -> Result<QueueInfo> {
    let store = DispatchStore::open(&blueprint.store.path, StoreOptions::from(&blueprint.store))
        .with_context(|| format!("Failed to open store {}", blueprint.store.path.display()))?;

    let mut pending = BTreeMap::new();
    for dispatcher in &blueprint.dispatchers {
        pending.insert(dispatcher.name.clone(), 0);
    }
    for consumer in store.consumers().await? {
        let count = store.pending_count(&consumer).await?;
        pending.insert(consumer, count);
    }

    Ok(QueueInfo {
        dispatches: store.size().await?,
        queue_entries: store.queue_entry_count().await?,
        pending,
    })
}

fn build_config_info(
    blueprint: &SdkBlueprint,
    args: &InfoArgs,
    queue: Option<QueueInfo>,
) -> ConfigInfo {
    let dispatchers = blueprint
        .dispatchers
        .iter()
        .map(|d| DispatcherInfo {
            name: d.name.clone(),
            kind: format!("{:?}", d.kind),
            dispatch_limit: d.dispatch_limit,
            params: d.params.clone(),
        })
        .collect();

    let barriers = if args.barriers {
        blueprint
            .barriers
            .iter()
            .map(|b| BarrierInfo {
                id: b.id.clone(),
                scopes: b.scopes.as_ref().map(|scopes| {
                    let mut scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
                    scopes.sort();
                    scopes
                }),
                configuration: b.configuration.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        store: StoreInfo {
            path: blueprint.store.path.display().to_string(),
            max_queue_size: blueprint.store.max_queue_size,
            expiration_secs: blueprint.store.expiration_secs,
        },
        max_in_flight: blueprint.coordinator.max_in_flight,
        connectivity: format!("{:?}", blueprint.connectivity.mode),
        dispatchers,
        barriers,
        queue,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                   Beacon Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("💾 Store");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Path: {}", info.store.path);
    match info.store.max_queue_size {
        -1 => println!("   ├─ Max queue size: unbounded"),
        size => println!("   ├─ Max queue size: {}", size),
    }
    println!("   ├─ Expiration: {}s", info.store.expiration_secs);
    println!("   ├─ Max in flight: {}", info.max_in_flight);
    println!("   └─ Connectivity: {}", info.connectivity);

    println!("\n📤 Dispatchers ({})", info.dispatchers.len());
    for (i, dispatcher) in info.dispatchers.iter().enumerate() {
        let prefix = if i == info.dispatchers.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} {} ({}, limit {})",
            prefix, dispatcher.name, dispatcher.kind, dispatcher.dispatch_limit
        );
    }

    if !info.barriers.is_empty() {
        println!("\n🚧 Barriers ({})", info.barriers.len());
        for (i, barrier) in info.barriers.iter().enumerate() {
            let prefix = if i == info.barriers.len() - 1 { "└─" } else { "├─" };
            let scopes = barrier
                .scopes
                .as_ref()
                .map(|s| s.join(", "))
                .unwrap_or_else(|| "default".to_string());
            println!("   {} {} [{}]", prefix, barrier.id, scopes);
            for (key, value) in &barrier.configuration {
                println!("         {} = {}", key, value);
            }
        }
    }

    if let Some(ref queue) = info.queue {
        println!("\n📬 Queue");
        println!("   ├─ Dispatches: {}", queue.dispatches);
        println!("   ├─ Queue entries: {}", queue.queue_entries);
        println!("   └─ Pending:");
        for (consumer, pending) in &queue.pending {
            println!("         {}: {}", consumer, pending);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Dispatch;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_read_queue_includes_unconfigured_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");
        let blueprint = config_loader::ConfigLoader::load_from_str(
            &format!(
                r#"
[store]
path = "{}"

[[dispatchers]]
name = "logger"
kind = "log"
"#,
                path.display()
            ),
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        {
            let store = DispatchStore::open(&path, StoreOptions::default()).unwrap();
            let consumers: HashSet<String> = HashSet::from(["old".to_string()]);
            store
                .enqueue(
                    Dispatch::new("d1", dispatch_store::now_millis(), Default::default()),
                    &consumers,
                )
                .await
                .unwrap();
        }

        let queue = read_queue(&blueprint).await.unwrap();
        assert_eq!(queue.dispatches, 1);
        assert_eq!(queue.queue_entries, 1);
        assert_eq!(queue.pending.get("logger"), Some(&0));
        assert_eq!(queue.pending.get("old"), Some(&1));

        let args = InfoArgs {
            config: PathBuf::from("beacon.toml"),
            store: None,
            json: true,
            pending: true,
            barriers: true,
        };
        let info = build_config_info(&blueprint, &args, Some(queue));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["queue"]["pending"]["old"], 1);
        assert_eq!(json["dispatchers"][0]["name"], "logger");
    }
}
