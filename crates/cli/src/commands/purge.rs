//! `purge` command implementation.

use anyhow::{Context, Result};
use dispatch_store::{now_millis, DispatchStore, StoreOptions};
use tracing::info;

use crate::cli::PurgeArgs;

use super::load_blueprint;

/// What a purge removed
#[derive(Debug, Default, PartialEq, Eq)]
struct PurgeOutcome {
    consumer_entries: usize,
    expired: usize,
}

/// Execute the `purge` command
pub async fn run_purge(args: &PurgeArgs) -> Result<()> {
    let blueprint = load_blueprint(&args.config, args.store.as_ref())?;
    let store = DispatchStore::open(&blueprint.store.path, StoreOptions::from(&blueprint.store))
        .with_context(|| format!("Failed to open store {}", blueprint.store.path.display()))?;

    let outcome = purge(&store, args).await?;

    if let Some(ref consumer) = args.consumer {
        println!(
            "Removed {} queue entries of '{}'",
            outcome.consumer_entries, consumer
        );
    }
    if args.expired || args.older_than.is_some() {
        println!("Removed {} expired Dispatches", outcome.expired);
    }
    println!("Dispatches left: {}", store.size().await?);

    Ok(())
}

async fn purge(store: &DispatchStore, args: &PurgeArgs) -> Result<PurgeOutcome> {
    let mut outcome = PurgeOutcome::default();

    if let Some(ref consumer) = args.consumer {
        outcome.consumer_entries = store.reset_consumer(consumer).await?;
        info!(consumer = %consumer, removed = outcome.consumer_entries, "Consumer queue reset");
    }

    if args.expired {
        outcome.expired = store.expire_stale().await?;
    } else if let Some(secs) = args.older_than {
        let age = i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000);
        let cutoff = now_millis().saturating_sub(age);
        outcome.expired = store.expire(cutoff).await?;
    }
    if outcome.expired > 0 {
        info!(removed = outcome.expired, "Expired Dispatches removed");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Dispatch;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn args(consumer: Option<&str>, older_than: Option<u64>) -> PurgeArgs {
        PurgeArgs {
            config: PathBuf::from("beacon.toml"),
            store: None,
            consumer: consumer.map(str::to_string),
            expired: false,
            older_than,
        }
    }

    async fn seeded_store() -> DispatchStore {
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let both: HashSet<String> = HashSet::from(["a".to_string(), "b".to_string()]);
        let now = now_millis();
        store
            .enqueue(Dispatch::new("old", now - 120_000, Default::default()), &both)
            .await
            .unwrap();
        store
            .enqueue(Dispatch::new("new", now, Default::default()), &both)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_purge_consumer() {
        let store = seeded_store().await;
        let outcome = purge(&store, &args(Some("a"), None)).await.unwrap();

        assert_eq!(outcome.consumer_entries, 2);
        assert_eq!(store.pending_count("a").await.unwrap(), 0);
        assert_eq!(store.pending_count("b").await.unwrap(), 2);
        assert_eq!(store.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = seeded_store().await;
        let outcome = purge(&store, &args(None, Some(60))).await.unwrap();

        assert_eq!(outcome.expired, 1);
        assert_eq!(store.size().await.unwrap(), 1);
        assert_eq!(store.pending_count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_older_than_huge_age_keeps_everything() {
        let store = seeded_store().await;
        let outcome = purge(&store, &args(None, Some(u64::MAX))).await.unwrap();

        assert_eq!(outcome.expired, 0);
        assert_eq!(store.size().await.unwrap(), 2);
    }
}
