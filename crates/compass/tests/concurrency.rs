// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lookups racing each other and the janitor on a multi-threaded runtime.

use std::{sync::Arc, time::Duration};

use compass::{DiscoveryCache, DiscoveryOptions, SharedConfig};
use compass_source::{DeploymentId, Node, testing::MockFactory};
use tick::{Clock, ClockControl};

const TASKS: usize = 32;

fn config() -> SharedConfig {
    SharedConfig::new(DiscoveryOptions {
        default_source_type: "mock".to_owned(),
        monitoring_lifetime_secs: 60,
        ..DiscoveryOptions::default()
    })
}

fn nodes() -> Vec<Node> {
    vec![Node::new("10.9.0.1", 7000), Node::new("10.9.0.2", 7000)]
}

async fn lookup_from_tasks(cache: &Arc<DiscoveryCache>, id: &DeploymentId) -> Vec<Option<Vec<Node>>> {
    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let cache = Arc::clone(cache);
            let id = id.clone();
            tokio::spawn(async move { cache.get_nodes(&id).await })
        })
        .collect();

    let mut results = Vec::with_capacity(TASKS);
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn first_lookups_from_many_threads_create_once() {
    let factory = MockFactory::new("mock", nodes()).with_pending_polls(50);
    let cache = Arc::new(
        DiscoveryCache::builder(config(), Clock::new_frozen())
            .factory(factory.clone())
            .build(),
    );
    let id = DeploymentId::new("ledger", "eu-west");

    let results = lookup_from_tasks(&cache, &id).await;

    assert_eq!(factory.attempts(), 1);
    assert!(results.iter().all(|r| r.as_deref() == Some(nodes().as_slice())));
    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn staleness_seen_from_many_threads_replaces_once() {
    let factory = MockFactory::new("mock", nodes()).with_release().with_pending_polls(50);
    let cache = Arc::new(
        DiscoveryCache::builder(config(), Clock::new_frozen())
            .factory(factory.clone())
            .build(),
    );
    let id = DeploymentId::new("ledger", "eu-west");

    cache.get_nodes(&id).await.unwrap();
    let stale = factory.last_created().unwrap();
    stale.mark_undeployed();

    let results = lookup_from_tasks(&cache, &id).await;

    assert_eq!(factory.attempts(), 2);
    assert_eq!(stale.release_count(), 1);
    assert!(results.iter().all(|r| r.as_deref() == Some(nodes().as_slice())));
    cache.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eviction_racing_lookups_releases_at_most_once() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", nodes()).with_release();
    let cache = Arc::new(
        DiscoveryCache::builder(config(), control.to_clock())
            .factory(factory.clone())
            .build(),
    );
    let ids: Vec<_> = (0..8).map(|i| DeploymentId::new("ledger", format!("zone-{i}"))).collect();

    for round in 0..20 {
        for id in &ids {
            cache.get_nodes(id).await.unwrap();
        }

        let evictor = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.evict_idle() })
        };
        if round % 2 == 0 {
            control.advance(Duration::from_secs(61));
        }
        let lookups = lookup_from_tasks(&cache, &ids[round % ids.len()]).await;
        evictor.await.unwrap();

        assert!(lookups.iter().all(|r| r.as_deref() == Some(nodes().as_slice())));
    }

    cache.shutdown().await;
    let created = factory.created();
    assert!(created.iter().all(|source| source.release_count() <= 1));
    assert!(created.iter().all(|source| source.reads_after_release() == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replacements_racing_lookups_never_read_released_sources() {
    let factory = MockFactory::new("mock", nodes()).with_release();
    let cache = Arc::new(
        DiscoveryCache::builder(config(), Clock::new_frozen())
            .factory(factory.clone())
            .build(),
    );
    let id = DeploymentId::new("ledger", "eu-west");

    for _ in 0..20 {
        cache.get_nodes(&id).await.unwrap();
        factory.last_created().unwrap().mark_undeployed();

        let lookups = lookup_from_tasks(&cache, &id).await;
        assert!(lookups.iter().all(|r| r.as_deref() == Some(nodes().as_slice())));
    }

    cache.shutdown().await;
    assert!(factory.created().iter().all(|source| source.reads_after_release() == 0));
}
