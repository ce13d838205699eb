// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background eviction driven by simulated time.

use std::time::Duration;

use compass::{DiscoveryCache, DiscoveryOptions, HOUSEKEEPING_INTERVAL, SharedConfig};
use compass_source::{DeploymentId, Node, testing::MockFactory};
use tick::ClockControl;

const LIFETIME: Duration = Duration::from_secs(60);

fn id() -> DeploymentId {
    DeploymentId::new("orders", "eu-north")
}

fn config() -> SharedConfig {
    SharedConfig::new(DiscoveryOptions {
        default_source_type: "mock".to_owned(),
        monitoring_lifetime_secs: LIFETIME.as_secs(),
        ..DiscoveryOptions::default()
    })
}

/// Gives the janitor task a chance to run on the current-thread runtime.
async fn let_janitor_run() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn janitor_evicts_idle_deployment_and_releases_once() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", vec![Node::new("10.3.0.1", 80)]).with_release();
    let cache = DiscoveryCache::builder(config(), control.to_clock())
        .factory(factory.clone())
        .build();

    cache.get_nodes(&id()).await.unwrap();
    let source = factory.last_created().unwrap();
    let_janitor_run().await;
    assert_eq!(cache.len(), 1);

    control.advance(LIFETIME + Duration::from_secs(1));
    let_janitor_run().await;

    assert!(cache.is_empty());
    assert_eq!(source.release_count(), 1);

    control.advance(HOUSEKEEPING_INTERVAL);
    let_janitor_run().await;
    assert_eq!(source.release_count(), 1);

    cache.shutdown().await;
    assert_eq!(source.release_count(), 1);
}

#[tokio::test]
async fn janitor_keeps_deployment_that_is_looked_up() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", vec![Node::new("10.3.0.1", 80)]);
    let cache = DiscoveryCache::builder(config(), control.to_clock())
        .factory(factory.clone())
        .build();

    for _ in 0..10 {
        cache.get_nodes(&id()).await.unwrap();
        control.advance(HOUSEKEEPING_INTERVAL);
        let_janitor_run().await;
    }

    assert_eq!(cache.len(), 1);
    assert_eq!(factory.attempts(), 1);
    cache.shutdown().await;
}

#[tokio::test]
async fn evicted_deployment_is_recreated_on_next_lookup() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", vec![Node::new("10.3.0.1", 80)]);
    let cache = DiscoveryCache::builder(config(), control.to_clock())
        .factory(factory.clone())
        .build();

    cache.get_nodes(&id()).await.unwrap();
    let_janitor_run().await;
    control.advance(LIFETIME * 2);
    let_janitor_run().await;
    assert!(cache.is_empty());

    assert_eq!(cache.get_nodes(&id()).await.unwrap(), Some(vec![Node::new("10.3.0.1", 80)]));
    assert_eq!(factory.attempts(), 2);
    cache.shutdown().await;
}

#[tokio::test]
async fn shutdown_wakes_sleeping_janitor_and_releases_everything() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", vec![Node::new("10.3.0.1", 80)]).with_release();
    let cache = DiscoveryCache::builder(config(), control.to_clock())
        .factory(factory.clone())
        .build();

    cache.get_nodes(&id()).await.unwrap();
    cache.get_nodes(&DeploymentId::new("orders", "us-west")).await.unwrap();
    let_janitor_run().await;

    // No time passes: the janitor is mid-sleep and must still stop promptly.
    cache.shutdown().await;

    assert!(cache.is_empty());
    assert_eq!(factory.created().len(), 2);
    assert!(factory.created().iter().all(|source| source.release_count() == 1));
}

#[tokio::test]
async fn pending_creation_is_not_released_on_shutdown() {
    let control = ClockControl::new();
    let factory = MockFactory::new("mock", vec![Node::new("10.3.0.1", 80)])
        .with_release()
        .with_pending_polls(usize::MAX);
    let cache = DiscoveryCache::builder(config(), control.to_clock())
        .factory(factory.clone())
        .build();

    // Poll a lookup once so its creation is in flight, then abandon it.
    let deployment = id();
    let mut pending = Box::pin(cache.get_nodes(&deployment));
    assert!(futures::poll!(pending.as_mut()).is_pending());
    drop(pending);

    assert_eq!(factory.attempts(), 1);

    cache.shutdown().await;

    assert!(cache.is_empty());
    assert!(factory.created().is_empty());
}
