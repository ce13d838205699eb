// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use anyspawn::{JoinHandle, Spawner};
use futures::{
    channel::oneshot,
    future::{self, Either},
};
use tick::Clock;

use crate::cache::CacheState;

/// How long the janitor sleeps between eviction passes.
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to the background eviction task.
///
/// Dropping the handle drops the stop sender, which ends the task as well.
#[derive(Debug)]
pub(crate) struct Janitor {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Janitor {
    pub(crate) fn start(state: Arc<CacheState>, clock: Clock, spawner: &Spawner) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = spawner.spawn(run(state, clock, stopped));
        Self { stop, task }
    }

    /// Signals the task to stop and waits until it has.
    pub(crate) async fn stop(self) {
        // The task may already be gone if it observed the sender being dropped.
        let _ = self.stop.send(());
        self.task.await;
    }
}

async fn run(state: Arc<CacheState>, clock: Clock, mut stopped: oneshot::Receiver<()>) {
    tracing::event!(
        name: "compass.janitor.started",
        tracing::Level::DEBUG,
        interval_secs = HOUSEKEEPING_INTERVAL.as_secs(),
    );

    let mut evicted = 0;
    loop {
        evicted += state.evict_idle();

        // Stop requests and a dropped sender both resolve the receiver.
        if let Either::Right(_) = future::select(clock.delay(HOUSEKEEPING_INTERVAL), &mut stopped).await {
            break;
        }
    }

    tracing::event!(
        name: "compass.janitor.stopped",
        tracing::Level::DEBUG,
        evicted = evicted,
    );
}

#[cfg(test)]
mod tests {
    use compass_source::{Node, testing::MockFactory};
    use tick::ClockControl;

    use super::*;
    use crate::{DiscoveryCache, DiscoveryOptions, FactoryRegistry, LocalDeployments, SharedConfig, creator::SourceCreator};

    async fn yield_many() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn stop_ends_task_while_sleeping() {
        let control = ClockControl::new();
        let factory = MockFactory::new("mock", vec![Node::new("h", 1)]);
        let config = SharedConfig::new(DiscoveryOptions {
            default_source_type: "mock".to_owned(),
            ..DiscoveryOptions::default()
        });
        let cache = DiscoveryCache::builder(config, control.to_clock()).factory(factory).build();

        // Let the janitor finish its first pass and go to sleep.
        yield_many().await;

        cache.shutdown().await;
        assert!(format!("{cache:?}").contains("janitor_running: false"));
    }

    #[tokio::test]
    async fn dropped_sender_ends_task() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let creator = SourceCreator::new(
            Arc::new(SharedConfig::default()),
            FactoryRegistry::new(),
            None,
            LocalDeployments::default(),
        );
        let state = Arc::new(CacheState::new(creator, clock.clone(), None));

        let Janitor { stop, task } = Janitor::start(state, clock, &Spawner::new_tokio());
        drop(stop);

        task.await;
    }
}
