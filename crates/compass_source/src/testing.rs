// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock collaborators for testing.
//!
//! Every mock shares its state between clones, so a test can keep one clone as a probe while the
//! cache owns another.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use parking_lot::Mutex;

use crate::{
    DeploymentId, Error, LoadBalancer, LoadBalancerFactory, Node, NodeSource, NodeSourceFactory, ReachabilityCheck,
    RegistryClient, Releasable, Result, TrafficRouting,
};

#[derive(Debug)]
struct SourceState {
    deployment: DeploymentId,
    source_type: String,
    nodes: Mutex<Vec<Node>>,
    undeployed: AtomicBool,
    releasable: bool,
    releases: AtomicUsize,
    fail_release: AtomicBool,
    reads_after_release: AtomicUsize,
}

impl SourceState {
    fn new(deployment: DeploymentId, source_type: String, nodes: Vec<Node>, releasable: bool) -> Self {
        Self {
            deployment,
            source_type,
            nodes: Mutex::new(nodes),
            undeployed: AtomicBool::new(false),
            releasable,
            releases: AtomicUsize::new(0),
            fail_release: AtomicBool::new(false),
            reads_after_release: AtomicUsize::new(0),
        }
    }

    fn record_read(&self) {
        if self.releases.load(Ordering::Acquire) > 0 {
            self.reads_after_release.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// A node source whose state is driven by the test.
///
/// # Examples
///
/// ```
/// use compass_source::{DeploymentId, Node, NodeSource, testing::MockNodeSource};
///
/// let id = DeploymentId::new("payments", "eu-west");
/// let source = MockNodeSource::new(id, "mock", vec![Node::new("10.0.0.1", 80)]).with_release();
/// let probe = source.clone();
///
/// probe.mark_undeployed();
/// assert!(source.was_undeployed());
/// assert_eq!(probe.release_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockNodeSource(Arc<SourceState>);

impl MockNodeSource {
    /// Creates a deployed source of `deployment` without releasable resources.
    #[must_use]
    pub fn new(deployment: DeploymentId, source_type: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self(Arc::new(SourceState::new(deployment, source_type.into(), nodes, false)))
    }

    /// Makes the source advertise the [`Releasable`] capability.
    #[must_use]
    pub fn with_release(self) -> Self {
        let state = &self.0;
        let releasable = SourceState::new(
            state.deployment.clone(),
            state.source_type.clone(),
            state.nodes.lock().clone(),
            true,
        );
        releasable
            .undeployed
            .store(state.undeployed.load(Ordering::Acquire), Ordering::Release);
        Self(Arc::new(releasable))
    }

    /// The deployment the source was created for.
    #[must_use]
    pub fn deployment(&self) -> &DeploymentId {
        &self.0.deployment
    }

    /// Latches the undeployed flag.
    pub fn mark_undeployed(&self) {
        self.0.undeployed.store(true, Ordering::Release);
    }

    /// Replaces the nodes reported by the source.
    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.0.nodes.lock() = nodes;
    }

    /// Makes every subsequent release fail.
    pub fn fail_release(&self) {
        self.0.fail_release.store(true, Ordering::Release);
    }

    /// How many times [`Releasable::release`] was called.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.0.releases.load(Ordering::Acquire)
    }

    /// How many [`nodes`](NodeSource::nodes) or [`was_undeployed`](NodeSource::was_undeployed)
    /// calls happened after the first release began.
    #[must_use]
    pub fn reads_after_release(&self) -> usize {
        self.0.reads_after_release.load(Ordering::Acquire)
    }
}

impl NodeSource for MockNodeSource {
    fn source_type(&self) -> &str {
        &self.0.source_type
    }

    fn was_undeployed(&self) -> bool {
        self.0.record_read();
        self.0.undeployed.load(Ordering::Acquire)
    }

    fn nodes(&self) -> Vec<Node> {
        self.0.record_read();
        self.0.nodes.lock().clone()
    }

    fn as_releasable(&self) -> Option<&dyn Releasable> {
        self.0.releasable.then_some(self as &dyn Releasable)
    }
}

impl Releasable for MockNodeSource {
    fn release(&self) -> Result<()> {
        self.0.releases.fetch_add(1, Ordering::AcqRel);
        if self.0.fail_release.load(Ordering::Acquire) {
            return Err(Error::release(&self.0.deployment, "injected release failure"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FactoryState {
    source_type: String,
    nodes: Mutex<Vec<Node>>,
    releasable: bool,
    pending_polls: AtomicUsize,
    failure: Mutex<Option<String>>,
    created: Mutex<Vec<MockNodeSource>>,
    attempts: AtomicUsize,
}

/// A node source factory that records every creation.
///
/// Each successful creation yields a fresh [`MockNodeSource`]; handles to all of them are kept so
/// the test can flip their state afterwards.
#[derive(Debug, Clone)]
pub struct MockFactory(Arc<FactoryState>);

impl MockFactory {
    /// Creates a factory for `source_type` producing sources that report `nodes`.
    #[must_use]
    pub fn new(source_type: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self(Arc::new(FactoryState {
            source_type: source_type.into(),
            nodes: Mutex::new(nodes),
            releasable: false,
            pending_polls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }))
    }

    /// Makes created sources advertise the [`Releasable`] capability.
    #[must_use]
    pub fn with_release(self) -> Self {
        let state = &self.0;
        Self(Arc::new(FactoryState {
            source_type: state.source_type.clone(),
            nodes: Mutex::new(state.nodes.lock().clone()),
            releasable: true,
            pending_polls: AtomicUsize::new(state.pending_polls.load(Ordering::Acquire)),
            failure: Mutex::new(state.failure.lock().clone()),
            created: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }))
    }

    /// Makes every creation stay pending for `polls` polls before completing, so concurrent
    /// callers get a chance to pile up behind it.
    #[must_use]
    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.0.pending_polls.store(polls, Ordering::Release);
        self
    }

    /// Makes subsequent creations fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.0.failure.lock() = Some(message.into());
    }

    /// Makes subsequent creations succeed again.
    pub fn succeed(&self) {
        *self.0.failure.lock() = None;
    }

    /// Changes the nodes reported by subsequently created sources.
    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.0.nodes.lock() = nodes;
    }

    /// How many creations were attempted, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.0.attempts.load(Ordering::Acquire)
    }

    /// The sources created so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<MockNodeSource> {
        self.0.created.lock().clone()
    }

    /// The most recently created source.
    #[must_use]
    pub fn last_created(&self) -> Option<MockNodeSource> {
        self.0.created.lock().last().cloned()
    }
}

impl NodeSourceFactory for MockFactory {
    fn source_type(&self) -> &str {
        &self.0.source_type
    }

    async fn try_create(&self, deployment: &DeploymentId) -> Result<Arc<dyn NodeSource>> {
        self.0.attempts.fetch_add(1, Ordering::AcqRel);
        PendingFor(self.0.pending_polls.load(Ordering::Acquire)).await;

        if let Some(message) = self.0.failure.lock().clone() {
            return Err(Error::creation(deployment, message));
        }

        let mut source = MockNodeSource::new(deployment.clone(), self.0.source_type.clone(), self.0.nodes.lock().clone());
        if self.0.releasable {
            source = source.with_release();
        }
        self.0.created.lock().push(source.clone());
        Ok(Arc::new(source))
    }
}

/// Stays pending for the given number of polls, waking itself each time.
struct PendingFor(usize);

impl Future for PendingFor {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 == 0 {
            return Poll::Ready(());
        }
        self.0 -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// A registry client backed by an in-memory table.
///
/// Deployments missing from the table are reported as not deployed.
#[derive(Debug, Clone, Default)]
pub struct MockRegistryClient {
    deployments: Arc<Mutex<HashMap<DeploymentId, Vec<Node>>>>,
    failure: Arc<Mutex<Option<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl MockRegistryClient {
    /// Creates a client with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the nodes of `deployment`.
    pub fn deploy(&self, deployment: DeploymentId, nodes: Vec<Node>) {
        self.deployments.lock().insert(deployment, nodes);
    }

    /// Removes `deployment` from the registry.
    pub fn undeploy(&self, deployment: &DeploymentId) {
        self.deployments.lock().remove(deployment);
    }

    /// Makes subsequent fetches fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Makes subsequent fetches succeed again.
    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// How many fetches were performed.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }
}

impl RegistryClient for MockRegistryClient {
    async fn fetch(&self, deployment: &DeploymentId) -> Result<Option<Vec<Node>>> {
        self.fetches.fetch_add(1, Ordering::AcqRel);
        if let Some(message) = self.failure.lock().clone() {
            return Err(Error::creation(deployment, message));
        }
        Ok(self.deployments.lock().get(deployment).cloned())
    }
}

/// The load balancer produced by [`MockLoadBalancerFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLoadBalancer {
    /// The deployment the load balancer was created for.
    pub deployment: DeploymentId,
    /// The reachability check it was created with.
    pub reachability: ReachabilityCheck,
    /// The traffic routing it was created with.
    pub routing: TrafficRouting,
}

impl LoadBalancer for MockLoadBalancer {
    fn deployment(&self) -> &DeploymentId {
        &self.deployment
    }
}

/// A load balancer factory that records every construction.
#[derive(Debug, Clone, Default)]
pub struct MockLoadBalancerFactory {
    created: Arc<Mutex<Vec<MockLoadBalancer>>>,
}

impl MockLoadBalancerFactory {
    /// Creates a factory that has not built anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The load balancers built so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<MockLoadBalancer> {
        self.created.lock().clone()
    }
}

impl LoadBalancerFactory for MockLoadBalancerFactory {
    fn create(&self, deployment: &DeploymentId, reachability: ReachabilityCheck, routing: TrafficRouting) -> Arc<dyn LoadBalancer> {
        let balancer = MockLoadBalancer {
            deployment: deployment.clone(),
            reachability,
            routing,
        };
        self.created.lock().push(balancer.clone());
        Arc::new(balancer)
    }
}
