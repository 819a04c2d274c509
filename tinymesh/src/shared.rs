use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use anyhow::anyhow;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::driver::MeshDriver;
use crate::frame::PacketType;
use crate::node::MeshNode;

/// A [MeshNode] shared between the service loop and application code on other threads or tasks.
///
/// While any caller holds the node (e.g. during [SharedMeshNode::send]), [SharedMeshNode::service]
///  returns immediately without doing anything: the caller that holds the node notifies the
///  service loop afterwards, so servicing is deferred rather than lost.
pub struct SharedMeshNode<D: MeshDriver, const NODES: usize = 4, const PENDING: usize = 2> {
    node: Arc<Mutex<MeshNode<D, NODES, PENDING>>>,
    activity: Arc<Notify>,
}

impl <D: MeshDriver, const NODES: usize, const PENDING: usize> Clone for SharedMeshNode<D, NODES, PENDING> {
    fn clone(&self) -> Self {
        SharedMeshNode {
            node: self.node.clone(),
            activity: self.activity.clone(),
        }
    }
}

impl <D: MeshDriver, const NODES: usize, const PENDING: usize> SharedMeshNode<D, NODES, PENDING> {
    pub fn new(node: MeshNode<D, NODES, PENDING>) -> Self {
        SharedMeshNode {
            node: Arc::new(Mutex::new(node)),
            activity: Arc::new(Notify::new()),
        }
    }

    /// Radio drivers notify this when a frame arrives, waking up the service loop
    pub fn activity(&self) -> Arc<Notify> {
        self.activity.clone()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<MeshNode<D, NODES, PENDING>>> {
        self.node.lock()
            .map_err(|_| anyhow!("mesh node lock is poisoned"))
    }

    /// Returns false if the node was busy and servicing was skipped
    pub fn service(&self) -> bool {
        match self.node.try_lock() {
            Ok(mut node) => {
                node.service();
                true
            }
            Err(TryLockError::WouldBlock) => {
                trace!("mesh node is busy - skipping service");
                false
            }
            Err(TryLockError::Poisoned(_)) => {
                warn!("mesh node lock is poisoned - skipping service");
                false
            }
        }
    }

    pub fn send(&self, dst: u8, pkt_type: PacketType, payload: &[u8], hop_count_max: u8) -> anyhow::Result<()> {
        let result = self.lock()?.send(dst, pkt_type, payload, hop_count_max);
        self.activity.notify_one();
        result
    }

    /// Exclusive access to the node, e.g. for queries or the application's inbox
    pub fn with_node<R>(&self, f: impl FnOnce(&mut MeshNode<D, NODES, PENDING>) -> R) -> anyhow::Result<R> {
        let mut node = self.lock()?;
        Ok(f(&mut node))
    }

    pub fn pending_packet_count(&self) -> u8 {
        self.with_node(|n| n.pending_packet_count())
            .unwrap_or(0)
    }

    fn rx_pending(&self) -> bool {
        self.with_node(|n| n.driver().rx_pending())
            .unwrap_or(false)
    }

    /// Service the node whenever the radio signals activity, and at least every `tick` while
    ///  frames are pending so their retries go out in time. Runs until the surrounding task is
    ///  dropped.
    pub async fn run_service_loop(&self, tick: Duration) {
        debug!("starting mesh service loop");

        loop {
            if self.pending_packet_count() > 0 {
                select! {
                    _ = self.activity.notified() => {}
                    _ = sleep(tick) => {}
                }
            }
            else {
                self.activity.notified().await;
            }

            loop {
                self.service();
                if !self.rx_pending() {
                    break;
                }
            }
        }
    }
}
