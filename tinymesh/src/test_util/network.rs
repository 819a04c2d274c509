use std::collections::BTreeMap;

use anyhow::bail;
use tracing::debug;

use crate::config::MeshConfig;
use crate::node::MeshNode;
use crate::test_util::radio::{SimAir, SimRadio};

pub type SimNode = MeshNode<SimRadio>;

/// Upper bound for servicing rounds within a single millisecond, so a forwarding loop shows up as
///  a test failure rather than a hang
const MAX_ROUNDS_PER_TICK: usize = 1000;

/// Several nodes on a shared [SimAir] medium, serviced in order of their addresses
#[derive(Debug, Default)]
pub struct SimMesh {
    air: SimAir,
    nodes: BTreeMap<u8, SimNode>,
}

impl SimMesh {
    pub fn new() -> SimMesh {
        SimMesh::default()
    }

    /// Repeater nodes `1..=num_nodes` named `node-<id>`, each linked to its predecessor
    pub fn line(num_nodes: u8, config: &MeshConfig) -> anyhow::Result<SimMesh> {
        let mut result = SimMesh::new();
        for id in 1..=num_nodes {
            result.add_node(id, config.clone(), true, &format!("node-{}", id))?;
            if id > 1 {
                result.air.link(id - 1, id);
            }
        }
        Ok(result)
    }

    pub fn add_node(&mut self, id: u8, config: MeshConfig, is_repeater: bool, name: &str) -> anyhow::Result<&mut SimNode> {
        if self.nodes.contains_key(&id) {
            bail!("node {} exists already", id);
        }
        let node = MeshNode::init(config, id, is_repeater, name, self.air.radio(id), false)?;
        Ok(self.nodes.entry(id).or_insert(node))
    }

    pub fn air(&self) -> &SimAir {
        &self.air
    }

    pub fn node(&self, id: u8) -> &SimNode {
        self.nodes.get(&id)
            .unwrap_or_else(|| panic!("no node {}", id))
    }

    pub fn node_mut(&mut self, id: u8) -> &mut SimNode {
        self.nodes.get_mut(&id)
            .unwrap_or_else(|| panic!("no node {}", id))
    }

    /// Service nodes until no online node has a frame waiting
    pub fn settle(&mut self) {
        for _ in 0..MAX_ROUNDS_PER_TICK {
            let mut any_received = false;
            for (id, node) in self.nodes.iter_mut() {
                if !self.air.is_offline(*id) && self.air.has_rx(*id) {
                    node.service();
                    any_received = true;
                }
            }
            if !any_received {
                return;
            }
        }
        panic!("mesh did not settle within {} rounds", MAX_ROUNDS_PER_TICK);
    }

    /// Advance the clock one millisecond at a time, servicing every online node on each tick
    pub fn run_for(&mut self, duration_ms: u32) {
        for _ in 0..duration_ms {
            self.air.advance_ms(1);
            for (id, node) in self.nodes.iter_mut() {
                if !self.air.is_offline(*id) {
                    node.service();
                }
            }
            self.settle();
        }
        debug!("simulation at {} ms", self.air.now_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_topology() {
        let mesh = SimMesh::line(3, &MeshConfig::new()).unwrap();
        assert_eq!(mesh.node(2).node_name(), b"node-2");
        assert!(mesh.node(3).is_repeater());
        assert_eq!(mesh.node(1).routing_entry_count(), 0);
    }

    #[test]
    fn test_add_node_rejects_invalid_address() {
        let mut mesh = SimMesh::new();
        assert!(mesh.add_node(0, MeshConfig::new(), true, "zero").is_err());
        mesh.add_node(1, MeshConfig::new(), true, "one").unwrap();
        assert!(mesh.add_node(1, MeshConfig::new(), true, "again").is_err());
    }
}
