use anyhow::bail;

use crate::frame::{HOP_COUNT_MAX, RETRY_COUNT_MAX};

#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// number of retransmissions after the first transmission of a frame that requires an ACK
    pub retry_count: u8,

    /// base unit of ACK waiting time: a pending frame times out after `(1 + hops) * ack_timeout_ms`
    pub ack_timeout_ms: u32,
    /// hold-off of a repeater that has no route for an unaddressed frame, giving the destination
    ///  (or a repeater that knows the route) time to answer first. Must be shorter than
    ///  `ack_timeout_ms`.
    pub discovery_timeout_ms: u32,
    /// TTL used when the route to a destination is unknown, both for expected ACK times and for
    ///  rediscovery after a route broke
    pub route_discovery_hops: u8,

    /// TTL of the 'HELLO' broadcast sent on initialization
    pub hello_hops: u8,
    /// piggy-back this node's statistics on automatic ACK responses
    pub stats_in_ack: bool,

    pub air_rate_kbps: u32,
    /// radio framing around the payload: preamble, address and CRC
    pub frame_overhead_bytes: u32,
    pub slot_guard_us: u32,
}

impl MeshConfig {
    pub fn new() -> MeshConfig {
        MeshConfig {
            retry_count: 2,
            ack_timeout_ms: 8,
            discovery_timeout_ms: 4,
            route_discovery_hops: 3,
            hello_hops: 1,
            stats_in_ack: true,
            air_rate_kbps: 2000,
            frame_overhead_bytes: 9,
            slot_guard_us: 25,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry_count > RETRY_COUNT_MAX {
            bail!("retry count {} exceeds the maximum of {}", self.retry_count, RETRY_COUNT_MAX);
        }
        if self.ack_timeout_ms == 0 {
            bail!("ACK timeout must be positive");
        }
        if self.discovery_timeout_ms >= self.ack_timeout_ms {
            bail!("discovery timeout must be shorter than the ACK timeout");
        }
        if self.route_discovery_hops > HOP_COUNT_MAX {
            bail!("route discovery hops {} exceed the maximum of {}", self.route_discovery_hops, HOP_COUNT_MAX);
        }
        if self.hello_hops > HOP_COUNT_MAX {
            bail!("hello hops {} exceed the maximum of {}", self.hello_hops, HOP_COUNT_MAX);
        }
        if self.air_rate_kbps == 0 {
            bail!("air rate must be positive");
        }
        Ok(())
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig::new()
    }
}
