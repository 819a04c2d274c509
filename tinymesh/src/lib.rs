//! A mesh networking engine for fleets of low-power radios with small fixed-size frames. Every
//!  node has an 8-bit address (1 to 254) and may act as a repeater for other nodes' traffic.
//!
//! The engine provides
//! * unicast with automatic acknowledgment and retries
//! * broadcasts, flooded with a hop limit
//! * on-demand route discovery and passive learning of routes from overheard traffic
//! * duplicate suppression
//!
//! It does not allocate: all tables have fixed sizes given by const generics, and entries are
//!  evicted when a table is full.
//!
//! ## Frame layout
//!
//! Every frame is exactly 32 bytes on the air:
//!
//! ```ascii
//! 0:  nwk.src        original sender
//! 1:  nwk.dst        final destination (255 for broadcast)
//! 2:  mac.src        node transmitting this hop
//! 3:  mac.dst        next hop (0 if unknown: any repeater may carry the frame)
//! 4:  info           bits 0-2: protocol version (3)
//!                    bits 3-5: retries remaining
//!                    bits 6-7: packet type (NACK, ACK_REQUEST, APP_ACK_REQUEST, ACK_RESPONSE)
//! 5:  hops           bits 0-3: hop count
//!                    bits 4-7: hop count max
//! 6:  seq            sequence number per sender, wrapping
//! 7:  data_len
//! 8:  data           24 bytes
//! ```
//!
//! ## Routing
//!
//! Each node records the MAC sender of every frame it receives as a direct neighbour. When a frame
//!  arrives through a repeater, the frame's original sender is recorded as reachable through that
//!  repeater, with the frame's hop count as distance.
//!
//! A frame to a destination without known route goes out with `mac.dst = 0`. Repeaters that do
//!  not know a route either hold it back briefly (giving the destination or a better-informed
//!  repeater a chance to answer first) and then repeat it, while repeaters that do know a route
//!  forward it to their next hop. The destination's response travels back along the learned
//!  routes, teaching every node on the way where the destination is.
//!
//! Frames requiring an acknowledgment are kept by their sender and by every repeater that
//!  forwards them to a known next hop, and retransmitted until the next hop is heard carrying
//!  them on or the ACK arrives. When an origin runs out of retries on a route through an
//!  intermediate node, it drops the route and starts over with route discovery.
//!
//! ## Driving a node
//!
//! A [node::MeshNode] owns a [driver::MeshDriver] that gives access to the radio, a millisecond
//!  clock and the application. It does nothing on its own: the host calls
//!  [node::MeshNode::service] whenever the radio signals a received frame, and regularly while
//!  [node::MeshNode::pending_packet_count] is positive. [shared::SharedMeshNode] packages this
//!  as an async service loop for hosts that send from other tasks.

pub mod backoff;
pub mod config;
pub mod driver;
pub mod error_mask;
pub mod frame;
pub mod history;
pub mod inbox;
pub mod node;
pub mod payload;
pub mod pending;
pub mod routing;
pub mod shared;
pub mod stats;
pub mod test_util;
pub mod util;

#[cfg(test)]
mod mesh_tests;
