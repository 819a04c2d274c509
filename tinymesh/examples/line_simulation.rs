use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use clap_derive::Parser;
use tinymesh::config::MeshConfig;
use tinymesh::frame::{PacketType, BROADCAST_ADDR, HOP_COUNT_MAX};
use tinymesh::node::MeshNode;
use tinymesh::shared::SharedMeshNode;
use tinymesh::stats::MeshStats;
use tinymesh::test_util::radio::{SimAir, SimRadio};
use tokio::time::sleep;
use tracing::{info, Level};

/// Runs a line of mesh nodes on a simulated radio medium: node 1 floods a broadcast, sends an
///  ACK request to the last node without knowing a route, and pings its neighbour
#[derive(Parser)]
struct Args {
    #[clap(long, default_value_t = 4)]
    nodes: u8,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.nodes < 2 || args.nodes > HOP_COUNT_MAX + 1 {
        return Err(anyhow!("number of nodes must be between 2 and {}", HOP_COUNT_MAX + 1));
    }

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let air = SimAir::with_tokio_clock();
    let radios = (1..=args.nodes)
        .map(|id| air.radio(id))
        .collect::<Vec<_>>();
    for id in 2..=args.nodes {
        air.link(id - 1, id);
    }

    let mut nodes: Vec<SharedMeshNode<SimRadio>> = Vec::new();
    for radio in radios {
        let id = radio.id();
        let node = MeshNode::init(MeshConfig::new(), id, true, &format!("node-{}", id), radio, true)?;
        let shared = SharedMeshNode::new(node);
        air.register_activity(id, shared.activity());

        let service = shared.clone();
        tokio::spawn(async move {
            service.run_service_loop(Duration::from_millis(1)).await;
        });
        nodes.push(shared);
    }
    // HELLOs sent before a neighbour's loop was registered are still queued
    for node in &nodes {
        node.activity().notify_one();
    }
    sleep(Duration::from_millis(50)).await;

    let first = &nodes[0];
    let last_id = args.nodes;

    info!("broadcasting from node 1");
    first.send(BROADCAST_ADDR, PacketType::Nack, b"HI", last_id - 1)?;
    sleep(Duration::from_millis(50)).await;

    info!("sending ACK request from node 1 to node {}", last_id);
    first.send(last_id, PacketType::AckRequest, b"PING", HOP_COUNT_MAX)?;
    sleep(Duration::from_millis(300)).await;

    info!("pinging node 2 from node 1");
    first.send(2, PacketType::AckRequest, &[], 1)?;
    sleep(Duration::from_millis(50)).await;

    for node in &nodes {
        node.with_node(|n| {
            let id = n.node_address();
            for route in n.routing_entries() {
                info!("node {}: route to {} via {} ({} hops, score {})", id, route.dst, route.next_hop, route.num_hops, route.score);
            }
            info!("node {}: {:?}, errors {:?}", id, n.statistics(), n.error_mask());

            while let Some(frame) = n.driver_mut().inbox.pop_data() {
                info!("node {} received {:?} from {}", id, String::from_utf8_lossy(frame.payload()), frame.nwk.src);
            }
        })?;
    }

    first.with_node(|n| {
        while let Some(ack) = n.driver_mut().inbox.pop_ack() {
            if ack.payload().len() == MeshStats::SERIALIZED_LEN {
                match MeshStats::deser(&mut ack.payload()) {
                    Ok(stats) => info!("ACK from node {} with statistics {:?}", ack.nwk.src, stats),
                    Err(e) => info!("ACK from node {} with unreadable statistics: {}", ack.nwk.src, e),
                }
            }
            else {
                info!("ACK from node {}: {:?}", ack.nwk.src, String::from_utf8_lossy(ack.payload()));
            }
        }
    })?;

    Ok(())
}
