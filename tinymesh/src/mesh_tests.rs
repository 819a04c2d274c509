//! End-to-end behaviour of several nodes on the simulated radio medium

use crate::backoff::slot_time_us;
use crate::config::MeshConfig;
use crate::frame::{AddrPair, Frame, FrameInfo, PacketType, BROADCAST_ADDR, DATA_SIZE, MESH_VERSION, ZERO_ADDR};
use crate::stats::MeshStats;
use crate::test_util::network::SimMesh;

fn line(num_nodes: u8) -> SimMesh {
    SimMesh::line(num_nodes, &MeshConfig::new()).unwrap()
}

fn assert_invariants(mesh: &SimMesh, ids: &[u8]) {
    for t in mesh.air().transmissions() {
        assert!(t.frame.info.hop_count <= t.frame.info.hop_count_max, "{:?}", t);
        assert_eq!(t.frame.mac.src, t.from);
    }
    for &id in ids {
        for route in mesh.node(id).routing_entries() {
            assert_ne!(route.dst, ZERO_ADDR);
            assert_ne!(route.dst, BROADCAST_ADDR);
            assert_ne!(route.dst, id);
        }
    }
}

/// Four nodes in a line after node 1 sent an ACK request to node 4 without knowing a route
fn line_after_discovery() -> SimMesh {
    let mut mesh = line(4);
    mesh.node_mut(1).send(4, PacketType::AckRequest, b"PING", 15).unwrap();
    mesh.run_for(50);
    mesh
}

#[test]
fn test_broadcast_flood() {
    let mut mesh = line(4);
    mesh.node_mut(1).send(BROADCAST_ADDR, PacketType::Nack, b"HI", 3).unwrap();
    mesh.run_for(20);

    for id in 2..=4 {
        let inbox = &mesh.node(id).driver().inbox;
        assert_eq!(inbox.data_len(), 1, "node {}", id);
        assert_eq!(inbox.data().next().unwrap().payload(), b"HI");
    }
    assert_eq!(mesh.node(1).driver().inbox.data_len(), 0);

    let transmissions = mesh.air().transmissions();
    assert_eq!(transmissions.iter().map(|t| t.from).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(transmissions.iter().map(|t| t.frame.info.hop_count).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_invariants(&mesh, &[1, 2, 3, 4]);
}

#[test]
fn test_unicast_discovers_route() {
    let mesh = line_after_discovery();

    let n2_route = mesh.node(2).routing_entries().find(|r| r.dst == 4).copied().unwrap();
    assert_eq!((n2_route.next_hop, n2_route.num_hops), (3, 1));
    let n3_route = mesh.node(3).routing_entries().find(|r| r.dst == 4).copied().unwrap();
    assert_eq!((n3_route.next_hop, n3_route.num_hops), (4, 0));
    let n1_route = mesh.node(1).routing_entries().find(|r| r.dst == 4).copied().unwrap();
    assert_eq!((n1_route.next_hop, n1_route.num_hops), (2, 2));

    let n4_inbox = &mesh.node(4).driver().inbox;
    assert_eq!(n4_inbox.data_len(), 1);
    assert_eq!(n4_inbox.data().next().unwrap().payload(), b"PING");

    let n1_inbox = &mesh.node(1).driver().inbox;
    assert_eq!(n1_inbox.ack_len(), 1);
    let ack = n1_inbox.acks().next().copied().unwrap();
    assert!(ack.is_ack_ok(4));

    let n4_stats = MeshStats::deser(&mut ack.payload()).unwrap();
    assert_eq!(n4_stats.pkts_intercepted, 1);
    assert_eq!(n4_stats.pkts_sent, 0);
    let mut reader = ack.reader();
    reader.skip(2).unwrap();
    assert_eq!(reader.get_u16().unwrap(), 1);

    assert_eq!(mesh.air().transmissions_from(1).len(), 1);
    for id in 1..=4 {
        assert_eq!(mesh.node(id).pending_packet_count(), 0, "node {}", id);
    }
    assert_invariants(&mesh, &[1, 2, 3, 4]);
}

#[test]
fn test_only_repeaters_of_discovery_frames_back_off() {
    let mesh = line_after_discovery();
    let slot_us = slot_time_us(&MeshConfig::new());

    for id in [1, 4] {
        assert!(mesh.node(id).driver().backoffs.is_empty(), "node {}", id);
    }
    for id in [2, 3] {
        let backoffs = &mesh.node(id).driver().backoffs;
        assert_eq!(backoffs.len(), 1, "node {}", id);
        assert_eq!(backoffs[0] % slot_us, 0);
        assert!((1..=4).contains(&(backoffs[0] / slot_us)), "node {}: {}", id, backoffs[0]);
    }
}

#[test]
fn test_application_acknowledges_over_known_route() {
    let mut mesh = line(3);
    mesh.node_mut(1).send(3, PacketType::AckRequest, b"PING", 15).unwrap();
    mesh.run_for(50);
    assert!(mesh.node(1).is_route_known(3));

    let sent_by_3 = mesh.air().transmissions_from(3).len();
    mesh.node_mut(1).send(3, PacketType::AppAckRequest, b"APP", 15).unwrap();
    mesh.run_for(1);

    // no automatic ACK: the application answers
    assert_eq!(mesh.air().transmissions_from(3).len(), sent_by_3);
    assert_eq!(mesh.node(1).pending_packet_count(), 1);

    let request = mesh.node(3).driver().inbox.data().last().copied().unwrap();
    assert_eq!(request.payload(), b"APP");
    assert!(request.is_ack_required());

    mesh.node_mut(3).send_ack(b"OK", &request).unwrap();
    mesh.run_for(10);

    let ack = mesh.node(1).driver().inbox.acks().last().copied().unwrap();
    assert!(ack.is_ack_ok(3));
    assert_eq!(ack.payload(), b"OK");
    for id in 1..=3 {
        assert_eq!(mesh.node(id).pending_packet_count(), 0, "node {}", id);
    }
    assert_eq!(mesh.air().transmissions_from(3).len(), sent_by_3 + 1);
    assert_invariants(&mesh, &[1, 2, 3]);
}

#[test]
fn test_route_loss_triggers_rediscovery() {
    let mut mesh = line_after_discovery();
    mesh.air().clear_transmissions();
    mesh.air().set_offline(2, true);

    mesh.node_mut(1).send(4, PacketType::AckRequest, b"AGAIN", 15).unwrap();
    mesh.run_for(200);

    let sent = mesh.air().transmissions_from(1);
    assert_eq!(sent.len(), 6);
    for t in &sent[..3] {
        assert_eq!(t.frame.mac.dst, 2);
        assert_eq!(t.frame.info.hop_count_max, 2);
    }
    for t in &sent[3..] {
        assert_eq!(t.frame.mac.dst, ZERO_ADDR);
        assert_eq!(t.frame.info.hop_count_max, 3);
    }
    assert_eq!(sent[3].at_ms - sent[0].at_ms, 72);

    let n1 = mesh.node(1);
    assert!(!n1.is_route_known(4));
    assert_eq!(n1.pending_packet_count(), 0);
    assert_eq!(n1.statistics().pkts_retried, 5);

    mesh.air().clear_transmissions();
    mesh.node_mut(1).send(4, PacketType::AckRequest, b"AGAIN", 3).unwrap();
    let next = mesh.air().transmissions_from(1);
    assert_eq!(next[0].frame.mac, AddrPair { src: 1, dst: ZERO_ADDR });
    assert_eq!(next[0].frame.info.hop_count_max, 3);
}

#[test]
fn test_rediscovery_finds_new_neighbour() {
    let mut mesh = line_after_discovery();
    mesh.air().set_offline(2, true);
    mesh.add_node(5, MeshConfig::new(), true, "node-5").unwrap();
    mesh.air().link(1, 5);
    mesh.air().link(5, 3);
    mesh.air().clear_transmissions();

    mesh.node_mut(1).send(4, PacketType::AckRequest, b"AGAIN", 15).unwrap();
    mesh.run_for(200);

    assert_eq!(mesh.air().transmissions_from(1).len(), 4);

    let n4_inbox = &mesh.node(4).driver().inbox;
    assert_eq!(n4_inbox.data().last().unwrap().payload(), b"AGAIN");
    assert_eq!(mesh.node(1).driver().inbox.ack_len(), 2);

    let n1_route = mesh.node(1).routing_entries().find(|r| r.dst == 4).copied().unwrap();
    assert_eq!((n1_route.next_hop, n1_route.num_hops), (5, 2));
    let n3_route = mesh.node(3).routing_entries().find(|r| r.dst == 1).copied().unwrap();
    assert_eq!((n3_route.next_hop, n3_route.num_hops), (5, 1));

    for id in [1, 3, 4, 5] {
        assert_eq!(mesh.node(id).pending_packet_count(), 0, "node {}", id);
    }
    assert_invariants(&mesh, &[1, 3, 4, 5]);
}

#[test]
fn test_duplicate_through_two_repeaters() {
    let mut mesh = SimMesh::new();
    for id in [1, 2, 3, 5] {
        mesh.add_node(id, MeshConfig::new(), true, "n").unwrap();
    }
    mesh.air().link(1, 2);
    mesh.air().link(2, 3);
    mesh.air().link(1, 5);
    mesh.air().link(5, 3);

    for _ in 0..6 {
        mesh.node_mut(1).form_packet(3, PacketType::Nack, 2, &[]).unwrap();
    }
    mesh.node_mut(1).send(3, PacketType::Nack, b"X", 2).unwrap();
    assert_eq!(mesh.air().transmissions()[0].frame.info.pkt_seq_num, 7);
    mesh.run_for(50);

    assert_eq!(mesh.node(3).driver().inbox.data_len(), 1);
    assert!(mesh.node(2).is_route_known(1));
    assert!(mesh.node(5).is_route_known(1));
    for id in [1, 2, 3, 5] {
        assert_eq!(mesh.node(id).pending_packet_count(), 0, "node {}", id);
    }
    assert_invariants(&mesh, &[1, 2, 3, 5]);
}

fn relayed_frame(pkt_type: PacketType, via: u8, retries: u8) -> Frame {
    let mut data = [0u8; DATA_SIZE];
    data[0] = b'X';
    Frame {
        nwk: AddrPair { src: 1, dst: 3 },
        mac: AddrPair { src: via, dst: ZERO_ADDR },
        info: FrameInfo {
            version: MESH_VERSION,
            retries_remaining: retries,
            pkt_type,
            hop_count: 1,
            hop_count_max: 2,
            pkt_seq_num: 7,
            data_len: 1,
        },
        data,
    }
}

#[test]
fn test_same_frame_from_two_repeaters_is_delivered_once() {
    let mut mesh = SimMesh::new();
    mesh.add_node(3, MeshConfig::new(), true, "n").unwrap();

    mesh.air().inject(3, &relayed_frame(PacketType::Nack, 2, 2));
    mesh.air().inject(3, &relayed_frame(PacketType::Nack, 5, 2));
    mesh.settle();

    let n3 = mesh.node(3);
    assert_eq!(n3.driver().inbox.data_len(), 1);
    assert!(n3.is_route_known(2));
    assert!(n3.is_route_known(5));
    let route = n3.routing_entries().find(|r| r.dst == 1).copied().unwrap();
    assert_eq!((route.next_hop, route.num_hops), (2, 1));
}

#[test]
fn test_retried_duplicate_is_acknowledged_again() {
    let mut mesh = SimMesh::new();
    mesh.add_node(3, MeshConfig::new(), true, "n").unwrap();

    mesh.air().inject(3, &relayed_frame(PacketType::AckRequest, 2, 2));
    mesh.settle();
    mesh.air().inject(3, &relayed_frame(PacketType::AckRequest, 5, 1));
    mesh.settle();
    mesh.air().inject(3, &relayed_frame(PacketType::AckRequest, 5, 1));
    mesh.settle();

    assert_eq!(mesh.node(3).driver().inbox.data_len(), 1);

    let acks = mesh.air().transmissions_from(3);
    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|t| t.frame.info.pkt_type == PacketType::AckResponse && t.frame.nwk.dst == 1));
}

#[test]
fn test_ping_carries_node_name() {
    let mut mesh = line(2);
    mesh.node_mut(1).send(2, PacketType::AckRequest, &[], 1).unwrap();
    mesh.run_for(5);

    assert_eq!(mesh.node(2).driver().inbox.data_len(), 0);
    let ack = mesh.node(1).driver().inbox.acks().next().copied().unwrap();
    assert!(ack.is_ack_ok(2));
    assert_eq!(ack.payload(), b"node-2");
}

#[test]
fn test_ping_truncates_long_node_name() {
    let name = "a-rather-long-node-name-beyond-a-frame";

    let mut mesh = SimMesh::new();
    mesh.add_node(1, MeshConfig::new(), true, "n").unwrap();
    mesh.add_node(2, MeshConfig::new(), true, name).unwrap();
    mesh.air().link(1, 2);

    mesh.node_mut(1).send(2, PacketType::AckRequest, &[], 1).unwrap();
    mesh.run_for(5);

    let ack = mesh.node(1).driver().inbox.acks().next().copied().unwrap();
    assert_eq!(ack.payload(), &name.as_bytes()[..DATA_SIZE]);
}

#[test]
fn test_route_scores_halve_on_saturation() {
    let mut mesh = SimMesh::new();
    mesh.add_node(1, MeshConfig::new(), true, "n").unwrap();

    let mut from_2 = relayed_frame(PacketType::Nack, 2, 2);
    from_2.nwk = AddrPair { src: 2, dst: 1 };
    from_2.mac = AddrPair { src: 2, dst: 1 };
    let mut via_2 = relayed_frame(PacketType::Nack, 2, 2);
    via_2.nwk = AddrPair { src: 9, dst: 1 };
    via_2.mac = AddrPair { src: 2, dst: 1 };
    let mut from_5 = relayed_frame(PacketType::Nack, 5, 2);
    from_5.nwk = AddrPair { src: 5, dst: 1 };
    from_5.mac = AddrPair { src: 5, dst: 1 };
    for f in [from_2, via_2, from_5] {
        mesh.air().inject(1, &f);
    }
    mesh.settle();

    let score = |mesh: &SimMesh, dst: u8| mesh.node(1).routing_entries().find(|r| r.dst == dst).unwrap().score;
    assert_eq!((score(&mesh, 2), score(&mesh, 9), score(&mesh, 5)), (2, 1, 1));

    for _ in 0..300 {
        let formed = mesh.node_mut(1).form_packet(9, PacketType::Nack, 15, &[]).unwrap();
        assert_eq!(formed.mac.dst, 2);
    }

    assert_eq!(score(&mesh, 9), 127 + 46);
    assert_eq!(score(&mesh, 2), 1);
    assert_eq!(score(&mesh, 5), 0);
}
