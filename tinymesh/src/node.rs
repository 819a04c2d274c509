use anyhow::bail;
use tracing::{debug, trace, warn};

use crate::backoff::{pick_backoff_us, slot_time_us};
use crate::config::MeshConfig;
use crate::driver::MeshDriver;
use crate::error_mask::ErrorMask;
use crate::frame::{AddrPair, Frame, FrameInfo, PacketType, BROADCAST_ADDR, DATA_SIZE, FRAME_SIZE, HOP_COUNT_MAX, MESH_VERSION, RETRY_COUNT_MAX, ZERO_ADDR};
use crate::history::{HistoryCheck, PacketHistory};
use crate::pending::{PendingContext, PendingEntry, PendingOutcome, PendingQueue, TransmitKind};
use crate::routing::{RouteEntry, RoutingTable};
use crate::stats::MeshStats;
use crate::util::random::RngRandom;

const HELLO: &[u8] = b"HELLO\n";

/// A single node of the mesh: routing table, packet history and pending frames, driven by
///  repeated calls to [MeshNode::service].
///
/// `NODES` sizes the routing table, the packet history and the queue of frames repeated for other
///  nodes; `PENDING` sizes the queue of frames this node originated.
#[derive(Debug)]
pub struct MeshNode<D: MeshDriver, const NODES: usize = 4, const PENDING: usize = 2> {
    config: MeshConfig,
    driver: D,
    local_id: u8,
    is_repeater: bool,
    name: [u8; DATA_SIZE],
    name_len: usize,
    seq: u8,
    routes: RoutingTable<NODES>,
    history: PacketHistory<NODES>,
    repeat_pending: PendingQueue<NODES>,
    our_pending: PendingQueue<PENDING>,
    stats: MeshStats,
    errors: ErrorMask,
    prev_time_ms: u32,
    slot_us: u32,
}

fn validate_address(id: u8) -> anyhow::Result<()> {
    if id == ZERO_ADDR || id == BROADCAST_ADDR {
        bail!("{} is not a valid node address", id);
    }
    Ok(())
}

impl <D: MeshDriver, const NODES: usize, const PENDING: usize> MeshNode<D, NODES, PENDING> {
    /// Bring up the radio and, if `send_discovery` is set, announce this node to its neighbours
    ///  with a 'HELLO' broadcast. The node name is what this node answers pings with; it is
    ///  truncated to the size of a frame's payload.
    pub fn init(config: MeshConfig, local_id: u8, is_repeater: bool, node_name: &str, driver: D, send_discovery: bool) -> anyhow::Result<Self> {
        if NODES < 2 || PENDING < 2 {
            bail!("capacities must be at least 2: NODES={}, PENDING={}", NODES, PENDING);
        }
        if NODES > u8::MAX as usize || PENDING > u8::MAX as usize {
            bail!("capacities must not exceed {}: NODES={}, PENDING={}", u8::MAX, NODES, PENDING);
        }
        validate_address(local_id)?;
        config.validate()?;

        let mut name = [0u8; DATA_SIZE];
        let name_len = node_name.len().min(DATA_SIZE);
        name[..name_len].copy_from_slice(&node_name.as_bytes()[..name_len]);

        let slot_us = slot_time_us(&config);

        let mut result = MeshNode {
            config,
            driver,
            local_id,
            is_repeater,
            name,
            name_len,
            seq: 0,
            routes: RoutingTable::new(),
            history: PacketHistory::new(),
            repeat_pending: PendingQueue::new(),
            our_pending: PendingQueue::new(),
            stats: MeshStats::default(),
            errors: ErrorMask::empty(),
            prev_time_ms: 0,
            slot_us,
        };

        if !result.driver.radio_init() {
            bail!("radio initialization failed");
        }
        match result.driver.get_timer_ms() {
            Some(now) => result.prev_time_ms = now,
            None => bail!("timer is not available"),
        }

        debug!("initialized mesh node {} (repeater: {})", local_id, is_repeater);

        if send_discovery {
            let hello_hops = result.config.hello_hops;
            result.send(BROADCAST_ADDR, PacketType::Nack, HELLO, hello_hops)?;
        }
        Ok(result)
    }

    /// Routes to the new address are dropped: a node never routes to itself
    pub fn set_node_address(&mut self, id: u8) -> anyhow::Result<()> {
        validate_address(id)?;
        if self.routes.remove(id) {
            debug!("removed route to {} which is now our own address", id);
        }
        self.local_id = id;
        Ok(())
    }

    pub fn node_address(&self) -> u8 {
        self.local_id
    }

    pub fn node_name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    pub fn is_repeater(&self) -> bool {
        self.is_repeater
    }

    pub fn set_retry_count(&mut self, retry_count: u8) -> anyhow::Result<()> {
        if retry_count > RETRY_COUNT_MAX {
            bail!("retry count {} exceeds the maximum of {}", retry_count, RETRY_COUNT_MAX);
        }
        self.config.retry_count = retry_count;
        Ok(())
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn routing_entry(&self, index: usize) -> Option<&RouteEntry> {
        self.routes.get(index)
    }

    pub fn routing_entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter()
    }

    pub fn routing_entry_count(&self) -> u8 {
        self.routes.len() as u8
    }

    pub fn is_route_known(&self, dst: u8) -> bool {
        self.routes.is_known(dst)
    }

    pub fn pending_packet_count(&self) -> u8 {
        (self.our_pending.len() + self.repeat_pending.len()) as u8
    }

    /// Estimated round trip time for a frame to `dst` and its acknowledgment, based on the known
    ///  route or on the hop limit of route discovery
    pub fn expected_ack_time_ms(&self, dst: u8) -> u32 {
        match self.routes.find(dst) {
            Some(route) => (1 + route.num_hops as u32) * self.config.ack_timeout_ms,
            None => self.config.ack_timeout_ms * self.config.route_discovery_hops as u32,
        }
    }

    pub fn max_timeout_before_fail_ms(&self, dst: u8) -> u32 {
        self.expected_ack_time_ms(dst) * self.config.retry_count as u32
    }

    pub fn error_mask(&self) -> ErrorMask {
        self.errors
    }

    pub fn reset_error_mask(&mut self) {
        self.errors = ErrorMask::empty();
    }

    pub fn statistics(&self) -> MeshStats {
        let mut result = self.stats;
        result.rte_entries = self.routing_entry_count();
        result
    }

    /// Compose a frame for `dst`, addressed to the next hop if a route is known. A known route's
    ///  hop count replaces `hop_count_max`, otherwise the frame goes out unaddressed and any
    ///  repeater may carry it. Broadcasts are never acknowledged.
    ///
    /// Each call consumes a sequence number.
    pub fn form_packet(&mut self, dst: u8, pkt_type: PacketType, hop_count_max: u8, payload: &[u8]) -> anyhow::Result<Frame> {
        if dst == ZERO_ADDR {
            bail!("cannot send to address 0");
        }
        if dst == self.local_id {
            bail!("cannot send to self ({})", dst);
        }
        if hop_count_max > HOP_COUNT_MAX {
            bail!("hop count max {} exceeds the maximum of {}", hop_count_max, HOP_COUNT_MAX);
        }
        if payload.len() > DATA_SIZE {
            bail!("payload of {} bytes exceeds the maximum of {}", payload.len(), DATA_SIZE);
        }

        self.seq = self.seq.wrapping_add(1);

        let pkt_type = if dst == BROADCAST_ADDR { PacketType::Nack } else { pkt_type };

        let (mac_dst, hop_count_max) = match self.routes.lookup(dst) {
            Some(route) => (route.next_hop, route.num_hops),
            None => (ZERO_ADDR, hop_count_max),
        };

        let mut data = [0u8; DATA_SIZE];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Frame {
            nwk: AddrPair { src: self.local_id, dst },
            mac: AddrPair { src: self.local_id, dst: mac_dst },
            info: FrameInfo {
                version: MESH_VERSION,
                retries_remaining: self.config.retry_count,
                pkt_type,
                hop_count: 0,
                hop_count_max,
                pkt_seq_num: self.seq,
                data_len: payload.len() as u8,
            },
            data,
        })
    }

    /// Transmit a frame created by [MeshNode::form_packet], and keep it for retransmission if it
    ///  needs to be acknowledged
    pub fn send_formed_packet(&mut self, frame: &mut Frame) -> anyhow::Result<()> {
        if frame.nwk.dst == ZERO_ADDR {
            bail!("frame has no destination");
        }

        if !self.transmit(frame) {
            bail!("radio failed to send {}", frame);
        }

        let requires_ack = frame.info.pkt_type.requires_ack();
        let routed_ack_rsp = frame.info.pkt_type == PacketType::AckResponse
            && frame.mac.dst != ZERO_ADDR
            && frame.mac.dst != frame.nwk.dst;
        if requires_ack || routed_ack_rsp {
            let hop_count_max = frame.info.hop_count_max;
            self.add_pending(frame, hop_count_max);
        }
        Ok(())
    }

    /// An empty payload sends a ping, which the destination answers with its node name
    pub fn send(&mut self, dst: u8, pkt_type: PacketType, payload: &[u8], hop_count_max: u8) -> anyhow::Result<()> {
        let mut frame = self.form_packet(dst, pkt_type, hop_count_max, payload)?;
        self.send_formed_packet(&mut frame)
    }

    /// Acknowledge `original`, which is typically a frame with [PacketType::AppAckRequest]
    pub fn send_ack(&mut self, payload: &[u8], original: &Frame) -> anyhow::Result<()> {
        self.send(original.nwk.src, PacketType::AckResponse, payload, original.info.hop_count_max)
    }

    /// Process at most one received frame and handle pending frames whose timer expired.
    ///  Calling this more often than necessary does no harm.
    pub fn service(&mut self) {
        self.update_soft_timers();

        let mut raw = [0u8; FRAME_SIZE];
        let received = if self.driver.radio_recv(&mut raw) {
            self.on_frame_received(&raw)
        }
        else {
            None
        };

        self.handle_pending(received.as_ref());
    }

    fn update_soft_timers(&mut self) -> bool {
        let Some(now) = self.driver.get_timer_ms() else {
            warn!("timer is not available - pending frames are not aged");
            return false;
        };

        let delta = now.wrapping_sub(self.prev_time_ms);
        self.prev_time_ms = now;

        self.our_pending.advance_timers(delta);
        self.repeat_pending.advance_timers(delta);
        true
    }

    /// Returns the frame for matching against pending frames, unless it was rejected
    fn on_frame_received(&mut self, raw: &[u8; FRAME_SIZE]) -> Option<Frame> {
        self.stats.pkts_intercepted = self.stats.pkts_intercepted.wrapping_add(1);
        self.stats.rte_entries = self.routing_entry_count();

        let version = Frame::version_of(raw);
        if version != MESH_VERSION {
            warn!("discarding frame with protocol version {}", version);
            self.errors |= ErrorMask::VERSION_MISMATCH;
            return None;
        }

        let frame = match Frame::from_bytes(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("discarding malformed frame: {}", e);
                return None;
            }
        };
        trace!("received {:?}", frame);

        if frame.mac.src == self.local_id {
            warn!("received frame with our own address {} as sender - duplicate node address?", self.local_id);
            self.errors |= ErrorMask::DUPLICATE_NODE;
            return None;
        }
        if frame.nwk.dst == ZERO_ADDR || frame.nwk.src == ZERO_ADDR || frame.nwk.src == BROADCAST_ADDR {
            warn!("discarding frame with invalid network addresses {}", frame);
            return None;
        }

        let check = self.update_history_and_routing(&frame);

        if !check.is_unique() {
            debug!("discarding duplicate {}", frame);
        }
        else if frame.nwk.src == self.local_id {
            trace!("own frame repeated by {}", frame.mac.src);
        }
        else if frame.nwk.dst == BROADCAST_ADDR {
            self.handle_broadcast(frame, check);
        }
        else if frame.nwk.dst == self.local_id {
            self.handle_own_packet(&frame, check);
        }
        else if self.is_repeater && frame.info.hop_count < frame.info.hop_count_max {
            self.handle_mesh_packet(frame);
        }
        else {
            trace!("discarding {} - not for us", frame);
        }

        Some(frame)
    }

    fn update_history_and_routing(&mut self, frame: &Frame) -> HistoryCheck {
        let check = self.history.check_and_record(frame);

        let mac_src = frame.mac.src;
        if self.is_routable(mac_src) && self.routes.learn_neighbour(mac_src) {
            self.stats.rte_overwritten = self.stats.rte_overwritten.wrapping_add(1);
        }

        let nwk_src = frame.nwk.src;
        if !check.is_duplicate
            && mac_src != nwk_src
            && self.is_routable(nwk_src)
            && self.is_routable(mac_src)
        {
            trace!("learned route to {} via {} with {} hops", nwk_src, mac_src, frame.info.hop_count);
            if self.routes.learn_route(nwk_src, mac_src, frame.info.hop_count) {
                self.stats.rte_overwritten = self.stats.rte_overwritten.wrapping_add(1);
            }
        }
        check
    }

    fn is_routable(&self, addr: u8) -> bool {
        addr != ZERO_ADDR && addr != BROADCAST_ADDR && addr != self.local_id
    }

    fn handle_broadcast(&mut self, mut frame: Frame, check: HistoryCheck) {
        if !check.is_duplicate {
            self.deliver(&frame);
        }

        if frame.info.hop_count < frame.info.hop_count_max {
            frame.info.hop_count += 1;
            trace!("repeating broadcast {}", frame);
            self.transmit(&mut frame);
        }
    }

    fn handle_own_packet(&mut self, frame: &Frame, check: HistoryCheck) {
        if !check.is_duplicate && frame.info.data_len > 0 {
            self.deliver(frame);
        }

        let result = if frame.info.pkt_type == PacketType::AckRequest {
            if frame.info.data_len == 0 {
                let name = self.name;
                self.send_ack(&name[..self.name_len], frame)
            }
            else if self.config.stats_in_ack {
                self.send_ack(&self.statistics().to_bytes(), frame)
            }
            else {
                self.send_ack(&[], frame)
            }
        }
        else if frame.mac.dst == ZERO_ADDR {
            trace!("answering unaddressed frame from {} so it learns the route", frame.nwk.src);
            self.send_ack(&[], frame)
        }
        else {
            Ok(())
        };

        if let Err(e) = result {
            warn!("failed to acknowledge {}: {}", frame, e);
        }
    }

    fn deliver(&mut self, frame: &Frame) {
        if !self.driver.app_recv(frame) {
            warn!("application did not accept {}", frame);
            self.errors |= ErrorMask::APP_RECV_FAILED;
        }
    }

    fn handle_mesh_packet(&mut self, mut frame: Frame) {
        let route = self.routes.find(frame.nwk.dst).copied();
        frame.info.hop_count += 1;

        let ensure_delivery = if frame.mac.dst == self.local_id {
            let next_hop = route.map(|r| r.next_hop).unwrap_or(ZERO_ADDR);
            let routed_ack_rsp = frame.info.pkt_type == PacketType::AckResponse
                && next_hop != ZERO_ADDR
                && next_hop != frame.nwk.dst;
            frame.info.pkt_type.requires_ack() || routed_ack_rsp
        }
        else if frame.mac.dst == ZERO_ADDR && route.is_none() {
            debug!("no route to {} - holding back discovery packet {}", frame.nwk.dst, frame);
            self.add_pending(&frame, frame.info.hop_count_max);
            return;
        }
        else if frame.mac.dst != ZERO_ADDR {
            trace!("{} is addressed to {} - not repeating", frame, frame.mac.dst);
            return;
        }
        else {
            false
        };

        let num_hops = match route {
            Some(route) => {
                frame.mac.dst = route.next_hop;
                route.num_hops
            }
            None => {
                frame.mac.dst = ZERO_ADDR;
                0
            }
        };

        debug!("repeating routed packet {}", frame);
        self.transmit(&mut frame);

        if ensure_delivery {
            self.add_pending(&frame, num_hops);
        }
    }

    fn add_pending(&mut self, frame: &Frame, num_hops: u8) {
        self.update_soft_timers();

        let mut frame = *frame;
        frame.info.retries_remaining = self.config.retry_count;
        let timeout_ms = (1 + num_hops as u32) * self.config.ack_timeout_ms;

        if frame.nwk.src == self.local_id {
            trace!("waiting for ACK of {} for {} ms", frame, timeout_ms);
            self.our_pending.insert(PendingEntry { frame, timer_ms: 0, timeout_ms, is_discovery: false });
        }
        else {
            let is_discovery = frame.mac.dst == ZERO_ADDR;
            let timeout_ms = if is_discovery { self.config.discovery_timeout_ms } else { timeout_ms };
            self.repeat_pending.insert(PendingEntry { frame, timer_ms: 0, timeout_ms, is_discovery });
        }
    }

    fn handle_pending(&mut self, received: Option<&Frame>) {
        let ctx = PendingContext {
            local_id: self.local_id,
            retry_count: self.config.retry_count,
            route_discovery_hops: self.config.route_discovery_hops,
        };

        let outcomes = self.repeat_pending.drive(received, &ctx);
        self.apply_pending_outcomes(&outcomes);

        let outcomes = self.our_pending.drive(received, &ctx);
        self.apply_pending_outcomes(&outcomes);
    }

    fn apply_pending_outcomes(&mut self, outcomes: &[PendingOutcome]) {
        for outcome in outcomes {
            if let Some(dst) = outcome.remove_route {
                if self.routes.remove(dst) {
                    debug!("removed route to {}", dst);
                }
            }

            if let Some((mut frame, kind)) = outcome.transmit {
                match kind {
                    TransmitKind::Discovery => {
                        self.transmit(&mut frame);
                    }
                    TransmitKind::Retry | TransmitKind::Rediscovery => {
                        self.retransmit(&mut frame);
                    }
                }
            }
        }
    }

    fn retransmit(&mut self, frame: &mut Frame) -> bool {
        if frame.nwk.src == self.local_id {
            self.stats.pkts_retried = self.stats.pkts_retried.wrapping_add(1);
        }
        else {
            self.stats.pkts_retried_others = self.stats.pkts_retried_others.wrapping_add(1);
        }
        self.transmit(frame)
    }

    fn transmit(&mut self, frame: &mut Frame) -> bool {
        if frame.nwk.src == self.local_id {
            self.stats.pkts_sent = self.stats.pkts_sent.wrapping_add(1);
        }
        else {
            self.stats.pkts_repeated = self.stats.pkts_repeated.wrapping_add(1);

            if frame.mac.dst == ZERO_ADDR {
                let delay_us = pick_backoff_us::<RngRandom>(self.slot_us, NODES);
                self.driver.backoff_us(delay_us);
            }
        }

        frame.mac.src = self.local_id;
        trace!("sending {:?}", frame);

        if !self.driver.radio_send(&frame.to_bytes()) {
            warn!("radio failed to send {}", frame);
            return false;
        }
        true
    }
}
