use tracing::{debug, trace};

use crate::frame::{Frame, PacketType, ZERO_ADDR};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PendingEntry {
    pub frame: Frame,
    pub timer_ms: u32,
    pub timeout_ms: u32,
    /// an unaddressed frame held back until the destination or a better informed repeater had
    ///  a chance to answer
    pub is_discovery: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PendingContext {
    pub local_id: u8,
    pub retry_count: u8,
    pub route_discovery_hops: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransmitKind {
    /// first transmission of a held-back discovery frame
    Discovery,
    Retry,
    /// retransmission without next hop after the route failed
    Rediscovery,
}

/// What servicing a single pending slot requires the node to do. The queue itself has no access
///  to the radio or the routing table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct PendingOutcome {
    pub transmit: Option<(Frame, TransmitKind)>,
    pub remove_route: Option<u8>,
}

/// Frames waiting for an acknowledgment, for a next hop to carry them on, or for a discovery
///  hold-off to expire. When full, inserting evicts the entry with the most remaining work
///  (retries first, then elapsed time).
#[derive(Debug, Clone)]
pub struct PendingQueue<const N: usize> {
    slots: [Option<PendingEntry>; N],
}

impl <const N: usize> Default for PendingQueue<N> {
    fn default() -> Self {
        PendingQueue { slots: [None; N] }
    }
}

impl <const N: usize> PendingQueue<N> {
    pub fn new() -> PendingQueue<N> {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.slots.iter().flatten()
    }

    /// Returns the evicted entry, if any
    pub fn insert(&mut self, entry: PendingEntry) -> Option<PendingEntry> {
        debug_assert_ne!(entry.frame.nwk.dst, ZERO_ADDR);

        let idx = match self.slots.iter().position(|s| s.is_none()) {
            Some(idx) => idx,
            None => {
                let mut victim = 0;
                let mut victim_key = 0;
                for (idx, slot) in self.slots.iter().enumerate() {
                    if let Some(e) = slot {
                        let key = ((e.frame.info.retries_remaining as u64) << 32) | e.timer_ms as u64;
                        if key > victim_key {
                            victim = idx;
                            victim_key = key;
                        }
                    }
                }
                victim
            }
        };

        if N == 0 {
            return Some(entry);
        }
        let evicted = self.slots[idx].take();
        if let Some(evicted) = &evicted {
            debug!("pending queue full - evicting {}", evicted.frame);
        }
        self.slots[idx] = Some(entry);
        evicted
    }

    pub fn advance_timers(&mut self, delta_ms: u32) {
        for e in self.slots.iter_mut().flatten() {
            e.timer_ms = e.timer_ms.saturating_add(delta_ms);
        }
    }

    /// Match every entry against the frame received in this service tick (if any) and handle
    ///  expired timers
    pub fn drive(&mut self, received: Option<&Frame>, ctx: &PendingContext) -> [PendingOutcome; N] {
        let mut outcomes = [PendingOutcome::default(); N];

        for (slot, outcome) in self.slots.iter_mut().zip(outcomes.iter_mut()) {
            let Some(entry) = slot else {
                continue;
            };

            let keep = if entry.is_discovery {
                Self::drive_discovery(entry, received, ctx, outcome)
            }
            else {
                Self::drive_acknowledged(entry, received, ctx, outcome)
            };

            if !keep {
                *slot = None;
            }
        }

        outcomes
    }

    fn drive_discovery(entry: &mut PendingEntry, received: Option<&Frame>, ctx: &PendingContext, outcome: &mut PendingOutcome) -> bool {
        let pnd = &mut entry.frame;

        if let Some(rx) = received {
            if rx.nwk.src == pnd.nwk.dst && rx.nwk.dst == pnd.nwk.src {
                debug!("destination {} answered - dropping discovery packet {}", pnd.nwk.dst, pnd);
                return false;
            }
            if rx.is_same_packet(pnd) && rx.mac.dst != ZERO_ADDR {
                debug!("node {} repeated discovery packet {} with a known route - dropping ours", rx.mac.src, pnd);
                return false;
            }
        }

        if entry.timer_ms >= entry.timeout_ms {
            trace!("discovery hold-off expired - repeating {}", pnd);
            pnd.mac.src = ctx.local_id;
            outcome.transmit = Some((*pnd, TransmitKind::Discovery));
            return false;
        }
        true
    }

    fn drive_acknowledged(entry: &mut PendingEntry, received: Option<&Frame>, ctx: &PendingContext, outcome: &mut PendingOutcome) -> bool {
        let pnd = &mut entry.frame;

        if let Some(rx) = received {
            let is_ack_rsp = rx.info.pkt_type == PacketType::AckResponse;

            if is_ack_rsp && rx.nwk.src == pnd.nwk.dst && rx.nwk.dst == pnd.nwk.src {
                debug!("ACK received from {} - clearing pending {}", rx.nwk.src, pnd);
                return false;
            }
            if is_ack_rsp && rx.is_same_packet(pnd) && rx.mac.src == pnd.mac.dst {
                debug!("next hop {} carried ACK response {} - clearing pending", rx.mac.src, pnd);
                return false;
            }
            if rx.info.pkt_type != PacketType::Nack && rx.is_same_packet(pnd) && rx.mac.src == pnd.mac.dst {
                trace!("next hop {} repeated {} - waiting for the ACK without retrying", rx.mac.src, pnd);
                pnd.info.retries_remaining = 0;
                entry.timer_ms = 0;
            }
        }

        if entry.timer_ms < entry.timeout_ms {
            return true;
        }
        entry.timer_ms = 0;

        if pnd.info.retries_remaining > 0 {
            pnd.info.retries_remaining -= 1;
            pnd.mac.src = ctx.local_id;
            debug!("ACK timeout - retrying {}", pnd);
            outcome.transmit = Some((*pnd, TransmitKind::Retry));
            return true;
        }

        outcome.remove_route = Some(pnd.nwk.dst);

        let is_origin = pnd.nwk.src == ctx.local_id;
        let via_intermediate = pnd.mac.dst != pnd.nwk.dst && pnd.mac.dst != ZERO_ADDR;
        if pnd.info.pkt_type != PacketType::AckResponse && is_origin && via_intermediate {
            debug!("route to {} via {} failed - rediscovering", pnd.nwk.dst, pnd.mac.dst);
            pnd.mac.dst = ZERO_ADDR;
            pnd.mac.src = ctx.local_id;
            pnd.info.hop_count_max = ctx.route_discovery_hops;
            pnd.info.retries_remaining = ctx.retry_count;
            outcome.transmit = Some((*pnd, TransmitKind::Rediscovery));
            return true;
        }

        debug!("retries exhausted - dropping {}", pnd);
        false
    }
}
