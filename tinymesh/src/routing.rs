use tracing::trace;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RouteEntry {
    pub dst: u8,
    pub next_hop: u8,
    /// 0 means that `dst` is a direct neighbour
    pub num_hops: u8,
    /// usage counter, used to pick an entry for eviction
    pub score: u8,
}

/// Routes to destinations, learned passively from received frames. The table has a fixed number
///  of slots: when a new destination does not fit, the entry with the lowest score is evicted.
#[derive(Debug, Clone)]
pub struct RoutingTable<const N: usize> {
    entries: [Option<RouteEntry>; N],
}

impl <const N: usize> Default for RoutingTable<N> {
    fn default() -> Self {
        RoutingTable { entries: [None; N] }
    }
}

impl <const N: usize> RoutingTable<N> {
    pub fn new() -> RoutingTable<N> {
        Self::default()
    }

    pub fn find(&self, dst: u8) -> Option<&RouteEntry> {
        self.entries.iter()
            .flatten()
            .find(|e| e.dst == dst)
    }

    pub fn is_known(&self, dst: u8) -> bool {
        self.find(dst).is_some()
    }

    /// Find a route for sending, counting the lookup as a use of the route
    pub fn lookup(&mut self, dst: u8) -> Option<RouteEntry> {
        let idx = self.index_of(dst)?;
        self.bump_score(idx);
        self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// the n-th live entry
    pub fn get(&self, index: usize) -> Option<&RouteEntry> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().flatten()
    }

    pub fn remove(&mut self, dst: u8) -> bool {
        match self.index_of(dst) {
            Some(idx) => {
                self.entries[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Record a direct neighbour. Returns true if an entry for another destination was evicted.
    pub fn learn_neighbour(&mut self, addr: u8) -> bool {
        let (idx, evicted) = self.slot_for(addr);
        let score = self.entries[idx].map(|e| e.score).unwrap_or(0);
        self.entries[idx] = Some(RouteEntry {
            dst: addr,
            next_hop: addr,
            num_hops: 0,
            score,
        });
        self.bump_score(idx);
        evicted
    }

    /// Record a route to a remote node. An existing route is replaced only by one that is at most
    ///  as long, so the most recent of several equally long routes wins. Returns true if an entry
    ///  for another destination was evicted.
    pub fn learn_route(&mut self, dst: u8, next_hop: u8, num_hops: u8) -> bool {
        let (idx, evicted) = self.slot_for(dst);
        match &mut self.entries[idx] {
            Some(existing) => {
                if num_hops <= existing.num_hops {
                    existing.next_hop = next_hop;
                    existing.num_hops = num_hops;
                }
            }
            empty => {
                *empty = Some(RouteEntry { dst, next_hop, num_hops, score: 0 });
            }
        }
        self.bump_score(idx);
        evicted
    }

    fn index_of(&self, dst: u8) -> Option<usize> {
        self.entries.iter()
            .position(|e| matches!(e, Some(e) if e.dst == dst))
    }

    /// The slot holding `dst`, or else an empty slot, or else the slot with the lowest score
    ///  after clearing it
    fn slot_for(&mut self, dst: u8) -> (usize, bool) {
        if let Some(idx) = self.index_of(dst) {
            return (idx, false);
        }
        if let Some(idx) = self.entries.iter().position(|e| e.is_none()) {
            return (idx, false);
        }

        let mut victim = 0;
        for (idx, e) in self.entries.iter().enumerate() {
            if let (Some(e), Some(v)) = (e, &self.entries[victim]) {
                if e.score < v.score {
                    victim = idx;
                }
            }
        }
        trace!("evicting route {:?}", self.entries[victim]);
        self.entries[victim] = None;
        (victim, true)
    }

    fn bump_score(&mut self, idx: usize) {
        let saturated = match &mut self.entries[idx] {
            Some(e) => {
                e.score = e.score.saturating_add(1);
                e.score == u8::MAX
            }
            None => false,
        };

        if saturated {
            trace!("route scores saturated - halving all scores");
            for e in self.entries.iter_mut().flatten() {
                e.score /= 2;
            }
        }
    }
}
