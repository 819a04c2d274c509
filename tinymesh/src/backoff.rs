use crate::config::MeshConfig;
use crate::frame::FRAME_SIZE;
use crate::util::random::Random;

/// Air time of a single frame plus a guard interval, in microseconds
pub fn slot_time_us(config: &MeshConfig) -> u32 {
    let bits_on_air = 8 * (FRAME_SIZE as u32 + config.frame_overhead_bytes);
    config.slot_guard_us + bits_on_air * 1000 / config.air_rate_kbps.max(1)
}

/// A random multiple of `slot_us` between 1 and `num_slots`, so neighbours repeating the same
///  discovery frame are unlikely to transmit at the same time
pub fn pick_backoff_us<R: Random>(slot_us: u32, num_slots: usize) -> u32 {
    let num_slots = num_slots.max(1) as u32;
    R::pick_slot(num_slots) * slot_us
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::random::{MockRandom, RngRandom, MOCK_RANDOM_MUTEX};
    use mockall::predicate::eq;

    #[test]
    fn test_slot_time() {
        let config = MeshConfig::new();
        assert_eq!(slot_time_us(&config), 25 + 8 * 41 * 1000 / 2000);

        let mut slow = MeshConfig::new();
        slow.air_rate_kbps = 250;
        assert_eq!(slot_time_us(&slow), 25 + 1312);
    }

    #[test]
    fn test_pick_backoff() {
        let _lock = MOCK_RANDOM_MUTEX.lock();

        let ctx = MockRandom::pick_slot_context();
        ctx.expect()
            .with(eq(4))
            .return_const(3u32);

        assert_eq!(pick_backoff_us::<MockRandom>(189, 4), 567);
    }

    #[test]
    fn test_pick_backoff_single_slot() {
        let _lock = MOCK_RANDOM_MUTEX.lock();

        let ctx = MockRandom::pick_slot_context();
        ctx.expect()
            .with(eq(1))
            .return_const(1u32);

        assert_eq!(pick_backoff_us::<MockRandom>(189, 0), 189);
    }

    #[test]
    fn test_rng_slot_in_range() {
        for _ in 0..100 {
            let slot = RngRandom::pick_slot(4);
            assert!((1..=4).contains(&slot));
        }
    }
}
