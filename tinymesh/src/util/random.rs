use rand::Rng;
#[cfg(test)] use std::sync::Mutex;

#[cfg(test)]
/// automock expectations for static methods are global - hold this lock to avoid races
pub static MOCK_RANDOM_MUTEX: Mutex<()> = Mutex::new(());

/// Source of randomness for collision avoidance on the shared air medium
#[cfg_attr(test, mockall::automock)]
pub trait Random {
    /// uniformly distributed in `1..=num_slots`; `num_slots` must be positive
    fn pick_slot(num_slots: u32) -> u32;
}

pub struct RngRandom {}
impl Random for RngRandom {
    fn pick_slot(num_slots: u32) -> u32 {
        rand::thread_rng().gen_range(1..=num_slots)
    }
}
