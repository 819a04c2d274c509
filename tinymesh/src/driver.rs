use std::fmt::Debug;
#[cfg(test)] use mockall::automock;

use crate::frame::{Frame, FRAME_SIZE};

/// Everything the mesh engine needs from its environment: the radio, a monotonic millisecond
///  clock and the application that consumes frames addressed to this node.
///
/// Functions returning `bool` report success; the engine logs failures and carries on.
#[cfg_attr(test, automock)]
pub trait MeshDriver: Debug {
    /// bring up the radio, set channel and air rate
    fn radio_init(&mut self) -> bool;

    fn radio_send(&mut self, frame: &[u8; FRAME_SIZE]) -> bool;

    /// copy the next received frame to `frame` if there is one
    fn radio_recv(&mut self, frame: &mut [u8; FRAME_SIZE]) -> bool;

    fn app_recv(&mut self, frame: &Frame) -> bool;

    /// milliseconds since an arbitrary starting point, wrapping at `u32::MAX`
    fn get_timer_ms(&mut self) -> Option<u32>;

    /// true if more received frames are waiting after the last `radio_recv`. Drivers that
    ///  signal each frame separately can rely on the default.
    fn rx_pending(&self) -> bool {
        false
    }

    /// Hold off for `delay_us` before the next `radio_send`, used to spread out repeats of
    ///  discovery frames that several neighbours received at the same time
    fn backoff_us(&mut self, _delay_us: u32) {}
}
