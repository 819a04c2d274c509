use std::collections::VecDeque;

use tracing::trace;

use crate::frame::{Frame, PacketType};

/// Receive queues between the mesh engine and the application: one for data frames, one for
///  ACK responses. A full queue drops its oldest frame, so accepting a frame never fails.
#[derive(Debug, Clone)]
pub struct AppInbox {
    data: VecDeque<Frame>,
    acks: VecDeque<Frame>,
    data_capacity: usize,
    ack_capacity: usize,
}

impl AppInbox {
    pub fn new(data_capacity: usize, ack_capacity: usize) -> AppInbox {
        AppInbox {
            data: VecDeque::with_capacity(data_capacity),
            acks: VecDeque::with_capacity(ack_capacity),
            data_capacity: data_capacity.max(1),
            ack_capacity: ack_capacity.max(1),
        }
    }

    pub fn push(&mut self, frame: &Frame) {
        let (queue, capacity) = if frame.info.pkt_type == PacketType::AckResponse {
            (&mut self.acks, self.ack_capacity)
        }
        else {
            (&mut self.data, self.data_capacity)
        };

        if queue.len() >= capacity {
            if let Some(dropped) = queue.pop_front() {
                trace!("inbox full - dropping {}", dropped);
            }
        }
        queue.push_back(*frame);
    }

    pub fn pop_data(&mut self) -> Option<Frame> {
        self.data.pop_front()
    }

    pub fn pop_ack(&mut self) -> Option<Frame> {
        self.acks.pop_front()
    }

    pub fn data(&self) -> impl Iterator<Item = &Frame> {
        self.data.iter()
    }

    pub fn acks(&self) -> impl Iterator<Item = &Frame> {
        self.acks.iter()
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn ack_len(&self) -> usize {
        self.acks.len()
    }

    /// Discard everything, returning the number of discarded frames
    pub fn flush(&mut self) -> usize {
        let result = self.data.len() + self.acks.len();
        self.data.clear();
        self.acks.clear();
        result
    }
}

impl Default for AppInbox {
    fn default() -> Self {
        AppInbox::new(4, 4)
    }
}
