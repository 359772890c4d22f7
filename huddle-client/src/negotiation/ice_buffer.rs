use huddle_core::IceCandidate;
use std::collections::VecDeque;

/// Remote ICE candidates that arrived before the remote description.
///
/// Drained in arrival order once the description is accepted.
#[derive(Debug, Default)]
pub struct IceCandidateBuffer {
    queue: VecDeque<IceCandidate>,
}

impl IceCandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push_back(candidate);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = IceCandidate> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
