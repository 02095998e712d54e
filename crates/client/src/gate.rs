//! Request tagging that keeps stale responses from overwriting newer state.
//!
//! Every request takes a [`Ticket`] when it is issued. A ticket carries
//! the gate's generation (bumped whenever the watched key changes or the
//! state is invalidated) and a per-generation sequence number. On arrival
//! the response is applied through [`RequestGate::apply`], which runs the
//! update only if the ticket's generation is still current and no later
//! request of that generation has been applied already. The check and the
//! update happen under one lock, so an invalidation can never interleave
//! with a stale apply.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    seq: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    next_seq: u64,
    applied_seq: u64,
}

/// Serializes state updates for one watched resource.
#[derive(Debug, Default)]
pub struct RequestGate {
    state: Mutex<GateState>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a request about to be issued.
    pub fn issue(&self) -> Ticket {
        let mut state = self.lock();
        state.next_seq += 1;
        Ticket {
            generation: state.generation,
            seq: state.next_seq,
        }
    }

    /// Invalidate every outstanding ticket and run `reset` atomically
    /// with the invalidation. Returns the new generation.
    pub fn invalidate_with<F: FnOnce()>(&self, reset: F) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.next_seq = 0;
        state.applied_seq = 0;
        reset();
        state.generation
    }

    pub fn invalidate(&self) -> u64 {
        self.invalidate_with(|| {})
    }

    /// Run `update` if `ticket` is still the freshest applicable response.
    ///
    /// Returns `true` when the update ran.
    pub fn apply<F: FnOnce()>(&self, ticket: Ticket, update: F) -> bool {
        let mut state = self.lock();
        if ticket.generation != state.generation || ticket.seq <= state.applied_seq {
            return false;
        }
        state.applied_seq = ticket.seq;
        update();
        true
    }

    /// `true` while `ticket` belongs to the current generation.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.lock().generation == ticket.generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The guarded counters stay consistent even if an update panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
