//! Frame queue shared by the producer and the consumer.
//!
//! A FIFO of factory-owned images behind one mutex, with a condition
//! variable for the consumer to sleep on and a completion flag the
//! producer sets once after its last enqueue. The queue is unbounded so
//! the camera is never held up by a slow writer.

use crate::imaging::Image;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Default)]
struct State {
    items: VecDeque<Image>,
    complete: bool,
    high_water: usize,
}

/// Blocking FIFO of images with a completion flag.
#[derive(Default)]
pub struct FrameQueue {
    state: Mutex<State>,
    ready: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an image and wakes the consumer.
    ///
    /// With `last` set the completion flag is raised in the same critical
    /// section, so the consumer can never see the final item without also
    /// seeing the flag.
    pub fn push(&self, image: Image, last: bool) {
        let mut state = self.state.lock();
        debug_assert!(!state.complete, "push after completion");

        state.items.push_back(image);
        state.high_water = state.high_water.max(state.items.len());
        if last {
            state.complete = true;
        }
        drop(state);

        if last {
            self.ready.notify_all();
        } else {
            self.ready.notify_one();
        }
    }

    /// Waits for the next image.
    ///
    /// Returns `(image, done)` where `done` is true once the queue is empty
    /// and complete. The image is `None` only when the queue was already
    /// empty and complete; in that case the call returns without waiting.
    pub fn pop_blocking(&self) -> (Option<Image>, bool) {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.complete {
            self.ready.wait(&mut state);
        }

        let image = state.items.pop_front();
        let done = state.items.is_empty() && state.complete;
        (image, done)
    }

    /// Raises the completion flag and wakes every waiter.
    ///
    /// Returns `true` if this call raised it.
    pub fn mark_complete(&self) -> bool {
        let mut state = self.state.lock();
        let raised = !state.complete;
        state.complete = true;
        drop(state);

        self.ready.notify_all();
        raised
    }

    /// Removes every queued image.
    pub fn drain(&self) -> Vec<Image> {
        self.state.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Largest number of images queued at once.
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }
}
