use crate::{data::RenderingData, render};
use glimmer_core::gpu::SCREEN_HEIGHT;
use parking_lot::{Condvar, Mutex};
use std::{
    cell::UnsafeCell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// A counting semaphore. The worker and the line-fetch consumer only ever
/// exchange unit tickets, so contention is a lock around a counter.
pub(crate) struct Semaphore {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Semaphore {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    pub fn post(&self, n: u32) {
        let mut count = self.count.lock();
        *count += n;
        if n == 1 {
            self.condvar.notify_one();
        } else {
            self.condvar.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    pub fn reset(&self) {
        *self.count.lock() = 0;
    }
}

/// State shared with the worker thread.
///
/// The `UnsafeCell`s are written by the producer only while the worker sits
/// on the start semaphore, and read by the consumer only for scanlines whose
/// ticket was already posted; the semaphore discipline stands in for a lock.
pub(crate) struct SharedData {
    pub rendering_data: UnsafeCell<Box<RenderingData>>,
    pub renderer: UnsafeCell<render::Renderer>,
    pub frame_identical: AtomicBool,
    pub running: AtomicBool,
    pub rendering: AtomicBool,
    pub start: Semaphore,
    pub done: Semaphore,
    pub scanline_count: Semaphore,
}

unsafe impl Sync for SharedData {}

pub(crate) fn worker(shared: Arc<SharedData>, #[cfg(feature = "log")] logger: slog::Logger) {
    loop {
        shared.start.wait();
        if !shared.running.load(Ordering::Relaxed) {
            #[cfg(feature = "log")]
            slog::debug!(logger, "Shutting down rendering worker");
            return;
        }

        shared.rendering.store(true, Ordering::Relaxed);

        if shared.frame_identical.load(Ordering::Relaxed) {
            // nothing changed since the last frame: keep the buffers and
            // hand the consumer its 192 line tickets anyway
            shared.scanline_count.post(SCREEN_HEIGHT as u32);
        } else {
            let data = unsafe { &*shared.rendering_data.get() };
            let renderer = unsafe { &mut *shared.renderer.get() };
            renderer.render_frame(data, || shared.scanline_count.post(1));
        }

        // clear the flag before posting so a drain-then-resetup sequence
        // never waits on the same done ticket twice
        shared.rendering.store(false, Ordering::Relaxed);
        shared.done.post(1);
    }
}
