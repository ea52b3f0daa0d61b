// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::Event;

/// A bounded per-subscriber queue. `push` never blocks: once `capacity` is
/// reached, the oldest queued event is dropped (with a warning) to make
/// room for the new one. Publishers never wait on a slow subscriber.
pub struct Mailbox {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn push(&self, event: Event) {
        let mut q = self.queue.lock().expect("mailbox mutex poisoned");
        if q.len() >= self.capacity {
            q.pop_front();
            tracing::warn!(capacity = self.capacity, "mailbox overflow, dropped oldest event");
        }
        q.push_back(event);
        drop(q);
        self.notify.notify_one();
    }

    /// Await the next event, blocking only this subscriber's task.
    pub async fn recv(&self) -> Event {
        loop {
            {
                let mut q = self.queue.lock().expect("mailbox mutex poisoned");
                if let Some(event) = q.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking poll; returns `None` if the mailbox is currently empty.
    pub fn try_recv(&self) -> Option<Event> {
        self.queue.lock().expect("mailbox mutex poisoned").pop_front()
    }
}
