/*
 *  plugins/events.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  In-process pub/sub bus for plugin events
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::collections::HashMap;
use std::sync::Mutex;

use log::debug;

type Callback = Box<dyn Fn(&str) + Send + Sync>;

/// Named-topic pub/sub shared by all plugins. Callbacks run synchronously
/// on the emitter's worker, so they must stay short.
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Callback>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, name: &str, callback: impl Fn(&str) + Send + Sync + 'static) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.entry(name.to_string()).or_default().push(Box::new(callback));
        debug!("Event subscription added for '{}'", name);
    }

    pub fn emit(&self, name: &str, payload: &str) {
        let subs = self.subscribers.lock().unwrap();
        if let Some(callbacks) = subs.get(name) {
            debug!("Emitting '{}' to {} subscriber(s)", name, callbacks.len());
            for callback in callbacks {
                callback(payload);
            }
        }
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(name)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            bus.subscribe("weather.updated", move |payload| {
                assert_eq!(payload, "12C");
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit("weather.updated", "12C");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit("nobody.listening", "x");
        assert_eq!(bus.subscriber_count("nobody.listening"), 0);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe("a", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit("b", "payload");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.emit("a", "payload");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
