// Lazyset
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Sequence caches
//!
//! Two interchangeable buffering strategies sit behind [`CacheStrategy`]:
//! [`MemoCache`] keeps every produced element, [`WindowCache`] keeps only the
//! most recent `max_size` elements and notifies listeners every
//! `window_size` elements.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Default number of elements retained by a sliding window cache
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Default notification granularity of a sliding window cache
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Notification delivered to window listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowEvent {
    pub size: usize,  // Buffer length at the time of notification
    pub start: usize, // Absolute index of the first retained element
}

pub type WindowListener = Arc<dyn Fn(WindowEvent) + Send + Sync>;

/// Counters describing cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub insertion_count: u64,    // Elements pushed into the buffer
    pub eviction_count: u64,     // Elements dropped from the front
    pub notification_count: u64, // Times listeners were fired
}

/// Common interface of the buffering strategies.
///
/// Indices are absolute positions in the producing sequence, not offsets
/// into the buffer.
pub trait CacheStrategy<T> {
    /// Returns the element at `index` if it is currently buffered
    fn get(&self, index: usize) -> Option<T>;

    /// Appends the next produced element
    fn push(&mut self, value: T);

    /// Absolute index of the first buffered element
    fn start(&self) -> usize;

    /// Number of buffered elements
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute index one past the last buffered element
    fn end(&self) -> usize {
        self.start() + self.len()
    }

    fn stats(&self) -> CacheStats;
}

/// Unbounded materialization buffer
#[derive(Debug, Clone)]
pub struct MemoCache<T> {
    values: Vec<T>,
    stats: CacheStats,
}

impl<T> MemoCache<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }
}

impl<T> Default for MemoCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CacheStrategy<T> for MemoCache<T> {
    fn get(&self, index: usize) -> Option<T> {
        self.values.get(index).cloned()
    }

    fn push(&mut self, value: T) {
        self.values.push(value);
        self.stats.insertion_count += 1;
    }

    fn start(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Bounded front-evicting buffer
pub struct WindowCache<T> {
    values: VecDeque<T>,
    start: usize,
    max_size: usize,
    window_size: usize,
    listeners: Vec<WindowListener>,
    stats: CacheStats,
}

impl<T> WindowCache<T> {
    /// Creates a window cache retaining at most `max_size` elements.
    ///
    /// Both sizes are clamped to at least one.
    pub fn new(max_size: usize, window_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            values: VecDeque::with_capacity(max_size.min(DEFAULT_CACHE_SIZE)),
            start: 0,
            max_size,
            window_size: window_size.max(1),
            listeners: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn with_listeners(mut self, listeners: impl IntoIterator<Item = WindowListener>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    pub fn add_listener(&mut self, listener: WindowListener) {
        self.listeners.push(listener);
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn notify(&mut self) {
        let event = WindowEvent {
            size: self.values.len(),
            start: self.start,
        };
        self.stats.notification_count += 1;
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl<T: Clone> CacheStrategy<T> for WindowCache<T> {
    fn get(&self, index: usize) -> Option<T> {
        if index < self.start {
            return None;
        }
        self.values.get(index - self.start).cloned()
    }

    fn push(&mut self, value: T) {
        self.values.push_back(value);
        self.stats.insertion_count += 1;

        if self.values.len() > self.max_size {
            let evicted = self.values.len() - self.max_size;
            self.values.drain(..evicted);
            self.start += evicted;
            self.stats.eviction_count += evicted as u64;
            metrics::counter!("lazyset.cache.evicted", evicted as u64);
            trace!(evicted, start = self.start, "window cache evicted elements");
        }

        if self.values.len() % self.window_size == 0 {
            self.notify();
        }
    }

    fn start(&self) -> usize {
        self.start
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl<T> fmt::Debug for WindowCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowCache")
            .field("start", &self.start)
            .field("len", &self.values.len())
            .field("max_size", &self.max_size)
            .field("window_size", &self.window_size)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Buffering attached to a sequence
#[derive(Debug, Default)]
pub enum CacheMode<T> {
    #[default]
    None,
    Materialize(MemoCache<T>),
    SlidingWindow(WindowCache<T>),
}

impl<T: Clone> CacheMode<T> {
    pub fn strategy(&self) -> Option<&dyn CacheStrategy<T>> {
        match self {
            CacheMode::None => None,
            CacheMode::Materialize(cache) => Some(cache),
            CacheMode::SlidingWindow(cache) => Some(cache),
        }
    }

    pub fn strategy_mut(&mut self) -> Option<&mut dyn CacheStrategy<T>> {
        match self {
            CacheMode::None => None,
            CacheMode::Materialize(cache) => Some(cache),
            CacheMode::SlidingWindow(cache) => Some(cache),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CacheMode::None => "uncached",
            CacheMode::Materialize(_) => "memo",
            CacheMode::SlidingWindow(_) => "window",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_memo_cache_keeps_everything() {
        let mut cache = MemoCache::new();
        for i in 0..5 {
            cache.push(i);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.get(0), Some(0));
        assert_eq!(cache.get(4), Some(4));
        assert_eq!(cache.get(5), None);
        assert_eq!(cache.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_window_cache_evicts_from_front() {
        let mut cache = WindowCache::new(4, 2);
        for i in 0..7 {
            cache.push(i);
        }

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.start(), 3);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(3), Some(3));
        assert_eq!(cache.get(6), Some(6));
        assert_eq!(cache.get(7), None);
        assert_eq!(cache.stats().eviction_count, 3);
    }

    #[test]
    fn test_window_cache_notifies_on_window_boundary() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut cache = WindowCache::new(10, 3).with_listeners([Arc::new(move |event: WindowEvent| {
            sink.lock().unwrap().push(event);
        }) as WindowListener]);

        for i in 0..7 {
            cache.push(i);
        }

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![WindowEvent { size: 3, start: 0 }, WindowEvent { size: 6, start: 0 }]
        );
    }

    #[test]
    fn test_window_cache_clamps_sizes() {
        let mut cache = WindowCache::new(0, 0);
        cache.push("a");
        cache.push("b");
        assert_eq!(cache.max_size(), 1);
        assert_eq!(cache.window_size(), 1);
        assert_eq!(cache.get(1), Some("b"));
        assert_eq!(cache.get(0), None);
    }

    #[test]
    fn test_cache_mode_strategy() {
        let mut mode: CacheMode<u32> = CacheMode::Materialize(MemoCache::new());
        mode.strategy_mut().unwrap().push(7);
        assert_eq!(mode.strategy().unwrap().get(0), Some(7));
        assert_eq!(mode.name(), "memo");
        assert!(CacheMode::<u32>::None.strategy().is_none());
    }
}
