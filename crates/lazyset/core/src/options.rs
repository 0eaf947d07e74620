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

//! Sequence construction options

use crate::cache::{CacheMode, DEFAULT_CACHE_SIZE, DEFAULT_WINDOW_SIZE, MemoCache, WindowCache, WindowEvent, WindowListener};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A cache switch that is either a flag or an explicit size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheSetting {
    Enabled(bool),
    Size(usize),
}

impl CacheSetting {
    pub fn is_enabled(&self) -> bool {
        match self {
            CacheSetting::Enabled(enabled) => *enabled,
            CacheSetting::Size(_) => true,
        }
    }

    pub fn size(&self) -> Option<usize> {
        match self {
            CacheSetting::Enabled(_) => None,
            CacheSetting::Size(size) => Some(*size),
        }
    }
}

/// Options controlling how a sequence caches produced elements.
///
/// `memo` and `cache` are mutually exclusive; when both are set `memo` wins.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequenceOptions {
    /// Materialize everything produced; a size pre-fills that many elements on first indexed access
    pub memo: Option<CacheSetting>,
    /// Keep a sliding window; a size overrides `cache_size`
    pub cache: Option<CacheSetting>,
    pub cache_size: Option<usize>,
    pub window_size: Option<usize>,
    #[serde(skip)]
    pub on_window: Vec<WindowListener>,
}

impl SequenceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memo() -> Self {
        Self {
            memo: Some(CacheSetting::Enabled(true)),
            ..Self::default()
        }
    }

    pub fn memo_with_size(size: usize) -> Self {
        Self {
            memo: Some(CacheSetting::Size(size)),
            ..Self::default()
        }
    }

    pub fn cached(size: usize) -> Self {
        Self {
            cache: Some(CacheSetting::Size(size)),
            ..Self::default()
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = Some(window_size);
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = Some(cache_size);
        self
    }

    pub fn on_window(mut self, listener: impl Fn(WindowEvent) + Send + Sync + 'static) -> Self {
        self.on_window.push(Arc::new(listener));
        self
    }

    pub fn is_memo(&self) -> bool {
        self.memo.is_some_and(|memo| memo.is_enabled())
    }

    pub fn is_windowed(&self) -> bool {
        !self.is_memo() && self.cache.is_some_and(|cache| cache.is_enabled())
    }

    /// Number of elements to materialize on the first indexed access
    pub fn memo_target(&self) -> usize {
        self.memo.and_then(|memo| memo.size()).unwrap_or(0)
    }

    pub fn effective_cache_size(&self) -> usize {
        self.cache
            .and_then(|cache| cache.size())
            .or(self.cache_size)
            .unwrap_or(DEFAULT_CACHE_SIZE)
    }

    pub fn effective_window_size(&self) -> usize {
        self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE)
    }

    /// Builds the cache mode these options describe
    pub fn cache_mode<T>(&self) -> CacheMode<T> {
        if self.is_memo() {
            CacheMode::Materialize(MemoCache::with_capacity(self.memo_target().min(DEFAULT_CACHE_SIZE)))
        } else if self.is_windowed() {
            let cache = WindowCache::new(self.effective_cache_size(), self.effective_window_size());
            CacheMode::SlidingWindow(cache.with_listeners(self.on_window.iter().cloned()))
        } else {
            CacheMode::None
        }
    }

    /// Parses options from their JSON form, e.g. `{"cache": 500, "windowSize": 50}`
    pub fn from_json(json: &str) -> crate::error::SeqResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Debug for SequenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceOptions")
            .field("memo", &self.memo)
            .field("cache", &self.cache)
            .field("cache_size", &self.cache_size)
            .field("window_size", &self.window_size)
            .field("on_window", &self.on_window.len())
            .finish()
    }
}
