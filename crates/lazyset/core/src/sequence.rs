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

//! Lazy Sequence
//!
//! [`Seq`] is the single abstraction the rest of the crate builds on: a cheap,
//! clone-shared handle around a restartable producer. Every input, be it
//! nothing, a scalar, a collection or an unbounded stream, is normalized into
//! one by [`make_sequence`].
//!
//! Elements are produced as `SeqResult<T>` so a failing callback only surfaces
//! when the element that needs it is demanded.

use crate::cache::{CacheMode, CacheStats, CacheStrategy};
use crate::error::{SeqError, SeqResult};
use crate::options::SequenceOptions;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Bounds every sequence element satisfies
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

/// A single run of a producer
pub type SeqIterBox<T> = Box<dyn Iterator<Item = SeqResult<T>> + Send>;

/// Restartable source of element iterators
pub type Producer<T> = Arc<dyn Fn() -> SeqIterBox<T> + Send + Sync>;

/// What a sequence looked like after peeking its first two elements
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceShape<T> {
    Empty,
    Singleton(T),
    Multi,
}

impl<T> SequenceShape<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, SequenceShape::Empty)
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, SequenceShape::Singleton(_))
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, SequenceShape::Multi)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SequenceShape::Empty => "empty",
            SequenceShape::Singleton(_) => "singleton",
            SequenceShape::Multi => "multi",
        }
    }
}

/// Raw input accepted by the sequence factory
pub enum SeqInput<T> {
    /// Nothing: the sequence is empty
    Absent,
    /// A lone value: the sequence yields exactly it
    Scalar(T),
    /// A finite indexable collection, kept for direct indexed access
    Collection(Arc<[T]>),
    /// A restartable producer
    Producer(Producer<T>),
    /// An existing sequence, reused as is
    Sequence(Seq<T>),
}

impl<T: Element> SeqInput<T> {
    pub fn scalar(value: T) -> Self {
        SeqInput::Scalar(value)
    }

    /// Replays a clone of `iterable` every time the sequence is iterated
    pub fn iterable<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        SeqInput::Producer(Arc::new(move || Box::new(iterable.clone().into_iter().map(Ok)) as SeqIterBox<T>))
    }

    pub fn producer<F, I>(producer: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        SeqInput::Producer(Arc::new(move || Box::new(producer().into_iter().map(Ok)) as SeqIterBox<T>))
    }
}

impl<T> From<()> for SeqInput<T> {
    fn from(_: ()) -> Self {
        SeqInput::Absent
    }
}

impl<T> From<Option<T>> for SeqInput<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => SeqInput::Scalar(value),
            None => SeqInput::Absent,
        }
    }
}

impl<T> From<Vec<T>> for SeqInput<T> {
    fn from(values: Vec<T>) -> Self {
        SeqInput::Collection(values.into())
    }
}

impl<T: Clone> From<&[T]> for SeqInput<T> {
    fn from(values: &[T]) -> Self {
        SeqInput::Collection(values.into())
    }
}

impl<T, const N: usize> From<[T; N]> for SeqInput<T> {
    fn from(values: [T; N]) -> Self {
        SeqInput::Collection(Vec::from(values).into())
    }
}

impl<T> From<Arc<[T]>> for SeqInput<T> {
    fn from(values: Arc<[T]>) -> Self {
        SeqInput::Collection(values)
    }
}

impl<T> From<Seq<T>> for SeqInput<T> {
    fn from(seq: Seq<T>) -> Self {
        SeqInput::Sequence(seq)
    }
}

impl<T> From<&Seq<T>> for SeqInput<T> {
    fn from(seq: &Seq<T>) -> Self {
        SeqInput::Sequence(seq.clone())
    }
}

/// Mutable bookkeeping behind the sequence lock
struct CacheState<T> {
    mode: CacheMode<T>,
    cursor: Option<SeqIterBox<T>>, // Live producer run feeding the cache
    exhausted: bool,
    primed: bool,
}

impl<T: Clone> CacheState<T> {
    fn end(&self) -> usize {
        self.mode.strategy().map_or(0, |cache| cache.end())
    }

    fn lookup(&self, index: usize) -> Option<T> {
        self.mode.strategy().and_then(|cache| cache.get(index))
    }
}

struct SeqInner<T> {
    producer: Producer<T>,
    source: Option<Arc<[T]>>,
    state: Mutex<CacheState<T>>,
    shape: OnceLock<SequenceShape<T>>,
    options: SequenceOptions,
    cache_name: &'static str,
}

/// A lazy, possibly infinite sequence.
///
/// Cloning is cheap and yields a handle to the same sequence, cache included.
pub struct Seq<T> {
    inner: Arc<SeqInner<T>>,
}

impl<T> Clone for Seq<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Normalizes `input` into a sequence configured by `options`.
///
/// Never fails: anything that is not a collection, producer or sequence
/// becomes a singleton, and absent input becomes the empty sequence.
pub fn make_sequence<T: Element>(input: impl Into<SeqInput<T>>, options: SequenceOptions) -> Seq<T> {
    let (producer, source, shape): (Producer<T>, Option<Arc<[T]>>, Option<SequenceShape<T>>) = match input.into() {
        SeqInput::Absent => (Arc::new(|| Box::new(std::iter::empty()) as SeqIterBox<T>), None, Some(SequenceShape::Empty)),
        SeqInput::Scalar(value) => {
            let shape = SequenceShape::Singleton(value.clone());
            (Arc::new(move || Box::new(std::iter::once(Ok(value.clone()))) as SeqIterBox<T>), None, Some(shape))
        }
        SeqInput::Collection(values) => {
            let replay = Arc::clone(&values);
            let producer: Producer<T> = Arc::new(move || {
                let values = Arc::clone(&replay);
                Box::new((0..values.len()).map(move |i| Ok(values[i].clone()))) as SeqIterBox<T>
            });
            (producer, Some(values), None)
        }
        SeqInput::Producer(producer) => (producer, None, None),
        SeqInput::Sequence(seq) => {
            let shape = seq.inner.shape.get().cloned();
            (Arc::clone(&seq.inner.producer), seq.inner.source.clone(), shape)
        }
    };

    let mode = options.cache_mode();
    let cache_name = mode.name();
    let shape_cell = OnceLock::new();
    if let Some(shape) = shape {
        let _ = shape_cell.set(shape);
    }

    Seq {
        inner: Arc::new(SeqInner {
            producer,
            source,
            state: Mutex::new(CacheState {
                mode,
                cursor: None,
                exhausted: false,
                primed: false,
            }),
            shape: shape_cell,
            options,
            cache_name,
        }),
    }
}

impl<T: Element> Seq<T> {
    pub fn new(input: impl Into<SeqInput<T>>) -> Self {
        make_sequence(input, SequenceOptions::default())
    }

    pub fn with_options(input: impl Into<SeqInput<T>>, options: SequenceOptions) -> Self {
        make_sequence(input, options)
    }

    pub fn empty() -> Self {
        Self::new(SeqInput::Absent)
    }

    pub fn once(value: T) -> Self {
        Self::new(SeqInput::Scalar(value))
    }

    /// Sequence whose elements come from calling `producer` afresh on every run
    pub fn from_producer<F, I>(producer: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(SeqInput::producer(producer))
    }

    /// Like [`Seq::from_producer`] but the producer may yield failures
    pub fn from_result_producer<F, I>(producer: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = SeqResult<T>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(SeqInput::Producer(Arc::new(move || Box::new(producer().into_iter()) as SeqIterBox<T>)))
    }

    pub fn from_iterable<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::new(SeqInput::iterable(iterable))
    }

    /// `first`, `succ(first)`, `succ(succ(first))`, ... until `succ` returns `None`
    pub fn successors<F>(first: T, succ: F) -> Self
    where
        F: Fn(&T) -> Option<T> + Send + Sync + 'static,
    {
        let succ = Arc::new(succ);
        Self::from_producer(move || {
            let succ = Arc::clone(&succ);
            std::iter::successors(Some(first.clone()), move |value| succ(value))
        })
    }

    /// Same sequence, new cache configuration
    pub fn configure(&self, options: SequenceOptions) -> Self {
        make_sequence(self, options)
    }

    pub fn memoized(&self) -> Self {
        self.configure(SequenceOptions::memo())
    }

    /// True when both handles refer to the same sequence
    pub fn ptr_eq(left: &Seq<T>, right: &Seq<T>) -> bool {
        Arc::ptr_eq(&left.inner, &right.inner)
    }

    pub fn options(&self) -> &SequenceOptions {
        &self.inner.options
    }

    /// Short diagnostic type name, e.g. `Seq<memo>` or `Seq<collection[3]>`
    pub fn describe(&self) -> String {
        match &self.inner.source {
            Some(source) => format!("Seq<collection[{}]>", source.len()),
            None => format!("Seq<{}>", self.inner.cache_name),
        }
    }

    /// Length, known only for collection-backed sequences
    pub fn len(&self) -> Option<usize> {
        self.inner.source.as_ref().map(|source| source.len())
    }

    pub fn source(&self) -> Option<&[T]> {
        self.inner.source.as_deref()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.state.lock().mode.strategy().map(|cache| cache.stats())
    }

    /// True once a memoized sequence has drained its producer
    pub fn is_materialized(&self) -> bool {
        self.inner.source.is_some() || (self.inner.options.is_memo() && self.inner.state.lock().exhausted)
    }

    fn is_cached(&self) -> bool {
        self.inner.options.is_memo() || self.inner.options.is_windowed()
    }

    /// Starts a traversal.
    ///
    /// Collection-backed sequences iterate the collection, memoized ones go
    /// through the buffer so the producer only ever runs once, everything
    /// else invokes the producer afresh.
    pub fn iter(&self) -> SeqIter<T> {
        if let Some(source) = &self.inner.source {
            return SeqIter::Source {
                values: Arc::clone(source),
                pos: 0,
            };
        }
        if self.inner.options.is_memo() {
            return SeqIter::Memo {
                seq: self.clone(),
                pos: 0,
                failed: false,
            };
        }
        SeqIter::Fresh((self.inner.producer)())
    }

    /// Element at `index`, or `None` when the sequence ends before it
    pub fn get(&self, index: i64) -> SeqResult<Option<T>> {
        if index < 0 {
            return Err(SeqError::Range(index));
        }
        self.element(index as usize, true)
    }

    /// `prime` applies the memo prefill target; traversals pass `false` and fill one element at a time
    pub(crate) fn element(&self, index: usize, prime: bool) -> SeqResult<Option<T>> {
        if let Some(source) = &self.inner.source {
            return Ok(source.get(index).cloned());
        }
        if self.is_cached() { self.cached_element(index, prime) } else { self.replay(index) }
    }

    fn cached_element(&self, index: usize, prime: bool) -> SeqResult<Option<T>> {
        let target = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.lookup(index) {
                metrics::increment_counter!("lazyset.cache.hit");
                return Ok(Some(value));
            }
            metrics::increment_counter!("lazyset.cache.miss");

            let start = state.mode.strategy().map_or(0, |cache| cache.start());
            if index < start {
                drop(state);
                trace!(index, start, "index evicted from window, replaying producer");
                return self.replay(index);
            }
            if state.exhausted {
                return Ok(None);
            }

            let mut target = index;
            if prime && !state.primed {
                state.primed = true;
                target = target.max(self.inner.options.memo_target().saturating_sub(1));
            }
            target
        };

        // Prefill may fail past the requested index; that failure belongs to a later access
        let filled = self.fill_to(target);
        if let Some(value) = self.inner.state.lock().lookup(index) {
            return Ok(Some(value));
        }
        filled.map(|_| None)
    }

    /// Drives the cache cursor until the element at `target` is buffered or
    /// the producer runs dry. The lock is released while producer code runs.
    fn fill_to(&self, target: usize) -> SeqResult<()> {
        loop {
            let (cursor, end) = {
                let mut state = self.inner.state.lock();
                let end = state.end();
                if end > target || state.exhausted {
                    return Ok(());
                }
                (state.cursor.take(), end)
            };

            let mut cursor = cursor.unwrap_or_else(|| self.resume(end));
            let next = cursor.next();

            let mut state = self.inner.state.lock();
            match next {
                Some(Ok(value)) => {
                    // A re-entrant fill may have advanced the cache meanwhile
                    if state.end() == end {
                        if let Some(cache) = state.mode.strategy_mut() {
                            cache.push(value);
                        }
                        state.cursor = Some(cursor);
                    }
                }
                Some(Err(err)) => return Err(err),
                None => {
                    trace!(produced = end, "producer exhausted");
                    state.exhausted = true;
                    return Ok(());
                }
            }
        }
    }

    /// Fresh producer run positioned after the first `skip` elements.
    /// Skipped elements are not demanded, so their failures are dropped.
    fn resume(&self, skip: usize) -> SeqIterBox<T> {
        trace!(skip, "starting producer run");
        let mut run = (self.inner.producer)();
        for _ in 0..skip {
            if run.next().is_none() {
                break;
            }
        }
        run
    }

    fn replay(&self, index: usize) -> SeqResult<Option<T>> {
        self.resume(index).next().transpose()
    }

    /// Empty, singleton or multi; computed once by peeking two elements
    pub fn shape(&self) -> SeqResult<SequenceShape<T>> {
        if let Some(shape) = self.inner.shape.get() {
            return Ok(shape.clone());
        }

        let mut run = self.iter();
        let shape = match run.next().transpose()? {
            None => SequenceShape::Empty,
            Some(first) => match run.next().transpose()? {
                None => SequenceShape::Singleton(first),
                Some(_) => SequenceShape::Multi,
            },
        };
        debug!(shape = shape.name(), target = %self.describe(), "sequence shape detected");
        Ok(self.inner.shape.get_or_init(|| shape).clone())
    }

    fn derive<U, F>(&self, build: F) -> Seq<U>
    where
        U: Element,
        F: Fn(SeqIter<T>) -> SeqIterBox<U> + Send + Sync + 'static,
    {
        let parent = self.clone();
        Seq::new(SeqInput::Producer(Arc::new(move || build(parent.iter()))))
    }

    pub fn map<U, F>(&self, f: F) -> Seq<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.derive(move |run| {
            let f = Arc::clone(&f);
            Box::new(run.map(move |item| item.map(|value| f(value))))
        })
    }

    pub fn try_map<U, F>(&self, f: F) -> Seq<U>
    where
        U: Element,
        F: Fn(T) -> SeqResult<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.derive(move |run| {
            let f = Arc::clone(&f);
            Box::new(run.map(move |item| item.and_then(|value| f(value))))
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Seq<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.derive(move |run| {
            let predicate = Arc::clone(&predicate);
            Box::new(run.filter(move |item| item.as_ref().map_or(true, |value| predicate(value))))
        })
    }

    /// Like [`Seq::filter`] with a predicate that may fail; failures are yielded in place
    pub fn try_filter<P>(&self, predicate: P) -> Seq<T>
    where
        P: Fn(&T) -> SeqResult<bool> + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.derive(move |run| {
            let predicate = Arc::clone(&predicate);
            Box::new(run.filter_map(move |item| match item {
                Ok(value) => match predicate(&value) {
                    Ok(true) => Some(Ok(value)),
                    Ok(false) => None,
                    Err(err) => Some(Err(err)),
                },
                Err(err) => Some(Err(err)),
            }))
        })
    }

    pub fn take(&self, n: usize) -> Seq<T> {
        self.derive(move |run| Box::new(run.take(n)))
    }

    /// Elements after the first `n`; skipped elements are never surfaced, failures included
    pub fn skip(&self, n: usize) -> Seq<T> {
        self.derive(move |run| Box::new(run.skip(n)))
    }

    pub fn take_while<P>(&self, predicate: P) -> Seq<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.derive(move |run| {
            let predicate = Arc::clone(&predicate);
            Box::new(run.take_while(move |item| item.as_ref().map_or(true, |value| predicate(value))))
        })
    }

    pub fn chain(&self, other: &Seq<T>) -> Seq<T> {
        let other = other.clone();
        self.derive(move |run| Box::new(run.chain(other.iter())))
    }

    /// Pairs elements positionally and stops at the shorter sequence
    pub fn zip_with<U, V, F>(&self, other: &Seq<U>, f: F) -> Seq<V>
    where
        U: Element,
        V: Element,
        F: Fn(T, U) -> SeqResult<V> + Send + Sync + 'static,
    {
        let other = other.clone();
        let f = Arc::new(f);
        self.derive(move |run| {
            let f = Arc::clone(&f);
            Box::new(run.zip(other.iter()).map(move |(left, right)| f(left?, right?)))
        })
    }

    /// Fails with [`SeqError::LimitExceeded`] when more than `limit` elements are pulled
    pub fn guarded(&self, limit: usize) -> Seq<T> {
        self.derive(move |run| {
            let mut pulled = 0usize;
            let mut tripped = false;
            Box::new(std::iter::from_fn({
                let mut run = run;
                move || {
                    if tripped {
                        return None;
                    }
                    let item = run.next()?;
                    pulled += 1;
                    if pulled > limit {
                        tripped = true;
                        return Some(Err(SeqError::LimitExceeded(limit)));
                    }
                    Some(item)
                }
            }))
        })
    }

    pub fn to_vec(&self) -> SeqResult<Vec<T>> {
        if let Some(source) = &self.inner.source {
            return Ok(source.to_vec());
        }
        self.iter().collect()
    }

    pub fn count(&self) -> SeqResult<usize> {
        if let Some(source) = &self.inner.source {
            return Ok(source.len());
        }
        self.iter().try_fold(0usize, |count, item| item.map(|_| count + 1))
    }

    pub fn first(&self) -> SeqResult<Option<T>> {
        self.iter().next().transpose()
    }

    pub fn is_empty(&self) -> SeqResult<bool> {
        Ok(self.first()?.is_none())
    }

    pub fn fold<A, F>(&self, init: A, f: F) -> SeqResult<A>
    where
        F: Fn(A, T) -> A,
    {
        self.iter().try_fold(init, |acc, item| item.map(|value| f(acc, value)))
    }

    /// Folds without a seed; `None` for the empty sequence
    pub fn reduce<F>(&self, f: F) -> SeqResult<Option<T>>
    where
        F: Fn(T, T) -> T,
    {
        self.iter().try_fold(None, |acc, item| {
            let value = item?;
            Ok(Some(match acc {
                Some(acc) => f(acc, value),
                None => value,
            }))
        })
    }
}

impl<T: Element + Serialize> Seq<T> {
    /// Fully materialized JSON array form
    pub fn to_json(&self) -> SeqResult<serde_json::Value> {
        Ok(serde_json::to_value(self.to_vec()?)?)
    }
}

impl Seq<i64> {
    /// `start, start + 1, start + 2, ...` without end
    pub fn counter_from(start: i64) -> Self {
        Self::from_producer(move || start..)
    }
}

impl<T: Element> FromIterator<T> for Seq<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Seq::new(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T: Element + Serialize> Serialize for Seq<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values = self.to_vec().map_err(serde::ser::Error::custom)?;
        values.serialize(serializer)
    }
}

impl<T: Element> fmt::Debug for Seq<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seq")
            .field("kind", &self.describe())
            .field("shape", &self.inner.shape.get().map(|shape| shape.name()))
            .finish()
    }
}

/// One traversal of a [`Seq`]
pub enum SeqIter<T> {
    Source { values: Arc<[T]>, pos: usize },
    Memo { seq: Seq<T>, pos: usize, failed: bool },
    Fresh(SeqIterBox<T>),
}

impl<T: Element> Iterator for SeqIter<T> {
    type Item = SeqResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SeqIter::Source { values, pos } => {
                let value = values.get(*pos)?.clone();
                *pos += 1;
                Some(Ok(value))
            }
            SeqIter::Memo { seq, pos, failed } => {
                if *failed {
                    return None;
                }
                match seq.element(*pos, false) {
                    Ok(Some(value)) => {
                        *pos += 1;
                        Some(Ok(value))
                    }
                    Ok(None) => None,
                    Err(err) => {
                        *failed = true;
                        Some(Err(err))
                    }
                }
            }
            SeqIter::Fresh(run) => run.next(),
        }
    }
}

impl<'a, T: Element> IntoIterator for &'a Seq<T> {
    type Item = SeqResult<T>;
    type IntoIter = SeqIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SequenceOptions;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn counting_producer(calls: Arc<AtomicUsize>, pulls: Arc<AtomicUsize>) -> Seq<i64> {
        Seq::from_producer(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let pulls = Arc::clone(&pulls);
            (1..).inspect(move |_| {
                pulls.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn test_normalization() {
        assert_eq!(Seq::once(7).to_vec().unwrap(), vec![7]);
        assert_eq!(Seq::<i32>::empty().to_vec().unwrap(), Vec::<i32>::new());
        assert_eq!(Seq::new(None::<i32>).to_vec().unwrap(), Vec::<i32>::new());
        assert_eq!(Seq::new(Some("x")).to_vec().unwrap(), vec!["x"]);
        assert_eq!(Seq::new(vec![1, 2, 3]).to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(Seq::from_iterable(1..4).to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_collection_is_authoritative() {
        let seq = Seq::with_options(vec![10, 20, 30], SequenceOptions::memo());
        assert_eq!(seq.len(), Some(3));
        assert_eq!(seq.get(1).unwrap(), Some(20));
        assert_eq!(seq.get(3).unwrap(), None);
        assert!(seq.cache_stats().unwrap().insertion_count == 0);
        assert_eq!(seq.describe(), "Seq<collection[3]>");
    }

    #[test]
    fn test_length_only_for_collections() {
        assert_eq!(Seq::counter_from(0).len(), None);
        assert_eq!(Seq::once(1).len(), None);
    }

    #[test]
    fn test_negative_index_is_range_error() {
        let seq = Seq::new(vec![1, 2]);
        assert!(matches!(seq.get(-1), Err(SeqError::Range(-1))));
    }

    #[test]
    fn test_laziness() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mapped = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&mapped);

        let seq = counting_producer(Arc::clone(&calls), Arc::new(AtomicUsize::new(0)))
            .map(move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                x * 2
            })
            .filter(|x| x % 3 == 0);

        assert_eq!(mapped.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(seq.take(2).to_vec().unwrap(), vec![6, 12]);
        assert_eq!(mapped.load(Ordering::SeqCst), 6);
        assert_eq!(seq.take(0).to_vec().unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_memo_runs_producer_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = counting_producer(Arc::clone(&calls), Arc::new(AtomicUsize::new(0)))
            .take(4)
            .memoized();

        let first = seq.to_vec().unwrap();
        let second = seq.to_vec().unwrap();
        assert_eq!(first, vec![1, 2, 3, 4]);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(seq.is_materialized());
    }

    #[test]
    fn test_memo_indexed_access_is_incremental() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pulls = Arc::new(AtomicUsize::new(0));
        let seq = counting_producer(Arc::clone(&calls), Arc::clone(&pulls)).configure(SequenceOptions::memo());

        assert_eq!(seq.get(4).unwrap(), Some(5));
        assert_eq!(pulls.load(Ordering::SeqCst), 5);
        assert_eq!(seq.get(2).unwrap(), Some(3));
        assert_eq!(seq.get(6).unwrap(), Some(7));
        assert_eq!(pulls.load(Ordering::SeqCst), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memo_prefills_target_on_first_access() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let seq = counting_producer(Arc::new(AtomicUsize::new(0)), Arc::clone(&pulls))
            .configure(SequenceOptions::memo_with_size(10));

        assert_eq!(seq.get(0).unwrap(), Some(1));
        assert_eq!(pulls.load(Ordering::SeqCst), 10);
        assert_eq!(seq.get(9).unwrap(), Some(10));
        assert_eq!(pulls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_memo_past_end_is_absent() {
        let seq = Seq::from_producer(|| 0..3).memoized();
        assert_eq!(seq.get(5).unwrap(), None);
        assert_eq!(seq.get(2).unwrap(), Some(2));
    }

    #[test]
    fn test_window_cache_replays_evicted_indices() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = counting_producer(Arc::clone(&calls), Arc::new(AtomicUsize::new(0)))
            .configure(SequenceOptions::cached(3).with_window_size(1));

        assert_eq!(seq.get(5).unwrap(), Some(6));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seq.get(3).unwrap(), Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seq.get(0).unwrap(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(seq.cache_stats().unwrap().eviction_count, 3);
    }

    #[test]
    fn test_oversized_memo_target_is_built_lazily() {
        let options = SequenceOptions::from_json(r#"{"memo": 18446744073709551615}"#).unwrap();
        let seq = Seq::counter_from(0).configure(options);
        assert_eq!(seq.take(1).to_vec().unwrap(), vec![0]);

        let seq = Seq::counter_from(5).configure(SequenceOptions::memo_with_size(usize::MAX));
        assert_eq!(seq.take(3).to_vec().unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_self_referential_memo_producer() {
        let cell: Arc<OnceLock<Seq<u64>>> = Arc::new(OnceLock::new());
        let source = Arc::clone(&cell);
        let fib = Seq::from_producer(move || {
            let source = Arc::clone(&source);
            (0i64..).map(move |i| {
                if i < 2 {
                    return 1;
                }
                let seq = source.get().unwrap();
                seq.get(i - 1).unwrap().unwrap() + seq.get(i - 2).unwrap().unwrap()
            })
        })
        .memoized();
        cell.set(fib.clone()).unwrap();

        assert_eq!(fib.take(10).to_vec().unwrap(), vec![1, 1, 2, 3, 5, 8, 13, 21, 34, 55]);
        assert_eq!(fib.get(20).unwrap(), Some(10946));
    }

    #[test]
    fn test_reentrant_fill_keeps_cache_consistent() {
        let cell: Arc<OnceLock<Seq<i64>>> = Arc::new(OnceLock::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let peeked = Arc::new(AtomicBool::new(false));

        let source = Arc::clone(&cell);
        let counted = Arc::clone(&runs);
        let seq = Seq::from_producer(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            let source = Arc::clone(&source);
            let peeked = Arc::clone(&peeked);
            (0i64..).map(move |i| {
                // The first run looks ahead once, filling the cache past its own position
                if i == 2 && !peeked.swap(true, Ordering::SeqCst) {
                    assert_eq!(source.get().unwrap().get(3).unwrap(), Some(30));
                }
                i * 10
            })
        })
        .memoized();
        cell.set(seq.clone()).unwrap();

        assert_eq!(seq.get(5).unwrap(), Some(50));
        assert_eq!(seq.take(6).to_vec().unwrap(), vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shape_detection() {
        assert_eq!(Seq::<i32>::empty().shape().unwrap(), SequenceShape::Empty);
        assert_eq!(Seq::once(3).shape().unwrap(), SequenceShape::Singleton(3));
        assert_eq!(Seq::new(vec![4]).shape().unwrap(), SequenceShape::Singleton(4));
        assert_eq!(Seq::counter_from(0).shape().unwrap(), SequenceShape::Multi);
    }

    #[test]
    fn test_shape_is_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seq = counting_producer(Arc::clone(&calls), Arc::new(AtomicUsize::new(0)));
        assert!(seq.shape().unwrap().is_multi());
        assert!(seq.shape().unwrap().is_multi());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_surface_lazily() {
        let seq = Seq::new(vec![1, 2, 0, 4]).try_map(|x| {
            if x == 0 { Err(SeqError::operation("invert", "division by zero")) } else { Ok(12 / x) }
        });

        assert_eq!(seq.take(2).to_vec().unwrap(), vec![12, 6]);
        assert!(matches!(seq.to_vec(), Err(SeqError::Operation { .. })));
        assert_eq!(seq.skip(3).to_vec().unwrap(), vec![3]);
    }

    #[test]
    fn test_guarded_trips_on_runaway_consumption() {
        let seq = Seq::counter_from(0).guarded(3);
        assert_eq!(seq.take(3).to_vec().unwrap(), vec![0, 1, 2]);
        assert!(matches!(seq.to_vec(), Err(SeqError::LimitExceeded(3))));
    }

    #[test]
    fn test_eager_helpers() {
        let seq = Seq::from_producer(|| 1..=4);
        assert_eq!(seq.count().unwrap(), 4);
        assert_eq!(seq.first().unwrap(), Some(1));
        assert!(!seq.is_empty().unwrap());
        assert!(Seq::<i32>::empty().is_empty().unwrap());
        assert_eq!(seq.fold(0, |acc, x| acc + x).unwrap(), 10);
        assert_eq!(seq.reduce(|a, b| a * b).unwrap(), Some(24));
        assert_eq!(Seq::<i32>::empty().reduce(|a, b| a + b).unwrap(), None);
    }

    #[test]
    fn test_zip_with_stops_at_shorter() {
        let left = Seq::new(vec![1, 2, 3]);
        let right = Seq::counter_from(10);
        let zipped = left.zip_with(&right, |a, b| Ok(a + b));
        assert_eq!(zipped.to_vec().unwrap(), vec![11, 13, 15]);
    }

    #[test]
    fn test_successors_and_chain() {
        let powers = Seq::successors(1u64, |x| if *x < 8 { Some(x * 2) } else { None });
        assert_eq!(powers.to_vec().unwrap(), vec![1, 2, 4, 8]);
        let both = powers.chain(&Seq::once(0));
        assert_eq!(both.to_vec().unwrap(), vec![1, 2, 4, 8, 0]);
    }

    #[test]
    fn test_to_json() {
        let seq = Seq::new(vec![1, 2, 3]).map(|x| x * 2);
        assert_eq!(seq.to_json().unwrap(), serde_json::json!([2, 4, 6]));
    }
}
