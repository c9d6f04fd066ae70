//! Circular-buffer log of replicated entries.
//!
//! Indices are 1-based and stable: `base` marks the last compacted entry, so
//! addressable indices are `(base, base + count]`. Growth doubles capacity
//! and relays entries out contiguously, mirroring the reference
//! implementation's `__ensurecapacity` rather than `VecDeque`'s internal
//! growth, so the batching behavior below (`batch_up`) stays meaningful
//! across a resize.

use tracing::instrument;

use crate::entry::{Entry, EntryType, LogIndex, Term};
use crate::error::{CallbackError, Error, Result};

const INITIAL_CAPACITY: usize = 10;

fn modulo(a: isize, b: isize) -> usize {
    let r = a % b;
    (if r < 0 { r + b } else { r }) as usize
}

/// Circular buffer of log entries. Does not call back into the host itself —
/// callers (the [`crate::server::Server`] methods) pass callback closures so
/// the log stays decoupled from the `Callbacks` trait's concrete type.
pub struct Log {
    entries: Vec<Option<Entry>>,
    size: usize,
    count: usize,
    front: usize,
    back: usize,
    base: LogIndex,
    base_term: Term,
}

impl Log {
    pub fn new() -> Self {
        Log {
            entries: (0..INITIAL_CAPACITY).map(|_| None).collect(),
            size: INITIAL_CAPACITY,
            count: 0,
            front: 0,
            back: 0,
            base: 0,
            base_term: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn base(&self) -> LogIndex {
        self.base
    }

    pub fn base_term(&self) -> Term {
        self.base_term
    }

    pub fn current_idx(&self) -> LogIndex {
        self.base + self.count as LogIndex
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn has_idx(&self, idx: LogIndex) -> bool {
        self.base < idx && idx <= self.base + self.count as LogIndex
    }

    fn subscript(&self, idx: LogIndex) -> usize {
        modulo(
            self.front as isize + (idx as isize - (self.base as isize + 1)),
            self.size as isize,
        )
    }

    /// Largest run of entries starting at `idx`, at most `n`, that sits
    /// contiguously in the backing array without wrapping.
    fn batch_up(&self, idx: LogIndex, n: usize) -> usize {
        debug_assert!(n > 0);
        let low = self.subscript(idx);
        let high = self.subscript(idx + n as LogIndex - 1);
        if low <= high {
            high - low + 1
        } else {
            self.size - low
        }
    }

    fn ensure_capacity(&mut self, n: usize) -> Result<()> {
        if self.count + n <= self.size {
            return Ok(());
        }
        let mut newsize = self.size;
        while newsize < self.count + n {
            newsize *= 2;
        }
        let mut temp: Vec<Option<Entry>> = (0..newsize).map(|_| None).collect();
        if self.front < self.back {
            temp[0..self.count].clone_from_slice(&self.entries[self.front..self.back]);
        } else if self.count > 0 {
            let tail = self.size - self.front;
            temp[0..tail].clone_from_slice(&self.entries[self.front..self.size]);
            temp[tail..tail + self.back].clone_from_slice(&self.entries[0..self.back]);
        }
        self.entries = temp;
        self.size = newsize;
        self.front = 0;
        self.back = self.count;
        Ok(())
    }

    /// Look up an entry by logical index.
    pub fn get_at(&self, idx: LogIndex) -> Option<&Entry> {
        if !self.has_idx(idx) {
            return None;
        }
        self.entries[self.subscript(idx)].as_ref()
    }

    /// Term at `idx`, considering the compacted-prefix boundary: `base`
    /// itself carries `base_term` even though it holds no addressable entry.
    pub fn term_at(&self, idx: LogIndex) -> Option<Term> {
        if idx == self.base {
            return Some(self.base_term);
        }
        self.get_at(idx).map(|e| e.term)
    }

    /// Contiguous slice of up to `max` entries starting at `idx`. Returns the
    /// full remainder of the log if it fits in one contiguous run; callers
    /// that need more than one run should call repeatedly advancing `idx`.
    pub fn slice_from(&self, idx: LogIndex, max: usize) -> Vec<Entry> {
        if !self.has_idx(idx) || max == 0 {
            return Vec::new();
        }
        let avail = (self.current_idx() - idx + 1) as usize;
        let n = self.batch_up(idx, avail.min(max));
        let start = self.subscript(idx);
        self.entries[start..start + n]
            .iter()
            .map(|e| e.as_ref().expect("entries within bounds are populated").clone())
            .collect()
    }

    pub fn peek_tail(&self) -> Option<&Entry> {
        if self.count == 0 {
            return None;
        }
        let idx = if self.back == 0 { self.size - 1 } else { self.back - 1 };
        self.entries[idx].as_ref()
    }

    pub fn clear(&mut self) {
        self.count = 0;
        self.front = 0;
        self.back = 0;
        self.base = 0;
        self.base_term = 0;
    }

    /// Rebuild the log to contain only a `Snapshot` sentinel at `idx` with
    /// the given term, per the reference implementation's
    /// `log_load_from_snapshot`: the sentinel occupies `base + 1`, so after
    /// this call `current_idx() == idx` and `base == idx - 1`.
    pub fn load_from_snapshot(&mut self, idx: LogIndex, term: Term) -> Result<()> {
        self.clear();
        let sentinel = Entry::new(term, 1, EntryType::Snapshot, Vec::new());
        let mut n = 1;
        self.append_raw(std::slice::from_ref(&sentinel), &mut n)?;
        debug_assert_eq!(n, 1);
        self.base = idx - 1;
        self.base_term = term;
        Ok(())
    }

    /// Append `entries`, assigning indices `current_idx()+1 ..`. `offer` is
    /// invoked once per contiguous run with the proposed starting index and
    /// may shrink the run's accepted count; accepted entries are committed to
    /// the buffer before `offer` returning an error is propagated, so the log
    /// reflects exactly what was actually accepted.
    #[instrument(level = "debug", skip(self, entries, offer))]
    pub fn append(
        &mut self,
        entries: &[Entry],
        mut offer: impl FnMut(&[Entry], LogIndex) -> std::result::Result<usize, CallbackError>,
    ) -> Result<usize> {
        let mut n = entries.len();
        let result = self.append_with(entries, &mut n, &mut offer);
        result.map(|_| n)
    }

    fn append_with(
        &mut self,
        entries: &[Entry],
        n: &mut usize,
        offer: &mut impl FnMut(&[Entry], LogIndex) -> std::result::Result<usize, CallbackError>,
    ) -> Result<()> {
        self.ensure_capacity(*n)?;
        let total = *n;
        let mut i = 0;
        while i < total {
            let idx = self.base + self.count as LogIndex + 1;
            let k = self.batch_up(idx, total - i);
            for (slot, src) in entries[i..i + k].iter().enumerate() {
                let mut e = src.clone();
                e.index = idx + slot as LogIndex;
                self.entries[(self.back + slot) % self.size] = Some(e);
            }
            let run: Vec<Entry> = (0..k)
                .map(|slot| {
                    self.entries[(self.back + slot) % self.size]
                        .clone()
                        .expect("just written")
                })
                .collect();
            let accepted = match offer(&run, idx) {
                Ok(accepted) => accepted,
                Err(e) => {
                    *n = i;
                    return Err(Error::Callback(e));
                }
            };
            if accepted > 0 {
                self.count += accepted;
                self.back = (self.back + accepted) % self.size;
                i += accepted;
            }
            if accepted < k {
                *n = i;
                return Ok(());
            }
        }
        *n = i;
        Ok(())
    }

    fn append_raw(&mut self, entries: &[Entry], n: &mut usize) -> Result<()> {
        self.append_with(entries, n, &mut |run, _| Ok(run.len()))
    }

    /// Truncate the suffix starting at `idx` (inclusive), walking backward
    /// from the tail so `pop` sees entries in reverse-append order — this is
    /// what lets configuration-change side effects be unwound correctly.
    #[instrument(level = "debug", skip(self, pop))]
    pub fn delete_from(
        &mut self,
        idx: LogIndex,
        mut pop: impl FnMut(&Entry, LogIndex) -> std::result::Result<(), CallbackError>,
    ) -> Result<()> {
        if !self.has_idx(idx) {
            return Err(Error::InvalidCfgChange {
                reason: format!("delete_from({idx}) out of range"),
            });
        }
        while idx <= self.base + self.count as LogIndex && self.count > 0 {
            let idx_tmp = self.base + self.count as LogIndex;
            let back = modulo(self.back as isize - 1, self.size as isize);
            let entry = self.entries[back]
                .clone()
                .expect("populated slot within count");
            pop(&entry, idx_tmp).map_err(Error::Callback)?;
            self.entries[back] = None;
            self.back = back;
            self.count -= 1;
        }
        Ok(())
    }

    /// Advance `base` up to `idx`, discarding the compacted prefix. `poll`
    /// is invoked once per contiguous run from the old front forward.
    #[instrument(level = "debug", skip(self, poll))]
    pub fn poll_to(
        &mut self,
        idx: LogIndex,
        mut poll: impl FnMut(&[Entry], LogIndex) -> std::result::Result<(), CallbackError>,
    ) -> Result<()> {
        if self.count == 0 || !self.has_idx(idx) {
            return Err(Error::InvalidCfgChange {
                reason: format!("poll_to({idx}) out of range"),
            });
        }
        while self.base + 1 <= idx {
            let n = self.batch_up(self.base + 1, (idx - (self.base + 1) + 1) as usize);
            let run: Vec<Entry> = (0..n)
                .map(|off| {
                    self.entries[(self.front + off) % self.size]
                        .clone()
                        .expect("populated slot within count")
                })
                .collect();
            if let Some(last) = run.last() {
                self.base_term = last.term;
            }
            poll(&run, self.base + 1).map_err(Error::Callback)?;
            for off in 0..n {
                self.entries[(self.front + off) % self.size] = None;
            }
            self.front = (self.front + n) % self.size;
            self.count -= n;
            self.base += n as LogIndex;
        }
        Ok(())
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}
