// src/core/bitmap.rs

//! Dense bitmaps over a fixed node-index universe `[0, len)`.
//!
//! Every other component in the controller addresses nodes by their dense
//! index rather than by name; this module is the one place that owns the
//! bit-level representation so the invariants around it (I3 in particular)
//! stay in one spot.

use std::fmt;

/// A dense, fixed-capacity bitmap over node indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBitmap {
    len: usize,
    words: Vec<u64>,
}

const WORD_BITS: usize = 64;

impl NodeBitmap {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            words: vec![0u64; len.div_ceil(WORD_BITS)],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn set(&mut self, idx: usize) {
        assert!(idx < self.len, "bitmap index {idx} out of range {}", self.len);
        self.words[idx / WORD_BITS] |= 1u64 << (idx % WORD_BITS);
    }

    pub fn clear(&mut self, idx: usize) {
        assert!(idx < self.len, "bitmap index {idx} out of range {}", self.len);
        self.words[idx / WORD_BITS] &= !(1u64 << (idx % WORD_BITS));
    }

    pub fn test(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.words[idx / WORD_BITS] & (1u64 << (idx % WORD_BITS)) != 0
    }

    /// Bitwise AND, truncated to the shorter of the two universes.
    pub fn and(&self, other: &NodeBitmap) -> NodeBitmap {
        let len = self.len.min(other.len);
        let mut out = NodeBitmap::new(len);
        for i in 0..out.words.len() {
            out.words[i] = self.words.get(i).copied().unwrap_or(0)
                & other.words.get(i).copied().unwrap_or(0);
        }
        out.mask_tail();
        out
    }

    pub fn or(&self, other: &NodeBitmap) -> NodeBitmap {
        let len = self.len.max(other.len);
        let mut out = NodeBitmap::new(len);
        for i in 0..out.words.len() {
            out.words[i] = self.words.get(i).copied().unwrap_or(0)
                | other.words.get(i).copied().unwrap_or(0);
        }
        out.mask_tail();
        out
    }

    /// Bitwise complement within this bitmap's own universe.
    pub fn not(&self) -> NodeBitmap {
        let mut out = self.clone();
        for w in out.words.iter_mut() {
            *w = !*w;
        }
        out.mask_tail();
        out
    }

    /// `self` restricted to `other`'s universe, with bits in `other` cleared.
    pub fn sub(&self, other: &NodeBitmap) -> NodeBitmap {
        self.and(&other.not_within(self.len))
    }

    fn not_within(&self, len: usize) -> NodeBitmap {
        let mut out = NodeBitmap::new(len);
        for i in 0..out.words.len() {
            out.words[i] = !self.words.get(i).copied().unwrap_or(0);
        }
        out.mask_tail();
        out
    }

    fn mask_tail(&mut self) {
        let used_bits = self.len % WORD_BITS;
        if used_bits != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= (1u64 << used_bits) - 1;
        }
    }

    pub fn is_superset(&self, other: &NodeBitmap) -> bool {
        for i in 0..other.words.len() {
            let o = other.words[i];
            let s = self.words.get(i).copied().unwrap_or(0);
            if s & o != o {
                return false;
            }
        }
        true
    }

    /// Index of the first set bit, if any ("find first set").
    pub fn ffs(&self) -> Option<usize> {
        for (wi, &w) in self.words.iter().enumerate() {
            if w != 0 {
                return Some(wi * WORD_BITS + w.trailing_zeros() as usize);
            }
        }
        None
    }

    /// Index of the last set bit, if any ("find last set").
    pub fn fls(&self) -> Option<usize> {
        for (wi, &w) in self.words.iter().enumerate().rev() {
            if w != 0 {
                return Some(wi * WORD_BITS + (63 - w.leading_zeros() as usize));
            }
        }
        None
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.test(i))
    }

    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bm = NodeBitmap::new(len);
        for i in indices {
            bm.set(i);
        }
        bm
    }

    /// Canonical textual form: a sorted, comma-joined list of indices or
    /// contiguous `lo-hi` ranges, e.g. `"0-3,7,9-10"`. This is a numeric
    /// analogue of the hostlist range syntax used for compact display when
    /// no name table is available.
    pub fn format_ranges(&self) -> String {
        let mut parts = Vec::new();
        let mut idx_iter = self.iter_set().peekable();
        while let Some(start) = idx_iter.next() {
            let mut end = start;
            while idx_iter.peek() == Some(&(end + 1)) {
                end = idx_iter.next().unwrap();
            }
            if start == end {
                parts.push(format!("{start}"));
            } else {
                parts.push(format!("{start}-{end}"));
            }
        }
        parts.join(",")
    }

    /// Inverse of [`NodeBitmap::format_ranges`] against a fixed universe length.
    pub fn parse_ranges(len: usize, s: &str) -> Result<Self, String> {
        let mut bm = NodeBitmap::new(len);
        if s.is_empty() {
            return Ok(bm);
        }
        for part in s.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: usize = lo.parse().map_err(|_| format!("bad range start {lo}"))?;
                let hi: usize = hi.parse().map_err(|_| format!("bad range end {hi}"))?;
                if lo > hi {
                    return Err(format!("inverted range {lo}-{hi}"));
                }
                for i in lo..=hi {
                    bm.set(i);
                }
            } else {
                let i: usize = part.parse().map_err(|_| format!("bad index {part}"))?;
                bm.set(i);
            }
        }
        Ok(bm)
    }
}

impl Default for NodeBitmap {
    fn default() -> Self {
        NodeBitmap::new(0)
    }
}

impl fmt::Display for NodeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_ranges())
    }
}
