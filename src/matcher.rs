//! Longest-common-block sequence alignment.
//!
//! The matcher aligns two ordered token sequences by repeatedly locating the
//! longest contiguous block common to both and recursing on the ranges to
//! either side of it. Ties are broken by the first-occurring block (lowest
//! index in `a`, then lowest index in `b`), so identical inputs always
//! produce identical output.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::matcher::{additions, deletions, matches};
//!
//! let a = vec!["FROM x", "RUN a"];
//! let b = vec!["FROM x", "RUN b"];
//!
//! assert_eq!(additions(&a, &b), vec!["RUN b"]);
//! assert_eq!(deletions(&a, &b), vec!["RUN a"]);
//! assert_eq!(matches(&a, &b), vec!["FROM x"]);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// A block of `size` tokens where `a[a..a + size] == b[b..b + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

/// Classification of one opcode span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Insert,
    Delete,
}

/// A classified span: `a[i1..i2]` relates to `b[j1..j2]` as described by `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode {
    pub tag: OpTag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, token) in b.iter().enumerate() {
            b2j.entry(token).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Finds the longest block common to `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Among equally long blocks the one starting earliest in `a` wins, and
    /// among those the one starting earliest in `b`.
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let mut best = Match {
            a: alo,
            b: blo,
            size: 0,
        };
        // j2len[j] = length of the longest block ending at a[i - 1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(indices) = self.b2j.get(&self.a[i]) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_j2len.insert(j, k);
                    if k > best.size {
                        best = Match {
                            a: i + 1 - k,
                            b: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = next_j2len;
        }

        best
    }

    /// Returns the matching blocks in order, terminated by the empty sentinel
    /// block `(len(a), len(b), 0)`.
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut pending = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let found = self.find_longest_match(alo, ahi, blo, bhi);
            if found.size == 0 {
                continue;
            }
            if alo < found.a && blo < found.b {
                pending.push((alo, found.a, blo, found.b));
            }
            if found.a + found.size < ahi && found.b + found.size < bhi {
                pending.push((found.a + found.size, ahi, found.b + found.size, bhi));
            }
            blocks.push(found);
        }
        blocks.sort();

        // Collapse adjacent blocks.
        let mut merged: Vec<Match> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match merged.last_mut() {
                Some(last) if last.a + last.size == block.a && last.b + last.size == block.b => {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged.push(Match {
            a: la,
            b: lb,
            size: 0,
        });
        merged
    }

    /// Describes how to turn `a` into `b` as a sequence of opcodes.
    pub fn opcodes(&self) -> Vec<OpCode> {
        let mut codes = Vec::new();
        let (mut i, mut j) = (0, 0);

        for block in self.matching_blocks() {
            let tag = match (i < block.a, j < block.b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                codes.push(OpCode {
                    tag,
                    i1: i,
                    i2: block.a,
                    j1: j,
                    j2: block.b,
                });
            }
            i = block.a + block.size;
            j = block.b + block.size;
            if block.size > 0 {
                codes.push(OpCode {
                    tag: OpTag::Equal,
                    i1: block.a,
                    i2: i,
                    j1: block.b,
                    j2: j,
                });
            }
        }

        codes
    }
}

/// Tokens of `b` that were not matched from `a`, in `b`'s order.
pub fn additions<T: Eq + Hash + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    SequenceMatcher::new(a, b)
        .opcodes()
        .into_iter()
        .filter(|op| matches!(op.tag, OpTag::Replace | OpTag::Insert))
        .flat_map(|op| b[op.j1..op.j2].iter().cloned())
        .collect()
}

/// Tokens of `a` that were not matched into `b`, in `a`'s order.
pub fn deletions<T: Eq + Hash + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    SequenceMatcher::new(a, b)
        .opcodes()
        .into_iter()
        .filter(|op| matches!(op.tag, OpTag::Replace | OpTag::Delete))
        .flat_map(|op| a[op.i1..op.i2].iter().cloned())
        .collect()
}

/// Tokens common to both sequences, in `a`'s order.
pub fn matches<T: Eq + Hash + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    SequenceMatcher::new(a, b)
        .matching_blocks()
        .into_iter()
        .filter(|block| block.size > 0)
        .flat_map(|block| a[block.a..block.a + block.size].iter().cloned())
        .collect()
}
