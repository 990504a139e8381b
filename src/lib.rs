//! # veb-tree
//!
//! An ordered set of integers drawn from a fixed universe `[0, U)`, backed by
//! a van Emde Boas tree.
//!
//! Membership, insertion, removal, successor and predecessor all run in
//! O(log log U). The universe size must be a power of two, and the whole
//! recursive skeleton is allocated when the tree is built, so memory is O(U)
//! regardless of how many keys are stored.
//!
//! ## Example
//!
//! ```rust
//! use veb_tree::VebTree;
//!
//! let mut tree = VebTree::new(16)?;
//! tree.insert(1)?;
//! tree.insert(5)?;
//! tree.insert(10)?;
//!
//! assert!(tree.contains(5));
//! assert_eq!(tree.successor(5), Some(10));
//! assert_eq!(tree.predecessor(5), Some(1));
//! assert_eq!(tree.min(), Some(1));
//!
//! // Keys outside the universe are rejected and leave the tree untouched.
//! assert!(tree.insert(16).is_err());
//! assert_eq!(tree.len(), 3);
//! # Ok::<(), veb_tree::VebError>(())
//! ```

#![forbid(unsafe_code)]

use std::fmt;
use std::iter::FusedIterator;
use std::mem;

use tracing::{debug, trace, warn};

mod error;

pub use error::{Result, VebError};

// =============================================================================
// Configuration
// =============================================================================

/// Smallest supported universe.
pub const MIN_UNIVERSE: u64 = 2;

/// Largest supported universe is `2^MAX_UNIVERSE_BITS`.
pub const MAX_UNIVERSE_BITS: u32 = 63;

// =============================================================================
// Node
// =============================================================================

/// One level of the recursion.
///
/// A node over universe `U` splits every key into a cluster index (the high
/// `⌈lg U / 2⌉` bits) and an offset within that cluster (the low
/// `⌊lg U / 2⌋` bits). The node's minimum is cached here and never stored in
/// a cluster; every other member lives in exactly one cluster, and the
/// summary holds the indices of the non-empty clusters.
///
/// A node over `U = 2` is a leaf: no summary, no clusters, `min`/`max` alone
/// describe the set.
#[derive(Clone)]
struct Node {
    universe: u64,
    /// `lg(lower_sqrt)`; zero for leaves.
    lower_bits: u32,
    min: Option<u64>,
    max: Option<u64>,
    // Declared before `summary` so drop frees clusters first.
    cluster: Vec<Node>,
    summary: Option<Box<Node>>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            universe: 2,
            lower_bits: 0,
            min: None,
            max: None,
            cluster: Vec::new(),
            summary: None,
        }
    }

    /// Build an empty node over `2^bits` with every descendant allocated.
    fn build(bits: u32) -> Result<Self> {
        debug_assert!((1..=MAX_UNIVERSE_BITS).contains(&bits));
        if bits == 1 {
            return Ok(Self::leaf());
        }

        let universe = 1u64 << bits;
        let lower_bits = bits / 2;
        let upper_bits = bits - lower_bits;

        let count =
            usize::try_from(1u64 << upper_bits).map_err(|_| VebError::Allocation { universe })?;
        let mut cluster = Vec::new();
        cluster
            .try_reserve_exact(count)
            .map_err(|_| VebError::Allocation { universe })?;

        let summary = Box::new(Self::build(upper_bits)?);
        for _ in 0..count {
            cluster.push(Self::build(lower_bits)?);
        }

        Ok(Self {
            universe,
            lower_bits,
            min: None,
            max: None,
            cluster,
            summary: Some(summary),
        })
    }

    /// Number of nodes in the full skeleton over `2^bits`, or `None` if it
    /// does not fit in a `u64`.
    fn skeleton_nodes(bits: u32) -> Option<u64> {
        if bits == 1 {
            return Some(1);
        }
        let lower_bits = bits / 2;
        let upper_bits = bits - lower_bits;
        let clusters = 1u64.checked_shl(upper_bits)?;
        clusters
            .checked_mul(Self::skeleton_nodes(lower_bits)?)?
            .checked_add(Self::skeleton_nodes(upper_bits)?)?
            .checked_add(1)
    }

    /// Check that the allocator can hand out the whole skeleton over `2^bits`
    /// before building any of it.
    fn reserve_skeleton(bits: u32) -> Result<()> {
        let universe = 1u64 << bits;
        let nodes = Self::skeleton_nodes(bits)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(VebError::Allocation { universe })?;
        let mut probe: Vec<Node> = Vec::new();
        probe
            .try_reserve_exact(nodes)
            .map_err(|_| VebError::Allocation { universe })?;
        trace!(universe, nodes, "skeleton fits");
        Ok(())
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.summary.is_none()
    }

    #[inline]
    fn lower_sqrt(&self) -> u64 {
        1u64 << self.lower_bits
    }

    #[inline]
    fn upper_sqrt(&self) -> u64 {
        self.universe >> self.lower_bits
    }

    /// Cluster index of `x`.
    #[inline]
    fn high(&self, x: u64) -> usize {
        (x >> self.lower_bits) as usize
    }

    /// Offset of `x` within its cluster.
    #[inline]
    fn low(&self, x: u64) -> u64 {
        x & (self.lower_sqrt() - 1)
    }

    /// Inverse of `high`/`low`.
    #[inline]
    fn index(&self, high: u64, low: u64) -> u64 {
        (high << self.lower_bits) | low
    }

    fn summary(&self) -> &Node {
        self.summary
            .as_deref()
            .expect("inner node must have a summary")
    }

    fn summary_mut(&mut self) -> &mut Node {
        self.summary
            .as_deref_mut()
            .expect("inner node must have a summary")
    }

    #[inline]
    fn empty_insert(&mut self, x: u64) {
        self.min = Some(x);
        self.max = Some(x);
    }

    fn contains(&self, x: u64) -> bool {
        if self.min == Some(x) || self.max == Some(x) {
            return true;
        }
        if self.is_leaf() {
            return false;
        }
        self.cluster[self.high(x)].contains(self.low(x))
    }

    /// Returns `false` without touching the node if `x` is already present.
    fn insert(&mut self, mut x: u64) -> bool {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            self.empty_insert(x);
            return true;
        };
        if x == min || x == max {
            return false;
        }

        if x < min {
            // The new key becomes the cached min; the old min moves down.
            self.min = Some(x);
            x = min;
        }

        if !self.is_leaf() {
            let (h, l) = (self.high(x), self.low(x));
            let universe = self.universe;
            if self.cluster[h].min.is_none() {
                trace!(universe, cluster = h, "cluster occupied");
                self.summary_mut().insert(h as u64);
                self.cluster[h].empty_insert(l);
            } else if !self.cluster[h].insert(l) {
                return false;
            }
        }

        if x > max {
            self.max = Some(x);
        }
        true
    }

    /// Returns `false` without touching the node if `x` is absent.
    fn remove(&mut self, mut x: u64) -> bool {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            return false;
        };

        if min == max {
            if x != min {
                return false;
            }
            self.min = None;
            self.max = None;
            return true;
        }

        if self.is_leaf() {
            // Both 0 and 1 are present; keep the other one.
            let rest = x ^ 1;
            self.empty_insert(rest);
            return true;
        }

        if x == min {
            let first = self
                .summary()
                .min
                .expect("node with two members has an occupied cluster");
            let offset = self.cluster[first as usize]
                .min
                .expect("summary lists only occupied clusters");
            x = self.index(first, offset);
            self.min = Some(x);
        }

        let (h, l) = (self.high(x), self.low(x));
        if !self.cluster[h].remove(l) {
            return false;
        }

        if self.cluster[h].min.is_none() {
            trace!(universe = self.universe, cluster = h, "cluster emptied");
            self.summary_mut().remove(h as u64);
            if x == max {
                self.max = match self.summary().max {
                    Some(last) => {
                        let offset = self.cluster[last as usize]
                            .max
                            .expect("summary lists only occupied clusters");
                        Some(self.index(last, offset))
                    }
                    None => self.min,
                };
            }
        } else if x == max {
            let offset = self.cluster[h].max.expect("cluster is occupied");
            self.max = Some(self.index(h as u64, offset));
        }
        true
    }

    fn successor(&self, x: u64) -> Option<u64> {
        let Some(summary) = self.summary.as_deref() else {
            return (x == 0 && self.max == Some(1)).then_some(1);
        };

        if let Some(min) = self.min {
            if x < min {
                return Some(min);
            }
        }

        let (h, l) = (self.high(x), self.low(x));
        let cluster = &self.cluster[h];
        if cluster.max.is_some_and(|max_low| l < max_low) {
            let offset = cluster.successor(l)?;
            return Some(self.index(h as u64, offset));
        }

        let next = summary.successor(h as u64)?;
        let offset = self.cluster[next as usize].min?;
        Some(self.index(next, offset))
    }

    fn predecessor(&self, x: u64) -> Option<u64> {
        let Some(summary) = self.summary.as_deref() else {
            return (x == 1 && self.min == Some(0)).then_some(0);
        };

        if let Some(max) = self.max {
            if x > max {
                return Some(max);
            }
        }

        let (h, l) = (self.high(x), self.low(x));
        let cluster = &self.cluster[h];
        if cluster.min.is_some_and(|min_low| l > min_low) {
            let offset = cluster.predecessor(l)?;
            return Some(self.index(h as u64, offset));
        }

        match summary.predecessor(h as u64) {
            Some(prev) => {
                let offset = self.cluster[prev as usize].max?;
                Some(self.index(prev, offset))
            }
            // The cached min lives in no cluster, so check it last.
            None => self.min.filter(|&min| x > min),
        }
    }

    /// Empty the node in place. Only occupied clusters are visited.
    fn clear(&mut self) {
        if self.min.take().is_none() {
            return;
        }
        self.max = None;

        if let Some(summary) = self.summary.as_deref_mut() {
            let mut next = summary.min;
            while let Some(h) = next {
                next = summary.successor(h);
                self.cluster[h as usize].clear();
            }
            summary.clear();
        }
    }

    /// Heap bytes owned by this node and its descendants.
    fn heap_bytes(&self) -> usize {
        let clusters = self.cluster.capacity() * mem::size_of::<Node>()
            + self.cluster.iter().map(Node::heap_bytes).sum::<usize>();
        let summary = self
            .summary
            .as_deref()
            .map_or(0, |s| mem::size_of::<Node>() + s.heap_bytes());
        clusters + summary
    }
}

// =============================================================================
// VebTree
// =============================================================================

/// An ordered set of `u64` keys in `[0, universe)`.
///
/// All queries and updates take O(log log U). The tree owns its nodes
/// exclusively; mutation requires `&mut self`, so sharing a tree across
/// threads for writing needs an external lock.
#[derive(Clone)]
pub struct VebTree {
    root: Node,
    len: usize,
}

impl VebTree {
    /// Build an empty tree over `[0, universe)`.
    ///
    /// `universe` must be a power of two and at least [`MIN_UNIVERSE`].
    pub fn new(universe: u64) -> Result<Self> {
        if universe < MIN_UNIVERSE {
            return Err(VebError::UniverseTooSmall { universe });
        }
        if !universe.is_power_of_two() {
            return Err(VebError::UniverseNotPowerOfTwo { universe });
        }
        Self::with_bits(universe.trailing_zeros())
    }

    /// Build an empty tree over `[0, 2^bits)`.
    pub fn with_bits(bits: u32) -> Result<Self> {
        if bits == 0 || bits > MAX_UNIVERSE_BITS {
            return Err(VebError::UniverseBits { bits });
        }
        Node::reserve_skeleton(bits)?;
        let root = Node::build(bits)?;
        debug!(
            universe = root.universe,
            lower_sqrt = root.lower_sqrt(),
            upper_sqrt = root.upper_sqrt(),
            "built vEB tree"
        );
        Ok(Self { root, len: 0 })
    }

    /// Exclusive upper bound on keys.
    #[inline]
    pub fn universe_size(&self) -> u64 {
        self.root.universe
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest key, O(1) from the root's cached min.
    #[inline]
    pub fn min(&self) -> Option<u64> {
        self.root.min
    }

    /// Largest key, O(1) from the root's cached max.
    #[inline]
    pub fn max(&self) -> Option<u64> {
        self.root.max
    }

    /// Keys outside the universe are never members.
    pub fn contains(&self, x: u64) -> bool {
        x < self.universe_size() && self.root.contains(x)
    }

    /// Add `x` to the set.
    ///
    /// Returns `Ok(true)` if it was added and `Ok(false)` if it was already
    /// present, in which case nothing changes.
    pub fn insert(&mut self, x: u64) -> Result<bool> {
        self.check_bounds(x)?;
        let added = self.root.insert(x);
        if added {
            self.len += 1;
        }
        Ok(added)
    }

    /// Remove `x` from the set.
    ///
    /// Returns `Ok(true)` if it was removed and `Ok(false)` if it was absent.
    pub fn remove(&mut self, x: u64) -> Result<bool> {
        self.check_bounds(x)?;
        let removed = self.root.remove(x);
        if removed {
            self.len -= 1;
        }
        Ok(removed)
    }

    /// Smallest member strictly greater than `x`. `x` need not be a member.
    pub fn successor(&self, x: u64) -> Option<u64> {
        if x >= self.universe_size() {
            return None;
        }
        self.root.successor(x)
    }

    /// Largest member strictly less than `x`. `x` need not be a member.
    pub fn predecessor(&self, x: u64) -> Option<u64> {
        if x >= self.universe_size() {
            return self.max();
        }
        self.root.predecessor(x)
    }

    /// Remove every key, keeping the allocated skeleton.
    pub fn clear(&mut self) {
        debug!(universe = self.universe_size(), len = self.len, "clearing vEB tree");
        self.root.clear();
        self.len = 0;
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            next: self.min(),
            remaining: self.len,
        }
    }

    /// Approximate bytes held by the tree, including the eagerly built
    /// skeleton. Walks every node.
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>() + self.root.heap_bytes()
    }

    fn check_bounds(&self, value: u64) -> Result<()> {
        let universe = self.universe_size();
        if value >= universe {
            warn!(value, universe, "value out of bounds");
            return Err(VebError::OutOfBounds { value, universe });
        }
        Ok(())
    }
}

impl fmt::Debug for VebTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a VebTree {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the keys of a [`VebTree`].
pub struct Iter<'a> {
    tree: &'a VebTree,
    next: Option<u64>,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.successor(current);
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}
