//! Per-item size accounting backed by a Fenwick (binary indexed) tree.
//!
//! | Operation   | Time     |
//! |-------------|----------|
//! | `get`       | O(1)     |
//! | `set`       | O(log n) |
//! | `offset_of` | O(log n) |
//! | `index_at`  | O(log n) |
//! | `push`      | O(log n) |
//! | `truncate`  | O(1)     |
//!
//! A measurement only patches the tree nodes that cover the measured index
//! and the indices after it; nothing before it is touched and nothing is
//! recomputed from scratch. Appending items (the common case while a feed
//! grows) extends the tree without rebuilding it.
//!
//! Invariants:
//! 1. `tree[i]` (1-based) == sum of `sizes[i - lowbit(i) .. i]`.
//! 2. `tree.len() == sizes.len() + 1`.
//! 3. `measured.len() == sizes.len()`.

#[derive(Debug, Clone)]
pub struct SizeTable {
    sizes: Vec<f64>,
    measured: Vec<bool>,
    tree: Vec<f64>,
    estimate: f64,
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl SizeTable {
    pub fn new(estimate: f64) -> Self {
        Self {
            sizes: Vec::new(),
            measured: Vec::new(),
            tree: vec![0.0],
            estimate,
        }
    }

    pub fn with_len(estimate: f64, len: usize) -> Self {
        let mut table = Self::new(estimate);
        table.sizes = vec![estimate; len];
        table.measured = vec![false; len];
        table.rebuild();
        table
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Size of `idx`, or the estimate for indices past the end.
    pub fn get(&self, idx: usize) -> f64 {
        self.sizes.get(idx).copied().unwrap_or(self.estimate)
    }

    pub fn is_measured(&self, idx: usize) -> bool {
        self.measured.get(idx).copied().unwrap_or(false)
    }

    pub fn measured_count(&self) -> usize {
        self.measured.iter().filter(|m| **m).count()
    }

    /// Grow with estimated entries or shrink from the tail.
    pub fn set_len(&mut self, len: usize) {
        if len < self.sizes.len() {
            self.truncate(len);
        } else {
            self.sizes.reserve(len - self.sizes.len());
            while self.sizes.len() < len {
                self.push(self.estimate, false);
            }
        }
    }

    fn push(&mut self, size: f64, measured: bool) {
        self.sizes.push(size);
        self.measured.push(measured);
        let i = self.sizes.len();
        let low = i - lowbit(i);
        // tree[i] covers (low, i]; the part before i is already stored in the
        // nodes reached by walking down from i - 1.
        let mut node = size;
        let mut j = i - 1;
        while j > low {
            node += self.tree[j];
            j -= lowbit(j);
        }
        self.tree.push(node);
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= self.sizes.len() {
            return;
        }
        self.sizes.truncate(len);
        self.measured.truncate(len);
        // Nodes up to `len` only cover ranges ending at or before `len`.
        self.tree.truncate(len + 1);
    }

    /// Record a size for `idx`. Returns the change applied to the total
    /// (0 when `idx` is out of range or the size is unchanged).
    pub fn set(&mut self, idx: usize, size: f64) -> f64 {
        let Some(slot) = self.sizes.get_mut(idx) else {
            return 0.0;
        };
        let delta = size - *slot;
        *slot = size;
        self.measured[idx] = true;
        if delta != 0.0 {
            let mut i = idx + 1;
            while i < self.tree.len() {
                self.tree[i] += delta;
                i += lowbit(i);
            }
        }
        delta
    }

    /// Sum of the first `count` sizes.
    fn prefix(&self, count: usize) -> f64 {
        let mut i = count.min(self.sizes.len());
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }

    /// Vertical offset of the top edge of `idx` (sum of preceding sizes).
    pub fn offset_of(&self, idx: usize) -> f64 {
        self.prefix(idx)
    }

    pub fn total(&self) -> f64 {
        self.prefix(self.sizes.len())
    }

    /// Index of the item occupying `offset`, i.e. the item `i` with
    /// `offset_of(i) <= offset < offset_of(i + 1)`. Returns `len()` when the
    /// offset lies at or past the end of the content.
    pub fn index_at(&self, offset: f64) -> usize {
        let n = self.sizes.len();
        if n == 0 || offset <= 0.0 {
            return 0;
        }
        let mut pos = 0;
        let mut rem = offset;
        let mut step = if n.is_power_of_two() {
            n
        } else {
            n.next_power_of_two() >> 1
        };
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= rem {
                pos = next;
                rem -= self.tree[next];
            }
            step >>= 1;
        }
        pos
    }

    /// Forget every measurement (positions now hold different items).
    pub fn reset(&mut self, len: usize) {
        self.sizes.clear();
        self.sizes.resize(len, self.estimate);
        self.measured.clear();
        self.measured.resize(len, false);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let n = self.sizes.len();
        self.tree.clear();
        self.tree.push(0.0);
        self.tree.extend_from_slice(&self.sizes);
        for i in 1..=n {
            let parent = i + lowbit(i);
            if parent <= n {
                let v = self.tree[i];
                self.tree[parent] += v;
            }
        }
    }
}
