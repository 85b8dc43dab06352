use ahash::AHashMap;
use ndarray::Array2;

/// Scratch-tensor cache keyed by `(owner id, purpose tag)`.
///
/// A recurrent cell needs the same handful of transient buffers on every
/// time step (gate activations, gate gradients, cell-gradient scratch).
/// Allocating them per step churns the allocator across thousands of steps,
/// so the pool keeps the backing storage alive between calls: `acquire`
/// hands the storage out as an owned `Array2`, `release` puts it back under
/// the same key. Storage grows monotonically - a request never shrinks the
/// capacity retained for a key.
///
/// The pool is deliberately not thread-safe (`&mut self` everywhere); one
/// pool instance serves one execution context. Cells sharing a pool must
/// hold distinct owner ids from [`BufferPool::register_owner`] so their
/// buffers never alias.
///
/// Buffer contents are unspecified on `acquire`: callers must overwrite
/// before reading.
///
/// # Example
/// ```rust
/// use fused_lstm::BufferPool;
///
/// let mut pool = BufferPool::new();
/// let owner = pool.register_owner();
/// let mut scratch = pool.acquire(owner, "gates", 2, 8);
/// scratch.fill(0.0);
/// pool.release(owner, "gates", scratch);
/// ```
pub struct BufferPool {
    slots: AHashMap<(usize, &'static str), Vec<f32>>,
    next_owner: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: AHashMap::new(),
            next_owner: 0,
        }
    }

    /// Allocates a fresh owner id, distinct from every id handed out before.
    ///
    /// # Returns
    ///
    /// * `usize` - The new owner id
    pub fn register_owner(&mut self) -> usize {
        let owner = self.next_owner;
        self.next_owner += 1;
        owner
    }

    /// Checks out the buffer stored under `(owner, purpose)`, resized to the
    /// requested shape.
    ///
    /// The first call for a key allocates; later calls reuse the storage that
    /// was last released under that key (capacity is retained even when the
    /// requested shape is smaller). Contents are unspecified.
    ///
    /// # Parameters
    ///
    /// - `owner` - Owner id obtained from [`BufferPool::register_owner`]
    /// - `purpose` - Purpose tag distinguishing buffers of the same owner
    /// - `rows` - Number of rows of the requested buffer
    /// - `cols` - Number of columns of the requested buffer
    ///
    /// # Returns
    ///
    /// * `Array2<f32>` - An owned buffer with shape `(rows, cols)`
    pub fn acquire(
        &mut self,
        owner: usize,
        purpose: &'static str,
        rows: usize,
        cols: usize,
    ) -> Array2<f32> {
        let mut storage = self.slots.remove(&(owner, purpose)).unwrap_or_default();
        // Vec keeps its capacity when truncated, so shrinking requests still
        // reuse the largest allocation seen for this key.
        storage.resize(rows * cols, 0.0);
        Array2::from_shape_vec((rows, cols), storage).unwrap()
    }

    /// Returns a buffer to the pool so the next `acquire` under the same key
    /// reuses its storage.
    ///
    /// # Parameters
    ///
    /// - `owner` - Owner id the buffer was acquired under
    /// - `purpose` - Purpose tag the buffer was acquired under
    /// - `buffer` - The buffer to check back in
    pub fn release(&mut self, owner: usize, purpose: &'static str, buffer: Array2<f32>) {
        let (storage, _) = buffer.into_raw_vec_and_offset();
        self.slots.insert((owner, purpose), storage);
    }

    /// Returns the number of buffers currently checked in.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
