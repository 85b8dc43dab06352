use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayView2, Axis, azip, s};
use rand::Rng;
use rand_distr::Uniform;

use crate::buffer::BufferPool;
use crate::error::CellError;
use crate::kernel::{AcceleratedKernel, GateKernel, stable_tanh};
use crate::mask::SequenceMask;

/// Shape/dimension validation functions for the cell
mod input_validation;
use input_validation::*;

// Pool purpose tags for the per-step transient buffers.
const BUF_GATES: &str = "gates";
const BUF_GRAD_GATES: &str = "grad_gates";
const BUF_GRAD_CELL: &str = "grad_cell";

/// Forward quantities saved for the backward pass of one time step.
///
/// `gates` is pool-owned storage and goes back to the pool when the cache is
/// consumed or replaced.
struct StepCache {
    gates: Array2<f32>,
    next_c: Array2<f32>,
    hidden_full: Array2<f32>,
}

/// Fused single-time-step LSTM cell, optionally with output projection
/// (LSTMP).
///
/// Computes one time step's hidden/cell update from an input batch and the
/// previous hidden/cell state, and the exact gradients of that update in a
/// hand-derived backward pass. The surrounding sequence driver owns the
/// per-step state history and invokes the cell once per time step, forward in
/// chronological order and backward in reverse.
///
/// # Parameters and layout
///
/// All four gates live in one combined weight matrix of shape
/// `(input_size + output_size, 4 * hidden_size)` so a single fused matrix
/// multiply produces every gate pre-activation. Rows `[0, input_size)` map
/// the input, the remaining rows map the previous hidden state. Gate
/// quadrants are ordered {input, forget, output, candidate}; the forget
/// quadrant of the bias is initialized to 1.0 (a standard convention that
/// eases early training, not a correctness requirement).
///
/// When `output_size` differs from `hidden_size` the cell operates in
/// projection mode: the recurrent output is `hidden_full . W_proj` with
/// `W_proj` of shape `(hidden_size, output_size)`, decoupling memory
/// capacity from output width. The unprojected `hidden_full` is retained
/// internally because the backward pass needs it.
///
/// # Gradients
///
/// `grad_weight`, `grad_bias` and `grad_projection` accumulate with scale
/// 1.0 across backward calls; the optimizer reads them through the accessors
/// and resets them with [`LstmCell::zero_gradients`] once per optimization
/// step (not once per time step).
///
/// # Example
/// ```rust
/// use fused_lstm::LstmCell;
/// use ndarray::Array2;
///
/// let mut cell = LstmCell::new(3, 4, None).unwrap();
/// let x = Array2::ones((2, 3));
/// let h0 = Array2::zeros((2, 4));
/// let c0 = Array2::zeros((2, 4));
///
/// let (h1, c1) = cell.forward(x.view(), h0.view(), c0.view(), None).unwrap();
/// assert_eq!(h1.dim(), (2, 4));
/// assert_eq!(c1.dim(), (2, 4));
///
/// let grad_h = Array2::ones((2, 4));
/// let grad_c = Array2::zeros((2, 4));
/// let (grad_x, _grad_h0, _grad_c0) = cell
///     .backward(x.view(), h0.view(), c0.view(), grad_h.view(), grad_c.view(), None)
///     .unwrap();
/// assert_eq!(grad_x.dim(), (2, 3));
/// ```
pub struct LstmCell {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,

    weight: Array2<f32>,     // (input_size + output_size, 4 * hidden_size)
    bias: Array2<f32>,       // (1, 4 * hidden_size)
    projection: Option<Array2<f32>>, // (hidden_size, output_size), iff sizes differ

    grad_weight: Array2<f32>,
    grad_bias: Array2<f32>,
    grad_projection: Option<Array2<f32>>,

    kernel: Box<dyn GateKernel>,
    pool: BufferPool,
    owner: usize,

    cache: Option<StepCache>,
}

impl LstmCell {
    /// Creates a cell with the default (accelerated) gate kernel and its own
    /// buffer pool.
    ///
    /// # Parameters
    ///
    /// - `input_size` - Width of the input vectors
    /// - `hidden_size` - Width of the cell state
    /// - `output_size` - Width of the hidden output; `None` means
    ///   `hidden_size`. A value different from `hidden_size` activates
    ///   projection mode
    ///
    /// # Returns
    ///
    /// * `Result<Self, CellError>` - The cell with Xavier-initialized weights
    ///
    /// # Errors
    ///
    /// - `CellError::InputValidationError` - If any dimension is 0
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        output_size: Option<usize>,
    ) -> Result<Self, CellError> {
        Self::new_with_kernel(input_size, hidden_size, output_size, Box::new(AcceleratedKernel))
    }

    /// Creates a cell with an explicit gate kernel.
    pub fn new_with_kernel(
        input_size: usize,
        hidden_size: usize,
        output_size: Option<usize>,
        kernel: Box<dyn GateKernel>,
    ) -> Result<Self, CellError> {
        Self::new_with_pool(input_size, hidden_size, output_size, kernel, BufferPool::new())
    }

    /// Creates a cell with an explicit gate kernel and an externally supplied
    /// buffer pool.
    ///
    /// The cell registers itself as a new owner in the pool, so several cells
    /// of one execution context can share a pool without their scratch
    /// buffers aliasing. Concurrently evaluated contexts must use separate
    /// pools.
    pub fn new_with_pool(
        input_size: usize,
        hidden_size: usize,
        output_size: Option<usize>,
        kernel: Box<dyn GateKernel>,
        mut pool: BufferPool,
    ) -> Result<Self, CellError> {
        validate_dimension_greater_than_zero(input_size, "input_size")?;
        validate_dimension_greater_than_zero(hidden_size, "hidden_size")?;
        let output_size = output_size.unwrap_or(hidden_size);
        validate_dimension_greater_than_zero(output_size, "output_size")?;

        let gate_cols = 4 * hidden_size;
        let weight_rows = input_size + output_size;
        let mut rng = rand::rng();

        // Xavier/Glorot initialization for the combined weight
        let limit = (6.0 / (weight_rows + gate_cols) as f32).sqrt();
        let dist = Uniform::new(-limit, limit).unwrap();
        let weight = Array2::from_shape_fn((weight_rows, gate_cols), |_| rng.sample(dist));

        // Bias starts at zero except the forget quadrant
        let mut bias = Array2::zeros((1, gate_cols));
        bias.slice_mut(s![.., hidden_size..2 * hidden_size]).fill(1.0);

        let projection = if output_size != hidden_size {
            let limit = (6.0 / (hidden_size + output_size) as f32).sqrt();
            let dist = Uniform::new(-limit, limit).unwrap();
            Some(Array2::from_shape_fn((hidden_size, output_size), |_| {
                rng.sample(dist)
            }))
        } else {
            None
        };
        let grad_projection = projection.as_ref().map(|p| Array2::zeros(p.raw_dim()));

        let owner = pool.register_owner();

        Ok(Self {
            input_size,
            hidden_size,
            output_size,
            weight,
            bias,
            projection,
            grad_weight: Array2::zeros((weight_rows, gate_cols)),
            grad_bias: Array2::zeros((1, gate_cols)),
            grad_projection,
            kernel,
            pool,
            owner,
            cache: None,
        })
    }

    /// Returns the input width.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Returns the cell-state width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Returns the hidden-output width (equals `hidden_size` unless the cell
    /// is in projection mode).
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Returns a reference to the combined weight matrix.
    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    /// Returns a reference to the bias.
    pub fn bias(&self) -> &Array2<f32> {
        &self.bias
    }

    /// Returns the projection matrix, present iff the cell is in projection
    /// mode.
    pub fn projection(&self) -> Option<&Array2<f32>> {
        self.projection.as_ref()
    }

    /// Returns the accumulated weight gradient.
    pub fn grad_weight(&self) -> &Array2<f32> {
        &self.grad_weight
    }

    /// Returns the accumulated bias gradient.
    pub fn grad_bias(&self) -> &Array2<f32> {
        &self.grad_bias
    }

    /// Returns the accumulated projection gradient, if in projection mode.
    pub fn grad_projection(&self) -> Option<&Array2<f32>> {
        self.grad_projection.as_ref()
    }

    /// Mutable access to the combined weight matrix, for the optimizer.
    pub fn weight_mut(&mut self) -> &mut Array2<f32> {
        &mut self.weight
    }

    /// Mutable access to the bias, for the optimizer.
    pub fn bias_mut(&mut self) -> &mut Array2<f32> {
        &mut self.bias
    }

    /// Mutable access to the projection matrix, for the optimizer.
    pub fn projection_mut(&mut self) -> Option<&mut Array2<f32>> {
        self.projection.as_mut()
    }

    /// Returns the total number of trainable parameters.
    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.len() + self.projection.as_ref().map_or(0, |p| p.len())
    }

    /// Resets all accumulated gradients to zero.
    ///
    /// Call this exactly once per optimization step, not once per time step:
    /// within one step the backward calls of all time steps accumulate into
    /// the same gradient tensors.
    pub fn zero_gradients(&mut self) {
        self.grad_weight.fill(0.0);
        self.grad_bias.fill(0.0);
        if let Some(grad_proj) = &mut self.grad_projection {
            grad_proj.fill(0.0);
        }
    }

    /// Replaces the cell parameters.
    ///
    /// The weight-matrix row partition of the constructor must be preserved:
    /// rows `[0, input_size)` input-to-gate, the rest hidden-to-gate, gate
    /// quadrants ordered {input, forget, output, candidate}. Any pending
    /// saved forward state is discarded.
    ///
    /// # Parameters
    ///
    /// - `weight` - Combined weight matrix, shape (input_size + output_size, 4 * hidden_size)
    /// - `bias` - Bias, shape (1, 4 * hidden_size)
    /// - `projection` - Projection matrix, shape (hidden_size, output_size); required iff the cell is in projection mode
    ///
    /// # Errors
    ///
    /// - `CellError::InputValidationError` - On any shape mismatch or when
    ///   the projection argument does not match the cell's mode
    pub fn set_weights(
        &mut self,
        weight: Array2<f32>,
        bias: Array2<f32>,
        projection: Option<Array2<f32>>,
    ) -> Result<(), CellError> {
        let weight_rows = self.input_size + self.output_size;
        let gate_cols = 4 * self.hidden_size;
        if weight.dim() != (weight_rows, gate_cols) {
            return Err(CellError::InputValidationError(format!(
                "weight has shape {:?}, expected ({}, {})",
                weight.dim(),
                weight_rows,
                gate_cols
            )));
        }
        if bias.dim() != (1, gate_cols) {
            return Err(CellError::InputValidationError(format!(
                "bias has shape {:?}, expected (1, {})",
                bias.dim(),
                gate_cols
            )));
        }
        match (&self.projection, &projection) {
            (None, None) => {}
            (Some(_), Some(proj)) => {
                if proj.dim() != (self.hidden_size, self.output_size) {
                    return Err(CellError::InputValidationError(format!(
                        "projection has shape {:?}, expected ({}, {})",
                        proj.dim(),
                        self.hidden_size,
                        self.output_size
                    )));
                }
            }
            (Some(_), None) => {
                return Err(CellError::InputValidationError(
                    "projection matrix required when output_size != hidden_size".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(CellError::InputValidationError(
                    "projection matrix not accepted when output_size == hidden_size".to_string(),
                ));
            }
        }

        self.weight = weight;
        self.bias = bias;
        self.projection = projection;
        self.recycle_cache();
        Ok(())
    }

    /// Computes one forward time step.
    ///
    /// `next_c = f * c_prev + i * g`, `hidden_full = o * tanh(next_c)`; in
    /// projection mode the returned hidden state is `hidden_full . W_proj`.
    /// The gate activations and cell state are saved for the next `backward`
    /// call.
    ///
    /// Masking uses freeze-forward semantics: for every batch row the mask
    /// flags as padded, the returned `next_h`/`next_c` rows are the
    /// unchanged `h_prev`/`c_prev` rows, so a row that is unmasked later in
    /// the sequence resumes from intact state.
    ///
    /// # Parameters
    ///
    /// - `x` - Input batch, shape (batch, input_size)
    /// - `h_prev` - Previous hidden state, shape (batch, output_size)
    /// - `c_prev` - Previous cell state, shape (batch, hidden_size)
    /// - `mask` - Optional padding mask for this time step
    ///
    /// # Returns
    ///
    /// * `Result<(Array2<f32>, Array2<f32>), CellError>` - `(next_h, next_c)`
    ///   with shapes (batch, output_size) and (batch, hidden_size)
    ///
    /// # Errors
    ///
    /// - `CellError::InputValidationError` - On any shape or mask-length
    ///   mismatch, before any tensor computation
    pub fn forward(
        &mut self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        c_prev: ArrayView2<f32>,
        mask: Option<&SequenceMask>,
    ) -> Result<(Array2<f32>, Array2<f32>), CellError> {
        let batch = self.validate_step_inputs(&x, &h_prev, &c_prev)?;
        if let Some(mask) = mask {
            mask.validate_batch(batch)?;
        }

        self.recycle_cache();
        let mut cache = self.compute_step(x, h_prev, c_prev);

        let mut next_c = cache.next_c.clone();
        let mut next_h = match &self.projection {
            Some(proj) => cache.hidden_full.dot(proj),
            None => cache.hidden_full.clone(),
        };

        if let Some(mask) = mask {
            mask.freeze_rows(&mut next_h, h_prev);
            mask.freeze_rows(&mut next_c, c_prev);
            mask.zero_rows(&mut cache.gates);
        }

        self.cache = Some(cache);
        Ok((next_h, next_c))
    }

    /// Computes the backward pass of one time step.
    ///
    /// Consumes the forward state saved by the matching `forward` call and
    /// produces the gradients w.r.t. the step inputs; parameter gradients
    /// accumulate into the cell with scale 1.0. Backward calls must proceed
    /// in reverse chronological order across time steps, feeding each step's
    /// `grad_h_prev`/`grad_c_prev` into the previous step's call
    /// (`grad_c_next` is zero at the final step).
    ///
    /// If no saved forward state is available - `backward` called without a
    /// preceding `forward`, or called twice in a row - the forward
    /// quantities are recomputed from the arguments, so the result is
    /// identical to calling `backward` right after `forward` (permissive
    /// call-sequence policy).
    ///
    /// Masked rows of `grad_h_next`/`grad_c_next` are zeroed on internal
    /// copies before use; the caller's tensors are not mutated. Padded rows
    /// therefore contribute nothing to parameter gradients, and their rows
    /// in every returned gradient are zero.
    ///
    /// # Parameters
    ///
    /// - `x`, `h_prev`, `c_prev` - The same tensors passed to the matching `forward`
    /// - `grad_h_next` - Gradient w.r.t. the step's hidden output, shape (batch, output_size)
    /// - `grad_c_next` - Gradient w.r.t. the step's cell output, shape (batch, hidden_size)
    /// - `mask` - The mask used in the matching `forward`, if any
    ///
    /// # Returns
    ///
    /// * `Result<(Array2<f32>, Array2<f32>, Array2<f32>), CellError>` -
    ///   `(grad_x, grad_h_prev, grad_c_prev)`
    ///
    /// # Errors
    ///
    /// - `CellError::InputValidationError` - On any shape or mask-length
    ///   mismatch
    pub fn backward(
        &mut self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        c_prev: ArrayView2<f32>,
        grad_h_next: ArrayView2<f32>,
        grad_c_next: ArrayView2<f32>,
        mask: Option<&SequenceMask>,
    ) -> Result<(Array2<f32>, Array2<f32>, Array2<f32>), CellError> {
        let batch = self.validate_step_inputs(&x, &h_prev, &c_prev)?;
        validate_width(&grad_h_next, self.output_size, "grad_h_next")?;
        validate_batch_match(&grad_h_next, batch, "grad_h_next")?;
        validate_width(&grad_c_next, self.hidden_size, "grad_c_next")?;
        validate_batch_match(&grad_c_next, batch, "grad_c_next")?;
        if let Some(mask) = mask {
            mask.validate_batch(batch)?;
        }

        // Saved activations are consumed per call; recompute when absent or
        // shaped for a different batch.
        let cache = match self.cache.take() {
            Some(cache) if cache.gates.nrows() == batch => cache,
            Some(stale) => {
                self.pool.release(self.owner, BUF_GATES, stale.gates);
                self.compute_step(x, h_prev, c_prev)
            }
            None => self.compute_step(x, h_prev, c_prev),
        };

        let hsz = self.hidden_size;

        // Padding steps contribute no gradient
        let mut grad_out = grad_h_next.to_owned();
        let mut grad_c_in = grad_c_next.to_owned();
        if let Some(mask) = mask {
            mask.zero_rows(&mut grad_out);
            mask.zero_rows(&mut grad_c_in);
        }

        // Projection path: accumulate grad_W_proj and pull the gradient back
        // to the unprojected hidden state.
        let grad_hidden = match (&self.projection, &mut self.grad_projection) {
            (Some(proj), Some(grad_proj)) => {
                general_mat_mul(1.0, &cache.hidden_full.t(), &grad_out, 1.0, grad_proj);
                grad_out.dot(&proj.t())
            }
            _ => grad_out,
        };

        // tanh(next_c), later overwritten in place by the running cell
        // gradient to avoid a second scratch buffer.
        let mut tanh_c = self.pool.acquire(self.owner, BUF_GRAD_CELL, batch, hsz);
        tanh_c.assign(&cache.next_c);
        tanh_c.mapv_inplace(stable_tanh);

        let mut grad_gates = self.pool.acquire(self.owner, BUF_GRAD_GATES, batch, 4 * hsz);
        {
            let i = cache.gates.slice(s![.., ..hsz]);
            let f = cache.gates.slice(s![.., hsz..2 * hsz]);
            let o = cache.gates.slice(s![.., 2 * hsz..3 * hsz]);
            let g = cache.gates.slice(s![.., 3 * hsz..]);
            let (mut d_i, mut d_f, mut d_o, mut d_g) = grad_gates.multi_slice_mut((
                s![.., ..hsz],
                s![.., hsz..2 * hsz],
                s![.., 2 * hsz..3 * hsz],
                s![.., 3 * hsz..],
            ));

            // Output gate, through h = o * tanh(c) and the sigmoid derivative
            azip!((d in &mut d_o, &t in &tanh_c, &ov in &o, &gh in &grad_hidden)
                *d = gh * t * ov * (1.0 - ov));

            // Running cell gradient: o * (1 - tanh^2(c)) * grad_h + grad_c,
            // written over the tanh buffer (the old value feeds the update)
            azip!((t in &mut tanh_c, &ov in &o, &gh in &grad_hidden, &gc in &grad_c_in)
                *t = ov * (1.0 - *t * *t) * gh + gc);

            azip!((d in &mut d_i, &iv in &i, &gv in &g, &gc in &tanh_c)
                *d = gv * iv * (1.0 - iv) * gc);
            azip!((d in &mut d_g, &gv in &g, &iv in &i, &gc in &tanh_c)
                *d = (1.0 - gv * gv) * iv * gc);
            azip!((d in &mut d_f, &fv in &f, &cp in &c_prev, &gc in &tanh_c)
                *d = cp * fv * (1.0 - fv) * gc);
        }

        // Gradient into the previous cell state, through the forget gate
        let grad_prev_c = {
            let f = cache.gates.slice(s![.., hsz..2 * hsz]);
            &f * &tanh_c
        };

        // Propagate through the fused affine transform and accumulate the
        // parameter gradients.
        let (w_x, w_h) = self.weight.view().split_at(Axis(0), self.input_size);
        let grad_x = grad_gates.dot(&w_x.t());
        let grad_prev_h = grad_gates.dot(&w_h.t());

        general_mat_mul(
            1.0,
            &x.t(),
            &grad_gates,
            1.0,
            &mut self.grad_weight.slice_mut(s![..self.input_size, ..]),
        );
        general_mat_mul(
            1.0,
            &h_prev.t(),
            &grad_gates,
            1.0,
            &mut self.grad_weight.slice_mut(s![self.input_size.., ..]),
        );
        let bias_update = grad_gates.sum_axis(Axis(0)).insert_axis(Axis(0));
        self.grad_bias += &bias_update;

        self.pool.release(self.owner, BUF_GRAD_CELL, tanh_c);
        self.pool.release(self.owner, BUF_GRAD_GATES, grad_gates);
        self.pool.release(self.owner, BUF_GATES, cache.gates);

        Ok((grad_x, grad_prev_h, grad_prev_c))
    }

    /// Runs the fused gate computation and cell update, returning the saved
    /// forward quantities. The gate buffer comes from the pool.
    fn compute_step(
        &mut self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        c_prev: ArrayView2<f32>,
    ) -> StepCache {
        let batch = x.nrows();
        let hsz = self.hidden_size;

        let mut gates = self.pool.acquire(self.owner, BUF_GATES, batch, 4 * hsz);
        self.kernel
            .compute_gates(x, h_prev, &self.weight, &self.bias, &mut gates, hsz);

        let i = gates.slice(s![.., ..hsz]);
        let f = gates.slice(s![.., hsz..2 * hsz]);
        let o = gates.slice(s![.., 2 * hsz..3 * hsz]);
        let g = gates.slice(s![.., 3 * hsz..]);

        let next_c = &f * &c_prev + &i * &g;
        let mut hidden_full = next_c.mapv(stable_tanh);
        hidden_full *= &o;

        StepCache {
            gates,
            next_c,
            hidden_full,
        }
    }

    /// Returns a stale step cache's pooled buffer before it is replaced, so
    /// forward-only loops still reuse storage.
    fn recycle_cache(&mut self) {
        if let Some(cache) = self.cache.take() {
            self.pool.release(self.owner, BUF_GATES, cache.gates);
        }
    }

    fn validate_step_inputs(
        &self,
        x: &ArrayView2<f32>,
        h_prev: &ArrayView2<f32>,
        c_prev: &ArrayView2<f32>,
    ) -> Result<usize, CellError> {
        validate_width(x, self.input_size, "x")?;
        validate_width(h_prev, self.output_size, "h_prev")?;
        validate_width(c_prev, self.hidden_size, "c_prev")?;
        let batch = x.nrows();
        validate_batch_match(h_prev, batch, "h_prev")?;
        validate_batch_match(c_prev, batch, "c_prev")?;
        Ok(batch)
    }
}
