use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayView2, Axis, s};

/// Threshold for using parallel activation application in the accelerated
/// kernel. When the gate buffer holds fewer elements than this, sequential
/// execution is used; rayon's thread pool overhead is only amortized for
/// larger batches.
const ACCELERATED_PARALLEL_THRESHOLD: usize = 1024;

/// Applies a numerically stable sigmoid.
///
/// Clips the pre-activation to prevent overflow in `exp`.
#[inline]
pub(crate) fn stable_sigmoid(x: f32) -> f32 {
    let clipped = x.clamp(-500.0, 500.0);
    1.0 / (1.0 + (-clipped).exp())
}

/// Applies a numerically stable tanh with the same clipping convention.
#[inline]
pub(crate) fn stable_tanh(x: f32) -> f32 {
    x.clamp(-500.0, 500.0).tanh()
}

/// Fused gate computation for a single LSTM time step.
///
/// Implementations compute all four gate pre-activations with one pass over
/// the concatenated weight matrix and apply the gate nonlinearities in place,
/// writing into a caller-supplied buffer. The two variants share an identical
/// contract; which one a cell uses is decided at construction.
///
/// Gate quadrant order in the buffer is fixed: {input, forget, output,
/// candidate}. Sigmoid is applied to the first three quadrants, tanh to the
/// fourth. The backward pass relies on this layout, so implementations must
/// not reorder it.
pub trait GateKernel {
    /// Computes `gates = bias + x . W_x + h_prev . W_h` followed by the gate
    /// nonlinearities, in place.
    ///
    /// # Parameters
    ///
    /// - `x` - Input batch with shape (batch, input_size)
    /// - `h_prev` - Previous hidden state with shape (batch, output_size)
    /// - `weight` - Combined weight matrix with shape (input_size + output_size, 4 * hidden_size); rows `[0, input_size)` are the input-to-gate block, the rest the hidden-to-gate block
    /// - `bias` - Bias with shape (1, 4 * hidden_size), broadcast over the batch
    /// - `gates` - Output buffer with shape (batch, 4 * hidden_size); fully overwritten
    /// - `hidden_size` - Width of one gate quadrant
    ///
    /// # Panics
    ///
    /// - If matrix dimensions are incompatible for multiplication (callers
    ///   validate shapes before invoking the kernel)
    fn compute_gates(
        &self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        weight: &Array2<f32>,
        bias: &Array2<f32>,
        gates: &mut Array2<f32>,
        hidden_size: usize,
    );
}

/// Writes the fused pre-activations into `gates` without temporaries.
///
/// The weight matrix is split by rows into its input and hidden blocks and
/// both products accumulate directly into the output buffer.
fn fused_pre_activations(
    x: ArrayView2<f32>,
    h_prev: ArrayView2<f32>,
    weight: &Array2<f32>,
    bias: &Array2<f32>,
    gates: &mut Array2<f32>,
) {
    let input_size = x.ncols();
    let (w_x, w_h) = weight.view().split_at(Axis(0), input_size);
    general_mat_mul(1.0, &x, &w_x, 0.0, gates);
    general_mat_mul(1.0, &h_prev, &w_h, 1.0, gates);
    *gates += bias;
}

/// Sequential elementwise gate kernel.
///
/// The fallback variant: correct on any input size, no thread pool involved.
pub struct GenericKernel;

impl GateKernel for GenericKernel {
    fn compute_gates(
        &self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        weight: &Array2<f32>,
        bias: &Array2<f32>,
        gates: &mut Array2<f32>,
        hidden_size: usize,
    ) {
        fused_pre_activations(x, h_prev, weight, bias, gates);
        let split = 3 * hidden_size;
        gates.slice_mut(s![.., ..split]).mapv_inplace(stable_sigmoid);
        gates.slice_mut(s![.., split..]).mapv_inplace(stable_tanh);
    }
}

/// Rayon-accelerated gate kernel.
///
/// Identical contract to [`GenericKernel`]; for gate buffers above
/// a size threshold the sigmoid and tanh regions are activated in parallel.
/// Below the threshold it falls back to the sequential path.
pub struct AcceleratedKernel;

impl GateKernel for AcceleratedKernel {
    fn compute_gates(
        &self,
        x: ArrayView2<f32>,
        h_prev: ArrayView2<f32>,
        weight: &Array2<f32>,
        bias: &Array2<f32>,
        gates: &mut Array2<f32>,
        hidden_size: usize,
    ) {
        fused_pre_activations(x, h_prev, weight, bias, gates);
        let split = 3 * hidden_size;
        if gates.len() >= ACCELERATED_PARALLEL_THRESHOLD {
            let (mut sigmoid_part, mut tanh_part) = gates.view_mut().split_at(Axis(1), split);
            rayon::join(
                move || sigmoid_part.par_mapv_inplace(stable_sigmoid),
                move || tanh_part.par_mapv_inplace(stable_tanh),
            );
        } else {
            gates.slice_mut(s![.., ..split]).mapv_inplace(stable_sigmoid);
            gates.slice_mut(s![.., split..]).mapv_inplace(stable_tanh);
        }
    }
}
