//! Fused single-time-step LSTM/LSTMP cell with a hand-derived backward pass.
//!
//! The crate provides one recurrent building block: [`LstmCell`] computes a
//! single time step's forward update and its exact gradients, leaving
//! sequence iteration, state history and parameter updates to the caller.
//! All four gates are evaluated through one fused matrix multiply over a
//! combined weight matrix, scratch tensors are recycled across steps through
//! a [`BufferPool`], and variable-length batches are handled with a
//! per-step [`SequenceMask`].
//!
//! # Example
//!
//! Driving the cell over a short sequence, forward then backward:
//!
//! ```rust
//! use fused_lstm::LstmCell;
//! use ndarray::Array2;
//!
//! let mut cell = LstmCell::new(3, 4, None).unwrap();
//!
//! let batch = 2;
//! let xs = vec![
//!     Array2::from_elem((batch, 3), 0.5),
//!     Array2::from_elem((batch, 3), -0.5),
//! ];
//!
//! // Forward over the sequence, keeping the per-step states.
//! let mut h = Array2::zeros((batch, 4));
//! let mut c = Array2::zeros((batch, 4));
//! let mut states = vec![(h.clone(), c.clone())];
//! for x in &xs {
//!     let (next_h, next_c) = cell.forward(x.view(), h.view(), c.view(), None).unwrap();
//!     h = next_h;
//!     c = next_c;
//!     states.push((h.clone(), c.clone()));
//! }
//!
//! // Backward in reverse order, chaining the state gradients.
//! let mut grad_h = Array2::ones((batch, 4));
//! let mut grad_c = Array2::zeros((batch, 4));
//! for (x, (h_prev, c_prev)) in xs.iter().zip(&states).rev() {
//!     // Recompute the step so the saved activations match it.
//!     let _ = cell.forward(x.view(), h_prev.view(), c_prev.view(), None).unwrap();
//!     let (_, gh, gc) = cell
//!         .backward(x.view(), h_prev.view(), c_prev.view(), grad_h.view(), grad_c.view(), None)
//!         .unwrap();
//!     grad_h = gh;
//!     grad_c = gc;
//! }
//!
//! assert_eq!(cell.grad_weight().dim(), (3 + 4, 16));
//! ```

pub mod buffer;
pub mod cell;
pub mod error;
pub mod kernel;
pub mod mask;

pub use buffer::BufferPool;
pub use cell::LstmCell;
pub use error::CellError;
pub use kernel::{AcceleratedKernel, GateKernel, GenericKernel};
pub use mask::SequenceMask;
