use ndarray::{Array1, Array2, ArrayView2};

use crate::error::CellError;

/// Per-batch-row padding mask for variable-length sequences.
///
/// One boolean per batch row, `true` where the current time step is padding
/// for that row. The mask is set by the caller once per time step and
/// consumed by both the forward and the backward pass of the cell: forward
/// freezes the state of padded rows, backward suppresses their gradients.
/// An absent mask means identity behavior.
///
/// The cell has no sequence-length awareness of its own; the surrounding
/// sequence driver decides which rows are padded at each step, typically via
/// [`SequenceMask::from_lengths`].
pub struct SequenceMask {
    padded: Array1<bool>,
}

impl SequenceMask {
    /// Creates a mask from an explicit padding vector.
    ///
    /// # Parameters
    ///
    /// * `padded` - One entry per batch row, `true` = padded at this step
    pub fn new(padded: Array1<bool>) -> Self {
        Self { padded }
    }

    /// Creates the mask for time step `step` of a batch of sequences with
    /// the given lengths. Row `r` is padded once `step >= lengths[r]`.
    ///
    /// # Parameters
    ///
    /// - `lengths` - Sequence length per batch row
    /// - `step` - Zero-based time step index
    pub fn from_lengths(lengths: &[usize], step: usize) -> Self {
        Self {
            padded: lengths.iter().map(|&len| step >= len).collect(),
        }
    }

    /// Returns the batch size this mask applies to.
    pub fn batch_size(&self) -> usize {
        self.padded.len()
    }

    /// Returns whether the given batch row is padded.
    pub fn is_padded(&self, row: usize) -> bool {
        self.padded[row]
    }

    /// Returns whether any row is padded.
    pub fn any_padded(&self) -> bool {
        self.padded.iter().any(|&p| p)
    }

    /// Overwrites the padded rows of `dst` with the corresponding rows of
    /// `src`, in place.
    ///
    /// This is the freeze-forward masking step: a padded row keeps its
    /// previous state instead of the freshly computed update. `dst` is
    /// mutated; unpadded rows are untouched.
    pub fn freeze_rows(&self, dst: &mut Array2<f32>, src: ArrayView2<f32>) {
        for (row, &padded) in self.padded.iter().enumerate() {
            if padded {
                dst.row_mut(row).assign(&src.row(row));
            }
        }
    }

    /// Zeroes the padded rows of `dst` in place.
    ///
    /// Used on incoming gradients so padded steps contribute nothing to
    /// parameter gradients or to the gradients propagated to earlier steps.
    pub fn zero_rows(&self, dst: &mut Array2<f32>) {
        for (row, &padded) in self.padded.iter().enumerate() {
            if padded {
                dst.row_mut(row).fill(0.0);
            }
        }
    }

    pub(crate) fn validate_batch(&self, batch: usize) -> Result<(), CellError> {
        if self.padded.len() != batch {
            return Err(CellError::InputValidationError(format!(
                "mask has {} rows but the batch has {}",
                self.padded.len(),
                batch
            )));
        }
        Ok(())
    }
}
