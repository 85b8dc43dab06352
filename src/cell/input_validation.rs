use super::*;

/// Validates that a dimension value is greater than 0
///
/// # Parameters
///
/// - `value` - The dimension value to validate
/// - `name` - The name of the dimension for error messages
///
/// # Returns
///
/// * `Ok(())` if validation passes
/// * `Err(CellError)` if validation fails
pub(super) fn validate_dimension_greater_than_zero(
    value: usize,
    name: &str,
) -> Result<(), CellError> {
    if value == 0 {
        return Err(CellError::InputValidationError(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}

/// Validates that a tensor has the expected number of columns
pub(super) fn validate_width(
    tensor: &ArrayView2<f32>,
    expected: usize,
    name: &str,
) -> Result<(), CellError> {
    if tensor.ncols() != expected {
        return Err(CellError::InputValidationError(format!(
            "{} has {} columns, expected {}",
            name,
            tensor.ncols(),
            expected
        )));
    }
    Ok(())
}

/// Validates that a tensor has the expected number of batch rows
pub(super) fn validate_batch_match(
    tensor: &ArrayView2<f32>,
    batch: usize,
    name: &str,
) -> Result<(), CellError> {
    if tensor.nrows() != batch {
        return Err(CellError::InputValidationError(format!(
            "{} has {} rows but the batch has {}",
            name,
            tensor.nrows(),
            batch
        )));
    }
    Ok(())
}
