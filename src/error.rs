/// Error types that can occur during cell operations
///
/// # Variants
///
/// - `InputValidationError` - indicates a configuration or shape mismatch; raised before any tensor computation
/// - `ProcessingError` - indicates that there is something wrong while processing
#[derive(Debug, Clone, PartialEq)]
pub enum CellError {
    InputValidationError(String),
    ProcessingError(String),
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellError::InputValidationError(msg) => write!(f, "Input validation error: {}", msg),
            CellError::ProcessingError(msg) => write!(f, "Processing error: {}", msg),
        }
    }
}

/// Implements the standard error trait for CellError
impl std::error::Error for CellError {}
