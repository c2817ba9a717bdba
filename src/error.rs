use uuid::Uuid;

/// Every failure the editing core can report.
///
/// Precondition variants are expected during normal interaction (clicking a
/// locked layer, releasing a pointer that never went down) and callers treat
/// them as no-ops. The remaining variants carry real failures.
#[derive(thiserror::Error, Debug)]
pub enum EditorError {
    #[error("no active layer")]
    NoActiveLayer,
    #[error("layer not found: {0}")]
    LayerNotFound(Uuid),
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error("layer is locked: {0}")]
    LayerLocked(Uuid),
    #[error("a {0} gesture is already in progress")]
    GestureActive(&'static str),
    #[error("no gesture in progress")]
    NoGesture,
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid project file: {0}")]
    FormatValidation(String),
    #[error("backend sync failed: {0}")]
    BackendSync(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type EditorResult<T> = Result<T, EditorError>;

impl EditorError {
    /// True for failures that mean "nothing to do here" rather than a fault.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EditorError::NoActiveLayer
                | EditorError::LayerNotFound(_)
                | EditorError::LayerLocked(_)
                | EditorError::GestureActive(_)
                | EditorError::NoGesture
        )
    }

    pub fn invalid_buffer(msg: impl Into<String>) -> Self {
        EditorError::InvalidBuffer(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        EditorError::FormatValidation(msg.into())
    }
}

impl From<bincode::Error> for EditorError {
    fn from(e: bincode::Error) -> Self {
        EditorError::Serialization(e.to_string())
    }
}
