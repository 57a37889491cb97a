use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradError {
    #[error("head '{name}' has no recorded graph; compute it inside record() from an attached variable")]
    NotRecorded { name: String },

    #[error("variable #{index} has no gradient attached; call attach_grad() before recording")]
    NotAttached { index: usize },

    #[error("variable #{index} is not part of the graph of the given heads")]
    Unreachable { index: usize },

    #[error("graph through '{op}' was already released; pass retain_graph=true to differentiate it again")]
    GraphReleased { op: String },

    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("values differ at index {index:?}: expected {expected}, got {actual} (allowed {allowed})")]
    NotClose {
        index: Vec<usize>,
        expected: f64,
        actual: f64,
        allowed: f64,
    },

    #[error("order {order} gradient check failed")]
    CheckFailed {
        order: usize,
        #[source]
        source: Box<GradError>,
    },

    #[error("cannot parse {key}={value:?}")]
    Config { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, GradError>;
