//! Error taxonomy for the numerical kernels and scene validation.
//!
//! Structural problems (malformed trees, unknown processes, shape mismatches)
//! and invalid parameters are fatal and reported as [`CtmcError`]. Numerical
//! infeasibility of individual sites is *not* an error; it is reported through
//! the feasibility flag of an evaluation. Orchestration code wraps these errors
//! in `anyhow::Error`, from which callers can recover the kind with
//! `downcast_ref::<CtmcError>()`.

/// Result alias for kernel operations that may produce [`CtmcError`].
pub type CtmcResult<T> = Result<T, CtmcError>;

/// Unified error type for operators, exponentials, and scene validation.
#[derive(Debug, Clone, PartialEq)]
pub enum CtmcError {
    // ---- Shapes ----
    /// An operation that needs a square operator received a rectangular one.
    NotSquare { rows: usize, cols: usize },

    /// A block or operand does not conform to the operator.
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    // ---- Parameters ----
    /// A tuning parameter is out of its admissible range.
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    // ---- Scene structure ----
    /// The tree is not a rooted tree over `0..N-1`.
    Structure(String),

    /// A rate process definition is malformed.
    InvalidProcess { process: usize, reason: String },

    /// The root prior is malformed.
    InvalidPrior(String),

    /// The observation matrix is malformed.
    InvalidObservation(String),

    /// A property request is malformed or inconsistent with the scene.
    InvalidRequest(String),

    // ---- Numerics ----
    /// The requested exponential strategy cannot represent this generator.
    StrategyUnavailable {
        strategy: &'static str,
        reason: String,
    },

    /// A kernel produced non-finite output or a factorization failed.
    NumericalFailure { context: &'static str },
}

impl std::error::Error for CtmcError {}

impl std::fmt::Display for CtmcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Shapes ----
            CtmcError::NotSquare { rows, cols } => {
                write!(f, "Shape Error: expected a square operator, got {rows}x{cols}")
            }
            CtmcError::ShapeMismatch {
                context,
                expected,
                actual,
            } => write!(
                f,
                "Shape Error: {context}: expected {expected} rows, got {actual}"
            ),

            // ---- Parameters ----
            CtmcError::InvalidParameter {
                name,
                value,
                reason,
            } => write!(f, "Value Error: {name} = {value}: {reason}"),

            // ---- Scene structure ----
            CtmcError::Structure(msg) => write!(f, "Structure Error: {msg}"),
            CtmcError::InvalidProcess { process, reason } => {
                write!(f, "Process Error: process {process}: {reason}")
            }
            CtmcError::InvalidPrior(msg) => write!(f, "Prior Error: {msg}"),
            CtmcError::InvalidObservation(msg) => write!(f, "Observation Error: {msg}"),
            CtmcError::InvalidRequest(msg) => write!(f, "Request Error: {msg}"),

            // ---- Numerics ----
            CtmcError::StrategyUnavailable { strategy, reason } => {
                write!(f, "Strategy Error: {strategy} exponential unavailable: {reason}")
            }
            CtmcError::NumericalFailure { context } => {
                write!(f, "Numerical Error: non-finite result in {context}")
            }
        }
    }
}
