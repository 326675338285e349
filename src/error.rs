use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AnnealError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("The cooling step needs at least two samples, found {0}")]
    TooFewSamples(usize),
    #[error("Annealing temperature {0} is outside of [0, 1]")]
    BetaOutOfRange(f64),
    #[error("Importance weights are degenerate (total mass {0})")]
    DegenerateWeights(f64),
    #[error("Eigendecomposition of the covariance failed: {0}")]
    Eigendecomposition(String),
    #[error("Scaled covariance is not positive definite")]
    Cholesky,
    #[error("Model evaluation failed: {0}")]
    Model(anyhow::Error),
    #[error("Could not parse settings")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AnnealError>;
