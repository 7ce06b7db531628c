//! Errors for symbolic memory and exploration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Address 0x{0:x} is outside of the address space")]
    AddressOutOfRange(u64),
    #[error("Memory full: {size} bytes in use, cannot add {bytes} more to {max} addresses")]
    CapacityExceeded { size: u128, bytes: u128, max: u128 },
    #[error("Error: {0}, Chained: {1}")]
    Chain(Box<Error>, Box<Error>),
    #[error("Error: {0}")]
    Custom(String),
    #[error("Division by zero")]
    DivideByZero,
    #[error("Executor can only execute over constant values, found scalar {0}")]
    ExecutorScalar(String),
    #[error("Invalid bit-width {0}, must be a non-zero multiple of 8")]
    InvalidWidth(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Sort error, invalid bitness between expressions or bitness of 0")]
    Sort,
    #[error("Addresses must be between 1 and 64 bits wide")]
    TooManyAddressBits,
    #[error("Unable to store value at {0} without aliasing a live cell")]
    UnplaceableValue(String),
    #[error("Constraints are unsatisfiable")]
    Unsat,
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Attach a second error as context to this one.
    pub fn chain(self, chained: Error) -> Error {
        Error::Chain(Box::new(chained), Box::new(self))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
