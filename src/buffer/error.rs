use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Invalid buffer capacity")]
    InvalidCapacity,
}
