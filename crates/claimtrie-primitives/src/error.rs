/// Primitive parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Hex input of the wrong length or with non-hex characters.
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
