use thiserror::Error;

#[derive(Error, Debug)]
pub enum PsthError {
    #[error("Digital line index out of range (0-31): {0}")]
    LineOutOfRange(usize),

    #[error("Reserved event channels overlap: channel {0} assigned twice")]
    ReservedChannelClash(u16),
}

pub type Result<T> = std::result::Result<T, PsthError>;
