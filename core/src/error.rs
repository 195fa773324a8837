use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown audit status: {0}")]
    UnknownStatus(String),

    #[error("invalid audit transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}
