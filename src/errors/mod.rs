use core::fmt;
use std::error::Error;
use std::fmt::Display;

/// Error taxonomy the election state machine branches on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ErrorKind {
    /// Transient network or server error on any store call.
    StoreUnavailable,

    /// Keep-alive was rejected or failed repeatedly: leadership has ended.
    LeaseLost,

    /// Watch stream ended without a delete event.
    WatchTerminated,

    /// Invalid participant configuration.
    Misconfigured,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectionError {
    kind: ErrorKind,
    text: String,
    cause: String,
}

pub type Result<T> = std::result::Result<T, ElectionError>;

pub fn new_err<T>(kind: ErrorKind, text: String, cause: String) -> Result<T> {
    Err(ElectionError::new(kind, text, cause))
}

impl ElectionError {
    pub fn new(kind: ErrorKind, text: String, cause: String) -> ElectionError {
        ElectionError { kind, text, cause }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_lease_lost(&self) -> bool {
        self.kind == ErrorKind::LeaseLost
    }
}

impl Display for ElectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cause_word = {
            if !self.cause.is_empty() {
                " Cause: ".to_string()
            } else {
                String::new()
            }
        };
        write!(f, "{} - {}.{}{}", self.kind, self.text, cause_word, self.cause)
    }
}

impl Error for ElectionError {}
