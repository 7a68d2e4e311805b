use std::fmt::{self, Display, Formatter};
use std::{io, result};

#[derive(Debug)]
pub enum Error {
    /// The credential source could not be read
    Io(io::Error),
    /// A credential line did not split into `user:realm:hash`. `line` is 1-based.
    InvalidRecord { line: usize, fields: usize },
    UnknownAlgorithm(String),
    BadQop(String),
    MissingRequired(&'static str, String),
    InvalidHeaderSyntax(String),
}

pub type Result<T> = result::Result<T, Error>;

use Error::*;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Io(e) => write!(f, "Error reading credentials: {}", e),
            InvalidRecord { line, fields } => write!(
                f,
                "Invalid htdigest file format: line {} has {} fields, expected 3",
                line, fields
            ),
            UnknownAlgorithm(ctx) => write!(f, "Unknown algorithm: {}", ctx),
            BadQop(ctx) => write!(f, "Bad Qop option: {}", ctx),
            MissingRequired(what, ctx) => write!(f, "Missing \"{}\" in header: {}", what, ctx),
            InvalidHeaderSyntax(ctx) => write!(f, "Invalid header syntax: {}", ctx),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Io(e)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Io(e) => Some(e),
            _ => None,
        }
    }
}
