use std::error::Error as StdError;

use crate::descriptor;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    DatabaseError(rusqlite::Error),
    DescriptorError(descriptor::Error),
    JsonError(serde_json::Error),
    StoreUnavailable(String),
    StoreClosed,
    UnknownCategory(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        Error::DatabaseError(err)
    }
}

impl From<descriptor::Error> for Error {
    fn from(err: descriptor::Error) -> Error {
        Error::DescriptorError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::JsonError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "{}", e),
            Error::DatabaseError(e) => write!(f, "database error: {}", e),
            Error::DescriptorError(e) => write!(f, "{}", e),
            Error::JsonError(e) => write!(f, "json error: {}", e),
            Error::StoreUnavailable(reason) => write!(f, "store unavailable: {}", reason),
            Error::StoreClosed => write!(f, "store closed"),
            Error::UnknownCategory(name) => write!(f, "unknown category '{}'", name),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::DatabaseError(e) => Some(e),
            Error::DescriptorError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
