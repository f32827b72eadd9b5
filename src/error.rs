use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Result type used throughout the crate and its binaries.
pub type CallistoResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// A file name, report row, or time string that did not follow the expected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub msg: &'static str,
    pub input: String,
}

impl ParseError {
    pub(crate) fn new(msg: &'static str, input: &str) -> Self {
        ParseError {
            msg,
            input: input.to_owned(),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}: '{}'", self.msg, self.input)
    }
}

impl Error for ParseError {}

/// Failure talking to the remote archive.
#[derive(Debug)]
pub enum FetchError {
    /// The request could not be completed at all (DNS, connection refused, timeout, ...).
    NetworkUnavailable(String),
    /// The server answered, but not with a success code.
    Status { url: String, status: u16 },
    /// The response arrived but could not be written to disk.
    Io(std::io::Error),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        use FetchError::*;

        match self {
            NetworkUnavailable(msg) => write!(f, "network unavailable: {}", msg),
            Status { url, status } => write!(f, "HTTP error ({}): {}", status, url),
            Io(err) => write!(f, "io error while fetching: {}", err),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => FetchError::NetworkUnavailable(err.to_string()),
        }
    }
}

/// A downloaded file that could not be turned into the requested output.
#[derive(Debug)]
pub enum DecodeError {
    /// Decompression or file system failure.
    Io(std::io::Error),
    /// The payload is not a FITS image we understand.
    Fits(&'static str),
    /// cfitsio refused the file.
    Fitsio(String),
    /// The image encoder refused the data.
    Image(image::ImageError),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        use DecodeError::*;

        match self {
            Io(err) => write!(f, "io error while decoding: {}", err),
            Fits(msg) => write!(f, "invalid FITS payload: {}", msg),
            Fitsio(msg) => write!(f, "unable to read FITS payload: {}", msg),
            Image(err) => write!(f, "error encoding image: {}", err),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::Io(err) => Some(err),
            DecodeError::Image(err) => Some(err),
            DecodeError::Fits(_) | DecodeError::Fitsio(_) => None,
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        DecodeError::Io(err)
    }
}

impl From<fitsio::errors::Error> for DecodeError {
    fn from(err: fitsio::errors::Error) -> Self {
        DecodeError::Fitsio(err.to_string())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Image(err)
    }
}
