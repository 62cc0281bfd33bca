use std::{error, fmt, io, time::Duration};

#[derive(Debug)]
pub enum Error {
    /// No bearer credential, or the server refused the one we sent.
    Unauthorized,
    /// Subject or resource is absent on the server.  Not the same thing as a
    /// subject with zero items, which is a successful, empty response.
    NotFound(String),
    /// Local validation of an upload failed, nothing was sent.
    InvalidFile(String),
    Timeout(Duration),
    UnexpectedResponse { status: u16 },
    NetworkError(Box<dyn error::Error + Send>),
    JsonError(Box<dyn error::Error + Send>),
    ConfigError(String),
    IoError(io::Error),
}

impl Error {
    /// Transport-level failures, as opposed to the server answering that
    /// something is missing or refused.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::UnexpectedResponse { .. } | Self::NetworkError(_)
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Not authorized"),
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::InvalidFile(reason) => write!(f, "Invalid file: {reason}"),
            Self::Timeout(after) => write!(f, "Request timed out after {after:?}"),
            Self::UnexpectedResponse { status } => {
                write!(f, "Unexpected server response: {status}")
            }
            Self::ConfigError(reason) => write!(f, "Invalid configuration: {reason}"),
            Self::NetworkError(err) | Self::JsonError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::JsonError(Box::new(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::ConfigError(err.to_string())
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Error {
        match err {
            ureq::Error::StatusCode(401 | 403) => Error::Unauthorized,
            ureq::Error::StatusCode(404) => Error::NotFound("remote resource".into()),
            ureq::Error::StatusCode(status) => Error::UnexpectedResponse { status },
            other => Error::NetworkError(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_onto_the_taxonomy() {
        assert!(Error::from(ureq::Error::StatusCode(401)).is_unauthorized());
        assert!(Error::from(ureq::Error::StatusCode(403)).is_unauthorized());
        assert!(matches!(
            Error::from(ureq::Error::StatusCode(404)),
            Error::NotFound(_)
        ));
        let server_error = Error::from(ureq::Error::StatusCode(500));
        assert!(server_error.is_network());
        assert!(!Error::NotFound("x".into()).is_network());
    }
}
