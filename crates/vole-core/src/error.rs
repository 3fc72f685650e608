use std::fmt;

/// All errors that can occur within vole.
///
/// Loading a split can fail while fetching an archive, while parsing it, or
/// because the caller asked for something that does not make sense. A single
/// enum covers every crate in the workspace so `?` works across them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A remote resource could not be fetched or stored in the cache.
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    /// An archive does not match the IDX layout it claims to have.
    #[error("format error: {0}")]
    Format(String),

    /// A caller-supplied setting is invalid (unknown dtype, bad partition, ...).
    #[error("config error: {0}")]
    Config(String),

    /// Tried to sample from a dataset with no examples left.
    #[error("cannot sample from an empty dataset")]
    Empty,

    /// Local file or decompression failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The retrying wrapper gave up after too many consecutive failures.
    #[error("gave up after {count} consecutive errors, last: {last}")]
    TooManyErrors { count: usize, last: Box<Error> },
}

impl Error {
    pub fn format(s: impl Into<String>) -> Self {
        Error::Format(s.into())
    }

    pub fn config(s: impl Into<String>) -> Self {
        Error::Config(s.into())
    }

    pub fn download(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Coarse classification, used to bucket errors in summaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Download { .. } => ErrorKind::Download,
            Error::Format(_) => ErrorKind::Format,
            Error::Config(_) => ErrorKind::Config,
            Error::Empty => ErrorKind::Empty,
            Error::Io(_) => ErrorKind::Io,
            Error::TooManyErrors { .. } => ErrorKind::TooManyErrors,
        }
    }
}

/// Fieldless mirror of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Download,
    Format,
    Config,
    Empty,
    Io,
    TooManyErrors,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Download => "download",
            ErrorKind::Format => "format",
            ErrorKind::Config => "config",
            ErrorKind::Empty => "empty",
            ErrorKind::Io => "io",
            ErrorKind::TooManyErrors => "too-many-errors",
        };
        f.pad(s)
    }
}

/// Convenience alias used throughout vole.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::format("x").kind(), ErrorKind::Format);
        assert_eq!(Error::config("x").kind(), ErrorKind::Config);
        assert_eq!(Error::download("u", "boom").kind(), ErrorKind::Download);
        assert_eq!(Error::Empty.kind(), ErrorKind::Empty);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display() {
        let e = Error::download("https://host/a.gz", "404 Not Found");
        assert_eq!(
            e.to_string(),
            "download of https://host/a.gz failed: 404 Not Found"
        );
        let e = Error::TooManyErrors {
            count: 3,
            last: Box::new(Error::Empty),
        };
        assert_eq!(
            e.to_string(),
            "gave up after 3 consecutive errors, last: cannot sample from an empty dataset"
        );
    }
}
