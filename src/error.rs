use std::error::Error as StdError;

/// Fatal for one build or reindex: the previous generation keeps serving.
#[derive(Debug)]
pub enum BuildError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Source(String),
}

impl From<rusqlite::Error> for BuildError {
    fn from(err: rusqlite::Error) -> BuildError {
        BuildError::Database(err)
    }
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> BuildError {
        BuildError::Io(err)
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> BuildError {
        BuildError::Json(err)
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BuildError::Database(e) => write!(f, "database error: {}", e),
            BuildError::Io(e) => write!(f, "io error: {}", e),
            BuildError::Json(e) => write!(f, "invalid document list: {}", e),
            BuildError::Source(s) => write!(f, "document source unusable: {}", s),
        }
    }
}

impl StdError for BuildError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BuildError::Database(e) => Some(e),
            BuildError::Io(e) => Some(e),
            BuildError::Json(e) => Some(e),
            BuildError::Source(_) => None,
        }
    }
}

/// Fails a single browse request.
#[derive(Debug)]
pub enum BrowseError {
    Malformed(String),
    Database(rusqlite::Error),
    NotReady,
}

impl BrowseError {
    pub fn malformed<S: Into<String>>(what: S) -> BrowseError {
        BrowseError::Malformed(what.into())
    }
}

impl From<rusqlite::Error> for BrowseError {
    fn from(err: rusqlite::Error) -> BrowseError {
        BrowseError::Database(err)
    }
}

impl std::fmt::Display for BrowseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BrowseError::Malformed(s) => write!(f, "malformed selection: {}", s),
            BrowseError::Database(e) => write!(f, "database error: {}", e),
            BrowseError::NotReady => write!(f, "index not built yet"),
        }
    }
}

impl StdError for BrowseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BrowseError::Database(e) => Some(e),
            _ => None,
        }
    }
}
