use serde::ser::SerializeStruct;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PetError {
    /// privileged resource used before the overlay exists
    #[error("overlay window is not ready")]
    NotReady,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("backend unavailable: {0}")]
    RemoteUnavailable(String),
    /// structured `{error}` payload from the backend, passed through verbatim
    #[error("{0}")]
    BackendReportedError(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("window error: {0}")]
    Window(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PetError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotReady => "notReady",
            Self::InvalidArgument(_) => "invalidArgument",
            Self::RemoteUnavailable(_) => "remoteUnavailable",
            Self::BackendReportedError(_) => "backendReportedError",
            Self::UnknownOperation(_) => "unknownOperation",
            Self::Window(_) => "window",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

// crosses the IPC boundary as `{ kind, error }`
impl Serialize for PetError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PetError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("error", &self.to_string())?;
        state.end()
    }
}

pub type Result<T, E = PetError> = std::result::Result<T, E>;
