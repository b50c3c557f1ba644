use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("invalid job spec {0:?}: expected job:task")]
    InvalidJobSpec(String),

    #[error("no jobs configured")]
    NoJobsConfigured,

    #[error("exec command is empty")]
    EmptyExecCommand,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error: status {status} for {path}")]
    Api { path: String, status: u16 },

    #[error("malformed log frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("malformed log frame payload: {0}")]
    FrameData(#[from] base64::DecodeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log command {command:?} exited with code {code:?}")]
    ExecExit { command: String, code: Option<i32> },

    #[error("watcher task panicked: {0}")]
    TaskPanic(String),
}

pub type Result<T> = std::result::Result<T, TailError>;
