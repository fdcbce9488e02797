#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("aggregate endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed payload at {path}: {reason}")]
    Shape { path: String, reason: String },

    #[error("id {id} is outside the {table} label table")]
    LabelOutOfRange { table: &'static str, id: i64 },

    #[error("cannot set {path}: parent slot does not exist")]
    MissingParent { path: String },

    #[error("{value:?} is not a valid value for filter key {key}")]
    InvalidFilterValue { key: String, value: String },

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    pub fn shape<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::Shape {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
