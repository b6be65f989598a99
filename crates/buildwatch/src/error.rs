use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A target or finish event referenced a project instance that never started.
    NotFound { instance_id: i64 },
    /// A node id beyond the slot table (node count was mis-configured).
    OutOfRange { node_id: usize, slots: usize },
    Terminal(String),
    Config(String),
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::Config(msg.into())
    }

    pub fn terminal<M: Into<String>>(msg: M) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { instance_id } => {
                write!(f, "project instance {instance_id} was never started")
            }
            Self::OutOfRange { node_id, slots } => write!(
                f,
                "node id {node_id} out of range (dashboard has {slots} node slots)"
            ),
            Self::Terminal(msg) => write!(f, "terminal: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(format!("invalid event: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
