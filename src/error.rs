// Error type shared by every daemon binary. Only fatal infrastructure
// failures (cannot bind a bus channel, cannot open the audio device,
// cannot write a library file) ever become a `PlatterError`; rejected
// transitions and protocol violations are logged in place and never
// constructed as one of these.

use std::fmt;

#[derive(Debug)]
pub enum PlatterError {
    Io(std::io::Error),
    Bus(String),
    Config(String),
    External(String),
    State(&'static str),
}

impl std::error::Error for PlatterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for PlatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Bus(s) => write!(f, "bus error: {s}"),
            Self::Config(s) => write!(f, "configuration error: {s}"),
            Self::External(s) => write!(f, "external collaborator failed: {s}"),
            Self::State(s) => write!(f, "invalid internal state: {s}"),
        }
    }
}

impl From<std::io::Error> for PlatterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yaml::Error> for PlatterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlatterError>;
