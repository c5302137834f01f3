use std::error;
use std::fmt;

use crate::cluster::ClusterError;
use crate::kernel::KernelError;
use crate::speaker::SpeakerError;
use crate::utils::ParseError;

#[derive(Debug)]
pub enum Error {
    /// Invalid configuration. [reason]
    Config(String),
    Parse(ParseError),
    Speaker(SpeakerError),
    Kernel(KernelError),
    Cluster(ClusterError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            Config(r) => write!(f, "Config Error: {}", r),
            Parse(err) => write!(f, "{}", err),
            Speaker(err) => write!(f, "{}", err),
            Kernel(err) => write!(f, "{}", err),
            Cluster(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        use Error::*;
        match self {
            Config(_) => None,
            Parse(err) => Some(err),
            Speaker(err) => Some(err),
            Kernel(err) => Some(err),
            Cluster(err) => Some(err),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::Parse(error)
    }
}

impl From<SpeakerError> for Error {
    fn from(error: SpeakerError) -> Self {
        Error::Speaker(error)
    }
}

impl From<KernelError> for Error {
    fn from(error: KernelError) -> Self {
        Error::Kernel(error)
    }
}

impl From<ClusterError> for Error {
    fn from(error: ClusterError) -> Self {
        Error::Cluster(error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
