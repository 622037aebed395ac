use thiserror::Error;

/// Runtime custom `Result` type, using `Error` as the `Err` type.
pub type Result<T> = std::result::Result<T, Error>;

/// A plugin failed the registration-time structural check.
///
/// Every variant names the offending class so a plugin author can fix it
/// before any traffic flows.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("{class} must be a subclass of {base}")]
    NotSubclass { class: String, base: String },

    #[error("{class} does not implement the required method {method}")]
    MissingMethod { class: String, method: String },

    #[error("{class}.{method} does not match the required parameters {expected}")]
    SignatureMismatch {
        class: String,
        method: String,
        expected: String,
    },
}

impl InterfaceError {
    /// The operation this error is about, if any.
    pub fn method(&self) -> Option<&str> {
        match self {
            InterfaceError::NotSubclass { .. } => None,
            InterfaceError::MissingMethod { method, .. }
            | InterfaceError::SignatureMismatch { method, .. } => Some(method.as_str()),
        }
    }
}

#[derive(Debug, Error)]
/// Runtime error type.
pub enum Error {
    /// The algorithm failed structural validation. Fatal, raised before the loop starts.
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),

    /// The datapath tried to create a flow that is already live.
    #[error("flow {0} already exists")]
    DuplicateFlow(u32),

    /// A message referenced a flow that is not (or no longer) live.
    #[error("unknown flow {0}")]
    UnknownFlow(u32),

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The IPC channel is closed.
    #[error("the IPC channel has closed")]
    ChannelClosed,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix: {0}")]
    Nix(#[from] nix::Error),

    #[error("ipc: {0}")]
    Ipc(String),

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Errors which end the execution loop. Everything else is isolated to one message.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::DuplicateFlow(_) | Error::UnknownFlow(_) | Error::MalformedFrame(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, InterfaceError};

    #[test]
    fn interface_error_message() {
        let e = InterfaceError::SignatureMismatch {
            class: String::from("MyAlg"),
            method: String::from("new_flow"),
            expected: String::from("(self, init_cwnd, mss)"),
        };
        assert_eq!(
            e.to_string(),
            "MyAlg.new_flow does not match the required parameters (self, init_cwnd, mss)"
        );
        assert_eq!(e.method(), Some("new_flow"));

        let e: Error = e.into();
        assert!(e.is_fatal());
    }

    #[test]
    fn per_message_errors_are_not_fatal() {
        assert!(!Error::DuplicateFlow(4).is_fatal());
        assert!(!Error::UnknownFlow(4).is_fatal());
        assert!(!Error::MalformedFrame(String::from("short")).is_fatal());
        assert!(Error::ChannelClosed.is_fatal());
    }
}
