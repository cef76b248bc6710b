use thiserror::Error;

/// Errors raised while talking to a BMU or interpreting its replies.
#[derive(Debug, Error)]
pub enum Error {
    /// The command name is not part of the fixed catalog.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    /// The response window is shorter than the field layout requires.
    #[error("Short reply for {command} - required={required} received={received}")]
    ShortReply {
        command: &'static str,
        required: usize,
        received: usize,
    },
    /// A text field contains bytes outside the ASCII range.
    #[error("Non-ASCII data in {command} field")]
    NonAsciiField { command: &'static str },
    /// No bytes arrived for a command before the read timeout.
    #[error("No response to {0}, sample incomplete")]
    IncompleteSample(&'static str),
    /// The sample cannot be classified: the reported state of charge is zero.
    #[error("Invalid sample - state of charge is zero")]
    InvalidSample,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
