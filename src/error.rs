use thiserror::Error;

/// Errors raised when constructing a player or changing its speed.
///
/// These are the only failure surfaces in the crate: every other operation
/// is a documented no-op when called in a state where it has no effect.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum PlayerError {
    /// The event list was empty. A player needs at least one event to play.
    #[error("the \"events\" parameter must contain at least one event")]
    NoEvents,

    /// The speed was not a finite number greater than zero.
    #[error("the \"speed\" parameter must be a finite number greater than 0, got {0}")]
    InvalidSpeed(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offending_parameter() {
        assert!(PlayerError::NoEvents.to_string().contains("events"));
        assert!(PlayerError::InvalidSpeed(-2.0).to_string().contains("-2"));
    }
}
