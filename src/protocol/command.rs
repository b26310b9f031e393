//! Command parsing and event formatting
//!
//! Every line read from a session is parsed into exactly one [`Command`]
//! variant. Session loops dispatch on the variant; raw tokens never leak past
//! this module. A line that does not match any command shape parses to
//! [`Command::Invalid`] rather than an error, since a bad line is a
//! per-line protocol error, not a session-level failure.

use bytes::Bytes;

use super::constants::{VERB_PUB, VERB_SUB, VERB_UNSUB};

/// One parsed protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `<id> pub <topic> <message>` — message is the remainder after the
    /// third space and may itself contain spaces
    Publish {
        id: String,
        topic: String,
        message: String,
    },
    /// `<id> sub <topic>`
    Subscribe { id: String, topic: String },
    /// `<id> unsub <topic>`
    Unsubscribe { id: String, topic: String },
    /// A line matching no command shape; carries the offending line for
    /// logging
    Invalid { line: String, reason: ParseError },
}

/// Why a line failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer fields than any command shape requires
    MissingFields,
    /// Second token is not `pub`, `sub`, or `unsub`
    UnknownVerb,
    /// An id or topic token is empty (consecutive or leading spaces)
    EmptyField,
    /// `sub`/`unsub` followed by more than one topic token
    TrailingFields,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingFields => write!(f, "missing fields"),
            ParseError::UnknownVerb => write!(f, "unknown verb"),
            ParseError::EmptyField => write!(f, "empty id or topic"),
            ParseError::TrailingFields => write!(f, "trailing fields"),
        }
    }
}

impl Command {
    /// Parse one line (without its trailing newline) into a command
    ///
    /// Splitting is on single spaces, matching the wire format exactly: ids,
    /// verbs, and topics are single tokens; a publish message is everything
    /// after the third space, verbatim.
    pub fn parse(line: &str) -> Command {
        let invalid = |reason| Command::Invalid {
            line: line.to_string(),
            reason,
        };

        let mut parts = line.splitn(4, ' ');
        let (id, verb) = match (parts.next(), parts.next()) {
            (Some(id), Some(verb)) => (id, verb),
            _ => return invalid(ParseError::MissingFields),
        };
        if id.is_empty() {
            return invalid(ParseError::EmptyField);
        }

        match verb {
            VERB_PUB => {
                let (topic, message) = match (parts.next(), parts.next()) {
                    (Some(topic), Some(message)) => (topic, message),
                    _ => return invalid(ParseError::MissingFields),
                };
                if topic.is_empty() {
                    return invalid(ParseError::EmptyField);
                }
                Command::Publish {
                    id: id.to_string(),
                    topic: topic.to_string(),
                    message: message.to_string(),
                }
            }
            VERB_SUB | VERB_UNSUB => {
                let topic = match parts.next() {
                    Some(topic) => topic,
                    None => return invalid(ParseError::MissingFields),
                };
                if topic.is_empty() {
                    return invalid(ParseError::EmptyField);
                }
                if parts.next().is_some() {
                    return invalid(ParseError::TrailingFields);
                }
                if verb == VERB_SUB {
                    Command::Subscribe {
                        id: id.to_string(),
                        topic: topic.to_string(),
                    }
                } else {
                    Command::Unsubscribe {
                        id: id.to_string(),
                        topic: topic.to_string(),
                    }
                }
            }
            _ => invalid(ParseError::UnknownVerb),
        }
    }
}

/// Format a routed event as it appears on a subscriber connection
///
/// `Bytes` keeps the fan-out cheap: the line is built once per publish and
/// shared by reference count across every subscriber queue.
pub fn format_event(topic: &str, message: &str) -> Bytes {
    let mut line = String::with_capacity(topic.len() + message.len() + 2);
    line.push_str(topic);
    line.push(' ');
    line.push_str(message);
    line.push('\n');
    Bytes::from(line)
}
