//! Wire protocol constants
//!
//! The protocol is newline-delimited, space-separated text; one command per
//! line. These are the literals both session loops and the parser agree on.

/// Verb a publisher uses to push a message
pub const VERB_PUB: &str = "pub";

/// Verb a subscriber uses to register interest in a topic
pub const VERB_SUB: &str = "sub";

/// Verb a subscriber uses to drop interest in a topic
pub const VERB_UNSUB: &str = "unsub";

/// Acknowledgement sent after every accepted command
pub const OK_REPLY: &[u8] = b"OK\n";
