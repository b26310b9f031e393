//! Wire protocol: line parsing, event formatting, and the literals shared by
//! both session loops

pub mod command;
pub mod constants;

pub use command::{format_event, Command, ParseError};
