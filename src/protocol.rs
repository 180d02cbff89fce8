//! Line protocol dispatcher and response text.
//!
//! Dispatch is a pure function over one trimmed message; the session handler
//! owns all I/O. Check order matters: emptiness, then the length bound, then
//! `/`-commands, then greetings, then the default echo. An oversized message
//! starting with `/` is rejected for length before command parsing is
//! attempted.

use chrono::{DateTime, Local, SecondsFormat};

/// Maximum accepted message length in bytes.
pub const MAX_MESSAGE_BYTES: usize = 1024;

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Response line to send (the writer appends the newline).
    pub text: String,
    /// Whether the session should terminate after the response is flushed.
    pub terminate: bool,
}

impl Reply {
    fn send(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            terminate: false,
        }
    }

    fn send_and_close(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            terminate: true,
        }
    }
}

/// Canned response text for the line protocol.
pub struct Response;

impl Response {
    /// Prompt sent for an empty line.
    pub fn empty_prompt() -> &'static str {
        "Say something..."
    }

    /// Rejection for a message over [`MAX_MESSAGE_BYTES`].
    pub fn too_long() -> &'static str {
        "Error: Message too long (max 1024 bytes)"
    }

    /// Greeting response.
    pub fn greeting() -> &'static str {
        "Hi there!"
    }

    /// Farewell response.
    pub fn farewell() -> &'static str {
        "Goodbye!"
    }

    /// `/quit` acknowledgement.
    pub fn closing() -> &'static str {
        "Closing connection"
    }

    /// Usage hint for `/echo` without an argument.
    pub fn echo_usage() -> &'static str {
        "Usage: /echo <message>"
    }

    /// Response for an unrecognized `/`-command.
    pub fn unknown_command() -> &'static str {
        "Unknown command"
    }
}

/// Dispatch one trimmed message to its response.
pub fn dispatch(message: &str) -> Reply {
    dispatch_at(message, Local::now())
}

/// Dispatch with an explicit clock so `/time` is testable.
fn dispatch_at(message: &str, now: DateTime<Local>) -> Reply {
    if message.is_empty() {
        return Reply::send(Response::empty_prompt());
    }

    if message.len() > MAX_MESSAGE_BYTES {
        return Reply::send(Response::too_long());
    }

    if message.starts_with('/') {
        return dispatch_command(message, now);
    }

    if message.eq_ignore_ascii_case("hello") {
        return Reply::send(Response::greeting());
    }

    if message.eq_ignore_ascii_case("bye") {
        return Reply::send_and_close(Response::farewell());
    }

    Reply::send(message)
}

/// Resolve a `/`-prefixed command, keyed on the first space-delimited token.
fn dispatch_command(message: &str, now: DateTime<Local>) -> Reply {
    let mut parts = message.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    match command {
        "/time" => Reply::send(now.to_rfc3339_opts(SecondsFormat::Secs, false)),
        "/quit" => Reply::send_and_close(Response::closing()),
        "/echo" => match argument {
            Some(text) => Reply::send(text),
            None => Reply::send(Response::echo_usage()),
        },
        _ => Reply::send(Response::unknown_command()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_echo_plain_message() {
        let reply = dispatch("just some text");
        assert_eq!(reply.text, "just some text");
        assert!(!reply.terminate);
    }

    #[test]
    fn test_empty_message() {
        let reply = dispatch("");
        assert_eq!(reply.text, "Say something...");
        assert!(!reply.terminate);
    }

    #[test]
    fn test_message_at_length_limit() {
        let message = "a".repeat(MAX_MESSAGE_BYTES);
        let reply = dispatch(&message);
        assert_eq!(reply.text, message);
    }

    #[test]
    fn test_message_over_length_limit() {
        let message = "a".repeat(MAX_MESSAGE_BYTES + 1);
        let reply = dispatch(&message);
        assert_eq!(reply.text, "Error: Message too long (max 1024 bytes)");
        assert!(!reply.terminate);
    }

    #[test]
    fn test_oversized_command_rejected_for_length() {
        // Length is checked before command parsing.
        let message = format!("/{}", "x".repeat(MAX_MESSAGE_BYTES + 100));
        let reply = dispatch(&message);
        assert_eq!(reply.text, Response::too_long());
    }

    #[test]
    fn test_hello_case_insensitive() {
        for greeting in ["hello", "Hello", "HELLO"] {
            let reply = dispatch(greeting);
            assert_eq!(reply.text, "Hi there!");
            assert!(!reply.terminate);
        }
    }

    #[test]
    fn test_bye_terminates() {
        for farewell in ["bye", "Bye", "BYE"] {
            let reply = dispatch(farewell);
            assert_eq!(reply.text, "Goodbye!");
            assert!(reply.terminate);
        }
    }

    #[test]
    fn test_quit_command() {
        let reply = dispatch("/quit");
        assert_eq!(reply.text, "Closing connection");
        assert!(reply.terminate);
    }

    #[test]
    fn test_time_command() {
        let now = fixed_now();
        let reply = dispatch_at("/time", now);
        assert_eq!(reply.text, now.to_rfc3339_opts(SecondsFormat::Secs, false));
        assert!(!reply.terminate);
    }

    #[test]
    fn test_time_response_is_rfc3339() {
        let reply = dispatch("/time");
        assert!(DateTime::parse_from_rfc3339(&reply.text).is_ok());
    }

    #[test]
    fn test_echo_command_with_text() {
        let reply = dispatch("/echo foo bar");
        assert_eq!(reply.text, "foo bar");
        assert!(!reply.terminate);
    }

    #[test]
    fn test_echo_command_without_text() {
        let reply = dispatch("/echo");
        assert_eq!(reply.text, "Usage: /echo <message>");
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(dispatch("/frobnicate").text, "Unknown command");
        assert_eq!(dispatch("/").text, "Unknown command");
    }
}
