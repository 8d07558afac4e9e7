//! STOMP Wire Format
//!
//! Single responsibility: encode and decode STOMP 1.2 text frames.
//!
//! # Wire Format
//!
//! One WebSocket text message carries one frame:
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! The command line and each header line end with LF (CR LF tolerated on
//! input), a blank line separates headers from the body, and the frame is
//! terminated by a NUL octet. Header names and values are escaped per
//! STOMP 1.2 (`\\`, `\n`, `\r`, and `\c` for `:`), except on CONNECT and
//! CONNECTED frames where STOMP 1.2 forbids escaping.
//!
//! A bare EOL between frames is a server heart-beat, not a frame; callers
//! skip those before parsing (see [`Frame::is_heartbeat`]).

use crate::error::{ChatError, Result};

/// Frame commands this client sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    Connect,
    Connected,
    Subscribe,
    Send,
    Message,
    Error,
    Disconnect,
    Receipt,
}

impl FrameCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameCommand::Connect => "CONNECT",
            FrameCommand::Connected => "CONNECTED",
            FrameCommand::Subscribe => "SUBSCRIBE",
            FrameCommand::Send => "SEND",
            FrameCommand::Message => "MESSAGE",
            FrameCommand::Error => "ERROR",
            FrameCommand::Disconnect => "DISCONNECT",
            FrameCommand::Receipt => "RECEIPT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(FrameCommand::Connect),
            "CONNECTED" => Some(FrameCommand::Connected),
            "SUBSCRIBE" => Some(FrameCommand::Subscribe),
            "SEND" => Some(FrameCommand::Send),
            "MESSAGE" => Some(FrameCommand::Message),
            "ERROR" => Some(FrameCommand::Error),
            "DISCONNECT" => Some(FrameCommand::Disconnect),
            "RECEIPT" => Some(FrameCommand::Receipt),
            _ => None,
        }
    }

    /// CONNECT and CONNECTED headers are never escaped (STOMP 1.2 §frames).
    fn escapes_headers(&self) -> bool {
        !matches!(self, FrameCommand::Connect | FrameCommand::Connected)
    }
}

/// One protocol-level unit of the pub/sub wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: FrameCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, if present.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for the session handshake. Heart-beating is disabled;
    /// liveness comes from the WebSocket layer.
    pub fn connect(host: &str) -> Self {
        Frame::new(FrameCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
    }

    /// SUBSCRIBE frame binding `id` to `destination`.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(FrameCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// SEND frame carrying a JSON body to `destination`.
    pub fn send(destination: &str, body: String) -> Self {
        Frame::new(FrameCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string())
            .body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(FrameCommand::Disconnect)
    }

    /// True for the bare EOLs a broker may send as heart-beats.
    pub fn is_heartbeat(text: &str) -> bool {
        text.is_empty() || text == "\n" || text == "\r\n"
    }

    /// Serialize to the on-wire text representation, NUL terminator included.
    pub fn serialize(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from its on-wire text representation.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.strip_suffix('\0').unwrap_or(text);
        let (head, body) = text
            .split_once("\n\n")
            .or_else(|| text.split_once("\r\n\r\n"))
            .ok_or_else(|| ChatError::Protocol("Frame missing header terminator".into()))?;

        let mut lines = head.lines();
        let command_line = lines
            .next()
            .ok_or_else(|| ChatError::Protocol("Empty frame".into()))?;
        let command = FrameCommand::parse(command_line)
            .ok_or_else(|| ChatError::Protocol(format!("Unknown command: {}", command_line)))?;

        let unescape_values = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChatError::Protocol(format!("Malformed header: {}", line)))?;
            if unescape_values {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Protocol(format!(
                    "Invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
