//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    /// Creates a new `Response`.
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Passes the response through if its code is one of `accepted`, otherwise
    /// converts it into [`ClientError::SmtpError`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` for any other code.
    pub fn expect(self, accepted: &[u16]) -> Result<Self> {
        if accepted.contains(&self.code) {
            return Ok(self);
        }

        let (enhanced_code, message) = split_enhanced_code(&self.message());
        Err(ClientError::SmtpError {
            code: self.code,
            enhanced_code,
            message,
        })
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        if line.len() < 3 {
            return Err(ClientError::ParseError(format!(
                "Response line too short: '{line}'"
            )));
        }

        let code_str = line.get(..3).ok_or_else(|| {
            ClientError::ParseError(format!("Invalid status code: '{line}'"))
        })?;
        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code_str}'")))?;

        // A space (or nothing) ends the reply, a dash continues it
        let is_last = match line[3..].chars().next() {
            Some(' ') | None => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete multi-line SMTP response from a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` if the buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut bytes_consumed = 0;
        let mut first_code = None;

        // Decode only complete lines; a character split across reads waits
        // for the rest of its bytes
        while let Some(end) = buffer[bytes_consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[bytes_consumed..bytes_consumed + end];
            bytes_consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let parsed_line = Self::parse_line(&String::from_utf8_lossy(raw))?;

            match first_code {
                Some(code) if parsed_line.code != code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed_line.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed_line.code),
            }

            lines.push(parsed_line.message);

            if parsed_line.is_last {
                return Ok(first_code.map(|code| (Self::new(code, lines), bytes_consumed)));
            }
        }

        Ok(None)
    }
}

/// Splits an RFC 2034 enhanced status code (`5.7.1`) off the front of a
/// reply text. Continuation lines repeating the same code are stripped too.
pub fn split_enhanced_code(message: &str) -> (Option<String>, String) {
    let Some((first, rest)) = message.split_once(' ') else {
        return (None, message.to_string());
    };

    if !is_enhanced_code(first) {
        return (None, message.to_string());
    }

    let rest = rest.replace(&format!("\n{first} "), "\n");
    (Some(first.to_string()), rest)
}

fn is_enhanced_code(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split('.').collect();
    parts.len() == 3
        && matches!(parts[0], "2" | "4" | "5")
        && parts[1..]
            .iter()
            .all(|part| !part.is_empty() && part.len() <= 3 && part.bytes().all(|b| b.is_ascii_digit()))
}
