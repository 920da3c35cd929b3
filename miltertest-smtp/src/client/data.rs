//! Encoding of the DATA stream: CRLF normalisation and dot-stuffing.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Nothing written yet.
    #[default]
    Begin,
    /// Just after a line break.
    BeginLine,
    /// Inside a line.
    Data,
    /// A carriage return was the last byte.
    CarriageReturn,
}

/// Incrementally encodes message content for transmission after `DATA`.
///
/// Bare `\n` becomes `\r\n`, a `.` at the start of a line is doubled, and
/// [`DotStuffer::finish`] yields the bytes that terminate the stream.
#[derive(Debug, Default)]
pub struct DotStuffer {
    state: State,
}

impl DotStuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len() + input.len() / 16 + 2);

        for &byte in input {
            match self.state {
                State::Begin | State::BeginLine => {
                    self.state = State::Data;
                    if byte == b'.' {
                        out.push(b'.');
                    }
                    self.data_byte(byte, &mut out);
                }
                State::Data => self.data_byte(byte, &mut out),
                State::CarriageReturn => {
                    self.state = if byte == b'\n' {
                        State::BeginLine
                    } else {
                        State::Data
                    };
                }
            }
            out.push(byte);
        }

        out
    }

    fn data_byte(&mut self, byte: u8, out: &mut Vec<u8>) {
        match byte {
            b'\r' => self.state = State::CarriageReturn,
            b'\n' => {
                out.push(b'\r');
                self.state = State::BeginLine;
            }
            _ => {}
        }
    }

    /// Bytes completing the current line (if needed) and the `.` terminator.
    pub fn finish(&mut self) -> &'static [u8] {
        let tail: &'static [u8] = match self.state {
            State::Begin | State::Data => b"\r\n.\r\n",
            State::CarriageReturn => b"\n.\r\n",
            State::BeginLine => b".\r\n",
        };
        self.state = State::Begin;
        tail
    }
}
