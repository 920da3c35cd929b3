//! SMTP client implementation with support for STARTTLS and AUTH PLAIN.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use miltertest_common::{incoming, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{
    data::DotStuffer,
    error::{ClientError, Result},
    response::Response,
    tls,
};
use crate::transcript::Transcript;

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Name used for the implicit greeting when no HELO step ran first.
const DEFAULT_LOCAL_NAME: &str = "localhost";

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await,
            Self::Tls(stream) => stream.write_all(data).await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
        }
    }
}

/// Connection-independent client settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The server's name, used for TLS SNI.
    pub server_domain: String,
    /// Bound applied to each read and write. `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
    /// Receives a copy of every byte sent and received.
    pub transcript: Transcript,
}

impl ClientOptions {
    #[must_use]
    pub fn new(server_domain: impl Into<String>) -> Self {
        Self {
            server_domain: server_domain.into(),
            command_timeout: None,
            transcript: Transcript::default(),
        }
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }
}

/// An SMTP client for sending commands and receiving responses.
///
/// The underlying socket is released when the client is dropped.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    options: ClientOptions,
    local_name: String,
    greeted: bool,
    did_hello: bool,
    data: Option<DotStuffer>,
}

impl SmtpClient {
    /// Opens a TCP connection to `addr`. The greeting is read on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, options: ClientOptions) -> Result<Self> {
        let connect = TcpStream::connect(addr);
        let stream = match options.command_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| ClientError::Timeout(limit))??,
            None => connect.await?,
        };

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            options,
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            greeted: false,
            did_hello: false,
            data: None,
        })
    }

    /// The transcript this client mirrors its traffic into.
    pub const fn transcript(&self) -> &Transcript {
        &self.options.transcript
    }

    /// Reads the server greeting if it has not been read yet.
    async fn greet(&mut self) -> Result<()> {
        if !self.greeted {
            self.greeted = true;
            self.read_response().await?.expect(&[220])?;
        }
        Ok(())
    }

    /// Sends a command line and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.send_raw(format!("{command}\r\n").as_bytes()).await?;
        self.read_response().await
    }

    /// Greets the server as `local_name`: `EHLO`, falling back to `HELO` if
    /// the server does not implement `EHLO`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Sequence` if the session already greeted, or the
    /// greeting/`HELO` failure otherwise.
    pub async fn hello(&mut self, local_name: &str) -> Result<()> {
        if self.did_hello {
            return Err(ClientError::Sequence("HELO issued after other commands"));
        }
        local_name.clone_into(&mut self.local_name);
        self.ensure_hello().await
    }

    async fn ensure_hello(&mut self) -> Result<()> {
        if self.did_hello {
            return Ok(());
        }
        self.did_hello = true;
        self.greet().await?;

        let name = self.local_name.clone();
        match self.command(&format!("EHLO {name}")).await?.expect(&[250]) {
            Ok(_) => Ok(()),
            Err(ClientError::SmtpError { code: 500 | 502, .. }) => {
                self.command(&format!("HELO {name}")).await?.expect(&[250])?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Sends STARTTLS and upgrades the connection. The next command repeats
    /// the `EHLO` exchange over the encrypted channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses or the handshake fails.
    pub async fn starttls(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.command("STARTTLS").await?.expect(&[220])?;

        let stream = match self.connection.take() {
            Some(ClientConnection::Plain(stream)) => stream,
            Some(tls @ ClientConnection::Tls(_)) => {
                self.connection = Some(tls);
                return Err(ClientError::TlsError(
                    "Connection is already TLS".to_string(),
                ));
            }
            None => return Err(ClientError::ConnectionClosed),
        };

        let upgraded = tls::upgrade(stream, &self.options.server_domain).await?;
        self.connection = Some(ClientConnection::Tls(Box::new(upgraded)));
        self.buffer_pos = 0;
        self.did_hello = false;
        Ok(())
    }

    /// Authenticates with the PLAIN mechanism and an empty authorization identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 235.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        self.ensure_hello().await?;
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.command(&format!("AUTH PLAIN {token}"))
            .await?
            .expect(&[235])?;
        Ok(())
    }

    /// Sends MAIL FROM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn mail(&mut self, from: &str) -> Result<()> {
        self.ensure_hello().await?;
        self.command(&format!("MAIL FROM:<{from}>"))
            .await?
            .expect(&[250])?;
        Ok(())
    }

    /// Sends RCPT TO for one recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the server answers anything but 250 or 251.
    pub async fn rcpt(&mut self, to: &str) -> Result<()> {
        self.ensure_hello().await?;
        self.command(&format!("RCPT TO:<{to}>"))
            .await?
            .expect(&[250, 251])?;
        Ok(())
    }

    /// Sends RSET.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn reset(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.command("RSET").await?.expect(&[250])?;
        Ok(())
    }

    /// Sends DATA and opens the message stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 354.
    pub async fn data(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.command("DATA").await?.expect(&[354])?;
        self.data = Some(DotStuffer::new());
        Ok(())
    }

    /// Returns `true` between a successful [`data`](Self::data) and
    /// [`close_data`](Self::close_data).
    pub const fn is_data_open(&self) -> bool {
        self.data.is_some()
    }

    /// Writes message content into the open DATA stream.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Sequence` if no DATA stream is open, or an I/O error.
    pub async fn write_data(&mut self, content: &[u8]) -> Result<()> {
        let encoded = self
            .data
            .as_mut()
            .ok_or(ClientError::Sequence("message content written before DATA"))?
            .encode(content);
        self.send_raw(&encoded).await
    }

    /// Terminates the DATA stream and reads the final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if no stream is open or the server does not answer 250.
    pub async fn close_data(&mut self) -> Result<Response> {
        let mut stuffer = self
            .data
            .take()
            .ok_or(ClientError::Sequence("DATA closed before it was opened"))?;
        self.send_raw(stuffer.finish()).await?;
        outgoing!("<end of data>");
        self.read_response().await?.expect(&[250])
    }

    /// Sends QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 221.
    pub async fn quit(&mut self) -> Result<()> {
        self.ensure_hello().await?;
        self.command("QUIT").await?.expect(&[221])?;
        self.connection = None;
        Ok(())
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.options.command_timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        match limit {
            Some(limit) => tokio::time::timeout(limit, connection.send(data))
                .await
                .map_err(|_| ClientError::Timeout(limit))??,
            None => connection.send(data).await?,
        }

        self.options.transcript.append(data);
        Ok(())
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.options.transcript.append(&self.buffer[..consumed]);
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let limit = self.options.command_timeout;
            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let read = connection.read(&mut self.buffer[self.buffer_pos..]);
            let n = match limit {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| ClientError::Timeout(limit))??,
                None => read.await?,
            };

            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.buffer_pos += n;
        }
    }
}
