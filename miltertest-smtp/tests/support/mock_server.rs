//! Mock SMTP server standing in for the MTA front end of a filter test.
//!
//! Every command reply is configurable, so a test can make the "filter"
//! reject at any stage. Received commands are recorded for verification.
#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

type ServeResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const CERTIFICATE: &[u8] = include_bytes!("../fixtures/cert.pem");
const PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/key.pem");

/// Builds an acceptor from the self-signed localhost certificate
fn acceptor() -> ServeResult<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut &CERTIFICATE[..]).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut &PRIVATE_KEY[..])?
        .ok_or("fixture holds no private key")?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content between DATA and the terminating dot, still stuffed
    MessageContent(Vec<u8>),
    Auth(String),
    Rset,
    StartTls,
    Quit,
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    /// `None` answers EHLO with 502 so clients fall back to HELO
    ehlo_capabilities: Option<Vec<String>>,
    helo_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rset_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    /// Written in place of the MAIL reply, pausing between chunks
    mail_from_chunks: Option<Vec<Vec<u8>>>,
    drop_on_data: bool,
    hang_on_mail: bool,
    starttls: Option<TlsAcceptor>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_capabilities: Some(vec![
                "localhost".to_string(),
                "AUTH PLAIN".to_string(),
                "SIZE 10000".to_string(),
            ]),
            helo_response: SmtpResponse::new(250, "Hello"),
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rset_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            mail_from_chunks: None,
            drop_on_data: false,
            hang_on_mail: false,
            starttls: None,
        }
    }
}

fn ehlo_bytes(capabilities: &[String]) -> Vec<u8> {
    let mut response = String::new();
    let last = capabilities.len().saturating_sub(1);

    for (i, cap) in capabilities.iter().enumerate() {
        let sep = if i < last { '-' } else { ' ' };
        let _ = write!(&mut response, "250{sep}{cap}\r\n");
    }

    response.into_bytes()
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> ServeResult<()> {
        let Some(stream) = Self::converse(stream, &config, &commands, true).await? else {
            return Ok(());
        };
        let Some(acceptor) = config.starttls.as_ref() else {
            return Ok(());
        };

        let stream = acceptor.accept(stream).await?;
        Self::converse(stream, &config, &commands, false).await?;

        Ok(())
    }

    /// Runs the command loop until the client leaves. Returns the raw stream
    /// when the client asked for, and was granted, STARTTLS.
    async fn converse<S>(
        stream: S,
        config: &MockServerConfig,
        commands: &RwLock<Vec<SmtpCommand>>,
        plaintext: bool,
    ) -> ServeResult<Option<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        let mut line = String::new();

        if plaintext {
            stream.write_all(&config.greeting.to_bytes()).await?;
            stream.flush().await?;
        }

        loop {
            line.clear();

            let Ok(read) = timeout(Duration::from_secs(10), stream.read_line(&mut line)).await
            else {
                return Ok(None);
            };
            if read? == 0 {
                return Ok(None);
            }

            let cmd_line = line.trim_end().to_string();
            let (verb, arg) = cmd_line
                .split_once(' ')
                .map_or((cmd_line.as_str(), ""), |(verb, arg)| (verb, arg));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    config.ehlo_capabilities.as_ref().map_or_else(
                        || SmtpResponse::new(502, "Command not implemented").to_bytes(),
                        |caps| ehlo_bytes(caps),
                    ),
                    SmtpCommand::Ehlo(arg.to_string()),
                ),
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(arg.to_string()),
                ),
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(arg.to_string()),
                ),
                "MAIL" => {
                    if config.hang_on_mail {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        return Ok(None);
                    }
                    if let Some(chunks) = &config.mail_from_chunks {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MailFrom(arg.to_string()));
                        for (i, chunk) in chunks.iter().enumerate() {
                            if i > 0 {
                                tokio::time::sleep(Duration::from_millis(200)).await;
                            }
                            stream.write_all(chunk).await?;
                            stream.flush().await?;
                        }
                        continue;
                    }
                    (
                        config.mail_from_response.to_bytes(),
                        SmtpCommand::MailFrom(arg.to_string()),
                    )
                }
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(arg.to_string()),
                ),
                "RSET" => (config.rset_response.to_bytes(), SmtpCommand::Rset),
                "DATA" => {
                    if config.drop_on_data {
                        commands.write().await.push(SmtpCommand::Data);
                        return Ok(None);
                    }
                    (config.data_response.to_bytes(), SmtpCommand::Data)
                }
                "STARTTLS" => {
                    if plaintext && config.starttls.is_some() {
                        commands.write().await.push(SmtpCommand::StartTls);
                        stream
                            .write_all(&SmtpResponse::new(220, "Ready to start TLS").to_bytes())
                            .await?;
                        stream.flush().await?;
                        return Ok(Some(stream.into_inner()));
                    }
                    (
                        SmtpResponse::new(454, "TLS not available").to_bytes(),
                        SmtpCommand::StartTls,
                    )
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    stream.write_all(&config.quit_response.to_bytes()).await?;
                    stream.flush().await?;
                    return Ok(None);
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());
            stream.write_all(&response).await?;
            stream.flush().await?;

            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if stream.read_line(&mut data_line).await? == 0 {
                        return Ok(None);
                    }

                    if data_line == ".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content));
                        stream
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        stream.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(data_line.as_bytes());
                }
            }
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Answer EHLO with 502 so the client has to fall back to HELO
    #[must_use]
    pub fn without_ehlo(mut self) -> Self {
        self.config.ehlo_capabilities = None;
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rset_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rset_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Answer MAIL FROM with raw bytes, sent as separate writes
    #[must_use]
    pub fn with_raw_mail_from_response(mut self, chunks: &[&[u8]]) -> Self {
        self.config.mail_from_chunks = Some(chunks.iter().map(|chunk| chunk.to_vec()).collect());
        self
    }

    /// Offer STARTTLS using the self-signed localhost fixture
    ///
    /// # Panics
    ///
    /// Panics if the fixture cannot be loaded
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.config.starttls = Some(acceptor().expect("TLS fixture should load"));
        self
    }

    /// Close the connection instead of answering DATA
    #[must_use]
    pub const fn dropping_on_data(mut self) -> Self {
        self.config.drop_on_data = true;
        self
    }

    /// Never answer MAIL FROM
    #[must_use]
    pub const fn hanging_on_mail(mut self) -> Self {
        self.config.hang_on_mail = true;
        self
    }

    /// Build and start the mock SMTP server on a random loopback port
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !shutdown_clone.load(Ordering::Relaxed) {
                // Accept with a timeout so the shutdown flag is rechecked
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            eprintln!("Mock server client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
