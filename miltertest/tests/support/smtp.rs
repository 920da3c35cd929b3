//! Minimal SMTP front end standing in for the MTA in front of the filter.
//!
//! Accepts everything except MAIL FROM, whose reply is configurable, and
//! counts the sessions it served.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    time::timeout,
};

pub struct FrontEnd {
    addr: SocketAddr,
    sessions: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl FrontEnd {
    /// Starts a front end that accepts every message.
    pub async fn accepting() -> std::io::Result<Self> {
        Self::start("250 OK").await
    }

    /// Starts a front end answering MAIL FROM with `mail_reply`.
    pub async fn start(mail_reply: &'static str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let sessions = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let sessions_clone = Arc::clone(&sessions);
        let shutdown_clone = Arc::clone(&shutdown);
        tokio::spawn(async move {
            while !shutdown_clone.load(Ordering::Relaxed) {
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _))) = accepted {
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, mail_reply).await {
                            eprintln!("front end client error: {e}");
                        }
                    });
                    sessions_clone.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        Ok(Self {
            addr,
            sessions,
            shutdown,
        })
    }

    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far, readiness checks included.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

async fn serve(mut stream: TcpStream, mail_reply: &str) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    writer.write_all(b"220 front end ready\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        let reply = match verb.as_str() {
            "EHLO" | "HELO" | "RCPT" | "RSET" => "250 OK".to_string(),
            "MAIL" => mail_reply.to_string(),
            "DATA" => {
                writer.write_all(b"354 go ahead\r\n").await?;
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                }
                "250 OK: queued as 1".to_string()
            }
            "QUIT" => {
                writer.write_all(b"221 bye\r\n").await?;
                return Ok(());
            }
            _ => "500 unknown command".to_string(),
        };

        writer.write_all(format!("{reply}\r\n").as_bytes()).await?;
    }
}
