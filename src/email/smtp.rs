//! Hand-driven SMTP session for relays that speak TLS from the first byte.
//!
//! The session runs over any byte stream, so the same code drives a TLS
//! socket in production and an in-memory pipe in tests. Every step reports
//! its own error; only the closing QUIT is allowed to fail silently, because
//! by then the relay has already taken the message.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::email::config::RelayConfig;
use crate::utils::error::{MailError, SmtpError};

/// Name announced in EHLO/HELO
pub const CLIENT_HELLO_NAME: &str = "localhost";

/// Longest reply line accepted from a relay, CRLF included
pub const MAX_REPLY_LINE: usize = 4096;

/// A complete (possibly multi-line) relay reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    fn accept(self, codes: &[u16]) -> Result<Self, SmtpError> {
        if codes.contains(&self.code) {
            Ok(self)
        } else {
            Err(SmtpError::Reply {
                code: self.code,
                text: self.text(),
            })
        }
    }
}

/// Parse one reply line into its code, whether more lines follow, and its text.
pub fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), SmtpError> {
    let malformed = || SmtpError::MalformedReply(line.to_owned());

    let digits = line.get(..3).ok_or_else(malformed)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let code: u16 = digits.parse().map_err(|_| malformed())?;

    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(malformed()),
    }
}

/// Refuse command arguments that would end the command line early.
fn check_line(arg: &str) -> Result<(), SmtpError> {
    if arg.contains(['\r', '\n']) {
        return Err(SmtpError::InvalidArgument(arg.to_owned()));
    }
    Ok(())
}

/// Apply SMTP transparency to a message: a `.` at the start of a line is doubled
/// and bare LF becomes CRLF.
pub fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 2);
    let mut line_start = true;
    let mut prev = None;
    for &b in payload {
        if line_start && b == b'.' {
            out.push(b'.');
        }
        if b == b'\n' && prev != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(b);
        line_start = b == b'\n';
        prev = Some(b);
    }
    out
}

/// SMTP client bound to one relay over an owned stream.
///
/// Dropping the client closes the stream.
pub struct SmtpClient<S> {
    stream: BufReader<S>,
    server_name: String,
    extensions: Vec<String>,
}

impl<S> SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the relay greeting and introduce ourselves, falling back to HELO
    /// when EHLO is refused.
    pub async fn handshake(stream: S, server_name: &str) -> Result<Self, SmtpError> {
        let mut client = Self {
            stream: BufReader::new(stream),
            server_name: server_name.to_owned(),
            extensions: Vec::new(),
        };

        client.read_reply().await?.accept(&[220])?;

        let ehlo = client.command(&format!("EHLO {CLIENT_HELLO_NAME}")).await?;
        if ehlo.code == 250 {
            client.extensions = ehlo.lines.into_iter().skip(1).collect();
        } else {
            debug!("{}: EHLO refused ({}), trying HELO", server_name, ehlo.code);
            client
                .command(&format!("HELO {CLIENT_HELLO_NAME}"))
                .await?
                .accept(&[250])?;
        }

        Ok(client)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Whether the relay advertised `keyword` in its EHLO reply.
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.extensions.iter().any(|ext| {
            ext.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// AUTH PLAIN with the credentials sent as the initial response.
    ///
    /// Only the AUTH extension itself must be advertised; PLAIN is attempted
    /// even when the relay lists other mechanisms.
    pub async fn auth_plain(&mut self, username: &str, secret: &str) -> Result<(), SmtpError> {
        if !self.has_extension("AUTH") {
            return Err(SmtpError::Unsupported("AUTH"));
        }

        let token = STANDARD.encode(format!("\0{username}\0{secret}"));
        self.write_line(&format!("AUTH PLAIN {token}"), "AUTH PLAIN <credentials>")
            .await?;
        self.read_reply().await?.accept(&[235])?;
        Ok(())
    }

    pub async fn mail_from(&mut self, sender: &str) -> Result<(), SmtpError> {
        check_line(sender)?;
        let mut cmd = format!("MAIL FROM:<{sender}>");
        if self.has_extension("8BITMIME") {
            cmd.push_str(" BODY=8BITMIME");
        }
        if self.has_extension("SMTPUTF8") {
            cmd.push_str(" SMTPUTF8");
        }
        self.command(&cmd).await?.accept(&[250])?;
        Ok(())
    }

    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<(), SmtpError> {
        check_line(recipient)?;
        self.command(&format!("RCPT TO:<{recipient}>"))
            .await?
            .accept(&[250, 251])?;
        Ok(())
    }

    /// Enter the data phase. The relay must answer 354.
    pub async fn data(&mut self) -> Result<(), SmtpError> {
        self.command("DATA").await?.accept(&[354])?;
        Ok(())
    }

    /// Stream the message into an open data phase.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<(), SmtpError> {
        let stuffed = dot_stuff(payload);
        let stream = self.stream.get_mut();
        stream.write_all(&stuffed).await?;
        if !stuffed.is_empty() && !stuffed.ends_with(b"\r\n") {
            stream.write_all(b"\r\n").await?;
        }
        Ok(())
    }

    /// Send the end-of-data marker and wait for the relay to accept the message.
    pub async fn finish_data(&mut self) -> Result<Reply, SmtpError> {
        self.write_line(".", ".").await?;
        self.read_reply().await?.accept(&[250])
    }

    /// End the session and close the stream.
    pub async fn quit(mut self) -> Result<(), SmtpError> {
        self.command("QUIT").await?.accept(&[221])?;
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    pub async fn command(&mut self, cmd: &str) -> Result<Reply, SmtpError> {
        self.write_line(cmd, cmd).await?;
        self.read_reply().await
    }

    async fn write_line(&mut self, line: &str, logged: &str) -> Result<(), SmtpError> {
        debug!("{} C: {}", self.server_name, logged);
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn read_reply(&mut self) -> Result<Reply, SmtpError> {
        let mut code = None;
        let mut lines = Vec::new();

        loop {
            let mut raw = String::new();
            let n = (&mut self.stream)
                .take(MAX_REPLY_LINE as u64)
                .read_line(&mut raw)
                .await?;
            if n == 0 {
                return Err(SmtpError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by relay",
                )));
            }
            if !raw.ends_with('\n') {
                if n >= MAX_REPLY_LINE {
                    return Err(SmtpError::MalformedReply(format!(
                        "reply line longer than {MAX_REPLY_LINE} bytes"
                    )));
                }
                return Err(SmtpError::MalformedReply(raw));
            }
            let line = raw.trim_end_matches('\n');
            let line = line.strip_suffix('\r').unwrap_or(line);
            debug!("{} S: {}", self.server_name, line);

            let (line_code, more, text) = parse_reply_line(line)?;
            if *code.get_or_insert(line_code) != line_code {
                return Err(SmtpError::MalformedReply(line.to_owned()));
            }
            lines.push(text.to_owned());
            if !more {
                break;
            }
        }

        Ok(Reply {
            code: code.unwrap_or_default(),
            lines,
        })
    }
}

/// Run one complete delivery over an already encrypted stream.
///
/// The stream is consumed; it is closed on every return path.
pub async fn deliver<S>(
    stream: S,
    config: &RelayConfig,
    recipient: &str,
    payload: &[u8],
) -> Result<(), MailError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = SmtpClient::handshake(stream, &config.relay_host)
        .await
        .map_err(MailError::ClientInit)?;

    client
        .auth_plain(&config.auth_username, &config.auth_secret)
        .await
        .map_err(MailError::Auth)?;
    client
        .mail_from(&config.sender_address)
        .await
        .map_err(MailError::SenderRejected)?;
    client
        .rcpt_to(recipient)
        .await
        .map_err(MailError::RecipientRejected)?;

    client.data().await.map_err(MailError::Write)?;
    client
        .write_message(payload)
        .await
        .map_err(MailError::Write)?;
    let accepted = client.finish_data().await.map_err(MailError::Finalize)?;
    debug!("{}: message accepted: {}", client.server_name(), accepted.text());

    // The relay already owns the message; a failed goodbye changes nothing.
    if let Err(e) = client.quit().await {
        warn!("Ignoring QUIT failure from {}: {}", config.relay_host, e);
    }

    Ok(())
}
