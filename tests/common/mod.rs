//! Scripted in-process SMTP relay shared by the integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rcgen::{Certificate, CertificateParams, SanType};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use verify_mail::RelayConfig;

/// Canned replies, one per protocol step. Every reply must include its CRLF.
#[derive(Debug, Clone)]
pub struct RelayScript {
    pub greeting: &'static str,
    pub ehlo: &'static str,
    pub helo: &'static str,
    pub auth: &'static str,
    pub mail: &'static str,
    pub rcpt: &'static str,
    pub data: &'static str,
    pub end_of_data: &'static str,
    /// `None` closes the connection without answering QUIT
    pub quit: Option<&'static str>,
}

impl Default for RelayScript {
    fn default() -> Self {
        Self {
            greeting: "220 relay.test ESMTP ready\r\n",
            ehlo: "250-relay.test greets localhost\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN\r\n",
            helo: "250 relay.test\r\n",
            auth: "235 2.7.0 Authentication successful\r\n",
            mail: "250 2.1.0 Sender OK\r\n",
            rcpt: "250 2.1.5 Recipient OK\r\n",
            data: "354 End data with <CR><LF>.<CR><LF>\r\n",
            end_of_data: "250 2.0.0 Queued as 1A2B3C\r\n",
            quit: Some("221 2.0.0 Bye\r\n"),
        }
    }
}

/// What the relay saw during one session.
#[derive(Debug, Default)]
pub struct Transcript {
    pub commands: Vec<String>,
    /// Raw data-phase lines (still dot-stuffed), joined with CRLF
    pub data: Option<String>,
}

impl Transcript {
    pub fn saw(&self, verb: &str) -> bool {
        self.commands
            .iter()
            .any(|c| c.to_ascii_uppercase().starts_with(verb))
    }
}

/// Play `script` over `stream` until the client hangs up or QUIT is answered.
pub async fn run_relay<S>(stream: S, script: RelayScript) -> Transcript
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut transcript = Transcript::default();

    if stream.write_all(script.greeting.as_bytes()).await.is_ok() {
        serve(&mut stream, &script, &mut transcript).await;
    }

    let _ = stream.shutdown().await;
    transcript
}

/// Like [`run_relay`], but only EHLO and STARTTLS are served in clear text.
/// After the upgrade `script` is played over TLS without a second greeting.
pub async fn run_starttls_relay(
    socket: TcpStream,
    acceptor: TlsAcceptor,
    script: RelayScript,
) -> Transcript {
    let mut plain = BufReader::new(socket);
    let mut transcript = Transcript::default();

    if plain.write_all(script.greeting.as_bytes()).await.is_err() {
        return transcript;
    }

    loop {
        let Some(command) = read_command(&mut plain).await else {
            return transcript;
        };
        let verb = verb_of(&command);
        transcript.commands.push(command);

        let reply = match verb.as_str() {
            "EHLO" => "250-relay.test greets localhost\r\n250 STARTTLS\r\n",
            "STARTTLS" => {
                if plain.write_all(b"220 2.0.0 Ready to start TLS\r\n").await.is_err() {
                    return transcript;
                }
                break;
            }
            "QUIT" => return transcript,
            _ => "530 5.7.0 Must issue a STARTTLS command first\r\n",
        };
        if plain.write_all(reply.as_bytes()).await.is_err() {
            return transcript;
        }
    }

    let Ok(tls) = acceptor.accept(plain.into_inner()).await else {
        return transcript;
    };
    let mut stream = BufReader::new(tls);
    serve(&mut stream, &script, &mut transcript).await;
    let _ = stream.shutdown().await;
    transcript
}

async fn serve<S>(stream: &mut BufReader<S>, script: &RelayScript, transcript: &mut Transcript)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(command) = read_command(stream).await {
        let verb = verb_of(&command);
        transcript.commands.push(command);

        let reply = match verb.as_str() {
            "EHLO" => script.ehlo,
            "HELO" => script.helo,
            "AUTH" => script.auth,
            "MAIL" => script.mail,
            "RCPT" => script.rcpt,
            "DATA" => {
                if stream.write_all(script.data.as_bytes()).await.is_err() {
                    break;
                }
                if !script.data.starts_with("354") {
                    continue;
                }
                transcript.data = Some(read_data(stream).await);
                script.end_of_data
            }
            "QUIT" => {
                if let Some(reply) = script.quit {
                    let _ = stream.write_all(reply.as_bytes()).await;
                }
                break;
            }
            _ => "502 5.5.2 Command not recognized\r\n",
        };

        if stream.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

async fn read_command<R>(reader: &mut R) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

fn verb_of(command: &str) -> String {
    command
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

async fn read_data<R>(reader: &mut R) -> String
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line == "." {
            break;
        }
        lines.push(line);
    }
    lines.join("\r\n")
}

/// Relay on an in-memory pipe. Returns the client end and the relay task.
pub fn spawn_pipe_relay(
    script: RelayScript,
) -> (tokio::io::DuplexStream, JoinHandle<Transcript>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let relay = tokio::spawn(run_relay(server, script));
    (client, relay)
}

/// Relay on a loopback TCP port, serving a single connection.
pub async fn spawn_tcp_relay(script: RelayScript) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    let relay = tokio::spawn(async move {
        match listener.accept().await {
            Ok((socket, _)) => run_relay(socket, script).await,
            Err(_) => Transcript::default(),
        }
    });
    (port, relay)
}

/// STARTTLS relay on a loopback TCP port with a fresh self-signed certificate
/// for `127.0.0.1`. Returns the port, the certificate (DER) and the relay task.
pub async fn spawn_starttls_relay(script: RelayScript) -> (u16, Vec<u8>, JoinHandle<Transcript>) {
    let (cert_der, acceptor) = self_signed_acceptor();
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    let relay = tokio::spawn(async move {
        match listener.accept().await {
            Ok((socket, _)) => run_starttls_relay(socket, acceptor, script).await,
            Err(_) => Transcript::default(),
        }
    });
    (port, cert_der, relay)
}

fn self_signed_acceptor() -> (Vec<u8>, TlsAcceptor) {
    let mut params = CertificateParams::new(Vec::<String>::new());
    params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    let cert = Certificate::from_params(params).expect("self-signed certificate");
    let cert_der = cert.serialize_der().expect("certificate der");
    let key = PrivateKeyDer::Pkcs8(cert.serialize_private_key_der().into());

    let config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![CertificateDer::from(cert_der.clone())], key)
            .expect("server certificate");
    (cert_der, TlsAcceptor::from(Arc::new(config)))
}

pub fn test_config(port: u16) -> RelayConfig {
    RelayConfig::new(
        "no-reply@relay.test",
        "127.0.0.1",
        port,
        "mailer",
        "hunter2",
    )
}
