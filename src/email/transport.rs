//! Connection strategies: implicit TLS on 465, STARTTLS through lettre everywhere else.

use std::str::FromStr;
use std::sync::Arc;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use log::debug;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::email::config::{IMPLICIT_TLS_PORT, RelayConfig};
use crate::utils::error::{MailError, SmtpError};

/// How the connection to the relay gets encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// TLS from the first byte, SMTP session driven by hand
    ImplicitTls,
    /// Plaintext connect upgraded in-band, session driven by lettre
    StartTls,
}

impl RelayMode {
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            RelayMode::ImplicitTls
        } else {
            RelayMode::StartTls
        }
    }
}

fn tls_client_config() -> Result<ClientConfig, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(config)
}

/// Open a TCP connection and complete a TLS handshake, validating the
/// certificate against `host`.
pub async fn connect_implicit_tls(
    host: &str,
    port: u16,
) -> Result<TlsStream<TcpStream>, SmtpError> {
    let server_name = ServerName::try_from(host.to_owned())?;
    let connector = TlsConnector::from(Arc::new(tls_client_config()?));

    let tcp = TcpStream::connect((host, port)).await?;
    debug!("Connected to {}:{}, starting TLS handshake", host, port);

    let stream = connector.connect(server_name, tcp).await?;
    Ok(stream)
}

fn parse_address(raw: &str) -> Result<Address, MailError> {
    Address::from_str(raw).map_err(|source| MailError::InvalidAddress {
        address: raw.to_owned(),
        source,
    })
}

/// Hand the composed message to lettre's STARTTLS transport.
///
/// A fresh transport is built per call, so nothing is pooled or reused.
pub async fn send_starttls(
    config: &RelayConfig,
    recipient: &str,
    payload: &[u8],
) -> Result<(), MailError> {
    let tls = TlsParameters::new(config.relay_host.clone())?;
    send_starttls_with(config, recipient, payload, tls).await
}

/// Same as [`send_starttls`], verifying the upgraded connection with `tls`.
/// The upgrade is required: a relay without STARTTLS gets no message.
pub async fn send_starttls_with(
    config: &RelayConfig,
    recipient: &str,
    payload: &[u8],
    tls: TlsParameters,
) -> Result<(), MailError> {
    let envelope = Envelope::new(
        Some(parse_address(&config.sender_address)?),
        vec![parse_address(recipient)?],
    )?;

    let credentials = Credentials::new(config.auth_username.clone(), config.auth_secret.clone());
    let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.relay_host)
        .port(config.relay_port)
        .tls(Tls::Required(tls))
        .credentials(credentials)
        .build();

    transport.send_raw(&envelope, payload).await?;
    Ok(())
}
