use std::io;

use thiserror::Error;

/// Failure to produce a verification code.
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("Random source unavailable: {0}")]
    RandomSource(#[source] io::Error),
}

/// Low-level cause of a failed step in a hand-driven SMTP session.
#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Invalid server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    #[error("Relay replied {code}: {text}")]
    Reply { code: u16, text: String },

    #[error("Malformed reply: {0:?}")]
    MalformedReply(String),

    #[error("Line break in command argument: {0:?}")]
    InvalidArgument(String),

    #[error("Unsupported by relay: {0}")]
    Unsupported(&'static str),
}

impl SmtpError {
    /// Reply code when the relay answered with a negative reply.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            SmtpError::Reply { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure to deliver a message. Any variant means the message was not delivered.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] SmtpError),

    #[error("Failed to create client: {0}")]
    ClientInit(#[source] SmtpError),

    #[error("Failed to authenticate: {0}")]
    Auth(#[source] SmtpError),

    #[error("Failed to set sender: {0}")]
    SenderRejected(#[source] SmtpError),

    #[error("Failed to set recipient: {0}")]
    RecipientRejected(#[source] SmtpError),

    #[error("Failed to write message: {0}")]
    Write(#[source] SmtpError),

    #[error("Failed to finalize message: {0}")]
    Finalize(#[source] SmtpError),

    #[error("Failed to send email: {0}")]
    Send(#[from] lettre::transport::smtp::Error),

    #[error("Invalid address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build envelope: {0}")]
    Envelope(#[from] lettre::error::Error),
}

/// Failure to load relay settings from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("SMTP_PORT must be a valid number, got {0:?}")]
    InvalidPort(String),
}
