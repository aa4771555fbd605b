//! Verification email delivery

pub mod config;
pub mod message;
pub mod service;
pub mod smtp;
pub mod template;
pub mod transport;

pub use config::RelayConfig;
pub use message::Message;
pub use service::EmailService;
pub use transport::RelayMode;
