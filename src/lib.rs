//! One-time verification codes delivered by email.
//!
//! [`generate_verification_code`] produces the code, [`EmailService`] renders
//! and delivers it through an SMTP relay over implicit TLS (port 465) or
//! STARTTLS (any other port).

pub mod email;
pub mod utils;

pub use email::{EmailService, Message, RelayConfig, RelayMode};
pub use utils::error::{CodeError, ConfigError, MailError, SmtpError};
pub use utils::helpers::{VERIFICATION_CODE_LENGTH, generate_verification_code};
