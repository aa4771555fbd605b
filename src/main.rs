use std::env;
use std::process::ExitCode;

use dotenvy::dotenv;
use env_logger::Env;
use log::{error, info};

use verify_mail::{EmailService, RelayConfig, generate_verification_code};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(to_email) = args.next() else {
        error!("Usage: verify-mail <recipient> [username]");
        return ExitCode::from(2);
    };
    let username = args.next().unwrap_or_else(|| to_email.clone());

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid relay configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut service = EmailService::new(config);
    if let Ok(app_name) = env::var("APP_NAME") {
        service = service.with_app_name(app_name);
    }

    let code = match generate_verification_code() {
        Ok(code) => code,
        Err(e) => {
            error!("Could not generate verification code: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Sending verification code to {} via {}",
        to_email,
        service.config().relay_addr()
    );

    match service
        .send_verification_email(&to_email, &username, &code)
        .await
    {
        Ok(()) => {
            info!("Verification email delivered to {}", to_email);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Verification email not delivered: {}", e);
            ExitCode::FAILURE
        }
    }
}
