use std::io;

use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::utils::error::CodeError;

/// Number of digits in a verification code
pub const VERIFICATION_CODE_LENGTH: usize = 6;

/// Verification code lifetime in minutes, as announced to the user
pub const CODE_EXPIRATION_MINUTES: i64 = 10;

// Largest multiple of 10 representable in a byte. Bytes at or above it are redrawn
// so every digit keeps probability 1/10.
const DIGIT_ZONE: u8 = 250;

/// Generate a 6-digit verification code from the operating system entropy source.
pub fn generate_verification_code() -> Result<String, CodeError> {
    generate_verification_code_with(&mut OsRng)
}

/// Generate a verification code from the given random source.
///
/// Each digit is an independent uniform draw over `0..=9` and is pushed as a single
/// character, so leading zeros survive.
pub fn generate_verification_code_with<R>(rng: &mut R) -> Result<String, CodeError>
where
    R: TryRngCore,
    R::Error: std::error::Error + Send + Sync + 'static,
{
    let mut code = String::with_capacity(VERIFICATION_CODE_LENGTH);
    for _ in 0..VERIFICATION_CODE_LENGTH {
        let digit = draw_digit(rng)?;
        code.push(char::from(b'0' + digit));
    }
    Ok(code)
}

fn draw_digit<R>(rng: &mut R) -> Result<u8, CodeError>
where
    R: TryRngCore,
    R::Error: std::error::Error + Send + Sync + 'static,
{
    let mut byte = [0u8; 1];
    loop {
        rng.try_fill_bytes(&mut byte)
            .map_err(|e| CodeError::RandomSource(io::Error::other(e)))?;
        if byte[0] < DIGIT_ZONE {
            return Ok(byte[0] % 10);
        }
    }
}
