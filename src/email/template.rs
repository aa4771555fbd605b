use chrono::{Datelike, Utc};

use crate::utils::helpers::CODE_EXPIRATION_MINUTES;

/// Product name used in subject, header and footer when none is configured
pub const DEFAULT_APP_NAME: &str = "FluxTrader";

/// Registration email carrying a verification code
pub struct VerificationEmail<'a> {
    pub app_name: &'a str,
    pub username: &'a str,
    pub code: &'a str,
    pub year: i32,
}

impl<'a> VerificationEmail<'a> {
    pub fn new(app_name: &'a str, username: &'a str, code: &'a str) -> Self {
        Self {
            app_name,
            username,
            code,
            year: Utc::now().year(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Verify your {} account", self.app_name)
    }

    pub fn render_html(&self) -> String {
        let app_name = escape_html(self.app_name);
        let username = escape_html(self.username);
        let code = escape_html(self.code);

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Email verification</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif; background-color: #f5f5f5;">
    <table cellpadding="0" cellspacing="0" border="0" width="100%" style="background-color: #f5f5f5; padding: 40px 0;">
        <tr>
            <td align="center">
                <table cellpadding="0" cellspacing="0" border="0" width="600" style="background-color: #ffffff; border-radius: 12px; overflow: hidden;">
                    <tr>
                        <td style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 40px 30px; text-align: center;">
                            <h1 style="margin: 0; color: #ffffff; font-size: 32px; font-weight: 700;">{app_name}</h1>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 40px 40px 20px 40px;">
                            <h2 style="margin: 0 0 10px 0; color: #1a1a1a; font-size: 24px;">Hello, {username}!</h2>
                            <p style="margin: 0; color: #666666; font-size: 16px; line-height: 1.6;">
                                Thanks for signing up for {app_name}. Use the code below to finish your registration:
                            </p>
                        </td>
                    </tr>
                    <tr>
                        <td align="center" style="padding: 20px 40px;">
                            <div style="font-size: 42px; font-weight: 700; letter-spacing: 8px; font-family: 'Courier New', monospace; color: #764ba2;">{code}</div>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 20px 40px 40px 40px;">
                            <p style="margin: 0; color: #495057; font-size: 14px; line-height: 1.6;">
                                <strong>Valid for:</strong> {minutes} minutes<br>
                                <strong>Security:</strong> never share this code with anyone
                            </p>
                        </td>
                    </tr>
                    <tr>
                        <td style="background-color: #f8f9fa; padding: 30px 40px; border-top: 1px solid #e9ecef;">
                            <p style="margin: 0 0 10px 0; color: #6c757d; font-size: 13px;">
                                If you did not create a {app_name} account, you can ignore this email.
                            </p>
                            <p style="margin: 0; color: #adb5bd; font-size: 12px;">&copy; {year} {app_name}. All rights reserved.</p>
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>
"#,
            minutes = CODE_EXPIRATION_MINUTES,
            year = self.year,
        )
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
