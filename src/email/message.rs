//! Message composition: RFC 5322 header block, blank line, HTML body.

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=UTF-8";

/// A single outgoing HTML email. Built per send and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Headers in the order they are written
    pub fn headers<'a>(&'a self, sender: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("From", sender),
            ("To", &self.recipient),
            ("Subject", &self.subject),
            ("MIME-Version", "1.0"),
            ("Content-Type", CONTENT_TYPE_HTML),
        ]
    }

    /// Render the full message as sent in the data phase, with CRLF line endings.
    pub fn compose(&self, sender: &str) -> String {
        let mut out = String::with_capacity(self.body.len() + 256);
        for (name, value) in self.headers(sender) {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&header_value(value));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&normalize_line_endings(&self.body));
        out
    }
}

// CR or LF inside a value would start a new header line.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Convert bare `\n` and bare `\r` into `\r\n`.
pub fn normalize_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 32);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            other => out.push(other),
        }
    }
    out
}
