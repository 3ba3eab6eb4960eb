//! MIME email parsing via `mail-parser`.
//!
//! Converts raw RFC 822 bytes into the handful of fields the email-to-task
//! bridge needs: subject, sender, message id, a plain-text body, and the
//! attachment count.

use mail_parser::MessageParser;

use crate::error::AppError;

/// One incoming email, reduced to task-relevant fields.
#[derive(Debug, Clone)]
pub struct IncomingEmail {
    pub subject: String,
    pub from: String,
    pub message_id: String,
    pub body: String,
    pub has_attachments: bool,
    pub attachment_count: i64,
}

/// Parse raw RFC 822 bytes.
///
/// The body prefers `text/plain`; an HTML-only message is flattened to text.
pub fn parse_raw(raw: &[u8]) -> Result<IncomingEmail, AppError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| AppError::Email(format!("unparseable MIME message ({} bytes)", raw.len())))?;

    let subject = message.subject().unwrap_or("Untitled").to_string();

    let from = message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|a| a.to_string())
        .unwrap_or_default();

    let message_id = message
        .message_id()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let body = match message.body_text(0) {
        Some(text) => text.to_string(),
        None => message
            .body_html(0)
            .map(|html| html_to_text(&html))
            .unwrap_or_default(),
    };

    let attachment_count = message.attachment_count() as i64;

    Ok(IncomingEmail {
        subject,
        from,
        message_id,
        body,
        has_attachments: attachment_count > 0,
        attachment_count,
    })
}

/// Flatten HTML to readable text.
fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 80) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("HTML body flattening failed: {}", e);
            String::new()
        }
    }
}
