//! Email-specific types: `InboundEmail`, `Attachment`, and the raw MIME adapter.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::ChannelError;

/// Archive name used when an attachment carries no filename.
pub const FALLBACK_ATTACHMENT_NAME: &str = "attachment";

/// A parsed inbound email.
#[derive(Debug, Clone, Default)]
pub struct InboundEmail {
    /// Envelope sender, or the `From` address when no envelope was supplied.
    pub sender: String,
    pub subject: Option<String>,
    /// Message-ID header without angle brackets.
    pub message_id: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl InboundEmail {
    /// HTML body preferred over plain text. `None` when neither is usable.
    pub fn body(&self) -> Option<&str> {
        self.html.as_deref().or(self.text.as_deref())
    }
}

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: Option<String>,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Name shown to the classifier: filename, falling back to the MIME type.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.mime_type)
    }

    /// Name used in the blob store key.
    pub fn storage_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(FALLBACK_ATTACHMENT_NAME)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.content)
    }

    /// `data:{mime};base64,{content}`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Parse a raw RFC 5322 message.
///
/// Only parts that really are `text/html` / `text/plain` count as bodies; the
/// parser's own text↔HTML conversions are ignored so an attachment-only
/// message is reported as having no body.
pub fn parse_email(raw: &[u8], envelope_sender: Option<&str>) -> Result<InboundEmail, ChannelError> {
    if raw.trim_ascii().is_empty() {
        return Err(ChannelError::InvalidMessage("empty message".into()));
    }

    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| ChannelError::InvalidMessage("unparseable MIME message".into()))?;

    let sender = envelope_sender
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| extract_sender(&parsed));

    let html = parsed
        .html_body
        .iter()
        .filter_map(|id| parsed.parts.get(*id as usize))
        .find_map(|part| match &part.body {
            PartType::Html(html) if !html.trim().is_empty() => Some(html.to_string()),
            _ => None,
        });

    let text = parsed
        .text_body
        .iter()
        .filter_map(|id| parsed.parts.get(*id as usize))
        .find_map(|part| match &part.body {
            PartType::Text(text) if !text.trim().is_empty() => Some(text.to_string()),
            _ => None,
        });

    let attachments = parsed
        .attachments()
        .map(|part| Attachment {
            filename: part
                .attachment_name()
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            mime_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content: part.contents().to_vec(),
        })
        .collect();

    Ok(InboundEmail {
        sender,
        subject: parsed.subject().map(str::to_string),
        message_id: parsed.message_id().map(str::to_string),
        text,
        html,
        attachments,
    })
}

/// Extract the sender address from a parsed email.
pub(crate) fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: Shop <orders@shop.example>\r\n\
To: receipts@me.example\r\n\
Subject: Your order\r\n\
Message-ID: <order-1@shop.example>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Thanks for your order\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Thanks for your order</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"invoice.pdf\"\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--outer\r\n\
Content-Type: image/png\r\n\
Content-Disposition: attachment\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0=\r\n\
--outer--\r\n";

    #[test]
    fn parses_headers_bodies_and_attachments() {
        let email = parse_email(MULTIPART.as_bytes(), None).unwrap();

        assert_eq!(email.sender, "orders@shop.example");
        assert_eq!(email.subject.as_deref(), Some("Your order"));
        assert_eq!(email.message_id.as_deref(), Some("order-1@shop.example"));
        assert!(email.text.as_deref().unwrap().contains("Thanks for your order"));
        assert!(email.html.as_deref().unwrap().contains("<p>"));
        assert_eq!(email.attachments.len(), 2);

        let pdf = &email.attachments[0];
        assert_eq!(pdf.filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(pdf.mime_type, "application/pdf");
        assert_eq!(pdf.content, b"%PDF-1.4");
    }

    #[test]
    fn html_body_is_preferred() {
        let email = parse_email(MULTIPART.as_bytes(), None).unwrap();
        assert!(email.body().unwrap().starts_with("<p>"));
    }

    #[test]
    fn unnamed_attachment_fallbacks() {
        let email = parse_email(MULTIPART.as_bytes(), None).unwrap();
        let png = &email.attachments[1];
        assert!(png.filename.is_none());
        assert_eq!(png.display_name(), "image/png");
        assert_eq!(png.storage_name(), "attachment");
    }

    #[test]
    fn envelope_sender_overrides_from_header() {
        let email = parse_email(MULTIPART.as_bytes(), Some("bounce@relay.example")).unwrap();
        assert_eq!(email.sender, "bounce@relay.example");

        let email = parse_email(MULTIPART.as_bytes(), Some("  ")).unwrap();
        assert_eq!(email.sender, "orders@shop.example");
    }

    #[test]
    fn plain_text_only_message() {
        let raw = "From: a@example.com\r\nSubject: Hi\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        let email = parse_email(raw.as_bytes(), None).unwrap();
        assert!(email.html.is_none());
        assert_eq!(email.body().map(str::trim), Some("Just text"));
    }

    #[test]
    fn attachment_only_message_has_no_body() {
        let raw = "From: a@example.com\r\n\
Subject: scan\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"scan.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b--\r\n";
        let email = parse_email(raw.as_bytes(), None).unwrap();
        assert!(email.body().is_none());
        assert_eq!(email.attachments.len(), 1);
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(matches!(
            parse_email(b"  \r\n", None),
            Err(ChannelError::InvalidMessage(_))
        ));
    }

    #[test]
    fn data_uri_encodes_content() {
        let attachment = Attachment {
            filename: Some("a.txt".into()),
            mime_type: "text/plain".into(),
            content: b"hi".to_vec(),
        };
        assert_eq!(attachment.data_uri(), "data:text/plain;base64,aGk=");
    }
}
