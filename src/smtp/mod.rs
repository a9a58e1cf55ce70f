use anyhow::Result;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::classify::mime_for;

/// Thin wrapper over an authenticated SMTP transport. Port 465 gets
/// wrapped TLS, everything else STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, user: &str, pass: &str) -> Result<Self> {
        // Trim whitespace that may sneak in from copied app passwords.
        let clean_pass: String = pass.chars().filter(|c| !c.is_whitespace()).collect();
        let creds = Credentials::new(user.to_string(), clean_pass);

        let tls_params = TlsParameters::new(host.to_string())?;
        let tls = if port == 465 {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Required(tls_params)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .port(port)
            .tls(tls)
            .credentials(creds)
            .build();

        Ok(SmtpMailer {
            transport,
            from: user.parse()?,
        })
    }

    pub fn from_mailbox(&self) -> &Mailbox {
        &self.from
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Compose one campaign message: the HTML body with the image both inlined
/// (under the first `cid:` the template references) and attached.
pub fn build_campaign_message(
    from: &Mailbox,
    to: &str,
    subject: &str,
    html: &str,
    image_name: &str,
    image_bytes: Vec<u8>,
) -> Result<Message> {
    let cid = find_cid(html).unwrap_or_else(|| "mailimage".to_string());
    let content_type = ContentType::parse(mime_for(image_name))?;

    let inline = Attachment::new_inline(cid).body(image_bytes.clone(), content_type.clone());
    let related = MultiPart::related()
        .singlepart(SinglePart::html(html.to_string()))
        .singlepart(inline);
    let attached = Attachment::new(image_name.to_string()).body(image_bytes, content_type);

    let message = Message::builder()
        .from(from.clone())
        .to(to.parse()?)
        .subject(subject)
        .multipart(MultiPart::mixed().multipart(related).singlepart(attached))?;
    Ok(message)
}

/// First `cid:<token>` reference in an HTML body, if any.
fn find_cid(html: &str) -> Option<String> {
    let start = html.find("cid:")? + 4;
    let token: String = html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_cid_token() {
        assert_eq!(
            find_cid(r#"<img src="cid:banner-1"> and <img src="cid:other">"#),
            Some("banner-1".to_string())
        );
        assert_eq!(find_cid("<p>no references</p>"), None);
        assert_eq!(find_cid("src=\"cid:\""), None);
    }

    #[test]
    fn builds_multipart_campaign_message() {
        let from: Mailbox = "sender@example.com".parse().unwrap();
        let msg = build_campaign_message(
            &from,
            "target@example.com",
            "Quarterly update",
            r#"<html><img src="cid:mailimage"></html>"#,
            "banner.png",
            vec![0x89, 0x50, 0x4e, 0x47],
        )
        .unwrap();
        let rendered = String::from_utf8(msg.formatted()).unwrap();
        assert!(rendered.contains("multipart/mixed"));
        assert!(rendered.contains("multipart/related"));
        assert!(rendered.contains("banner.png"));
    }
}
