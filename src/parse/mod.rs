//! MIME decomposition for ingested messages: header decoding, first-wins
//! body selection, and bounded image attachment extraction.

use anyhow::Result;
use mail_parser::{Addr, Address, MessageParser, MimeHeaders};
use std::path::PathBuf;
use uuid::Uuid;

/// Caps applied while scanning a message's parts.
#[derive(Debug, Clone)]
pub struct AttachmentLimits {
    pub max_count: usize,
    pub max_bytes: usize,
    pub tmp_dir: PathBuf,
}

/// Normalized output of one parsed message. Bodies are empty strings when
/// the message has none; `to` always holds at least one element.
#[derive(Debug, Clone)]
pub struct ParsedMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub date: String,
    pub html: String,
    pub text: String,
    pub attachments: Vec<String>,
    pub skipped_attachments: Vec<String>,
}

/// Decompose a raw RFC 822 message. Returns `Ok(None)` when the envelope
/// cannot be parsed at all; malformed individual parts degrade to empty or
/// skipped fields instead of failing the message.
pub async fn parse_message(raw: &[u8], limits: &AttachmentLimits) -> Result<Option<ParsedMail>> {
    let parser = MessageParser::default();
    let msg = match parser.parse(raw) {
        Some(m) => m,
        None => return Ok(None),
    };

    let from = msg
        .from()
        .and_then(first_addr)
        .map(format_addr)
        .unwrap_or_default();

    let mut to = address_list(msg.to());
    if to.is_empty() {
        to.push(String::new());
    }

    let subject = msg.subject().unwrap_or_default().to_string();
    let date = msg.date().map(|d| d.to_rfc3339()).unwrap_or_default();

    let html = msg
        .body_html(0)
        .map(|s| sanitize_html(&s))
        .unwrap_or_default();
    let text = msg
        .body_text(0)
        .map(|s| s.into_owned())
        .unwrap_or_default();

    let mut attachments: Vec<(PathBuf, String)> = Vec::new();
    let mut skipped_attachments: Vec<String> = Vec::new();

    for part in msg.attachments() {
        let name = match part.attachment_name() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        if !is_retained_image(part) {
            continue;
        }
        let payload = part.contents();
        if payload.is_empty() {
            continue;
        }
        // Size cap is checked before anything touches the scratch dir.
        if payload.len() > limits.max_bytes {
            skipped_attachments.push(name);
            continue;
        }
        let file_name = format!("att_{}_{}", Uuid::new_v4().simple(), safe_file_name(&name));
        let path = limits.tmp_dir.join(file_name);
        tokio::fs::create_dir_all(&limits.tmp_dir).await.ok();
        if let Err(e) = tokio::fs::write(&path, payload).await {
            tracing::warn!(name = %name, error = %e, "failed to persist attachment, skipping");
            skipped_attachments.push(name);
            continue;
        }
        attachments.push((path, name));
    }

    // Count cap is enforced after the scan; demoted files are removed again.
    if attachments.len() > limits.max_count {
        for (path, name) in attachments.split_off(limits.max_count) {
            let _ = tokio::fs::remove_file(&path).await;
            skipped_attachments.push(name);
        }
    }

    Ok(Some(ParsedMail {
        from,
        to,
        subject,
        date,
        html,
        text,
        attachments: attachments
            .into_iter()
            .map(|(path, _)| path.display().to_string())
            .collect(),
        skipped_attachments,
    }))
}

fn is_retained_image(part: &mail_parser::MessagePart<'_>) -> bool {
    match part.content_type() {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("image")
                && matches!(
                    ct.subtype().map(|s| s.to_ascii_lowercase()).as_deref(),
                    Some("jpeg") | Some("jpg") | Some("png")
                )
        }
        None => false,
    }
}

fn first_addr<'a>(address: &'a Address<'a>) -> Option<&'a Addr<'a>> {
    match address {
        Address::List(list) => list.first(),
        Address::Group(groups) => groups.first().and_then(|g| g.addresses.first()),
    }
}

fn address_list(address: Option<&Address<'_>>) -> Vec<String> {
    match address {
        Some(Address::List(list)) => list.iter().map(format_addr).collect(),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .map(format_addr)
            .collect(),
        None => Vec::new(),
    }
}

fn format_addr(a: &Addr<'_>) -> String {
    let name = a.name.as_deref().unwrap_or("").trim();
    let address = a.address.as_deref().unwrap_or("");
    if name.is_empty() {
        address.to_string()
    } else if address.is_empty() {
        name.to_string()
    } else {
        format!("{name} <{address}>")
    }
}

/// Neutralize script tags so stored HTML can be rendered by viewers.
/// Case-insensitive; opening and closing tags are both defanged.
pub fn sanitize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    for (i, ch) in html.char_indices() {
        let defang = ch == '<' && {
            let rest = &html[i + 1..];
            starts_with_ignore_case(rest, "script") || starts_with_ignore_case(rest, "/script")
        };
        if defang {
            out.push_str("&lt;");
        } else {
            out.push(ch);
        }
    }
    out
}

fn starts_with_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .get(..needle.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(needle))
}

/// Strip any path components from a client-supplied filename.
fn safe_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base
    }
}
