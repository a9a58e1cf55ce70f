use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One ingested mail, as persisted (one JSON object per cache line) and as
/// published to subscribers. `id` is the only field without a default:
/// persisted lines missing it fail to deserialize and are skipped at the
/// store's read boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: String,
    /// Mailbox-native UID, used only for watermark comparison.
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub phishing: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub skipped_attachments: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Parse a mail `Date` value for ordering. Accepts RFC 2822, RFC 3339 and
/// the bare timestamp prefixes seen in older cache files. `None` means the
/// record sorts as the minimum possible instant.
pub fn parse_mail_date(date: &str) -> Option<DateTime<Utc>> {
    let trimmed = date.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive prefixes: "Mon, 27 May 2024 12:00:00", "2024-05-27T12:00:00",
    // "2024-05-27 12:00:00". Trailing zone info is ignored.
    let long: String = trimmed.chars().take(25).collect();
    let short: String = trimmed.chars().take(19).collect();
    for (cut, fmt) in [
        (&long, "%a, %d %b %Y %H:%M:%S"),
        (&short, "%Y-%m-%dT%H:%M:%S"),
        (&short, "%Y-%m-%d %H:%M:%S"),
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(cut, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

/// Ordering key: unparsable dates are treated as the oldest possible.
pub fn date_sort_key(record: &MailRecord) -> DateTime<Utc> {
    parse_mail_date(&record.date).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc2822() {
        let dt = parse_mail_date("Mon, 27 May 2024 12:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-05-27");
    }

    #[test]
    fn parses_rfc2822_without_zone() {
        assert!(parse_mail_date("Mon, 27 May 2024 12:00:00").is_some());
    }

    #[test]
    fn parses_rfc3339() {
        assert!(parse_mail_date("2024-05-27T12:00:00Z").is_some());
        assert!(parse_mail_date("2024-05-27T12:00:00").is_some());
    }

    #[test]
    fn parses_space_separated() {
        assert!(parse_mail_date("2024-05-27 12:00:00").is_some());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_mail_date("").is_none());
        assert!(parse_mail_date("not a date").is_none());
    }

    #[test]
    fn record_line_without_id_fails() {
        let line = r#"{"uid": 5, "subject": "x"}"#;
        assert!(serde_json::from_str::<MailRecord>(line).is_err());
    }

    #[test]
    fn record_line_with_defaults_loads() {
        let line = r#"{"id": "abc"}"#;
        let rec: MailRecord = serde_json::from_str(line).unwrap();
        assert!(!rec.deleted);
        assert!(rec.to.is_empty());
        assert_eq!(rec.score, 0.0);
    }
}
