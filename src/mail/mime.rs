//! Building outgoing messages and decoding retrieved ones.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lettre::address::{Address, Envelope};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl OutgoingMessage {
    /// Every envelope recipient, Bcc included.
    pub fn recipients(&self) -> impl Iterator<Item = &String> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

/// A message ready for submission.
pub struct Composed {
    pub message: Message,
    pub envelope: Envelope,
    pub attachment_count: usize,
}

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(html|body|div|br)").expect("Invalid regex"));

/// True when the body looks like markup and should go out as text/html.
pub fn is_html(body: &str) -> bool {
    MARKUP.is_match(body)
}

fn parse_mailboxes(addresses: &[String]) -> Result<Vec<Mailbox>> {
    addresses
        .iter()
        .map(|a| {
            a.parse::<Mailbox>()
                .with_context(|| format!("Invalid email address '{}'", a))
        })
        .collect()
}

fn attachment_part(path: &Path) -> Result<Option<SinglePart>> {
    if !path.exists() {
        tracing::warn!("Attachment not found, skipping: {}", path.display());
        return Ok(None);
    }
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("attachment"));
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Could not read attachment {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    let content_type = match ContentType::parse(&format!(
        "application/octet-stream; name=\"{}\"",
        filename.replace('"', "")
    )) {
        Ok(content_type) => content_type,
        Err(_) => ContentType::parse("application/octet-stream")?,
    };
    tracing::debug!("Attached {}", path.display());
    Ok(Some(Attachment::new(filename).body(bytes, content_type)))
}

/// Build the MIME message and its envelope.
///
/// Bcc recipients only appear in the envelope. Attachments that cannot be
/// read are logged and left out.
pub fn compose(from: &Mailbox, outgoing: &OutgoingMessage) -> Result<Composed> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(outgoing.subject.clone());
    for mailbox in parse_mailboxes(&outgoing.to)? {
        builder = builder.to(mailbox);
    }
    for mailbox in parse_mailboxes(&outgoing.cc)? {
        builder = builder.cc(mailbox);
    }

    let body = if is_html(&outgoing.body) {
        SinglePart::html(outgoing.body.clone())
    } else {
        SinglePart::plain(outgoing.body.clone())
    };
    let mut multipart = MultiPart::mixed().singlepart(body);
    let mut attachment_count = 0;
    for path in &outgoing.attachments {
        if let Some(part) = attachment_part(path)? {
            multipart = multipart.singlepart(part);
            attachment_count += 1;
        }
    }
    let message = builder.multipart(multipart)?;

    let recipients = outgoing
        .recipients()
        .map(|a| {
            a.parse::<Mailbox>()
                .map(|m| m.email)
                .with_context(|| format!("Invalid email address '{}'", a))
        })
        .collect::<Result<Vec<Address>>>()?;
    let envelope = Envelope::new(Some(from.email.clone()), recipients)?;

    Ok(Composed {
        message,
        envelope,
        attachment_count,
    })
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RetrievedMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub date: String,
    pub body: String,
    pub body_is_html: bool,
    pub has_attachments: bool,
    pub attachments: Vec<String>,
}

/// Decode RFC 2047 encoded words in a raw header value.
pub fn decode_words(value: &str) -> String {
    let line = format!("X: {}", value);
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_string(),
    }
}

/// RFC 2822 date to an RFC 3339 UTC instant, or the raw value if it does
/// not parse.
pub fn normalize_date(raw: &str) -> String {
    match DateTime::parse_from_rfc2822(raw.trim()) {
        Ok(dt) => dt.with_timezone(&Utc).to_rfc3339(),
        Err(_) => raw.to_string(),
    }
}

fn walk<'a>(part: &'a ParsedMail<'a>, out: &mut Vec<&'a ParsedMail<'a>>) {
    out.push(part);
    for sub in &part.subparts {
        walk(sub, out);
    }
}

fn is_multipart(mail: &ParsedMail) -> bool {
    !mail.subparts.is_empty() || mail.ctype.mimetype.starts_with("multipart/")
}

fn decoded_body(part: &ParsedMail) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Could not decode message part: {}", e);
            String::new()
        }
    }
}

/// Pick the body: the first text/html part in a depth-first walk, else
/// the last text/plain part. Single-part messages use their own payload
/// when it is text.
fn select_body(mail: &ParsedMail) -> (String, bool) {
    if !is_multipart(mail) {
        return match mail.ctype.mimetype.as_str() {
            "text/plain" => (decoded_body(mail), false),
            "text/html" => (decoded_body(mail), true),
            _ => (String::new(), false),
        };
    }

    let mut parts = Vec::new();
    walk(mail, &mut parts);

    let mut plain = None;
    for part in parts {
        match part.ctype.mimetype.as_str() {
            "text/html" => return (decoded_body(part), true),
            "text/plain" => plain = Some(part),
            _ => {}
        }
    }
    match plain {
        Some(part) => (decoded_body(part), false),
        None => (String::new(), false),
    }
}

fn attachment_names(mail: &ParsedMail) -> Vec<String> {
    if !is_multipart(mail) {
        return vec![];
    }
    let mut parts = Vec::new();
    walk(mail, &mut parts);

    parts
        .into_iter()
        .filter(|part| {
            part.headers
                .get_first_value("Content-Disposition")
                .map(|cd| cd.to_lowercase().contains("attachment"))
                .unwrap_or(false)
        })
        .filter_map(|part| {
            let disposition = part.get_content_disposition();
            disposition
                .params
                .get("filename")
                .or_else(|| part.ctype.params.get("name"))
                .map(|name| decode_words(name))
        })
        .collect()
}

pub fn decode_message(id: &str, raw: &[u8]) -> Result<RetrievedMessage> {
    let mail = mailparse::parse_mail(raw).context("Parsing message")?;
    let header = |name: &str| mail.headers.get_first_value(name).unwrap_or_default();

    let (body, body_is_html) = select_body(&mail);
    let attachments = attachment_names(&mail);

    Ok(RetrievedMessage {
        id: id.to_string(),
        from: header("From"),
        to: header("To"),
        cc: header("Cc"),
        subject: header("Subject"),
        date: normalize_date(&header("Date")),
        body,
        body_is_html,
        has_attachments: !attachments.is_empty(),
        attachments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sender() -> Mailbox {
        "Errand Bot <bot@example.com>".parse().unwrap()
    }

    fn formatted(composed: &Composed) -> String {
        String::from_utf8(composed.message.formatted()).unwrap()
    }

    #[test]
    fn it_detects_markup() {
        assert!(is_html("<div>Hello</div>"));
        assert!(is_html("line one<BR>line two"));
        assert!(is_html("<HTML><p>x</p></HTML>"));
        assert!(!is_html("Plain text with <3 and a < b"));
    }

    #[test]
    fn it_sends_markup_as_html() {
        let outgoing = OutgoingMessage {
            to: vec!["alice@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "<div>Hello</div>".to_string(),
            ..Default::default()
        };
        let raw = formatted(&compose(&sender(), &outgoing).unwrap());
        assert!(raw.contains("Content-Type: text/html"));
        assert!(!raw.contains("Content-Type: text/plain"));
    }

    #[test]
    fn it_sends_text_as_plain() {
        let outgoing = OutgoingMessage {
            to: vec!["alice@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "Hello there".to_string(),
            ..Default::default()
        };
        let raw = formatted(&compose(&sender(), &outgoing).unwrap());
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("<bot@example.com>"));
    }

    #[test]
    fn it_keeps_bcc_out_of_headers() {
        let outgoing = OutgoingMessage {
            to: vec!["alice@example.com".to_string()],
            cc: vec!["carol@example.com".to_string()],
            bcc: vec!["secret@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            ..Default::default()
        };
        let composed = compose(&sender(), &outgoing).unwrap();
        let raw = formatted(&composed);
        assert!(raw.contains("Cc: carol@example.com"));
        assert!(!raw.contains("secret@example.com"));
        assert!(!raw.to_lowercase().contains("bcc:"));

        let envelope: Vec<String> = composed
            .envelope
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(
            envelope,
            vec![
                "alice@example.com",
                "carol@example.com",
                "secret@example.com"
            ]
        );
        assert_eq!(
            composed.envelope.from().map(|a| a.to_string()).as_deref(),
            Some("bot@example.com")
        );
    }

    #[test]
    fn it_skips_missing_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "quarterly numbers").unwrap();

        let outgoing = OutgoingMessage {
            to: vec!["alice@example.com".to_string()],
            subject: "Report".to_string(),
            body: "See attached".to_string(),
            attachments: vec![path, dir.path().join("missing.pdf")],
            ..Default::default()
        };
        let composed = compose(&sender(), &outgoing).unwrap();
        assert_eq!(composed.attachment_count, 1);

        let raw = formatted(&composed);
        assert!(raw.contains("Content-Disposition: attachment"));
        assert!(raw.contains("filename=\"report.txt\""));
        assert!(!raw.contains("missing.pdf"));
    }

    #[test]
    fn it_rejects_invalid_addresses() {
        let outgoing = OutgoingMessage {
            to: vec!["not an address".to_string()],
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            ..Default::default()
        };
        assert!(compose(&sender(), &outgoing).is_err());
    }

    const ALTERNATIVE: &str = "From: =?UTF-8?B?SsOpcsO0bWU=?= <jerome@example.com>\r\n\
To: me@example.com\r\n\
Subject: =?UTF-8?Q?R=C3=A9union?=\r\n\
Date: Tue, 02 Jan 2024 10:30:00 +0100\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain version\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML version</p>\r\n\
--b1--\r\n";

    const PLAIN_WITH_ATTACHMENT: &str = "From: a@example.com\r\n\
To: b@example.com\r\n\
Cc: c@example.com\r\n\
Subject: Files\r\n\
Date: not a date\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b2\"\r\n\
\r\n\
--b2\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Only plain\r\n\
--b2\r\n\
Content-Type: application/pdf; name=\"invoice.pdf\"\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--b2--\r\n";

    #[test]
    fn it_prefers_html_body() {
        let msg = decode_message("42", ALTERNATIVE.as_bytes()).unwrap();
        assert_eq!(msg.id, "42");
        assert!(msg.body.contains("<p>HTML version</p>"));
        assert!(msg.body_is_html);
        assert!(!msg.has_attachments);
    }

    #[test]
    fn it_decodes_encoded_headers_and_date() {
        let msg = decode_message("1", ALTERNATIVE.as_bytes()).unwrap();
        assert_eq!(msg.from, "Jérôme <jerome@example.com>");
        assert_eq!(msg.subject, "Réunion");
        assert_eq!(msg.date, "2024-01-02T09:30:00+00:00");
        assert_eq!(msg.cc, "");
    }

    #[test]
    fn it_falls_back_to_plain_body_and_lists_attachments() {
        let msg = decode_message("7", PLAIN_WITH_ATTACHMENT.as_bytes()).unwrap();
        assert_eq!(msg.body.trim(), "Only plain");
        assert!(!msg.body_is_html);
        assert_eq!(msg.attachments, vec!["invoice.pdf"]);
        assert!(msg.has_attachments);
        assert_eq!(msg.cc, "c@example.com");
        // Unparseable dates are kept as-is
        assert_eq!(msg.date, "not a date");
    }

    #[test]
    fn it_reads_single_part_text() {
        let raw = "From: a@example.com\r\nSubject: Hi\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        let msg = decode_message("3", raw.as_bytes()).unwrap();
        assert_eq!(msg.body.trim(), "Just text");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn it_keeps_unparseable_or_missing_dates() {
        assert_eq!(normalize_date("not a date"), "not a date");
        assert_eq!(normalize_date(""), "");
        assert_eq!(
            normalize_date("Tue, 02 Jan 2024 10:30:00 +0100"),
            "2024-01-02T09:30:00+00:00"
        );

        let raw = "From: a@example.com\r\nSubject: Undated\r\nContent-Type: text/plain\r\n\r\nBody\r\n";
        let msg = decode_message("4", raw.as_bytes()).unwrap();
        assert_eq!(msg.date, "");
    }

    #[test]
    fn it_decodes_encoded_words() {
        assert_eq!(decode_words("=?UTF-8?Q?caf=C3=A9.pdf?="), "café.pdf");
        assert_eq!(decode_words("plain.txt"), "plain.txt");
    }
}
