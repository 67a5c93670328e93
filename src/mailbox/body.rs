//! Message body resolution.
//!
//! Walks the MIME tree depth-first. The first `text/plain` part found wins;
//! if there is none, the first `text/html` part is converted to text.
//! Attachments are never read.

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};

use crate::error::MailboxError;
use crate::mailbox::FetchedMessage;

/// Nested `message/rfc822` parts deeper than this are ignored.
const MAX_DEPTH: usize = 8;

/// The readable parts of a fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailContent {
    pub uid: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
}

/// Parse a fetched message and resolve its text body.
pub fn read_message(fetched: &FetchedMessage) -> Result<MailContent, MailboxError> {
    let parsed = MessageParser::default()
        .parse(&fetched.raw)
        .ok_or_else(|| MailboxError::Message {
            id: fetched.uid.clone(),
            reason: "not a valid RFC 822 message".into(),
        })?;

    let body = resolve_body(&parsed).ok_or_else(|| MailboxError::Message {
        id: fetched.uid.clone(),
        reason: "no readable text part".into(),
    })?;

    let date = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    Ok(MailContent {
        uid: fetched.uid.clone(),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        date,
        body,
    })
}

/// Text of the message: plain part if any, else the HTML part as text.
pub fn resolve_body(message: &Message<'_>) -> Option<String> {
    let mut found = BodyParts::default();
    visit(message, 0, 0, &mut found);
    found
        .text
        .map(str::to_string)
        .or_else(|| found.html.map(html_to_text))
}

#[derive(Default)]
struct BodyParts<'a> {
    text: Option<&'a str>,
    html: Option<&'a str>,
}

fn visit<'a>(message: &'a Message<'_>, part_id: usize, depth: usize, found: &mut BodyParts<'a>) {
    if depth > MAX_DEPTH || (found.text.is_some() && found.html.is_some()) {
        return;
    }
    let Some(part) = message.parts.get(part_id) else {
        return;
    };

    match &part.body {
        PartType::Multipart(children) => {
            for child in children {
                visit(message, *child as usize, depth, found);
            }
        }
        PartType::Message(nested) => visit(nested, 0, depth + 1, found),
        _ if is_attachment(part) => {}
        PartType::Text(text) => {
            let is_plain = part
                .content_type()
                .and_then(|ct| ct.subtype())
                .is_none_or(|sub| sub.eq_ignore_ascii_case("plain"));
            if is_plain && found.text.is_none() {
                found.text = Some(text.as_ref());
            }
        }
        PartType::Html(html) => {
            if found.html.is_none() {
                found.html = Some(html.as_ref());
            }
        }
        _ => {}
    }
}

fn is_attachment(part: &mail_parser::MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
}

/// Convert HTML to line-oriented text.
///
/// Block-level tags and table rows end a line, cells are separated by a
/// space, `<script>`/`<style>` content is dropped, common entities are
/// decoded and whitespace inside each line is collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();
    let mut skipping: Option<String> = None;

    while let Some(ch) = chars.next() {
        if ch == '<' {
            let mut tag = String::new();
            for c in chars.by_ref() {
                if c == '>' {
                    break;
                }
                tag.push(c);
            }
            let name = tag_name(&tag);

            if let Some(skip) = &skipping {
                if name == format!("/{skip}") {
                    skipping = None;
                }
                continue;
            }

            match name.as_str() {
                "script" | "style" | "head" => skipping = Some(name.clone()),
                "br" | "br/" | "p" | "/p" | "div" | "/div" | "tr" | "/tr" | "li" | "/li"
                | "table" | "/table" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "/h1" | "/h2"
                | "/h3" | "/h4" | "/h5" | "/h6" => out.push('\n'),
                "td" | "/td" | "th" | "/th" => out.push(' '),
                _ => {}
            }
        } else if skipping.is_none() {
            if ch == '&' {
                let mut entity = String::new();
                while let Some(&c) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '#') || entity.len() > 8 {
                        break;
                    }
                    entity.push(c);
                    chars.next();
                }
                if chars.peek() == Some(&';') {
                    chars.next();
                    out.push_str(decode_entity(&entity));
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            } else {
                out.push(ch);
            }
        }
    }

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tag_name(tag: &str) -> String {
    tag.trim()
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn decode_entity(entity: &str) -> &str {
    match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" | "#39" => "'",
        _ => " ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(raw: &str) -> FetchedMessage {
        FetchedMessage {
            uid: "7".into(),
            raw: raw.replace('\n', "\r\n").into_bytes(),
        }
    }

    #[test]
    fn plain_message() {
        let msg = fetched(
            "From: registrar@example.com\n\
             To: me@example.com\n\
             Subject: Allotment of NCDs\n\
             Date: Mon, 23 Sep 2024 10:00:00 +0000\n\
             Content-Type: text/plain; charset=utf-8\n\
             \n\
             Acme Capital INEABC123456 Non-Convertible Debenture\n",
        );
        let content = read_message(&msg).unwrap();
        assert_eq!(content.subject, "Allotment of NCDs");
        assert!(content.body.contains("INEABC123456"));
        assert_eq!(
            content.date,
            DateTime::from_timestamp(1_727_085_600, 0)
        );
    }

    #[test]
    fn alternative_prefers_plain() {
        let msg = fetched(
            "Subject: Allotment\n\
             Content-Type: multipart/alternative; boundary=\"b1\"\n\
             \n\
             --b1\n\
             Content-Type: text/html\n\
             \n\
             <p>from html</p>\n\
             --b1\n\
             Content-Type: text/plain\n\
             \n\
             from plain\n\
             --b1--\n",
        );
        let content = read_message(&msg).unwrap();
        assert_eq!(content.body.trim(), "from plain");
    }

    #[test]
    fn html_only_is_converted() {
        let msg = fetched(
            "Subject: Allotment\n\
             Content-Type: text/html\n\
             \n\
             <table><tr><td>Acme Capital</td><td>INEABC123456</td><td>NCD</td></tr>\
             <tr><td>Beta&amp;Co</td><td>INEXYZ987654</td><td>Bond</td></tr></table>\n",
        );
        let content = read_message(&msg).unwrap();
        let lines: Vec<&str> = content.body.lines().collect();
        assert_eq!(lines, vec!["Acme Capital INEABC123456 NCD", "Beta&Co INEXYZ987654 Bond"]);
    }

    #[test]
    fn nested_multipart_is_walked() {
        let msg = fetched(
            "Subject: Allotment\n\
             Content-Type: multipart/mixed; boundary=\"outer\"\n\
             \n\
             --outer\n\
             Content-Type: multipart/alternative; boundary=\"inner\"\n\
             \n\
             --inner\n\
             Content-Type: text/plain\n\
             \n\
             nested plain\n\
             --inner--\n\
             --outer\n\
             Content-Type: text/plain\n\
             Content-Disposition: attachment; filename=\"list.txt\"\n\
             \n\
             attachment text\n\
             --outer--\n",
        );
        let content = read_message(&msg).unwrap();
        assert_eq!(content.body.trim(), "nested plain");
    }

    #[test]
    fn attachment_only_has_no_body() {
        let msg = fetched(
            "Subject: Allotment\n\
             Content-Type: multipart/mixed; boundary=\"outer\"\n\
             \n\
             --outer\n\
             Content-Type: application/pdf\n\
             Content-Disposition: attachment; filename=\"a.pdf\"\n\
             \n\
             JVBERi0=\n\
             --outer--\n",
        );
        assert!(matches!(
            read_message(&msg),
            Err(MailboxError::Message { .. })
        ));
    }

    #[test]
    fn html_to_text_drops_scripts_and_styles() {
        let html = "<html><head><style>p{}</style></head><body><p>Hello</p>\
                    <script>var x = 1;</script><p>World &lt;3</p></body></html>";
        assert_eq!(html_to_text(html), "Hello\nWorld <3");
    }

    #[test]
    fn html_to_text_breaks_lines() {
        assert_eq!(html_to_text("one<br>two<br/>three"), "one\ntwo\nthree");
        assert_eq!(html_to_text("<div>  a   b </div>"), "a b");
    }

    #[test]
    fn html_to_text_plain_passthrough() {
        assert_eq!(html_to_text("No HTML here"), "No HTML here");
        assert_eq!(html_to_text(""), "");
    }
}
