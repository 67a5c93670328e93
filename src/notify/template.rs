//! Reminder email templates.

use rust_decimal::Decimal;

use crate::notify::OutgoingEmail;
use crate::store::record::{Record, columns};

/// Subject line for a reminder about `code` issued by `issuer`.
pub fn reminder_subject(code: Option<&str>, issuer: Option<&str>) -> String {
    match (code, issuer) {
        (Some(code), Some(issuer)) => format!("Payment Reminder: {code} - {issuer}"),
        (Some(only), None) | (None, Some(only)) => format!("Payment Reminder: {only}"),
        (None, None) => "Payment Reminder".to_string(),
    }
}

/// Render the reminder for `record`, addressed to `to`.
///
/// Rows that carry their own `Subject` and `Message` columns are sent
/// verbatim as plain text. Everything else gets the standard template.
/// `due` is the already-formatted due date, `sequence` the numbered date
/// column that triggered the reminder, if any.
pub fn render_reminder(
    record: &Record,
    to: &str,
    due: &str,
    sequence: Option<usize>,
) -> OutgoingEmail {
    if let (Some(subject), Some(message)) = (
        record.fields.text(columns::SUBJECT),
        record.fields.text(columns::MESSAGE),
    ) {
        return OutgoingEmail {
            to: to.to_string(),
            subject,
            text: message,
            html: None,
        };
    }

    let code = record.code();
    let issuer = record.issuer();
    let amount = record.amount().map(format_amount);

    let mut rows: Vec<(&str, String)> = Vec::new();
    if let Some(issuer) = &issuer {
        rows.push(("Company", issuer.clone()));
    }
    if let Some(code) = &code {
        rows.push(("ISIN", code.clone()));
    }
    if let Some(amount) = &amount {
        rows.push(("Amount", amount.clone()));
    }
    rows.push(("Due date", due.to_string()));
    if let Some(n) = sequence {
        rows.push(("Instalment", n.to_string()));
    }

    let mut text = String::from("This is a reminder that the following payment is now due.\n\n");
    for (label, value) in &rows {
        text.push_str(&format!("{label}: {value}\n"));
    }

    let mut html = String::from(
        "<p>This is a reminder that the following payment is now due.</p>\n\
         <table cellpadding=\"6\" style=\"border-collapse:collapse\">\n",
    );
    for (label, value) in &rows {
        html.push_str(&format!(
            "<tr><th align=\"left\">{}</th><td>{}</td></tr>\n",
            escape_html(label),
            escape_html(value)
        ));
    }
    html.push_str("</table>\n");

    OutgoingEmail {
        to: to.to_string(),
        subject: reminder_subject(code.as_deref(), issuer.as_deref()),
        text,
        html: Some(html),
    }
}

/// Two decimal places with comma thousands separators.
pub fn format_amount(amount: Decimal) -> String {
    let fixed = format!("{:.2}", amount.round_dp(2));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac}")
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
