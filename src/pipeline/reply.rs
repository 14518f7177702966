//! Reply composition: plain-text + HTML summary of an extracted receipt.

use rust_decimal::Decimal;

use crate::channels::email_types::InboundEmail;
use crate::pipeline::types::{LedgerOutcome, Receipt};

/// Subject used when the original message had none.
const DEFAULT_SUBJECT: &str = "recent email";

/// A reply ready to be handed to a `ReplySender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEmail {
    pub to: String,
    pub subject: String,
    /// Original Message-ID, including angle brackets.
    pub in_reply_to: Option<String>,
    pub text: String,
    pub html: String,
}

/// Build the summary reply for a recorded (or failed) receipt.
///
/// `ledger_link_base`, when set, is prefixed to the record id to link the
/// ledger row.
pub fn compose_reply(
    original: &InboundEmail,
    receipt: &Receipt,
    ledger: &LedgerOutcome,
    ledger_link_base: Option<&str>,
) -> ReplyEmail {
    let ledger_link = match ledger {
        LedgerOutcome::Recorded { record_id } => ledger_link_base
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), record_id)),
        LedgerOutcome::Failed { .. } => None,
    };

    ReplyEmail {
        to: original.sender.clone(),
        subject: reply_subject(original.subject.as_deref()),
        in_reply_to: original
            .message_id
            .as_deref()
            .map(|id| format!("<{}>", id.trim_matches(|c| c == '<' || c == '>'))),
        text: render_text(receipt, ledger, ledger_link.as_deref()),
        html: render_html(receipt, ledger, ledger_link.as_deref()),
    }
}

/// `Re: {subject}`, defaulting to `Re: recent email`.
pub fn reply_subject(subject: Option<&str>) -> String {
    let subject = subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUBJECT);
    format!("Re: {subject}")
}

fn render_text(receipt: &Receipt, ledger: &LedgerOutcome, link: Option<&str>) -> String {
    let mut out = String::with_capacity(512);

    out.push_str("Receipt processed\n\n");
    out.push_str(&format!("Company: {}\n", receipt.company));
    out.push_str(&format!("Date: {}\n", receipt.date));
    out.push_str(&format!(
        "Total: {} {}\n",
        receipt.total_amount, receipt.currency
    ));
    out.push_str(&format!("Category: {}\n", receipt.category.label()));

    out.push_str("\nLine items:\n");
    if receipt.line_items.is_empty() {
        out.push_str("  (none)\n");
    }
    for item in &receipt.line_items {
        out.push_str(&format!(
            "  - {}: {} x {}\n",
            item.name_of_product, item.amount, item.quantity
        ));
    }

    out.push('\n');
    match ledger {
        LedgerOutcome::Recorded { record_id } => {
            out.push_str(&format!("Recorded in ledger: {record_id}\n"));
            if let Some(link) = link {
                out.push_str(&format!("{link}\n"));
            }
        }
        LedgerOutcome::Failed { error } => {
            out.push_str(&format!("Ledger error: {error}\n"));
        }
    }

    out
}

fn render_html(receipt: &Receipt, ledger: &LedgerOutcome, link: Option<&str>) -> String {
    let mut rows = String::new();
    let mut grand_total = Some(Decimal::ZERO);

    for item in &receipt.line_items {
        let line_total = item.line_total();
        if let Some(total) = line_total {
            grand_total = grand_total.and_then(|sum| sum.checked_add(total));
        }
        rows.push_str(&format!(
            "<tr><td>{}</td><td style=\"text-align:right\">{}</td>\
             <td style=\"text-align:right\">{}</td><td style=\"text-align:right\">{}</td></tr>\n",
            escape_html(&item.name_of_product),
            escape_html(&item.amount),
            item.quantity,
            format_money(line_total),
        ));
    }

    let ledger_html = match (ledger, link) {
        (LedgerOutcome::Recorded { .. }, Some(link)) => format!(
            "<p><a href=\"{}\">View ledger record</a></p>",
            escape_html(link)
        ),
        (LedgerOutcome::Recorded { record_id }, None) => {
            format!("<p>Recorded in ledger: {}</p>", escape_html(record_id))
        }
        (LedgerOutcome::Failed { error }, _) => format!(
            "<p style=\"color:#b00020\">Ledger error: {}</p>",
            escape_html(error)
        ),
    };

    format!(
        "<html><body>\n\
         <h2>Receipt processed</h2>\n\
         <p><strong>Company:</strong> {company}<br>\n\
         <strong>Date:</strong> {date}<br>\n\
         <strong>Total:</strong> {total} {currency}<br>\n\
         <strong>Category:</strong> {category}</p>\n\
         <table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\n\
         <thead><tr><th>Product</th><th>Amount</th><th>Qty</th><th>Line total</th></tr></thead>\n\
         <tbody>\n{rows}</tbody>\n\
         <tfoot><tr><th colspan=\"3\" style=\"text-align:right\">Total</th>\
         <th style=\"text-align:right\">{grand_total}</th></tr></tfoot>\n\
         </table>\n\
         {ledger_html}\n\
         </body></html>\n",
        company = escape_html(&receipt.company),
        date = escape_html(&receipt.date),
        total = escape_html(&receipt.total_amount),
        currency = receipt.currency,
        category = receipt.category.label(),
        grand_total = format_money(grand_total),
    )
}

/// Two decimals, or `NaN` for amounts that are not numbers.
fn format_money(value: Option<Decimal>) -> String {
    match value {
        Some(mut v) => {
            v.rescale(2);
            v.to_string()
        }
        None => "NaN".to_string(),
    }
}

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
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
