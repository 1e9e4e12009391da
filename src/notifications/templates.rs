//! Telegram-HTML message bodies.
use chrono::NaiveDate;
use std::fmt::Write;

use crate::db::models::DueTarget;

/// Escapes the characters Telegram's HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn status_change(
    name: &str,
    hosting: &str,
    online: bool,
    ip: Option<&str>,
    url: Option<&str>,
) -> String {
    let status = if online { "ONLINE" } else { "UNREACHABLE" };
    let mut text = format!(
        "<b>Server status changed</b>\n\nServer: <b>{}</b> ({})\nStatus: {status}\n",
        escape_html(name),
        escape_html(hosting),
    );
    if let Some(ip) = ip {
        let _ = writeln!(text, "IP: <code>{}</code>", escape_html(ip));
    }
    if let Some(url) = url {
        let _ = writeln!(text, "URL: {}", escape_html(url));
    }
    text
}

/// Human label for how far away a due date is.
pub fn due_label(expiry: NaiveDate, today: NaiveDate) -> String {
    match (expiry - today).num_days() {
        d if d < 0 => "OVERDUE".to_string(),
        0 => "TODAY".to_string(),
        1 => "TOMORROW".to_string(),
        d => format!("in {d} days"),
    }
}

/// One aggregate reminder covering every due item of an owner.
pub fn reminder(items: &[DueTarget], today: NaiveDate) -> String {
    let mut text = String::from("<b>Payment reminder</b>\n\n");
    for item in items {
        let _ = write!(
            text,
            "<b>{}</b> ({})\nDue {}: {}\nAmount: {:.2} {}\n\n",
            escape_html(&item.name),
            escape_html(&item.hosting),
            due_label(item.expiry_date, today),
            item.expiry_date.format("%d.%m.%Y"),
            item.price,
            escape_html(&item.currency),
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn status_change_lists_addresses_and_escapes_names() {
        let text = status_change("db <main>", "Acme & Co", false, Some("203.0.113.5"), None);
        assert!(text.contains("Server: <b>db &lt;main&gt;</b> (Acme &amp; Co)"));
        assert!(text.contains("Status: UNREACHABLE"));
        assert!(text.contains("IP: <code>203.0.113.5</code>"));
        assert!(!text.contains("URL:"));

        let text = status_change("web", "h", true, None, Some("https://example.com"));
        assert!(text.contains("Status: ONLINE"));
        assert!(text.contains("URL: https://example.com"));
    }

    #[test]
    fn due_labels() {
        let today = day("2026-10-18");
        assert_eq!(due_label(day("2026-10-17"), today), "OVERDUE");
        assert_eq!(due_label(today, today), "TODAY");
        assert_eq!(due_label(day("2026-10-19"), today), "TOMORROW");
        assert_eq!(due_label(day("2026-10-25"), today), "in 7 days");
    }

    #[test]
    fn reminder_aggregates_every_item() {
        let today = day("2026-10-18");
        let items = vec![
            DueTarget {
                name: "alpha".into(),
                hosting: "4VPS".into(),
                expiry_date: today,
                price: 350.0,
                currency: "RUB".into(),
            },
            DueTarget {
                name: "beta".into(),
                hosting: "Hetzner".into(),
                expiry_date: day("2026-10-21"),
                price: 4.5,
                currency: "EUR".into(),
            },
        ];
        let text = reminder(&items, today);
        assert!(text.starts_with("<b>Payment reminder</b>"));
        assert!(text.contains("<b>alpha</b> (4VPS)\nDue TODAY: 18.10.2026\nAmount: 350.00 RUB"));
        assert!(text.contains("<b>beta</b> (Hetzner)\nDue in 3 days: 21.10.2026\nAmount: 4.50 EUR"));
    }
}
