//! Message rendering per notification kind

use crate::db::models::{NotificationKind, WorkItem};
use chrono::{DateTime, Utc};

pub fn email_subject(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::VideoAssigned => "ShortHub - New short assigned",
        NotificationKind::DeadlineReminder => "ShortHub - Deadline approaching",
        NotificationKind::VideoCompleted => "ShortHub - Short completed",
        NotificationKind::VideoValidated => "ShortHub - Short validated",
        NotificationKind::VideoRejected => "ShortHub - Short needs changes",
        NotificationKind::AccountBlocked => "ShortHub - Account blocked",
        NotificationKind::AccountUnblocked => "ShortHub - Account reactivated",
        NotificationKind::ShortCompleted => "ShortHub - New short uploaded",
    }
}

/// Short title shown above the message on every channel
pub fn headline(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::VideoAssigned => "🎬 New short assigned",
        NotificationKind::DeadlineReminder => "⏰ Deadline reminder",
        NotificationKind::VideoCompleted => "✅ Short completed",
        NotificationKind::VideoValidated => "🎉 Short validated",
        NotificationKind::VideoRejected => "🔁 Short rejected",
        NotificationKind::AccountBlocked => "🔒 Account blocked",
        NotificationKind::AccountUnblocked => "🔓 Account reactivated",
        NotificationKind::ShortCompleted => "📦 Short uploaded",
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%A %d %B %Y, %H:%M UTC").to_string()
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><td style="padding:4px 12px 4px 0;color:#6b7280;">{}</td><td style="padding:4px 0;">{}</td></tr>"#,
        label, value
    )
}

fn item_details(item: &WorkItem) -> String {
    let mut rows = vec![detail_row("Title", &escape_html(item.display_title()))];
    if let Some(deadline) = item.deadline {
        rows.push(detail_row("Deadline", &format_date(deadline)));
    }
    rows.push(detail_row(
        "Source",
        &format!(r#"<a href="{0}">{0}</a>"#, escape_html(&item.source_video_url)),
    ));
    if let Some(notes) = item.notes.as_deref().filter(|n| !n.is_empty()) {
        rows.push(detail_row("Notes", &escape_html(notes)));
    }
    if let Some(feedback) = item.admin_feedback.as_deref().filter(|f| !f.is_empty()) {
        rows.push(detail_row("Feedback", &escape_html(feedback)));
    }
    format!(r#"<table style="margin:16px 0;border-collapse:collapse;">{}</table>"#, rows.concat())
}

/// Full HTML email body
pub fn render_email(
    kind: NotificationKind,
    recipient_name: &str,
    message: &str,
    item: Option<&WorkItem>,
    frontend_url: &str,
) -> String {
    let details = item.map(item_details).unwrap_or_default();
    let dashboard = format!("{}/dashboard", frontend_url.trim_end_matches('/'));

    format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family:Arial,sans-serif;background:#f3f4f6;padding:24px;">
<div style="max-width:600px;margin:0 auto;background:#ffffff;border-radius:8px;padding:32px;">
<h2 style="margin-top:0;">{headline}</h2>
<p>Hello <strong>{name}</strong>,</p>
<p>{message}</p>
{details}
<p><a href="{dashboard}" style="display:inline-block;background:#3b82f6;color:#ffffff;padding:10px 20px;border-radius:6px;text-decoration:none;">Open dashboard</a></p>
<p style="color:#9ca3af;font-size:12px;">ShortHub notification. You can disable emails in your profile settings.</p>
</div>
</body>
</html>"#,
        headline = headline(kind),
        name = escape_html(recipient_name),
        message = escape_html(message),
        details = details,
        dashboard = dashboard,
    )
}

/// WhatsApp body: bold headline followed by the message
pub fn whatsapp_body(kind: NotificationKind, message: &str) -> String {
    format!("*ShortHub - {}*\n\n{}", headline(kind), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_contains_dashboard_link_and_escapes() {
        let html = render_email(
            NotificationKind::VideoRejected,
            "ed",
            "Audio <missing>",
            None,
            "https://app.example.com/",
        );
        assert!(html.contains("https://app.example.com/dashboard"));
        assert!(html.contains("Audio &lt;missing&gt;"));
        assert!(html.contains(headline(NotificationKind::VideoRejected)));
    }

    #[test]
    fn test_whatsapp_body_has_headline() {
        let body = whatsapp_body(NotificationKind::DeadlineReminder, "3h left");
        assert!(body.starts_with("*ShortHub - ⏰ Deadline reminder*"));
        assert!(body.ends_with("3h left"));
    }

    #[test]
    fn test_every_kind_has_subject() {
        for kind in [
            NotificationKind::VideoAssigned,
            NotificationKind::ShortCompleted,
            NotificationKind::AccountUnblocked,
        ] {
            assert!(email_subject(kind).starts_with("ShortHub"));
        }
    }
}
