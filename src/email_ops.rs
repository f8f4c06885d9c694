use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};

use super::{
    AddLabelArgs, CountEmailsArgs, DateRangeArgs, Executor, Mailbox, MaxResultsArgs,
    MessageFormat, MessageIdArgs, Outcome, RecentEmailsArgs, ReplyEmailArgs, SearchEmailsArgs,
    SendEmailArgs, SenderArgs, ToolContext, build_mime_message, encode_raw_message, parse_args,
};

const MAX_RESULTS_CAP: i64 = 100;

pub(crate) fn email_executor(name: &str) -> Option<Executor> {
    let exec: Executor = match name {
        "send_email_tool" => send_email,
        "get_recent_emails_tool" => get_recent_emails,
        "search_emails_tool" => search_emails,
        "count_emails_tool" => count_emails,
        "get_unread_emails_tool" => get_unread_emails,
        "get_emails_from_sender_tool" => get_emails_from_sender,
        "get_emails_by_date_range_tool" => get_emails_by_date_range,
        "get_email_body_tool" => get_email_body,
        "reply_to_email_tool" => reply_to_email,
        "mark_as_read_tool" => mark_as_read,
        "mark_as_unread_tool" => mark_as_unread,
        "delete_email_tool" => delete_email,
        "get_inbox_stats_tool" => get_inbox_stats,
        "count_emails_from_sender_tool" => count_emails_from_sender,
        "count_emails_in_date_range_tool" => count_emails_in_date_range,
        "get_emails_with_attachments_tool" => get_emails_with_attachments,
        "get_starred_emails_tool" => get_starred_emails,
        "add_label_to_email_tool" => add_label_to_email,
        "get_email_labels_tool" => get_email_labels,
        _ => return None,
    };
    Some(exec)
}

// ── Message helpers ─────────────────────────────────────────────────

fn clamp_max(requested: Option<i64>, default: i64) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_RESULTS_CAP) as usize
}

fn header<'a>(message: &'a Value, name: &str) -> Option<&'a str> {
    message
        .pointer("/payload/headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(|n| n.as_str())
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })?
        .get("value")?
        .as_str()
}

fn str_field<'a>(message: &'a Value, key: &str) -> &'a str {
    message.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

pub(crate) fn summarize_message(message: &Value) -> Value {
    json!({
        "id": str_field(message, "id"),
        "thread_id": str_field(message, "threadId"),
        "subject": header(message, "Subject").unwrap_or("No Subject"),
        "from": header(message, "From").unwrap_or("Unknown"),
        "to": header(message, "To").unwrap_or("Unknown"),
        "date": header(message, "Date").unwrap_or("Unknown"),
        "snippet": str_field(message, "snippet"),
    })
}

pub(crate) fn decode_base64url(data: &str) -> Option<String> {
    let cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(cleaned).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn find_plain_text(part: &Value) -> Option<String> {
    let mime = part.get("mimeType").and_then(|v| v.as_str()).unwrap_or_default();
    if mime.eq_ignore_ascii_case("text/plain") {
        if let Some(text) = part
            .pointer("/body/data")
            .and_then(|v| v.as_str())
            .and_then(decode_base64url)
        {
            return Some(text);
        }
    }
    part.get("parts")?.as_array()?.iter().find_map(find_plain_text)
}

/// First text/plain part anywhere in the tree, else the top-level body.
pub(crate) fn message_body(message: &Value) -> Option<String> {
    let payload = message.get("payload")?;
    find_plain_text(payload).or_else(|| {
        payload
            .pointer("/body/data")
            .and_then(|v| v.as_str())
            .and_then(decode_base64url)
    })
}

fn fetch_summaries(mailbox: &dyn Mailbox, query: &str, max: usize) -> Result<Vec<Value>, String> {
    let list = mailbox.list_messages(query, max)?;
    let mut emails = Vec::with_capacity(list.ids.len().min(max));
    for id in list.ids.iter().take(max) {
        match mailbox.get_message(id, MessageFormat::Metadata) {
            Ok(message) => emails.push(summarize_message(&message)),
            Err(err) => tracing::warn!(message_id = %id, error = %err, "skipping unreadable email"),
        }
    }
    Ok(emails)
}

fn count_matching(mailbox: &dyn Mailbox, query: &str) -> Result<u64, String> {
    Ok(mailbox.list_messages(query, 1)?.result_size_estimate)
}

/// Gmail accepts both `2024-01-31` and `2024/01/31`; dates go through as given.
fn date_range_query(start: &str, end: &str) -> String {
    format!("after:{start} before:{end}")
}

fn listing(ctx: &ToolContext, query: &str, max: usize) -> Result<Outcome, String> {
    let emails = fetch_summaries(ctx.mailbox()?, query, max)?;
    Ok(Outcome::ok(json!({
        "count": emails.len(),
        "emails": emails,
    })))
}

// ── Sending ─────────────────────────────────────────────────────────

fn send_email(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: SendEmailArgs = parse_args(args)?;
    let mailbox = ctx.mailbox()?;
    let to = parsed.to.trim();
    if !to.contains('@') {
        return Ok(Outcome::failure(format!("Invalid recipient address: {to}")));
    }
    let mime = build_mime_message(to, &parsed.subject, &parsed.body, None);
    let sent = mailbox.send_raw(&encode_raw_message(&mime), None)?;
    Ok(Outcome::ok(json!({
        "message_id": str_field(&sent, "id"),
        "thread_id": str_field(&sent, "threadId"),
        "message": format!("Email sent successfully to {to}"),
    })))
}

fn reply_to_email(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: ReplyEmailArgs = parse_args(args)?;
    let mailbox = ctx.mailbox()?;
    let original = mailbox.get_message(&parsed.message_id, MessageFormat::Metadata)?;
    let Some(sender) = header(&original, "From") else {
        return Ok(Outcome::failure(format!(
            "Cannot reply: sender of {} is unknown",
            parsed.message_id
        )));
    };
    let subject = header(&original, "Subject").unwrap_or_default();
    let subject = if subject.to_ascii_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    };
    let thread_id = original.get("threadId").and_then(|v| v.as_str());
    let mime = build_mime_message(
        sender,
        &subject,
        &parsed.reply_body,
        header(&original, "Message-ID"),
    );
    let sent = mailbox.send_raw(&encode_raw_message(&mime), thread_id)?;
    Ok(Outcome::ok(json!({
        "message_id": str_field(&sent, "id"),
        "thread_id": str_field(&sent, "threadId"),
        "replied_to": sender,
        "message": "Reply sent successfully",
    })))
}

// ── Listing and search ──────────────────────────────────────────────

fn get_recent_emails(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: RecentEmailsArgs = parse_args(args)?;
    let query = if parsed.include_spam_trash.unwrap_or(false) {
        ""
    } else {
        "-in:spam -in:trash"
    };
    listing(ctx, query, clamp_max(parsed.max_results, 10))
}

fn search_emails(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: SearchEmailsArgs = parse_args(args)?;
    let emails = fetch_summaries(ctx.mailbox()?, &parsed.query, clamp_max(parsed.max_results, 50))?;
    Ok(Outcome::ok(json!({
        "query": parsed.query,
        "count": emails.len(),
        "emails": emails,
    })))
}

fn get_unread_emails(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MaxResultsArgs = parse_args(args)?;
    listing(ctx, "is:unread", clamp_max(parsed.max_results, 20))
}

fn get_emails_with_attachments(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MaxResultsArgs = parse_args(args)?;
    listing(ctx, "has:attachment", clamp_max(parsed.max_results, 20))
}

fn get_starred_emails(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MaxResultsArgs = parse_args(args)?;
    listing(ctx, "is:starred", clamp_max(parsed.max_results, 20))
}

fn get_emails_from_sender(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: SenderArgs = parse_args(args)?;
    let query = format!("from:{}", parsed.sender_email.trim());
    let emails = fetch_summaries(ctx.mailbox()?, &query, clamp_max(parsed.max_results, 50))?;
    Ok(Outcome::ok(json!({
        "sender": parsed.sender_email,
        "count": emails.len(),
        "emails": emails,
    })))
}

fn get_emails_by_date_range(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: DateRangeArgs = parse_args(args)?;
    let query = date_range_query(&parsed.start_date, &parsed.end_date);
    let emails = fetch_summaries(ctx.mailbox()?, &query, clamp_max(parsed.max_results, 50))?;
    Ok(Outcome::ok(json!({
        "start_date": parsed.start_date,
        "end_date": parsed.end_date,
        "count": emails.len(),
        "emails": emails,
    })))
}

fn get_email_body(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MessageIdArgs = parse_args(args)?;
    let message = ctx.mailbox()?.get_message(&parsed.message_id, MessageFormat::Full)?;
    let body = message_body(&message).unwrap_or_else(|| "No plain text body found".to_string());
    Ok(Outcome::ok(json!({
        "message_id": parsed.message_id,
        "subject": header(&message, "Subject").unwrap_or("No Subject"),
        "from": header(&message, "From").unwrap_or("Unknown"),
        "date": header(&message, "Date").unwrap_or("Unknown"),
        "body": body,
    })))
}

// ── Counting ────────────────────────────────────────────────────────

fn count_emails(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: CountEmailsArgs = parse_args(args)?;
    let query = parsed.query.unwrap_or_default();
    let count = count_matching(ctx.mailbox()?, query.trim())?;
    let label = if query.trim().is_empty() {
        "all emails".to_string()
    } else {
        query
    };
    Ok(Outcome::ok(json!({ "query": label, "count": count })))
}

fn count_emails_from_sender(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: SenderArgs = parse_args(args)?;
    let query = format!("from:{}", parsed.sender_email.trim());
    let count = count_matching(ctx.mailbox()?, &query)?;
    Ok(Outcome::ok(json!({ "sender": parsed.sender_email, "count": count })))
}

fn count_emails_in_date_range(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: DateRangeArgs = parse_args(args)?;
    let query = date_range_query(&parsed.start_date, &parsed.end_date);
    let count = count_matching(ctx.mailbox()?, &query)?;
    Ok(Outcome::ok(json!({
        "start_date": parsed.start_date,
        "end_date": parsed.end_date,
        "count": count,
    })))
}

fn get_inbox_stats(ctx: &ToolContext, _args: Value) -> Result<Outcome, String> {
    let mailbox = ctx.mailbox()?;
    let total = count_matching(mailbox, "")?;
    let unread = count_matching(mailbox, "is:unread")?;
    let starred = count_matching(mailbox, "is:starred")?;
    let attachments = count_matching(mailbox, "has:attachment")?;
    let inbox = count_matching(mailbox, "in:inbox")?;
    Ok(Outcome::ok(json!({
        "stats": {
            "total_emails": total,
            "unread_emails": unread,
            "read_emails": total.saturating_sub(unread),
            "starred_emails": starred,
            "emails_with_attachments": attachments,
            "emails_in_inbox": inbox,
        }
    })))
}

// ── Labels ──────────────────────────────────────────────────────────

fn mark_as_read(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MessageIdArgs = parse_args(args)?;
    ctx.mailbox()?.modify_labels(&parsed.message_id, &[], &["UNREAD"])?;
    Ok(Outcome::ok(json!({
        "message_id": parsed.message_id,
        "message": "Email marked as read",
    })))
}

fn mark_as_unread(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MessageIdArgs = parse_args(args)?;
    ctx.mailbox()?.modify_labels(&parsed.message_id, &["UNREAD"], &[])?;
    Ok(Outcome::ok(json!({
        "message_id": parsed.message_id,
        "message": "Email marked as unread",
    })))
}

fn delete_email(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MessageIdArgs = parse_args(args)?;
    ctx.mailbox()?.trash(&parsed.message_id)?;
    Ok(Outcome::ok(json!({
        "message_id": parsed.message_id,
        "message": "Email moved to trash",
    })))
}

fn add_label_to_email(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: AddLabelArgs = parse_args(args)?;
    ctx.mailbox()?
        .modify_labels(&parsed.message_id, &[parsed.label_id.as_str()], &[])?;
    Ok(Outcome::ok(json!({
        "message": format!("Label {} added", parsed.label_id),
        "message_id": parsed.message_id,
        "label_id": parsed.label_id,
    })))
}

fn get_email_labels(ctx: &ToolContext, _args: Value) -> Result<Outcome, String> {
    let labels: Vec<Value> = ctx
        .mailbox()?
        .list_labels()?
        .iter()
        .map(|label| {
            json!({
                "id": str_field(label, "id"),
                "name": str_field(label, "name"),
                "type": str_field(label, "type"),
            })
        })
        .collect();
    Ok(Outcome::ok(json!({
        "count": labels.len(),
        "labels": labels,
    })))
}
