use crate::models::{AttachmentRef, ChatId, Conversation, Message, Review, ReviewStats, Sender, DEFAULT_TITLE};

const MAX_TITLE_CHARS: usize = 30;

/// `0 B`, `512 B`, `1.5 KB`, `12 MB`: one decimal below ten, none above.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value >= 10.0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Collapses whitespace and cuts long titles at a word boundary.
pub fn display_title(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }
    let head: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    let head = head.trim_end();
    let cut = match head.rfind(' ') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    format!("{cut}...")
}

pub fn conversation_line(conversation: &Conversation, active: Option<&ChatId>) -> String {
    let marker = if active == Some(&conversation.id) { '*' } else { ' ' };
    format!("{marker} [{}] {}", conversation.id, display_title(&conversation.title))
}

pub fn attachment_line(index: usize, attachment: &AttachmentRef) -> String {
    format!(
        "  {}. {} ({}, {})",
        index + 1,
        attachment.name,
        format_bytes(attachment.size),
        attachment.media_type
    )
}

pub fn message_lines(message: &Message) -> Vec<String> {
    let label = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    let mut lines = Vec::new();
    for attachment in &message.attachments {
        lines.push(format!("{label} [file] {} ({})", attachment.name, format_bytes(attachment.size)));
    }
    if !message.text.is_empty() || message.attachments.is_empty() {
        lines.push(format!("{label}> {}", message.text));
    }
    lines
}

pub fn review_lines(review: &Review, mine: bool) -> Vec<String> {
    let rating = review.rating.min(5) as usize;
    let stars = format!("{}{}", "★".repeat(rating), "☆".repeat(5 - rating));
    let date = review
        .created_at
        .map(|d| format!(" {}", d.format("%d.%m.%Y")))
        .unwrap_or_default();
    let owner = if mine { " (you)" } else { "" };
    vec![
        format!("#{} {}{owner}{date}", review.id, review.user_id),
        format!("  {stars} {}", review.text),
    ]
}

pub fn stats_lines(stats: &ReviewStats) -> Vec<String> {
    let mut lines = vec![format!(
        "Average {:.1} from {} review(s)",
        stats.average_rating, stats.total_reviews
    )];
    for rating in (1..=5u8).rev() {
        let count = stats.distribution.get(&rating).copied().unwrap_or(0);
        let share = if stats.total_reviews > 0 {
            count as f64 * 100.0 / stats.total_reviews as f64
        } else {
            0.0
        };
        lines.push(format!("  {rating}★ {count:>4} ({share:.0}%)"));
    }
    lines
}
