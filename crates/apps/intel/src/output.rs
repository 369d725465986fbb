//! Plain-text rendering for terminal output

use chrono::Local;

use mail::{NormalizedMessage, SyncStats, ThreadSummary};

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn print_messages(messages: &[NormalizedMessage]) {
    if messages.is_empty() {
        println!("No messages.");
        return;
    }

    for message in messages {
        let when = message.received_at.with_timezone(&Local).format("%b %d %H:%M");
        let badge = message
            .analysis
            .as_ref()
            .map(|a| format!(" [{} {}]", a.priority.as_str(), a.urgency_score))
            .unwrap_or_default();
        println!(
            "{}  {:<24}  {}{}",
            when,
            truncate(&message.sender_name, 24),
            truncate(&message.subject, 60),
            badge
        );
        let preview = message
            .analysis
            .as_ref()
            .map(|a| a.summary.as_str())
            .unwrap_or(message.snippet.as_str());
        println!("    {}  ({} / {})", truncate(preview, 100), message.id, message.thread_id);
    }
}

pub fn print_threads(threads: &[ThreadSummary]) {
    if threads.is_empty() {
        println!("No cached threads. Run `intel sync` first.");
        return;
    }

    for thread in threads {
        let urgency = thread
            .urgency_score
            .map(|u| format!("{:>3}", u))
            .unwrap_or_else(|| "  -".to_string());
        let priority = thread.priority.map(|p| p.as_str()).unwrap_or("-");
        println!(
            "{} {:<6} {:<24} {} ({})",
            urgency,
            priority,
            truncate(&thread.sender_name, 24),
            truncate(&thread.subject, 60),
            thread.message_count
        );
        println!("           {}", truncate(&thread.preview, 100));
    }
}

pub fn print_sync_stats(stats: &SyncStats) {
    println!(
        "Synced {} threads, {} messages in {}ms{}",
        stats.threads_listed,
        stats.messages_stored,
        stats.duration_ms,
        if stats.messages_pruned > 0 {
            format!(" ({} old messages pruned)", stats.messages_pruned)
        } else {
            String::new()
        }
    );
    for failure in &stats.failures {
        println!(
            "  skipped {}{}: {}",
            failure.thread_id,
            failure
                .message_id
                .as_ref()
                .map(|m| format!("/{}", m))
                .unwrap_or_default(),
            failure.reason
        );
    }
}
