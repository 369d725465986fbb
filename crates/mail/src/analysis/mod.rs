//! AI triage: summaries, priorities and reply drafts
//!
//! The model itself sits behind the `Analyst` trait; `GeminiAnalyst` is the
//! HTTP implementation. Analyses are attached to the latest message of each
//! thread and saved wholesale.

mod gemini;

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;

pub use gemini::GeminiAnalyst;

use crate::error::InboxError;
use crate::models::{AiAnalysis, MessageId, NormalizedMessage};
use crate::query::group_into_threads;
use crate::storage::MailStore;
use crate::sync::CACHED_VIEW_LIMIT;

/// Bodies are cut to this many characters before being sent to the model
pub const MAX_BODY_CHARS: usize = 8000;

/// Returned when the model call fails
pub const DRAFT_FAILED: &str = "Error generating reply. Please try again.";

/// Returned when the model answers with nothing
pub const DRAFT_EMPTY: &str = "Could not generate reply.";

/// Text-only view of a message handed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisInput {
    pub id: String,
    pub sender: String,
    #[serde(skip)]
    pub sender_name: String,
    pub subject: String,
    pub body: String,
}

impl AnalysisInput {
    /// Strip markup from the body and cut it to `MAX_BODY_CHARS`
    pub fn from_message(message: &NormalizedMessage) -> Self {
        let mut body = strip_html(&message.body);
        if let Some((cut, _)) = body.char_indices().nth(MAX_BODY_CHARS) {
            body.truncate(cut);
        }

        Self {
            id: message.id.0.clone(),
            sender: message.sender.clone(),
            sender_name: message.sender_name.clone(),
            subject: message.subject.clone(),
            body,
        }
    }
}

/// Model that triages messages and drafts replies
pub trait Analyst: Send + Sync {
    /// Analyze several messages in one call, keyed by message id.
    /// Ids the model did not answer for are simply absent.
    fn analyze_batch(&self, inputs: &[AnalysisInput]) -> Result<HashMap<String, AiAnalysis>>;

    /// Draft a reply to one message
    fn draft_reply(&self, input: &AnalysisInput) -> Result<String>;
}

/// Replace every tag with a space. An unterminated `<` swallows the rest.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match (in_tag, c) {
            (false, '<') => {
                in_tag = true;
                out.push(' ');
            }
            (true, '>') => in_tag = false,
            (true, _) => {}
            (false, c) => out.push(c),
        }
    }
    out
}

/// Analyze the latest message of every cached thread for an account and
/// save the results. With `force` unset, threads whose latest message is
/// already analyzed are skipped. Returns the number of analyses saved.
pub fn analyze_threads(
    store: &dyn MailStore,
    analyst: &dyn Analyst,
    owner_email: &str,
    force: bool,
) -> Result<usize, InboxError> {
    let messages = store
        .list_recent(owner_email, CACHED_VIEW_LIMIT)
        .map_err(InboxError::Persistence)?;

    let inputs: Vec<AnalysisInput> = group_into_threads(messages)
        .iter()
        .filter_map(|thread| thread.latest())
        .filter(|latest| force || latest.analysis.is_none())
        .map(AnalysisInput::from_message)
        .collect();

    if inputs.is_empty() {
        debug!("Nothing to analyze for {}", owner_email);
        return Ok(0);
    }

    let results = analyst
        .analyze_batch(&inputs)
        .map_err(InboxError::AnalysisFailed)?;

    let mut saved = 0;
    for input in &inputs {
        let Some(analysis) = results.get(&input.id) else {
            warn!("No analysis returned for message {}", input.id);
            continue;
        };
        store
            .save_analysis(&MessageId::new(input.id.as_str()), analysis)
            .map_err(InboxError::Persistence)?;
        saved += 1;
    }

    info!("Analyzed {} of {} threads for {}", saved, inputs.len(), owner_email);
    Ok(saved)
}

/// Draft a reply, falling back to fixed text when the model fails
pub fn draft_reply(analyst: &dyn Analyst, message: &NormalizedMessage) -> String {
    match analyst.draft_reply(&AnalysisInput::from_message(message)) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => DRAFT_EMPTY.to_string(),
        Err(e) => {
            warn!("Error generating reply for {}: {:#}", message.id, e);
            DRAFT_FAILED.to_string()
        }
    }
}
