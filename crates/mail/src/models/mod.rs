//! Domain models for mail entities

mod analysis;
mod credential;
mod message;
mod thread;

pub use analysis::{AiAnalysis, Category, Priority, Sentiment};
pub use credential::{CredentialRecord, OAuthTokens};
pub use message::{MessageId, NormalizedMessage, NormalizedMessageBuilder};
pub use thread::{Thread, ThreadId};
