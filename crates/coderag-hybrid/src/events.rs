//! Streamed answer events for generation front-ends: tokens as they are
//! produced, then the retrieval outcome that grounded them.
use futures::stream::{self, Stream, StreamExt};

use crate::pipeline::RetrievalOutcome;

#[derive(Debug, Clone)]
pub enum AnswerEvent {
    Token(String),
    Completed(RetrievalOutcome),
}

impl AnswerEvent {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// `tokens` as `Token` events followed by exactly one `Completed`.
pub fn answer_events<S>(tokens: S, outcome: RetrievalOutcome) -> impl Stream<Item = AnswerEvent>
where
    S: Stream<Item = String>,
{
    tokens.map(AnswerEvent::Token).chain(stream::once(async move { AnswerEvent::Completed(outcome) }))
}
