//! Fire-and-forget progress events for research sessions.
//!
//! The orchestrator and fetcher publish [`ResearchEvent`]s to a
//! [`ProgressSink`] backed by a `tokio::sync::broadcast` channel. Sending
//! never blocks and never fails the session; events published while nobody
//! is subscribed are dropped.

use super::session::ResearchPhase;
use super::strategist::EvidenceQuality;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle events emitted during a research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResearchEvent {
    SessionStarted {
        session_id: Uuid,
        query: String,
    },
    PlanReady {
        estimated_rounds: u32,
        focus_areas: Vec<String>,
        fallback: bool,
    },
    PhaseChanged {
        phase: ResearchPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
    RoundStarted {
        round: u32,
        query: String,
        target: usize,
    },
    /// A provider call was launched.
    ApiStarted {
        round: u32,
        provider: String,
        count: usize,
    },
    /// A provider call finished, timed out, or failed.
    ApiCompleted {
        round: u32,
        provider: String,
        sources: usize,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RoundCompleted {
        round: u32,
        unique_sources: usize,
        duplicates: usize,
        duration_ms: u64,
    },
    ReflectionReady {
        round: u32,
        evidence_quality: EvidenceQuality,
        gaps: usize,
        fallback: bool,
    },
    DecisionMade {
        round: u32,
        should_stop: bool,
        reasons: Vec<String>,
    },
    QueryRefined {
        next_round: u32,
        query: String,
    },
    SessionCompleted {
        rounds: usize,
        total_unique_sources: usize,
        selected: usize,
        duration_ms: u64,
    },
}

/// Publisher half of the progress channel.
///
/// Cloning a sink shares the underlying channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<broadcast::Sender<ResearchEvent>>,
}

impl ProgressSink {
    /// A sink that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a sink plus its first receiver.
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<ResearchEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Add an independent subscriber. Returns `None` for a disabled sink.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ResearchEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn emit(&self, event: ResearchEvent) -> usize {
        match &self.tx {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sink_drops_events() {
        let sink = ProgressSink::disabled();
        assert!(!sink.is_enabled());
        assert!(sink.subscribe().is_none());
        assert_eq!(
            sink.emit(ResearchEvent::QueryRefined {
                next_round: 2,
                query: "q".into()
            }),
            0
        );
    }

    #[test]
    fn test_emit_without_receivers_does_not_fail() {
        let (sink, rx) = ProgressSink::channel(4);
        drop(rx);
        let delivered = sink.emit(ResearchEvent::RoundStarted {
            round: 1,
            query: "q".into(),
            target: 25,
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_independent_subscribers() {
        let (sink, mut rx1) = ProgressSink::channel(8);
        let mut rx2 = sink.subscribe().unwrap();
        let event = ResearchEvent::DecisionMade {
            round: 1,
            should_stop: false,
            reasons: vec![],
        };
        assert_eq!(sink.emit(event.clone()), 2);
        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[test]
    fn test_event_json_shape() {
        let event = ResearchEvent::ApiCompleted {
            round: 1,
            provider: "pubmed".into(),
            sources: 0,
            duration_ms: 3001,
            error: Some("timed out".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "api_completed");
        assert_eq!(json["provider"], "pubmed");
        assert_eq!(json["error"], "timed out");
    }
}
