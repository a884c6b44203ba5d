//! Cross-round source deduplication.
//!
//! The deduplicator is session-scoped: it remembers every identifier it has
//! admitted and filters later batches against that set. It is mutated only
//! by the orchestrator between rounds, never from provider tasks.

use super::source::{Source, SourceIdentifier};
use std::collections::HashSet;
use tracing::debug;

/// Result of filtering one batch of sources.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Sources not seen before, in input order.
    pub unique: Vec<Source>,
    /// Number of inputs dropped as duplicates.
    pub duplicate_count: usize,
    /// Number of unique inputs that had no extractable identifier.
    pub unidentified_count: usize,
}

/// Stateful filter over a shared identifier namespace.
#[derive(Debug, Default)]
pub struct SourceDeduplicator {
    seen: HashSet<SourceIdentifier>,
    duplicates_filtered: usize,
}

impl SourceDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a batch against everything seen so far, recording new identifiers.
    ///
    /// Duplicates inside the batch are collapsed as well. Sources without an
    /// identifier always pass.
    pub fn filter(&mut self, sources: Vec<Source>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();

        for source in sources {
            match source.identifier() {
                Some(id) => {
                    if self.seen.insert(id) {
                        outcome.unique.push(source);
                    } else {
                        outcome.duplicate_count += 1;
                    }
                }
                None => {
                    debug!(title = source.title(), "Source has no identifier, keeping");
                    outcome.unidentified_count += 1;
                    outcome.unique.push(source);
                }
            }
        }

        self.duplicates_filtered += outcome.duplicate_count;
        outcome
    }

    /// Whether a source's identity has already been admitted.
    pub fn contains(&self, source: &Source) -> bool {
        source
            .identifier()
            .is_some_and(|id| self.seen.contains(&id))
    }

    /// Number of distinct identifiers admitted this session.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Total duplicates dropped across all batches.
    pub fn duplicates_filtered(&self) -> usize {
        self.duplicates_filtered
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &SourceIdentifier> {
        self.seen.iter()
    }
}
