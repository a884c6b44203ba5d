//! Offline provider over a local corpus of source records.
//!
//! A corpus file is a JSON array of tagged [`Source`] records. One
//! [`CorpusProvider`] serves each provenance type present in the file.

use super::fetcher::ProviderClient;
use super::ranking::{extract_keywords, normalize_text};
use super::source::{Provenance, Source};
use crate::error::{CorpusError, ProviderError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Read a JSON corpus of tagged source records.
pub fn load_corpus(path: &Path) -> Result<Vec<Source>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| CorpusError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| CorpusError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct CorpusProvider {
    name: String,
    provenance: Provenance,
    sources: Vec<Source>,
    latency: Option<Duration>,
}

impl CorpusProvider {
    /// Provider over `sources`; records of other provenance types are dropped.
    pub fn new(name: impl Into<String>, provenance: Provenance, sources: Vec<Source>) -> Self {
        let name = name.into();
        let total = sources.len();
        let sources: Vec<Source> = sources
            .into_iter()
            .filter(|s| s.provenance() == provenance)
            .collect();
        if sources.len() < total {
            warn!(
                provider = %name,
                dropped = total - sources.len(),
                "Ignoring corpus records of another provenance"
            );
        }
        Self {
            name,
            provenance,
            sources,
            latency: None,
        }
    }

    /// One provider per provenance type present in `sources`, named
    /// `corpus:<provenance>`.
    pub fn split_by_provenance(sources: Vec<Source>) -> Vec<CorpusProvider> {
        Provenance::ALL
            .into_iter()
            .filter_map(|provenance| {
                let subset: Vec<Source> = sources
                    .iter()
                    .filter(|s| s.provenance() == provenance)
                    .cloned()
                    .collect();
                (!subset.is_empty())
                    .then(|| CorpusProvider::new(format!("corpus:{provenance}"), provenance, subset))
            })
            .collect()
    }

    /// Simulate a slow provider.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl ProviderClient for CorpusProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Provenance {
        self.provenance
    }

    async fn search(
        &self,
        query: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Source>, ProviderError> {
        if let Some(latency) = self.latency {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProviderError::Timeout {
                    provider: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(latency).await;
        }

        let keywords = extract_keywords(query);
        let matches: Vec<Source> = self
            .sources
            .iter()
            .filter(|s| {
                if keywords.is_empty() {
                    return true;
                }
                let haystack = normalize_text(&format!("{} {}", s.title(), s.text()));
                keywords.iter().any(|k| haystack.contains(k.as_str()))
            })
            .take(count)
            .cloned()
            .collect();

        debug!(
            provider = %self.name,
            requested = count,
            returned = matches.len(),
            "Corpus search"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::source::{ArticleRecord, WebRecord};
    use std::io::Write;

    fn article(title: &str) -> Source {
        Source::PeerReviewed(ArticleRecord {
            title: title.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_search_matches_keywords_in_order() {
        let provider = CorpusProvider::new(
            "corpus",
            Provenance::PeerReviewed,
            vec![
                article("Metformin and kidneys"),
                article("Insulin pumps"),
                article("Metformin dosing"),
                article("Metformin in pregnancy"),
            ],
        );
        let found = provider
            .search("metformin", 2, Duration::from_secs(1))
            .await
            .unwrap();
        let titles: Vec<&str> = found.iter().map(Source::title).collect();
        assert_eq!(titles, vec!["Metformin and kidneys", "Metformin dosing"]);
    }

    #[test]
    fn test_new_drops_other_provenance() {
        let provider = CorpusProvider::new(
            "corpus",
            Provenance::Web,
            vec![article("a"), Source::Web(WebRecord::default())],
        );
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_split_by_provenance() {
        let providers = CorpusProvider::split_by_provenance(vec![
            article("a"),
            Source::Web(WebRecord::default()),
            article("b"),
        ]);
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["corpus:peer_reviewed", "corpus:web"]);
        assert_eq!(providers[0].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_beyond_timeout() {
        let provider = CorpusProvider::new("slow", Provenance::PeerReviewed, vec![article("x")])
            .with_latency(Duration::from_secs(5));
        let err = provider
            .search("x", 1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_load_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"type": "peer_reviewed", "title": "Metformin", "doi": "10.1/x"}},
                {{"type": "web", "title": "Blog", "url": "https://example.org/post"}}]"#
        )
        .unwrap();
        let sources = load_corpus(file.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].provenance(), Provenance::Web);

        let missing = load_corpus(Path::new("/nonexistent/corpus.json")).unwrap_err();
        assert!(matches!(missing, CorpusError::FileNotFound { .. }));
    }
}
