//! Heterogeneous source records and their shared identity.
//!
//! Every provider returns one of four provenance-specific record shapes.
//! [`Source`] is the tagged union over them; [`Source::identifier`] derives a
//! [`SourceIdentifier`] in one namespace shared by all provenance types, so
//! an article and a web page carrying the same DOI are the same logical source.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use url::Url;

static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(10\.\d{4,9}/[^\s?#&"'<>]+)"#).expect("DOI pattern is valid")
});

/// Category of an external data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Peer-reviewed journal article (PubMed, Crossref, ...).
    PeerReviewed,
    /// Preprint server record (medRxiv, bioRxiv, arXiv).
    Preprint,
    /// Clinical-trial registration.
    ClinicalTrial,
    /// General web document.
    Web,
}

impl Provenance {
    /// All provenance types in fetch order.
    pub const ALL: [Provenance; 4] = [
        Provenance::PeerReviewed,
        Provenance::Preprint,
        Provenance::ClinicalTrial,
        Provenance::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::PeerReviewed => "peer_reviewed",
            Provenance::Preprint => "preprint",
            Provenance::ClinicalTrial => "clinical_trial",
            Provenance::Web => "web",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer-reviewed journal article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// PubMed identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// A preprint server record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprintRecord {
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Hosting server, e.g. `medrxiv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// A clinical-trial registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Registration or study start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    /// Registry identifier, e.g. `NCT01234567`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nct_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// A general web document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebRecord {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: String,
}

/// A source record from any provider, tagged by provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    PeerReviewed(ArticleRecord),
    Preprint(PreprintRecord),
    ClinicalTrial(TrialRecord),
    Web(WebRecord),
}

impl Source {
    pub fn provenance(&self) -> Provenance {
        match self {
            Source::PeerReviewed(_) => Provenance::PeerReviewed,
            Source::Preprint(_) => Provenance::Preprint,
            Source::ClinicalTrial(_) => Provenance::ClinicalTrial,
            Source::Web(_) => Provenance::Web,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Source::PeerReviewed(r) => &r.title,
            Source::Preprint(r) => &r.title,
            Source::ClinicalTrial(r) => &r.title,
            Source::Web(r) => &r.title,
        }
    }

    /// Abstract, trial summary, or web snippet.
    pub fn text(&self) -> &str {
        match self {
            Source::PeerReviewed(r) => &r.abstract_text,
            Source::Preprint(r) => &r.abstract_text,
            Source::ClinicalTrial(r) => &r.summary,
            Source::Web(r) => &r.snippet,
        }
    }

    pub fn published(&self) -> Option<NaiveDate> {
        match self {
            Source::PeerReviewed(r) => r.published,
            Source::Preprint(r) => r.published,
            Source::ClinicalTrial(r) => r.published,
            Source::Web(r) => r.published,
        }
    }

    pub fn publish_year(&self) -> Option<i32> {
        self.published().map(|d| d.year())
    }

    /// First author, trial sponsor, or site name.
    pub fn author(&self) -> Option<&str> {
        match self {
            Source::PeerReviewed(r) => r.authors.first().map(String::as_str),
            Source::Preprint(r) => r.authors.first().map(String::as_str),
            Source::ClinicalTrial(r) => r.sponsor.as_deref(),
            Source::Web(r) => r.site_name.as_deref(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Source::PeerReviewed(r) => &r.url,
            Source::Preprint(r) => &r.url,
            Source::ClinicalTrial(r) => &r.url,
            Source::Web(r) => &r.url,
        }
    }

    /// Normalized DOI, either declared on the record or embedded in its URL.
    pub fn doi(&self) -> Option<String> {
        let declared = match self {
            Source::PeerReviewed(r) => r.doi.as_deref(),
            Source::Preprint(r) => r.doi.as_deref(),
            Source::ClinicalTrial(r) => r.doi.as_deref(),
            Source::Web(r) => r.doi.as_deref(),
        };
        declared
            .and_then(normalize_doi)
            .or_else(|| doi_from_url(self.url()))
    }

    /// Provider-specific identifier (PubMed ID or trial registry ID).
    pub fn provider_id(&self) -> Option<String> {
        match self {
            Source::PeerReviewed(r) => r
                .pmid
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| format!("pmid:{id}")),
            Source::ClinicalTrial(r) => r
                .nct_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| format!("nct:{}", id.to_uppercase())),
            Source::Preprint(_) | Source::Web(_) => None,
        }
    }

    /// Derive the shared identity of this source.
    ///
    /// Priority: DOI, then provider-specific ID, then normalized URL.
    /// Returns `None` when nothing usable exists; such sources are never
    /// deduplicated.
    pub fn identifier(&self) -> Option<SourceIdentifier> {
        if let Some(doi) = self.doi() {
            return Some(SourceIdentifier::new(IdentifierKind::Doi, doi));
        }
        if let Some(id) = self.provider_id() {
            return Some(SourceIdentifier::new(IdentifierKind::ProviderId, id));
        }
        normalize_url(self.url()).map(|u| SourceIdentifier::new(IdentifierKind::Url, u))
    }

    /// Uniform view over the provenance-specific fields.
    pub fn normalize(&self) -> NormalizedSource {
        NormalizedSource {
            provenance: self.provenance(),
            title: self.title().to_string(),
            text: self.text().to_string(),
            identifier: self.identifier(),
            published: self.published(),
            author: self.author().map(str::to_string),
            url: self.url().to_string(),
        }
    }
}

/// Provenance-independent projection of a [`Source`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSource {
    pub provenance: Provenance,
    pub title: String,
    pub text: String,
    pub identifier: Option<SourceIdentifier>,
    pub published: Option<NaiveDate>,
    pub author: Option<String>,
    pub url: String,
}

/// Which rule produced a [`SourceIdentifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Doi,
    ProviderId,
    Url,
}

/// Identity of a logical source, shared across provenance types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl SourceIdentifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for SourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdentifierKind::Doi => write!(f, "doi:{}", self.value),
            IdentifierKind::ProviderId | IdentifierKind::Url => f.write_str(&self.value),
        }
    }
}

/// Normalize a DOI: lowercase, resolver prefixes and trailing punctuation
/// or slashes stripped.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let mut doi = lower.as_str();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim_start();
            break;
        }
    }
    let doi = doi.trim_end_matches(['.', ',', ';', ')', ']', '/']);
    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi.to_string())
    } else {
        None
    }
}

fn doi_from_url(url: &str) -> Option<String> {
    let decoded = url.replace("%2F", "/").replace("%2f", "/");
    DOI_PATTERN
        .captures(&decoded)
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize_doi(m.as_str()))
}

/// Normalize a URL to `scheme://host/path`: `www.` dropped from the host,
/// query, fragment, and trailing slash stripped.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    let host = url.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let path = url.path().trim_end_matches('/');
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    Some(format!("{}://{host}{port}{path}", url.scheme()))
}
