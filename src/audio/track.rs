use chrono::{DateTime, Utc};

use crate::sources::{QueryKind, TrackMetadata};

/// One queued item: the query as the user typed it plus, once known, what it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub source_query: String,
    pub resolved: Option<TrackMetadata>,
    pub is_search_term: bool,
    pub added_at: DateTime<Utc>,
}

impl Track {
    /// Track that still has to go through the resolver.
    pub fn pending(query: impl Into<String>) -> Self {
        let source_query = query.into().trim().to_string();
        let is_search_term = QueryKind::of(&source_query).is_search_term();

        Self {
            source_query,
            resolved: None,
            is_search_term,
            added_at: Utc::now(),
        }
    }

    pub fn with_resolved(mut self, metadata: TrackMetadata) -> Self {
        self.resolved = Some(metadata);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Resolved title, or the raw query while unresolved
    pub fn title(&self) -> &str {
        self.resolved
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or(&self.source_query)
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.resolved.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_tracks_classify_their_query() {
        let search = Track::pending("  daft punk  ");
        assert_eq!(search.source_query, "daft punk");
        assert!(search.is_search_term);
        assert!(!search.is_resolved());
        assert_eq!(search.title(), "daft punk");

        let link = Track::pending("https://youtu.be/dQw4w9WgXcQ");
        assert!(!link.is_search_term);
    }

    #[test]
    fn resolved_title_wins() {
        let track = Track::pending("daft punk").with_resolved(TrackMetadata::new(
            "https://cdn/a",
            "Around the World",
            "https://yt/a",
        ));
        assert!(track.is_resolved());
        assert_eq!(track.title(), "Around the World");
    }
}
