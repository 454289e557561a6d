//! Index statistics for monitoring and the CLI.

/// Per-source record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub entries: u64,
    pub invalid_entries: u64,
    pub total_bytes: u64,
}

/// Aggregate view of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of records
    pub entries: u64,
    /// Records with `byte_size == 0`
    pub invalid_entries: u64,
    /// Sum of `byte_size`
    pub total_bytes: u64,
    /// Breakdown by source, ordered by source id
    pub sources: Vec<SourceSummary>,
}

impl IndexStats {
    /// Build totals from per-source summaries.
    pub fn from_sources(sources: Vec<SourceSummary>) -> Self {
        let mut stats = Self::default();
        for summary in &sources {
            stats.entries += summary.entries;
            stats.invalid_entries += summary.invalid_entries;
            stats.total_bytes += summary.total_bytes;
        }
        stats.sources = sources;
        stats
    }

    /// Records that point at a real file.
    pub fn valid_entries(&self) -> u64 {
        self.entries - self.invalid_entries
    }

    /// Fraction of `max_size_bytes` in use (may exceed 1.0).
    pub fn utilization(&self, max_size_bytes: u64) -> f64 {
        if max_size_bytes == 0 {
            0.0
        } else {
            self.total_bytes as f64 / max_size_bytes as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(source: &str, entries: u64, invalid: u64, bytes: u64) -> SourceSummary {
        SourceSummary {
            source: source.to_string(),
            entries,
            invalid_entries: invalid,
            total_bytes: bytes,
        }
    }

    #[test]
    fn test_from_sources_totals() {
        let stats = IndexStats::from_sources(vec![
            summary("bing", 3, 1, 2000),
            summary("osm", 5, 0, 8000),
        ]);

        assert_eq!(stats.entries, 8);
        assert_eq!(stats.invalid_entries, 1);
        assert_eq!(stats.valid_entries(), 7);
        assert_eq!(stats.total_bytes, 10_000);
        assert_eq!(stats.sources.len(), 2);
    }

    #[test]
    fn test_empty_stats() {
        let stats = IndexStats::from_sources(Vec::new());
        assert_eq!(stats, IndexStats::default());
        assert_eq!(stats.utilization(1000), 0.0);
    }

    #[test]
    fn test_utilization() {
        let stats = IndexStats::from_sources(vec![summary("osm", 1, 0, 500)]);
        assert_eq!(stats.utilization(1000), 0.5);
        assert_eq!(stats.utilization(0), 0.0);
    }
}
