//! Point-in-time statistics for an image loader instance.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Represents all stats for an image loader at a single point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Maximum memory cache size in bytes.
    pub max_size: u64,
    /// Current memory cache size in bytes.
    pub size: u64,
    /// Memory cache hits.
    pub cache_hits: u64,
    /// Memory cache misses.
    pub cache_misses: u64,
    /// Total bytes downloaded from the network.
    pub total_download_size: u64,
    /// Total bytes of decoded images.
    pub total_original_bitmap_size: u64,
    /// Total bytes of transformed images.
    pub total_transformed_bitmap_size: u64,
    /// Average bytes per download.
    pub average_download_size: u64,
    /// Average bytes per decoded image.
    pub average_original_bitmap_size: u64,
    /// Average bytes per transformed image.
    pub average_transformed_bitmap_size: u64,
    /// Number of network downloads.
    pub download_count: u64,
    /// Number of decoded images.
    pub original_bitmap_count: u64,
    /// Number of transformed images.
    pub transformed_bitmap_count: u64,
    /// Milliseconds since the Unix epoch when the snapshot was taken.
    pub time_stamp: i64,
}

impl StatsSnapshot {
    /// Percentage of the memory cache in use, rounded up.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percent_full(&self) -> u64 {
        if self.max_size == 0 {
            return 0;
        }
        ((self.size as f64 / self.max_size as f64) * 100.0).ceil() as u64
    }

    /// Writes the multi-line report to `writer`.
    ///
    /// # Errors
    /// Returns any error raised by the writer.
    pub fn dump<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "===============BEGIN PICASSO STATS ===============")?;
        writeln!(writer, "Memory Cache Stats")?;
        writeln!(writer, "  Max Cache Size: {}", self.max_size)?;
        writeln!(writer, "  Cache Size: {}", self.size)?;
        writeln!(writer, "  Cache % Full: {}", self.percent_full())?;
        writeln!(writer, "  Cache Hits: {}", self.cache_hits)?;
        writeln!(writer, "  Cache Misses: {}", self.cache_misses)?;
        writeln!(writer, "Network Stats")?;
        writeln!(writer, "  Download Count: {}", self.download_count)?;
        writeln!(writer, "  Total Download Size: {}", self.total_download_size)?;
        writeln!(writer, "  Average Download Size: {}", self.average_download_size)?;
        writeln!(writer, "Bitmap Stats")?;
        writeln!(writer, "  Total Bitmaps Decoded: {}", self.original_bitmap_count)?;
        writeln!(writer, "  Total Bitmap Size: {}", self.total_original_bitmap_size)?;
        writeln!(
            writer,
            "  Total Transformed Bitmaps: {}",
            self.transformed_bitmap_count
        )?;
        writeln!(
            writer,
            "  Total Transformed Bitmap Size: {}",
            self.total_transformed_bitmap_size
        )?;
        writeln!(
            writer,
            "  Average Bitmap Size: {}",
            self.average_original_bitmap_size
        )?;
        writeln!(
            writer,
            "  Average Transformed Bitmap Size: {}",
            self.average_transformed_bitmap_size
        )?;
        writeln!(writer, "===============END PICASSO STATS ===============")?;
        writer.flush()
    }

    /// Renders the report into a string.
    #[must_use]
    pub fn dump_to_string(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.dump(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StatsSnapshot{{maxSize={}, size={}, cacheHits={}, cacheMisses={}, downloadCount={}, \
             totalDownloadSize={}, averageDownloadSize={}, totalOriginalBitmapSize={}, \
             totalTransformedBitmapSize={}, averageOriginalBitmapSize={}, \
             averageTransformedBitmapSize={}, originalBitmapCount={}, transformedBitmapCount={}, \
             timeStamp={}}}",
            self.max_size,
            self.size,
            self.cache_hits,
            self.cache_misses,
            self.download_count,
            self.total_download_size,
            self.average_download_size,
            self.total_original_bitmap_size,
            self.total_transformed_bitmap_size,
            self.average_original_bitmap_size,
            self.average_transformed_bitmap_size,
            self.original_bitmap_count,
            self.transformed_bitmap_count,
            self.time_stamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StatsSnapshot {
        StatsSnapshot {
            max_size: 1000,
            size: 333,
            cache_hits: 4,
            cache_misses: 2,
            total_download_size: 300,
            total_original_bitmap_size: 800,
            total_transformed_bitmap_size: 200,
            average_download_size: 100,
            average_original_bitmap_size: 400,
            average_transformed_bitmap_size: 200,
            download_count: 3,
            original_bitmap_count: 2,
            transformed_bitmap_count: 1,
            time_stamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_percent_full_rounds_up() {
        assert_eq!(snapshot().percent_full(), 34);
        let empty = StatsSnapshot {
            max_size: 0,
            ..snapshot()
        };
        assert_eq!(empty.percent_full(), 0);
    }

    #[test]
    fn test_dump_contains_sections() {
        let report = snapshot().dump_to_string();
        assert!(report.starts_with("===============BEGIN PICASSO STATS"));
        assert!(report.contains("  Cache % Full: 34\n"));
        assert!(report.contains("  Download Count: 3\n"));
        assert!(report.contains("  Average Transformed Bitmap Size: 200\n"));
        assert!(report.trim_end().ends_with("END PICASSO STATS ==============="));
    }

    #[test]
    fn test_display_is_single_line() {
        let line = snapshot().to_string();
        assert!(line.starts_with("StatsSnapshot{maxSize=1000, size=333"));
        assert!(!line.contains('\n'));
        assert!(line.ends_with("timeStamp=1700000000000}"));
    }
}
