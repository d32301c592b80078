//! Progress display module
//!
//! Handles displaying transfer progress in the CLI.

use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Transfer statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Total bytes received
    pub received: u64,
    /// Total bytes expected
    pub total: u64,
    /// Receive speed in bytes per second
    pub speed: f64,
}

impl TransferStats {
    /// Create new transfer stats
    pub fn new(received: u64, total: u64, speed: f64) -> Self {
        Self { received, total, speed }
    }

    /// Fraction received (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.received as f64 / self.total as f64
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Calculate ETA based on receive speed and remaining bytes
    pub fn calculate_eta(received: u64, total: u64, speed: f64) -> Option<Duration> {
        if speed <= 0.0 || received >= total {
            return None;
        }

        let remaining = total.saturating_sub(received) as f64;
        let eta_secs = remaining / speed;
        Some(Duration::from_secs_f64(eta_secs))
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the transfer
    start_time: Instant,
    /// Last update time
    last_update: Instant,
    /// Bytes received at the last update
    last_received: u64,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            last_received: 0,
            update_interval: Duration::from_millis(500),
            quiet,
        }
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            last_received: 0,
            update_interval: interval,
            quiet,
        }
    }

    /// Update the progress display, throttled to the update interval
    pub fn update(&mut self, received: u64, total: u64) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let elapsed = self.last_update.elapsed();
        if elapsed < self.update_interval {
            return Ok(());
        }

        let speed = received.saturating_sub(self.last_received) as f64 / elapsed.as_secs_f64();
        self.last_update = Instant::now();
        self.last_received = received;

        self.print_progress(&TransferStats::new(received, total, speed))?;
        io::stdout().flush()?;

        Ok(())
    }

    /// Print the progress bar line
    pub fn print_progress(&mut self, stats: &TransferStats) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        // Clear the current line
        print!("\r\x1b[2K");

        let progress_percent = stats.progress() * 100.0;

        let bar_width: usize = 40;
        let filled = (stats.progress() * bar_width as f64) as usize;
        let empty = bar_width.saturating_sub(filled);
        let bar: String = "=".repeat(filled) + &" ".repeat(empty);

        let eta = TransferStats::calculate_eta(stats.received, stats.total, stats.speed);
        let eta_str = eta
            .map(TransferStats::format_duration)
            .unwrap_or_else(|| "-".to_string());

        print!(
            "[{}] {:.1}% | {} / {} | {} | ETA: {}",
            bar,
            progress_percent,
            TransferStats::format_bytes(stats.received),
            TransferStats::format_bytes(stats.total),
            TransferStats::format_speed(stats.speed),
            eta_str,
        );

        Ok(())
    }

    /// Print completion message
    pub fn print_complete(&self, total: u64, destination: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        print!("\r\x1b[2K");
        io::stdout().flush()?;

        println!("Download complete: {} ({})", destination, TransferStats::format_bytes(total));
        println!("  Elapsed: {}", TransferStats::format_duration(self.start_time.elapsed()));

        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(TransferStats::format_bytes(0), "0.00 B");
        assert_eq!(TransferStats::format_bytes(1024), "1.00 KB");
        assert_eq!(TransferStats::format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(TransferStats::format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(TransferStats::format_speed(1024.0), "1.00 KB/s");
        assert_eq!(TransferStats::format_speed(1024.0 * 1024.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(TransferStats::format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_calculate_eta() {
        // Normal case
        let eta = TransferStats::calculate_eta(50, 100, 10.0);
        assert_eq!(eta, Some(Duration::from_secs(5)));

        // Already complete
        let eta = TransferStats::calculate_eta(100, 100, 10.0);
        assert_eq!(eta, None);

        // Zero speed
        let eta = TransferStats::calculate_eta(50, 100, 0.0);
        assert_eq!(eta, None);
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(TransferStats::new(0, 100, 0.0).progress(), 0.0);
        assert_eq!(TransferStats::new(50, 100, 0.0).progress(), 0.5);
        // Zero-size transfers are complete by definition
        assert_eq!(TransferStats::new(0, 0, 0.0).progress(), 1.0);
    }

    #[test]
    fn test_progress_display_new() {
        let display = ProgressDisplay::new(false);
        assert!(!display.is_quiet());
        assert_eq!(display.elapsed().as_secs(), 0);
    }

    #[test]
    fn test_progress_display_quiet() {
        let display = ProgressDisplay::new(true);
        assert!(display.is_quiet());
    }

    #[test]
    fn test_progress_display_with_interval() {
        let display = ProgressDisplay::with_interval(false, Duration::from_secs(2));
        assert!(!display.is_quiet());
    }
}
