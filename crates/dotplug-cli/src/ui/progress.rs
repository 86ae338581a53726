//! Progress Indicators and Spinners

use super::theme::Icons;
use std::time::Instant;

/// Blinking activity icon driven by wall-clock time.
#[derive(Debug, Clone)]
pub struct ProgressIndicator {
    start_time: Instant,
    icons: Icons,
}

impl ProgressIndicator {
    pub fn new(icons: Icons) -> Self {
        Self {
            start_time: Instant::now(),
            icons,
        }
    }

    /// 200ms per frame, alternating between the active and pending icons.
    pub fn current_icon(&self) -> &'static str {
        if self.frame() % 2 == 0 {
            self.icons.active
        } else {
            self.icons.pending
        }
    }

    pub fn frame(&self) -> usize {
        self.start_time.elapsed().as_millis() as usize / 200
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new(Icons::default())
    }
}

/// Human-readable byte count: `512 B`, `1.5 KiB`, `12.0 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Status text for a running download. Servers that send no length get a
/// byte counter instead of a percentage.
pub fn format_download_progress(current: u64, total: Option<u64>) -> String {
    match total.filter(|&t| t > 0) {
        Some(total) => {
            let pct = (current.min(total) * 100) / total;
            format!("fetching {pct:>3}% of {}", format_size(total))
        }
        None if current == 0 => "fetching".to_string(),
        None => format!("fetching {}", format_size(current)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_download_progress_with_length() {
        assert_eq!(format_download_progress(512, Some(1024)), "fetching  50% of 1.0 KiB");
        assert_eq!(format_download_progress(2048, Some(1024)), "fetching 100% of 1.0 KiB");
    }

    #[test]
    fn test_download_progress_without_length() {
        assert_eq!(format_download_progress(0, None), "fetching");
        assert_eq!(format_download_progress(2048, Some(0)), "fetching 2.0 KiB");
    }

    #[test]
    fn test_icon_alternates() {
        let icons = Icons::default();
        let progress = ProgressIndicator::new(icons);
        let icon = progress.current_icon();
        assert!(icon == icons.active || icon == icons.pending);
    }
}
