//! Whole-percent progress derived from decoded presentation time.

/// Turns presentation timestamps into monotonically increasing percentages.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    duration_us: Option<i64>,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    pub fn new(duration_us: Option<i64>) -> Self {
        Self {
            duration_us: duration_us.filter(|d| *d > 0),
            last_percent: None,
        }
    }

    /// Returns the new percentage when `presentation_time_us` moves progress
    /// past a whole percent not yet reported. Unknown durations never report.
    pub fn update(&mut self, presentation_time_us: i64) -> Option<u8> {
        let duration = self.duration_us?;
        let clamped = presentation_time_us.clamp(0, duration);
        let percent = ((clamped as i128 * 100) / duration as i128) as u8;

        if self.last_percent.map_or(true, |last| percent > last) {
            self.last_percent = Some(percent);
            Some(percent)
        } else {
            None
        }
    }

    /// Reports 100 unless it has already been reported.
    pub fn finish(&mut self) -> Option<u8> {
        self.duration_us?;
        if self.last_percent == Some(100) {
            return None;
        }
        self.last_percent = Some(100);
        Some(100)
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }
}
