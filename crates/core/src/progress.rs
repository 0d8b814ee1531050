//! Stage-partitioned progress for one pipeline run.

/// Stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    VideoGeneration,
    MusicGeneration,
    Narration,
    Composition,
    Assembly,
    Finalize,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        Self::VideoGeneration,
        Self::MusicGeneration,
        Self::Narration,
        Self::Composition,
        Self::Assembly,
        Self::Finalize,
    ];

    /// `[start, end)` percentage band owned by this stage.
    pub fn band(self) -> (u8, u8) {
        match self {
            Self::VideoGeneration => (0, 25),
            Self::MusicGeneration => (25, 40),
            Self::Narration => (40, 50),
            Self::Composition => (50, 75),
            Self::Assembly => (75, 90),
            Self::Finalize => (90, 100),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::VideoGeneration => "video_generation",
            Self::MusicGeneration => "music_generation",
            Self::Narration => "narration",
            Self::Composition => "composition",
            Self::Assembly => "assembly",
            Self::Finalize => "finalize",
        }
    }

    pub fn start(self) -> u8 {
        self.band().0
    }

    pub fn end(self) -> u8 {
        self.band().1
    }

    /// Overall percentage for `fraction` (clamped to `0..=1`) of this stage.
    pub fn percent_at(self, fraction: f64) -> u8 {
        let (start, end) = self.band();
        let f = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(end - start);
        start + (span * f).floor() as u8
    }
}

/// Progress value that never decreases.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonotonicProgress {
    current: u8,
}

impl MonotonicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Raise to `percent` if higher. Returns the new value when it changed.
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        if percent > self.current {
            self.current = percent;
            Some(percent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_are_contiguous_and_cover_everything() {
        let mut expected_start = 0;
        for stage in PipelineStage::ALL {
            assert_eq!(stage.start(), expected_start);
            assert!(stage.end() > stage.start());
            expected_start = stage.end();
        }
        assert_eq!(expected_start, 100);
    }

    #[test]
    fn percent_at_interpolates_within_band() {
        assert_eq!(PipelineStage::VideoGeneration.percent_at(0.0), 0);
        assert_eq!(PipelineStage::VideoGeneration.percent_at(0.5), 12);
        assert_eq!(PipelineStage::MusicGeneration.percent_at(1.0), 40);
        assert_eq!(PipelineStage::Composition.percent_at(2.0), 75);
        assert_eq!(PipelineStage::Narration.percent_at(f64::NAN), 40);
    }

    #[test]
    fn progress_never_goes_back() {
        let mut p = MonotonicProgress::new();
        assert_eq!(p.advance(30), Some(30));
        assert_eq!(p.advance(20), None);
        assert_eq!(p.current(), 30);
        assert_eq!(p.advance(250), Some(100));
    }
}
