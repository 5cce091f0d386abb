// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tagged markers and the positions callers place them at.

use std::fmt;

use super::meter::{BbtTime, MeterSection};
use super::position::{FramePos, PositionLockStyle, Positioned, SectionPosition};
use super::tempo::TempoSection;

/// Where to place a tempo marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoPosition {
    /// Locked to a frame
    Audio(FramePos),
    /// Locked to a whole-note pulse
    Music(f64),
}

impl TempoPosition {
    /// Musical position given in quarter notes
    pub fn quarter_note(qn: f64) -> Self {
        TempoPosition::Music(qn / 4.0)
    }

    pub fn lock_style(&self) -> PositionLockStyle {
        match self {
            TempoPosition::Audio(_) => PositionLockStyle::AudioTime,
            TempoPosition::Music(_) => PositionLockStyle::MusicTime,
        }
    }
}

impl fmt::Display for TempoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempoPosition::Audio(frame) => write!(f, "frame {}", frame),
            TempoPosition::Music(pulse) => write!(f, "pulse {}", pulse),
        }
    }
}

/// Where to place a meter marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterPosition {
    /// Locked to a frame
    Audio(FramePos),
    /// Locked to a bar
    Music(BbtTime),
}

impl MeterPosition {
    pub fn lock_style(&self) -> PositionLockStyle {
        match self {
            MeterPosition::Audio(_) => PositionLockStyle::AudioTime,
            MeterPosition::Music(_) => PositionLockStyle::MusicTime,
        }
    }
}

impl fmt::Display for MeterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterPosition::Audio(frame) => write!(f, "frame {}", frame),
            MeterPosition::Music(bbt) => write!(f, "bbt {}", bbt),
        }
    }
}

/// One entry of the ordered marker sequence
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSection {
    Tempo(TempoSection),
    Meter(MeterSection),
}

impl MetricSection {
    pub fn as_tempo(&self) -> Option<&TempoSection> {
        match self {
            MetricSection::Tempo(ts) => Some(ts),
            MetricSection::Meter(_) => None,
        }
    }

    pub fn as_meter(&self) -> Option<&MeterSection> {
        match self {
            MetricSection::Meter(ms) => Some(ms),
            MetricSection::Tempo(_) => None,
        }
    }

    pub fn is_tempo(&self) -> bool {
        matches!(self, MetricSection::Tempo(_))
    }

    /// Ordering used for the merged sequence: frame, then pulse, tempos first
    pub(crate) fn sort_key(&self) -> (FramePos, f64, u8) {
        let rank = if self.is_tempo() { 0 } else { 1 };
        (self.frame(), self.pulse(), rank)
    }

    /// The position a caller would supply to place this tempo again
    pub fn tempo_position(&self) -> Option<TempoPosition> {
        let ts = self.as_tempo()?;
        Some(match ts.lock_style() {
            PositionLockStyle::AudioTime => TempoPosition::Audio(ts.frame()),
            PositionLockStyle::MusicTime => TempoPosition::Music(ts.pulse()),
        })
    }

    /// The position a caller would supply to place this meter again
    pub fn meter_position(&self) -> Option<MeterPosition> {
        let ms = self.as_meter()?;
        Some(match ms.lock_style() {
            PositionLockStyle::AudioTime => MeterPosition::Audio(ms.frame()),
            PositionLockStyle::MusicTime => MeterPosition::Music(ms.bbt()),
        })
    }
}

impl Positioned for MetricSection {
    fn position(&self) -> &SectionPosition {
        match self {
            MetricSection::Tempo(ts) => ts.position(),
            MetricSection::Meter(ms) => ms.position(),
        }
    }
}

impl fmt::Display for MetricSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSection::Tempo(ts) => fmt::Display::fmt(ts, f),
            MetricSection::Meter(ms) => fmt::Display::fmt(ms, f),
        }
    }
}

impl From<TempoSection> for MetricSection {
    fn from(ts: TempoSection) -> Self {
        MetricSection::Tempo(ts)
    }
}

impl From<MeterSection> for MetricSection {
    fn from(ms: MeterSection) -> Self {
        MetricSection::Meter(ms)
    }
}
