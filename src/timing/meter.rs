// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Meters, bar/beat/tick positions and meter sections.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{Result, TempoMapError};
use super::position::{Positioned, SectionPosition};

/// Ticks in one meter beat
pub const TICKS_PER_BEAT: u32 = 1920;

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    /// Beats per bar (numerator)
    divisions_per_bar: u32,
    /// Note value of one beat (denominator, 4 = quarter)
    note_divisor: u32,
}

impl Meter {
    pub fn new(divisions_per_bar: u32, note_divisor: u32) -> Self {
        Self {
            divisions_per_bar,
            note_divisor,
        }
    }

    /// Beats per bar
    pub fn divisions_per_bar(&self) -> u32 {
        self.divisions_per_bar
    }

    /// Note value of one beat
    pub fn note_divisor(&self) -> u32 {
        self.note_divisor
    }

    /// Whole-note pulses in one bar
    pub fn pulses_per_bar(&self) -> f64 {
        self.divisions_per_bar as f64 / self.note_divisor as f64
    }

    /// Quarter notes in one meter beat
    pub fn quarter_notes_per_beat(&self) -> f64 {
        4.0 / self.note_divisor as f64
    }

    /// Reject zero numerators or denominators
    pub fn validate(&self) -> Result<()> {
        if self.divisions_per_bar == 0 || self.note_divisor == 0 {
            return Err(TempoMapError::InvalidMeter {
                divisions_per_bar: self.divisions_per_bar,
                note_divisor: self.note_divisor,
            });
        }
        Ok(())
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.divisions_per_bar, self.note_divisor)
    }
}

/// Bar, beat and tick position. Bars and beats are 1-based.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BbtTime {
    pub bars: u32,
    pub beats: u32,
    #[serde(default)]
    pub ticks: u32,
}

impl BbtTime {
    pub fn new(bars: u32, beats: u32, ticks: u32) -> Self {
        Self { bars, beats, ticks }
    }

    /// Session start, 1|1|0
    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }

    /// Whether this is the first beat of a bar with no ticks
    pub fn is_bar_start(&self) -> bool {
        self.beats == 1 && self.ticks == 0
    }

    /// The first bar start at or after this position
    pub fn next_bar_start(&self) -> Self {
        if self.is_bar_start() {
            *self
        } else {
            Self::new(self.bars + 1, 1, 0)
        }
    }
}

impl Default for BbtTime {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for BbtTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}|{:02}|{:04}", self.bars, self.beats, self.ticks)
    }
}

/// A meter change on the timeline. Always starts a bar.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSection {
    pub(crate) position: SectionPosition,
    meter: Meter,
    pub(crate) bbt: BbtTime,
    /// Meter-based beat count from session start
    pub(crate) beat: f64,
}

impl Positioned for MeterSection {
    fn position(&self) -> &SectionPosition {
        &self.position
    }
}

impl MeterSection {
    pub(crate) fn new(position: SectionPosition, meter: Meter, bbt: BbtTime) -> Self {
        Self {
            position,
            meter,
            bbt,
            beat: 0.0,
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter
    }

    pub fn divisions_per_bar(&self) -> u32 {
        self.meter.divisions_per_bar
    }

    pub fn note_divisor(&self) -> u32 {
        self.meter.note_divisor
    }

    /// Bar label this meter starts
    pub fn bbt(&self) -> BbtTime {
        self.bbt
    }

    /// Meter-based beat at which this meter starts
    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Meter-based beat at the given pulse
    pub fn beat_at_pulse(&self, pulse: f64) -> f64 {
        self.beat + (pulse - self.position.pulse) * self.meter.note_divisor as f64
    }

    /// Pulse at the given meter-based beat
    pub fn pulse_at_beat(&self, beat: f64) -> f64 {
        self.position.pulse + (beat - self.beat) / self.meter.note_divisor as f64
    }

    /// Meter-based beat at the given BBT
    pub fn beat_at_bbt(&self, bbt: &BbtTime) -> f64 {
        let dpb = self.meter.divisions_per_bar as f64;
        let bars = bbt.bars as f64 - self.bbt.bars as f64;
        let beats = bbt.beats.max(1) as f64 - 1.0;
        self.beat + bars * dpb + beats + bbt.ticks as f64 / TICKS_PER_BEAT as f64
    }

    /// BBT at the given meter-based beat; positions before this meter clamp to it
    pub fn bbt_at_beat(&self, beat: f64) -> BbtTime {
        let dpb = self.meter.divisions_per_bar;
        let offset = (beat - self.beat).max(0.0);

        // Leave room for the carry below; anything further out is the last bar
        let headroom = u32::MAX - self.bbt.bars;
        let whole_bars = (offset / dpb as f64).floor();
        if whole_bars >= headroom as f64 {
            return BbtTime::new(u32::MAX, dpb, TICKS_PER_BEAT - 1);
        }

        let mut bars = whole_bars as u32;
        let in_bar = offset - bars as f64 * dpb as f64;
        let mut beats = in_bar.floor() as u32;
        let mut ticks = ((in_bar - beats as f64) * TICKS_PER_BEAT as f64).round() as u32;

        if ticks >= TICKS_PER_BEAT {
            ticks -= TICKS_PER_BEAT;
            beats += 1;
        }
        if beats >= dpb {
            beats -= dpb;
            bars += 1;
        }

        BbtTime::new(self.bbt.bars + bars, beats + 1, ticks)
    }

    /// Pulse at the given BBT
    pub fn pulse_at_bbt(&self, bbt: &BbtTime) -> f64 {
        self.pulse_at_beat(self.beat_at_bbt(bbt))
    }

    /// BBT at the given pulse
    pub fn bbt_at_pulse(&self, pulse: f64) -> BbtTime {
        self.bbt_at_beat(self.beat_at_pulse(pulse))
    }
}

impl fmt::Display for MeterSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Meter {} {} at {} frame {} minute {:.9} pulse {:.9} beat {} ({} locked)",
            self.position.id,
            self.meter,
            self.bbt,
            self.position.frame,
            self.position.minute,
            self.position.pulse,
            self.beat,
            self.position.lock_style,
        )
    }
}
