// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat grid, metric snapshots and rounding to musical positions.

use std::fmt;

use super::meter::{BbtTime, Meter};
use super::metrics::Metrics;
use super::position::FramePos;
use super::tempo::Tempo;

/// Meter beats further than this past a meter's start belong to its bar
const BEAT_EPSILON: f64 = 1e-9;

/// Everything the audio side needs to know about one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoMetric {
    pub frame: FramePos,
    pub minute: f64,
    /// Whole-note pulse
    pub pulse: f64,
    /// Meter-based beat
    pub beat: f64,
    pub bbt: BbtTime,
    /// Effective tempo at this position
    pub tempo: Tempo,
    pub meter: Meter,
}

impl TempoMetric {
    pub fn quarter_note(&self) -> f64 {
        self.pulse * 4.0
    }
}

impl fmt::Display for TempoMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frame {} qn {:.6} {} {}",
            self.bbt,
            self.frame,
            self.quarter_note(),
            self.tempo,
            self.meter
        )
    }
}

/// One line of the beat grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BbtPoint {
    pub frame: FramePos,
    pub pulse: f64,
    pub beat: f64,
    pub bbt: BbtTime,
    pub tempo: Tempo,
    pub meter: Meter,
}

impl BbtPoint {
    /// Whether this point starts a bar
    pub fn is_bar(&self) -> bool {
        self.bbt.is_bar_start()
    }
}

/// Direction used when snapping to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    /// Closest line, later one on a tie
    #[default]
    Nearest,
    /// At or before the position
    Down,
    /// At or after the position
    Up,
}

impl Metrics {
    /// Tempo, meter and musical position at a frame
    pub fn metric_at(&self, frame: FramePos) -> TempoMetric {
        let minute = self.minute_at_frame(frame);
        let pulse = self.pulse_at_minute(minute);
        let beat = self.beat_at_pulse(pulse);
        TempoMetric {
            frame,
            minute,
            pulse,
            beat,
            bbt: self.bbt_at_beat(beat),
            tempo: self.tempo_at_frame(frame),
            meter: self.meter_section_at_pulse(pulse).meter(),
        }
    }

    /// The beat after `bbt`, honouring bars cut short by a following meter
    fn next_beat(&self, bbt: BbtTime) -> BbtTime {
        let ms = self.meter_section_at_bbt(&bbt);
        let mut next = BbtTime::new(bbt.bars, bbt.beats + 1, 0);
        if next.beats > ms.divisions_per_bar() {
            next = BbtTime::new(bbt.bars.saturating_add(1), 1, 0);
        }

        if let Some(following) = self.meters().iter().find(|m| m.bbt() > bbt) {
            if next >= following.bbt() || ms.beat_at_bbt(&next) > following.beat() + BEAT_EPSILON
            {
                next = following.bbt();
            }
        }
        next
    }

    fn grid_point(&self, bbt: BbtTime, frame: FramePos) -> BbtPoint {
        let ms = self.meter_section_at_bbt(&bbt);
        let beat = ms.beat_at_bbt(&bbt);
        let pulse = ms.pulse_at_beat(beat);
        BbtPoint {
            frame,
            pulse,
            beat,
            bbt,
            tempo: self.tempo_at_pulse(pulse),
            meter: ms.meter(),
        }
    }

    /// Grid lines in `[start, end)`.
    ///
    /// With `bar_mod == 0` every beat is returned, otherwise only the start of
    /// every `bar_mod`-th bar (counting from bar 1).
    pub fn grid(&self, start: FramePos, end: FramePos, bar_mod: u32) -> Vec<BbtPoint> {
        let mut points = Vec::new();
        let start = start.max(0);
        if end <= start {
            return points;
        }

        let here = self.bbt_at_frame(start);
        let mut bbt = if bar_mod == 0 {
            BbtTime::new(here.bars, here.beats, 0)
        } else {
            BbtTime::new(here.bars, 1, 0)
        };

        loop {
            let frame = self.frame_at_bbt(&bbt);
            if frame >= end {
                break;
            }
            let wanted = bar_mod == 0 || (bbt.is_bar_start() && (bbt.bars - 1) % bar_mod == 0);
            if frame >= start && wanted {
                points.push(self.grid_point(bbt, frame));
            }
            bbt = if bar_mod == 0 {
                self.next_beat(bbt)
            } else {
                BbtTime::new(bbt.bars + 1, 1, 0)
            };
        }
        points
    }

    fn pick(&self, frame: FramePos, down: FramePos, up: FramePos, mode: RoundMode) -> FramePos {
        match mode {
            RoundMode::Down => down,
            RoundMode::Up => up,
            RoundMode::Nearest => {
                if frame - down < up - frame {
                    down
                } else {
                    up
                }
            }
        }
    }

    /// The beat line at or before a frame, found from the unrounded beat
    fn beat_line_at_or_before(&self, frame: FramePos) -> BbtTime {
        let beat = self.beat_at_frame(frame).max(0.0);
        let ms = self.meter_section_at_beat(beat);
        let whole = (beat - ms.beat()).floor();
        let bbt = ms.bbt_at_beat(ms.beat() + whole);
        BbtTime::new(bbt.bars, bbt.beats, 0)
    }

    /// Snap a frame to a beat
    pub fn round_to_beat(&self, frame: FramePos, mode: RoundMode) -> FramePos {
        let line = self.beat_line_at_or_before(frame);
        let down = self.frame_at_bbt(&line);
        if down == frame {
            return frame;
        }
        let up = self.frame_at_bbt(&self.next_beat(line));
        if up <= frame {
            return up;
        }
        self.pick(frame, down.min(frame), up, mode)
    }

    /// Snap a frame to a bar line
    pub fn round_to_bar(&self, frame: FramePos, mode: RoundMode) -> FramePos {
        let bars = self.beat_line_at_or_before(frame).bars;
        let down = self.frame_at_bbt(&BbtTime::new(bars, 1, 0));
        if down == frame {
            return frame;
        }
        let up = self.frame_at_bbt(&BbtTime::new(bars.saturating_add(1), 1, 0));
        if up <= frame {
            return up;
        }
        self.pick(frame, down.min(frame), up, mode)
    }
}
