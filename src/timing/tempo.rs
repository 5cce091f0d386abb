// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo values and tempo sections.
//!
//! A ramped section varies its tempo linearly in pulses between its own tempo
//! `T0` and the tempo `T1` of the following section. With the function
//! constant `c` (per minute), measured in note types:
//!
//! ```text
//! T(p) = T0 + c * nt * (p - p0)             tempo at pulse
//! m(p) = m0 + ln(1 + c * nt * (p - p0) / T0) / c
//! p(m) = p0 + (e^(c * (m - m0)) - 1) * (T0 / c) / nt
//! T(m) = T0 * e^(c * (m - m0))
//! m(T) = m0 + ln(T / T0) / c
//! ```
//!
//! Tempo to pulse and tempo to minute are one step away from the curve, so
//! they are solved directly. Pulse to minute goes through the logarithm and
//! its inverse and carries roughly 1e-14 of error.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{Result, TempoMapError};
use super::position::{frame_at_minute, minute_at_frame, FramePos, Positioned, SectionPosition};

/// Ramps whose end tempo is this close to their start tempo use constant math
pub const RAMP_EPSILON: f64 = 1e-9;

fn default_note_type() -> f64 {
    4.0
}

/// A tempo: how many note types per minute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    /// Beats per minute, counted in `note_type` notes
    #[serde(rename = "bpm")]
    note_types_per_minute: f64,
    /// Note division one beat refers to (4 = quarter, 8 = eighth)
    #[serde(default = "default_note_type")]
    note_type: f64,
}

impl Tempo {
    /// Tempo counted in quarter notes
    pub fn new(bpm: f64) -> Self {
        Self::with_note_type(bpm, 4.0)
    }

    /// Tempo counted in an arbitrary note type
    pub fn with_note_type(bpm: f64, note_type: f64) -> Self {
        Self {
            note_types_per_minute: bpm,
            note_type,
        }
    }

    /// Beats per minute in this tempo's note type
    pub fn note_types_per_minute(&self) -> f64 {
        self.note_types_per_minute
    }

    /// Alias of [`Tempo::note_types_per_minute`]
    pub fn beats_per_minute(&self) -> f64 {
        self.note_types_per_minute
    }

    /// The note type one beat refers to
    pub fn note_type(&self) -> f64 {
        self.note_type
    }

    /// Whole notes per minute
    pub fn pulses_per_minute(&self) -> f64 {
        self.note_types_per_minute / self.note_type
    }

    /// Quarter notes per minute
    pub fn quarter_notes_per_minute(&self) -> f64 {
        (self.note_types_per_minute * 4.0) / self.note_type
    }

    /// Frames per beat at the given sample rate
    pub fn frames_per_note_type(&self, sample_rate: u32) -> f64 {
        (60.0 * sample_rate as f64) / self.note_types_per_minute
    }

    /// Frames per quarter note at the given sample rate
    pub fn frames_per_quarter_note(&self, sample_rate: u32) -> f64 {
        (60.0 * sample_rate as f64) / self.quarter_notes_per_minute()
    }

    /// Check that both fields are finite and positive
    pub fn validate(&self) -> Result<()> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(self.note_types_per_minute) && valid(self.note_type) {
            Ok(())
        } else {
            Err(TempoMapError::InvalidTempo {
                bpm: self.note_types_per_minute,
                note_type: self.note_type,
            })
        }
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm (1/{})", self.note_types_per_minute, self.note_type)
    }
}

/// How a section's tempo behaves up to the next tempo section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoKind {
    /// Tempo is fixed until the next section
    #[default]
    Constant,
    /// Tempo moves linearly (in pulses) toward the next section's tempo
    Ramp,
}

/// Where a section's span ends, cached by recomputation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanEnd {
    /// Effective tempo at the end of the span
    pub note_types_per_minute: f64,
    /// Pulse of the following tempo section
    pub pulse: f64,
    /// Minute of the following tempo section
    pub minute: f64,
}

/// A tempo change on the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TempoSection {
    pub(crate) position: SectionPosition,
    tempo: Tempo,
    kind: TempoKind,
    /// Ramp function constant per minute; zero whenever constant math applies
    c: f64,
    end: Option<SpanEnd>,
}

impl Positioned for TempoSection {
    fn position(&self) -> &SectionPosition {
        &self.position
    }
}

impl TempoSection {
    pub(crate) fn new(position: SectionPosition, tempo: Tempo, kind: TempoKind) -> Self {
        Self {
            position,
            tempo,
            kind,
            c: 0.0,
            end: None,
        }
    }

    /// The tempo at the start of this section
    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Constant or ramped
    pub fn kind(&self) -> TempoKind {
        self.kind
    }

    /// Beats per minute at the start of this section
    pub fn note_types_per_minute(&self) -> f64 {
        self.tempo.note_types_per_minute
    }

    /// Alias of [`TempoSection::note_types_per_minute`]
    pub fn beats_per_minute(&self) -> f64 {
        self.tempo.note_types_per_minute
    }

    /// Note type of this section's tempo
    pub fn note_type(&self) -> f64 {
        self.tempo.note_type
    }

    /// Whole notes per minute at the start of this section
    pub fn pulses_per_minute(&self) -> f64 {
        self.tempo.pulses_per_minute()
    }

    /// Tempo reached at the end of this section's span
    pub fn end_note_types_per_minute(&self) -> f64 {
        self.end
            .map(|end| end.note_types_per_minute)
            .unwrap_or(self.tempo.note_types_per_minute)
    }

    /// Span end, absent for the last tempo section
    pub fn span_end(&self) -> Option<SpanEnd> {
        self.end
    }

    /// Ramp function constant, zero for constant math
    pub fn ramp_constant(&self) -> f64 {
        self.c
    }

    /// Whether ramp math applies inside this section's span
    pub fn is_ramped(&self) -> bool {
        self.c != 0.0 && self.end.is_some()
    }

    fn ramp_end(&self) -> Option<&SpanEnd> {
        if self.c != 0.0 {
            self.end.as_ref()
        } else {
            None
        }
    }

    fn wants_ramp(&self, end_npm: f64) -> bool {
        self.kind == TempoKind::Ramp
            && (end_npm - self.tempo.note_types_per_minute).abs() > RAMP_EPSILON
    }

    /// Fix this section's span from a successor whose minute is known
    pub(crate) fn set_end_at_minute(&mut self, end_npm: f64, end_minute: f64) -> SpanEnd {
        let dm = end_minute - self.position.minute;
        let t0 = self.tempo.note_types_per_minute;
        let end = if self.wants_ramp(end_npm) {
            self.c = (end_npm / t0).ln() / dm;
            SpanEnd {
                note_types_per_minute: end_npm,
                pulse: self.position.pulse + (end_npm - t0) / (self.c * self.tempo.note_type),
                minute: end_minute,
            }
        } else {
            self.c = 0.0;
            SpanEnd {
                note_types_per_minute: t0,
                pulse: self.position.pulse + dm * self.pulses_per_minute(),
                minute: end_minute,
            }
        };
        self.end = Some(end);
        end
    }

    /// Fix this section's span from a successor whose pulse is known
    pub(crate) fn set_end_at_pulse(&mut self, end_npm: f64, end_pulse: f64) -> SpanEnd {
        let dp = end_pulse - self.position.pulse;
        let t0 = self.tempo.note_types_per_minute;
        let end = if self.wants_ramp(end_npm) {
            self.c = (end_npm - t0) / (dp * self.tempo.note_type);
            SpanEnd {
                note_types_per_minute: end_npm,
                pulse: end_pulse,
                minute: self.position.minute + self.ramp_minute_offset(dp),
            }
        } else {
            self.c = 0.0;
            SpanEnd {
                note_types_per_minute: t0,
                pulse: end_pulse,
                minute: self.position.minute + dp / self.pulses_per_minute(),
            }
        };
        self.end = Some(end);
        end
    }

    /// Mark this section as the last one: constant to infinity
    pub(crate) fn clear_end(&mut self) {
        self.c = 0.0;
        self.end = None;
    }

    fn ramp_minute_offset(&self, dp: f64) -> f64 {
        ((self.c * dp * self.tempo.note_type) / self.tempo.note_types_per_minute).ln_1p() / self.c
    }

    fn ramp_pulse_offset(&self, dm: f64) -> f64 {
        ((self.c * dm).exp_m1() * (self.tempo.note_types_per_minute / self.c)) / self.tempo.note_type
    }

    /// Tempo (in this section's note type) at the given pulse
    pub fn tempo_at_pulse(&self, pulse: f64) -> f64 {
        let t0 = self.tempo.note_types_per_minute;
        match self.ramp_end() {
            Some(end) if pulse >= self.position.pulse => {
                let fraction = (pulse - self.position.pulse) / (end.pulse - self.position.pulse);
                t0 + (end.note_types_per_minute - t0) * fraction
            }
            _ => t0,
        }
    }

    /// Pulse at which the given tempo occurs.
    ///
    /// For constant sections every pulse has the same tempo, so the pulse at
    /// `minute` is returned instead.
    pub fn pulse_at_tempo(&self, npm: f64, minute: f64) -> f64 {
        match self.ramp_end() {
            Some(end) => {
                let t0 = self.tempo.note_types_per_minute;
                let fraction = (npm - t0) / (end.note_types_per_minute - t0);
                self.position.pulse + fraction * (end.pulse - self.position.pulse)
            }
            None => ((minute - self.position.minute) * self.pulses_per_minute()) + self.position.pulse,
        }
    }

    /// Tempo (in this section's note type) at the given minute
    pub fn tempo_at_minute(&self, minute: f64) -> f64 {
        let t0 = self.tempo.note_types_per_minute;
        if self.is_ramped() && minute >= self.position.minute {
            (self.c * (minute - self.position.minute)).exp() * t0
        } else {
            t0
        }
    }

    /// Minute at which the given tempo occurs.
    ///
    /// For constant sections the minute at `pulse` is returned instead.
    pub fn minute_at_tempo(&self, npm: f64, pulse: f64) -> f64 {
        if self.is_ramped() {
            (npm / self.tempo.note_types_per_minute).ln() / self.c + self.position.minute
        } else {
            ((pulse - self.position.pulse) / self.pulses_per_minute()) + self.position.minute
        }
    }

    /// Minute at the given pulse, treating this section as governing
    pub fn minute_at_pulse(&self, pulse: f64) -> f64 {
        if self.is_ramped() && pulse >= self.position.pulse {
            self.ramp_minute_offset(pulse - self.position.pulse) + self.position.minute
        } else {
            ((pulse - self.position.pulse) / self.pulses_per_minute()) + self.position.minute
        }
    }

    /// Pulse at the given minute, treating this section as governing
    pub fn pulse_at_minute(&self, minute: f64) -> f64 {
        if self.is_ramped() && minute >= self.position.minute {
            self.ramp_pulse_offset(minute - self.position.minute) + self.position.pulse
        } else {
            ((minute - self.position.minute) * self.pulses_per_minute()) + self.position.pulse
        }
    }

    /// Minute at the given frame
    pub fn minute_at_frame(&self, frame: FramePos) -> f64 {
        minute_at_frame(frame, self.position.sample_rate)
    }

    /// Frame at the given minute
    pub fn frame_at_minute(&self, minute: f64) -> FramePos {
        frame_at_minute(minute, self.position.sample_rate)
    }

    /// Frame at the given pulse, treating this section as governing
    pub fn frame_at_pulse(&self, pulse: f64) -> FramePos {
        self.frame_at_minute(self.minute_at_pulse(pulse))
    }

    /// Pulse at the given frame, treating this section as governing
    pub fn pulse_at_frame(&self, frame: FramePos) -> f64 {
        self.pulse_at_minute(self.minute_at_frame(frame))
    }

    /// Tempo value at the given pulse, keeping this section's note type
    pub fn tempo_value_at_pulse(&self, pulse: f64) -> Tempo {
        Tempo::with_note_type(self.tempo_at_pulse(pulse), self.tempo.note_type)
    }

    /// Tempo value at the given minute, keeping this section's note type
    pub fn tempo_value_at_minute(&self, minute: f64) -> Tempo {
        Tempo::with_note_type(self.tempo_at_minute(minute), self.tempo.note_type)
    }

    /// Whether `npm` lies strictly inside this section's ramp
    pub(crate) fn ramp_covers(&self, npm: f64) -> bool {
        match self.ramp_end() {
            Some(end) => {
                let (lo, hi) = if self.tempo.note_types_per_minute < end.note_types_per_minute {
                    (self.tempo.note_types_per_minute, end.note_types_per_minute)
                } else {
                    (end.note_types_per_minute, self.tempo.note_types_per_minute)
                };
                npm > lo && npm < hi
            }
            None => false,
        }
    }
}

impl fmt::Display for TempoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tempo {} {} at frame {} minute {:.9} pulse {:.9} ({} locked)",
            self.position.id,
            self.tempo,
            self.position.frame,
            self.position.minute,
            self.position.pulse,
            self.position.lock_style,
        )?;
        match self.kind {
            TempoKind::Constant => write!(f, " constant"),
            TempoKind::Ramp => write!(
                f,
                " ramp to {} c {:e}",
                self.end_note_types_per_minute(),
                self.c
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::position::SectionId;

    const SR: u32 = 48000;

    fn first(tempo: Tempo, kind: TempoKind) -> TempoSection {
        TempoSection::new(SectionPosition::origin(SectionId(0), SR), tempo, kind)
    }

    /// 77 -> 217 bpm ramp ending one minute in
    fn one_minute_ramp() -> TempoSection {
        let mut ts = first(Tempo::new(77.0), TempoKind::Ramp);
        ts.set_end_at_minute(217.0, 1.0);
        ts
    }

    #[test]
    fn test_tempo_rates() {
        let tempo = Tempo::new(120.0);
        assert_eq!(tempo.pulses_per_minute(), 30.0);
        assert_eq!(tempo.quarter_notes_per_minute(), 120.0);
        assert_eq!(tempo.frames_per_quarter_note(SR), 24000.0);

        let eighths = Tempo::with_note_type(120.0, 8.0);
        assert_eq!(eighths.pulses_per_minute(), 15.0);
        assert_eq!(eighths.quarter_notes_per_minute(), 60.0);
    }

    #[test]
    fn test_tempo_validation() {
        assert!(Tempo::new(120.0).validate().is_ok());
        assert!(Tempo::new(0.0).validate().is_err());
        assert!(Tempo::new(f64::NAN).validate().is_err());
        assert!(Tempo::with_note_type(120.0, -4.0).validate().is_err());
    }

    #[test]
    fn test_constant_section_math() {
        let mut ts = first(Tempo::new(120.0), TempoKind::Constant);
        ts.set_end_at_pulse(240.0, 3.0);
        assert!(!ts.is_ramped());

        assert_eq!(ts.frame_at_pulse(3.0), 288_000);
        assert_eq!(ts.frame_at_pulse(1.5), 144_000);
        assert_eq!(ts.frame_at_pulse(1.0), 96_000);
        assert!((ts.pulse_at_frame(288_000) - 3.0).abs() < 1e-17);
        assert!((ts.minute_at_pulse(3.0) - 0.1).abs() < 1e-17);
        assert!((ts.pulse_at_minute(0.1) - 3.0).abs() < 1e-17);
        assert!((ts.minute_at_tempo(240.0, 3.0) - 0.1).abs() < 1e-17);
        assert_eq!(ts.tempo_at_pulse(2.0), 120.0);
        assert_eq!(ts.tempo_at_minute(0.05), 120.0);

        // A constant section never ramps toward its successor
        assert_eq!(ts.end_note_types_per_minute(), 120.0);
    }

    #[test]
    fn test_ramp_end_from_minute() {
        let ts = one_minute_ramp();
        assert!(ts.is_ramped());
        let end = ts.span_end().unwrap();
        assert_eq!(end.minute, 1.0);
        assert_eq!(end.note_types_per_minute, 217.0);

        assert_eq!(ts.minute_at_tempo(217.0, end.pulse), 1.0);
        assert_eq!(ts.pulse_at_tempo(217.0, 0.0), end.pulse);
        assert_eq!(ts.frame_at_pulse(end.pulse), 60 * SR as i64);
        assert!((ts.pulse_at_minute(1.0) - end.pulse).abs() < 1e-14);
        assert!((ts.tempo_at_minute(1.0) - 217.0).abs() < 1e-17);
    }

    #[test]
    fn test_ramp_midpoint_is_linear_in_pulse() {
        let ts = one_minute_ramp();
        let end = ts.span_end().unwrap();
        assert_eq!(ts.tempo_at_pulse(end.pulse / 2.0), 147.0);
        assert_eq!(ts.pulse_at_tempo(147.0, 0.0), end.pulse / 2.0);
    }

    #[test]
    fn test_ramp_tempo_round_trip() {
        let ts = one_minute_ramp();
        let p = ts.pulse_at_tempo(125.0, 0.0);
        assert!((ts.tempo_at_pulse(p) - 125.0).abs() < 1e-17);
    }

    #[test]
    fn test_ramp_frame_round_trip() {
        let ts = one_minute_ramp();
        for seconds in [1, 5, 20, 33, 59] {
            let target = seconds * SR as i64;
            assert_eq!(ts.frame_at_pulse(ts.pulse_at_frame(target)), target);
        }
    }

    #[test]
    fn test_ramp_end_from_pulse() {
        let mut ts = first(Tempo::with_note_type(80.0, 8.0), TempoKind::Ramp);
        ts.set_end_at_pulse(160.0, 20.0);
        assert_eq!(ts.tempo_at_pulse(20.0), 160.0);
        assert_eq!(ts.tempo_at_pulse(10.0), 120.0);
        assert_eq!(ts.pulse_at_tempo(120.0, 0.0), 10.0);

        let end = ts.span_end().unwrap();
        assert_eq!(ts.minute_at_pulse(20.0), end.minute);
        assert!((ts.minute_at_tempo(160.0, 20.0) - end.minute).abs() < 1e-17);
        assert!((ts.tempo_at_minute(end.minute) - 160.0).abs() < 1e-17);
    }

    #[test]
    fn test_degenerate_ramp_uses_constant_math() {
        let mut ts = first(Tempo::new(100.0), TempoKind::Ramp);
        ts.set_end_at_pulse(100.0 + 1e-12, 2.0);
        assert!(!ts.is_ramped());
        assert_eq!(ts.ramp_constant(), 0.0);
        assert!((ts.minute_at_pulse(2.0) - 2.0 / 25.0).abs() < 1e-15);
    }

    #[test]
    fn test_before_start_is_constant() {
        let ts = one_minute_ramp();
        // 77 bpm quarter notes = 19.25 whole notes per minute
        assert!((ts.pulse_at_minute(-1.0) + 19.25).abs() < 1e-12);
        assert_eq!(ts.tempo_at_pulse(-1.0), 77.0);
    }

    #[test]
    fn test_ramp_covers() {
        let ts = one_minute_ramp();
        assert!(ts.ramp_covers(100.0));
        assert!(!ts.ramp_covers(77.0));
        assert!(!ts.ramp_covers(217.0));
        assert!(!ts.ramp_covers(300.0));
    }
}
