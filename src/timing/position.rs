// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Shared position state for tempo and meter sections.
//!
//! Every section caches its position in frames, minutes and whole-note
//! pulses. Only one of them is authoritative, as recorded by its
//! [`PositionLockStyle`]; the others are derived by recomputation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio frame (sample) position or distance.
pub type FramePos = i64;

/// Which coordinate of a section was supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionLockStyle {
    /// The frame position is authoritative
    AudioTime,
    /// The pulse (tempo) or BBT (meter) position is authoritative
    MusicTime,
}

impl fmt::Display for PositionLockStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionLockStyle::AudioTime => write!(f, "audio"),
            PositionLockStyle::MusicTime => write!(f, "music"),
        }
    }
}

/// Stable identity of a section inside one map.
///
/// Ids survive recomputation and replacement, so an editor can hold on to
/// one while positions are re-derived underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub(crate) u64);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Convert a frame position to minutes at the given sample rate
#[inline]
pub fn minute_at_frame(frame: FramePos, sample_rate: u32) -> f64 {
    (frame as f64 / sample_rate as f64) / 60.0
}

/// Convert minutes to the nearest frame at the given sample rate
#[inline]
pub fn frame_at_minute(minute: f64, sample_rate: u32) -> FramePos {
    ((minute * 60.0 * sample_rate as f64) + 0.5).floor() as FramePos
}

/// Redundant position of a section on the timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPosition {
    pub(crate) id: SectionId,
    pub(crate) frame: FramePos,
    pub(crate) minute: f64,
    pub(crate) pulse: f64,
    pub(crate) lock_style: PositionLockStyle,
    pub(crate) initial: bool,
    pub(crate) sample_rate: u32,
}

impl SectionPosition {
    /// Position locked to a frame; minute is derived immediately, pulse later
    pub(crate) fn audio(id: SectionId, frame: FramePos, sample_rate: u32) -> Self {
        Self {
            id,
            frame,
            minute: minute_at_frame(frame, sample_rate),
            pulse: 0.0,
            lock_style: PositionLockStyle::AudioTime,
            initial: false,
            sample_rate,
        }
    }

    /// Position locked to a pulse; minute and frame are derived later
    pub(crate) fn music(id: SectionId, pulse: f64, sample_rate: u32) -> Self {
        Self {
            id,
            frame: 0,
            minute: 0.0,
            pulse,
            lock_style: PositionLockStyle::MusicTime,
            initial: false,
            sample_rate,
        }
    }

    /// The session origin, used by the initial tempo and meter
    pub(crate) fn origin(id: SectionId, sample_rate: u32) -> Self {
        Self {
            initial: true,
            ..Self::audio(id, 0, sample_rate)
        }
    }

    /// Set the minute and round the frame from it
    pub(crate) fn set_minute(&mut self, minute: f64) {
        self.minute = minute;
        self.frame = frame_at_minute(minute, self.sample_rate);
    }

    /// Re-derive the minute from the authoritative frame
    pub(crate) fn sync_minute_from_frame(&mut self) {
        self.minute = minute_at_frame(self.frame, self.sample_rate);
    }
}

/// Common accessors for anything positioned on the timeline
pub trait Positioned {
    /// The cached position of this section
    fn position(&self) -> &SectionPosition;

    /// Stable identity of this section
    fn id(&self) -> SectionId {
        self.position().id
    }

    /// Frame (sample) position
    fn frame(&self) -> FramePos {
        self.position().frame
    }

    /// Position in minutes
    fn minute(&self) -> f64 {
        self.position().minute
    }

    /// Position in whole-note pulses
    fn pulse(&self) -> f64 {
        self.position().pulse
    }

    /// Position in quarter notes
    fn quarter_note(&self) -> f64 {
        self.position().pulse * 4.0
    }

    /// Which coordinate is authoritative
    fn lock_style(&self) -> PositionLockStyle {
        self.position().lock_style
    }

    /// Whether this is the session's first tempo or meter
    fn initial(&self) -> bool {
        self.position().initial
    }

    /// Sample rate the frame coordinate is expressed in
    fn sample_rate(&self) -> u32 {
        self.position().sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_frame_conversion() {
        assert_eq!(minute_at_frame(48000 * 60, 48000), 1.0);
        assert_eq!(frame_at_minute(1.0, 48000), 48000 * 60);
        assert_eq!(frame_at_minute(0.1, 48000), 288_000);
        assert_eq!(frame_at_minute(0.1, 44100), 264_600);
    }

    #[test]
    fn test_frame_rounds_to_nearest() {
        let above = 100.6 / 48000.0 / 60.0;
        assert_eq!(frame_at_minute(above, 48000), 101);
        let below = 100.4 / 48000.0 / 60.0;
        assert_eq!(frame_at_minute(below, 48000), 100);
    }

    #[test]
    fn test_audio_position_derives_minute() {
        let pos = SectionPosition::audio(SectionId(3), 96_000, 48000);
        assert_eq!(pos.lock_style, PositionLockStyle::AudioTime);
        assert!((pos.minute - 2.0 / 60.0).abs() < 1e-15);
        assert!(!pos.initial);
    }

    #[test]
    fn test_set_minute_updates_frame() {
        let mut pos = SectionPosition::music(SectionId(1), 3.0, 48000);
        pos.set_minute(0.1);
        assert_eq!(pos.frame, 288_000);
        assert_eq!(pos.lock_style, PositionLockStyle::MusicTime);
    }

    #[test]
    fn test_origin_is_initial() {
        let pos = SectionPosition::origin(SectionId(0), 44100);
        assert!(pos.initial);
        assert_eq!(pos.frame, 0);
        assert_eq!(pos.minute, 0.0);
        assert_eq!(pos.pulse, 0.0);
    }
}
