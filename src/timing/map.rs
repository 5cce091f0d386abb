// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The shared tempo map.
//!
//! [`TempoMap`] owns the [`Metrics`] behind a reader-writer lock. Every
//! public method takes the lock for the duration of the call; callers that
//! need several queries against one consistent state use [`TempoMap::read`]
//! or [`TempoMap::snapshot`] and query the [`Metrics`] directly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::error::Result;
use super::grid::{BbtPoint, RoundMode, TempoMetric};
use super::meter::{BbtTime, Meter, MeterSection};
use super::metrics::Metrics;
use super::position::{FramePos, SectionId};
use super::section::{MeterPosition, MetricSection, TempoPosition};
use super::tempo::{Tempo, TempoKind, TempoSection};

/// Sent to subscribers after every committed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapChange {
    /// Generation of the map after the change
    pub generation: u64,
}

/// Forward read-only queries to the locked [`Metrics`]
macro_rules! forward_queries {
    ($( $(#[$doc:meta])* fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty; )*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, $($arg: $ty),*) -> $ret {
                self.metrics.read().$name($($arg),*)
            }
        )*
    };
}

/// Tempo and meter map shared between the editor and the audio side
#[derive(Debug)]
pub struct TempoMap {
    metrics: RwLock<Metrics>,
    generation: AtomicU64,
    listeners: Mutex<Vec<Sender<MapChange>>>,
}

impl TempoMap {
    /// A map with 120 bpm and 4/4 at frame 0
    pub fn new(sample_rate: u32) -> Result<Self> {
        Ok(Self::from_metrics(Metrics::new(sample_rate)?))
    }

    /// Wrap already consistent tables
    pub fn from_metrics(metrics: Metrics) -> Self {
        Self {
            metrics: RwLock::new(metrics),
            generation: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild a map from sections enumerated by [`TempoMap::sections`]
    pub fn from_sections(sample_rate: u32, sections: &[MetricSection]) -> Result<Self> {
        Ok(Self::from_metrics(Metrics::from_sections(
            sample_rate,
            sections,
        )?))
    }

    /// A new map with the same sections at another sample rate
    pub fn with_sample_rate(&self, sample_rate: u32) -> Result<Self> {
        let metrics = self.metrics.read().with_sample_rate(sample_rate)?;
        Ok(Self::from_metrics(metrics))
    }

    /// Lock the map for reading
    pub fn read(&self) -> RwLockReadGuard<'_, Metrics> {
        self.metrics.read()
    }

    /// Lock the map for reading unless a writer holds it
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Metrics>> {
        self.metrics.try_read()
    }

    /// An owned copy of the current state
    pub fn snapshot(&self) -> Metrics {
        self.metrics.read().clone()
    }

    /// Number of committed mutations
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Receive a [`MapChange`] after every committed mutation
    pub fn subscribe(&self) -> Receiver<MapChange> {
        let (tx, rx) = mpsc::channel();
        self.listeners.lock().push(tx);
        rx
    }

    /// All sections in frame order
    pub fn sections(&self) -> Vec<MetricSection> {
        self.metrics.read().sections().to_vec()
    }

    pub fn sample_rate(&self) -> u32 {
        self.metrics.read().sample_rate()
    }

    #[cfg(test)]
    pub(crate) fn hold_write(&self) -> parking_lot::RwLockWriteGuard<'_, Metrics> {
        self.metrics.write()
    }

    fn mutate<T>(&self, edit: impl FnOnce(&mut Metrics) -> Result<T>) -> Result<T> {
        let (out, generation) = {
            let mut metrics = self.metrics.write();
            let out = edit(&mut metrics)?;
            (out, self.generation.fetch_add(1, Ordering::AcqRel) + 1)
        };

        let change = MapChange { generation };
        self.listeners.lock().retain(|tx| tx.send(change).is_ok());
        Ok(out)
    }

    /// Add a tempo section and return its id
    pub fn add_tempo(&self, tempo: Tempo, kind: TempoKind, pos: TempoPosition) -> Result<SectionId> {
        self.mutate(|m| m.add_tempo(tempo, kind, pos))
    }

    /// Replace a tempo section's value and position, keeping its id.
    /// The initial tempo stays at frame 0 whatever `pos` says.
    pub fn replace_tempo(
        &self,
        id: SectionId,
        tempo: Tempo,
        kind: TempoKind,
        pos: TempoPosition,
    ) -> Result<()> {
        self.mutate(|m| m.replace_tempo(id, tempo, kind, pos))
    }

    pub fn remove_tempo(&self, id: SectionId) -> Result<()> {
        self.mutate(|m| m.remove_tempo(id))
    }

    /// Add a meter section and return its id
    pub fn add_meter(&self, meter: Meter, pos: MeterPosition) -> Result<SectionId> {
        self.mutate(|m| m.add_meter(meter, pos))
    }

    /// Replace a meter section's value and position, keeping its id.
    /// The initial meter stays at frame 0 whatever `pos` says.
    pub fn replace_meter(&self, id: SectionId, meter: Meter, pos: MeterPosition) -> Result<()> {
        self.mutate(|m| m.replace_meter(id, meter, pos))
    }

    pub fn remove_meter(&self, id: SectionId) -> Result<()> {
        self.mutate(|m| m.remove_meter(id))
    }

    pub fn first_tempo(&self) -> TempoSection {
        self.metrics.read().first_tempo().clone()
    }

    pub fn first_meter(&self) -> MeterSection {
        self.metrics.read().first_meter().clone()
    }

    pub fn tempo_section(&self, id: SectionId) -> Option<TempoSection> {
        self.metrics.read().tempo_section(id).cloned()
    }

    pub fn meter_section(&self, id: SectionId) -> Option<MeterSection> {
        self.metrics.read().meter_section(id).cloned()
    }

    pub fn tempo_section_at_frame(&self, frame: FramePos) -> TempoSection {
        self.metrics.read().tempo_section_at_frame(frame).clone()
    }

    pub fn tempo_section_at_minute(&self, minute: f64) -> TempoSection {
        self.metrics.read().tempo_section_at_minute(minute).clone()
    }

    pub fn tempo_section_at_pulse(&self, pulse: f64) -> TempoSection {
        self.metrics.read().tempo_section_at_pulse(pulse).clone()
    }

    pub fn tempo_section_at_beat(&self, beat: f64) -> TempoSection {
        self.metrics.read().tempo_section_at_beat(beat).clone()
    }

    pub fn meter_section_at_frame(&self, frame: FramePos) -> MeterSection {
        self.metrics.read().meter_section_at_frame(frame).clone()
    }

    pub fn meter_section_at_minute(&self, minute: f64) -> MeterSection {
        self.metrics.read().meter_section_at_minute(minute).clone()
    }

    pub fn meter_section_at_pulse(&self, pulse: f64) -> MeterSection {
        self.metrics.read().meter_section_at_pulse(pulse).clone()
    }

    pub fn meter_section_at_beat(&self, beat: f64) -> MeterSection {
        self.metrics.read().meter_section_at_beat(beat).clone()
    }

    pub fn meter_section_at_bbt(&self, bbt: &BbtTime) -> MeterSection {
        self.metrics.read().meter_section_at_bbt(bbt).clone()
    }

    forward_queries! {
        fn minute_at_frame(frame: FramePos) -> f64;
        fn frame_at_minute(minute: f64) -> FramePos;
        fn pulse_at_minute(minute: f64) -> f64;
        fn minute_at_pulse(pulse: f64) -> f64;
        fn pulse_at_frame(frame: FramePos) -> f64;
        fn frame_at_pulse(pulse: f64) -> FramePos;
        fn quarter_note_at_minute(minute: f64) -> f64;
        fn minute_at_quarter_note(quarter_note: f64) -> f64;
        fn quarter_note_at_frame(frame: FramePos) -> f64;
        fn frame_at_quarter_note(quarter_note: f64) -> FramePos;
        /// Signed frame distance between two quarter-note positions
        fn frames_between_quarter_notes(start_qn: f64, end_qn: f64) -> FramePos;
        /// Signed minute distance between two quarter-note positions
        fn minutes_between_quarter_notes(start_qn: f64, end_qn: f64) -> f64;
        fn quarter_notes_between_frames(start: FramePos, end: FramePos) -> f64;
        fn frame_plus_quarter_notes(frame: FramePos, quarter_notes: f64) -> FramePos;

        fn tempo_at_frame(frame: FramePos) -> Tempo;
        fn tempo_at_minute(minute: f64) -> Tempo;
        fn tempo_at_pulse(pulse: f64) -> Tempo;
        fn tempo_at_quarter_note(quarter_note: f64) -> Tempo;
        fn tempo_at_beat(beat: f64) -> Tempo;
        /// First pulse at which the tempo is `bpm`, if it ever is
        fn pulse_at_tempo(bpm: f64) -> Option<f64>;
        fn minute_at_tempo(bpm: f64) -> Option<f64>;
        fn frame_at_tempo(bpm: f64) -> Option<FramePos>;
        fn frame_at_tempo_section(id: SectionId) -> Option<FramePos>;
        fn beat_at_tempo(bpm: f64) -> Option<f64>;

        fn beat_at_pulse(pulse: f64) -> f64;
        fn pulse_at_beat(beat: f64) -> f64;
        fn beat_at_minute(minute: f64) -> f64;
        fn minute_at_beat(beat: f64) -> f64;
        fn beat_at_frame(frame: FramePos) -> f64;
        fn frame_at_beat(beat: f64) -> FramePos;
        fn bbt_at_beat(beat: f64) -> BbtTime;
        fn beat_at_bbt(bbt: &BbtTime) -> f64;
        fn bbt_at_pulse(pulse: f64) -> BbtTime;
        fn pulse_at_bbt(bbt: &BbtTime) -> f64;
        fn bbt_at_minute(minute: f64) -> BbtTime;
        fn minute_at_bbt(bbt: &BbtTime) -> f64;
        fn bbt_at_frame(frame: FramePos) -> BbtTime;
        fn frame_at_bbt(bbt: &BbtTime) -> FramePos;

        /// Tempo, meter and musical position at a frame
        fn metric_at(frame: FramePos) -> TempoMetric;
        /// Beat (or every `bar_mod`-th bar) lines in `[start, end)`
        fn grid(start: FramePos, end: FramePos, bar_mod: u32) -> Vec<BbtPoint>;
        fn round_to_beat(frame: FramePos, mode: RoundMode) -> FramePos;
        fn round_to_bar(frame: FramePos, mode: RoundMode) -> FramePos;
    }
}

impl fmt::Display for TempoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.metrics.read(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::error::TempoMapError;
    use crate::timing::position::Positioned;

    #[test]
    fn test_map_creation() {
        let map = TempoMap::new(48000).unwrap();
        assert_eq!(map.sample_rate(), 48000);
        assert_eq!(map.generation(), 0);
        assert_eq!(map.sections().len(), 2);
        assert_eq!(map.tempo_at_frame(0).note_types_per_minute(), 120.0);
        assert!(TempoMap::new(0).is_err());
    }

    #[test]
    fn test_mutation_bumps_generation() {
        let map = TempoMap::new(48000).unwrap();
        let rx = map.subscribe();

        let id = map
            .add_tempo(Tempo::new(90.0), TempoKind::Constant, TempoPosition::Music(2.0))
            .unwrap();
        assert_eq!(map.generation(), 1);
        assert_eq!(rx.try_recv(), Ok(MapChange { generation: 1 }));

        map.remove_tempo(id).unwrap();
        assert_eq!(rx.try_recv(), Ok(MapChange { generation: 2 }));
    }

    #[test]
    fn test_rejected_mutation_is_silent() {
        let map = TempoMap::new(48000).unwrap();
        let rx = map.subscribe();
        let before = map.sections();

        let err = map
            .add_meter(Meter::new(3, 4), MeterPosition::Music(BbtTime::start()))
            .unwrap_err();
        assert!(matches!(err, TempoMapError::InvalidPosition(_)));
        assert_eq!(map.generation(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(map.sections(), before);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let map = TempoMap::new(48000).unwrap();
        drop(map.subscribe());
        let rx = map.subscribe();
        map.add_meter(Meter::new(3, 4), MeterPosition::Music(BbtTime::new(2, 1, 0)))
            .unwrap();
        assert_eq!(map.listeners.lock().len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_try_read_fails_while_writing() {
        let map = TempoMap::new(48000).unwrap();
        {
            let _writer = map.hold_write();
            assert!(map.try_read().is_none());
        }
        assert!(map.try_read().is_some());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let map = TempoMap::new(48000).unwrap();
        let snapshot = map.snapshot();
        map.add_tempo(Tempo::new(60.0), TempoKind::Constant, TempoPosition::Audio(48000))
            .unwrap();
        assert_eq!(snapshot.tempos().len(), 1);
        assert_eq!(map.read().tempos().len(), 2);
    }

    #[test]
    fn test_forwarded_queries() {
        let map = TempoMap::new(44100).unwrap();
        map.add_tempo(Tempo::new(240.0), TempoKind::Constant, TempoPosition::quarter_note(12.0))
            .unwrap();
        assert_eq!(map.frame_at_quarter_note(12.0), 264_600);
        assert_eq!(map.frame_at_tempo(240.0), Some(264_600));
        assert_eq!(map.tempo_section_at_frame(264_600).note_types_per_minute(), 240.0);
        assert_eq!(map.bbt_at_frame(264_600), BbtTime::new(4, 1, 0));
        assert!(map.to_string().contains("240 bpm"));
    }

    #[test]
    fn test_replace_keeps_id() {
        let map = TempoMap::new(48000).unwrap();
        let id = map
            .add_tempo(Tempo::new(100.0), TempoKind::Constant, TempoPosition::Music(1.0))
            .unwrap();
        map.replace_tempo(id, Tempo::new(150.0), TempoKind::Ramp, TempoPosition::Music(2.0))
            .unwrap();
        let ts = map.tempo_section(id).unwrap();
        assert_eq!(ts.pulse(), 2.0);
        assert_eq!(ts.kind(), TempoKind::Ramp);
        assert_eq!(map.read().tempos().len(), 2);
    }

    #[test]
    fn test_rebuild_and_resample() {
        let map = TempoMap::new(48000).unwrap();
        map.add_tempo(Tempo::new(240.0), TempoKind::Constant, TempoPosition::Music(3.0))
            .unwrap();
        map.add_meter(Meter::new(3, 4), MeterPosition::Music(BbtTime::new(4, 1, 0)))
            .unwrap();

        let rebuilt = TempoMap::from_sections(48000, &map.sections()).unwrap();
        assert_eq!(rebuilt.sections(), map.sections());

        let resampled = map.with_sample_rate(44100).unwrap();
        assert_eq!(resampled.sample_rate(), 44100);
        assert_eq!(resampled.sections().last().map(|s| s.frame()), Some(264_600));
    }
}
