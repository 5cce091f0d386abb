// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The marker tables and everything computed from them.
//!
//! [`Metrics`] is the locked layer of the tempo map: a value of this type is
//! always internally consistent, and holding a `&Metrics` means the caller
//! already holds the map's lock (or owns a snapshot). Queries binary-search
//! for the governing section and delegate to its local math.
//!
//! Mutations work on a copy. The copy is recomputed in one forward pass over
//! the tempos and one over the meters, checked for ordering, and swapped in
//! only if every check passed.

use std::fmt;

use tracing::{debug, trace, warn};

use super::error::{Result, TempoMapError};
use super::meter::{BbtTime, Meter, MeterSection};
use super::position::{
    frame_at_minute, minute_at_frame, FramePos, PositionLockStyle, Positioned, SectionId,
    SectionPosition,
};
use super::section::{MeterPosition, MetricSection, TempoPosition};
use super::tempo::{Tempo, TempoKind, TempoSection};

/// Slack added to the half-frame window when labelling audio-locked meters
const BAR_EPSILON: f64 = 1e-9;

/// Consistent tempo and meter tables for one sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    sample_rate: u32,
    /// Tempo sections in pulse order; the first is the initial tempo
    tempos: Vec<TempoSection>,
    /// Meter sections in pulse order; the first is the initial meter
    meters: Vec<MeterSection>,
    /// Both tables merged in frame order
    sections: Vec<MetricSection>,
    next_id: u64,
}

fn tempo_index_at_minute(tempos: &[TempoSection], minute: f64) -> usize {
    tempos
        .partition_point(|t| t.minute() <= minute)
        .saturating_sub(1)
}

fn tempo_index_at_pulse(tempos: &[TempoSection], pulse: f64) -> usize {
    tempos
        .partition_point(|t| t.pulse() <= pulse)
        .saturating_sub(1)
}

fn pulse_at_minute_in(tempos: &[TempoSection], minute: f64) -> f64 {
    tempos[tempo_index_at_minute(tempos, minute)].pulse_at_minute(minute)
}

fn minute_at_pulse_in(tempos: &[TempoSection], pulse: f64) -> f64 {
    tempos[tempo_index_at_pulse(tempos, pulse)].minute_at_pulse(pulse)
}

fn invalid(msg: String) -> TempoMapError {
    TempoMapError::InvalidPosition(msg)
}

impl Metrics {
    /// A map holding 120 bpm quarter-note tempo and 4/4 at frame 0
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TempoMapError::InvalidSampleRate(sample_rate));
        }

        let tempo = TempoSection::new(
            SectionPosition::origin(SectionId(0), sample_rate),
            Tempo::default(),
            TempoKind::Constant,
        );
        let meter = MeterSection::new(
            SectionPosition::origin(SectionId(1), sample_rate),
            Meter::default(),
            BbtTime::start(),
        );

        let mut metrics = Self {
            sample_rate,
            tempos: vec![tempo],
            meters: vec![meter],
            sections: Vec::new(),
            next_id: 2,
        };
        metrics.recompute()?;
        Ok(metrics)
    }

    /// Rebuild tables from an enumerated section sequence.
    ///
    /// Ids and authoritative coordinates are kept; everything else is
    /// recomputed. Sections stored at another sample rate have their frames
    /// re-derived from their minutes.
    pub fn from_sections(sample_rate: u32, sections: &[MetricSection]) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TempoMapError::InvalidSampleRate(sample_rate));
        }

        let mut tempos = Vec::new();
        let mut meters = Vec::new();
        let mut next_id = 0;
        for section in sections {
            next_id = next_id.max(section.id().0 + 1);
            match section {
                MetricSection::Tempo(ts) => {
                    ts.tempo().validate()?;
                    tempos.push(ts.clone());
                }
                MetricSection::Meter(ms) => {
                    ms.meter().validate()?;
                    meters.push(ms.clone());
                }
            }
        }

        let mut ids: Vec<SectionId> = sections.iter().map(|s| s.id()).collect();
        ids.sort();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(invalid("duplicate section id".into()));
        }

        tempos.sort_by(|a, b| a.pulse().total_cmp(&b.pulse()));
        meters.sort_by(|a, b| a.pulse().total_cmp(&b.pulse()));

        let tempo_initials = tempos.iter().filter(|t| t.initial()).count();
        let meter_initials = meters.iter().filter(|m| m.initial()).count();
        if tempo_initials != 1 || !tempos.first().is_some_and(|t| t.initial()) {
            return Err(invalid("exactly one initial tempo must lead the map".into()));
        }
        if meter_initials != 1 || !meters.first().is_some_and(|m| m.initial()) {
            return Err(invalid("exactly one initial meter must lead the map".into()));
        }

        let mut metrics = Self {
            sample_rate,
            tempos,
            meters,
            sections: Vec::new(),
            next_id,
        };
        metrics.rebase(sample_rate);
        metrics.recompute()?;
        Ok(metrics)
    }

    /// The same map at another sample rate
    pub fn with_sample_rate(&self, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TempoMapError::InvalidSampleRate(sample_rate));
        }
        let mut metrics = self.clone();
        metrics.rebase(sample_rate);
        metrics.recompute()?;
        Ok(metrics)
    }

    /// Move every section to `sample_rate`, keeping minutes
    fn rebase(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        let positions = self
            .tempos
            .iter_mut()
            .map(|t| &mut t.position)
            .chain(self.meters.iter_mut().map(|m| &mut m.position));
        for position in positions {
            if position.sample_rate != sample_rate {
                position.sample_rate = sample_rate;
                position.set_minute(position.minute);
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Tempo sections in order
    pub fn tempos(&self) -> &[TempoSection] {
        &self.tempos
    }

    /// Meter sections in order
    pub fn meters(&self) -> &[MeterSection] {
        &self.meters
    }

    /// All sections merged in frame order (tempo before meter on ties)
    pub fn sections(&self) -> &[MetricSection] {
        &self.sections
    }

    pub fn first_tempo(&self) -> &TempoSection {
        &self.tempos[0]
    }

    pub fn first_meter(&self) -> &MeterSection {
        &self.meters[0]
    }

    pub fn tempo_section(&self, id: SectionId) -> Option<&TempoSection> {
        self.tempos.iter().find(|t| t.id() == id)
    }

    pub fn meter_section(&self, id: SectionId) -> Option<&MeterSection> {
        self.meters.iter().find(|m| m.id() == id)
    }

    // Section lookup

    pub fn tempo_section_at_minute(&self, minute: f64) -> &TempoSection {
        &self.tempos[tempo_index_at_minute(&self.tempos, minute)]
    }

    pub fn tempo_section_at_frame(&self, frame: FramePos) -> &TempoSection {
        let idx = self.tempos.partition_point(|t| t.frame() <= frame);
        &self.tempos[idx.saturating_sub(1)]
    }

    pub fn tempo_section_at_pulse(&self, pulse: f64) -> &TempoSection {
        &self.tempos[tempo_index_at_pulse(&self.tempos, pulse)]
    }

    pub fn tempo_section_at_beat(&self, beat: f64) -> &TempoSection {
        self.tempo_section_at_pulse(self.pulse_at_beat(beat))
    }

    pub fn meter_section_at_minute(&self, minute: f64) -> &MeterSection {
        let idx = self.meters.partition_point(|m| m.minute() <= minute);
        &self.meters[idx.saturating_sub(1)]
    }

    pub fn meter_section_at_frame(&self, frame: FramePos) -> &MeterSection {
        let idx = self.meters.partition_point(|m| m.frame() <= frame);
        &self.meters[idx.saturating_sub(1)]
    }

    pub fn meter_section_at_pulse(&self, pulse: f64) -> &MeterSection {
        let idx = self.meters.partition_point(|m| m.pulse() <= pulse);
        &self.meters[idx.saturating_sub(1)]
    }

    pub fn meter_section_at_beat(&self, beat: f64) -> &MeterSection {
        let idx = self.meters.partition_point(|m| m.beat() <= beat);
        &self.meters[idx.saturating_sub(1)]
    }

    pub fn meter_section_at_bbt(&self, bbt: &BbtTime) -> &MeterSection {
        let idx = self.meters.partition_point(|m| m.bbt() <= *bbt);
        &self.meters[idx.saturating_sub(1)]
    }

    // Time conversion

    pub fn minute_at_frame(&self, frame: FramePos) -> f64 {
        minute_at_frame(frame, self.sample_rate)
    }

    pub fn frame_at_minute(&self, minute: f64) -> FramePos {
        frame_at_minute(minute, self.sample_rate)
    }

    pub fn pulse_at_minute(&self, minute: f64) -> f64 {
        pulse_at_minute_in(&self.tempos, minute)
    }

    pub fn minute_at_pulse(&self, pulse: f64) -> f64 {
        minute_at_pulse_in(&self.tempos, pulse)
    }

    pub fn pulse_at_frame(&self, frame: FramePos) -> f64 {
        self.pulse_at_minute(self.minute_at_frame(frame))
    }

    pub fn frame_at_pulse(&self, pulse: f64) -> FramePos {
        self.frame_at_minute(self.minute_at_pulse(pulse))
    }

    pub fn quarter_note_at_minute(&self, minute: f64) -> f64 {
        self.pulse_at_minute(minute) * 4.0
    }

    pub fn minute_at_quarter_note(&self, quarter_note: f64) -> f64 {
        self.minute_at_pulse(quarter_note / 4.0)
    }

    pub fn quarter_note_at_frame(&self, frame: FramePos) -> f64 {
        self.pulse_at_frame(frame) * 4.0
    }

    pub fn frame_at_quarter_note(&self, quarter_note: f64) -> FramePos {
        self.frame_at_pulse(quarter_note / 4.0)
    }

    /// Signed frame distance between two quarter-note positions
    pub fn frames_between_quarter_notes(&self, start_qn: f64, end_qn: f64) -> FramePos {
        self.frame_at_quarter_note(end_qn) - self.frame_at_quarter_note(start_qn)
    }

    /// Signed minute distance between two quarter-note positions
    pub fn minutes_between_quarter_notes(&self, start_qn: f64, end_qn: f64) -> f64 {
        self.minute_at_quarter_note(end_qn) - self.minute_at_quarter_note(start_qn)
    }

    /// Quarter notes between two frames
    pub fn quarter_notes_between_frames(&self, start: FramePos, end: FramePos) -> f64 {
        self.quarter_note_at_frame(end) - self.quarter_note_at_frame(start)
    }

    /// The frame `quarter_notes` after (or before, when negative) `frame`
    pub fn frame_plus_quarter_notes(&self, frame: FramePos, quarter_notes: f64) -> FramePos {
        self.frame_at_quarter_note(self.quarter_note_at_frame(frame) + quarter_notes)
    }

    // Tempo

    pub fn tempo_at_minute(&self, minute: f64) -> Tempo {
        self.tempo_section_at_minute(minute)
            .tempo_value_at_minute(minute)
    }

    pub fn tempo_at_frame(&self, frame: FramePos) -> Tempo {
        self.tempo_section_at_frame(frame)
            .tempo_value_at_minute(self.minute_at_frame(frame))
    }

    pub fn tempo_at_pulse(&self, pulse: f64) -> Tempo {
        self.tempo_section_at_pulse(pulse).tempo_value_at_pulse(pulse)
    }

    pub fn tempo_at_quarter_note(&self, quarter_note: f64) -> Tempo {
        self.tempo_at_pulse(quarter_note / 4.0)
    }

    pub fn tempo_at_beat(&self, beat: f64) -> Tempo {
        self.tempo_at_pulse(self.pulse_at_beat(beat))
    }

    /// The first section that sits at `bpm` or ramps through it
    fn tempo_section_reaching(&self, bpm: f64) -> Option<&TempoSection> {
        self.tempos
            .iter()
            .find(|t| t.note_types_per_minute() == bpm || t.ramp_covers(bpm))
    }

    /// First pulse at which the tempo is `bpm`
    pub fn pulse_at_tempo(&self, bpm: f64) -> Option<f64> {
        let ts = self.tempo_section_reaching(bpm)?;
        if ts.note_types_per_minute() == bpm {
            Some(ts.pulse())
        } else {
            Some(ts.pulse_at_tempo(bpm, ts.minute()))
        }
    }

    /// First minute at which the tempo is `bpm`
    pub fn minute_at_tempo(&self, bpm: f64) -> Option<f64> {
        let ts = self.tempo_section_reaching(bpm)?;
        if ts.note_types_per_minute() == bpm {
            Some(ts.minute())
        } else {
            Some(ts.minute_at_tempo(bpm, ts.pulse()))
        }
    }

    /// First frame at which the tempo is `bpm`
    pub fn frame_at_tempo(&self, bpm: f64) -> Option<FramePos> {
        self.minute_at_tempo(bpm).map(|m| self.frame_at_minute(m))
    }

    /// Frame at which the tempo section `id` starts in this map
    pub fn frame_at_tempo_section(&self, id: SectionId) -> Option<FramePos> {
        self.tempo_section(id).map(|ts| ts.frame())
    }

    /// First meter-based beat at which the tempo is `bpm`
    pub fn beat_at_tempo(&self, bpm: f64) -> Option<f64> {
        self.pulse_at_tempo(bpm).map(|p| self.beat_at_pulse(p))
    }

    // Beats and BBT

    pub fn beat_at_pulse(&self, pulse: f64) -> f64 {
        self.meter_section_at_pulse(pulse).beat_at_pulse(pulse)
    }

    pub fn pulse_at_beat(&self, beat: f64) -> f64 {
        self.meter_section_at_beat(beat).pulse_at_beat(beat)
    }

    pub fn beat_at_minute(&self, minute: f64) -> f64 {
        self.beat_at_pulse(self.pulse_at_minute(minute))
    }

    pub fn minute_at_beat(&self, beat: f64) -> f64 {
        self.minute_at_pulse(self.pulse_at_beat(beat))
    }

    pub fn beat_at_frame(&self, frame: FramePos) -> f64 {
        self.beat_at_minute(self.minute_at_frame(frame))
    }

    pub fn frame_at_beat(&self, beat: f64) -> FramePos {
        self.frame_at_minute(self.minute_at_beat(beat))
    }

    /// BBT at a meter-based beat; negative beats clamp to 1|1|0
    pub fn bbt_at_beat(&self, beat: f64) -> BbtTime {
        let beat = beat.max(0.0);
        self.meter_section_at_beat(beat).bbt_at_beat(beat)
    }

    pub fn beat_at_bbt(&self, bbt: &BbtTime) -> f64 {
        self.meter_section_at_bbt(bbt).beat_at_bbt(bbt)
    }

    pub fn bbt_at_pulse(&self, pulse: f64) -> BbtTime {
        self.bbt_at_beat(self.beat_at_pulse(pulse))
    }

    pub fn pulse_at_bbt(&self, bbt: &BbtTime) -> f64 {
        self.meter_section_at_bbt(bbt).pulse_at_bbt(bbt)
    }

    pub fn bbt_at_minute(&self, minute: f64) -> BbtTime {
        self.bbt_at_pulse(self.pulse_at_minute(minute))
    }

    pub fn minute_at_bbt(&self, bbt: &BbtTime) -> f64 {
        self.minute_at_pulse(self.pulse_at_bbt(bbt))
    }

    pub fn bbt_at_frame(&self, frame: FramePos) -> BbtTime {
        self.bbt_at_minute(self.minute_at_frame(frame))
    }

    pub fn frame_at_bbt(&self, bbt: &BbtTime) -> FramePos {
        self.frame_at_minute(self.minute_at_bbt(bbt))
    }

    // Mutation

    fn alloc_id(&mut self) -> SectionId {
        let id = SectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Run `edit` on a copy, recompute it and swap it in on success
    fn apply<T>(
        &mut self,
        op: &str,
        edit: impl FnOnce(&mut Metrics) -> Result<T>,
    ) -> Result<T> {
        let mut next = self.clone();
        let outcome = edit(&mut next).and_then(|out| next.recompute().map(|_| out));
        match outcome {
            Ok(out) => {
                *self = next;
                Ok(out)
            }
            Err(e) => {
                warn!("Rejected {}: {}", op, e);
                Err(e)
            }
        }
    }

    fn check_tempo_position(&self, pos: &TempoPosition, skip: Option<SectionId>) -> Result<()> {
        let others = self.tempos.iter().filter(|t| Some(t.id()) != skip);
        match *pos {
            TempoPosition::Audio(frame) => {
                if frame < 0 {
                    return Err(invalid(format!("negative tempo frame {}", frame)));
                }
                if let Some(t) = others.into_iter().find(|t| t.frame() == frame) {
                    return Err(invalid(format!(
                        "tempo {} already sits at frame {}",
                        t.id(),
                        frame
                    )));
                }
            }
            TempoPosition::Music(pulse) => {
                if !pulse.is_finite() || pulse < 0.0 {
                    return Err(invalid(format!("tempo pulse {} out of range", pulse)));
                }
                if let Some(t) = others.into_iter().find(|t| t.pulse() == pulse) {
                    return Err(invalid(format!(
                        "tempo {} already sits at pulse {}",
                        t.id(),
                        pulse
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_meter_position(&self, pos: &MeterPosition, skip: Option<SectionId>) -> Result<()> {
        let others = self.meters.iter().filter(|m| Some(m.id()) != skip);
        match *pos {
            MeterPosition::Audio(frame) => {
                if frame < 0 {
                    return Err(invalid(format!("negative meter frame {}", frame)));
                }
                if let Some(m) = others.into_iter().find(|m| m.frame() == frame) {
                    return Err(invalid(format!(
                        "meter {} already sits at frame {}",
                        m.id(),
                        frame
                    )));
                }
            }
            MeterPosition::Music(bbt) => {
                if bbt.bars == 0 || bbt.beats == 0 {
                    return Err(invalid(format!("meter bbt {} out of range", bbt)));
                }
                let bar = bbt.next_bar_start();
                if let Some(m) = others.into_iter().find(|m| m.bbt() == bar) {
                    return Err(invalid(format!("meter {} already starts bar {}", m.id(), bar)));
                }
            }
        }
        Ok(())
    }

    /// Build a tempo section with provisional coordinates and insert it
    fn insert_tempo(
        &mut self,
        id: SectionId,
        tempo: Tempo,
        kind: TempoKind,
        pos: TempoPosition,
    ) {
        let sample_rate = self.sample_rate;
        let position = match pos {
            TempoPosition::Audio(frame) => {
                let mut position = SectionPosition::audio(id, frame, sample_rate);
                position.pulse = self.pulse_at_minute(position.minute);
                position
            }
            TempoPosition::Music(pulse) => {
                let mut position = SectionPosition::music(id, pulse, sample_rate);
                position.set_minute(self.minute_at_pulse(pulse));
                position
            }
        };
        let idx = self.tempos.partition_point(|t| t.pulse() <= position.pulse);
        self.tempos.insert(idx, TempoSection::new(position, tempo, kind));
    }

    /// Build a meter section with provisional coordinates and insert it
    fn insert_meter(&mut self, id: SectionId, meter: Meter, pos: MeterPosition) {
        let sample_rate = self.sample_rate;
        let section = match pos {
            MeterPosition::Audio(frame) => {
                let mut position = SectionPosition::audio(id, frame, sample_rate);
                position.pulse = self.pulse_at_minute(position.minute);
                let bbt = self.bbt_at_pulse(position.pulse);
                MeterSection::new(position, meter, bbt)
            }
            MeterPosition::Music(bbt) => {
                let bbt = bbt.next_bar_start();
                let mut position = SectionPosition::music(id, self.pulse_at_bbt(&bbt), sample_rate);
                position.set_minute(self.minute_at_pulse(position.pulse));
                MeterSection::new(position, meter, bbt)
            }
        };
        let idx = self
            .meters
            .partition_point(|m| m.pulse() <= section.position.pulse);
        self.meters.insert(idx, section);
    }

    pub(crate) fn add_tempo(
        &mut self,
        tempo: Tempo,
        kind: TempoKind,
        pos: TempoPosition,
    ) -> Result<SectionId> {
        let id = self.apply("tempo add", |m| {
            tempo.validate()?;
            m.check_tempo_position(&pos, None)?;
            let id = m.alloc_id();
            m.insert_tempo(id, tempo, kind, pos);
            Ok(id)
        })?;
        debug!("Added tempo {} {} at {}", id, tempo, pos);
        Ok(id)
    }

    pub(crate) fn replace_tempo(
        &mut self,
        id: SectionId,
        tempo: Tempo,
        kind: TempoKind,
        pos: TempoPosition,
    ) -> Result<()> {
        self.apply("tempo replace", |m| {
            tempo.validate()?;
            let idx = m
                .tempos
                .iter()
                .position(|t| t.id() == id)
                .ok_or(TempoMapError::UnknownSection { kind: "tempo", id })?;

            if m.tempos[idx].initial() {
                let position = SectionPosition::origin(id, m.sample_rate);
                m.tempos[idx] = TempoSection::new(position, tempo, kind);
                return Ok(());
            }

            m.check_tempo_position(&pos, Some(id))?;
            m.tempos.remove(idx);
            m.recompute()?;
            m.insert_tempo(id, tempo, kind, pos);
            Ok(())
        })?;
        debug!("Replaced tempo {} with {} at {}", id, tempo, pos);
        Ok(())
    }

    pub(crate) fn remove_tempo(&mut self, id: SectionId) -> Result<()> {
        self.apply("tempo removal", |m| {
            let idx = m
                .tempos
                .iter()
                .position(|t| t.id() == id)
                .ok_or(TempoMapError::UnknownSection { kind: "tempo", id })?;
            if m.tempos[idx].initial() {
                return Err(TempoMapError::InitialSection("tempo"));
            }
            m.tempos.remove(idx);
            Ok(())
        })?;
        debug!("Removed tempo {}", id);
        Ok(())
    }

    pub(crate) fn add_meter(&mut self, meter: Meter, pos: MeterPosition) -> Result<SectionId> {
        let id = self.apply("meter add", |m| {
            meter.validate()?;
            m.check_meter_position(&pos, None)?;
            let id = m.alloc_id();
            m.insert_meter(id, meter, pos);
            Ok(id)
        })?;
        debug!("Added meter {} {} at {}", id, meter, pos);
        Ok(id)
    }

    pub(crate) fn replace_meter(
        &mut self,
        id: SectionId,
        meter: Meter,
        pos: MeterPosition,
    ) -> Result<()> {
        self.apply("meter replace", |m| {
            meter.validate()?;
            let idx = m
                .meters
                .iter()
                .position(|s| s.id() == id)
                .ok_or(TempoMapError::UnknownSection { kind: "meter", id })?;

            if m.meters[idx].initial() {
                let position = SectionPosition::origin(id, m.sample_rate);
                m.meters[idx] = MeterSection::new(position, meter, BbtTime::start());
                return Ok(());
            }

            m.check_meter_position(&pos, Some(id))?;
            m.meters.remove(idx);
            m.recompute()?;
            m.insert_meter(id, meter, pos);
            Ok(())
        })?;
        debug!("Replaced meter {} with {} at {}", id, meter, pos);
        Ok(())
    }

    pub(crate) fn remove_meter(&mut self, id: SectionId) -> Result<()> {
        self.apply("meter removal", |m| {
            let idx = m
                .meters
                .iter()
                .position(|s| s.id() == id)
                .ok_or(TempoMapError::UnknownSection { kind: "meter", id })?;
            if m.meters[idx].initial() {
                return Err(TempoMapError::InitialSection("meter"));
            }
            m.meters.remove(idx);
            Ok(())
        })?;
        debug!("Removed meter {}", id);
        Ok(())
    }

    // Recomputation

    /// Re-derive every non-authoritative coordinate and rebuild the merged view
    pub(crate) fn recompute(&mut self) -> Result<()> {
        self.recompute_tempos()?;
        self.recompute_meters()?;
        self.rebuild_sections()?;
        trace!(
            "Recomputed {} tempos and {} meters",
            self.tempos.len(),
            self.meters.len()
        );
        Ok(())
    }

    fn recompute_tempos(&mut self) -> Result<()> {
        for i in 1..self.tempos.len() {
            let (head, tail) = self.tempos.split_at_mut(i);
            let prev = &mut head[i - 1];
            let cur = &mut tail[0];

            match cur.lock_style() {
                PositionLockStyle::AudioTime => {
                    cur.position.sync_minute_from_frame();
                    if cur.minute() <= prev.minute() {
                        return Err(invalid(format!(
                            "tempo {} at frame {} does not follow tempo {} at frame {}",
                            cur.id(),
                            cur.frame(),
                            prev.id(),
                            prev.frame()
                        )));
                    }
                    let end = prev.set_end_at_minute(cur.note_types_per_minute(), cur.minute());
                    cur.position.pulse = end.pulse;
                }
                PositionLockStyle::MusicTime => {
                    if cur.pulse() <= prev.pulse() {
                        return Err(invalid(format!(
                            "tempo {} at pulse {} does not follow tempo {} at pulse {}",
                            cur.id(),
                            cur.pulse(),
                            prev.id(),
                            prev.pulse()
                        )));
                    }
                    let end = prev.set_end_at_pulse(cur.note_types_per_minute(), cur.pulse());
                    cur.position.set_minute(end.minute);
                }
            }

            if cur.pulse() <= prev.pulse() || cur.minute() <= prev.minute() {
                return Err(invalid(format!(
                    "tempo {} collapses onto tempo {}",
                    cur.id(),
                    prev.id()
                )));
            }
        }

        if let Some(last) = self.tempos.last_mut() {
            last.clear_end();
        }
        Ok(())
    }

    fn recompute_meters(&mut self) -> Result<()> {
        let tempos = &self.tempos;
        let half_frame = 0.5 / (60.0 * self.sample_rate as f64);
        for i in 1..self.meters.len() {
            let (head, tail) = self.meters.split_at_mut(i);
            let prev = &head[i - 1];
            let cur = &mut tail[0];
            let dpb = prev.divisions_per_bar() as f64;
            let divisor = prev.note_divisor() as f64;

            match cur.lock_style() {
                PositionLockStyle::AudioTime => {
                    cur.position.sync_minute_from_frame();
                    let minute = cur.minute();
                    let bars_at =
                        |m: f64| (pulse_at_minute_in(tempos, m) - prev.pulse()) * divisor / dpb;
                    let pulse = pulse_at_minute_in(tempos, minute);
                    let beat = prev.beat() + (pulse - prev.pulse()) * divisor;
                    let bars_in = (beat - prev.beat()) / dpb;
                    // A bar line within half a frame of the meter is the one it sits on
                    let whole = bars_in.round();
                    let on_line = whole >= bars_at(minute - half_frame) - BAR_EPSILON
                        && whole <= bars_at(minute + half_frame) + BAR_EPSILON;
                    let bars = if on_line {
                        whole
                    } else {
                        bars_in.floor() + 1.0
                    };
                    if bars < 1.0 {
                        return Err(invalid(format!(
                            "meter {} at frame {} does not follow meter {}",
                            cur.id(),
                            cur.frame(),
                            prev.id()
                        )));
                    }
                    cur.position.pulse = pulse;
                    cur.beat = beat;
                    cur.bbt = BbtTime::new(prev.bbt().bars + bars as u32, 1, 0);
                }
                PositionLockStyle::MusicTime => {
                    if cur.bbt().bars <= prev.bbt().bars {
                        return Err(invalid(format!(
                            "meter {} at {} does not follow meter {} at {}",
                            cur.id(),
                            cur.bbt(),
                            prev.id(),
                            prev.bbt()
                        )));
                    }
                    let bars = (cur.bbt().bars - prev.bbt().bars) as f64;
                    let beat = prev.beat() + bars * dpb;
                    let pulse = prev.pulse() + (beat - prev.beat()) / divisor;
                    cur.beat = beat;
                    cur.position.pulse = pulse;
                    cur.position.set_minute(minute_at_pulse_in(tempos, pulse));
                }
            }

            if cur.pulse() <= prev.pulse() || cur.bbt().bars <= prev.bbt().bars {
                return Err(invalid(format!(
                    "meter {} collapses onto meter {}",
                    cur.id(),
                    prev.id()
                )));
            }
        }
        Ok(())
    }

    fn rebuild_sections(&mut self) -> Result<()> {
        let mut sections: Vec<MetricSection> = self
            .tempos
            .iter()
            .cloned()
            .map(MetricSection::from)
            .chain(self.meters.iter().cloned().map(MetricSection::from))
            .collect();
        sections.sort_by(|a, b| {
            a.sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(pair) = sections
            .windows(2)
            .find(|w| w[1].frame() < w[0].frame() || w[1].pulse() < w[0].pulse())
        {
            return Err(invalid(format!(
                "section {} at frame {} overtakes section {} at frame {}",
                pair[1].id(),
                pair[1].frame(),
                pair[0].id(),
                pair[0].frame()
            )));
        }

        self.sections = sections;
        Ok(())
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tempo map at {} Hz", self.sample_rate)?;
        for section in &self.sections {
            writeln!(f, "  {}", section)?;
        }
        Ok(())
    }
}
