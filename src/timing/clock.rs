// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Transport clock.
//!
//! This module provides a playhead that the audio callback advances one
//! block at a time. Each block reports the metric at its start and the beat
//! lines it crosses. The clock never blocks on the tempo map: if an editor
//! holds the write lock, the block is reported with the previous metric and
//! flagged stale.

use std::sync::Arc;

use tracing::debug;

use super::grid::{BbtPoint, TempoMetric};
use super::map::TempoMap;
use super::meter::BbtTime;
use super::position::FramePos;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

/// What happened during one processed block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    /// First frame of the block
    pub start: FramePos,
    /// One past the last frame of the block
    pub end: FramePos,
    /// Metric at `start`
    pub metric: TempoMetric,
    /// Beat lines inside the block
    pub beats: Vec<BbtPoint>,
    /// Map generation the block was computed from
    pub generation: u64,
    /// The map was locked by a writer; `metric` is from an earlier block
    pub stale: bool,
}

/// Playhead driven by the audio callback
#[derive(Debug)]
pub struct TransportClock {
    map: Arc<TempoMap>,
    state: ClockState,
    /// Next frame to be processed
    playhead: FramePos,
    /// Most recent metric read from the map
    metric: TempoMetric,
    generation: u64,
}

impl TransportClock {
    /// Create a stopped clock at frame 0
    pub fn new(map: Arc<TempoMap>) -> Self {
        let metric = map.metric_at(0);
        let generation = map.generation();
        Self {
            map,
            state: ClockState::Stopped,
            playhead: 0,
            metric,
            generation,
        }
    }

    /// The map this clock reads
    pub fn map(&self) -> &Arc<TempoMap> {
        &self.map
    }

    /// Get the current clock state
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Next frame to be processed
    pub fn position(&self) -> FramePos {
        self.playhead
    }

    /// Metric at the start of the last processed block
    pub fn metric(&self) -> TempoMetric {
        self.metric
    }

    /// Musical position of the last processed block
    pub fn bbt(&self) -> BbtTime {
        self.metric.bbt
    }

    /// Tempo at the start of the last processed block
    pub fn bpm(&self) -> f64 {
        self.metric.tempo.note_types_per_minute()
    }

    /// Whether the map changed since the clock last read it
    pub fn map_changed(&self) -> bool {
        self.map.generation() != self.generation
    }

    /// Start from the session origin
    pub fn start(&mut self) {
        self.state = ClockState::Running;
        self.locate(0);
        debug!("Transport started");
    }

    /// Stop and return to the session origin
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
        self.locate(0);
        debug!("Transport stopped");
    }

    /// Pause (continue from current position)
    pub fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }

    /// Continue from paused state
    pub fn continue_playback(&mut self) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
        }
    }

    /// Move the playhead, keeping the state
    pub fn locate(&mut self, frame: FramePos) {
        self.playhead = frame.max(0);
        if let Some(metrics) = self.map.try_read() {
            self.metric = metrics.metric_at(self.playhead);
            self.generation = self.map.generation();
        }
        debug!("Transport located to frame {}", self.playhead);
    }

    /// Advance the playhead by one block.
    ///
    /// Returns `None` unless the clock is running.
    pub fn process(&mut self, nframes: u32) -> Option<BlockInfo> {
        if self.state != ClockState::Running {
            return None;
        }

        let start = self.playhead;
        let end = start + nframes as FramePos;
        self.playhead = end;

        let (beats, stale) = match self.map.try_read() {
            Some(metrics) => {
                self.metric = metrics.metric_at(start);
                self.generation = self.map.generation();
                (metrics.grid(start, end, 0), false)
            }
            None => (Vec::new(), true),
        };

        Some(BlockInfo {
            start,
            end,
            metric: self.metric,
            beats,
            generation: self.generation,
            stale,
        })
    }
}
