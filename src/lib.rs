// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo map for audio sessions.
//!
//! Converts between audio frames, minutes, whole-note pulses and
//! bar/beat/tick positions while tempo and meter change along the timeline,
//! including tempo ramps.

pub mod config;
pub mod timing;

pub use config::{MapFile, MarkerConfig, MeterMarker, TempoMarker};
pub use timing::{
    BbtPoint, BbtTime, BlockInfo, ClockState, FramePos, MapChange, Meter, MeterPosition,
    MeterSection, MetricSection, Metrics, PositionLockStyle, Positioned, Result, RoundMode,
    SectionId, Tempo, TempoKind, TempoMap, TempoMapError, TempoMetric, TempoPosition,
    TempoSection, TransportClock, TICKS_PER_BEAT,
};
