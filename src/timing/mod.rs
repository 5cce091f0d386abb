// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! This module provides the tempo map: conversion between frames, minutes,
//! whole-note pulses and bar/beat/tick positions under changing tempo and
//! meter, plus a transport clock that reads it from the audio side.

pub mod clock;
pub mod error;
pub mod grid;
pub mod map;
pub mod meter;
pub mod metrics;
pub mod position;
pub mod section;
pub mod tempo;

pub use clock::{BlockInfo, ClockState, TransportClock};
pub use error::{Result, TempoMapError};
pub use grid::{BbtPoint, RoundMode, TempoMetric};
pub use map::{MapChange, TempoMap};
pub use meter::{BbtTime, Meter, MeterSection, TICKS_PER_BEAT};
pub use metrics::Metrics;
pub use position::{
    frame_at_minute, minute_at_frame, FramePos, PositionLockStyle, Positioned, SectionId,
};
pub use section::{MeterPosition, MetricSection, TempoPosition};
pub use tempo::{SpanEnd, Tempo, TempoKind, TempoSection, RAMP_EPSILON};
