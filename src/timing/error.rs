// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Errors reported by tempo map mutations.

use thiserror::Error;

use super::position::SectionId;

/// Tempo map error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TempoMapError {
    /// A marker would coincide with another or break the ordering of the map
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    /// Tempo values must be finite and positive
    #[error("invalid tempo {bpm} bpm (note type {note_type})")]
    InvalidTempo { bpm: f64, note_type: f64 },
    /// Meter values must be non-zero
    #[error("invalid meter {divisions_per_bar}/{note_divisor}")]
    InvalidMeter {
        divisions_per_bar: u32,
        note_divisor: u32,
    },
    /// Sample rate must be non-zero
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),
    /// No section with this id exists in the map
    #[error("no {kind} section with id {id}")]
    UnknownSection { kind: &'static str, id: SectionId },
    /// The first tempo and meter can be replaced but never removed
    #[error("the initial {0} section cannot be removed")]
    InitialSection(&'static str),
}

/// Result type used across the timing module
pub type Result<T> = std::result::Result<T, TempoMapError>;
