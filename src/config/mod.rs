// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo map files.
//!
//! A map file lists the sample rate and every tempo and meter marker. It is
//! read from YAML or TOML (chosen by file extension) and turned into a
//! [`TempoMap`] by replaying the markers through the map's mutation API.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timing::{
    BbtTime, FramePos, Meter, MeterPosition, MetricSection, PositionLockStyle, Positioned, Tempo,
    TempoKind, TempoMap, TempoPosition,
};

/// Root of a tempo map file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapFile {
    /// Sample rate the frame positions are expressed in
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Tempo and meter markers
    #[serde(default)]
    pub markers: Vec<MarkerConfig>,
}

fn default_sample_rate() -> u32 {
    48000
}
fn default_note_type() -> f64 {
    4.0
}

/// One marker entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkerConfig {
    Tempo(TempoMarker),
    Meter(MeterMarker),
}

/// Tempo marker. Exactly one of `frame`, `pulse` and `quarter_note` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TempoMarker {
    pub bpm: f64,
    #[serde(default = "default_note_type")]
    pub note_type: f64,
    #[serde(default)]
    pub kind: TempoKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FramePos>,
    /// Position in whole notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter_note: Option<f64>,
}

impl TempoMarker {
    pub fn tempo(&self) -> Tempo {
        Tempo::with_note_type(self.bpm, self.note_type)
    }

    /// Where this marker goes on the map
    pub fn position(&self) -> Result<TempoPosition> {
        match (self.frame, self.pulse, self.quarter_note) {
            (Some(frame), None, None) => Ok(TempoPosition::Audio(frame)),
            (None, Some(pulse), None) => Ok(TempoPosition::Music(pulse)),
            (None, None, Some(qn)) => Ok(TempoPosition::quarter_note(qn)),
            _ => bail!(
                "tempo marker at {} bpm needs exactly one of frame, pulse or quarter_note",
                self.bpm
            ),
        }
    }
}

/// Meter marker. Exactly one of `frame` and `bbt` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeterMarker {
    pub divisions_per_bar: u32,
    pub note_divisor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FramePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbt: Option<BbtTime>,
}

impl MeterMarker {
    pub fn meter(&self) -> Meter {
        Meter::new(self.divisions_per_bar, self.note_divisor)
    }

    /// Where this marker goes on the map
    pub fn position(&self) -> Result<MeterPosition> {
        match (self.frame, self.bbt) {
            (Some(frame), None) => Ok(MeterPosition::Audio(frame)),
            (None, Some(bbt)) => Ok(MeterPosition::Music(bbt)),
            _ => bail!(
                "meter marker {} needs exactly one of frame or bbt",
                self.meter()
            ),
        }
    }
}

fn is_origin_tempo(pos: &TempoPosition) -> bool {
    matches!(pos, TempoPosition::Audio(0)) || matches!(pos, TempoPosition::Music(p) if *p == 0.0)
}

fn is_origin_meter(pos: &MeterPosition) -> bool {
    match pos {
        MeterPosition::Audio(frame) => *frame == 0,
        MeterPosition::Music(bbt) => *bbt == BbtTime::start(),
    }
}

impl MapFile {
    /// Load a map file, picking the format from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read map file: {:?}", path))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("toml") => Self::from_toml(&contents),
            _ => bail!("Unsupported map file extension: {:?}", path),
        }
    }

    /// Save a map file, picking the format from the extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml()?,
            Some("toml") => self.to_toml()?,
            _ => bail!("Unsupported map file extension: {:?}", path),
        };
        fs::write(path, contents).with_context(|| format!("Failed to write map file: {:?}", path))
    }

    /// Parse a map file from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML map file")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize map file to YAML")
    }

    /// Parse a map file from TOML string
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse TOML map file")
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize map file to TOML")
    }

    /// Describe an existing map
    pub fn from_map(map: &TempoMap) -> Self {
        let markers = map
            .sections()
            .iter()
            .map(|section| match section {
                MetricSection::Tempo(ts) => {
                    let audio = ts.lock_style() == PositionLockStyle::AudioTime;
                    MarkerConfig::Tempo(TempoMarker {
                        bpm: ts.note_types_per_minute(),
                        note_type: ts.note_type(),
                        kind: ts.kind(),
                        frame: audio.then(|| ts.frame()),
                        pulse: (!audio).then(|| ts.pulse()),
                        quarter_note: None,
                    })
                }
                MetricSection::Meter(ms) => {
                    let audio = ms.lock_style() == PositionLockStyle::AudioTime;
                    MarkerConfig::Meter(MeterMarker {
                        divisions_per_bar: ms.divisions_per_bar(),
                        note_divisor: ms.note_divisor(),
                        frame: audio.then(|| ms.frame()),
                        bbt: (!audio).then(|| ms.bbt()),
                    })
                }
            })
            .collect();

        Self {
            sample_rate: map.sample_rate(),
            markers,
        }
    }

    /// Build a map from the markers.
    ///
    /// Markers at the session origin replace the initial tempo or meter;
    /// every other marker is added.
    pub fn build(&self) -> Result<TempoMap> {
        let map = TempoMap::new(self.sample_rate)
            .with_context(|| format!("Invalid sample rate {}", self.sample_rate))?;

        for (index, marker) in self.markers.iter().enumerate() {
            match marker {
                MarkerConfig::Tempo(tm) => {
                    let pos = tm.position()?;
                    let result = if is_origin_tempo(&pos) {
                        map.replace_tempo(map.first_tempo().id(), tm.tempo(), tm.kind, pos)
                    } else {
                        map.add_tempo(tm.tempo(), tm.kind, pos).map(|_| ())
                    };
                    result.with_context(|| format!("Failed to place tempo marker {}", index))?;
                }
                MarkerConfig::Meter(mm) => {
                    let pos = mm.position()?;
                    let result = if is_origin_meter(&pos) {
                        map.replace_meter(map.first_meter().id(), mm.meter(), pos)
                    } else {
                        map.add_meter(mm.meter(), pos).map(|_| ())
                    };
                    result.with_context(|| format!("Failed to place meter marker {}", index))?;
                }
            }
        }

        debug!("Built tempo map with {} markers", self.markers.len());
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCENARIO: &str = r#"
sample_rate: 48000
markers:
  - type: tempo
    bpm: 120
    frame: 0
  - type: tempo
    bpm: 240
    pulse: 3.0
  - type: meter
    divisions_per_bar: 4
    note_divisor: 4
    bbt: { bars: 1, beats: 1, ticks: 0 }
  - type: meter
    divisions_per_bar: 3
    note_divisor: 4
    bbt: { bars: 4, beats: 1, ticks: 0 }
"#;

    #[test]
    fn test_parse_map_file() {
        let file = MapFile::from_yaml(SCENARIO).unwrap();
        assert_eq!(file.sample_rate, 48000);
        assert_eq!(file.markers.len(), 4);

        match &file.markers[1] {
            MarkerConfig::Tempo(tm) => {
                assert_eq!(tm.bpm, 240.0);
                assert_eq!(tm.note_type, 4.0);
                assert_eq!(tm.kind, TempoKind::Constant);
                assert_eq!(tm.position().unwrap(), TempoPosition::Music(3.0));
            }
            other => panic!("expected tempo marker, got {:?}", other),
        }
    }

    #[test]
    fn test_default_values() {
        let file = MapFile::from_yaml("markers: []").unwrap();
        assert_eq!(file.sample_rate, 48000);
        assert!(file.markers.is_empty());
    }

    #[test]
    fn test_build_map() {
        let map = MapFile::from_yaml(SCENARIO).unwrap().build().unwrap();
        assert_eq!(map.sections().len(), 4);
        assert_eq!(map.frame_at_quarter_note(12.0), 288_000);
        assert_eq!(map.meter_section_at_frame(300_000).meter(), Meter::new(3, 4));
    }

    #[test]
    fn test_marker_needs_one_position() {
        let yaml = r#"
markers:
  - type: tempo
    bpm: 100
    frame: 100
    pulse: 1.0
"#;
        let file = MapFile::from_yaml(yaml).unwrap();
        assert!(file.build().is_err());

        let yaml = r#"
markers:
  - type: meter
    divisions_per_bar: 3
    note_divisor: 4
"#;
        assert!(MapFile::from_yaml(yaml).unwrap().build().is_err());
    }

    #[test]
    fn test_quarter_note_and_ramp() {
        let yaml = r#"
sample_rate: 44100
markers:
  - type: tempo
    bpm: 100
    kind: ramp
    frame: 0
  - type: tempo
    bpm: 200
    quarter_note: 16
"#;
        let map = MapFile::from_yaml(yaml).unwrap().build().unwrap();
        assert!(map.first_tempo().is_ramped());
        assert_eq!(map.tempo_at_quarter_note(8.0).note_types_per_minute(), 150.0);
    }

    #[test]
    fn test_from_map_round_trip() {
        let map = MapFile::from_yaml(SCENARIO).unwrap().build().unwrap();
        let file = MapFile::from_map(&map);
        let rebuilt = file.build().unwrap();
        assert_eq!(rebuilt.sections(), map.sections());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.toml");

        let file = MapFile::from_yaml(SCENARIO).unwrap();
        file.save(&path).unwrap();
        let loaded = MapFile::load(&path).unwrap();
        assert_eq!(loaded, file);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.yml");

        let file = MapFile::from_yaml(SCENARIO).unwrap();
        file.save(&path).unwrap();
        assert_eq!(MapFile::load(&path).unwrap(), file);
    }

    #[test]
    fn test_invalid_files() {
        let dir = tempdir().unwrap();

        let path = dir.path().join("map.json");
        fs::write(&path, "{}").unwrap();
        assert!(MapFile::load(&path).is_err());

        let path = dir.path().join("broken.yaml");
        fs::write(&path, "this is not valid yaml: [").unwrap();
        assert!(MapFile::load(&path).is_err());

        assert!(MapFile::load(dir.path().join("missing.yaml")).is_err());
    }
}
