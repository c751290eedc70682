//! Letter → screen position mapping
//!
//! Positions come from a small calibration file (`positions.toml`):
//!
//! ```toml
//! [A]
//! x = 540
//! y = 1210
//! ```
//!
//! The pipeline only reads it. `mcqtap calibrate` is the writer.

use crate::config::Config;
use crate::error::{DispatchError, McqError};
use crate::question::OptionLetter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A screen coordinate in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (i32, i32) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

/// Persisted per-letter positions
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
    positions: BTreeMap<OptionLetter, Position>,
}

impl CalibrationStore {
    /// Load from `path`; a missing file is an empty store
    pub fn load(path: &Path) -> Result<Self, McqError> {
        let mut positions = BTreeMap::new();

        if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                McqError::Config(format!("Failed to read calibration {:?}: {}", path, e))
            })?;
            // Keys are kept as strings so stray sections are skipped, not fatal
            let raw: BTreeMap<String, Position> = toml::from_str(&contents).map_err(|e| {
                McqError::Config(format!("Invalid calibration {:?}: {}", path, e))
            })?;

            for (key, position) in raw {
                match key.parse::<OptionLetter>() {
                    Ok(letter) => {
                        positions.insert(letter, position);
                    }
                    Err(_) => tracing::warn!("Ignoring calibration for unknown letter {:?}", key),
                }
            }
            tracing::debug!("Loaded {} calibrated positions from {:?}", positions.len(), path);
        } else {
            tracing::debug!("No calibration file at {:?}", path);
        }

        Ok(Self {
            path: path.to_path_buf(),
            positions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, letter: OptionLetter) -> Option<Position> {
        self.positions.get(&letter).copied()
    }

    pub fn set(&mut self, letter: OptionLetter, position: Position) {
        self.positions.insert(letter, position);
    }

    pub fn remove(&mut self, letter: OptionLetter) -> Option<Position> {
        self.positions.remove(&letter)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn positions(&self) -> &BTreeMap<OptionLetter, Position> {
        &self.positions
    }

    /// Write the store back to its file
    pub fn save(&self) -> Result<(), McqError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let raw: BTreeMap<&str, Position> = self
            .positions
            .iter()
            .map(|(letter, position)| (letter.as_str(), *position))
            .collect();
        let contents = toml::to_string_pretty(&raw)
            .map_err(|e| McqError::Config(format!("Failed to serialize calibration: {}", e)))?;

        std::fs::write(&self.path, contents)?;
        tracing::debug!("Saved {} positions to {:?}", raw.len(), self.path);
        Ok(())
    }
}

/// Resolves an answer letter to where it should be tapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateMap {
    positions: BTreeMap<OptionLetter, Position>,
    fallback: Position,
}

impl CoordinateMap {
    /// Default tap target for uncalibrated letters: the centre of a
    /// 1080x1920 portrait screen
    pub const DEFAULT_FALLBACK: Position = Position { x: 540, y: 960 };

    pub fn new(store: &CalibrationStore, fallback: Position) -> Self {
        Self {
            positions: store.positions().clone(),
            fallback,
        }
    }

    /// A map with no calibrated letters
    pub fn uncalibrated(fallback: Position) -> Self {
        Self {
            positions: BTreeMap::new(),
            fallback,
        }
    }

    /// Load the calibration file and fallback named by `config`
    pub fn from_config(config: &Config) -> Result<Self, McqError> {
        let store = CalibrationStore::load(&config.resolve_positions_path())?;
        let fallback = Position::new(config.click.fallback_x, config.click.fallback_y);
        Ok(Self::new(&store, fallback))
    }

    pub fn with_position(mut self, letter: OptionLetter, position: Position) -> Self {
        self.positions.insert(letter, position);
        self
    }

    /// Calibrated position for `letter`, else the fallback
    pub fn locate(&self, letter: OptionLetter) -> (i32, i32) {
        match self.positions.get(&letter) {
            Some(position) => (*position).into(),
            None => {
                tracing::debug!("{} is not calibrated, using fallback {:?}", letter, self.fallback);
                self.fallback.into()
            }
        }
    }

    /// Same as `locate` for unvalidated input such as a CLI argument
    pub fn locate_str(&self, letter: &str) -> Result<(i32, i32), DispatchError> {
        let letter = letter
            .parse::<OptionLetter>()
            .map_err(DispatchError::UnknownLetter)?;
        Ok(self.locate(letter))
    }

    pub fn is_calibrated(&self, letter: OptionLetter) -> bool {
        self.positions.contains_key(&letter)
    }

    pub fn fallback(&self) -> Position {
        self.fallback
    }
}

impl Default for CoordinateMap {
    fn default() -> Self {
        Self::uncalibrated(Self::DEFAULT_FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uncalibrated_returns_default() {
        let map = CoordinateMap::default();
        assert_eq!(map.locate(OptionLetter::A), (540, 960));
        assert!(!map.is_calibrated(OptionLetter::A));
    }

    #[test]
    fn test_calibrated_letter() {
        let map = CoordinateMap::default().with_position(OptionLetter::C, Position::new(300, 1400));
        assert_eq!(map.locate(OptionLetter::C), (300, 1400));
        assert_eq!(map.locate(OptionLetter::D), (540, 960));
    }

    #[test]
    fn test_locate_str() {
        let map = CoordinateMap::uncalibrated(Position::new(1, 2));
        assert_eq!(map.locate_str("b"), Ok((1, 2)));
        assert_eq!(
            map.locate_str("E"),
            Err(DispatchError::UnknownLetter("E".to_string()))
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = CalibrationStore::load(&temp.path().join("positions.toml")).unwrap();
        assert!(store.positions().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cfg").join("positions.toml");

        let mut store = CalibrationStore::load(&path).unwrap();
        store.set(OptionLetter::A, Position::new(540, 1210));
        store.set(OptionLetter::D, Position::new(540, 1630));
        store.save().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[A]"));

        let store = CalibrationStore::load(&path).unwrap();
        assert_eq!(store.get(OptionLetter::A), Some(Position::new(540, 1210)));
        assert_eq!(store.get(OptionLetter::B), None);

        let map = CoordinateMap::new(&store, CoordinateMap::DEFAULT_FALLBACK);
        assert_eq!(map.locate(OptionLetter::D), (540, 1630));
    }

    #[test]
    fn test_unknown_sections_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("positions.toml");
        std::fs::write(&path, "[b]\nx = 10\ny = 20\n\n[E]\nx = 1\ny = 1\n").unwrap();

        let store = CalibrationStore::load(&path).unwrap();
        assert_eq!(store.positions().len(), 1);
        assert_eq!(store.get(OptionLetter::B), Some(Position::new(10, 20)));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("positions.toml");
        std::fs::write(&path, "[A]\nx = \"left\"\n").unwrap();
        assert!(matches!(
            CalibrationStore::load(&path),
            Err(McqError::Config(_))
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let mut store = CalibrationStore::load(&temp.path().join("p.toml")).unwrap();
        store.set(OptionLetter::A, Position::new(1, 1));
        store.set(OptionLetter::B, Position::new(2, 2));
        assert_eq!(store.remove(OptionLetter::A), Some(Position::new(1, 1)));
        store.clear();
        assert!(store.positions().is_empty());
    }
}
