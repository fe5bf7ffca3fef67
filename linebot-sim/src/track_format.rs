use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackFile {
    #[serde(default)]
    pub metadata: TrackMetadata,
    pub control_points: Vec<[f64; 2]>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackMetadata {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub author: String,
    /// Width of the black tape, in cm.
    #[serde(default = "default_line_width")]
    pub line_width: f64,
    /// Join the last control point back to the first.
    #[serde(default)]
    pub closed: bool,
}

/// A round obstacle the bumper can hit.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ObstacleSpec {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_obstacle_radius")]
    pub radius: f64,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            author: String::new(),
            line_width: default_line_width(),
            closed: false,
        }
    }
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_line_width() -> f64 {
    1.8
}

fn default_obstacle_radius() -> f64 {
    5.0
}

/// Tracks shipped with the simulator, by name.
pub const BUILTIN_TRACKS: [(&str, &str); 2] = [
    ("oval", include_str!("../tracks/oval.toml")),
    ("straight", include_str!("../tracks/straight.toml")),
];

impl TrackFile {
    /// Create a new empty track with default metadata.
    pub fn new_empty(name: &str) -> Self {
        Self {
            metadata: TrackMetadata {
                name: name.to_string(),
                ..TrackMetadata::default()
            },
            control_points: Vec::new(),
            obstacles: Vec::new(),
        }
    }

    /// Load a track from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// Parse a track from TOML text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let track: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        if track.control_points.len() < 2 {
            return Err("a track needs at least two control points".to_string());
        }
        Ok(track)
    }

    /// Look up one of the [`BUILTIN_TRACKS`].
    pub fn builtin(name: &str) -> Result<Self, String> {
        let (_, text) = BUILTIN_TRACKS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| format!("No builtin track named {name}"))?;
        Self::parse(text)
    }

    /// Save this track to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize track: {}", e))?;
        std::fs::write(path, text)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }
}
