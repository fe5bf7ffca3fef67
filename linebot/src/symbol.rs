use std::fmt;

use serde::{Deserialize, Serialize};

/// Sensor slot on the robot's front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Left,
    Right,
    Center,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Left, Channel::Right, Channel::Center];

    pub const fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
            Channel::Center => 2,
        }
    }

    pub const fn label(self) -> char {
        match self {
            Channel::Left => 'L',
            Channel::Right => 'R',
            Channel::Center => 'C',
        }
    }
}

/// Classification of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tri {
    Black,
    White,
    #[default]
    Unknown,
}

impl Tri {
    pub fn is_black(self) -> bool {
        self == Tri::Black
    }

    pub fn is_white(self) -> bool {
        self == Tri::White
    }

    pub const fn glyph(self) -> char {
        match self {
            Tri::Black => 'B',
            Tri::White => 'W',
            Tri::Unknown => '?',
        }
    }
}

/// Raw intensities of one sample, indexed by [`Channel::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readings([i32; 3]);

impl Readings {
    pub const fn new(left: i32, right: i32, center: i32) -> Self {
        Self([left, right, center])
    }

    pub fn get(&self, channel: Channel) -> i32 {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: i32) {
        self.0[channel.index()] = value;
    }

    pub fn left(&self) -> i32 {
        self.get(Channel::Left)
    }

    pub fn right(&self) -> i32 {
        self.get(Channel::Right)
    }

    pub fn center(&self) -> i32 {
        self.get(Channel::Center)
    }
}

/// One classified sample across all channels.
///
/// Two symbols are considered the same event when their tri-states match;
/// the raw readings ride along for display and pattern analysis only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    states: [Tri; 3],
    readings: Readings,
}

impl Symbol {
    pub const fn new(left: Tri, right: Tri, center: Tri, readings: Readings) -> Self {
        Self {
            states: [left, right, center],
            readings,
        }
    }

    pub(crate) fn from_parts(states: [Tri; 3], readings: Readings) -> Self {
        Self { states, readings }
    }

    pub fn get(&self, channel: Channel) -> Tri {
        self.states[channel.index()]
    }

    pub fn left(&self) -> Tri {
        self.get(Channel::Left)
    }

    pub fn right(&self) -> Tri {
        self.get(Channel::Right)
    }

    pub fn center(&self) -> Tri {
        self.get(Channel::Center)
    }

    pub fn readings(&self) -> Readings {
        self.readings
    }

    pub fn any_black(&self) -> bool {
        self.states.iter().any(|s| s.is_black())
    }

    pub fn all_white(&self) -> bool {
        self.states.iter().all(|s| s.is_white())
    }

    /// No channel gave a usable reading.
    pub fn is_ambiguous(&self) -> bool {
        self.states.iter().all(|s| *s == Tri::Unknown)
    }

    /// Tri-state equality, ignoring raw readings.
    pub fn same_states(&self, other: &Symbol) -> bool {
        self.states == other.states
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L:{} R:{} C:{}",
            self.left().glyph(),
            self.right().glyph(),
            self.center().glyph()
        )
    }
}
