use std::io::{self, Write};

use linebot::TickReport;
use serde::Serialize;

use crate::track::Pose;

/// One line of telemetry: the engine's view of a frequent tick plus where the
/// simulated robot actually was.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Frame {
    #[serde(flatten)]
    pub report: TickReport,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl Frame {
    pub fn new(report: TickReport, pose: Pose) -> Self {
        Self {
            report,
            x: pose.position.x,
            y: pose.position.y,
            heading_deg: pose.heading.to_degrees(),
        }
    }
}

/// JSON-lines writer.
pub struct Telemetry<W: Write> {
    writer: W,
    frames: u64,
}

impl<W: Write> Telemetry<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    pub fn record(&mut self, frame: &Frame) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
