use std::ops::{Add, Mul, Sub};

use crate::track_format::{ObstacleSpec, TrackFile};

/// A point or vector on the floor, in cm.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn from_heading(heading: f64) -> Self {
        Self::new(heading.cos(), heading.sin())
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Point) -> f64 {
        (self - other).length()
    }

    /// Rotated a quarter turn counter-clockwise.
    pub fn perp(self) -> Point {
        Point::new(-self.y, self.x)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Robot position (axle midpoint) and heading in radians, counter-clockwise
/// from the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Point,
    pub heading: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            position: Point::new(x, y),
            heading,
        }
    }

    /// A point given in robot coordinates: `forward` along the heading,
    /// `left` to its left.
    pub fn offset(&self, forward: f64, left: f64) -> Point {
        let ahead = Point::from_heading(self.heading);
        self.position + ahead * forward + ahead.perp() * left
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    points: Vec<Point>,
    closed: bool,
    line_width: f64,
    obstacles: Vec<ObstacleSpec>,
}

impl Track {
    pub fn new(points: Vec<Point>, closed: bool, line_width: f64) -> Self {
        Self {
            name: "Untitled".to_string(),
            points,
            closed,
            line_width,
            obstacles: Vec::new(),
        }
    }

    pub fn from_file(file: &TrackFile) -> Self {
        Self {
            name: file.metadata.name.clone(),
            points: file.control_points.iter().map(|&[x, y]| Point::new(x, y)).collect(),
            closed: file.metadata.closed,
            line_width: file.metadata.line_width,
            obstacles: file.obstacles.clone(),
        }
    }

    pub fn with_obstacle(mut self, obstacle: ObstacleSpec) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn obstacles(&self) -> &[ObstacleSpec] {
        &self.obstacles
    }

    /// Line segments in drawing order, including the closing one.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let closing = match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(&first), Some(&last)) if self.points.len() > 2 => Some((last, first)),
            _ => None,
        };
        self.points.windows(2).map(|w| (w[0], w[1])).chain(closing)
    }

    /// Distance from `p` to the center of the nearest stretch of line.
    pub fn distance_to_line(&self, p: Point) -> f64 {
        self.segments()
            .map(|(a, b)| distance_to_segment(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(b)).sum()
    }

    /// On the first point, facing along the first segment.
    pub fn start_pose(&self) -> Pose {
        match self.points.as_slice() {
            [first, second, ..] => {
                let dir = *second - *first;
                Pose::new(first.x, first.y, dir.y.atan2(dir.x))
            }
            [only] => Pose::new(only.x, only.y, 0.0),
            [] => Pose::default(),
        }
    }

    pub fn obstacle_at(&self, p: Point) -> Option<&ObstacleSpec> {
        self.obstacle_within(p, 0.0)
    }

    /// First obstacle whose edge is no more than `margin` away from `p`.
    pub fn obstacle_within(&self, p: Point, margin: f64) -> Option<&ObstacleSpec> {
        self.obstacles
            .iter()
            .find(|o| p.distance(Point::new(o.x, o.y)) <= o.radius + margin)
    }

    /// Lower-left and upper-right corner around line and obstacles.
    pub fn bounds(&self) -> (Point, Point) {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let obstacle_extents = self.obstacles.iter().flat_map(|o| {
            [
                Point::new(o.x - o.radius, o.y - o.radius),
                Point::new(o.x + o.radius, o.y + o.radius),
            ]
        });
        for p in self.points.iter().copied().chain(obstacle_extents) {
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        if self.points.is_empty() && self.obstacles.is_empty() {
            return (Point::default(), Point::default());
        }
        (min, max)
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}
