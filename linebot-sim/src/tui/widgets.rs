use linebot::scheduler::{Mode, TickAction};
use linebot::symbol::{Channel, Tri};
use linebot::TickReport;
use ratatui::prelude::*;
use ratatui::symbols::{border, Marker};
use ratatui::widgets::block::Title;
use ratatui::widgets::canvas::{Canvas, Circle, Line as CanvasLine, Points};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};

use linebot_sim::Simulation;
use linebot_sim::world::SimWorld;

/// Margin around the track, in cm.
const PADDING: f64 = 15.0;

pub struct TrackWidget<'a> {
    world: &'a SimWorld,
    report: Option<&'a TickReport>,
    block: Option<Block<'a>>,
}

impl<'a> TrackWidget<'a> {
    pub fn new(world: &'a SimWorld, report: Option<&'a TickReport>) -> Self {
        Self {
            world,
            report,
            block: None,
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

fn sensor_color(state: Option<Tri>) -> Color {
    match state {
        Some(Tri::Black) => Color::Green,
        Some(Tri::White) => Color::Gray,
        Some(Tri::Unknown) => Color::Magenta,
        None => Color::DarkGray,
    }
}

impl Widget for TrackWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        let world = self.world;
        let track = world.track();
        let (min, max) = track.bounds();
        let pose = world.pose();
        let nose = world.bumper_position();

        let canvas = Canvas::default()
            .marker(Marker::Braille)
            .x_bounds([min.x.min(pose.position.x) - PADDING, max.x.max(pose.position.x) + PADDING])
            .y_bounds([min.y.min(pose.position.y) - PADDING, max.y.max(pose.position.y) + PADDING])
            .paint(|ctx| {
                for (a, b) in track.segments() {
                    ctx.draw(&CanvasLine {
                        x1: a.x,
                        y1: a.y,
                        x2: b.x,
                        y2: b.y,
                        color: Color::White,
                    });
                }
                for obstacle in track.obstacles() {
                    ctx.draw(&Circle {
                        x: obstacle.x,
                        y: obstacle.y,
                        radius: obstacle.radius,
                        color: Color::Red,
                    });
                }
                ctx.layer();
                ctx.draw(&CanvasLine {
                    x1: pose.position.x,
                    y1: pose.position.y,
                    x2: nose.x,
                    y2: nose.y,
                    color: Color::Yellow,
                });
                for channel in Channel::ALL {
                    let p = world.sensor_position(channel);
                    let state = self.report.map(|report| report.symbol.get(channel));
                    ctx.draw(&Points {
                        coords: &[(p.x, p.y)],
                        color: sensor_color(state),
                    });
                }
            });
        match self.block {
            Some(block) => canvas.block(block).render(area, buf),
            None => canvas.render(area, buf),
        }
    }
}

pub struct PanelWidget<'a> {
    sim: &'a Simulation,
    paused: bool,
    cycles_per_frame: u32,
}

impl<'a> PanelWidget<'a> {
    pub fn new(sim: &'a Simulation, paused: bool, cycles_per_frame: u32) -> Self {
        Self {
            sim,
            paused,
            cycles_per_frame,
        }
    }

    fn state_lines(&self) -> Vec<Line<'static>> {
        let world = self.sim.world();
        let scheduler = self.sim.runtime().scheduler();
        let stats = scheduler.stats();
        let mode = match scheduler.mode() {
            Mode::Following => "following".to_string(),
            Mode::Searching(ctx) => format!("search #{} {:?}", ctx.iteration, ctx.phase),
        };

        let mut lines = vec![
            Line::from(vec![
                "Time: ".into(),
                format!("{:.1}s", world.time().as_secs_f64()).yellow(),
            ]),
            Line::from(vec!["Mode: ".into(), mode.yellow()]),
            Line::from(format!("Angle: {}", scheduler.steering().angle())),
        ];
        if let Some(report) = self.sim.last_report() {
            lines.push(Line::from(format!("Symbol: {}", report.symbol)));
            lines.push(Line::from(format!("Pattern: {:?}", report.pattern)));
            lines.push(Line::from(describe(&report.action)));
        }
        lines.push(Line::from(format!(
            "Ticks {}  Searches {}  Hits {}",
            stats.frequent_ticks, stats.searches, stats.obstacles
        )));
        lines.push(Line::from(format!("Odometer: {:.0} cm", world.odometer_cm())));
        lines.push(Line::from(format!(
            "Speed: x{}{}",
            self.cycles_per_frame,
            if self.paused { " (paused)" } else { "" }
        )));
        match self.sim.finished() {
            Some(Ok(summary)) => {
                lines.push(Line::from(format!("Stopped: {:?}", summary.reason).green()))
            }
            Some(Err(error)) => lines.push(Line::from(error.to_string().red())),
            None => {}
        }
        lines
    }
}

fn describe(action: &TickAction) -> String {
    match action {
        TickAction::Steer { angle } => format!("Steer {angle}"),
        TickAction::SharpTurn { direction } => format!("Sharp turn {direction:?}"),
        TickAction::WideMark { policy } => format!("Wide mark: {policy:?}"),
        TickAction::Maneuvering => "Maneuvering".to_string(),
        TickAction::Searching { iteration, phase } => format!("Searching #{iteration} {phase:?}"),
    }
}

impl Widget for PanelWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(10), Constraint::Min(0)])
            .split(area);

        let lcd = Text::from(
            self.sim
                .world()
                .lcd()
                .lines()
                .iter()
                .map(|line| Line::from(line.clone()))
                .collect::<Vec<Line>>(),
        );
        let lcd_block = Block::default()
            .title(Title::from(" LCD ".bold()).alignment(Alignment::Center))
            .borders(Borders::ALL)
            .border_set(border::THICK);
        Paragraph::new(lcd).block(lcd_block).render(layout[0], buf);

        let state_block = Block::default()
            .title(Title::from(" Engine ".bold()).alignment(Alignment::Center))
            .borders(Borders::ALL)
            .border_set(border::THICK);
        Paragraph::new(Text::from(self.state_lines()))
            .block(state_block)
            .render(layout[1], buf);
    }
}
