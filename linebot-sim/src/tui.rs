use color_eyre::eyre::{self, Context};
use color_eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    symbols::border,
    widgets::{
        block::{Position, Title},
        Block, Borders,
    },
};
use std::{
    io::{self, stdout, Stdout},
    panic,
    time::Duration,
};

use linebot_sim::Simulation;

use self::widgets::{PanelWidget, TrackWidget};

mod widgets;

/// Wall-clock time between redraws.
const FRAME: Duration = Duration::from_millis(33);
const MAX_CYCLES_PER_FRAME: u32 = 64;

pub(crate) fn run(sim: Simulation, limit: Duration) -> Result<Simulation> {
    let mut terminal = init()?;
    let mut app = App::new(sim, limit);
    app.run(&mut terminal)?;
    restore()?;
    Ok(app.sim)
}

pub struct App {
    sim: Simulation,
    /// Simulated time at which the run is stopped.
    deadline: Duration,
    cycles_per_frame: u32,
    paused: bool,
    exit: bool,
}

impl App {
    pub fn new(sim: Simulation, limit: Duration) -> Self {
        Self {
            deadline: sim.deadline(limit),
            sim,
            cycles_per_frame: 4,
            paused: false,
            exit: false,
        }
    }

    /// runs the application's main loop until the user quits
    pub fn run(&mut self, terminal: &mut Tui) -> Result<()> {
        while !self.exit {
            terminal.draw(|frame| self.render_frame(frame))?;
            self.handle_events().wrap_err("handle events failed")?;
            if !self.paused {
                self.advance().wrap_err("simulation step failed")?;
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        for _ in 0..self.cycles_per_frame {
            if self.sim.finished().is_some() {
                break;
            }
            self.sim.step_until(self.deadline)?;
        }
        Ok(())
    }

    fn render_frame(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.size())
    }

    fn handle_events(&mut self) -> Result<()> {
        if !event::poll(FRAME)? {
            return Ok(());
        }
        match event::read()? {
            // crossterm also emits key release and repeat events on Windows
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => self
                .handle_key_event(key_event)
                .wrap_err_with(|| format!("handling key event failed:\n{key_event:#?}")),
            _ => Ok(()),
        }
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) -> Result<()> {
        match key_event.code {
            KeyCode::Char('q') => self.exit(),
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('+') => {
                self.cycles_per_frame = (self.cycles_per_frame * 2).min(MAX_CYCLES_PER_FRAME)
            }
            KeyCode::Char('-') => self.cycles_per_frame = (self.cycles_per_frame / 2).max(1),
            KeyCode::Enter if self.paused => self.sim.step_until(self.deadline)?,
            _ => {}
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.exit = true;
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(area);

        let title = Title::from(format!(" {} ", self.sim.world().track().name).bold());
        let instructions = Title::from(Line::from(vec![
            " Pause ".into(),
            "<Space>".blue().bold(),
            " Step ".into(),
            "<Enter>".blue().bold(),
            " Speed ".into(),
            "<+/->".blue().bold(),
            " Quit ".into(),
            "<Q> ".blue().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL)
            .border_set(border::THICK);

        TrackWidget::new(self.sim.world(), self.sim.last_report())
            .block(block)
            .render(layout[0], buf);
        PanelWidget::new(&self.sim, self.paused, self.cycles_per_frame).render(layout[1], buf);
    }
}

/// A type alias for the terminal type used in this application
pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Initialize the terminal
pub fn init() -> Result<Tui> {
    install_hooks()?;
    execute!(stdout(), EnterAlternateScreen)?;
    enable_raw_mode()?;
    Ok(Terminal::new(CrosstermBackend::new(stdout()))?)
}

/// Restore the terminal to its original state
pub fn restore() -> io::Result<()> {
    execute!(stdout(), LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// This replaces the standard color_eyre panic and error hooks with hooks that
/// restore the terminal before printing the panic or error.
pub fn install_hooks() -> color_eyre::Result<()> {
    let hook_builder = color_eyre::config::HookBuilder::default();
    let (panic_hook, eyre_hook) = hook_builder.into_hooks();

    // convert from a color_eyre PanicHook to a standard panic hook
    let panic_hook = panic_hook.into_panic_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        panic_hook(panic_info);
    }));

    // convert from a color_eyre EyreHook to a eyre ErrorHook
    let eyre_hook = eyre_hook.into_eyre_hook();
    eyre::set_hook(Box::new(move |error| {
        let _ = restore();
        eyre_hook(error)
    }))?;

    Ok(())
}
