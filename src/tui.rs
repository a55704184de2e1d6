use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};

use ratemeter::estimator::Snapshot;
use ratemeter::reporter::{render_line, render_rate};

const HISTORY: usize = 100;

/// Undoes whatever terminal setup succeeded, on every exit path.
#[derive(Default)]
struct TerminalGuard {
    raw: bool,
    alternate: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        let mut guard = Self::default();
        enable_raw_mode()?;
        guard.raw = true;
        execute!(std::io::stdout(), EnterAlternateScreen)?;
        guard.alternate = true;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.alternate {
            let _ = execute!(std::io::stdout(), LeaveAlternateScreen, cursor::Show);
        }
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

pub fn run_overlay(reports: Receiver<Vec<Snapshot>>, stop: Arc<AtomicBool>, unit: &str) -> Result<()> {
    let _restore = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut latest: Vec<Snapshot> = Vec::new();
    let mut history: Vec<String> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        while let Ok(batch) = reports.try_recv() {
            for snap in &batch {
                history.push(render_line(snap, unit));
            }
            if history.len() > HISTORY {
                history.drain(..history.len() - HISTORY);
            }
            latest = batch;
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Length(5), Constraint::Min(0), Constraint::Length(1)].as_ref())
                .split(f.size());

            // Headline rate, like the in-page fps overlay
            let headline = latest
                .iter()
                .map(|s| format!("{}: {}", s.name, render_rate(&s.estimate, unit)))
                .collect::<Vec<_>>()
                .join("   ");
            let headline = if headline.is_empty() { format!("- {unit}") } else { headline };
            let rate = Paragraph::new(headline).block(Block::default().title("Rate").borders(Borders::ALL));
            f.render_widget(rate, chunks[0]);

            let details = latest
                .iter()
                .map(|s| {
                    format!(
                        "{} | phase: {} | N: {} | samples: {} | calibrations: {}",
                        s.name,
                        s.phase,
                        s.decay_samples.map_or_else(|| "-".to_string(), |n| n.to_string()),
                        s.samples,
                        s.calibrations,
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            let details = Paragraph::new(details).block(Block::default().title("Estimator").borders(Borders::ALL));
            f.render_widget(details, chunks[1]);

            let viewport = chunks[2].height.saturating_sub(2) as usize;
            let start = history.len().saturating_sub(viewport);
            let items: Vec<ListItem> = history.iter().skip(start).map(|l| ListItem::new(l.clone())).collect();
            let list = List::new(items).block(Block::default().title("Reports").borders(Borders::ALL));
            f.render_widget(list, chunks[2]);

            f.render_widget(Paragraph::new("q: quit | c: clear reports"), chunks[3]);
        })?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                } else if key.code == KeyCode::Char('c') {
                    history.clear();
                }
            }
        }
    }

    Ok(())
}
