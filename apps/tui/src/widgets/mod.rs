//! Reusable TUI widgets.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Tone of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Self::Info => Color::White,
            Self::Success => Color::Green,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
        }
    }
}

/// A message shown under a screen's controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    pub tone: Tone,
    pub text: String,
}

impl Notice {
    pub(crate) fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    pub(crate) fn line(&self) -> Line<'_> {
        Line::from(self.text.as_str()).style(Style::default().fg(self.tone.color()))
    }
}

/// Bottom status bar.
pub(crate) fn status_bar(msg: &str) -> Paragraph<'_> {
    Paragraph::new(format!(" {msg}")).style(Style::default().bg(Color::DarkGray).fg(Color::White))
}

/// Border style for a focusable widget.
pub(crate) fn focus_style(focused: bool, editing: bool) -> Style {
    match (focused, editing) {
        (true, true) => Style::default().fg(Color::Yellow),
        (true, false) => Style::default().fg(Color::Cyan),
        _ => Style::default(),
    }
}

/// Bordered block with a focus-aware border.
pub(crate) fn panel(title: &str, focused: bool, editing: bool) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "))
        .border_style(focus_style(focused, editing))
}

/// `[ label ]` button span; dimmed when disabled.
pub(crate) fn button(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let style = if !enabled {
        Style::default().fg(Color::DarkGray)
    } else if focused {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Cyan)
    };
    Span::styled(format!("[ {label} ]"), style)
}

pub(crate) fn checkbox(checked: bool) -> &'static str {
    if checked { "[x]" } else { "[ ]" }
}

/// Chip row: each option with its checkbox, the cursor chip underlined.
pub(crate) fn chips<'a>(
    options: impl IntoIterator<Item = &'a str>,
    selected: &[bool],
    cursor: Option<usize>,
) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (i, option) in options.into_iter().enumerate() {
        let checked = selected.get(i).copied().unwrap_or(false);
        let mut style = if checked {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        if cursor == Some(i) {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(format!("{} {option}", checkbox(checked)), style));
        spans.push(Span::raw("  "));
    }
    spans
}

/// Text slider for a two-handle range, `width` cells wide.
pub(crate) fn range_track(min: i64, max: i64, low: i64, high: i64, width: usize) -> String {
    let width = width.max(2);
    let (min, max) = (min.min(max), min.max(max));
    let span = (max - min).max(1) as f64;
    let pos = |v: i64| {
        let ratio = ((v.clamp(min, max) - min) as f64 / span).clamp(0.0, 1.0);
        (ratio * (width - 1) as f64).round() as usize
    };
    let (lo, hi) = (pos(low.min(high)), pos(low.max(high)));

    (0..width)
        .map(|i| {
            if i == lo || i == hi {
                '●'
            } else if i > lo && i < hi {
                '━'
            } else {
                '─'
            }
        })
        .collect()
}
