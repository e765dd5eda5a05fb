//! "PDF extraction" screen placeholder.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

pub(crate) struct PdfScreen;

impl PdfScreen {
    pub(crate) fn draw(&self, f: &mut Frame, area: Rect) {
        let text = Paragraph::new("PDF extraction is not implemented yet.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" PDF extraction "));
        f.render_widget(text, area);
    }
}
