//! TUI screen definitions.
//!
//! Each screen corresponds to a sidebar entry and encapsulates its own
//! widget state and rendering. Session data lives in [`Session`] and is
//! passed in on every key press.

mod furniture;
mod pdf;
mod scraping;

use std::fmt;

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::prelude::*;

use interior_core::Session;

use crate::services::Services;

/// Screen identifiers, in sidebar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScreenId {
    Furniture,
    Scraping,
    PdfExtraction,
}

impl ScreenId {
    pub(crate) const ALL: [ScreenId; 3] = [Self::Furniture, Self::Scraping, Self::PdfExtraction];

    /// Sidebar group heading shown above this entry, if it opens a group.
    pub(crate) fn group(self) -> Option<&'static str> {
        match self {
            Self::Furniture => None,
            Self::Scraping => Some("Product data"),
            Self::PdfExtraction => None,
        }
    }

    /// Whether the entry sits inside a sidebar group.
    pub(crate) fn nested(self) -> bool {
        matches!(self, Self::Scraping | Self::PdfExtraction)
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Furniture => write!(f, "Furniture selection"),
            Self::Scraping => write!(f, "Scraping"),
            Self::PdfExtraction => write!(f, "PDF extraction"),
        }
    }
}

/// What a screen needs to act on a key press.
pub(crate) struct Ctx<'a> {
    pub session: &'a mut Session,
    pub services: &'a Services,
}

/// Per-screen state and behaviour.
pub(crate) struct Screens {
    furniture: furniture::FurnitureScreen,
    scraping: scraping::ScrapingScreen,
    pdf: pdf::PdfScreen,
}

impl Screens {
    pub(crate) fn new(session: &Session, services: &Services) -> Self {
        Self {
            furniture: furniture::FurnitureScreen::new(session.schema()),
            scraping: scraping::ScrapingScreen::new(&services.config),
            pdf: pdf::PdfScreen,
        }
    }

    /// Whether the screen has an active text input field.
    pub(crate) fn is_editing(&self, id: ScreenId) -> bool {
        match id {
            ScreenId::Furniture => self.furniture.is_editing(),
            ScreenId::Scraping => self.scraping.is_editing(),
            ScreenId::PdfExtraction => false,
        }
    }

    pub(crate) fn draw(&self, id: ScreenId, f: &mut Frame, area: Rect, session: &Session) {
        match id {
            ScreenId::Furniture => self.furniture.draw(f, area, session),
            ScreenId::Scraping => self.scraping.draw(f, area, session),
            ScreenId::PdfExtraction => self.pdf.draw(f, area),
        }
    }

    /// Handle a key; returns a status-bar message when the screen has one.
    pub(crate) fn handle_key(
        &mut self,
        id: ScreenId,
        code: KeyCode,
        modifiers: KeyModifiers,
        ctx: Ctx<'_>,
    ) -> Option<String> {
        match id {
            ScreenId::Furniture => self.furniture.handle_key(code, modifiers, ctx),
            ScreenId::Scraping => self.scraping.handle_key(code, modifiers, ctx),
            ScreenId::PdfExtraction => None,
        }
    }
}
