//! "Scraping" screen: pick a source, analyze it into a URL table, scrape the
//! checked rows and optionally save the run.

use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Cell, Paragraph, Row, Table, Wrap};
use tracing::{info, warn};

use interior_core::{
    DataSource, ScrapeReport, Session, SilentProgress, UrlOutcome, UrlTable, discover_page_links,
    discover_sitemap_urls, save_report, scrape_urls,
};
use interior_shared::{AppConfig, database_path};
use interior_storage::Storage;

use super::Ctx;
use crate::services::Services;
use crate::widgets::{Notice, Tone, button, checkbox, panel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Source,
    Input,
    Analyze,
    Table,
    Extract,
    Scrape,
    Result,
    Save,
}

impl Focus {
    const ORDER: [Focus; 8] = [
        Self::Source,
        Self::Input,
        Self::Analyze,
        Self::Table,
        Self::Extract,
        Self::Scrape,
        Self::Result,
        Self::Save,
    ];
}

/// Where a URL table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    source: DataSource,
    url: String,
}

/// A finished scrape and the table it was taken from.
#[derive(Debug, Clone)]
struct PendingRun {
    report: ScrapeReport,
    origin: Option<Origin>,
}

pub(crate) struct ScrapingScreen {
    focus: Focus,
    sitemap_input: String,
    page_input: String,
    /// Origin of the current URL table.
    analyzed: Option<Origin>,
    table_cursor: usize,
    checked: BTreeSet<usize>,
    extract: bool,
    /// Last scrape, until it is replaced or the table is re-analyzed.
    pending: Option<PendingRun>,
    result_text: String,
    result_scroll: u16,
    notices: Vec<Notice>,
}

impl ScrapingScreen {
    pub(crate) fn new(config: &AppConfig) -> Self {
        Self {
            focus: Focus::Source,
            sitemap_input: config.defaults.sitemap_url.clone(),
            page_input: config.defaults.page_url.clone(),
            analyzed: None,
            table_cursor: 0,
            checked: BTreeSet::new(),
            extract: true,
            pending: None,
            result_text: String::new(),
            result_scroll: 0,
            notices: Vec::new(),
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.focus == Focus::Input
    }

    fn input(&self, source: DataSource) -> &str {
        match source {
            DataSource::Sitemap => &self.sitemap_input,
            DataSource::Page => &self.page_input,
        }
    }

    fn input_mut(&mut self, source: DataSource) -> &mut String {
        match source {
            DataSource::Sitemap => &mut self.sitemap_input,
            DataSource::Page => &mut self.page_input,
        }
    }

    fn move_focus(&mut self, forward: bool) {
        let len = Focus::ORDER.len();
        let current = Focus::ORDER
            .iter()
            .position(|f| *f == self.focus)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.focus = Focus::ORDER[next];
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn analyze(&mut self, session: &mut Session, services: &Services) {
        let source = session.data_source;
        let input = self.input(source).trim().to_string();
        let result = match source {
            DataSource::Sitemap => services
                .runtime
                .block_on(discover_sitemap_urls(&input, &services.discovery_options())),
            DataSource::Page => services
                .runtime
                .block_on(discover_page_links(&services.crawler, &input)),
        };

        self.notices.clear();
        match result {
            Ok(table) => {
                let count = table.len();
                self.replace_table(session, Origin { source, url: input }, table);
                self.notices.push(Notice::new(
                    Tone::Success,
                    format!("Found {count} URL(s). Check the rows to scrape."),
                ));
            }
            Err(e) => {
                warn!(error = %e, "analyze failed");
                self.notices.push(Notice::new(Tone::Error, e.to_string()));
            }
        }
    }

    /// Install a freshly analyzed table; any earlier scrape is discarded.
    fn replace_table(&mut self, session: &mut Session, origin: Origin, table: UrlTable) {
        session.set_discovered(table);
        self.checked.clear();
        self.table_cursor = 0;
        self.analyzed = Some(origin);
        self.pending = None;
        self.result_text.clear();
        self.result_scroll = 0;
    }

    fn toggle_row(&mut self, session: &mut Session) {
        if self.table_cursor >= session.all_urls.len() {
            return;
        }
        if !self.checked.remove(&self.table_cursor) {
            self.checked.insert(self.table_cursor);
        }
        self.sync_selection(session);
    }

    fn toggle_all(&mut self, session: &mut Session) {
        let rows = session.all_urls.len();
        if self.checked.len() == rows {
            self.checked.clear();
        } else {
            self.checked = (0..rows).collect();
        }
        self.sync_selection(session);
    }

    fn sync_selection(&self, session: &mut Session) {
        let indices: Vec<usize> = self.checked.iter().copied().collect();
        session.select_urls(&indices);
    }

    fn scrape(&mut self, session: &Session, services: &Services) {
        if !session.can_scrape() {
            return;
        }
        self.notices.clear();

        let extractor = if self.extract {
            match services.extractor() {
                Ok(extractor) => Some(extractor),
                Err(e) => {
                    self.notices.push(Notice::new(
                        Tone::Warning,
                        format!("Scraping without extraction: {e}"),
                    ));
                    None
                }
            }
        } else {
            None
        };

        let urls = session.selected_urls.urls();
        let report = services.runtime.block_on(scrape_urls(
            &urls,
            &services.crawler,
            extractor.as_ref(),
            &SilentProgress,
        ));

        for message in report.failure_messages() {
            self.notices.push(Notice::new(Tone::Error, message));
        }
        self.notices.push(Notice::new(
            Tone::Info,
            format!(
                "Scraped {} of {} URL(s), {} product(s).",
                report.scraped_count(),
                report.outcomes.len(),
                report.products().len()
            ),
        ));

        self.finish_scrape(report);
    }

    fn finish_scrape(&mut self, report: ScrapeReport) {
        self.result_text = result_text(&report);
        self.result_scroll = 0;
        self.pending = Some(PendingRun {
            report,
            origin: self.analyzed.clone(),
        });
    }

    fn save(&mut self, services: &Services) {
        let Some(pending) = &self.pending else {
            return;
        };
        let (source, source_url) = pending.save_target();
        let result = database_path(&services.config).and_then(|path| {
            services.runtime.block_on(async {
                let storage = Storage::open(&path).await?;
                save_report(&storage, &pending.report, source, source_url).await
            })
        });

        let notice = match result {
            Ok(saved) => {
                info!(run_id = %saved.run_id, "run saved from tui");
                Notice::new(
                    Tone::Success,
                    format!(
                        "Saved run {} ({} pages, {} products).",
                        saved.run_id, saved.pages, saved.products
                    ),
                )
            }
            Err(e) => Notice::new(Tone::Error, format!("Save failed: {e}")),
        };
        self.notices.push(notice);
    }

    pub(crate) fn handle_key(
        &mut self,
        code: KeyCode,
        _modifiers: KeyModifiers,
        ctx: Ctx<'_>,
    ) -> Option<String> {
        match code {
            KeyCode::Tab => {
                self.move_focus(true);
                return None;
            }
            KeyCode::BackTab => {
                self.move_focus(false);
                return None;
            }
            _ => {}
        }

        let Ctx { session, services } = ctx;
        let before = self.notices.len();
        match (self.focus, code) {
            (Focus::Source, KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right) => {
                session.data_source = session.data_source.toggle();
            }
            (Focus::Input, KeyCode::Enter) => self.analyze(session, services),
            (Focus::Input, KeyCode::Backspace) => {
                self.input_mut(session.data_source).pop();
            }
            (Focus::Input, KeyCode::Char(c)) => self.input_mut(session.data_source).push(c),
            (Focus::Analyze, KeyCode::Enter) => {
                return Some(self.busy_then(|s| s.analyze(session, services)));
            }
            (Focus::Table, KeyCode::Up) => self.table_cursor = self.table_cursor.saturating_sub(1),
            (Focus::Table, KeyCode::Down) if self.table_cursor + 1 < session.all_urls.len() => {
                self.table_cursor += 1;
            }
            (Focus::Table, KeyCode::Char(' ') | KeyCode::Enter) => self.toggle_row(session),
            (Focus::Table, KeyCode::Char('a')) => self.toggle_all(session),
            (Focus::Extract, KeyCode::Enter | KeyCode::Char(' ')) => self.extract = !self.extract,
            (Focus::Scrape, KeyCode::Enter) => {
                return Some(self.busy_then(|s| s.scrape(session, services)));
            }
            (Focus::Result, KeyCode::Up) => self.result_scroll = self.result_scroll.saturating_sub(1),
            (Focus::Result, KeyCode::Down) => self.result_scroll = self.result_scroll.saturating_add(1),
            (Focus::Result, KeyCode::PageUp) => {
                self.result_scroll = self.result_scroll.saturating_sub(10);
            }
            (Focus::Result, KeyCode::PageDown) => {
                self.result_scroll = self.result_scroll.saturating_add(10);
            }
            (Focus::Save, KeyCode::Enter) => self.save(services),
            _ => {}
        }

        (self.notices.len() != before)
            .then(|| self.notices.last().map(|n| n.text.clone()))
            .flatten()
    }

    /// Run a blocking action and return the last notice it produced.
    fn busy_then(&mut self, action: impl FnOnce(&mut Self)) -> String {
        action(self);
        self.notices
            .last()
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &Session) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        let notice_height = (self.notices.len() as u16).clamp(1, 6);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),             // Source toggle
                Constraint::Length(3),             // URL input
                Constraint::Length(1),             // Analyze
                Constraint::Min(5),                // URL table
                Constraint::Length(1),             // Extract / scrape
                Constraint::Length(notice_height), // Notices
            ])
            .split(columns[0]);

        self.draw_source(f, left[0], session.data_source);

        let editing = self.focus == Focus::Input;
        let source = session.data_source;
        f.render_widget(
            Paragraph::new(self.input(source))
                .block(panel(input_title(source), editing, editing)),
            left[1],
        );
        f.render_widget(
            Paragraph::new(Line::from(button(
                "Analyze",
                self.focus == Focus::Analyze,
                !self.input(source).trim().is_empty(),
            ))),
            left[2],
        );

        self.draw_table(f, left[3], session);

        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(
                    format!("{} Extract products with Gemini", checkbox(self.extract)),
                    if self.focus == Focus::Extract {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    },
                ),
                Span::raw("  "),
                button("Scrape", self.focus == Focus::Scrape, session.can_scrape()),
            ])),
            left[4],
        );

        let notices: Vec<Line> = self.notices.iter().map(Notice::line).collect();
        f.render_widget(Paragraph::new(notices).wrap(Wrap { trim: true }), left[5]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(columns[1]);

        f.render_widget(
            Paragraph::new(self.result_text.as_str())
                .wrap(Wrap { trim: false })
                .scroll((self.result_scroll, 0))
                .block(panel("Scrape result", self.focus == Focus::Result, false)),
            right[0],
        );
        f.render_widget(
            Paragraph::new(Line::from(button(
                "Save to database",
                self.focus == Focus::Save,
                self.pending.is_some(),
            ))),
            right[1],
        );
    }

    fn draw_source(&self, f: &mut Frame, area: Rect, current: DataSource) {
        let mut spans = vec![Span::raw("Data source: ")];
        for source in DataSource::ALL {
            let marker = if source == current { "(•)" } else { "( )" };
            let mut style = Style::default();
            if source == current && self.focus == Focus::Source {
                style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
            }
            spans.push(Span::styled(format!("{marker} {}", source.label()), style));
            spans.push(Span::raw("  "));
        }
        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_table(&self, f: &mut Frame, area: Rect, session: &Session) {
        let focused = self.focus == Focus::Table;
        let header = Row::new(["", "URL", "Last modified"])
            .style(Style::default().add_modifier(Modifier::BOLD));

        let rows = session.all_urls.rows.iter().enumerate().map(|(i, row)| {
            let style = if focused && i == self.table_cursor {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Row::new([
                Cell::from(checkbox(self.checked.contains(&i))),
                Cell::from(row.url.as_str()),
                Cell::from(row.lastmod.as_deref().unwrap_or("")),
            ])
            .style(style)
        });

        let title = format!(
            "URLs ({} of {} selected, Space toggle, a all)",
            session.selected_urls.len(),
            session.all_urls.len()
        );
        let widths = [
            Constraint::Length(3),
            Constraint::Fill(1),
            Constraint::Length(26),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(panel(&title, focused, false));
        f.render_widget(table, area);
    }
}

impl PendingRun {
    /// Source kind and URL the run is saved under.
    fn save_target(&self) -> (DataSource, Option<&str>) {
        match &self.origin {
            Some(origin) => (origin.source, Some(origin.url.as_str())),
            None => (DataSource::default(), None),
        }
    }
}

fn input_title(source: DataSource) -> &'static str {
    match source {
        DataSource::Sitemap => "Sitemap URL (Enter to analyze)",
        DataSource::Page => "Page URL (Enter to analyze)",
    }
}

/// Combined Markdown followed by each URL's extracted products.
fn result_text(report: &ScrapeReport) -> String {
    let mut text = report.combined_markdown();
    for outcome in &report.outcomes {
        if let UrlOutcome::Scraped {
            url,
            extraction: Some(extraction),
            extraction_error,
            ..
        } = outcome
        {
            text.push_str(&format!("LLM: {url}\n\n{}\n\n", extraction.extracted_content()));
            if let Some(error) = extraction_error {
                text.push_str(&format!("Extraction failed: {error}\n\n"));
            }
        }
    }
    text
}
