//! "Furniture selection" screen: condition form, saved-condition table,
//! search and chat.

use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Cell, Paragraph, Row, Table, Wrap};

use interior_core::conditions::{ChoiceGroup, FieldKind};
use interior_core::{
    ConditionDraft, ConditionSchema, ConditionValue, SampleRecommender, Session, validate,
};

use super::Ctx;
use crate::widgets::{Notice, Tone, button, checkbox, chips, panel, range_track};

// ---------------------------------------------------------------------------
// Form inputs
// ---------------------------------------------------------------------------

/// Widget state for one condition field.
#[derive(Debug, Clone)]
enum FieldInput {
    Chips {
        options: Vec<String>,
        selected: Vec<bool>,
        cursor: usize,
    },
    Cascade {
        groups: Vec<ChoiceGroup>,
        /// Flattened over every group's children.
        selected: Vec<bool>,
        cursor: usize,
    },
    Range {
        min: i64,
        max: i64,
        step: i64,
        low: i64,
        high: i64,
        /// Arrow keys move the high handle when set.
        high_active: bool,
    },
    Text {
        value: String,
    },
}

impl FieldInput {
    fn from_kind(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Choices { options } => Self::Chips {
                options: options.clone(),
                selected: vec![false; options.len()],
                cursor: 0,
            },
            FieldKind::Cascade { groups } => Self::Cascade {
                selected: vec![false; kind.options().len()],
                groups: groups.clone(),
                cursor: 0,
            },
            FieldKind::Range { min, max, step } => Self::Range {
                min: *min,
                max: *max,
                step: (*step).max(1),
                low: *min,
                high: *max,
                high_active: false,
            },
            FieldKind::Text => Self::Text {
                value: String::new(),
            },
        }
    }

    fn value(&self) -> ConditionValue {
        match self {
            Self::Chips {
                options, selected, ..
            } => ConditionValue::list(picked(options.iter(), selected)),
            Self::Cascade {
                groups, selected, ..
            } => ConditionValue::list(picked(
                groups.iter().flat_map(|g| g.children.iter()),
                selected,
            )),
            Self::Range { low, high, .. } => ConditionValue::Range(*low, *high),
            Self::Text { value } => ConditionValue::Text(value.clone()),
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match self {
            Self::Chips {
                selected, cursor, ..
            }
            | Self::Cascade {
                selected, cursor, ..
            } => match code {
                KeyCode::Left => *cursor = cursor.saturating_sub(1),
                KeyCode::Right if *cursor + 1 < selected.len() => *cursor += 1,
                KeyCode::Char(' ') | KeyCode::Enter => {
                    if let Some(flag) = selected.get_mut(*cursor) {
                        *flag = !*flag;
                    }
                }
                _ => {}
            },
            Self::Range {
                min,
                max,
                step,
                low,
                high,
                high_active,
            } => match code {
                KeyCode::Char(' ') | KeyCode::Enter => *high_active = !*high_active,
                KeyCode::Left if *high_active => *high = (*high - *step).max(*low),
                KeyCode::Right if *high_active => *high = (*high + *step).min(*max),
                KeyCode::Left => *low = (*low - *step).max(*min),
                KeyCode::Right => *low = (*low + *step).min(*high),
                _ => {}
            },
            Self::Text { value } => match code {
                KeyCode::Backspace => {
                    value.pop();
                }
                KeyCode::Char(c) => value.push(c),
                _ => {}
            },
        }
    }

    fn line(&self, focused: bool, width: usize) -> Line<'static> {
        match self {
            Self::Chips {
                options,
                selected,
                cursor,
            } => Line::from(chips(
                options.iter().map(String::as_str),
                selected,
                focused.then_some(*cursor),
            )),
            Self::Cascade {
                groups,
                selected,
                cursor,
            } => {
                let mut spans = Vec::new();
                let mut offset = 0;
                for group in groups {
                    let len = group.children.len();
                    let cursor = (focused && (offset..offset + len).contains(cursor))
                        .then(|| cursor - offset);
                    spans.push(Span::styled(
                        format!("{} › ", group.label),
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                    spans.extend(chips(
                        group.children.iter().map(String::as_str),
                        &selected[offset..offset + len],
                        cursor,
                    ));
                    offset += len;
                }
                Line::from(spans)
            }
            Self::Range {
                min,
                max,
                low,
                high,
                high_active,
                ..
            } => {
                let handle = |active: bool| {
                    if focused && active {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    }
                };
                Line::from(vec![
                    Span::styled(format!("{low} mm"), handle(!high_active)),
                    Span::raw(format!(" {} ", range_track(*min, *max, *low, *high, width))),
                    Span::styled(format!("{high} mm"), handle(*high_active)),
                ])
            }
            Self::Text { value } => Line::from(value.clone()),
        }
    }
}

fn picked<'a>(options: impl Iterator<Item = &'a String>, selected: &[bool]) -> Vec<String> {
    options
        .zip(selected)
        .filter(|(_, on)| **on)
        .map(|(option, _)| option.clone())
        .collect()
}

#[derive(Debug, Clone)]
struct FormField {
    key: String,
    label: String,
    input: FieldInput,
}

// ---------------------------------------------------------------------------
// Screen
// ---------------------------------------------------------------------------

/// Focusable parts of the screen, in Tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Field(usize),
    Save,
    Table,
    Delete,
    Search,
    Chat,
}

pub(crate) struct FurnitureScreen {
    fields: Vec<FormField>,
    focus: Focus,
    /// Row cursor in the condition table.
    table_cursor: usize,
    /// Checked rows in the condition table.
    checked: BTreeSet<usize>,
    chat: String,
    answer: String,
    notice: Option<Notice>,
}

impl FurnitureScreen {
    pub(crate) fn new(schema: &ConditionSchema) -> Self {
        let fields = schema
            .fields
            .iter()
            .map(|field| FormField {
                key: field.key.clone(),
                label: field.label.clone(),
                input: FieldInput::from_kind(&field.kind),
            })
            .collect();

        Self {
            fields,
            focus: Focus::Field(0),
            table_cursor: 0,
            checked: BTreeSet::new(),
            chat: String::new(),
            answer: String::new(),
            notice: None,
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        match self.focus {
            Focus::Chat => true,
            Focus::Field(i) => matches!(
                self.fields.get(i).map(|f| &f.input),
                Some(FieldInput::Text { .. })
            ),
            _ => false,
        }
    }

    fn draft(&self) -> ConditionDraft {
        let mut draft = ConditionDraft::new();
        for field in &self.fields {
            draft.set(&field.key, field.input.value());
        }
        draft
    }

    fn focus_order(&self) -> Vec<Focus> {
        let mut order: Vec<Focus> = (0..self.fields.len()).map(Focus::Field).collect();
        order.extend([Focus::Save, Focus::Table, Focus::Delete, Focus::Search, Focus::Chat]);
        order
    }

    fn move_focus(&mut self, forward: bool) {
        let order = self.focus_order();
        let current = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % order.len()
        } else {
            (current + order.len() - 1) % order.len()
        };
        self.focus = order[next];
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    fn save_condition(&mut self, session: &mut Session) {
        self.notice = Some(match session.add_condition(&self.draft()) {
            Ok(()) => Notice::new(Tone::Success, "Condition saved."),
            Err(e) => Notice::new(Tone::Error, format!("Condition not saved: {e}")),
        });
    }

    fn toggle_row(&mut self, rows: usize) {
        if self.table_cursor < rows && !self.checked.remove(&self.table_cursor) {
            self.checked.insert(self.table_cursor);
        }
    }

    fn delete_checked(&mut self, session: &mut Session) {
        let indices: Vec<usize> = self.checked.iter().copied().collect();
        match session.delete_conditions(&indices) {
            Ok(()) => {
                self.notice = Some(Notice::new(
                    Tone::Success,
                    format!("Deleted {} condition(s).", indices.len()),
                ));
                self.checked.clear();
                self.table_cursor = self
                    .table_cursor
                    .min(session.conditions.len().saturating_sub(1));
            }
            Err(e) => self.notice = Some(Notice::new(Tone::Warning, e.to_string())),
        }
    }

    fn search(&mut self, session: &Session) {
        match SampleRecommender.search(&session.conditions) {
            Ok(answer) => {
                self.answer = answer;
                self.notice = None;
            }
            Err(e) => self.notice = Some(Notice::new(Tone::Warning, e.to_string())),
        }
    }

    fn send_chat(&mut self) {
        if let Some(answer) = SampleRecommender.reply(&self.chat) {
            self.answer = format!("> {}\n\n{answer}", self.chat.trim());
            self.chat.clear();
        }
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

        let session = ctx.session;
        let before = self.notice.clone();
        match self.focus {
            Focus::Field(i) => {
                if let Some(field) = self.fields.get_mut(i) {
                    field.input.handle_key(code);
                }
            }
            Focus::Save if code == KeyCode::Enter => self.save_condition(session),
            Focus::Table => match code {
                KeyCode::Up => self.table_cursor = self.table_cursor.saturating_sub(1),
                KeyCode::Down if self.table_cursor + 1 < session.conditions.len() => {
                    self.table_cursor += 1;
                }
                KeyCode::Char(' ') | KeyCode::Enter => self.toggle_row(session.conditions.len()),
                _ => {}
            },
            Focus::Delete if code == KeyCode::Enter => self.delete_checked(session),
            Focus::Search if code == KeyCode::Enter => self.search(session),
            Focus::Chat => match code {
                KeyCode::Enter => self.send_chat(),
                KeyCode::Backspace => {
                    self.chat.pop();
                }
                KeyCode::Char(c) => self.chat.push(c),
                _ => {}
            },
            _ => {}
        }

        if self.notice == before {
            return None;
        }
        self.notice.as_ref().map(|n| n.text.clone())
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &Session) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);

        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(self.fields.len() as u16 + 2), // Form
                Constraint::Length(1),                             // Save button
                Constraint::Min(4),                                // Condition table
                Constraint::Length(1),                             // Delete / search
                Constraint::Length(1),                             // Notice
            ])
            .split(columns[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(3)])
            .split(columns[1]);

        self.draw_form(f, left[0]);

        let valid = validate(session.schema(), &self.draft()).is_ok();
        f.render_widget(
            Paragraph::new(Line::from(button("Save conditions", self.focus == Focus::Save, valid))),
            left[1],
        );

        self.draw_table(f, left[2], session);

        f.render_widget(
            Paragraph::new(Line::from(vec![
                button("Delete selected", self.focus == Focus::Delete, !self.checked.is_empty()),
                Span::raw("  "),
                button(
                    "Search with saved conditions",
                    self.focus == Focus::Search,
                    session.can_search(),
                ),
            ])),
            left[3],
        );

        if let Some(notice) = &self.notice {
            f.render_widget(Paragraph::new(notice.line()), left[4]);
        }

        let chat_focused = self.focus == Focus::Chat;
        f.render_widget(
            Paragraph::new(self.chat.as_str()).block(panel(
                "Any other requests? (Enter to send)",
                chat_focused,
                chat_focused,
            )),
            right[0],
        );
        f.render_widget(
            Paragraph::new(self.answer.as_str())
                .wrap(Wrap { trim: false })
                .block(panel("Recommendations", false, false)),
            right[1],
        );
    }

    fn draw_form(&self, f: &mut Frame, area: Rect) {
        let label_width = self
            .fields
            .iter()
            .map(|field| field.label.chars().count())
            .max()
            .unwrap_or(0)
            + 2;
        let track_width = (area.width as usize).saturating_sub(label_width + 24).clamp(4, 40);

        let lines: Vec<Line> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let focused = self.focus == Focus::Field(i);
                let label_style = if focused {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                let mut spans = vec![Span::styled(
                    format!("{:<label_width$}", field.label),
                    label_style,
                )];
                spans.extend(field.input.line(focused, track_width).spans);
                Line::from(spans)
            })
            .collect();

        let focused = matches!(self.focus, Focus::Field(_));
        f.render_widget(
            Paragraph::new(lines).block(panel(
                "Conditions (←/→ move, Space select)",
                focused,
                self.is_editing(),
            )),
            area,
        );
    }

    fn draw_table(&self, f: &mut Frame, area: Rect, session: &Session) {
        let focused = self.focus == Focus::Table;
        let headers = std::iter::once(Cell::from(""))
            .chain(session.conditions.headers().iter().map(|h| Cell::from(h.as_str())));
        let header = Row::new(headers).style(Style::default().add_modifier(Modifier::BOLD));

        let rows = session.conditions.rows().iter().enumerate().map(|(i, record)| {
            let cells = std::iter::once(Cell::from(checkbox(self.checked.contains(&i))))
                .chain(record.cells.iter().map(|c| Cell::from(c.as_str())));
            let style = if focused && i == self.table_cursor {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        });

        let columns = session.conditions.headers().len();
        let widths = std::iter::once(Constraint::Length(3))
            .chain(std::iter::repeat_n(Constraint::Fill(1), columns));

        let title = format!("Saved conditions ({})", session.conditions.len());
        let table = Table::new(rows, widths)
            .header(header)
            .block(panel(&title, focused, false));
        f.render_widget(table, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interior_shared::default_catalog_fields;

    fn screen() -> FurnitureScreen {
        FurnitureScreen::new(&ConditionSchema::new(default_catalog_fields()))
    }

    fn select_first_option(screen: &mut FurnitureScreen, index: usize) {
        screen.fields[index].input.handle_key(KeyCode::Char(' '));
    }

    #[test]
    fn untouched_form_is_rejected_for_empty_choices() {
        let s = screen();
        assert!(validate(&ConditionSchema::default(), &s.draft()).is_err());
    }

    #[test]
    fn selecting_one_option_per_choice_field_validates() {
        let mut s = screen();
        for i in 0..4 {
            select_first_option(&mut s, i);
        }
        let record = validate(&ConditionSchema::default(), &s.draft()).unwrap();
        assert_eq!(record.cells[0], "ナチュラル");
        assert_eq!(record.cells[3], "1人掛けソファ");
        assert_eq!(record.cells[4], "0 - 8000 mm");
    }

    #[test]
    fn range_handles_cannot_cross() {
        let mut input = FieldInput::from_kind(&FieldKind::Range {
            min: 0,
            max: 200,
            step: 100,
        });
        for _ in 0..5 {
            input.handle_key(KeyCode::Right);
        }
        assert_eq!(input.value(), ConditionValue::Range(200, 200));

        input.handle_key(KeyCode::Char(' '));
        input.handle_key(KeyCode::Left);
        assert_eq!(input.value(), ConditionValue::Range(200, 200));
    }

    #[test]
    fn cascade_cursor_walks_all_children() {
        let mut s = screen();
        let category = 3;
        for _ in 0..4 {
            s.fields[category].input.handle_key(KeyCode::Right);
        }
        select_first_option(&mut s, category);
        assert_eq!(
            s.fields[category].input.value(),
            ConditionValue::list(["ミーティングチェア"])
        );
    }

    #[test]
    fn focus_cycles_through_controls() {
        let mut s = screen();
        for _ in 0..8 {
            s.move_focus(true);
        }
        assert_eq!(s.focus, Focus::Save);
        s.move_focus(false);
        assert_eq!(s.focus, Focus::Field(7));
    }
}
