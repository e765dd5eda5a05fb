//! Per-session UI state.
//!
//! One [`Session`] lives for as long as the user keeps the app open. Nothing
//! here is persisted.

use tracing::{debug, info};

use crate::conditions::{
    ConditionDraft, ConditionError, ConditionSchema, ConditionTable, TableError, validate,
};
use crate::urls::UrlTable;

/// Where the scraping screen gets its URL list from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum DataSource {
    /// XML site map.
    #[default]
    Sitemap = 0,
    /// A single page and the links on it.
    Page = 1,
}

impl DataSource {
    pub const ALL: [DataSource; 2] = [DataSource::Sitemap, DataSource::Page];

    pub fn label(self) -> &'static str {
        match self {
            Self::Sitemap => "XML sitemap",
            Self::Page => "URL",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::Sitemap => Self::Page,
            Self::Page => Self::Sitemap,
        }
    }
}

/// Session state shared by the furniture and scraping screens.
#[derive(Debug, Clone)]
pub struct Session {
    schema: ConditionSchema,
    pub conditions: ConditionTable,
    pub data_source: DataSource,
    pub all_urls: UrlTable,
    pub selected_urls: UrlTable,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ConditionSchema::default())
    }
}

impl Session {
    pub fn new(schema: ConditionSchema) -> Self {
        Self {
            conditions: ConditionTable::new(&schema),
            schema,
            data_source: DataSource::default(),
            all_urls: UrlTable::default(),
            selected_urls: UrlTable::default(),
        }
    }

    pub fn schema(&self) -> &ConditionSchema {
        &self.schema
    }

    /// Validate `draft` and append it. The table is untouched on error.
    pub fn add_condition(&mut self, draft: &ConditionDraft) -> Result<(), ConditionError> {
        let record = validate(&self.schema, draft)?;
        self.conditions.push(record);
        info!(rows = self.conditions.len(), "condition saved");
        Ok(())
    }

    pub fn delete_conditions(&mut self, indices: &[usize]) -> Result<(), TableError> {
        self.conditions.delete(indices)?;
        info!(rows = self.conditions.len(), "conditions deleted");
        Ok(())
    }

    /// Replace the discovered URLs and clear the selection.
    pub fn set_discovered(&mut self, table: UrlTable) {
        debug!(rows = table.len(), "url table replaced");
        self.all_urls = table;
        self.selected_urls = UrlTable::default();
    }

    /// Set the selection to the rows checked in the URL table.
    pub fn select_urls(&mut self, indices: &[usize]) {
        self.selected_urls = self.all_urls.select(indices);
    }

    pub fn can_search(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn can_scrape(&self) -> bool {
        !self.selected_urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::ConditionValue;
    use crate::urls::UrlRow;

    fn draft() -> ConditionDraft {
        ConditionDraft::new()
            .with("taste", ConditionValue::list(["インダストリアル"]))
            .with("lead_time", ConditionValue::list(["1ヶ月"]))
            .with("price_tier", ConditionValue::list(["High"]))
            .with("category", ConditionValue::list(["ダイニングチェア"]))
            .with("width", ConditionValue::Range(0, 600))
            .with("depth", ConditionValue::Range(0, 600))
            .with("height", ConditionValue::Range(0, 900))
            .with("seat_height", ConditionValue::Range(400, 450))
    }

    fn urls(n: usize) -> UrlTable {
        UrlTable::new((0..n).map(|i| UrlRow::new(format!("https://example.com/{i}"))).collect())
    }

    #[test]
    fn new_session_defaults() {
        let session = Session::default();
        assert_eq!(session.data_source, DataSource::Sitemap);
        assert!(session.conditions.is_empty());
        assert_eq!(session.conditions.headers().len(), 8);
        assert!(!session.can_search());
        assert!(!session.can_scrape());
    }

    #[test]
    fn rejected_condition_leaves_table_unchanged() {
        let mut session = Session::default();
        session.add_condition(&draft()).unwrap();

        let bad = draft().with("width", ConditionValue::Range(900, 100));
        assert!(session.add_condition(&bad).is_err());
        assert_eq!(session.conditions.len(), 1);
        assert!(session.can_search());
    }

    #[test]
    fn delete_conditions_updates_search_flag() {
        let mut session = Session::default();
        session.add_condition(&draft()).unwrap();
        session.delete_conditions(&[0]).unwrap();
        assert!(!session.can_search());
    }

    #[test]
    fn selection_tracks_last_checked_rows() {
        let mut session = Session::default();
        session.set_discovered(urls(5));
        session.select_urls(&[1, 3]);
        assert_eq!(
            session.selected_urls.urls(),
            vec!["https://example.com/1", "https://example.com/3"]
        );

        session.select_urls(&[4]);
        assert_eq!(session.selected_urls.urls(), vec!["https://example.com/4"]);
        assert!(session.can_scrape());

        session.select_urls(&[]);
        assert!(!session.can_scrape());
    }

    #[test]
    fn new_discovery_clears_selection() {
        let mut session = Session::default();
        session.set_discovered(urls(3));
        session.select_urls(&[0]);
        session.set_discovered(urls(2));
        assert!(session.selected_urls.is_empty());
        assert_eq!(session.all_urls.len(), 2);
    }

    #[test]
    fn data_source_indices() {
        assert_eq!(DataSource::Sitemap.index(), 0);
        assert_eq!(DataSource::from_index(1), Some(DataSource::Page));
        assert_eq!(DataSource::from_index(2), None);
        assert_eq!(DataSource::Page.toggle(), DataSource::Sitemap);
    }
}
