//! List query options plus search and sort over a merged view.
//!
//! Search and sort run on the final merged list, never on raw durable rows.

use crate::repo::record_store::RecordFilter;
use crate::view::merge::ViewRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    DateAdded,
    /// Case-insensitive; records without a category sort as "".
    CategoryName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Non-fatal issues detected while interpreting a list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListNotice {
    /// Start date after end date; the date filter was ignored.
    InvertedDateRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: RecordFilter,
    pub search: Option<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl ListQuery {
    /// Filter to send to the store, with an inverted date range dropped.
    pub fn effective_filter(&self) -> (RecordFilter, Vec<ListNotice>) {
        let mut filter = self.filter.clone();
        let mut notices = Vec::new();
        if filter.added_between.is_some_and(|range| range.is_inverted()) {
            filter.added_between = None;
            notices.push(ListNotice::InvertedDateRange);
        }
        (filter, notices)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListOutcome {
    pub items: Vec<ViewRecord>,
    pub notices: Vec<ListNotice>,
}

/// Keeps items whose title or content contains `keyword`, ignoring case.
///
/// A missing or blank keyword keeps everything.
pub fn apply_search(items: &mut Vec<ViewRecord>, keyword: Option<&str>) {
    let Some(needle) = keyword.map(str::trim).filter(|value| !value.is_empty()) else {
        return;
    };
    let needle = needle.to_lowercase();
    items.retain(|item| {
        item.record.title.to_lowercase().contains(&needle)
            || item.record.content.to_lowercase().contains(&needle)
    });
}

/// Stable sort by `key` in `direction`.
pub fn apply_sort(items: &mut [ViewRecord], key: SortKey, direction: SortDirection) {
    items.sort_by(|a, b| {
        let ordering = match key {
            SortKey::DateAdded => a.record.date_added.cmp(&b.record.date_added),
            SortKey::CategoryName => category_key(a).cmp(&category_key(b)),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn category_key(item: &ViewRecord) -> String {
    item.record
        .category
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
}

/// Search then sort, as used by every list endpoint.
pub fn finish_listing(mut items: Vec<ViewRecord>, query: &ListQuery) -> Vec<ViewRecord> {
    apply_search(&mut items, query.search.as_deref());
    apply_sort(&mut items, query.sort, query.direction);
    items
}

#[cfg(test)]
mod tests {
    use super::{apply_search, apply_sort, ListNotice, ListQuery, SortDirection, SortKey};
    use crate::model::record::{Record, RecordId, StagedId, UserId};
    use crate::repo::record_store::{DateRange, RecordFilter};
    use crate::view::merge::ViewRecord;

    fn item(id: i64, title: &str, category: Option<&str>, date_added: i64) -> ViewRecord {
        let mut record = Record::new(UserId(1), title, "");
        record.id = Some(RecordId(id));
        record.category = category.map(str::to_string);
        record.date_added = date_added;
        ViewRecord {
            id: StagedId::Durable(RecordId(id)),
            record,
        }
    }

    #[test]
    fn search_is_case_insensitive_and_ignores_blank_keyword() {
        let mut items = vec![item(1, "Groceries", None, 0), item(2, "Taxes", None, 0)];
        apply_search(&mut items, Some("   "));
        assert_eq!(items.len(), 2);

        apply_search(&mut items, Some("gROC"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].record.title, "Groceries");
    }

    #[test]
    fn category_sort_puts_missing_category_first_ascending() {
        let mut items = vec![
            item(1, "a", Some("work"), 0),
            item(2, "b", None, 0),
            item(3, "c", Some("Home"), 0),
        ];
        apply_sort(&mut items, SortKey::CategoryName, SortDirection::Asc);
        let ids: Vec<_> = items.iter().map(|i| i.record.id.unwrap().0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn date_sort_defaults_to_newest_first_and_is_stable() {
        let mut items = vec![item(1, "a", None, 10), item(2, "b", None, 30), item(3, "c", None, 10)];
        let query = ListQuery::default();
        apply_sort(&mut items, query.sort, query.direction);
        let ids: Vec<_> = items.iter().map(|i| i.record.id.unwrap().0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn inverted_date_range_is_dropped_with_notice() {
        let query = ListQuery {
            filter: RecordFilter {
                category: Some("work".to_string()),
                added_between: Some(DateRange::new(200, 100)),
            },
            ..ListQuery::default()
        };
        let (filter, notices) = query.effective_filter();
        assert_eq!(filter.added_between, None);
        assert_eq!(filter.category.as_deref(), Some("work"));
        assert_eq!(notices, vec![ListNotice::InvertedDateRange]);
    }
}
