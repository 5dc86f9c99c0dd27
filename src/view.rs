//! Filter, sort and paginate over the in-memory application list.
//!
//! [`compute_view`] is a pure function of the collection, a [`ViewState`] and
//! a page size. It never clamps `current_page`; the transition methods on
//! [`ViewState`] own that policy.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. **Filter** by free text (company or title, case-insensitive, taken
//!    as typed) and by exact status.
//! 2. **Sort** by at most one column, stably, with missing values last in
//!    either direction.
//! 3. **Paginate** into 1-based pages of `page_size` rows.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Draft, JobApplication, Status};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    CompanyName,
    JobTitle,
    Status,
    AppliedDate,
}

impl SortColumn {
    pub const ALL: [SortColumn; 4] = [
        SortColumn::CompanyName,
        SortColumn::JobTitle,
        SortColumn::Status,
        SortColumn::AppliedDate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortColumn::CompanyName => "Company",
            SortColumn::JobTitle => "Title",
            SortColumn::Status => "Status",
            SortColumn::AppliedDate => "Applied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Ephemeral per-session view settings plus the form draft.
///
/// Fields are private so every change goes through a transition that keeps
/// the page-reset rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    filter_text: String,
    filter_status: Option<Status>,
    sort_column: Option<SortColumn>,
    sort_direction: SortDirection,
    current_page: usize,
    draft: Draft,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            filter_text: String::new(),
            filter_status: None,
            sort_column: None,
            sort_direction: SortDirection::Ascending,
            current_page: 1,
            draft: Draft::default(),
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn filter_status(&self) -> Option<&Status> {
        self.filter_status.as_ref()
    }

    pub fn sort_column(&self) -> Option<SortColumn> {
        self.sort_column
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Form edits go straight to the draft; they never touch the collection.
    pub fn draft_mut(&mut self) -> &mut Draft {
        &mut self.draft
    }

    pub fn set_filter_text(&mut self, text: impl Into<String>) {
        self.filter_text = text.into();
        self.current_page = 1;
    }

    pub fn set_filter_status(&mut self, status: Option<Status>) {
        self.filter_status = status;
        self.current_page = 1;
    }

    /// Same column flips direction, a new column starts ascending.
    pub fn click_sort(&mut self, column: SortColumn) {
        if self.sort_column == Some(column) {
            self.sort_direction = self.sort_direction.toggled();
        } else {
            self.sort_column = Some(column);
            self.sort_direction = SortDirection::Ascending;
        }
        self.current_page = 1;
    }

    pub fn set_sort(&mut self, column: Option<SortColumn>, direction: SortDirection) {
        self.sort_column = column;
        self.sort_direction = direction;
        self.current_page = 1;
    }

    /// Moves to page `page` if it exists in the current filtered view.
    /// Returns whether the move happened.
    pub fn request_page(
        &mut self,
        page: usize,
        collection: &[JobApplication],
        page_size: usize,
    ) -> bool {
        let total = collection.iter().filter(|job| self.matches(job)).count();
        let pages = page_count(total, page_size);
        if page < 1 || page > pages {
            return false;
        }
        self.current_page = page;
        true
    }

    /// Pulls `current_page` back into `1..=max(page_count, 1)` after the
    /// collection shrinks.
    pub fn clamp_page(&mut self, page_count: usize) {
        self.current_page = self.current_page.clamp(1, page_count.max(1));
    }

    pub fn begin_edit(&mut self, job: &JobApplication) {
        self.draft = Draft::from(job);
    }

    pub fn reset_draft(&mut self) {
        self.draft = Draft::default();
    }

    fn matches(&self, job: &JobApplication) -> bool {
        let text_ok = {
            let needle = self.filter_text.to_lowercase();
            needle.is_empty()
                || job.company_name.to_lowercase().contains(&needle)
                || job.job_title.to_lowercase().contains(&needle)
        };
        let status_ok = self
            .filter_status
            .as_ref()
            .is_none_or(|status| &job.status == status);
        text_ok && status_ok
    }
}

/// One rendered page plus the numbers the pager needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView<'a> {
    pub page: Vec<&'a JobApplication>,
    pub total_count: usize,
    pub page_count: usize,
}

pub fn compute_view<'a>(
    collection: &'a [JobApplication],
    state: &ViewState,
    page_size: usize,
) -> ListView<'a> {
    let mut rows: Vec<&JobApplication> = collection.iter().filter(|job| state.matches(job)).collect();

    if let Some(column) = state.sort_column {
        // sort_by is stable, so equal keys keep store order
        rows.sort_by(|a, b| compare(a, b, column, state.sort_direction));
    }

    let total_count = rows.len();
    let page_size = page_size.max(1);
    let start = state
        .current_page
        .saturating_sub(1)
        .saturating_mul(page_size)
        .min(total_count);
    let end = start.saturating_add(page_size).min(total_count);

    ListView {
        page: rows[start..end].to_vec(),
        total_count,
        page_count: page_count(total_count, page_size),
    }
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

enum SortKey<'a> {
    Text(&'a str),
    Date(NaiveDate),
}

fn sort_key(job: &JobApplication, column: SortColumn) -> Option<SortKey<'_>> {
    match column {
        SortColumn::CompanyName => present(&job.company_name).map(SortKey::Text),
        SortColumn::JobTitle => present(&job.job_title).map(SortKey::Text),
        SortColumn::Status => present(job.status.as_str()).map(SortKey::Text),
        SortColumn::AppliedDate => Some(SortKey::Date(job.applied_date)),
    }
}

fn present(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

fn compare(a: &JobApplication, b: &JobApplication, column: SortColumn, dir: SortDirection) -> Ordering {
    match (sort_key(a, column), sort_key(b, column)) {
        (Some(x), Some(y)) => dir.apply(compare_keys(&x, &y)),
        // missing values trail regardless of direction
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_keys(a: &SortKey<'_>, b: &SortKey<'_>) -> Ordering {
    match (a, b) {
        (SortKey::Text(x), SortKey::Text(y)) => collate(x, y),
        (SortKey::Date(x), SortKey::Date(y)) => x.cmp(y),
        // a column never mixes key kinds
        _ => Ordering::Equal,
    }
}

/// Dictionary-style ordering: case and surrounding whitespace are ignored
/// first, then lowercase sorts ahead of uppercase for otherwise equal words.
fn collate(a: &str, b: &str) -> Ordering {
    let (a_trim, b_trim) = (a.trim(), b.trim());
    a_trim
        .to_lowercase()
        .cmp(&b_trim.to_lowercase())
        .then_with(|| {
            a_trim
                .chars()
                .zip(b_trim.chars())
                .map(|(x, y)| x.is_uppercase().cmp(&y.is_uppercase()))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: i64, company: &str, title: &str, status: Status, date: &str) -> JobApplication {
        JobApplication {
            id: Some(id),
            company_name: company.to_string(),
            job_title: title.to_string(),
            status,
            applied_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            notes: None,
        }
    }

    fn acme_globex() -> Vec<JobApplication> {
        vec![
            job(1, "Acme", "Engineer", Status::Applied, "2025-01-01"),
            job(2, "Globex", "Analyst", Status::Rejected, "2025-02-01"),
        ]
    }

    fn ids(view: &ListView<'_>) -> Vec<i64> {
        view.page.iter().filter_map(|j| j.id).collect()
    }

    fn numbered(n: i64) -> Vec<JobApplication> {
        (1..=n)
            .map(|i| job(i, &format!("Company {i:02}"), "Dev", Status::Applied, "2025-01-01"))
            .collect()
    }

    #[test]
    fn status_filter_keeps_only_matching_rows() {
        let jobs = acme_globex();
        let mut state = ViewState::new();
        state.set_filter_status(Some(Status::Rejected));

        let view = compute_view(&jobs, &state, 10);
        assert_eq!(ids(&view), vec![2]);
        assert_eq!(view.total_count, 1);
        assert_eq!(view.page_count, 1);
    }

    #[test]
    fn date_sort_descending() {
        let jobs = acme_globex();
        let mut state = ViewState::new();
        state.set_sort(Some(SortColumn::AppliedDate), SortDirection::Descending);

        let view = compute_view(&jobs, &state, 10);
        assert_eq!(ids(&view), vec![2, 1]);
    }

    #[test]
    fn third_page_holds_the_remainder() {
        let jobs = numbered(12);
        let mut state = ViewState::new();
        assert!(state.request_page(3, &jobs, 5));

        let view = compute_view(&jobs, &state, 5);
        assert_eq!(ids(&view), vec![11, 12]);
        assert_eq!(view.page_count, 3);
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let jobs = numbered(12);
        let mut state = ViewState::new();
        assert!(state.request_page(3, &jobs, 5));
        assert!(!state.request_page(4, &jobs, 5));
        assert!(!state.request_page(0, &jobs, 5));
        assert_eq!(state.current_page(), 3);
    }

    #[test]
    fn text_filter_is_case_insensitive_over_company_and_title() {
        let jobs = acme_globex();
        let mut state = ViewState::new();

        state.set_filter_text("ACM");
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![1]);

        state.set_filter_text("analyst");
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![2]);

        state.set_filter_text("nobody");
        let view = compute_view(&jobs, &state, 10);
        assert!(view.page.is_empty());
        assert_eq!(view.page_count, 0);
    }

    #[test]
    fn text_filter_matches_whitespace_as_typed() {
        let jobs = vec![job(1, "Acme", "Engineer", Status::Applied, "2025-01-01")];
        let mut state = ViewState::new();

        state.set_filter_text("Acme ");
        let view = compute_view(&jobs, &state, 10);
        assert_eq!(view.total_count, 0);

        state.set_filter_text(" ");
        assert_eq!(compute_view(&jobs, &state, 10).total_count, 0);

        state.set_filter_text("");
        assert_eq!(compute_view(&jobs, &state, 10).total_count, 1);
    }

    #[test]
    fn text_and_status_filters_combine() {
        let mut jobs = acme_globex();
        jobs.push(job(3, "Acme Labs", "Researcher", Status::Rejected, "2025-03-01"));
        let mut state = ViewState::new();
        state.set_filter_text("acme");
        state.set_filter_status(Some(Status::Rejected));
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![3]);
    }

    #[test]
    fn equal_keys_keep_input_order_in_both_directions() {
        let jobs = vec![
            job(1, "Beta", "a", Status::Applied, "2025-01-01"),
            job(2, "Alpha", "b", Status::Applied, "2025-01-01"),
            job(3, "Beta", "c", Status::Applied, "2025-01-01"),
            job(4, "Alpha", "d", Status::Applied, "2025-01-01"),
        ];
        let mut state = ViewState::new();
        state.click_sort(SortColumn::CompanyName);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![2, 4, 1, 3]);

        state.click_sort(SortColumn::CompanyName);
        assert_eq!(state.sort_direction(), SortDirection::Descending);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![1, 3, 2, 4]);

        state.click_sort(SortColumn::AppliedDate);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn blank_values_sort_last_either_way() {
        let jobs = vec![
            job(1, "", "a", Status::Applied, "2025-01-01"),
            job(2, "Zeta", "b", Status::Applied, "2025-01-01"),
            job(3, "alpha", "c", Status::Applied, "2025-01-01"),
        ];
        let mut state = ViewState::new();
        state.set_sort(Some(SortColumn::CompanyName), SortDirection::Ascending);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![3, 2, 1]);

        state.set_sort(Some(SortColumn::CompanyName), SortDirection::Descending);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![2, 3, 1]);
    }

    #[test]
    fn string_sort_ignores_case() {
        let jobs = vec![
            job(1, "beta", "x", Status::Applied, "2025-01-01"),
            job(2, "Alpha", "x", Status::Applied, "2025-01-01"),
            job(3, "alpha", "x", Status::Applied, "2025-01-01"),
        ];
        let mut state = ViewState::new();
        state.click_sort(SortColumn::CompanyName);
        assert_eq!(ids(&compute_view(&jobs, &state, 10)), vec![3, 2, 1]);
    }

    #[test]
    fn changing_view_settings_returns_to_first_page() {
        let jobs = numbered(30);
        let mut state = ViewState::new();

        assert!(state.request_page(2, &jobs, 10));
        state.set_filter_text("company");
        assert_eq!(state.current_page(), 1);

        assert!(state.request_page(2, &jobs, 10));
        state.set_filter_status(None);
        assert_eq!(state.current_page(), 1);

        assert!(state.request_page(2, &jobs, 10));
        state.click_sort(SortColumn::JobTitle);
        assert_eq!(state.current_page(), 1);

        assert!(state.request_page(3, &jobs, 10));
        state.click_sort(SortColumn::JobTitle);
        assert_eq!(state.current_page(), 1);
    }

    #[test]
    fn request_page_counts_only_filtered_rows() {
        let jobs = numbered(30);
        let mut state = ViewState::new();
        state.set_filter_text("Company 0");
        // Company 01..09 only
        assert!(!state.request_page(2, &jobs, 10));
        assert_eq!(state.current_page(), 1);
    }

    #[test]
    fn pages_partition_the_filtered_rows() {
        let jobs = numbered(23);
        for size in 1..=25 {
            let mut state = ViewState::new();
            let first = compute_view(&jobs, &state, size);
            assert_eq!(first.page_count, 23usize.div_ceil(size));

            let mut seen = Vec::new();
            for p in 1..=first.page_count {
                assert!(state.request_page(p, &jobs, size));
                let view = compute_view(&jobs, &state, size);
                seen.extend(ids(&view));
            }
            assert_eq!(seen, (1..=23).collect::<Vec<_>>());
        }
    }

    #[test]
    fn compute_view_is_repeatable() {
        let jobs = acme_globex();
        let mut state = ViewState::new();
        state.click_sort(SortColumn::Status);
        assert_eq!(compute_view(&jobs, &state, 1), compute_view(&jobs, &state, 1));
    }

    #[test]
    fn out_of_range_page_is_empty_not_a_panic() {
        let jobs = numbered(3);
        let mut state = ViewState::new();
        assert!(state.request_page(3, &jobs, 1));
        let shrunk = &jobs[..1];
        let view = compute_view(shrunk, &state, 1);
        assert!(view.page.is_empty());
        assert_eq!(view.page_count, 1);

        state.clamp_page(view.page_count);
        assert_eq!(state.current_page(), 1);
        state.clamp_page(0);
        assert_eq!(state.current_page(), 1);
    }

    #[test]
    fn empty_collection_has_no_pages() {
        let view = compute_view(&[], &ViewState::new(), 10);
        assert_eq!(view.page_count, 0);
        assert_eq!(view.total_count, 0);
        assert!(view.page.is_empty());
    }

    #[test]
    fn edit_copies_into_draft_and_cancel_resets() {
        let jobs = acme_globex();
        let mut state = ViewState::new();
        state.begin_edit(&jobs[1]);
        assert_eq!(state.draft().id, Some(2));
        state.draft_mut().company_name.push_str(" Corp");
        assert_eq!(jobs[1].company_name, "Globex");

        state.reset_draft();
        assert_eq!(state.draft(), &Draft::default());
        assert_eq!(state.draft().status, Status::Applied);
    }
}
