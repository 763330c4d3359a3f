use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use serde::Serialize;

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

/// Transient list filters picked by the user. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub status: StatusFilter,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub active: usize,
    pub completed: usize,
}

pub fn filter_by_status<'a, I>(list: I, mode: StatusFilter) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    list.into_iter().filter(|t| mode.matches(t)).collect()
}

/// Exact match against the stored (already lowercase) tag.
pub fn filter_by_tag<'a, I>(list: I, tag: Option<&str>) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    match tag {
        None => list.into_iter().collect(),
        Some(tag) => {
            let wanted = tag.trim().trim_start_matches('#').to_lowercase();
            list.into_iter().filter(|t| t.has_tag(&wanted)).collect()
        }
    }
}

/// Pinned tasks first; list order is otherwise kept.
pub fn sort_for_display(mut list: Vec<&Task>) -> Vec<&Task> {
    list.sort_by_key(|t| !t.pinned);
    list
}

/// Tag usage, most used first, ties broken alphabetically.
pub fn tag_counts<'a, I>(list: I) -> Vec<TagCount>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for task in list {
        for tag in &task.tags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut out: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    out
}

pub fn counts<'a, I>(list: I) -> Counts
where
    I: IntoIterator<Item = &'a Task>,
{
    list.into_iter().fold(Counts::default(), |mut acc, task| {
        if task.completed {
            acc.completed += 1;
        } else {
            acc.active += 1;
        }
        acc
    })
}

/// Every tag in use, sorted and unique.
pub fn known_tags<'a, I>(list: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Task>,
{
    list.into_iter()
        .flat_map(|t| t.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// What the list shows for `state`: status filter, then tag filter, then
/// pinned-first ordering.
pub fn derive<'a>(list: &'a [Task], state: &ViewState) -> Vec<&'a Task> {
    let by_status = filter_by_status(list, state.status);
    let by_tag = filter_by_tag(by_status, state.tag.as_deref());
    sort_for_display(by_tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(raw: &str) -> Task {
        Task::from_input(raw, None).expect("task")
    }

    fn texts(list: &[&Task]) -> Vec<String> {
        list.iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn pinned_first_is_stable() {
        let mut a = task("A");
        a.pinned = true;
        let b = task("B");
        let mut c = task("C");
        c.pinned = true;
        let d = task("D");
        let list = vec![a, b, c, d];

        let sorted = sort_for_display(list.iter().collect());
        assert_eq!(texts(&sorted), vec!["A", "C", "B", "D"]);
    }

    #[test]
    fn filters_by_status() {
        let mut done = task("done");
        done.completed = true;
        let list = vec![task("open"), done];

        assert_eq!(texts(&filter_by_status(&list, StatusFilter::All)).len(), 2);
        assert_eq!(texts(&filter_by_status(&list, StatusFilter::Active)), vec!["open"]);
        assert_eq!(
            texts(&filter_by_status(&list, StatusFilter::Completed)),
            vec!["done"]
        );
    }

    #[test]
    fn filters_by_exact_tag() {
        let list = vec![task("a #work"), task("b #workshop"), task("c #Work #home")];
        assert_eq!(texts(&filter_by_tag(&list, Some("work"))), vec!["a", "c"]);
        assert_eq!(texts(&filter_by_tag(&list, Some("#WORK"))), vec!["a", "c"]);
        assert_eq!(texts(&filter_by_tag(&list, None)).len(), 3);
        assert!(filter_by_tag(&list, Some("wor")).is_empty());
    }

    #[test]
    fn tag_counts_sort_by_count_then_name() {
        let list = vec![
            task("a #home #zeta"),
            task("b #work #home"),
            task("c #alpha #work"),
            task("d #home"),
        ];
        let counts = tag_counts(&list);
        let flat: Vec<(String, usize)> = counts.into_iter().map(|c| (c.tag, c.count)).collect();
        assert_eq!(
            flat,
            vec![
                ("home".to_string(), 3),
                ("work".to_string(), 2),
                ("alpha".to_string(), 1),
                ("zeta".to_string(), 1),
            ]
        );
    }

    #[test]
    fn counts_partition_the_list() {
        let mut done = task("x");
        done.completed = true;
        let list = vec![task("a"), task("b"), done];
        assert_eq!(
            counts(&list),
            Counts {
                active: 2,
                completed: 1
            }
        );
        assert_eq!(counts(&Vec::<Task>::new()), Counts::default());
    }

    #[test]
    fn derive_composes_filters_and_sort() {
        let a = task("a #errand");
        let mut b = task("b #errand");
        b.pinned = true;
        let mut c = task("c #errand");
        c.completed = true;
        let d = task("d #other");
        let list = vec![a, b, c, d];

        let state = ViewState {
            status: StatusFilter::Active,
            tag: Some("errand".to_string()),
        };
        assert_eq!(texts(&derive(&list, &state)), vec!["b", "a"]);
        assert_eq!(texts(&derive(&list, &ViewState::default())), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn known_tags_are_sorted_and_unique() {
        let list = vec![task("a #b #a"), task("b #c #a")];
        assert_eq!(
            known_tags(&list),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
