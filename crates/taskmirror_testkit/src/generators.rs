//! Property-based test generators using proptest.
//!
//! Ids are drawn from small pools so that generated responses overlap:
//! deltas update, remove and re-add entities of the base state.

use proptest::prelude::*;
use taskmirror_protocol::{Due, Label, Project, SyncCursor, SyncResponse, Task};

/// Strategy for task ids.
pub fn task_id_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("t{n}"))
}

/// Strategy for project ids.
pub fn project_id_strategy() -> impl Strategy<Value = String> {
    (0u8..3).prop_map(|n| format!("p{n}"))
}

/// Strategy for label ids.
pub fn label_id_strategy() -> impl Strategy<Value = String> {
    (0u8..4).prop_map(|n| format!("l{n}"))
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{0,12}").expect("Invalid regex")
}

fn due_strategy() -> impl Strategy<Value = Option<Due>> {
    prop::option::of((2020i32..2030, 1u32..13, 1u32..29, any::<bool>()).prop_map(
        |(year, month, day, recurring)| {
            let date = format!("{year:04}-{month:02}-{day:02}");
            Due {
                date: Some(date.clone()),
                datetime: None,
                timezone: None,
                string: Some(if recurring { "every day".into() } else { date }),
                is_recurring: recurring,
            }
        },
    ))
}

/// Strategy for tasks, including removed ones.
pub fn arb_task() -> impl Strategy<Value = Task> {
    (
        task_id_strategy(),
        prop::option::of(project_id_strategy()),
        text_strategy(),
        any::<bool>(),
        prop::collection::btree_set(label_id_strategy(), 0..3),
        prop::option::of(1u8..5),
        -2i64..6,
        due_strategy(),
        prop::bool::weighted(0.15),
        prop::bool::weighted(0.1),
    )
        .prop_map(
            |(id, project_id, content, is_completed, label_ids, priority, order, due, is_deleted, is_archived)| {
                Task {
                    id,
                    project_id,
                    parent_id: None,
                    content,
                    description: None,
                    is_completed,
                    label_ids,
                    priority,
                    order,
                    due,
                    is_deleted,
                    is_archived,
                }
            },
        )
}

/// Strategy for projects, including removed ones.
pub fn arb_project() -> impl Strategy<Value = Project> {
    (
        project_id_strategy(),
        text_strategy(),
        0i64..4,
        prop::bool::weighted(0.15),
        prop::bool::weighted(0.1),
    )
        .prop_map(|(id, name, order, is_deleted, is_archived)| Project {
            id,
            name,
            parent_id: None,
            color: None,
            order,
            is_deleted,
            is_archived,
        })
}

/// Strategy for labels, including deleted ones.
pub fn arb_label() -> impl Strategy<Value = Label> {
    (
        label_id_strategy(),
        text_strategy(),
        0i64..4,
        prop::bool::weighted(0.15),
        any::<bool>(),
    )
        .prop_map(|(id, name, order, is_deleted, is_favorite)| Label {
            id,
            name,
            color: None,
            order,
            is_deleted,
            is_favorite,
        })
}

/// Strategy for responses with the given `full_sync` flag.
pub fn arb_response(full_sync: bool) -> impl Strategy<Value = SyncResponse> {
    (
        (0u32..1000).prop_map(|n| SyncCursor::new(format!("c{n}"))),
        prop::collection::vec(arb_task(), 0..10),
        prop::collection::vec(arb_project(), 0..4),
        prop::collection::vec(arb_label(), 0..4),
    )
        .prop_map(move |(sync_token, tasks, projects, labels)| SyncResponse {
            sync_token,
            full_sync,
            tasks,
            projects,
            labels,
        })
}

/// Strategy for delta responses.
pub fn arb_delta() -> impl Strategy<Value = SyncResponse> {
    arb_response(false)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
