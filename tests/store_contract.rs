//! Behavioural contract shared by every store backend.
//!
//! Each check is written once against the store traits and instantiated for
//! the `SQLite` stores and the in-memory stores. A backend passes only if it
//! is observably indistinguishable from the other.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::too_many_lines)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use todo_list_service::models::{Article, NewArticle, NewTodoItem, RecordId, TodoItem};
use todo_list_service::storage::sqlite::open_connection;
use todo_list_service::storage::{
    ArticleStore, InMemoryArticleStore, InMemoryTodoStore, OpContext, SqliteArticleStore,
    SqliteTodoStore, TodoItemStore, consume_cursor,
};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2031, 6, 1, 9, 0, 0).unwrap()
}

fn drain(store: &dyn TodoItemStore, max: usize) -> Vec<TodoItem> {
    consume_cursor(store.find_all(&OpContext::background()).unwrap(), max).unwrap()
}

fn titles(items: &[TodoItem]) -> Vec<&str> {
    items.iter().map(|i| i.title.as_str()).collect()
}

// ============================================================================
// Todo item contract
// ============================================================================

fn insert_then_find_returns_equal_record(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let due = base_time() + Duration::hours(1);
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Buy milk", due))
        .unwrap();

    let found = store.find_one_by_id(&ctx, &id).unwrap().expect("inserted record");
    assert_eq!(found.id, id);
    assert_eq!(found.title, "Buy milk");
    assert_eq!(found.due_date, due);
    assert!(!found.completed);
    assert!(found.labels.is_empty());
    assert_eq!(found.description, "");

    let full = NewTodoItem::new("Write report", due)
        .with_labels(["work", "urgent"])
        .with_description("Q3 numbers")
        .with_completed(true);
    let id = store.insert_one(&ctx, &full).unwrap();
    let found = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(found.to_new(), full);
}

fn missing_id_is_not_found(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    store
        .insert_one(&ctx, &NewTodoItem::new("Present", base_time()))
        .unwrap();
    assert_eq!(
        store.find_one_by_id(&ctx, &RecordId::generate()).unwrap(),
        None
    );
}

fn empty_title_is_rejected_before_storage(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let err = store
        .insert_one(&ctx, &NewTodoItem::new("  ", base_time()))
        .unwrap_err();
    assert!(matches!(err, todo_list_service::Error::Validation(_)));
    assert!(drain(store, 10).is_empty());
}

fn out_of_range_due_date_is_rejected(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Kept", base_time()))
        .unwrap();

    let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
    let before_epoch = Utc.with_ymd_and_hms(-1, 12, 31, 19, 0, 0).unwrap();
    for due in [far, before_epoch] {
        let err = store
            .insert_one(&ctx, &NewTodoItem::new("Unreadable", due))
            .unwrap_err();
        assert!(matches!(err, todo_list_service::Error::Validation(_)));
        let err = store
            .update_one_by_id(&ctx, &id, &NewTodoItem::new("Unreadable", due))
            .unwrap_err();
        assert!(matches!(err, todo_list_service::Error::Validation(_)));
    }

    let latest = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
    let edge = store
        .insert_one(&ctx, &NewTodoItem::new("Edge", latest))
        .unwrap();
    assert_eq!(
        store.find_one_by_id(&ctx, &edge).unwrap().unwrap().due_date,
        latest
    );
    assert_eq!(titles(&drain(store, 10)), vec!["Kept", "Edge"]);
}

fn add_label_is_idempotent(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Task", base_time()).with_labels(["a"]))
        .unwrap();

    let first = store.add_label(&ctx, &id, "b").unwrap();
    assert!(first.matched());
    assert!(first.modified());
    let second = store.add_label(&ctx, &id, "b").unwrap();
    assert!(second.matched());
    assert!(!second.modified());

    let item = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(item.labels, vec!["a", "b"]);
}

fn remove_absent_label_is_noop(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Task", base_time()).with_labels(["a", "b"]))
        .unwrap();

    let outcome = store.remove_label(&ctx, &id, "zzz").unwrap();
    assert!(outcome.matched());
    assert!(!outcome.modified());

    assert!(store.remove_label(&ctx, &id, "a").unwrap().modified());
    let item = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(item.labels, vec!["b"]);
}

fn label_mutations_on_missing_id_match_nothing(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let ghost = RecordId::generate();
    assert!(!store.add_label(&ctx, &ghost, "a").unwrap().matched());
    assert!(!store.remove_label(&ctx, &ghost, "a").unwrap().matched());
    assert!(drain(store, 10).is_empty());
}

fn find_all_respects_cap(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    for i in 0..7 {
        store
            .insert_one(&ctx, &NewTodoItem::new(format!("t{i}"), base_time()))
            .unwrap();
    }

    let capped = drain(store, 3);
    assert_eq!(titles(&capped), vec!["t0", "t1", "t2"]);
    assert_eq!(drain(store, 7).len(), 7);
    assert_eq!(drain(store, 100).len(), 7);
    assert_eq!(store.open_cursors(), 0);
}

fn find_by_label_returns_exact_subset_in_order(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let specs: [(&str, &[&str]); 5] = [
        ("one", &["x"]),
        ("two", &["y"]),
        ("three", &["x", "y"]),
        ("four", &["xx"]),
        ("five", &["X"]),
    ];
    for (title, labels) in specs {
        store
            .insert_one(
                &ctx,
                &NewTodoItem::new(title, base_time()).with_labels(labels.iter().copied()),
            )
            .unwrap();
    }

    let tagged: Vec<TodoItem> =
        consume_cursor(store.find_by_label(&ctx, "x").unwrap(), 100).unwrap();
    assert_eq!(titles(&tagged), vec!["one", "three"]);
    assert!(tagged.iter().all(|i| i.has_label("x")));

    let none: Vec<TodoItem> =
        consume_cursor(store.find_by_label(&ctx, "missing").unwrap(), 100).unwrap();
    assert!(none.is_empty());
    assert_eq!(store.open_cursors(), 0);
}

fn update_replaces_fields_and_keeps_id(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Old", base_time()).with_labels(["a"]))
        .unwrap();

    let replacement = NewTodoItem::new("New", base_time() + Duration::days(2))
        .with_labels(["b", "c"])
        .with_description("details")
        .with_completed(true);
    let outcome = store.update_one_by_id(&ctx, &id, &replacement).unwrap();
    assert!(outcome.matched());
    assert!(outcome.modified());

    let item = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(item.id, id);
    assert_eq!(item.to_new(), replacement);

    let again = store.update_one_by_id(&ctx, &id, &replacement).unwrap();
    assert!(again.matched());
    assert!(!again.modified());

    let by_old_label: Vec<TodoItem> =
        consume_cursor(store.find_by_label(&ctx, "a").unwrap(), 10).unwrap();
    assert!(by_old_label.is_empty());
}

fn update_missing_id_matches_nothing(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let ghost = RecordId::generate();
    let outcome = store
        .update_one_by_id(&ctx, &ghost, &NewTodoItem::new("x", base_time()))
        .unwrap();
    assert_eq!(outcome.matched_count, 0);
    assert_eq!(store.find_one_by_id(&ctx, &ghost).unwrap(), None);
}

fn delete_is_unconditional(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Doomed", base_time()).with_labels(["x"]))
        .unwrap();

    assert!(store.delete_one_by_id(&ctx, &id).unwrap().deleted());
    assert_eq!(store.find_one_by_id(&ctx, &id).unwrap(), None);
    assert!(!store.delete_one_by_id(&ctx, &id).unwrap().deleted());

    let tagged: Vec<TodoItem> =
        consume_cursor(store.find_by_label(&ctx, "x").unwrap(), 10).unwrap();
    assert!(tagged.is_empty());
}

fn cancelled_context_fails_without_writing(store: &dyn TodoItemStore) {
    let ctx = OpContext::background();
    ctx.cancel();
    let err = store
        .insert_one(&ctx, &NewTodoItem::new("Never", base_time()))
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(store.find_all(&ctx).is_err());
    assert!(drain(store, 10).is_empty());
    assert_eq!(store.open_cursors(), 0);
}

fn expired_deadline_fails_promptly(store: &dyn TodoItemStore) {
    let ctx = OpContext::with_deadline(std::time::Instant::now());
    let err = store
        .insert_one(&ctx, &NewTodoItem::new("Late", base_time()))
        .unwrap_err();
    assert_eq!(
        err.persistence_kind(),
        Some(todo_list_service::PersistenceErrorKind::DeadlineExceeded)
    );
    assert!(drain(store, 10).is_empty());
}

fn concurrent_label_adds_do_not_lose_updates(store: Arc<dyn TodoItemStore>) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewTodoItem::new("Shared", base_time()))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let ctx = OpContext::background();
                store.add_label(&ctx, &id, &format!("l{i}")).unwrap();
                store.add_label(&ctx, &id, "common").unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let item = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(item.labels.len(), 9);
    assert_eq!(item.labels.iter().filter(|l| *l == "common").count(), 1);
}

// ============================================================================
// Article contract
// ============================================================================

fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()
}

fn insert_article_then_find(store: &dyn ArticleStore) {
    let ctx = OpContext::background();
    let new = NewArticle::new("Headline", far_future(), "body text");
    let id = store.insert_one(&ctx, &new).unwrap();

    let article: Article = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(article.id, id);
    assert_eq!(article.title, "Headline");
    assert_eq!(article.expiration_date, far_future());
    assert_eq!(article.description, "body text");
    assert!(article.image_file_paths.is_empty());

    assert_eq!(
        store.find_one_by_id(&ctx, &RecordId::generate()).unwrap(),
        None
    );
}

fn append_image_suppresses_duplicates(store: &dyn ArticleStore) {
    let ctx = OpContext::background();
    let id = store
        .insert_one(&ctx, &NewArticle::new("A", far_future(), "body"))
        .unwrap();

    assert!(store.append_image(&ctx, &id, "images/p1").unwrap().modified());
    let dup = store.append_image(&ctx, &id, "images/p1").unwrap();
    assert!(dup.matched());
    assert!(!dup.modified());
    store.append_image(&ctx, &id, "images/p2").unwrap();

    let article = store.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(article.image_file_paths, vec!["images/p1", "images/p2"]);

    let ghost = store
        .append_image(&ctx, &RecordId::generate(), "images/p3")
        .unwrap();
    assert!(!ghost.matched());
}

fn titles_partition_by_image_presence(store: &dyn ArticleStore) {
    let ctx = OpContext::background();
    for title in ["plain-1", "plain-2", "plain-3"] {
        store
            .insert_one(&ctx, &NewArticle::new(title, far_future(), "body"))
            .unwrap();
    }
    for title in ["pic-1", "pic-2", "pic-3"] {
        let id = store
            .insert_one(&ctx, &NewArticle::new(title, far_future(), "body"))
            .unwrap();
        store
            .append_image(&ctx, &id, &format!("images/{title}"))
            .unwrap();
    }

    assert_eq!(
        store.find_titles_by_has_image(&ctx, true).unwrap(),
        vec!["pic-1", "pic-2", "pic-3"]
    );
    assert_eq!(
        store.find_titles_by_has_image(&ctx, false).unwrap(),
        vec!["plain-1", "plain-2", "plain-3"]
    );
    assert_eq!(store.find_all_titles(&ctx).unwrap().len(), 6);
}

fn purge_reclaims_only_expired(store: &dyn ArticleStore) {
    let ctx = OpContext::background();
    let now = base_time();
    let stale = store
        .insert_one(&ctx, &NewArticle::new("stale", now - Duration::minutes(5), "b"))
        .unwrap();
    store
        .insert_one(&ctx, &NewArticle::new("fresh", now + Duration::minutes(5), "b"))
        .unwrap();

    assert_eq!(store.purge_expired(now).unwrap(), 1);
    assert_eq!(store.find_one_by_id(&ctx, &stale).unwrap(), None);
    assert_eq!(store.find_all_titles(&ctx).unwrap(), vec!["fresh"]);
}

fn article_validation_rejects_bad_bodies(store: &dyn ArticleStore) {
    let ctx = OpContext::background();
    let long = "x".repeat(todo_list_service::models::MAX_ARTICLE_DESCRIPTION_CHARS + 1);
    for bad in [
        NewArticle::new("", far_future(), "body"),
        NewArticle::new("title", far_future(), ""),
        NewArticle::new("title", far_future(), long),
    ] {
        let err = store.insert_one(&ctx, &bad).unwrap_err();
        assert!(matches!(err, todo_list_service::Error::Validation(_)));
    }
    assert!(store.find_all_titles(&ctx).unwrap().is_empty());
}

// ============================================================================
// Backend instantiation
// ============================================================================

macro_rules! todo_contract {
    ($($check:ident),* $(,)?) => {
        mod sqlite_todo {
            use super::*;
            $(
                #[test]
                fn $check() {
                    let store = SqliteTodoStore::in_memory().unwrap();
                    super::$check(&store);
                }
            )*
        }

        mod memory_todo {
            use super::*;
            $(
                #[test]
                fn $check() {
                    let store = InMemoryTodoStore::new();
                    super::$check(&store);
                }
            )*
        }
    };
}

macro_rules! article_contract {
    ($($check:ident),* $(,)?) => {
        mod sqlite_article {
            use super::*;
            $(
                #[test]
                fn $check() {
                    let store = SqliteArticleStore::in_memory().unwrap();
                    super::$check(&store);
                }
            )*
        }

        mod memory_article {
            use super::*;
            $(
                #[test]
                fn $check() {
                    let store = InMemoryArticleStore::new();
                    super::$check(&store);
                }
            )*
        }
    };
}

todo_contract!(
    insert_then_find_returns_equal_record,
    missing_id_is_not_found,
    empty_title_is_rejected_before_storage,
    out_of_range_due_date_is_rejected,
    add_label_is_idempotent,
    remove_absent_label_is_noop,
    label_mutations_on_missing_id_match_nothing,
    find_all_respects_cap,
    find_by_label_returns_exact_subset_in_order,
    update_replaces_fields_and_keeps_id,
    update_missing_id_matches_nothing,
    delete_is_unconditional,
    cancelled_context_fails_without_writing,
    expired_deadline_fails_promptly,
);

article_contract!(
    insert_article_then_find,
    append_image_suppresses_duplicates,
    titles_partition_by_image_presence,
    purge_reclaims_only_expired,
    article_validation_rejects_bad_bodies,
);

#[test]
fn concurrent_label_adds_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TodoItemStore> =
        Arc::new(SqliteTodoStore::new(dir.path().join("todos.db")).unwrap());
    concurrent_label_adds_do_not_lose_updates(store);
}

#[test]
fn concurrent_label_adds_memory() {
    concurrent_label_adds_do_not_lose_updates(Arc::new(InMemoryTodoStore::new()));
}

#[test]
fn shared_handle_serves_both_stores() {
    let handle = open_connection(None).unwrap();
    let todos = SqliteTodoStore::from_handle(Arc::clone(&handle)).unwrap();
    let articles = SqliteArticleStore::from_handle(handle).unwrap();
    let ctx = OpContext::background();

    let todo = todos
        .insert_one(&ctx, &NewTodoItem::new("t", base_time()))
        .unwrap();
    let article = articles
        .insert_one(&ctx, &NewArticle::new("a", far_future(), "b"))
        .unwrap();

    assert!(todos.find_one_by_id(&ctx, &todo).unwrap().is_some());
    assert!(articles.find_one_by_id(&ctx, &article).unwrap().is_some());
    assert_eq!(todos.find_one_by_id(&ctx, &article).unwrap(), None);
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todos.db");
    let ctx = OpContext::background();

    let id = {
        let store = SqliteTodoStore::new(&path).unwrap();
        store
            .insert_one(&ctx, &NewTodoItem::new("Persisted", base_time()).with_labels(["k"]))
            .unwrap()
    };

    let reopened = SqliteTodoStore::new(&path).unwrap();
    let item = reopened.find_one_by_id(&ctx, &id).unwrap().unwrap();
    assert_eq!(item.title, "Persisted");
    assert_eq!(item.labels, vec!["k"]);
}
