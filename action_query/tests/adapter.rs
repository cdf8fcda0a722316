use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use action_query::*;

#[derive(Debug, Clone, PartialEq)]
struct Page {
    items: Vec<u32>,
    next_cursor: Option<u32>,
}

fn key(parts: &[&str]) -> QueryKey {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Serves 3 pages of 2 items each, addressed by cursor.
async fn list_items(cursor: u32) -> Result<Page, String> {
    if cursor > 4 {
        return Err(format!("cursor {} out of range", cursor));
    }
    Ok(Page {
        items: vec![cursor, cursor + 1],
        next_cursor: if cursor + 2 < 6 {
            Some(cursor + 2)
        } else {
            None
        },
    })
}

#[tokio::test]
async fn test_query_passes_data_through() {
    let query = ActionQuery::new(
        key(&["greeting", "Bob"]),
        Arc::new(|name: String| async move { Ok::<_, String>(format!("Hello, {}", name)) }),
        "Bob".to_string(),
    );

    assert_eq!(query.key(), &key(&["greeting", "Bob"]));
    assert_eq!(query.fetch().await, Ok("Hello, Bob".to_string()));
}

#[tokio::test]
async fn test_query_surfaces_action_error() {
    let query = ActionQuery::new(
        key(&["greeting"]),
        Arc::new(|_: ()| async { Err::<String, _>("unauthorized".to_string()) }),
        (),
    );

    let err = query.fetch().await.expect_err("action failed");
    assert_eq!(err, QueryError::Action("unauthorized".to_string()));
    assert_eq!(err.action_error().map(String::as_str), Some("unauthorized"));
    assert_eq!(err.to_string(), "server action failed: unauthorized");
}

#[tokio::test]
async fn test_query_calls_action_per_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let query = ActionQuery::new(
        key(&["counter"]),
        Arc::new({
            let calls = Arc::clone(&calls);
            move |_: ()| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, String>(n) }
            }
        }),
        (),
    );

    assert_eq!(query.fetch().await, Ok(0));
    assert_eq!(query.fetch().await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_mutation_error_channels() {
    let mutation = ActionMutation::new(Arc::new(|n: i32| async move {
        if n >= 0 {
            Ok(n * 2)
        } else {
            Err("negative".to_string())
        }
    }));

    assert_eq!(mutation.mutate(4).await, Ok(8));
    assert_eq!(
        mutation.mutate(-1).await,
        Err(QueryError::Action("negative".to_string()))
    );

    // settled mode hands the failure back as the outcome itself
    let settled = mutation.clone().mutate_settled(-1).await;
    assert_eq!(settled, Err("negative".to_string()));
}

#[tokio::test]
async fn test_infinite_query_threads_page_params() {
    let mut query = ActionInfiniteQuery::new(
        key(&["items"]),
        Arc::new(list_items),
        0u32,
        |cursor: &u32| *cursor,
        |last: &Page, _, _, _| last.next_cursor,
    );

    assert!(query.has_next_page());
    assert_eq!(query.next_page_param(), Some(0));

    let first = query.fetch_next_page().await.expect("first page");
    assert_eq!(first.items, vec![0, 1]);

    query.fetch_next_page().await.expect("second page");
    query.fetch_next_page().await.expect("third page");

    assert_eq!(query.data().page_params, vec![0, 2, 4]);
    assert_eq!(
        query
            .data()
            .pages
            .iter()
            .flat_map(|p| p.items.clone())
            .collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4, 5]
    );

    assert!(!query.has_next_page());
    assert_eq!(
        query.fetch_next_page().await.cloned(),
        Err(QueryError::NoNextPage)
    );
    assert_eq!(query.data().pages.len(), 3);
}

#[tokio::test]
async fn test_infinite_query_failure_appends_nothing() {
    let mut query = ActionInfiniteQuery::new(
        key(&["items", "broken"]),
        Arc::new(list_items),
        10u32,
        |cursor: &u32| *cursor,
        |last: &Page, _, _, _| last.next_cursor,
    );

    let err = query.fetch_next_page().await.cloned();
    assert_eq!(
        err,
        Err(QueryError::Action("cursor 10 out of range".to_string()))
    );
    assert!(query.data().pages.is_empty());
    assert!(query.data().page_params.is_empty());
    assert_eq!(query.next_page_param(), Some(10));
}

#[tokio::test]
async fn test_infinite_query_next_param_sees_all_pages() {
    let mut query = ActionInfiniteQuery::new(
        key(&["items", "capped"]),
        Arc::new(list_items),
        0u32,
        |cursor: &u32| *cursor,
        // stop after two pages regardless of the server's cursor
        |last: &Page, pages: &[Page], _: &u32, params: &[u32]| {
            assert_eq!(pages.len(), params.len());
            if pages.len() >= 2 {
                None
            } else {
                last.next_cursor
            }
        },
    );

    query.fetch_next_page().await.expect("first page");
    query.fetch_next_page().await.expect("second page");
    assert!(!query.has_next_page());

    query.reset();
    assert!(query.data().pages.is_empty());
    assert_eq!(query.next_page_param(), Some(0));
}

#[test]
fn test_key_factory() {
    let keys = QueryKeyFactory::new()
        .with("posts", |_| key(&["posts"]))
        .with("post", |args| {
            let mut k = key(&["posts"]);
            k.extend(args.iter().map(|a| a.to_string()));
            k
        });

    assert_eq!(keys.len(), 2);
    assert!(keys.contains("post"));
    assert!(!keys.contains("comments"));
    assert_eq!(keys.key("posts", &[]), Some(key(&["posts"])));
    assert_eq!(keys.key("post", &["42"]), Some(key(&["posts", "42"])));
    assert_eq!(keys.key("comments", &["1"]), None);
    assert!(QueryKeyFactory::new().is_empty());
}
