use std::{
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use actionstate::*;
use tokio::time::{Instant, sleep};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Greeting {
    name: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An action that fails with "E" on every call, counting calls.
fn always_failing(calls: Arc<AtomicU32>) -> impl ServerAction<(), Data = u32, Error = String> {
    move |_: ()| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, String>("E".to_string())
        }
    }
}

async fn wait_until<T, E>(
    executor: &ActionExecutor<impl Clone + Send + 'static, T, E>,
    pred: impl FnMut(&StatusSnapshot<T, E>) -> bool,
) -> StatusSnapshot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let mut rx = executor.subscribe();
    rx.wait_for(pred).await.expect("executor dropped").clone()
}

#[tokio::test(start_paused = true)]
async fn test_greeting_flow() {
    init_tracing();

    let executor = ActionExecutor::new(
        |input: Greeting| async move {
            sleep(Duration::from_millis(500)).await;
            Ok::<_, String>(format!("Hello, {}", input.name))
        },
        ExecutorOptions::new(),
    );
    assert_eq!(executor.status().status, Status::Idle);

    let handle = tokio::spawn({
        let executor = executor.clone();
        async move {
            executor
                .execute(Greeting {
                    name: "Bob".to_string(),
                })
                .await
        }
    });

    sleep(Duration::from_millis(10)).await;
    assert_eq!(executor.status().status, Status::Pending);

    let outcome = handle.await.expect("execute task panicked");
    assert_eq!(outcome, Execution::Settled(Ok("Hello, Bob".to_string())));

    let status = executor.status();
    assert_eq!(status.status, Status::Success);
    assert_eq!(status.data.as_deref(), Some("Hello, Bob"));
}

#[tokio::test(start_paused = true)]
async fn test_retries_until_exhausted() {
    init_tracing();

    let calls = Arc::new(AtomicU32::new(0));
    let starts = Arc::new(AtomicU32::new(0));
    let errors = Arc::new(AtomicU32::new(0));

    let executor = ActionExecutor::new(
        always_failing(Arc::clone(&calls)),
        ExecutorOptions::new()
            .on_start({
                let starts = Arc::clone(&starts);
                move || {
                    starts.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_error({
                let errors = Arc::clone(&errors);
                move |_: &String| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            })
            .retry(RetryPolicy::new(2).with_delay(Duration::from_millis(100))),
    );

    let started = Instant::now();
    let first = executor.execute(()).await;
    assert_eq!(first.error().map(String::as_str), Some("E"));
    assert_eq!(
        executor.status().status,
        Status::Idle,
        "no error is committed while a retry is scheduled"
    );

    let status = wait_until(&executor, |s| s.is_error).await;
    assert_eq!(status.error.as_deref(), Some("E"));
    assert!(started.elapsed() >= Duration::from_millis(200));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(starts.load(Ordering::SeqCst), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 3);
    assert_eq!(executor.inspect(|s| s.retry_count()), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActionExecutor::new(
        {
            let calls = Arc::clone(&calls);
            move |n: u32| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(n * 2)
                    }
                }
            }
        },
        ExecutorOptions::new()
            .retry(RetryPolicy::new(3).with_delay(Duration::from_millis(50))),
    );

    executor.execute(21).await;
    let status = wait_until(&executor, |s| s.is_success).await;

    assert_eq!(status.data, Some(42));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_execute_drops_pending_retry() {
    init_tracing();

    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActionExecutor::new(
        {
            let calls = Arc::clone(&calls);
            move |n: i32| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        Err("boom".to_string())
                    } else {
                        Ok(n * 10)
                    }
                }
            }
        },
        ExecutorOptions::new()
            .retry(RetryPolicy::new(1).with_delay(Duration::from_millis(100))),
    );

    assert!(executor.execute(1).await.error().is_some());
    let stale = executor.inspect(|s| s.token());

    assert_eq!(executor.execute(2).await.data(), Some(&20));
    assert_ne!(executor.inspect(|s| s.token()), stale);

    // let the first lineage's retry timer fire
    sleep(Duration::from_millis(200)).await;

    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "stale retry must not call the action",
    );
    assert_eq!(executor.status(), StatusSnapshot::success(20));
}

#[tokio::test(start_paused = true)]
async fn test_reset_drops_pending_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActionExecutor::new(
        always_failing(Arc::clone(&calls)),
        ExecutorOptions::new()
            .retry(RetryPolicy::new(1).with_delay(Duration::from_millis(100))),
    );

    executor.execute(()).await;
    executor.reset();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.status(), StatusSnapshot::idle());
    assert_eq!(executor.inspect(|s| s.retry_count()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_update_rolls_back_on_failure() {
    let executor = ActionExecutor::new(
        |_: i32| async {
            sleep(Duration::from_millis(50)).await;
            Err::<i32, String>("rejected".to_string())
        },
        ExecutorOptions::new().initial_data(5),
    );

    let handle = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(6).await }
    });
    sleep(Duration::from_millis(10)).await;

    executor.set_optimistic(6);
    let status = executor.status();
    assert!(status.is_pending);
    assert!(status.is_optimistic);
    assert_eq!(status.data, Some(6));

    let outcome = handle.await.expect("execute task panicked");
    assert_eq!(outcome.error().map(String::as_str), Some("rejected"));

    assert_eq!(executor.status(), StatusSnapshot::success(5));
    assert_eq!(executor.inspect(|s| s.parked().clone()), Parked::Empty);
}

#[tokio::test]
async fn test_optimistic_without_call_then_reset() {
    let executor = ActionExecutor::new(
        |n: i32| async move { Ok::<i32, String>(n) },
        ExecutorOptions::new().initial_data(5),
    );

    executor.update_optimistic(|current| current.copied().unwrap_or(0) + 1);

    assert_eq!(executor.status(), StatusSnapshot::success(6));
    assert_eq!(
        executor.inspect(|s| s.parked().clone()),
        Parked::Filled(ActionResult::success(5))
    );

    executor.reset();
    assert_eq!(executor.status(), StatusSnapshot::idle());
    assert_eq!(executor.inspect(|s| s.parked().clone()), Parked::Empty);
}

#[tokio::test]
async fn test_callbacks_fire_in_order() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let record = |events: &Arc<Mutex<Vec<String>>>, event: String| {
        events.lock().expect("events lock").push(event);
    };

    let executor = ActionExecutor::new(
        |n: i32| async move {
            if n > 0 {
                Ok(n)
            } else {
                Err(format!("bad input {}", n))
            }
        },
        ExecutorOptions::new()
            .on_start({
                let events = Arc::clone(&events);
                move || record(&events, "start".to_string())
            })
            .on_success({
                let events = Arc::clone(&events);
                move |data: &i32| record(&events, format!("success {}", data))
            })
            .on_error({
                let events = Arc::clone(&events);
                move |err: &String| record(&events, format!("error {}", err))
            }),
    );

    executor.execute(3).await;
    executor.execute(-1).await;

    let events = events.lock().expect("events lock").clone();
    assert_eq!(
        events,
        vec!["start", "success 3", "start", "error bad input -1"]
    );
    assert_eq!(
        executor.status(),
        StatusSnapshot::error("bad input -1".to_string())
    );
}

#[tokio::test]
async fn test_callbacks_see_committed_status() {
    type Handle = ActionExecutor<i32, i32, String>;

    let cell: Arc<OnceLock<Handle>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observe = |cell: &Arc<OnceLock<Handle>>, seen: &Arc<Mutex<Vec<Status>>>| {
        let executor = cell.get().expect("executor installed");
        let status = executor.status().status;
        seen.lock().expect("seen lock").push(status);
    };

    let executor: Handle = ActionExecutor::new(
        |n: i32| async move {
            if n > 0 {
                Ok(n)
            } else {
                Err("rejected".to_string())
            }
        },
        ExecutorOptions::new()
            .on_start({
                let (cell, seen) = (Arc::clone(&cell), Arc::clone(&seen));
                move || observe(&cell, &seen)
            })
            .on_success({
                let (cell, seen) = (Arc::clone(&cell), Arc::clone(&seen));
                move |_: &i32| observe(&cell, &seen)
            })
            .on_error({
                let (cell, seen) = (Arc::clone(&cell), Arc::clone(&seen));
                move |_: &String| observe(&cell, &seen)
            }),
    );
    assert!(cell.set(executor.clone()).is_ok());

    executor.execute(1).await;
    executor.execute(-1).await;

    let seen = seen.lock().expect("seen lock").clone();
    assert_eq!(
        seen,
        vec![
            Status::Pending,
            Status::Success,
            Status::Pending,
            Status::Error,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_each_phase() {
    let executor = ActionExecutor::new(
        |_: ()| async {
            sleep(Duration::from_millis(20)).await;
            Ok::<_, String>("done")
        },
        ExecutorOptions::new(),
    );
    let mut rx = executor.subscribe();
    assert_eq!(rx.borrow_and_update().status, Status::Idle);

    let handle = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(()).await }
    });

    rx.changed().await.expect("executor alive");
    assert_eq!(rx.borrow_and_update().status, Status::Pending);

    rx.changed().await.expect("executor alive");
    assert_eq!(rx.borrow_and_update().status, Status::Success);

    handle.await.expect("execute task panicked");
}

#[tokio::test(start_paused = true)]
async fn test_retry_settings_drive_executor() {
    let settings: RetrySettings = serde_json::from_str(r#"{"max_attempts": 1, "delay_ms": 50}"#)
        .expect("valid settings");
    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActionExecutor::new(
        always_failing(Arc::clone(&calls)),
        ExecutorOptions::new().retry(settings),
    );

    let started = Instant::now();
    executor.execute(()).await;
    wait_until(&executor, |s| s.is_error).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_delay_fn_spaces_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let executor = ActionExecutor::new(
        always_failing(Arc::clone(&calls)),
        ExecutorOptions::new().retry(
            RetryPolicy::new(2)
                .with_delay_fn(|attempt, _: &String| Duration::from_millis(100 * attempt as u64)),
        ),
    );

    let started = Instant::now();
    executor.execute(()).await;
    wait_until(&executor, |s| s.is_error).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_millis(300));
}
