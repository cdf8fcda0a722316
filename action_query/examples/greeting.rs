use std::{sync::Arc, time::Duration};

use action_query::{ActionMutation, ActionQuery, QueryKeyFactory};
use actionstate::{ActionExecutor, ExecutorOptions, RetryPolicy};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Greeting {
    name: String,
}

/// Rejects empty names, takes a while otherwise.
async fn greet(input: Greeting) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    if input.name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    Ok(format!("Hello, {}", input.name))
}

/// Walks one server action through the executor and the cache adapters.
///
/// Run with `RUST_LOG=debug` to see every transition the executor makes.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Greeting Action Demo ===\n");

    let executor = ActionExecutor::new(
        greet,
        ExecutorOptions::new()
            .on_start(|| println!("  [on_start] calling server action"))
            .on_success(|data: &String| println!("  [on_success] {}", data))
            .on_error(|err: &String| println!("  [on_error] {}", err))
            .retry(RetryPolicy::new(1).with_delay(Duration::from_millis(100))),
    );

    println!("Initial status: {}", executor.status().status);

    // Scenario 1: a plain call
    println!("\n>>> execute(Bob)\n");
    let outcome = executor
        .execute(Greeting {
            name: "Bob".to_string(),
        })
        .await;
    println!("  outcome: {:?}", outcome);
    println!("  status:  {:?}", executor.status());

    // Scenario 2: optimistic update that the server rejects
    println!("\n>>> set_optimistic + execute(\"\")\n");
    let pending = tokio::spawn({
        let executor = executor.clone();
        async move {
            executor
                .execute(Greeting {
                    name: String::new(),
                })
                .await
        }
    });
    tokio::task::yield_now().await;
    executor.set_optimistic("Hello, ...".to_string());
    println!("  while pending: {:?}", executor.status());

    if let Ok(outcome) = pending.await {
        println!("  first attempt: {:?}", outcome);
    }
    let mut rx = executor.subscribe();
    // the retry fails too, restoring the result from before the optimistic update
    if let Ok(status) = rx
        .wait_for(|s| s.data.as_deref() == Some("Hello, Bob"))
        .await
    {
        println!("  after retry: {:?} (rolled back)", *status);
    }

    // Scenario 3: the same action behind a query cache
    println!("\n>>> query adapters\n");
    let keys = QueryKeyFactory::new().with("greeting", |args| {
        let mut key = vec!["greeting".to_string()];
        key.extend(args.iter().map(|a| a.to_string()));
        key
    });

    let action = Arc::new(greet);
    let query = ActionQuery::new(
        keys.key("greeting", &["Alice"]).unwrap_or_default(),
        Arc::clone(&action),
        Greeting {
            name: "Alice".to_string(),
        },
    );
    println!("  query {:?}: {:?}", query.key(), query.fetch().await);

    let mutation = ActionMutation::new(action);
    println!(
        "  mutate(\"\"): {:?}",
        mutation
            .mutate(Greeting {
                name: String::new(),
            })
            .await
    );

    executor.reset();
    println!("\nAfter reset: {}", executor.status().status);
}
