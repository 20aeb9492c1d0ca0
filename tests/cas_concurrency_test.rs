//! Tests for multi-worker coordination through conditional writes.
//!
//! Two state stores sharing one record store behave like two worker
//! processes: each holds a private snapshot, and a worker whose snapshot
//! went stale must lose its conditional write, adopt the winner's
//! document, and recompute.

mod common;

use common::{swarm, temporal_config, Harness};
use hypersearch::domain::models::SwarmStatus;

#[tokio::test]
async fn test_connect_race_converges_on_one_document() -> anyhow::Result<()> {
    let harness = Harness::new();
    let w1 = harness.connect(temporal_config()).await?;
    let w2 = harness.connect(temporal_config()).await?;

    // The second worker adopted the first worker's document rather than
    // creating its own.
    assert_eq!(w1.state(), w2.state());
    assert_eq!(w2.state().swarms.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_stale_worker_retries_and_keeps_both_updates() -> anyhow::Result<()> {
    let harness = Harness::new();
    let mut w1 = harness.connect(temporal_config()).await?;
    let mut w2 = harness.connect(temporal_config()).await?;
    harness.results.add_result(&swarm(&["a"]), "m-a", 1.0).await;
    harness.results.add_result(&swarm(&["b"]), "m-b", 2.0).await;

    // w1 writes first; w2's snapshot is now stale, so its own transition
    // must lose one conditional write, adopt w1's document, and reapply.
    w1.set_swarm_state(&swarm(&["a"]), SwarmStatus::Completed)
        .await?;
    w2.set_swarm_state(&swarm(&["b"]), SwarmStatus::Completed)
        .await?;

    // w2 converged on a document containing both transitions.
    let a = w2.state().swarms.get(&swarm(&["a"])).unwrap();
    let b = w2.state().swarms.get(&swarm(&["b"])).unwrap();
    assert_eq!(a.status, SwarmStatus::Completed);
    assert_eq!(a.best_model_id.as_deref(), Some("m-a"));
    assert_eq!(b.status, SwarmStatus::Completed);
    assert_eq!(b.best_model_id.as_deref(), Some("m-b"));

    // w1 sees the same document after a refresh.
    w1.read_state().await?;
    assert_eq!(w1.state(), w2.state());
    Ok(())
}

#[tokio::test]
async fn test_stale_worker_does_not_duplicate_sprint_creation() -> anyhow::Result<()> {
    let harness = Harness::new();
    let mut w1 = harness.connect(temporal_config()).await?;
    let mut w2 = harness.connect(temporal_config()).await?;
    harness.results.add_result(&swarm(&["a"]), "m-a", 1.0).await;
    harness.results.add_result(&swarm(&["b"]), "m-b", 2.0).await;
    harness.results.add_result(&swarm(&["c"]), "m-c", 3.0).await;
    for name in ["a", "b", "c"] {
        w1.set_swarm_state(&swarm(&[name]), SwarmStatus::Completed)
            .await?;
    }

    // w1 creates sprint 1. w2 still believes only sprint 0 exists, so its
    // creation attempt must fail the conditional write and land on w1's
    // sprint instead of appending a duplicate.
    let (active, no_more) = w1.is_sprint_active(1).await?;
    assert!(active);
    assert!(!no_more);
    let (active, no_more) = w2.is_sprint_active(1).await?;
    assert!(active);
    assert!(!no_more);

    assert_eq!(w2.state().sprints.len(), 2);
    let mut sprint1 = w2.get_all_swarms(1);
    sprint1.sort();
    assert_eq!(sprint1, vec![swarm(&["a", "b"]), swarm(&["a", "c"])]);
    assert_eq!(w2.state().swarms.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_search_over_is_monotonic_across_workers() -> anyhow::Result<()> {
    let harness = Harness::new();
    let mut w1 = harness.connect(temporal_config()).await?;
    let mut w2 = harness.connect(temporal_config()).await?;
    harness.results.add_result(&swarm(&["a"]), "m-a", 1.0).await;
    harness.results.add_result(&swarm(&["b"]), "m-b", 2.0).await;
    harness.results.add_result(&swarm(&["c"]), "m-c", 3.0).await;
    for name in ["a", "b", "c"] {
        w1.set_swarm_state(&swarm(&[name]), SwarmStatus::Completed)
            .await?;
    }
    w1.is_sprint_active(1).await?;
    harness
        .results
        .add_result(&swarm(&["a", "b"]), "m-ab", 1.5)
        .await;
    harness
        .results
        .add_result(&swarm(&["a", "c"]), "m-ac", 1.7)
        .await;
    w1.set_swarm_state(&swarm(&["a", "b"]), SwarmStatus::Completed)
        .await?;
    w1.set_swarm_state(&swarm(&["a", "c"]), SwarmStatus::Completed)
        .await?;
    assert!(w1.is_search_over());

    // A stale worker finds out the search is over the moment any of its
    // operations touches the shared document.
    assert!(!w2.is_search_over());
    let (active, no_more) = w2.is_sprint_active(1).await?;
    assert!(!active);
    assert!(!no_more);
    w2.read_state().await?;
    assert!(w2.is_search_over());
    assert_eq!(w2.state().last_good_sprint, Some(0));
    Ok(())
}
