//! End-to-end coordinator tests
//!
//! Each test runs a real coordinator event loop against worker runtimes that
//! talk over in-memory pipes, so every request crosses the same line protocol
//! a worker process would.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{ProviderPlan, TestCoordinator, TestFixtures};
use coordinator::services::StdioCaller;
use coordinator::FailurePolicy;
use serde_json::{json, Value};
use shared::codec::MAX_MESSAGE_BYTES;
use shared::{Operation, ReplyOutcome, WorkerId};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

fn worker_of(outcome: &ReplyOutcome) -> Value {
    match outcome {
        ReplyOutcome::Res(res) => res["worker"].clone(),
        ReplyOutcome::Error(e) => panic!("expected a result, got error {e}"),
    }
}

fn error_of(outcome: &ReplyOutcome) -> &str {
    match outcome {
        ReplyOutcome::Error(message) => message,
        ReplyOutcome::Res(res) => panic!("expected an error, got {res}"),
    }
}

#[tokio::test]
async fn test_mem_request_is_served_by_first_worker() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(2), ProviderPlan::default()).await;
    let first = coordinator.status().await.workers[0];

    coordinator.submit("mem", "a1", vec![]);
    let reply = coordinator.next_reply().await;

    assert_eq!(reply.id, "a1");
    assert_eq!(reply.channel, "reply-a1");
    assert_eq!(
        reply.outcome,
        ReplyOutcome::Res(json!({"operation": "mem", "worker": first.get(), "args": []}))
    );
    coordinator.assert_quiet().await;

    assert!(coordinator.stop().await.is_empty());
}

#[tokio::test]
async fn test_requests_rotate_across_workers() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(3), ProviderPlan::default()).await;
    let order = coordinator.status().await.workers;

    for i in 0..9 {
        coordinator.submit("time", &format!("t{i}"), vec![]);
    }
    let replies = coordinator.replies(9).await;

    let mut per_worker: HashMap<u64, usize> = HashMap::new();
    for reply in replies.values() {
        let worker = worker_of(&reply.outcome).as_u64().unwrap();
        *per_worker.entry(worker).or_default() += 1;
    }
    assert_eq!(per_worker, HashMap::from([(0, 3), (1, 3), (2, 3)]));
    // Rotation follows the order in which workers became ready
    for (i, worker) in order.iter().enumerate() {
        assert_eq!(worker_of(&replies[&format!("t{i}")].outcome), json!(worker.get()));
    }

    coordinator.stop().await;
}

#[tokio::test]
async fn test_single_argument_crosses_to_worker() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(1), ProviderPlan::default()).await;

    coordinator.submit("fsSize", "f1", vec![json!("/")]);
    let reply = coordinator.next_reply().await;

    assert_eq!(
        reply.outcome,
        ReplyOutcome::Res(json!({"operation": "fsSize", "worker": 0, "args": ["/"]}))
    );
    coordinator.stop().await;
}

#[tokio::test]
async fn test_two_arguments_run_in_coordinator() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(3), ProviderPlan::default()).await;

    coordinator.submit("networkStats", "n1", vec![json!("eth0"), json!("lo")]);
    let reply = coordinator.next_reply().await;

    assert_eq!(worker_of(&reply.outcome), Value::Null);
    assert_eq!(
        reply.outcome,
        ReplyOutcome::Res(json!({"operation": "networkStats", "worker": null, "args": ["eth0", "lo"]}))
    );
    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_empty_pool_runs_everything_in_coordinator() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(0), ProviderPlan::default()).await;

    for op in Operation::ALL {
        coordinator.submit(op.as_str(), op.as_str(), vec![]);
    }
    let replies = coordinator.replies(Operation::ALL.len()).await;

    assert!(replies.values().all(|reply| worker_of(&reply.outcome) == Value::Null));
    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_unknown_operations_never_reach_a_provider() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(2), ProviderPlan::default()).await;

    coordinator.submit("exec", "e1", vec![]);
    coordinator.submit("Mem", "e2", vec![]);
    coordinator.submit("__proto__", "e3", vec![json!(1), json!(2)]);
    coordinator.assert_quiet().await;

    assert_eq!(coordinator.plan.calls(), 0);
    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_invalid_ids_are_dropped() {
    let mut coordinator = TestCoordinator::start(TestFixtures::config(1), ProviderPlan::default()).await;

    coordinator.submit("mem", "", vec![]);
    coordinator.submit("mem", &"z".repeat(51), vec![]);
    coordinator.assert_quiet().await;
    assert_eq!(coordinator.plan.calls(), 0);

    coordinator.stop().await;
}

#[tokio::test]
async fn test_hundred_and_first_request_is_rejected() {
    let plan = ProviderPlan::gated();
    let mut coordinator = TestCoordinator::start(TestFixtures::config(2), plan).await;

    for i in 0..=TestFixtures::CAPACITY {
        coordinator.submit("mem", &format!("r{i}"), vec![]);
    }
    let status = coordinator.status().await;
    assert_eq!(status.pending, TestFixtures::CAPACITY);

    coordinator.plan.open_gate();
    let replies = coordinator.replies(TestFixtures::CAPACITY).await;
    assert!(replies.contains_key("r0"));
    assert!(replies.contains_key("r99"));
    assert!(!replies.contains_key("r100"));
    coordinator.assert_quiet().await;

    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_duplicate_pending_id_gets_one_reply() {
    let plan = ProviderPlan::gated();
    let mut coordinator = TestCoordinator::start(TestFixtures::config(2), plan).await;

    coordinator.submit("mem", "same", vec![]);
    coordinator.submit("mem", "same", vec![]);
    assert_eq!(coordinator.status().await.pending, 1);

    coordinator.plan.open_gate();
    let reply = coordinator.next_reply().await;
    assert_eq!(reply.id, "same");
    coordinator.assert_quiet().await;
    coordinator.stop().await;
}

#[tokio::test]
async fn test_provider_failure_is_reported_to_caller() {
    let plan = ProviderPlan::failing(vec![Operation::Battery]);
    let mut coordinator = TestCoordinator::start(TestFixtures::config(1), plan).await;

    coordinator.submit("battery", "b1", vec![]);
    let reply = coordinator.next_reply().await;

    assert_eq!(reply.id, "b1");
    assert!(error_of(&reply.outcome).contains("sensor unavailable"));
    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_drop_policy_clears_failed_request_silently() {
    let plan = ProviderPlan::failing(vec![Operation::Battery]);
    let config = TestFixtures::config(1).with_failure_policy(FailurePolicy::Drop);
    let mut coordinator = TestCoordinator::start(config, plan).await;

    coordinator.submit("battery", "b1", vec![]);
    coordinator.submit("mem", "m1", vec![]);

    // The healthy request still answers; the failed one never does
    let reply = coordinator.next_reply().await;
    assert_eq!(reply.id, "m1");
    coordinator.assert_quiet().await;
    assert_eq!(coordinator.status().await.pending, 0);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_stale_request_times_out_once() {
    let plan = ProviderPlan::gated();
    let config = TestFixtures::config(1).with_pending_ttl(Some(Duration::from_millis(100)));
    let mut coordinator = TestCoordinator::start(config, plan).await;

    coordinator.submit("processes", "p1", vec![]);
    let reply = coordinator.next_reply().await;
    assert_eq!(reply.id, "p1");
    assert!(error_of(&reply.outcome).contains("timed out"));

    // The worker's late answer finds no pending entry
    coordinator.plan.open_gate();
    coordinator.assert_quiet().await;
    coordinator.stop().await;
}

#[tokio::test]
async fn test_crashed_worker_is_replaced() {
    let plan = ProviderPlan::gated();
    let mut coordinator = TestCoordinator::start(TestFixtures::config(2), plan).await;
    let order = coordinator.status().await.workers;
    let (first, survivor) = (order[0], order[1]);

    coordinator.submit("mem", "inflight", vec![]);
    assert_eq!(coordinator.status().await.pending, 1);
    assert!(coordinator.spawner.kill(first));

    let reply = coordinator.next_reply().await;
    assert_eq!(reply.id, "inflight");
    assert!(error_of(&reply.outcome).contains(&first.to_string()));

    let status = coordinator
        .wait_for(|status| status.workers.len() == 2 && status.restarts == 1)
        .await;
    assert!(!status.workers.contains(&first));
    assert!(status.workers.contains(&WorkerId::new(2)));

    coordinator.plan.open_gate();
    coordinator.submit("mem", "after", vec![]);
    coordinator.submit("mem", "after2", vec![]);
    let replies = coordinator.replies(2).await;
    let mut served_by: Vec<u64> = replies
        .values()
        .map(|reply| worker_of(&reply.outcome).as_u64().unwrap())
        .collect();
    served_by.sort_unstable();
    let mut expected = vec![u64::from(survivor.get()), 2];
    expected.sort_unstable();
    assert_eq!(served_by, expected);

    coordinator.stop().await;
}

#[tokio::test]
async fn test_no_respawn_shrinks_pool() {
    let config = TestFixtures::config(2).with_respawn(false);
    let coordinator = TestCoordinator::start(config, ProviderPlan::default()).await;

    assert!(coordinator.spawner.kill(WorkerId::new(1)));
    let status = coordinator.wait_for(|status| status.workers.len() == 1).await;
    assert_eq!(status.workers, vec![WorkerId::new(0)]);
    assert_eq!(status.restarts, 0);
    assert_eq!(status.starting, 0);

    coordinator.stop().await;
}

#[tokio::test]
async fn test_shutdown_settles_pending_requests() {
    let plan = ProviderPlan::gated();
    let coordinator = TestCoordinator::start(TestFixtures::config(1), plan).await;

    coordinator.submit("graphics", "g1", vec![]);
    assert_eq!(coordinator.status().await.pending, 1);

    let late = coordinator.stop().await;
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].id, "g1");
    assert!(error_of(&late[0].outcome).contains("shutting down"));
}

#[tokio::test]
async fn test_stdio_caller_session() {
    let coordinator = TestCoordinator::start(TestFixtures::config(2), ProviderPlan::default()).await;
    let caller = StdioCaller::new(coordinator.handle.clone()).with_drain_timeout(Duration::from_secs(10));

    let (mut input, caller_in) = duplex(64 * 1024);
    let (caller_out, output) = duplex(64 * 1024);
    input.write_all(TestFixtures::caller_lines().as_bytes()).await.unwrap();
    drop(input);

    let started = tokio::time::Instant::now();
    let summary = caller.run(caller_in, caller_out).await.unwrap();
    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.replied, 2);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.unanswered, 0);
    // Nothing outstanding once input ends, so the drain timeout never applies
    assert!(started.elapsed() < Duration::from_secs(5));

    let mut lines = BufReader::new(output).lines();
    let mut written = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        written.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    assert_eq!(written.len(), 2);

    let a1 = written.iter().find(|reply| reply["id"] == "a1").unwrap();
    assert_eq!(a1["channel"], "reply-a1");
    assert_eq!(a1["res"]["operation"], "mem");

    let generated = written.iter().find(|reply| reply["id"] != "a1").unwrap();
    let id = generated["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(generated["channel"], format!("reply-{id}"));
    assert_eq!(generated["res"]["operation"], "time");

    coordinator.stop().await;
}

#[tokio::test]
async fn test_stdio_caller_skips_oversized_line() {
    let coordinator = TestCoordinator::start(TestFixtures::config(1), ProviderPlan::default()).await;
    let caller = StdioCaller::new(coordinator.handle.clone()).with_drain_timeout(TestFixtures::WAIT);

    let (mut input, caller_in) = duplex(64 * 1024);
    let (caller_out, output) = duplex(64 * 1024);
    let feeder = tokio::spawn(async move {
        let chunk = vec![b'x'; 1024 * 1024];
        for _ in 0..(MAX_MESSAGE_BYTES / chunk.len() + 1) {
            input.write_all(&chunk).await.unwrap();
        }
        input.write_all(b"\n{\"id\":\"ok\",\"operation\":\"mem\"}\n").await.unwrap();
    });

    let summary = caller.run(caller_in, caller_out).await.unwrap();
    feeder.await.unwrap();
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.replied, 1);

    let mut lines = BufReader::new(output).lines();
    let reply: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["id"], "ok");
    assert_eq!(reply["res"]["operation"], "mem");

    coordinator.stop().await;
}

#[tokio::test]
async fn test_stdio_caller_rejects_id_still_in_flight() {
    let coordinator = TestCoordinator::start(TestFixtures::config(1), ProviderPlan::gated()).await;
    let caller = StdioCaller::new(coordinator.handle.clone()).with_drain_timeout(Duration::from_millis(300));

    let (mut input, caller_in) = duplex(64 * 1024);
    let (caller_out, _output) = duplex(64 * 1024);
    input
        .write_all(b"{\"id\":\"d1\",\"operation\":\"mem\"}\n{\"id\":\"d1\",\"operation\":\"time\"}\n")
        .await
        .unwrap();
    drop(input);

    // The gate stays shut, so d1 is still outstanding when the second line arrives
    let summary = caller.run(caller_in, caller_out).await.unwrap();
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.replied, 0);
    assert_eq!(summary.unanswered, 1);
    assert_eq!(coordinator.status().await.pending, 1);

    coordinator.stop().await;
}
