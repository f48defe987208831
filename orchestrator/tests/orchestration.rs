mod common;

use common::{
    config,
    registry,
    series,
    KillLog,
    StoppableWorker,
};
use netbench_config::{
    AggregatorKind,
    ParserKind,
    WorkerSpec,
};
use netbench_orchestrator::{
    run_test,
    worker::Worker,
    Error,
    Shutdown,
    WorkerOutput,
    WorkerResult,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::{
        Duration,
        Instant,
    },
};
use temp_dir::TempDir;
use tokio::time::{
    sleep,
    timeout,
};

#[tokio::test]
async fn aligns_series_on_a_common_grid() {
    let config = config(
        AggregatorKind::Timeseries,
        1.0,
        vec![series("a", "1000:10,1002:30"), series("b", "1000:0,1001:1,1002:2")],
    );
    let rs = run_test(config, registry(), Shutdown::new()).await.unwrap();

    assert_eq!(rs.x_values(), &[0.0, 1.0]);
    assert_eq!(rs.series("a").into_owned(), vec![Some(10.0), Some(20.0)]);
    assert_eq!(rs.series("b").into_owned(), vec![Some(0.0), Some(1.0)]);
    assert_eq!(rs.meta("T0").unwrap(), &json!("1970-01-01T00:16:40.000000Z"));
    assert_eq!(rs.meta("FAILED_RUNNERS").unwrap(), &json!(0));
    assert_eq!(rs.meta("SERIES_META:a:MEAN_VALUE").unwrap(), &json!(20.0));
}

#[tokio::test]
async fn samples_far_from_the_grid_are_null() {
    let dense: Vec<String> = (0..=100).map(|t| format!("{t}:1")).collect();
    let config = config(
        AggregatorKind::Timeseries,
        1.0,
        vec![series("sparse", "0:1,100:2"), series("dense", &dense.join(","))],
    );
    let rs = run_test(config, registry(), Shutdown::new()).await.unwrap();

    let sparse = rs.series("sparse");
    assert_eq!(sparse.len(), 100);
    assert!(sparse[6..95].iter().all(Option::is_none));
    assert!(rs.series("dense").iter().all(|v| *v == Some(1.0)));
}

#[tokio::test]
async fn first_point_without_a_close_sample_is_null() {
    let config = config(
        AggregatorKind::Timeseries,
        1.0,
        vec![series("late", "3:7,4:8"), series("early", "0:1,4:1")],
    );
    let rs = run_test(config, registry(), Shutdown::new()).await.unwrap();
    assert_eq!(rs.series("late")[0], None);
    assert_eq!(rs.series("late")[3], Some(7.0));
}

#[tokio::test]
async fn no_data_is_an_aggregation_error() {
    let config = config(
        AggregatorKind::Timeseries,
        0.5,
        vec![
            ("a".to_string(), WorkerSpec::new("a", "empty")),
            ("b".to_string(), WorkerSpec::new("b", "empty")),
        ],
    );
    let err = run_test(config, registry(), Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, Error::Aggregation(ref msg) if msg.starts_with("No data to aggregate")));

    let config = common::config(AggregatorKind::Timeseries, 0.5, vec![series("a", "")]);
    let err = run_test(config, registry(), Shutdown::new()).await.unwrap_err();
    assert!(matches!(err, Error::Aggregation(_)));
}

#[tokio::test]
async fn computed_series_are_added_after_alignment() {
    let avg = WorkerSpec::new("avg", "average").with_apply_to(["s?"]);
    let config = config(
        AggregatorKind::Timeseries,
        1.0,
        vec![
            series("s1", "0:2,1:2,2:2"),
            series("s2", "0:4,1:6,2:8"),
            ("avg".to_string(), avg),
        ],
    );
    let rs = run_test(config, registry(), Shutdown::new()).await.unwrap();
    assert_eq!(rs.series("avg").into_owned(), vec![Some(3.0), Some(4.0)]);
    assert_eq!(rs.meta("SERIES_META:avg:COMPUTED_LATE").unwrap(), &json!(true));
    assert_eq!(rs.meta("SERIES_META:avg:MEAN_VALUE").unwrap(), &json!(4.0));
    assert_eq!(rs.meta("SERIES_META:avg:UNITS").unwrap(), &json!("Mbits/s"));
}

#[tokio::test]
async fn iteration_metadata_is_replaced_each_round() {
    let rounds = Arc::new(AtomicUsize::new(0));
    let mut registry = registry();
    registry.register("counter", {
        let rounds = rounds.clone();
        move |init| {
            let round = rounds.fetch_add(1, Ordering::SeqCst);
            let mut output = WorkerOutput::empty().with_result(WorkerResult::Scalar(round as f64 * 10.0));
            output.metadata.set("ROUND", round);
            if round == 0 {
                output.metadata.set("FIRST_ONLY", true);
            }
            Ok(Box::new(common::FixedWorker {
                name: init.spec.name.clone(),
                output: Some(output),
                finish: init.signals.finish,
            }) as Box<dyn Worker>)
        }
    });

    let mut config = (*config(
        AggregatorKind::Iteration,
        1.0,
        vec![("count".to_string(), WorkerSpec::new("count", "counter"))],
    ))
    .clone();
    config.iterations = 3;
    let rs = run_test(Arc::new(config), registry, Shutdown::new()).await.unwrap();

    assert_eq!(rounds.load(Ordering::SeqCst), 3);
    assert_eq!(rs.x_values(), &[0.0, 1.0, 2.0]);
    assert_eq!(rs.series("count").into_owned(), vec![Some(0.0), Some(10.0), Some(20.0)]);
    assert_eq!(rs.meta("SERIES_META").unwrap(), &json!({"count": {"ROUND": 2}}));
}

#[tokio::test]
async fn run_after_is_honored() {
    let dir = TempDir::new().unwrap();
    let mut workers = Vec::new();
    let mut previous: Option<String> = None;
    for i in 0..5 {
        let name = format!("step{i}");
        let marker = dir.child(&name);
        let delay = fastrand::u32(0..60);
        let check = match &previous {
            Some(prev) => format!("test -e {}", dir.child(prev).display()),
            None => "true".to_string(),
        };
        let command = format!(
            "sh -c 'sleep 0.{delay:03}; {check} && touch {} && echo 1 || echo 0'",
            marker.display()
        );
        let mut spec = WorkerSpec::process(&name, command);
        if let Some(prev) = &previous {
            spec = spec.with_run_after(prev.clone());
        }
        workers.push((name.clone(), spec));
        previous = Some(name);
    }
    // Declared in reverse so that start order cannot help.
    workers.reverse();

    let mut config = (*config(AggregatorKind::Iteration, 1.0, workers)).clone();
    config.iterations = 1;
    let rs = run_test(Arc::new(config), registry(), Shutdown::new()).await.unwrap();
    for i in 0..5 {
        assert_eq!(rs.series(&format!("step{i}")).into_owned(), vec![Some(1.0)], "step{i}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_shutdown_requests_stop_each_worker_once() {
    let kills: KillLog = Arc::new(Mutex::new(Vec::new()));
    let mut registry = registry();
    registry.register("stoppable", {
        let kills = kills.clone();
        move |init| {
            Ok(Box::new(StoppableWorker {
                name: init.spec.name.clone(),
                started: false,
                linger: Duration::from_millis(800),
                finish: init.signals.finish,
                kills: kills.clone(),
            }) as Box<dyn Worker>)
        }
    });
    let config = config(
        AggregatorKind::Timeseries,
        0.5,
        vec![
            ("a".to_string(), WorkerSpec::new("a", "stoppable")),
            ("b".to_string(), WorkerSpec::new("b", "stoppable")),
        ],
    );

    let shutdown = Shutdown::new();
    let run = tokio::spawn(run_test(config, registry, shutdown.clone()));
    sleep(Duration::from_millis(100)).await;
    shutdown.request_graceful();
    // Both workers are still winding down when the second request arrives.
    sleep(Duration::from_millis(400)).await;
    assert!(!run.is_finished());
    let second = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.request_graceful() })
    };
    assert_eq!(second.await.unwrap(), 2);
    let rs = timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();

    let mut kills = kills.lock().unwrap().clone();
    kills.sort();
    assert_eq!(kills, vec![("a".to_string(), true), ("b".to_string(), true)]);
    assert_eq!(rs.series("a").into_owned(), vec![Some(1.0), Some(1.5)]);
}

#[tokio::test]
async fn kill_after_stops_the_worker_gracefully() {
    let first = WorkerSpec::process("first", "sh -c 'echo 1 1; sleep 0.3'").with_parser(ParserKind::Pairs);
    let second = WorkerSpec::process("second", "sh -c 'echo 1 5; echo 2 6; exec sleep 30'")
        .with_parser(ParserKind::Pairs)
        .with_kill_after("first");
    let config = config(
        AggregatorKind::Timeseries,
        0.5,
        vec![("first".to_string(), first), ("second".to_string(), second)],
    );

    let started = Instant::now();
    let rs = timeout(Duration::from_secs(10), run_test(config, registry(), Shutdown::new()))
        .await
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert_eq!(rs.series("second").into_owned(), vec![Some(5.0), Some(5.5)]);
    assert_eq!(rs.raw_values()["second"].len(), 2);
    assert_eq!(rs.meta("FAILED_RUNNERS").unwrap(), &json!(0));
}

#[tokio::test]
async fn graceful_shutdown_keeps_partial_process_output() {
    let spec = WorkerSpec::process("flows", "sh -c 'echo 1 1; echo 2 2; exec sleep 30'").with_parser(ParserKind::Pairs);
    let config = config(AggregatorKind::Timeseries, 0.5, vec![("flows".to_string(), spec)]);

    let shutdown = Shutdown::new();
    let run = tokio::spawn(run_test(config, registry(), shutdown.clone()));
    sleep(Duration::from_millis(500)).await;
    shutdown.request_graceful();
    let rs = timeout(Duration::from_secs(10), run).await.unwrap().unwrap().unwrap();
    assert_eq!(rs.series("flows").into_owned(), vec![Some(1.0), Some(1.5)]);
    assert_eq!(rs.raw_values()["flows"].len(), 2);
}

#[tokio::test]
async fn abort_interrupts_the_run() {
    let config = config(
        AggregatorKind::Timeseries,
        0.5,
        vec![("idle".to_string(), WorkerSpec::process("idle", "sleep 30"))],
    );
    let shutdown = Shutdown::new();
    let run = tokio::spawn(run_test(config, registry(), shutdown.clone()));
    sleep(Duration::from_millis(200)).await;
    shutdown.abort();
    let result = timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::Interrupted)));
}
