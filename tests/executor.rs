//! End-to-end tests for the executor against real child processes.

use procmux::{
    Completion, Executor, ExecutorConfig, ExecutorStats, InlineSink, ProcessTask, ProcmuxError,
    ReadinessMode,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

const DEADLINE: Duration = Duration::from_secs(30);

/// Submit every task, pump completions until each has reported, then shut
/// down and check nothing reported twice.
fn run_tasks(config: ExecutorConfig, tasks: Vec<ProcessTask>) -> (Vec<Completion>, ExecutorStats) {
    let (executor, completions) = Executor::with_channel_sink(config).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let count = tasks.len();

    for (index, task) in tasks.into_iter().enumerate() {
        let tx = tx.clone();
        executor
            .submit(task, move |completion| tx.send((index, completion)).unwrap())
            .unwrap();
    }

    let mut results: Vec<Option<Completion>> = (0..count).map(|_| None).collect();
    let mut received = 0;
    let started = Instant::now();
    while received < count {
        assert!(started.elapsed() < DEADLINE, "timed out waiting for completions");
        completions.run_next(Duration::from_millis(100));
        for (index, completion) in rx.try_iter() {
            assert!(results[index].is_none(), "task {index} completed twice");
            results[index] = Some(completion);
            received += 1;
        }
    }

    let stats = executor.stats();
    executor.shutdown();
    completions.run_pending();
    assert!(rx.try_recv().is_err(), "unexpected extra completion");

    (results.into_iter().map(Option::unwrap).collect(), stats)
}

fn run_one(task: ProcessTask) -> Completion {
    let (mut results, _) = run_tasks(ExecutorConfig::default(), vec![task]);
    results.remove(0)
}

#[test]
fn test_output_is_byte_exact() {
    let result = run_one(ProcessTask::shell("printf 'hello\\nworld\\n'").unwrap()).unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "hello\nworld\n");
    assert!(result.execution_end >= result.execution_start);
}

#[test]
fn test_multi_chunk_output_reassembled() {
    let expected: String = (1..=3000).map(|n| format!("{n}\n")).collect();
    assert!(expected.len() > 512 * 4);

    for chunk_size in [512, 7] {
        let config = ExecutorConfig::default().with_read_chunk_size(chunk_size);
        let (results, _) = run_tasks(config, vec![ProcessTask::new(["seq", "1", "3000"]).unwrap()]);
        let result = results.into_iter().next().unwrap().unwrap();
        assert_eq!(result.output, expected, "chunk size {chunk_size}");
    }
}

#[test]
fn test_exit_codes_reported() {
    let tasks = ["exit 0", "exit 1", "exit 2", "exit 255"]
        .iter()
        .map(|cmd| ProcessTask::shell(cmd).unwrap())
        .collect();
    let (results, _) = run_tasks(ExecutorConfig::default(), tasks);

    let codes: Vec<u8> = results.iter().map(|r| r.as_ref().unwrap().exit_code).collect();
    assert_eq!(codes, vec![0, 1, 2, 255]);
}

#[test]
fn test_signal_death_reports_sentinel() {
    let tasks = vec![
        ProcessTask::shell("echo partial; kill -9 $$").unwrap(),
        ProcessTask::shell("kill -TERM $$").unwrap(),
    ];
    let (results, _) = run_tasks(ExecutorConfig::default(), tasks);

    let killed = results[0].as_ref().unwrap();
    assert_eq!(killed.exit_code, 128);
    assert_eq!(killed.output, "Process was terminated by signal 9");

    let terminated = results[1].as_ref().unwrap();
    assert_eq!(terminated.exit_code, 128);
    assert_eq!(terminated.output, "Process was terminated by signal 15");
}

#[cfg(target_os = "linux")]
#[test]
fn test_realtime_signal_death_reports_sentinel() {
    let tasks = vec![
        ProcessTask::shell("echo partial; kill -34 $$").unwrap(),
        ProcessTask::shell("exit 200").unwrap(),
    ];
    let (results, stats) = run_tasks(ExecutorConfig::default(), tasks);

    let killed = results[0].as_ref().unwrap();
    assert_eq!(killed.exit_code, 128);
    assert_eq!(killed.output, "Process was terminated by signal 34");

    assert_eq!(results[1].as_ref().unwrap().exit_code, 200);
    assert_eq!(stats.failed, 0);
}

#[test]
fn test_unspawnable_command_fails() {
    let completion = run_one(ProcessTask::new(["/nonexistent/procmux/check_nothing"]).unwrap());
    match completion {
        Err(ProcmuxError::Spawn { program, .. }) => {
            assert_eq!(program, "/nonexistent/procmux/check_nothing")
        }
        other => panic!("expected spawn failure, got {other:?}"),
    }
}

#[test]
fn test_spawn_failure_does_not_block_others() {
    let tasks = vec![
        ProcessTask::new(["/nonexistent/procmux/a"]).unwrap(),
        ProcessTask::shell("echo still running").unwrap(),
    ];
    let (results, stats) = run_tasks(ExecutorConfig::default().with_max_tasks(1), tasks);

    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().unwrap().output, "still running\n");
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_stderr_merged_in_order() {
    let result = run_one(ProcessTask::shell("echo a; echo b 1>&2; echo c").unwrap()).unwrap();
    assert_eq!(result.output, "a\nb\nc\n");
}

#[test]
fn test_extra_environment_visible_and_wins() {
    let mut extra = BTreeMap::new();
    extra.insert("CHECK_MODE".to_string(), "strict".to_string());
    extra.insert("HOME".to_string(), "/override".to_string());

    let task = ProcessTask::with_environment(
        ["/bin/sh", "-c", "printf '%s %s' \"$CHECK_MODE\" \"$HOME\""],
        &extra,
    )
    .unwrap();

    let result = run_one(task).unwrap();
    assert_eq!(result.output, "strict /override");
}

#[test]
fn test_fifo_admission_with_single_slot() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("order.log");
    let tasks = (1..=3)
        .map(|n| ProcessTask::shell(&format!("sleep 0.05; echo {n} >> '{}'", log.display())).unwrap())
        .collect();

    let (results, stats) = run_tasks(ExecutorConfig::default().with_max_tasks(1), tasks);
    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(std::fs::read_to_string(&log).unwrap(), "1\n2\n3\n");
    assert!(results[1].execution_start >= results[0].execution_end);
    assert!(results[2].execution_start >= results[1].execution_end);
    assert_eq!(stats.max_active, 1);
}

#[test]
fn test_capacity_bound_respected() {
    let tasks = (0..6).map(|_| ProcessTask::shell("sleep 0.1").unwrap()).collect();
    let (results, stats) = run_tasks(ExecutorConfig::default().with_max_tasks(2), tasks);

    assert!(results.iter().all(|r| r.as_ref().unwrap().is_ok()));
    assert!(stats.max_active <= 2, "max_active = {}", stats.max_active);
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.submitted, 6);
}

#[test]
fn test_many_tasks_complete_once() {
    let tasks = (0..40)
        .map(|n| ProcessTask::shell(&format!("echo task-{n}")).unwrap())
        .collect();
    let (results, stats) = run_tasks(ExecutorConfig::default(), tasks);

    for (n, result) in results.iter().enumerate() {
        assert_eq!(result.as_ref().unwrap().output, format!("task-{n}\n"));
    }
    assert_eq!(stats.completed, 40);
    assert_eq!(stats.active, 0);
}

#[test]
fn test_sleep_readiness_mode() {
    let config = ExecutorConfig::default()
        .with_readiness(ReadinessMode::Sleep)
        .with_fallback_interval(Duration::from_millis(5));
    let tasks = vec![
        ProcessTask::shell("printf sleepy").unwrap(),
        ProcessTask::new(["seq", "1", "500"]).unwrap(),
    ];

    let (results, _) = run_tasks(config, tasks);
    assert_eq!(results[0].as_ref().unwrap().output, "sleepy");
    assert!(results[1].as_ref().unwrap().output.ends_with("500\n"));
}

#[test]
fn test_idle_executor_posts_nothing() {
    let (executor, completions) = Executor::with_channel_sink(ExecutorConfig::default()).unwrap();
    assert!(!completions.run_next(Duration::from_millis(200)));
    assert_eq!(executor.stats(), ExecutorStats::default());
}

#[test]
fn test_shutdown_rejects_queued_and_new_tasks() {
    let (executor, completions) =
        Executor::with_channel_sink(ExecutorConfig::default().with_max_tasks(1)).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    for (index, cmd) in ["sleep 0.3", "true", "true"].iter().enumerate() {
        let tx = tx.clone();
        executor
            .submit(ProcessTask::shell(cmd).unwrap(), move |c| tx.send((index, c)).unwrap())
            .unwrap();
    }

    executor.shutdown();
    assert_eq!(completions.run_pending(), 3);

    let mut results: Vec<_> = rx.try_iter().collect();
    results.sort_by_key(|(index, _)| *index);
    assert_eq!(results.len(), 3);
    assert!(matches!(results[1].1, Err(ProcmuxError::ShutDown)));
    assert!(matches!(results[2].1, Err(ProcmuxError::ShutDown)));
    match &results[0].1 {
        Ok(result) => assert_eq!(result.exit_code, 0),
        Err(e) => assert!(matches!(e, ProcmuxError::ShutDown)),
    }

    let err = executor
        .submit(ProcessTask::shell("true").unwrap(), |_| {})
        .unwrap_err();
    assert!(matches!(err, ProcmuxError::ShutDown));
}

#[test]
fn test_inline_sink_runs_on_worker_thread() {
    let executor = Executor::new(ExecutorConfig::default(), Arc::new(InlineSink)).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);

    executor
        .submit(ProcessTask::shell("printf inline").unwrap(), move |c| {
            let thread = std::thread::current().name().map(str::to_string);
            tx.send((thread, c)).unwrap();
        })
        .unwrap();

    let (thread, completion) = rx.recv_timeout(DEADLINE).unwrap();
    assert_eq!(thread.as_deref(), Some("procmux-worker"));
    assert_eq!(completion.unwrap().output, "inline");
}

#[test]
fn test_global_executor() {
    let global = procmux::global().unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);

    global
        .submit(ProcessTask::shell("echo global").unwrap(), move |c| {
            tx.send(c).unwrap()
        })
        .unwrap();

    let started = Instant::now();
    while rx.is_empty() {
        assert!(started.elapsed() < DEADLINE);
        global.completions().run_next(Duration::from_millis(100));
    }
    assert_eq!(rx.recv().unwrap().unwrap().output, "global\n");
}
