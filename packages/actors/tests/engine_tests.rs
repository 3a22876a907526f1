mod common;

use std::collections::HashSet;
use std::time::Duration;

use actors::{JobManager, ManagerError};
use common::{Gated, TestResult, start_manager, wait_for, wait_until};
use queue_core::{
    ConfigError, ExecutionState, FnWork, Job, ListEvent, ManagerConfig, Rejected, UserStatus,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_runs_more_than_max() -> TestResult {
    let (manager, _handle) = start_manager(2).await?;
    let mut events = manager.subscribe();
    let jobs: Vec<Gated> = ["A", "B", "C"]
        .iter()
        .map(|name| Gated::new(name, 2))
        .collect();
    for gated in &jobs {
        manager.add(gated.job.clone()).await?;
    }

    let list = wait_until(&manager, |list| {
        list.len() == 3
            && list[..2]
                .iter()
                .all(|e| e.user_status() == UserStatus::Processing)
    })
    .await?;
    assert_eq!(list[2].user_status(), UserStatus::Queued);

    let stats = manager.engine_stats().await?;
    assert_eq!(stats.running, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.max_concurrency, 2);

    for gated in &jobs {
        gated.complete();
    }

    // Track processing jobs from the event stream until all have finished.
    let mut processing = HashSet::new();
    let mut finished = HashSet::new();
    while finished.len() < jobs.len() {
        let event = wait_for(&mut events, |e| matches!(e, ListEvent::Updated { .. })).await?;
        let snapshot = event.job();
        match snapshot.user_status() {
            UserStatus::Processing => {
                processing.insert(snapshot.id);
            }
            UserStatus::Finished => {
                processing.remove(&snapshot.id);
                finished.insert(snapshot.id);
            }
            _ => {}
        }
        assert!(processing.len() <= 2, "{} processing", processing.len());
    }

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn next_job_starts_when_a_slot_frees() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let a = Gated::new("A", 1);
    let b = Gated::new("B", 1);
    manager.add(a.job.clone()).await?;
    manager.add(b.job.clone()).await?;

    wait_until(&manager, |list| {
        list.len() == 2 && list[0].user_status() == UserStatus::Processing
    })
    .await?;
    assert!(!b.job.has_started());

    a.complete();
    wait_until(&manager, |list| {
        list[0].user_status() == UserStatus::Finished
            && list[1].user_status() == UserStatus::Processing
    })
    .await?;

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn paused_engine_holds_new_jobs() -> TestResult {
    let (manager, _handle) = start_manager(2).await?;
    manager.pause()?;
    assert!(manager.is_paused().await?);

    let a = Gated::new("A", 1);
    manager.add(a.job.clone()).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = manager.engine_stats().await?;
    assert!(stats.paused);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.pending, 1);
    assert_eq!(
        manager.get(0).await?.map(|e| e.user_status()),
        Some(UserStatus::Queued)
    );

    manager.resume()?;
    assert!(!manager.is_paused().await?);
    wait_until(&manager, |list| {
        list.first()
            .is_some_and(|e| e.user_status() == UserStatus::Processing)
    })
    .await?;

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn pause_keeps_running_jobs_going() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let a = Gated::new("A", 2);
    let b = Gated::new("B", 2);
    manager.add(a.job.clone()).await?;
    manager.add(b.job.clone()).await?;
    wait_until(&manager, |list| {
        list.len() == 2 && list[0].user_status() == UserStatus::Processing
    })
    .await?;

    manager.pause()?;
    a.complete();
    wait_until(&manager, |list| list[0].user_status() == UserStatus::Finished).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!b.job.has_started());

    manager.resume()?;
    wait_until(&manager, |list| list[1].user_status() == UserStatus::Processing).await?;

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn finished_jobs_are_evicted_after_retention() -> TestResult {
    let config = ManagerConfig::default()
        .with_max_concurrency(2)
        .with_finished_retention(Duration::from_millis(200));
    let (manager, _handle) = JobManager::start(config).await?;
    let a = Gated::new("A", 1);
    manager.add(a.job.clone()).await?;
    a.complete();

    wait_until(&manager, |list| {
        list.first()
            .is_some_and(|e| e.user_status() == UserStatus::Finished)
    })
    .await?;
    assert_eq!(manager.engine_stats().await?.submitted, 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while manager.engine_stats().await?.submitted > 0 {
        assert!(tokio::time::Instant::now() < deadline, "job never evicted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Eviction only affects the engine; the list keeps the job until cleared.
    assert_eq!(manager.count().await?, 1);
    assert_eq!(manager.clear(&a.job).await?, 0);

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn cancel_all_stops_everything() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let jobs: Vec<Gated> = ["A", "B", "C"]
        .iter()
        .map(|name| Gated::new(name, 5))
        .collect();
    for gated in &jobs {
        manager.add(gated.job.clone()).await?;
    }
    wait_until(&manager, |list| {
        list.len() == 3 && list[0].user_status() == UserStatus::Processing
    })
    .await?;

    manager.cancel_all()?;

    let list = wait_until(&manager, |list| {
        list.iter().all(|e| e.snapshot.can_clear())
    })
    .await?;
    assert!(
        list.iter()
            .all(|e| e.user_status() == UserStatus::Cancelled)
    );
    assert!(list.iter().all(|e| e.snapshot.can_retry()));

    assert_eq!(manager.engine_stats().await?.pending, 0);

    assert_eq!(manager.clear_all().await?, 3);
    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn raising_max_concurrency_launches_waiting_jobs() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let jobs: Vec<Gated> = ["A", "B", "C"]
        .iter()
        .map(|name| Gated::new(name, 2))
        .collect();
    for gated in &jobs {
        manager.add(gated.job.clone()).await?;
    }

    let err = manager.set_max_concurrency(0).await.unwrap_err();
    assert!(matches!(err, ManagerError::Config(ConfigError::ZeroConcurrency)));

    manager.set_max_concurrency(3).await?;
    wait_until(&manager, |list| {
        list.len() == 3
            && list
                .iter()
                .all(|e| e.user_status() == UserStatus::Processing)
    })
    .await?;
    assert_eq!(manager.engine_stats().await?.max_concurrency, 3);

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn zero_concurrency_is_rejected_at_start() -> TestResult {
    let config = ManagerConfig::default().with_max_concurrency(0);
    let err = JobManager::start(config).await.err().ok_or("manager started")?;
    assert!(matches!(err, ManagerError::Config(ConfigError::ZeroConcurrency)));
    Ok(())
}

#[tokio::test]
async fn panicking_work_frees_its_slot() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let boom = Job::with_work(
        "boom",
        FnWork::new("boom", |job: Job| {
            Box::pin(async move {
                if job.progress() == 0 {
                    panic!("work blew up");
                }
            })
        }),
    );
    let next = Gated::new("next", 1);
    manager.add(boom.clone()).await?;
    manager.add(next.job.clone()).await?;

    let list = wait_until(&manager, |list| {
        list.len() == 2
            && list[0].user_status() == UserStatus::Finished
            && list[1].user_status() == UserStatus::Processing
    })
    .await?;
    assert!(list[0].snapshot.can_clear());

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_manager() -> TestResult {
    let (manager, handle) = start_manager(1).await?;
    let a = Gated::new("A", 5);
    let b = Gated::new("B", 5);
    manager.add(a.job.clone()).await?;
    manager.add(b.job.clone()).await?;
    wait_until(&manager, |list| {
        list.first()
            .is_some_and(|e| e.user_status() == UserStatus::Processing)
    })
    .await?;

    manager.shutdown()?;
    tokio::time::timeout(Duration::from_secs(3), handle).await??;

    // Everything the engine tracked is cancelled by the time the manager is gone.
    assert!(a.job.is_cancelled());
    assert!(b.job.is_cancelled());
    assert!(!b.job.has_started());

    // Running work sees the flag and winds down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while a.job.execution_state() != ExecutionState::Finished {
        assert!(tokio::time::Instant::now() < deadline, "work kept running");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    a.complete();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(a.job.progress(), 0);

    assert!(manager.count().await.is_err());
    Ok(())
}

#[tokio::test]
async fn lowering_max_concurrency_lets_running_jobs_finish() -> TestResult {
    let (manager, _handle) = start_manager(2).await?;
    let jobs: Vec<Gated> = ["A", "B", "C"]
        .iter()
        .map(|name| Gated::new(name, 1))
        .collect();
    for gated in &jobs {
        manager.add(gated.job.clone()).await?;
    }
    wait_until(&manager, |list| {
        list.len() == 3
            && list[..2]
                .iter()
                .all(|e| e.user_status() == UserStatus::Processing)
    })
    .await?;

    manager.set_max_concurrency(1).await?;
    let stats = manager.engine_stats().await?;
    assert_eq!(stats.running, 2);
    assert_eq!(stats.max_concurrency, 1);

    // One slot frees but running is still at the new limit.
    jobs[0].complete();
    wait_until(&manager, |list| list[0].user_status() == UserStatus::Finished).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!jobs[2].job.has_started());

    jobs[1].complete();
    wait_until(&manager, |list| {
        list[1].user_status() == UserStatus::Finished
            && list[2].user_status() == UserStatus::Processing
    })
    .await?;

    manager.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn started_jobs_cannot_be_submitted() -> TestResult {
    let (manager, _handle) = start_manager(1).await?;
    let a = Gated::new("A", 1);
    a.job.begin()?;

    let err = manager.add(a.job.clone()).await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejected::NotReady {
            state: ExecutionState::Executing
        })
    ));
    assert_eq!(manager.count().await?, 0);

    manager.shutdown()?;
    Ok(())
}
