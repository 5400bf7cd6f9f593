use services::requests::StartSession;
use services::{Clock, TrainingError, TrainingServices};
use storage::memory::InMemoryRepository;
use storage::repository::{MasteryRepository, Storage};
use storage::sqlite::SqliteRepository;
use study_core::Conflict;
use study_core::model::{SessionKind, UserId};
use study_core::time::fixed_now;

fn start(user_id: UserId) -> StartSession {
    StartSession {
        user_id,
        kind: SessionKind::Questions,
        subject_id: None,
        target_count: 10,
    }
}

async fn race_starts(svc: &TrainingServices, user_id: UserId, racers: usize) -> (usize, usize) {
    let mut handles = Vec::new();
    for _ in 0..racers {
        let sessions = svc.sessions();
        handles.push(tokio::spawn(
            async move { sessions.start(start(user_id)).await },
        ));
    }

    let (mut opened, mut conflicts) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(TrainingError::Conflict(Conflict::ActiveSession { .. })) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    (opened, conflicts)
}

fn temp_db(tag: &str) -> (std::path::PathBuf, String) {
    let path = std::env::temp_dir().join(format!(
        "study-services-{tag}-{}.sqlite3",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let url = format!("sqlite://{}?mode=rwc", path.display());
    (path, url)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_memory_concurrent_starts_leave_one_active() {
    let repo = InMemoryRepository::new();
    repo.add_user(UserId::new(1)).unwrap();
    let svc = TrainingServices::new(Storage::from_backend(repo), Clock::fixed(fixed_now()));

    assert_eq!(race_starts(&svc, UserId::new(1), 16).await, (1, 15));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_starts_leave_one_active() {
    let (path, url) = temp_db("starts");
    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    let user = repo.ensure_user("racer", fixed_now()).await.unwrap();
    let svc = TrainingServices::new(Storage::from_backend(repo.clone()), Clock::fixed(fixed_now()));

    assert_eq!(race_starts(&svc, user, 8).await, (1, 7));

    repo.pool().close().await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_metric_updates_are_not_lost() {
    let (path, url) = temp_db("folds");
    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    let user = repo.ensure_user("folder", fixed_now()).await.unwrap();
    let subject = repo
        .ensure_subject("Mathematics", "#F59E0B", fixed_now())
        .await
        .unwrap();
    let svc = TrainingServices::new(Storage::from_backend(repo.clone()), Clock::fixed(fixed_now()));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let aggregator = svc.aggregator();
        handles.push(tokio::spawn(async move {
            aggregator.update(user, subject, 2, 50.0).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let metric = repo.get_metric(user, subject).await.unwrap().unwrap();
    assert_eq!(metric.study_minutes(), 20);
    assert_eq!(metric.streak_days(), 1);
    assert!((metric.accuracy() - 50.0).abs() < 1e-9);
    assert_eq!(metric.subject_id(), subject);

    repo.pool().close().await;
    let _ = std::fs::remove_file(&path);
}
