use chrono::Duration;
use storage::repository::{
    AnswerRepository, MasteryRepository, QuestionBank, SessionClose, SessionQuery,
    SessionRepository, StorageError, SubjectCatalog, TrainingPersistence, UserDirectory,
};
use storage::sqlite::{NewQuestionRecord, SqliteRepository};
use study_core::Conflict;
use study_core::model::{
    NewAnswer, NewTrainingSession, QuestionId, SessionKind, SessionScore, SubjectId, UserId,
};
use study_core::time::fixed_now;

struct Fixture {
    repo: SqliteRepository,
    user: UserId,
    subject: SubjectId,
    questions: Vec<QuestionId>,
}

async fn fixture(name: &str) -> Fixture {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    let user = repo.ensure_user("ana", fixed_now()).await.unwrap();
    let subject = repo
        .ensure_subject("Physics", "#8B5CF6", fixed_now())
        .await
        .unwrap();

    let mut questions = Vec::new();
    for prompt in ["Q1", "Q2", "Q3"] {
        let id = repo
            .ensure_question(NewQuestionRecord {
                subject_id: subject,
                prompt: prompt.into(),
                alternatives: vec!["a".into(), "b".into(), "c".into()],
                correct_index: 1,
                explanation: Some("because".into()),
                created_at: fixed_now(),
            })
            .await
            .unwrap();
        questions.push(id);
    }

    Fixture {
        repo,
        user,
        subject,
        questions,
    }
}

fn new_session(user: UserId, subject: Option<SubjectId>) -> NewTrainingSession {
    NewTrainingSession {
        user_id: user,
        kind: SessionKind::Questions,
        subject_id: subject,
        target_count: 10,
        started_at: fixed_now(),
    }
}

#[tokio::test]
async fn catalog_lookups_and_idempotent_seeding() {
    let f = fixture("memdb_catalog").await;

    assert!(f.repo.user_exists(f.user).await.unwrap());
    assert!(!f.repo.user_exists(UserId::new(999)).await.unwrap());
    assert_eq!(
        f.repo.subject_name(f.subject).await.unwrap().as_deref(),
        Some("Physics")
    );
    assert!(!f.repo.subject_exists(SubjectId::new(999)).await.unwrap());

    // Seeding twice returns the same ids.
    assert_eq!(f.repo.ensure_user("ana", fixed_now()).await.unwrap(), f.user);
    assert_eq!(
        f.repo
            .ensure_subject("Physics", "#000000", fixed_now())
            .await
            .unwrap(),
        f.subject
    );

    let key = f.repo.get_question(f.questions[0]).await.unwrap().unwrap();
    assert_eq!(key.correct_index, 1);
    assert_eq!(key.option_count, 3);
    assert!(!key.has_option(3));
    assert_eq!(key.explanation.as_deref(), Some("because"));
    let alternatives = f
        .repo
        .question_alternatives(f.questions[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alternatives, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn out_of_range_correct_index_is_rejected() {
    let f = fixture("memdb_bad_question").await;
    let err = f
        .repo
        .ensure_question(NewQuestionRecord {
            subject_id: f.subject,
            prompt: "broken".into(),
            alternatives: vec!["only".into()],
            correct_index: 3,
            explanation: None,
            created_at: fixed_now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Invalid(_)));
}

#[tokio::test]
async fn one_active_session_per_user() {
    let f = fixture("memdb_one_active").await;

    let first = f.repo.open_session(new_session(f.user, None)).await.unwrap();
    let err = f
        .repo
        .open_session(new_session(f.user, Some(f.subject)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Conflict(Conflict::ActiveSession { session_id, .. }) if session_id == first.id()
    ));

    let active = f.repo.active_session(f.user).await.unwrap().unwrap();
    assert_eq!(active.id(), first.id());
}

#[tokio::test]
async fn answers_count_and_duplicates_roll_back() {
    let f = fixture("memdb_answers").await;
    let session = f
        .repo
        .open_session(new_session(f.user, Some(f.subject)))
        .await
        .unwrap();
    let key = f.repo.get_question(f.questions[0]).await.unwrap().unwrap();

    let recorded = f
        .repo
        .record_answer(NewAnswer::graded(session.id(), &key, 1, 4, fixed_now()))
        .await
        .unwrap();
    assert!(recorded.answer.correct);
    assert_eq!(recorded.session.completed_count(), 1);

    let err = f
        .repo
        .record_answer(NewAnswer::graded(session.id(), &key, 0, 4, fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Conflict(Conflict::DuplicateAnswer { .. })
    ));

    let stored = f.repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.completed_count(), 1);
    assert_eq!(
        f.repo.answers_for_session(session.id()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn finalize_scores_folds_and_freezes() {
    let f = fixture("memdb_finalize").await;
    let session = f
        .repo
        .open_session(new_session(f.user, Some(f.subject)))
        .await
        .unwrap();

    for (question, chosen) in f.questions.iter().take(2).zip([1_u32, 0]) {
        let key = f.repo.get_question(*question).await.unwrap().unwrap();
        f.repo
            .record_answer(NewAnswer::graded(session.id(), &key, chosen, 5, fixed_now()))
            .await
            .unwrap();
    }

    let ended_at = fixed_now() + Duration::seconds(300);
    let close = SessionClose {
        ended_at,
        today: ended_at.date_naive(),
    };
    let done = f.repo.finalize_session(session.id(), close).await.unwrap();

    assert!(done.session.is_finalized());
    assert_eq!(done.session.elapsed_seconds(), 300);
    assert_eq!(done.session.ended_at(), Some(ended_at));
    assert_eq!(done.score, SessionScore::new(1, 2));

    let metric = done.metric.unwrap();
    assert_eq!(metric.study_minutes(), 5);
    assert!((metric.accuracy() - 50.0).abs() < 1e-9);
    assert_eq!(metric.streak_days(), 1);
    assert_eq!(
        f.repo.get_metric(f.user, f.subject).await.unwrap(),
        Some(metric)
    );

    // Finalized sessions accept neither answers nor a second finalize.
    let key = f.repo.get_question(f.questions[2]).await.unwrap().unwrap();
    let late = f
        .repo
        .record_answer(NewAnswer::graded(session.id(), &key, 1, 1, fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(late, StorageError::NotFound(_)));
    let again = f
        .repo
        .finalize_session(session.id(), close)
        .await
        .unwrap_err();
    assert!(matches!(again, StorageError::NotFound(_)));

    // The user may start again.
    f.repo.open_session(new_session(f.user, None)).await.unwrap();
}

#[tokio::test]
async fn listing_filters_and_orders() {
    let f = fixture("memdb_listing").await;

    let mut ids = Vec::new();
    for offset in [60_i64, 120] {
        let session = f
            .repo
            .open_session(new_session(f.user, Some(f.subject)))
            .await
            .unwrap();
        let ended_at = fixed_now() + Duration::seconds(offset);
        f.repo
            .finalize_session(
                session.id(),
                SessionClose {
                    ended_at,
                    today: ended_at.date_naive(),
                },
            )
            .await
            .unwrap();
        ids.push(session.id());
    }
    let open = f.repo.open_session(new_session(f.user, None)).await.unwrap();

    let all = f
        .repo
        .list_sessions(&SessionQuery::for_user(f.user))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let finalized = f
        .repo
        .list_sessions(&SessionQuery::finalized(f.user).with_subject(f.subject))
        .await
        .unwrap();
    let finalized_ids: Vec<_> = finalized.iter().map(|s| s.id()).collect();
    assert_eq!(finalized_ids, vec![ids[1], ids[0]]);
    assert!(!finalized_ids.contains(&open.id()));

    let recent = f
        .repo
        .list_sessions(
            &SessionQuery::finalized(f.user).ended_since(fixed_now() + Duration::seconds(90)),
        )
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id(), ids[1]);

    let limited = f
        .repo
        .list_sessions(&SessionQuery::for_user(f.user).limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn get_or_create_metric_starts_at_zero() {
    let f = fixture("memdb_metric_create").await;
    let metric = f
        .repo
        .get_or_create_metric(f.user, f.subject, fixed_now())
        .await
        .unwrap();
    assert_eq!(metric.study_minutes(), 0);
    assert_eq!(metric.accuracy(), 0.0);
    assert_eq!(metric.streak_days(), 0);
    assert_eq!(metric.last_activity(), None);

    let metrics = f.repo.metrics_for_user(f.user).await.unwrap();
    assert_eq!(metrics.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_yield_one_active_session() {
    let path = std::env::temp_dir().join(format!(
        "study-concurrent-{}-{}.sqlite3",
        std::process::id(),
        fixed_now().timestamp()
    ));
    let _ = std::fs::remove_file(&path);
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    let user = repo.ensure_user("racer", fixed_now()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.open_session(new_session(user, None)).await
        }));
    }

    let mut opened = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(StorageError::Conflict(Conflict::ActiveSession { .. })) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(conflicts, 7);

    repo.pool().close().await;
    let _ = std::fs::remove_file(&path);
}
