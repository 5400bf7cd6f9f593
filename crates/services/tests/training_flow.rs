use chrono::Duration;
use services::requests::{RecordAnswerRequest, StartSessionRequest};
use services::{Clock, ErrorKind, TrainingError, TrainingServices};
use storage::memory::InMemoryRepository;
use storage::repository::{AnswerRepository, MasteryRepository, Storage};
use study_core::model::{QuestionId, QuestionKey, SessionKind, SessionState, SubjectId, UserId};
use study_core::time::fixed_now;
use study_core::{Conflict, EntityKind, NotFound};

const USER: u64 = 1;
const SUBJECT: u64 = 7;

fn seeded_repo() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.add_user(UserId::new(USER)).unwrap();
    repo.add_subject(SubjectId::new(SUBJECT), "Physics").unwrap();
    for (id, correct_index) in [(1, 2), (2, 0), (3, 1)] {
        repo.add_question(QuestionKey {
            id: QuestionId::new(id),
            correct_index,
            option_count: 4,
            explanation: Some(format!("explanation {id}")),
        })
        .unwrap();
    }
    repo
}

fn services(repo: &InMemoryRepository) -> TrainingServices {
    TrainingServices::new(Storage::from_backend(repo.clone()), Clock::fixed(fixed_now()))
}

fn start_request(target: i64) -> StartSessionRequest {
    StartSessionRequest {
        user_id: Some(USER as i64),
        kind: Some("questions".into()),
        subject_id: Some(SUBJECT as i64),
        target_count: Some(target),
    }
}

fn answer_request(session: u64, question: i64, chosen: i64) -> RecordAnswerRequest {
    RecordAnswerRequest {
        session_id: Some(session as i64),
        question_id: Some(question),
        chosen_index: Some(chosen),
        response_seconds: Some(12),
    }
}

#[tokio::test]
async fn half_right_session_folds_into_mastery() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let session = svc
        .sessions()
        .start(start_request(2).validate().unwrap())
        .await
        .unwrap();
    assert_eq!(session.kind(), SessionKind::Questions);
    assert_eq!(session.completed_count(), 0);
    assert_eq!(session.target_count(), 2);

    let first = svc
        .answers()
        .record(answer_request(session.id().value(), 1, 2).validate().unwrap())
        .await
        .unwrap();
    assert!(first.correct);
    assert_eq!(first.correct_index, 2);
    assert_eq!(first.explanation.as_deref(), Some("explanation 1"));
    assert_eq!((first.completed, first.target), (1, 2));

    let second = svc
        .answers()
        .record(answer_request(session.id().value(), 2, 3).validate().unwrap())
        .await
        .unwrap();
    assert!(!second.correct);
    assert_eq!(second.completed, 2);

    let later = svc.with_clock(Clock::fixed(fixed_now() + Duration::seconds(190)));
    let summary = later.sessions().finalize(session.id()).await.unwrap();
    assert_eq!(summary.accuracy, 50.0);
    assert_eq!(summary.correct_count, 1);
    assert_eq!(summary.total_count, 2);
    assert_eq!(summary.elapsed_minutes, 3);
    assert_eq!(summary.session.elapsed_seconds(), 190);

    let metric = repo
        .get_metric(UserId::new(USER), SubjectId::new(SUBJECT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metric.study_minutes(), 3);
    assert_eq!(metric.accuracy(), 50.0);
    assert_eq!(metric.streak_days(), 1);
    assert_eq!(summary.metric, Some(metric));

    let view = svc.sessions().get(session.id()).await.unwrap();
    assert_eq!(view.state, SessionState::Finalized);
    assert_eq!(view.subject_name.as_deref(), Some("Physics"));
    assert_eq!(view.accuracy, 50.0);
}

#[tokio::test]
async fn second_start_conflicts_with_active_session() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let active = svc
        .sessions()
        .start(start_request(5).validate().unwrap())
        .await
        .unwrap();
    let err = svc
        .sessions()
        .start(start_request(5).validate().unwrap())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(
        err,
        TrainingError::Conflict(Conflict::ActiveSession { session_id, .. }) if session_id == active.id()
    ));
}

#[tokio::test]
async fn start_checks_user_and_subject() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let mut unknown_user = start_request(1);
    unknown_user.user_id = Some(99);
    let err = svc
        .sessions()
        .start(unknown_user.validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::NotFound(NotFound { entity: EntityKind::User, id: 99 })
    ));

    let mut unknown_subject = start_request(1);
    unknown_subject.subject_id = Some(42);
    let err = svc
        .sessions()
        .start(unknown_subject.validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::NotFound(NotFound { entity: EntityKind::Subject, id: 42 })
    ));
}

#[tokio::test]
async fn duplicate_answer_is_rejected_without_side_effects() {
    let repo = seeded_repo();
    let svc = services(&repo);
    let session = svc
        .sessions()
        .start(start_request(3).validate().unwrap())
        .await
        .unwrap();
    let sid = session.id().value();

    svc.answers()
        .record(answer_request(sid, 3, 1).validate().unwrap())
        .await
        .unwrap();
    let err = svc
        .answers()
        .record(answer_request(sid, 3, 0).validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::Conflict(Conflict::DuplicateAnswer { .. })
    ));

    let view = svc.sessions().get(session.id()).await.unwrap();
    assert_eq!(view.session.completed_count(), 1);
    assert_eq!(view.total_count, 1);
}

#[tokio::test]
async fn choice_past_the_alternatives_is_rejected_without_side_effects() {
    let repo = seeded_repo();
    let svc = services(&repo);
    let session = svc
        .sessions()
        .start(start_request(3).validate().unwrap())
        .await
        .unwrap();
    let sid = session.id().value();

    let err = svc
        .answers()
        .record(answer_request(sid, 1, 99).validate().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, TrainingError::Validation(ref e) if e.field == "chosen_index"));

    // One past the last alternative is out of range too.
    let err = svc
        .answers()
        .record(answer_request(sid, 1, 4).validate().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let view = svc.sessions().get(session.id()).await.unwrap();
    assert_eq!(view.session.completed_count(), 0);
    assert!(repo.answers_for_session(session.id()).await.unwrap().is_empty());

    // The question can still be answered with a valid choice.
    let feedback = svc
        .answers()
        .record(answer_request(sid, 1, 3).validate().unwrap())
        .await
        .unwrap();
    assert_eq!(feedback.completed, 1);
}

#[tokio::test]
async fn answers_need_an_active_session_and_a_known_question() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let err = svc
        .answers()
        .record(answer_request(404, 1, 0).validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::NotFound(NotFound { entity: EntityKind::ActiveSession, .. })
    ));

    let session = svc
        .sessions()
        .start(start_request(1).validate().unwrap())
        .await
        .unwrap();
    let err = svc
        .answers()
        .record(answer_request(session.id().value(), 77, 0).validate().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrainingError::NotFound(NotFound { entity: EntityKind::Question, id: 77 })
    ));

    svc.sessions().finalize(session.id()).await.unwrap();
    let err = svc
        .answers()
        .record(answer_request(session.id().value(), 1, 0).validate().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn empty_session_scores_zero_and_cannot_be_refinalized() {
    let repo = seeded_repo();
    let svc = services(&repo);
    let session = svc
        .sessions()
        .start(start_request(4).validate().unwrap())
        .await
        .unwrap();

    let summary = svc.sessions().finalize(session.id()).await.unwrap();
    assert_eq!(summary.accuracy, 0.0);
    assert_eq!(summary.total_count, 0);
    assert_eq!(summary.elapsed_minutes, 0);

    let err = svc.sessions().finalize(session.id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn subject_less_session_leaves_metrics_alone() {
    let repo = seeded_repo();
    let svc = services(&repo);
    let mut request = start_request(1);
    request.subject_id = None;
    request.kind = Some("flashcards".into());

    let session = svc.sessions().start(request.validate().unwrap()).await.unwrap();
    let summary = svc.sessions().finalize(session.id()).await.unwrap();
    assert!(summary.metric.is_none());
    assert!(
        repo.metrics_for_user(UserId::new(USER))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn consecutive_days_grow_the_streak_and_feed_metrics() {
    let repo = seeded_repo();
    let base = services(&repo);

    for day in 0..3 {
        let svc = base.with_clock(Clock::fixed(fixed_now() + Duration::days(day)));
        let session = svc
            .sessions()
            .start(start_request(1).validate().unwrap())
            .await
            .unwrap();
        svc.answers()
            .record(answer_request(session.id().value(), 1, 2).validate().unwrap())
            .await
            .unwrap();
        let finisher = base.with_clock(Clock::fixed(
            fixed_now() + Duration::days(day) + Duration::minutes(20),
        ));
        finisher.sessions().finalize(session.id()).await.unwrap();
    }

    let today = base.with_clock(Clock::fixed(fixed_now() + Duration::days(2)));
    let metrics = today.metrics().user_metrics(UserId::new(USER)).await.unwrap();
    assert_eq!(metrics.summary.total_minutes, 60);
    assert_eq!(metrics.summary.total_hours, 1.0);
    assert_eq!(metrics.summary.longest_streak, 3);
    assert_eq!(metrics.summary.subjects_studied, 1);
    assert_eq!(metrics.summary.mean_accuracy, 100.0);
    assert_eq!(metrics.recent_sessions.len(), 3);
    assert_eq!(metrics.subjects[0].subject_name.as_deref(), Some("Physics"));

    let detail = today
        .metrics()
        .subject_metric(UserId::new(USER), SubjectId::new(SUBJECT))
        .await
        .unwrap();
    assert_eq!(detail.session_count, 3);
    let ends: Vec<_> = detail.sessions.iter().map(|s| s.ended_at()).collect();
    assert!(ends.windows(2).all(|w| w[0] >= w[1]));

    let dashboard = today.metrics().dashboard(UserId::new(USER)).await.unwrap();
    assert_eq!(dashboard.minutes_per_day.len(), 3);
    assert!(dashboard.minutes_per_day.iter().all(|d| d.minutes == 20));
    assert_eq!(dashboard.constancy.len(), 14);
    assert_eq!(
        dashboard.constancy.last().map(|d| d.date),
        Some((fixed_now() + Duration::days(2)).date_naive())
    );
    let studied = dashboard.constancy.iter().filter(|d| d.studied).count();
    assert_eq!(studied, 3);
    assert_eq!(dashboard.accuracy_by_subject[0].accuracy, 100.0);

    // An hour at 100% on a three-day streak trips no rule.
    let insights = today.insights().generate(UserId::new(USER)).await.unwrap();
    assert!(insights.is_empty());
}

#[tokio::test]
async fn finalize_folds_like_the_aggregator() {
    const OTHER: u64 = 8;
    let repo = seeded_repo();
    repo.add_subject(SubjectId::new(OTHER), "Tax Law").unwrap();
    let base = services(&repo);

    for day in 0..2 {
        let start = fixed_now() + Duration::days(day);
        let end = start + Duration::minutes(20);
        let svc = base.with_clock(Clock::fixed(start));
        let session = svc
            .sessions()
            .start(start_request(2).validate().unwrap())
            .await
            .unwrap();
        for (question, chosen) in [(1, 2), (2, 1)] {
            svc.answers()
                .record(
                    answer_request(session.id().value(), question, chosen)
                        .validate()
                        .unwrap(),
                )
                .await
                .unwrap();
        }
        let finisher = base.with_clock(Clock::fixed(end));
        finisher.sessions().finalize(session.id()).await.unwrap();
        finisher
            .aggregator()
            .update(UserId::new(USER), SubjectId::new(OTHER), 20, 50.0)
            .await
            .unwrap();
    }

    let user = UserId::new(USER);
    let via_finalize = repo
        .get_metric(user, SubjectId::new(SUBJECT))
        .await
        .unwrap()
        .unwrap();
    let via_update = repo
        .get_metric(user, SubjectId::new(OTHER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(via_finalize.study_minutes(), 40);
    assert_eq!(via_finalize.streak_days(), 2);
    assert_eq!(via_finalize.study_minutes(), via_update.study_minutes());
    assert_eq!(via_finalize.accuracy(), via_update.accuracy());
    assert_eq!(via_finalize.streak_days(), via_update.streak_days());
    assert_eq!(via_finalize.last_activity(), via_update.last_activity());
}

#[tokio::test]
async fn subject_metric_is_created_lazily() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let detail = svc
        .metrics()
        .subject_metric(UserId::new(USER), SubjectId::new(SUBJECT))
        .await
        .unwrap();
    assert_eq!(detail.subject_name, "Physics");
    assert_eq!(detail.metric.study_minutes(), 0);
    assert_eq!(detail.session_count, 0);
    assert!(
        repo.get_metric(UserId::new(USER), SubjectId::new(SUBJECT))
            .await
            .unwrap()
            .is_some()
    );

    // A zeroed metric trips every rule except praise.
    let insights = svc.insights().generate(UserId::new(USER)).await.unwrap();
    assert_eq!(insights.len(), 3);
}

#[tokio::test]
async fn listing_sessions_requires_a_known_user() {
    let repo = seeded_repo();
    let svc = services(&repo);

    let err = svc
        .sessions()
        .list_for_user(UserId::new(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let session = svc
        .sessions()
        .start(start_request(1).validate().unwrap())
        .await
        .unwrap();
    let listed = svc.sessions().list_for_user(UserId::new(USER)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), session.id());
}
