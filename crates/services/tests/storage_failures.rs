use std::sync::Arc;

use async_trait::async_trait;
use services::requests::{RecordAnswer, StartSession};
use services::{Clock, ErrorKind, TrainingServices};
use storage::memory::InMemoryRepository;
use storage::repository::{AnswerRepository, QuestionBank, Storage, StorageError};
use study_core::model::{QuestionId, QuestionKey, SessionKind, UserId};
use study_core::time::fixed_now;

struct UnreachableBank;

#[async_trait]
impl QuestionBank for UnreachableBank {
    async fn get_question(&self, _id: QuestionId) -> Result<Option<QuestionKey>, StorageError> {
        Err(StorageError::Connection("question bank offline".into()))
    }
}

#[tokio::test]
async fn collaborator_failures_surface_as_storage_errors() {
    let repo = InMemoryRepository::new();
    repo.add_user(UserId::new(1)).unwrap();
    let mut storage = Storage::from_backend(repo.clone());
    storage.questions = Arc::new(UnreachableBank);
    let svc = TrainingServices::new(storage, Clock::fixed(fixed_now()));

    let session = svc
        .sessions()
        .start(StartSession {
            user_id: UserId::new(1),
            kind: SessionKind::Questions,
            subject_id: None,
            target_count: 1,
        })
        .await
        .unwrap();

    let err = svc
        .answers()
        .record(RecordAnswer {
            session_id: session.id(),
            question_id: QuestionId::new(1),
            chosen_index: 0,
            response_seconds: 0,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.to_string().contains("question bank offline"));
    assert!(repo.answers_for_session(session.id()).await.unwrap().is_empty());
}
