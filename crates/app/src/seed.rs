use chrono::{DateTime, Utc};
use serde::Serialize;
use storage::repository::StorageError;
use storage::sqlite::{NewQuestionRecord, SqliteRepository};
use study_core::model::{QuestionId, SubjectId, UserId};

const DEMO_USER: &str = "demo_student";

const SUBJECTS: [(&str, &str); 4] = [
    ("Nutrition", "#0EA5A4"),
    ("Tax Law", "#06B6D4"),
    ("Physics", "#8B5CF6"),
    ("Mathematics", "#F59E0B"),
];

struct SeedQuestion {
    subject: &'static str,
    prompt: &'static str,
    alternatives: [&'static str; 4],
    correct_index: u32,
    explanation: &'static str,
}

const QUESTIONS: [SeedQuestion; 4] = [
    SeedQuestion {
        subject: "Nutrition",
        prompt: "What is the main goal of nutrition?",
        alternatives: [
            "Guarantee legal certainty",
            "Promote health and well-being",
            "Define procedural rules",
            "Protect intellectual property",
        ],
        correct_index: 1,
        explanation: "Nutrition aims to promote health and well-being through adequate food intake.",
    },
    SeedQuestion {
        subject: "Nutrition",
        prompt: "Which are the essential macronutrients?",
        alternatives: [
            "Vitamins, minerals and water",
            "Carbohydrates, proteins and lipids",
            "Fibers, antioxidants and probiotics",
            "Calcium, iron and zinc",
        ],
        correct_index: 1,
        explanation: "Carbohydrates, proteins and lipids are needed in large amounts.",
    },
    SeedQuestion {
        subject: "Tax Law",
        prompt: "Which tax applies to industrialized products?",
        alternatives: ["Income tax", "ICMS", "IPI", "ISS"],
        correct_index: 2,
        explanation: "IPI is the federal tax levied on industrialized products.",
    },
    SeedQuestion {
        subject: "Physics",
        prompt: "What is the SI unit of force?",
        alternatives: ["Joule", "Newton", "Pascal", "Watt"],
        correct_index: 1,
        explanation: "One newton accelerates one kilogram at one metre per second squared.",
    },
];

#[derive(Debug, Serialize)]
pub struct SeedReport {
    pub user_id: UserId,
    pub subjects: Vec<(String, SubjectId)>,
    pub questions: Vec<QuestionId>,
}

/// Insert the demo user, subjects and questions. Safe to run repeatedly.
pub async fn run(repo: &SqliteRepository, now: DateTime<Utc>) -> Result<SeedReport, StorageError> {
    let user_id = repo.ensure_user(DEMO_USER, now).await?;

    let mut subjects = Vec::with_capacity(SUBJECTS.len());
    for (name, color) in SUBJECTS {
        let id = repo.ensure_subject(name, color, now).await?;
        subjects.push((name.to_owned(), id));
    }

    let mut questions = Vec::with_capacity(QUESTIONS.len());
    for question in &QUESTIONS {
        let Some(subject_id) = subjects
            .iter()
            .find(|(name, _)| name == question.subject)
            .map(|(_, id)| *id)
        else {
            return Err(StorageError::Invalid(format!(
                "seed question references unknown subject {}",
                question.subject
            )));
        };
        let id = repo
            .ensure_question(NewQuestionRecord {
                subject_id,
                prompt: question.prompt.to_owned(),
                alternatives: question.alternatives.iter().map(|a| (*a).to_owned()).collect(),
                correct_index: question.correct_index,
                explanation: Some(question.explanation.to_owned()),
                created_at: now,
            })
            .await?;
        questions.push(id);
    }

    tracing::info!(
        user_id = user_id.value(),
        subjects = subjects.len(),
        questions = questions.len(),
        "seed data ensured"
    );
    Ok(SeedReport {
        user_id,
        subjects,
        questions,
    })
}
