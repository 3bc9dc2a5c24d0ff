//! Retention quizzes generated from a session summary.

mod client;
mod parser;

pub use client::HttpQuizGenerator;
pub use parser::parse_quiz_response;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl QuizQuestion {
    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() >= 2
            && self.correct_index < self.options.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub question: QuizQuestion,
    pub selected_option_index: usize,
}

impl QuizResult {
    pub fn is_correct(&self) -> bool {
        self.selected_option_index == self.question.correct_index
    }
}

pub fn grade(questions: &[QuizQuestion], answers: &[usize]) -> Vec<QuizResult> {
    questions
        .iter()
        .zip(answers)
        .map(|(question, &selected)| QuizResult {
            question: question.clone(),
            selected_option_index: selected,
        })
        .collect()
}

pub fn score(results: &[QuizResult]) -> u32 {
    results.iter().filter(|result| result.is_correct()).count() as u32
}

/// Produces questions from free text. An empty list counts as a failure at
/// the call site, same as an error.
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(&self, summary: &str) -> Result<Vec<QuizQuestion>>;
}

/// Stand-in used when no quiz endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl QuizGenerator for UnconfiguredGenerator {
    async fn generate(&self, _summary: &str) -> Result<Vec<QuizQuestion>> {
        bail!("no quiz endpoint configured; set SKILL_FORGE_QUIZ_URL")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct_index: usize) -> QuizQuestion {
        QuizQuestion {
            question: "What does `?` do?".into(),
            options: vec!["Propagates".into(), "Panics".into(), "Ignores".into()],
            correct_index,
        }
    }

    #[test]
    fn scores_matching_answers() {
        let questions = vec![question(0), question(1), question(2)];
        let results = grade(&questions, &[0, 2, 2]);
        assert_eq!(results.len(), 3);
        assert_eq!(score(&results), 2);
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        assert!(question(2).is_well_formed());
        assert!(!question(3).is_well_formed());
    }

    #[tokio::test]
    async fn unconfigured_generator_always_fails() {
        let err = UnconfiguredGenerator.generate("ownership").await.unwrap_err();
        assert!(err.to_string().contains("SKILL_FORGE_QUIZ_URL"));
    }
}
