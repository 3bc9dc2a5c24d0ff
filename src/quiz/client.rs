use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Serialize;

use super::{parse_quiz_response, QuizGenerator, QuizQuestion};

const GENERATE_PATH: &str = "generate-quiz";

#[derive(Serialize)]
struct QuizRequest<'a> {
    topic: &'a str,
}

/// Talks to the quiz proxy, which forwards the summary to the language model
/// and answers with a JSON array of questions.
#[derive(Debug, Clone)]
pub struct HttpQuizGenerator {
    client: Client,
    endpoint: String,
}

impl HttpQuizGenerator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            bail!("quiz endpoint is empty");
        }

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{base_url}/{GENERATE_PATH}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QuizGenerator for HttpQuizGenerator {
    async fn generate(&self, summary: &str) -> Result<Vec<QuizQuestion>> {
        info!("requesting quiz ({} chars of summary)", summary.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&QuizRequest { topic: summary })
            .send()
            .await
            .with_context(|| format!("quiz request to {} failed", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read quiz response body")?;

        // The proxy reports its own failures as a 500 carrying a placeholder
        // question, which must not be mistaken for a real quiz.
        if !status.is_success() {
            warn!("quiz endpoint answered {status}");
            return Err(anyhow!("quiz endpoint answered {status}"));
        }

        let questions = parse_quiz_response(&body);
        info!("received {} quiz questions", questions.len());
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let generator =
            HttpQuizGenerator::new("https://quiz.example.test/", Duration::from_secs(5)).unwrap();
        assert_eq!(generator.endpoint(), "https://quiz.example.test/generate-quiz");
    }

    #[test]
    fn rejects_empty_endpoint() {
        assert!(HttpQuizGenerator::new("   ", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn request_body_uses_topic_key() {
        let body = serde_json::to_value(QuizRequest { topic: "lifetimes" }).unwrap();
        assert_eq!(body, serde_json::json!({ "topic": "lifetimes" }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let generator =
            HttpQuizGenerator::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(generator.generate("traits").await.is_err());
    }
}
