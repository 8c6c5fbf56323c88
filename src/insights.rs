use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapters::PromptRunner;
use crate::models::Category;

/// Overall tone of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: Sentiment,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub summary: String,
    pub sentiment: Sentiment,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    sentiment: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    summary: String,
    sentiment: String,
}

#[derive(Debug, Deserialize)]
struct RawRecommendations {
    recommendations: Vec<String>,
}

const SENTIMENT_SYSTEM: &str = "You analyze the sentiment of user-written reviews of movies, books and games. \
Respond with valid JSON only, using double quotes for keys and values.";

const SUMMARY_SYSTEM: &str = "You summarize user-written reviews of movies, books and games. \
Respond with valid JSON only, using double quotes for keys and values.";

const RECOMMEND_SYSTEM: &str = "You are an expert recommendation system. \
Respond with valid JSON only, using double quotes for keys and values.";

/// AI-assisted text endpoints backed by a prompt runner
pub struct Insights<R: PromptRunner> {
    runner: R,
}

impl<R: PromptRunner> Insights<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Classify a review as positive, negative or neutral
    pub async fn analyze_sentiment(&self, review_text: &str) -> Result<SentimentAnalysis> {
        let review_text = require_text(review_text)?;

        let prompt = format!(
            r#"Analyze the sentiment of the following review text. Determine if the sentiment is positive, negative, or neutral. Also, provide a confidence score (0-1) for your analysis.

Review Text: {review_text}

Follow the schema {{"sentiment": string, "confidence": number}}. Ensure that confidence is a number between 0 and 1, and that sentiment is one of "positive", "negative", or "neutral"."#
        );

        let reply = self.runner.run(SENTIMENT_SYSTEM, &prompt).await?;
        let raw: RawSentiment = serde_json::from_str(&extract_json(&reply))
            .context("Failed to parse sentiment output")?;

        let analysis = SentimentAnalysis {
            sentiment: Sentiment::parse_lenient(&raw.sentiment),
            confidence: clamp_confidence(raw.confidence),
        };

        info!(sentiment = ?analysis.sentiment, confidence = analysis.confidence, "Sentiment analyzed");

        Ok(analysis)
    }

    /// Produce a short summary and the sentiment of a review
    pub async fn summarize_review(&self, review_text: &str) -> Result<ReviewSummary> {
        let review_text = require_text(review_text)?;

        let prompt = format!(
            r#"Summarize the following review in a few sentences and determine its sentiment (positive, negative, or neutral).

Review: {review_text}

Respond with JSON in this exact format:
{{"summary": "short summary", "sentiment": "positive|negative|neutral"}}"#
        );

        let reply = self.runner.run(SUMMARY_SYSTEM, &prompt).await?;
        let raw: RawSummary = serde_json::from_str(&extract_json(&reply))
            .context("Failed to parse summary output")?;

        Ok(ReviewSummary {
            summary: raw.summary.trim().to_string(),
            sentiment: Sentiment::parse_lenient(&raw.sentiment),
        })
    }

    /// Recommend titles of the given kind for a described user
    pub async fn recommend(&self, user_profile: &str, content_type: Category) -> Result<Vec<String>> {
        let user_profile = require_text(user_profile)?;

        let prompt = format!(
            r#"Take a user profile and a content type, and return a list of recommended titles.

User Profile: {user_profile}
Content Type: {content_type}

Respond with JSON in this exact format:
{{"recommendations": ["Title one", "Title two"]}}"#
        );

        let reply = self.runner.run(RECOMMEND_SYSTEM, &prompt).await?;
        let raw: RawRecommendations = serde_json::from_str(&extract_json(&reply))
            .context("Failed to parse recommendation output")?;

        let titles: Vec<String> = raw
            .recommendations
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        info!(count = titles.len(), content_type = %content_type, "Recommendations generated");

        Ok(titles)
    }
}

fn require_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("Input text is empty");
    }
    Ok(text)
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json") {
        let json_start = start + 7;
        if let Some(end) = content[json_start..].find("```") {
            return content[json_start..json_start + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            return content[start..=end].to_string();
        }
    }

    content.to_string()
}
