//! Pluggable text-assistance service.
//!
//! The gateway does no text analysis of its own. Deployments that have an
//! analysis backend implement `ReadingAssistant`; everything else gets
//! `UnavailableAssistant`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
  #[error("assistant operation {0} is not available")]
  Unavailable(&'static str),
}

pub type AssistantResult<T> = Result<T, AssistantError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  pub text: String,
  pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub book_id: String,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
  pub title: String,
  /// Byte offset into the analysed text
  pub start: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub heading_id: String,
  pub excerpt: String,
  pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordExplanation {
  pub word: String,
  pub definition: String,
  pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
  pub name: String,
  pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSettings {
  pub font_size: u32,
  pub line_spacing: f32,
  pub theme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedBookmark {
  pub heading_id: String,
  pub position: String,
  pub note: String,
}

#[async_trait]
pub trait ReadingAssistant: Send + Sync {
  async fn summarize(&self, text: &str, max_words: usize) -> AssistantResult<Summary>;

  async fn recommend(&self, user_id: &str, limit: usize) -> AssistantResult<Vec<Recommendation>>;

  async fn extract_chapters(&self, text: &str) -> AssistantResult<Vec<Chapter>>;

  async fn translate(&self, text: &str, target_language: &str) -> AssistantResult<String>;

  async fn semantic_search(&self, book_id: &str, query: &str) -> AssistantResult<Vec<SearchHit>>;

  async fn explain_word(&self, word: &str, context: &str) -> AssistantResult<WordExplanation>;

  async fn analyze_themes(&self, text: &str) -> AssistantResult<Vec<Theme>>;

  async fn suggest_reading_settings(&self, user_id: &str) -> AssistantResult<ReadingSettings>;

  async fn suggest_bookmarks(
    &self,
    book_id: &str,
    heading_id: &str,
  ) -> AssistantResult<Vec<SuggestedBookmark>>;

  /// SSML markup for text-to-speech
  async fn speech_markup(&self, text: &str, voice: &str) -> AssistantResult<String>;
}

/// Assistant that rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableAssistant;

#[async_trait]
impl ReadingAssistant for UnavailableAssistant {
  async fn summarize(&self, _text: &str, _max_words: usize) -> AssistantResult<Summary> {
    Err(AssistantError::Unavailable("summarize"))
  }

  async fn recommend(&self, _user_id: &str, _limit: usize) -> AssistantResult<Vec<Recommendation>> {
    Err(AssistantError::Unavailable("recommend"))
  }

  async fn extract_chapters(&self, _text: &str) -> AssistantResult<Vec<Chapter>> {
    Err(AssistantError::Unavailable("extract_chapters"))
  }

  async fn translate(&self, _text: &str, _target_language: &str) -> AssistantResult<String> {
    Err(AssistantError::Unavailable("translate"))
  }

  async fn semantic_search(&self, _book_id: &str, _query: &str) -> AssistantResult<Vec<SearchHit>> {
    Err(AssistantError::Unavailable("semantic_search"))
  }

  async fn explain_word(&self, _word: &str, _context: &str) -> AssistantResult<WordExplanation> {
    Err(AssistantError::Unavailable("explain_word"))
  }

  async fn analyze_themes(&self, _text: &str) -> AssistantResult<Vec<Theme>> {
    Err(AssistantError::Unavailable("analyze_themes"))
  }

  async fn suggest_reading_settings(&self, _user_id: &str) -> AssistantResult<ReadingSettings> {
    Err(AssistantError::Unavailable("suggest_reading_settings"))
  }

  async fn suggest_bookmarks(
    &self,
    _book_id: &str,
    _heading_id: &str,
  ) -> AssistantResult<Vec<SuggestedBookmark>> {
    Err(AssistantError::Unavailable("suggest_bookmarks"))
  }

  async fn speech_markup(&self, _text: &str, _voice: &str) -> AssistantResult<String> {
    Err(AssistantError::Unavailable("speech_markup"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_unavailable_assistant_rejects_everything() {
    let assistant: Arc<dyn ReadingAssistant> = Arc::new(UnavailableAssistant);

    let err = assistant.summarize("text", 50).await.unwrap_err();
    assert!(matches!(err, AssistantError::Unavailable("summarize")));
    assert_eq!(err.to_string(), "assistant operation summarize is not available");

    assert!(assistant.translate("hola", "en").await.is_err());
    assert!(assistant.speech_markup("hello", "alto").await.is_err());
    assert!(assistant.suggest_bookmarks("B1", "H1").await.is_err());
  }
}
