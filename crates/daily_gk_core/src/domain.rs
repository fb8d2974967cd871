//! crates/daily_gk_core/src/domain.rs
//!
//! Defines the pure, core data structures for the client.
//! Row types derive `serde` so the data-service adapter can decode them, but
//! nothing here knows about HTTP, Supabase or the cache.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

//=========================================================================================
// Session & Identity
//=========================================================================================

/// The signed-in identity carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Opaque provider user id.
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

impl UserRef {
    /// Join date as shown on the profile page, e.g. "1 May 2024".
    pub fn joined_on(&self) -> Option<String> {
        self.created_at.map(|at| at.format("%-d %B %Y").to_string())
    }

    pub fn verification_label(&self) -> &'static str {
        if self.email_verified {
            "Verified"
        } else {
            "Unverified"
        }
    }
}

/// An authenticated session as issued by the auth provider.
///
/// The anonymous case is represented by the absence of a `Session`
/// (`Option<Session>::None`), never by a session without a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: UserRef,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// True once `now` has reached the expiry instant. Sessions without an
    /// expiry never expire locally.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Tri-state readiness derived from the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    /// No auth event or initial probe has resolved yet.
    Unknown,
    Anonymous,
    Authenticated,
}

/// An event exactly as the auth provider emitted it: a free-form tag plus
/// whatever session accompanied it.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub tag: String,
    pub session: Option<Session>,
}

impl ProviderEvent {
    pub fn new(tag: impl Into<String>, session: Option<Session>) -> Self {
        Self {
            tag: tag.into(),
            session,
        }
    }
}

/// The closed set of session events the store understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Result of the initial-session probe.
    Initial(Option<Session>),
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    /// A recovery-link session. Carries an interrupt to the reset screen.
    PasswordRecovery(Session),
}

/// Optional profile data attached to a new account.
///
/// Only `display_name` is stored as user metadata; the redirect is where the
/// confirmation email sends the user back to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignUpProfile {
    #[serde(rename = "full_name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip)]
    pub email_redirect_to: Option<String>,
}

//=========================================================================================
// Content
//=========================================================================================

/// A daily knowledge summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Summary {
    /// Body split into display paragraphs, blank lines dropped.
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.body
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// A user's bookmark of a summary. At most one per `(user_id, summary_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub summary_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One row of the bookmarks screen: the bookmark joined with its summary.
/// The summary may have been deleted since it was bookmarked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkedSummary {
    #[serde(rename = "id")]
    pub bookmark_id: String,
    #[serde(rename = "summaries", default)]
    pub summary: Option<Summary>,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

impl QuizQuestion {
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_answer
    }
}

/// The quiz published for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<QuizQuestion>,
}

/// Answers picked so far for a quiz. Each question locks after its first pick.
#[derive(Debug, Clone, Default)]
pub struct QuizAnswers {
    selected: BTreeMap<usize, usize>,
}

impl QuizAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `option` for `question` and reports whether it was correct.
    ///
    /// Returns `None` when the question or option does not exist, or the
    /// question was already answered.
    pub fn select(&mut self, quiz: &Quiz, question: usize, option: usize) -> Option<bool> {
        let q = quiz.questions.get(question)?;
        if option >= q.options.len() || self.selected.contains_key(&question) {
            return None;
        }
        self.selected.insert(question, option);
        Some(q.is_correct(option))
    }

    pub fn selected(&self, question: usize) -> Option<usize> {
        self.selected.get(&question).copied()
    }

    pub fn score(&self, quiz: &Quiz) -> usize {
        self.selected
            .iter()
            .filter(|(q, opt)| quiz.questions.get(**q).is_some_and(|q| q.is_correct(**opt)))
            .count()
    }

    pub fn is_complete(&self, quiz: &Quiz) -> bool {
        self.selected.len() == quiz.questions.len()
    }
}

/// A downloadable weekly digest stored as a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestFile {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DigestFile {
    pub fn is_pdf(&self) -> bool {
        self.name.ends_with(".pdf")
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quiz() -> Quiz {
        Quiz {
            id: "q1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            questions: vec![
                QuizQuestion {
                    question: "Capital of India?".to_string(),
                    options: vec!["Mumbai".into(), "New Delhi".into()],
                    correct_answer: 1,
                },
                QuizQuestion {
                    question: "Longest river?".to_string(),
                    options: vec!["Ganga".into(), "Godavari".into()],
                    correct_answer: 0,
                },
            ],
        }
    }

    #[test]
    fn profile_fields_render_join_date_and_verification() {
        let created_at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 5, 1, 10, 0, 0).single();
        let mut user = UserRef {
            id: "u1".to_string(),
            email: Some("asha@example.com".to_string()),
            created_at,
            email_verified: true,
            display_name: None,
        };
        assert_eq!(user.joined_on().as_deref(), Some("1 May 2024"));
        assert_eq!(user.verification_label(), "Verified");

        user.email_verified = false;
        user.created_at = None;
        assert_eq!(user.joined_on(), None);
        assert_eq!(user.verification_label(), "Unverified");
    }

    #[test]
    fn quiz_answers_lock_after_first_pick() {
        let quiz = sample_quiz();
        let mut answers = QuizAnswers::new();

        assert_eq!(answers.select(&quiz, 0, 0), Some(false));
        assert_eq!(answers.select(&quiz, 0, 1), None);
        assert_eq!(answers.selected(0), Some(0));
        assert_eq!(answers.select(&quiz, 1, 0), Some(true));
        assert_eq!(answers.score(&quiz), 1);
        assert!(answers.is_complete(&quiz));
    }

    #[test]
    fn quiz_answers_reject_out_of_range() {
        let quiz = sample_quiz();
        let mut answers = QuizAnswers::new();
        assert_eq!(answers.select(&quiz, 5, 0), None);
        assert_eq!(answers.select(&quiz, 0, 9), None);
        assert!(!answers.is_complete(&quiz));
    }

    #[test]
    fn summary_tolerates_null_columns() {
        let row = serde_json::json!({
            "id": "s1",
            "title": null,
            "body": "First.\n\nSecond.",
            "date": "2024-05-01",
            "tags": null,
        });
        let summary: Summary = serde_json::from_value(row).unwrap();
        assert_eq!(summary.title, "");
        assert!(summary.tags.is_empty());
        assert_eq!(summary.paragraphs().collect::<Vec<_>>(), vec!["First.", "Second."]);
    }

    #[test]
    fn bookmarked_summary_decodes_join_shape() {
        let row = serde_json::json!({ "id": "b1", "summaries": null });
        let item: BookmarkedSummary = serde_json::from_value(row).unwrap();
        assert_eq!(item.bookmark_id, "b1");
        assert!(item.summary.is_none());
    }

    #[test]
    fn session_expiry_is_inclusive() {
        let now = Utc::now();
        let session = Session {
            user: UserRef {
                id: "u1".into(),
                email: None,
                created_at: None,
                email_verified: false,
                display_name: None,
            },
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(now),
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - chrono::Duration::seconds(1)));
    }
}
