//! Template version lifecycle.
//!
//! ```text
//! DRAFT ──► SCHEDULED ──► PUBLISHED ──► ARCHIVED
//!   │  ◄──────┘               ▲
//!   └─────────────────────────┘
//! ```
//!
//! The model methods on [`TemplateVersion`] are pure: callers pass `now`
//! and persist the result. [`VersionService`] adds the cross-version rules
//! (one published version per template, unique names).

pub mod memory;
pub mod service;

use serde::Serialize;

use crate::content::ContentViolation;
use crate::error::{CoreError, ErrorKind};
use crate::types::{DbId, Timestamp};

pub use memory::InMemoryVersionStore;
pub use service::{DueTransitionReport, NewTemplateVersion, VersionService, VersionStore};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Published => "PUBLISHED",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "SCHEDULED" => Ok(Self::Scheduled),
            "PUBLISHED" => Ok(Self::Published),
            "ARCHIVED" => Ok(Self::Archived),
            _ => Err(CoreError::Validation(format!(
                "Invalid version status: '{s}'. Must be one of: DRAFT, SCHEDULED, PUBLISHED, ARCHIVED"
            ))),
        }
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod state_machine {
    use super::VersionStatus::{self, *};

    /// Statuses reachable from `from`. `ARCHIVED` is terminal.
    pub fn valid_transitions(from: VersionStatus) -> &'static [VersionStatus] {
        match from {
            Draft => &[Scheduled, Published],
            Scheduled => &[Draft, Published],
            Published => &[Archived],
            Archived => &[],
        }
    }

    pub fn can_transition(from: VersionStatus, to: VersionStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    pub fn validate_transition(from: VersionStatus, to: VersionStatus) -> Result<(), super::VersionError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(super::VersionError::InvalidTransition { from, to })
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum VersionError {
    #[error("Template version {0} not found")]
    NotFound(DbId),

    #[error("Cannot edit a scheduled version; cancel the schedule first")]
    CannotEditScheduled,

    #[error("Cannot edit a published version")]
    CannotEditPublished,

    #[error("Cannot edit an archived version")]
    CannotEditArchived,

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: VersionStatus,
        to: VersionStatus,
    },

    #[error("Scheduled time {at} is not in the future (now {now})")]
    ScheduleInPast { at: Timestamp, now: Timestamp },

    #[error("Version name '{0}' is already used by this template")]
    DuplicateName(String),

    #[error("Version {id} is {status} and cannot be rendered")]
    NotRenderable { id: DbId, status: VersionStatus },

    #[error("Content has {} violation(s)", .0.len())]
    InvalidContent(Vec<ContentViolation>),
}

impl VersionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ScheduleInPast { .. } | Self::InvalidContent(_) => ErrorKind::Validation,
            Self::CannotEditScheduled
            | Self::CannotEditPublished
            | Self::CannotEditArchived
            | Self::InvalidTransition { .. }
            | Self::DuplicateName(_)
            | Self::NotRenderable { .. } => ErrorKind::Conflict,
        }
    }
}

impl From<VersionError> for CoreError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::NotFound(id) => CoreError::NotFound {
                entity: "TemplateVersion",
                id,
            },
            VersionError::InvalidContent(violations) => CoreError::InvalidContent(violations),
            other => CoreError::from_kind(other.kind(), other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateVersion {
    pub id: DbId,
    pub template_id: DbId,
    pub version_number: i32,
    pub name: String,
    pub status: VersionStatus,
    pub content: serde_json::Value,
    pub scheduled_publish_at: Option<Timestamp>,
    pub scheduled_archive_at: Option<Timestamp>,
    pub published_at: Option<Timestamp>,
    pub archived_at: Option<Timestamp>,
    pub published_by: Option<String>,
    pub archived_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TemplateVersion {
    /// Content may change only while the version is a draft.
    pub fn ensure_editable(&self) -> Result<(), VersionError> {
        match self.status {
            VersionStatus::Draft => Ok(()),
            VersionStatus::Scheduled => Err(VersionError::CannotEditScheduled),
            VersionStatus::Published => Err(VersionError::CannotEditPublished),
            VersionStatus::Archived => Err(VersionError::CannotEditArchived),
        }
    }

    /// Production renders need a published version; previews accept
    /// anything that is not archived.
    pub fn ensure_renderable(&self, preview: bool) -> Result<(), VersionError> {
        let ok = match self.status {
            VersionStatus::Published => true,
            VersionStatus::Draft | VersionStatus::Scheduled => preview,
            VersionStatus::Archived => false,
        };
        if ok {
            Ok(())
        } else {
            Err(VersionError::NotRenderable {
                id: self.id,
                status: self.status,
            })
        }
    }

    pub fn set_content(&mut self, content: serde_json::Value, now: Timestamp) -> Result<(), VersionError> {
        self.ensure_editable()?;
        self.content = content;
        self.updated_at = now;
        Ok(())
    }

    /// Schedule publication at `at`, which must be after `now`. A scheduled
    /// version may be rescheduled.
    pub fn schedule_publish(&mut self, at: Timestamp, now: Timestamp) -> Result<(), VersionError> {
        if self.status != VersionStatus::Scheduled {
            state_machine::validate_transition(self.status, VersionStatus::Scheduled)?;
        }
        if at <= now {
            return Err(VersionError::ScheduleInPast { at, now });
        }
        self.status = VersionStatus::Scheduled;
        self.scheduled_publish_at = Some(at);
        self.updated_at = now;
        Ok(())
    }

    /// Schedule archival of a published version.
    pub fn schedule_archive(&mut self, at: Timestamp, now: Timestamp) -> Result<(), VersionError> {
        if self.status != VersionStatus::Published {
            return Err(VersionError::InvalidTransition {
                from: self.status,
                to: VersionStatus::Archived,
            });
        }
        if at <= now {
            return Err(VersionError::ScheduleInPast { at, now });
        }
        self.scheduled_archive_at = Some(at);
        self.updated_at = now;
        Ok(())
    }

    /// Revert a scheduled publish to draft. The scheduled archive time is
    /// cleared in every state, so on a draft this only clears that.
    pub fn cancel_schedule(&mut self, now: Timestamp) {
        if self.status == VersionStatus::Scheduled {
            self.status = VersionStatus::Draft;
            self.scheduled_publish_at = None;
        }
        self.scheduled_archive_at = None;
        self.updated_at = now;
    }

    pub fn publish(&mut self, actor: &str, now: Timestamp) -> Result<(), VersionError> {
        state_machine::validate_transition(self.status, VersionStatus::Published)?;
        self.status = VersionStatus::Published;
        self.published_at = Some(now);
        self.published_by = Some(actor.to_string());
        self.scheduled_publish_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn archive(&mut self, actor: &str, now: Timestamp) -> Result<(), VersionError> {
        state_machine::validate_transition(self.status, VersionStatus::Archived)?;
        self.status = VersionStatus::Archived;
        self.archived_at = Some(now);
        self.archived_by = Some(actor.to_string());
        self.scheduled_archive_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_publish_due(&self, now: Timestamp) -> bool {
        self.status == VersionStatus::Scheduled && self.scheduled_publish_at.is_some_and(|at| at <= now)
    }

    pub fn is_archive_due(&self, now: Timestamp) -> bool {
        self.status == VersionStatus::Published && self.scheduled_archive_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    use super::state_machine::*;
    use super::VersionStatus::*;
    use super::*;

    fn draft() -> TemplateVersion {
        let now = Utc::now();
        TemplateVersion {
            id: 1,
            template_id: 1,
            version_number: 1,
            name: "v1".into(),
            status: Draft,
            content: serde_json::json!({ "type": "doc", "content": [] }),
            scheduled_publish_at: None,
            scheduled_archive_at: None,
            published_at: None,
            archived_at: None,
            published_by: None,
            archived_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[test]
    fn allowed_transitions() {
        assert!(can_transition(Draft, Scheduled));
        assert!(can_transition(Draft, Published));
        assert!(can_transition(Scheduled, Draft));
        assert!(can_transition(Scheduled, Published));
        assert!(can_transition(Published, Archived));
    }

    #[test]
    fn forbidden_transitions() {
        assert!(!can_transition(Draft, Archived));
        assert!(!can_transition(Published, Draft));
        assert!(!can_transition(Scheduled, Archived));
        for to in [Draft, Scheduled, Published, Archived] {
            assert!(!can_transition(Archived, to));
        }
    }

    #[test]
    fn validate_transition_reports_both_states() {
        let err = validate_transition(Archived, Published).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition: ARCHIVED -> PUBLISHED");
    }

    // -----------------------------------------------------------------------
    // Model operations
    // -----------------------------------------------------------------------

    #[test]
    fn editing_only_in_draft() {
        let mut v = draft();
        assert!(v.ensure_editable().is_ok());
        v.status = Scheduled;
        assert_matches!(v.ensure_editable(), Err(VersionError::CannotEditScheduled));
        v.status = Published;
        assert_matches!(
            v.set_content(serde_json::json!({}), Utc::now()),
            Err(VersionError::CannotEditPublished)
        );
        v.status = Archived;
        assert_matches!(v.ensure_editable(), Err(VersionError::CannotEditArchived));
    }

    #[test]
    fn schedule_publish_requires_future_time() {
        let now = Utc::now();
        let mut v = draft();
        assert_matches!(
            v.schedule_publish(now - Duration::minutes(1), now),
            Err(VersionError::ScheduleInPast { .. })
        );
        assert_eq!(v.status, Draft);

        let at = now + Duration::hours(1);
        v.schedule_publish(at, now).unwrap();
        assert_eq!(v.status, Scheduled);
        assert_eq!(v.scheduled_publish_at, Some(at));
    }

    #[test]
    fn cancel_schedule_reverts_to_draft() {
        let now = Utc::now();
        let mut v = draft();
        v.schedule_publish(now + Duration::hours(1), now).unwrap();
        v.scheduled_archive_at = Some(now + Duration::days(1));
        v.cancel_schedule(now);
        assert_eq!(v.status, Draft);
        assert_eq!(v.scheduled_publish_at, None);
        assert_eq!(v.scheduled_archive_at, None);
    }

    #[test]
    fn cancel_schedule_on_draft_clears_archive_time() {
        let now = Utc::now();
        let mut v = draft();
        v.scheduled_archive_at = Some(now + Duration::days(1));
        v.cancel_schedule(now);
        assert_eq!(v.status, Draft);
        assert_eq!(v.scheduled_archive_at, None);
    }

    #[test]
    fn publish_stamps_audit_fields() {
        let now = Utc::now();
        let mut v = draft();
        v.schedule_publish(now + Duration::hours(1), now).unwrap();
        v.publish("ana", now).unwrap();
        assert_eq!(v.status, Published);
        assert_eq!(v.published_by.as_deref(), Some("ana"));
        assert_eq!(v.published_at, Some(now));
        assert_eq!(v.scheduled_publish_at, None);
    }

    #[test]
    fn publish_on_archived_fails() {
        let now = Utc::now();
        let mut v = draft();
        v.publish("ana", now).unwrap();
        v.archive("ana", now).unwrap();
        assert_matches!(
            v.publish("ana", now),
            Err(VersionError::InvalidTransition { from: Archived, to: Published })
        );
    }

    #[test]
    fn archive_clears_scheduled_archive() {
        let now = Utc::now();
        let mut v = draft();
        v.publish("ana", now).unwrap();
        v.schedule_archive(now + Duration::days(1), now).unwrap();
        assert!(!v.is_archive_due(now));
        assert!(v.is_archive_due(now + Duration::days(2)));
        v.archive("bot", now).unwrap();
        assert_eq!(v.scheduled_archive_at, None);
        assert_eq!(v.archived_by.as_deref(), Some("bot"));
    }

    #[test]
    fn schedule_archive_requires_published() {
        let now = Utc::now();
        assert_matches!(
            draft().schedule_archive(now + Duration::days(1), now),
            Err(VersionError::InvalidTransition { .. })
        );
    }

    #[test]
    fn renderability_depends_on_preview() {
        let mut v = draft();
        assert_matches!(v.ensure_renderable(false), Err(VersionError::NotRenderable { .. }));
        assert!(v.ensure_renderable(true).is_ok());
        v.status = Published;
        assert!(v.ensure_renderable(false).is_ok());
        v.status = Archived;
        assert!(v.ensure_renderable(true).is_err());
    }

    #[test]
    fn errors_map_to_kinds() {
        assert_eq!(VersionError::CannotEditPublished.kind(), ErrorKind::Conflict);
        assert_eq!(
            CoreError::from(VersionError::NotFound(3)).kind(),
            ErrorKind::NotFound
        );
    }
}
