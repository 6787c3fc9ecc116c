use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Invite, Role, User};

pub const INVITE_TTL_DAYS: i64 = 3;

pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(INVITE_TTL_DAYS)
}

pub fn accept_link(base_url: &str, token: &str) -> String {
    format!("{}/invites/{token}/accept", base_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteOutcome {
    Invalid,
    AlreadyAccepted,
    Expired,
    WrongAccountType,
    EmailMismatch,
    Accepted,
}

impl InviteOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, InviteOutcome::AlreadyAccepted | InviteOutcome::Accepted)
    }

    pub fn title(&self) -> &'static str {
        match self {
            InviteOutcome::Invalid => "Invalid Invitation",
            InviteOutcome::AlreadyAccepted => "Invitation Already Accepted",
            InviteOutcome::Expired => "Invitation Expired",
            InviteOutcome::WrongAccountType => "Wrong Account Type",
            InviteOutcome::EmailMismatch => "Email Mismatch",
            InviteOutcome::Accepted => "You're Added!",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            InviteOutcome::Invalid => "This invitation link is not valid.",
            InviteOutcome::AlreadyAccepted => "This invitation has already been accepted.",
            InviteOutcome::Expired => "This invitation link has expired.",
            InviteOutcome::WrongAccountType => {
                "Please log in with a student account to accept this invite."
            }
            InviteOutcome::EmailMismatch => "This invite was sent to a different email address.",
            InviteOutcome::Accepted => "You have been added successfully.",
        }
    }
}

/// Checks run in order: existence, prior acceptance, expiry, role, email.
pub fn evaluate(invite: Option<&Invite>, user: &User, now: DateTime<Utc>) -> InviteOutcome {
    let Some(invite) = invite else {
        return InviteOutcome::Invalid;
    };

    if invite.accepted {
        return InviteOutcome::AlreadyAccepted;
    }
    if invite.expires_at < now {
        return InviteOutcome::Expired;
    }
    if user.role != Some(Role::Student) {
        return InviteOutcome::WrongAccountType;
    }
    if !user.email.eq_ignore_ascii_case(&invite.student_email) {
        return InviteOutcome::EmailMismatch;
    }

    InviteOutcome::Accepted
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteResult {
    pub ok: bool,
    pub outcome: InviteOutcome,
    pub title: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
}

impl From<InviteOutcome> for InviteResult {
    fn from(outcome: InviteOutcome) -> Self {
        Self {
            ok: outcome.ok(),
            outcome,
            title: outcome.title(),
            message: outcome.message(),
            instructor_name: None,
            course_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn invite() -> Invite {
        Invite {
            id: Uuid::new_v4(),
            instructor_id: Uuid::new_v4(),
            student_email: "sara.haddad@example.edu".to_string(),
            course_id: None,
            token: new_token(),
            expires_at: expiry_from(now()),
            accepted: false,
            accepted_at: None,
        }
    }

    fn student() -> User {
        User {
            id: Uuid::new_v4(),
            first_name: "Sara".to_string(),
            last_name: "Haddad".to_string(),
            email: "Sara.Haddad@example.edu".to_string(),
            role: Some(Role::Student),
            theme_preference: "light".to_string(),
        }
    }

    #[test]
    fn tokens_are_unique_hex() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn invites_expire_after_three_days() {
        assert_eq!(expiry_from(now()) - now(), Duration::days(3));
    }

    #[test]
    fn link_joins_base_without_double_slash() {
        assert_eq!(
            accept_link("http://127.0.0.1:8000/", "abc"),
            "http://127.0.0.1:8000/invites/abc/accept"
        );
    }

    #[test]
    fn matching_student_accepts() {
        let outcome = evaluate(Some(&invite()), &student(), now());
        assert_eq!(outcome, InviteOutcome::Accepted);
        assert!(outcome.ok());
    }

    #[test]
    fn unknown_token_is_invalid() {
        assert_eq!(evaluate(None, &student(), now()), InviteOutcome::Invalid);
    }

    #[test]
    fn prior_acceptance_wins_over_expiry() {
        let mut inv = invite();
        inv.accepted = true;
        inv.expires_at = now() - Duration::days(10);
        let outcome = evaluate(Some(&inv), &student(), now());
        assert_eq!(outcome, InviteOutcome::AlreadyAccepted);
        assert!(outcome.ok());
    }

    #[test]
    fn expired_invite_is_refused() {
        let later = now() + Duration::days(4);
        assert_eq!(
            evaluate(Some(&invite()), &student(), later),
            InviteOutcome::Expired
        );
    }

    #[test]
    fn instructors_and_unset_roles_cannot_accept() {
        let mut user = student();
        user.role = Some(Role::Instructor);
        assert_eq!(
            evaluate(Some(&invite()), &user, now()),
            InviteOutcome::WrongAccountType
        );
        user.role = None;
        assert_eq!(
            evaluate(Some(&invite()), &user, now()),
            InviteOutcome::WrongAccountType
        );
    }

    #[test]
    fn other_email_is_a_mismatch() {
        let mut user = student();
        user.email = "someone.else@example.edu".to_string();
        let result = InviteResult::from(evaluate(Some(&invite()), &user, now()));
        assert!(!result.ok);
        assert_eq!(result.title, "Email Mismatch");
    }
}
