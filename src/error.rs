//! Unified application error model for the identity/session subsystem.
//! This module provides the common error enum surfaced to login flows and the
//! UI layer, plus the signout reason codes delivered through the reactive
//! identity state (eviction is an event, not a call-time error).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// Username/mobile or password did not match a known account.
    InvalidCredentials { message: String },
    /// The account exists but has been disabled by the tenant owner.
    AccountDisabled { message: String },
    /// The replicated store was unreachable while establishing a session.
    /// Retryable by re-submitting the login.
    SessionWrite { message: String },
    /// A session record was missing expected fields. Cascade-internal;
    /// callers normally never see this because the cascade skips the tier.
    MalformedRecord { message: String },
    /// An anonymous principal with no resolvable identity anywhere.
    OrphanedPrincipal { message: String },
    /// The external auth provider binding failed (sign-in/sign-out).
    Provider { message: String },
    Internal { message: String },
}

impl AuthError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials { .. } => "invalid_credentials",
            AuthError::AccountDisabled { .. } => "account_disabled",
            AuthError::SessionWrite { .. } => "session_write_failure",
            AuthError::MalformedRecord { .. } => "malformed_session_record",
            AuthError::OrphanedPrincipal { .. } => "orphaned_principal",
            AuthError::Provider { .. } => "provider_failure",
            AuthError::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::InvalidCredentials { message }
            | AuthError::AccountDisabled { message }
            | AuthError::SessionWrite { message }
            | AuthError::MalformedRecord { message }
            | AuthError::OrphanedPrincipal { message }
            | AuthError::Provider { message }
            | AuthError::Internal { message } => message.as_str(),
        }
    }

    pub fn invalid_credentials<S: Into<String>>(msg: S) -> Self { AuthError::InvalidCredentials { message: msg.into() } }
    pub fn account_disabled<S: Into<String>>(msg: S) -> Self { AuthError::AccountDisabled { message: msg.into() } }
    pub fn session_write<S: Into<String>>(msg: S) -> Self { AuthError::SessionWrite { message: msg.into() } }
    pub fn malformed<S: Into<String>>(msg: S) -> Self { AuthError::MalformedRecord { message: msg.into() } }
    pub fn orphaned<S: Into<String>>(msg: S) -> Self { AuthError::OrphanedPrincipal { message: msg.into() } }
    pub fn provider<S: Into<String>>(msg: S) -> Self { AuthError::Provider { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AuthError::Internal { message: msg.into() } }

    /// Inline text shown on the login form for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials { .. } => "Incorrect username or password.",
            AuthError::AccountDisabled { .. } => "This account has been disabled. Contact your administrator.",
            AuthError::SessionWrite { .. } => "Could not reach the server. Please try again.",
            AuthError::Provider { .. } => "Sign-in service unavailable. Please try again.",
            AuthError::OrphanedPrincipal { .. } => "Your session has ended. Please sign in again.",
            AuthError::MalformedRecord { .. } | AuthError::Internal { .. } => "Something went wrong. Please try again.",
        }
    }

    /// Whether this failure may have altered session state on the device.
    /// Credential failures must leave any existing session untouched.
    pub fn touches_session(&self) -> bool {
        match self {
            AuthError::InvalidCredentials { .. } | AuthError::AccountDisabled { .. } => false,
            AuthError::SessionWrite { .. }
            | AuthError::MalformedRecord { .. }
            | AuthError::OrphanedPrincipal { .. }
            | AuthError::Provider { .. }
            | AuthError::Internal { .. } => true,
        }
    }

    /// Retryable by simply re-submitting the same login.
    pub fn retryable(&self) -> bool {
        matches!(self, AuthError::SessionWrite { .. } | AuthError::Provider { .. })
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal { message: err.to_string() }
    }
}

/// Why the device transitioned to an unauthenticated state. Delivered through
/// the reactive identity channel, never as a call-time error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignoutReason {
    /// Another device claimed this identity's single session slot.
    LoggedInElsewhere,
    /// The session record disappeared without a successor (remote cleanup).
    SessionClosed,
    UserLogout,
}

impl SignoutReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            SignoutReason::LoggedInElsewhere => "You were signed out because this account logged in on another device.",
            SignoutReason::SessionClosed => "Your session was closed. Please sign in again.",
            SignoutReason::UserLogout => "You have been signed out.",
        }
    }
}
