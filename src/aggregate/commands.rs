// Copyright (c) 2025 - Cowboy AI, Inc.
//! Commands for the User Aggregate
//!
//! Commands express intent and can be rejected; events record what happened.
//! The API layer builds these from client requests and hands them to the
//! command handlers in [`crate::service`].

use std::fmt;
use uuid::Uuid;

/// Register a new user
#[derive(Clone, PartialEq, Eq)]
pub struct CreateUserCommand {
    /// Caller-chosen id; a fresh UUID v7 is generated when absent
    pub id: Option<Uuid>,

    pub name: String,

    pub email: String,

    /// Accepted for API compatibility; never written to events or read rows
    pub password: String,
}

impl CreateUserCommand {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Target a specific aggregate id
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Debug for CreateUserCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserCommand")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Change name and/or email; absent or empty fields are left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserCommand {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UpdateUserCommand {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            email: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Remove a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUserCommand {
    pub id: Uuid,
}

impl DeleteUserCommand {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}
