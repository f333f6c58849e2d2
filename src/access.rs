//! Access-control gate and per-request context.
//!
//! Policy lives outside this crate. The engine only asks an [`AccessGate`]
//! whether a subject holds `dashboard:read` on a project before doing
//! anything else.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Scope required to run dashboard queries.
pub const DASHBOARD_READ: &str = "dashboard:read";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    pub id: String,
}

impl Subject {
    pub fn new(id: &str) -> Self {
        Self { id: id.into() }
    }
}

/// What is being accessed, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    pub project_id: String,
    pub scope: String,
}

impl ResourceScope {
    pub fn dashboard_read(project_id: &str) -> Self {
        Self {
            project_id: project_id.into(),
            scope: DASHBOARD_READ.into(),
        }
    }
}

/// Explicit per-request context threaded through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    pub subject: Subject,
    pub project_id: String,
}

impl QueryContext {
    pub fn new(subject: Subject, project_id: &str) -> Self {
        Self {
            subject,
            project_id: project_id.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{subject} lacks '{scope}' on project '{project_id}'")]
pub struct AccessDenied {
    pub subject: String,
    pub project_id: String,
    pub scope: String,
}

impl AccessDenied {
    pub fn new(subject: &Subject, scope: &ResourceScope) -> Self {
        Self {
            subject: subject.id.clone(),
            project_id: scope.project_id.clone(),
            scope: scope.scope.clone(),
        }
    }
}

/// Decides whether a subject may act on a resource.
pub trait AccessGate: Send + Sync {
    fn authorize(&self, subject: &Subject, scope: &ResourceScope) -> Result<(), AccessDenied>;
}

/// Grants everything. For local tools and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn authorize(&self, _subject: &Subject, _scope: &ResourceScope) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Static grant table: subject to project to scopes.
#[derive(Debug, Clone, Default)]
pub struct ProjectGrants {
    grants: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl ProjectGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, subject: &str, project_id: &str, scope: &str) -> Self {
        self.grants
            .entry(subject.into())
            .or_default()
            .entry(project_id.into())
            .or_default()
            .insert(scope.into());
        self
    }
}

impl AccessGate for ProjectGrants {
    fn authorize(&self, subject: &Subject, scope: &ResourceScope) -> Result<(), AccessDenied> {
        let granted = self
            .grants
            .get(&subject.id)
            .and_then(|projects| projects.get(&scope.project_id))
            .is_some_and(|scopes| scopes.contains(&scope.scope));
        if granted {
            Ok(())
        } else {
            Err(AccessDenied::new(subject, scope))
        }
    }
}
