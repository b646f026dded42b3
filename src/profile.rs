//! Read-only profile tables served by `/api/me`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};
use validator::Validate;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeStatus {
    Operational,
    OpenToWork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proficiency {
    Expert,
    Advanced,
    Intermediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub version: String,
    pub company: String,
    pub role: String,
    pub period: String,
    pub description: Vec<String>,
    pub tech: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tech: Vec<String>,
    pub href: String,
    pub repo: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackItem {
    pub name: String,
    pub category: String,
    pub proficiency: Proficiency,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialLinks {
    pub github: String,
    pub linkedin: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileData {
    pub name: String,
    pub status: MeStatus,
    #[validate(url)]
    pub documentation: String,
    #[validate(length(min = 1))]
    pub experience: Vec<Experience>,
    #[validate(length(min = 1))]
    pub projects: Vec<Project>,
    pub stack: Vec<StackItem>,
    pub social: SocialLinks,
}

/// Body of a successful `GET /api/me`.
#[derive(Debug, Serialize)]
pub struct ProfilePayload<'a> {
    pub name: &'a str,
    pub status: MeStatus,
    pub title: &'a str,
    pub stack: Vec<&'a str>,
    pub latest_project: &'a Project,
    pub contact: &'a SocialLinks,
    pub documentation: &'a str,
}

impl ProfileData {
    /// Built-in tables, or the JSON file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ApiError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to read profile data");
            ApiError::Configuration("PROFILE_PATH unreadable".to_string())
        })?;
        let data: ProfileData = serde_json::from_str(&raw).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to parse profile data");
            ApiError::Configuration("PROFILE_PATH invalid".to_string())
        })?;

        info!(path = %path.display(), projects = data.projects.len(), "Loaded profile data");
        Ok(data)
    }

    /// Tables the payload depends on must be populated.
    pub fn validate_integrity(&self) -> Result<(), ApiError> {
        let Err(errors) = self.validate() else {
            return Ok(());
        };

        let fields = errors.field_errors();
        let problem = if fields.contains_key("experience") {
            "EXPERIENCE is empty"
        } else if fields.contains_key("projects") {
            "PROJECTS is empty"
        } else {
            "profile data invalid"
        };

        error!(errors = %errors, "Profile data failed validation");
        Err(ApiError::Configuration(problem.to_string()))
    }

    pub fn payload(&self) -> Result<ProfilePayload<'_>, ApiError> {
        let title = self
            .experience
            .first()
            .map(|entry| entry.role.as_str())
            .ok_or_else(|| ApiError::Configuration("EXPERIENCE is empty".to_string()))?;
        let latest_project = self
            .projects
            .first()
            .ok_or_else(|| ApiError::Configuration("PROJECTS is empty".to_string()))?;

        let stack = self
            .stack
            .iter()
            .filter(|item| item.proficiency == Proficiency::Expert)
            .map(|item| item.name.as_str())
            .collect();

        Ok(ProfilePayload {
            name: &self.name,
            status: self.status,
            title,
            stack,
            latest_project,
            contact: &self.social,
            documentation: &self.documentation,
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn stack_item(name: &str, category: &str, proficiency: Proficiency, icon: &str) -> StackItem {
    StackItem {
        name: name.to_string(),
        category: category.to_string(),
        proficiency,
        icon: icon.to_string(),
    }
}

impl Default for ProfileData {
    fn default() -> Self {
        Self {
            name: "Barry Henry".to_string(),
            status: MeStatus::Operational,
            documentation: "https://barryhenry.com/docs".to_string(),
            experience: vec![
                Experience {
                    id: "current".to_string(),
                    version: "v3.0".to_string(),
                    company: "Independent".to_string(),
                    role: "Full Stack Engineer".to_string(),
                    period: "2023 - Present".to_string(),
                    description: strings(&[
                        "Design and ship web platforms end to end",
                        "Own API design, infrastructure and observability",
                    ]),
                    tech: strings(&["TypeScript", "Rust", "PostgreSQL", "Redis"]),
                },
                Experience {
                    id: "previous".to_string(),
                    version: "v2.0".to_string(),
                    company: "Agency".to_string(),
                    role: "Software Engineer".to_string(),
                    period: "2020 - 2023".to_string(),
                    description: strings(&["Built client-facing web applications"]),
                    tech: strings(&["React", "Node.js"]),
                },
            ],
            projects: vec![
                Project {
                    id: "portfolio-dashboard".to_string(),
                    title: "Portfolio Dashboard".to_string(),
                    description: "Personal site presented as an admin dashboard with a public profile API"
                        .to_string(),
                    tech: strings(&["Next.js", "Tailwind CSS", "Redis"]),
                    href: "https://barryhenry.com".to_string(),
                    repo: "#".to_string(),
                    icon: "LayoutDashboard".to_string(),
                },
                Project {
                    id: "profile-api".to_string(),
                    title: "Profile API".to_string(),
                    description: "Rate-limited JSON endpoint describing the site owner".to_string(),
                    tech: strings(&["Rust", "axum", "Redis"]),
                    href: "https://barryhenry.com/api/me".to_string(),
                    repo: "#".to_string(),
                    icon: "Server".to_string(),
                },
            ],
            stack: vec![
                stack_item("TypeScript", "Frontend", Proficiency::Expert, "Code"),
                stack_item("React", "Frontend", Proficiency::Expert, "Atom"),
                stack_item("Next.js", "Frontend", Proficiency::Expert, "Layers"),
                stack_item("Node.js", "Backend", Proficiency::Advanced, "Server"),
                stack_item("Rust", "Backend", Proficiency::Intermediate, "Cpu"),
                stack_item("PostgreSQL", "Database", Proficiency::Advanced, "Database"),
                stack_item("Redis", "Database", Proficiency::Intermediate, "Database"),
                stack_item("Docker", "DevOps", Proficiency::Advanced, "Container"),
            ],
            social: SocialLinks {
                github: "https://github.com/barryhenry".to_string(),
                linkedin: "https://www.linkedin.com/in/barryhenry".to_string(),
                email: "hello@barryhenry.com".to_string(),
            },
        }
    }
}
