//! Actions and the entities they point at.
//!
//! An [`Action`] is a categorized intent ("heating this home", "eating this
//! food item") of type creation or usage. Every action links to one
//! [`Reference`], the home, vehicle or food item it is about.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Emission category of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Housing,
    Transport,
    Food,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Housing, Category::Transport, Category::Food];

    /// Storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Housing => "logement",
            Category::Transport => "transport",
            Category::Food => "aliment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "logement" | "housing" | "home" => Ok(Category::Housing),
            "transport" => Ok(Category::Transport),
            "aliment" | "food" => Ok(Category::Food),
            other => Err(ValidationError::invalid_value(
                "category",
                format!("unknown category '{other}'"),
            )),
        }
    }
}

/// Whether an action acquires the underlying entity or operates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Creation,
    Usage,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Creation => "creation",
            ActionType::Usage => "usage",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creation" => Ok(ActionType::Creation),
            "usage" | "utilisation" => Ok(ActionType::Usage),
            other => Err(ValidationError::invalid_value(
                "type",
                format!("unknown action type '{other}'"),
            )),
        }
    }
}

/// A categorized intent bound to a reference entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub action_type: ActionType,
    pub category: Category,
    pub reference_id: i64,
    pub label: String,
}

/// The home, vehicle or food item an action is about.
///
/// `code` carries the external identifier when one exists (food barcode,
/// vehicle kind); the emissions calculator receives it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: i64,
    pub category: Category,
    pub code: Option<String>,
    pub label: String,
}

/// Collaborator the reconciler uses to find actions and their entities.
pub trait ActionResolver {
    /// Return the action for `(action_type, category, reference_id)`,
    /// creating it when missing.
    fn find_or_create_action(
        &self,
        action_type: ActionType,
        category: Category,
        reference_id: i64,
    ) -> crate::Result<Action>;

    /// The entity linked to an action.
    fn reference_for_action(&self, action_id: i64) -> crate::Result<Reference>;
}
