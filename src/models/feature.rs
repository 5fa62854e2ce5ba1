use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::Repository;

/// Every feature flag the application knows about, with its description.
///
/// Rows in the `feature` table with any other name are stale and get purged
/// by [`Feature::remove_old_flags`].
pub const FEATURES: &[(&str, &str)] = &[
    (
        "client_display_names",
        "Render display names instead of user names in the client",
    ),
    (
        "client_user_profile",
        "Enable client-side user profile and preferences management",
    ),
    (
        "embed_cachebuster",
        "Cache-bust client entry point URL to prevent browser/CDN from using a cached version?",
    ),
    (
        "group_members",
        "Allow users to manage group members in new group forms",
    ),
    (
        "group_moderation",
        "Allow users to moderate annotations in groups",
    ),
    (
        "pre_moderation",
        "Allow users to enable pre moderated in groups, where all annotations require approval",
    ),
    (
        "group_type",
        "Allow users to choose group type in new group forms",
    ),
    ("html_image_annotation", "Support image annotations in HTML"),
    (
        "image_descriptions",
        "Allow users to enter descriptions for image annotations",
    ),
    (
        "pdf_custom_text_layer",
        "Use custom text layer in PDFs for improved text selection",
    ),
    ("pdf_image_annotation", "Support image annotations in PDFs"),
    (
        "styled_highlight_clusters",
        "Style different clusters of highlights in the client",
    ),
    ("at_mentions", "Allow mentioning other users in annotations"),
    ("log_in_with_orcid", "Allow users to log in with ORCID"),
];

/// Names of all registered features, in registry order.
pub fn feature_names() -> Vec<&'static str> {
    FEATURES.iter().map(|(name, _)| *name).collect()
}

pub fn is_known_feature(name: &str) -> bool {
    FEATURES.iter().any(|(known, _)| *known == name)
}

/// Feature
///
/// A row of the `feature` table: one flag with a toggle per audience tier.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Feature {
    pub id: i32,
    pub name: String,
    /// Enabled for everyone?
    pub everyone: bool,
    /// Enabled for first-party users?
    pub first_party: bool,
    /// Enabled for admins?
    pub admins: bool,
    /// Enabled for all staff?
    pub staff: bool,
}

/// FeatureUpdate
///
/// Sparse toggle update for one feature (POST /admin/features).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct FeatureUpdate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub everyone: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_party: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admins: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff: Option<bool>,
}

impl Feature {
    pub fn description(&self) -> Option<&'static str> {
        FEATURES
            .iter()
            .find(|(name, _)| *name == self.name)
            .map(|(_, description)| *description)
    }

    /// Inserts a default row for every registered feature that has none yet.
    ///
    /// Idempotent: existing rows are left untouched. Returns the number of
    /// rows created.
    pub async fn seed(repo: &dyn Repository) -> Result<u64, sqlx::Error> {
        let created = repo.insert_missing_features(&feature_names()).await?;
        if created > 0 {
            tracing::info!("created {} missing feature flags", created);
        }
        Ok(created)
    }

    /// All registered features, one row per name, in registry order.
    ///
    /// Pure read: names without a row (i.e. before [`Feature::seed`] ran) are
    /// absent from the result rather than created here.
    pub async fn all(repo: &dyn Repository) -> Result<Vec<Feature>, sqlx::Error> {
        let rows = repo.list_features().await?;
        Ok(FEATURES
            .iter()
            .filter_map(|(name, _)| rows.iter().find(|f| f.name == *name).cloned())
            .collect())
    }

    /// Removes rows whose name is no longer registered.
    ///
    /// A flag removed from the codebase would otherwise linger in the database
    /// and silently apply again if a flag with the same name came back later.
    pub async fn remove_old_flags(repo: &dyn Repository) -> Result<u64, sqlx::Error> {
        let count = repo.delete_features_not_in(&feature_names()).await?;
        if count > 0 {
            tracing::info!("removed {} old/unknown feature flags from database", count);
        }
        Ok(count)
    }
}
