use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::Group;

/// The only `expand` value groups understand.
pub const EXPAND_SCOPES: &str = "scopes";

/// GroupScopes
///
/// Present on a group JSON object only when `scopes` was expanded.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct GroupScopes {
    pub enforced: bool,
    pub uri_patterns: Vec<String>,
}

/// GroupJson
///
/// The API representation of a group.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct GroupJson {
    /// The group's pubid.
    pub id: String,
    pub groupid: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub scoped: bool,
    #[serde(rename = "type")]
    pub group_type: String,
    pub pre_moderated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<GroupScopes>,
}

pub struct GroupJSONPresenter<'a> {
    group: &'a Group,
}

impl<'a> GroupJSONPresenter<'a> {
    pub fn new(group: &'a Group) -> Self {
        Self { group }
    }

    /// Unknown `expand` values are ignored.
    pub fn as_json(&self, expand: &[String]) -> GroupJson {
        let group = self.group;
        let scopes = expand
            .iter()
            .any(|e| e == EXPAND_SCOPES)
            .then(|| GroupScopes {
                enforced: !group.scopes.is_empty(),
                uri_patterns: group
                    .scopes
                    .iter()
                    .map(|scope| format!("{}*", scope.trim_end_matches('*')))
                    .collect(),
            });

        GroupJson {
            id: group.pubid.clone(),
            groupid: group.authid.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            public: group.group_type.world_readable(),
            scoped: !group.scopes.is_empty(),
            group_type: group.group_type.to_string(),
            pre_moderated: group.pre_moderated,
            scopes,
        }
    }
}

pub struct GroupsJSONPresenter<'a> {
    groups: &'a [Group],
}

impl<'a> GroupsJSONPresenter<'a> {
    pub fn new(groups: &'a [Group]) -> Self {
        Self { groups }
    }

    pub fn as_json(&self, expand: &[String]) -> Vec<GroupJson> {
        self.groups
            .iter()
            .map(|group| GroupJSONPresenter::new(group).as_json(expand))
            .collect()
    }
}
