use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::{GroupChanges, GroupType};

pub const GROUP_NAME_MIN_LENGTH: usize = 3;
pub const GROUP_NAME_MAX_LENGTH: usize = 25;
pub const GROUP_DESCRIPTION_MAX_LENGTH: usize = 250;
const GROUPID_NAME_MAX_LENGTH: usize = 1024;

/// A request body that parsed as JSON but failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// CreateGroupPayload
///
/// A validated `POST /api/groups` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateGroupPayload {
    pub name: String,
    pub description: Option<String>,
    /// Caller-assigned id, `group:{name}@{authority}`.
    pub groupid: Option<String>,
    #[serde(rename = "type", default)]
    pub group_type: GroupType,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub pre_moderated: bool,
}

/// UpdateGroupPayload
///
/// A validated `PATCH /api/groups/{id}` body. Absent fields stay untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateGroupPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub groupid: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<GroupType>,
    pub pre_moderated: Option<bool>,
}

impl UpdateGroupPayload {
    pub fn into_changes(self) -> GroupChanges {
        GroupChanges {
            name: self.name,
            description: self.description,
            authid: self.groupid,
            group_type: self.group_type,
            pre_moderated: self.pre_moderated,
        }
    }
}

/// Rules shared by the create and update schemas.
struct GroupRules<'a> {
    default_authority: &'a str,
    group_authority: &'a str,
}

impl GroupRules<'_> {
    fn name(&self, body: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
        let Some(name) = optional_str(body, "name")? else {
            return Ok(None);
        };
        let name = name.trim();
        let length = name.chars().count();
        if length < GROUP_NAME_MIN_LENGTH {
            return Err(ValidationError::new(
                "name",
                format!("must be at least {} characters long", GROUP_NAME_MIN_LENGTH),
            ));
        }
        if length > GROUP_NAME_MAX_LENGTH {
            return Err(ValidationError::new(
                "name",
                format!("must be at most {} characters long", GROUP_NAME_MAX_LENGTH),
            ));
        }
        Ok(Some(name.to_string()))
    }

    fn description(&self, body: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
        let description = optional_str(body, "description")?;
        if let Some(description) = description {
            if description.chars().count() > GROUP_DESCRIPTION_MAX_LENGTH {
                return Err(ValidationError::new(
                    "description",
                    format!(
                        "must be at most {} characters long",
                        GROUP_DESCRIPTION_MAX_LENGTH
                    ),
                ));
            }
        }
        Ok(description.map(str::to_string))
    }

    /// A groupid may only be set for third-party authorities, and only with
    /// the caller's own authority.
    fn groupid(&self, body: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
        let Some(groupid) = optional_str(body, "groupid")? else {
            return Ok(None);
        };
        let authority = parse_groupid_authority(groupid).ok_or_else(|| {
            ValidationError::new(
                "groupid",
                format!("'{}' does not match \"group:{{name}}@{{authority}}\"", groupid),
            )
        })?;
        if self.group_authority == self.default_authority {
            return Err(ValidationError::new(
                "groupid",
                "may only be set on groups outside of the default authority",
            ));
        }
        if authority != self.group_authority {
            return Err(ValidationError::new(
                "groupid",
                "invalid authority specified in groupid",
            ));
        }
        Ok(Some(groupid.to_string()))
    }

    fn group_type(&self, body: &Map<String, Value>) -> Result<Option<GroupType>, ValidationError> {
        optional_str(body, "type")?
            .map(|value| {
                GroupType::try_from(value.to_string())
                    .map_err(|error| ValidationError::new("type", error.to_string()))
            })
            .transpose()
    }

    fn pre_moderated(&self, body: &Map<String, Value>) -> Result<Option<bool>, ValidationError> {
        match body.get("pre_moderated") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(ValidationError::new("pre_moderated", "must be a boolean")),
        }
    }

    fn scopes(
        &self,
        body: &Map<String, Value>,
        group_type: GroupType,
    ) -> Result<Vec<String>, ValidationError> {
        let scopes = match body.get("scopes") {
            None | Some(Value::Null) => return Ok(vec![]),
            Some(Value::Array(scopes)) => scopes,
            Some(_) => return Err(ValidationError::new("scopes", "must be an array")),
        };
        if !scopes.is_empty() && !group_type.world_readable() {
            return Err(ValidationError::new(
                "scopes",
                "private groups cannot have scopes",
            ));
        }
        scopes
            .iter()
            .map(|scope| match scope.as_str() {
                Some(s) if s.starts_with("http://") || s.starts_with("https://") => {
                    Ok(s.to_string())
                }
                _ => Err(ValidationError::new(
                    "scopes",
                    format!("{} is not an http(s) URI prefix", scope),
                )),
            })
            .collect()
    }
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::new("body", "must be a JSON object"))
}

fn optional_str<'v>(
    body: &'v Map<String, Value>,
    field: &str,
) -> Result<Option<&'v str>, ValidationError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(ValidationError::new(field, "must be a string")),
    }
}

/// Authority of a `group:{name}@{authority}` id, or `None` when malformed.
fn parse_groupid_authority(groupid: &str) -> Option<&str> {
    let rest = groupid.strip_prefix("group:")?;
    let (name, authority) = rest.rsplit_once('@')?;
    let name_ok = (1..=GROUPID_NAME_MAX_LENGTH).contains(&name.chars().count())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-+!~*()'".contains(c));
    (name_ok && !authority.is_empty()).then_some(authority)
}

/// CreateGroupAPISchema
///
/// Validates group creation bodies. `group_authority` is the acting user's
/// authority, `default_authority` the service's own.
pub struct CreateGroupAPISchema<'a> {
    rules: GroupRules<'a>,
}

impl<'a> CreateGroupAPISchema<'a> {
    pub fn new(default_authority: &'a str, group_authority: &'a str) -> Self {
        Self {
            rules: GroupRules {
                default_authority,
                group_authority,
            },
        }
    }

    pub fn validate(&self, body: &Value) -> Result<CreateGroupPayload, ValidationError> {
        let body = as_object(body)?;
        let name = self
            .rules
            .name(body)?
            .ok_or_else(|| ValidationError::new("name", "is a required property"))?;
        let group_type = self.rules.group_type(body)?.unwrap_or_default();

        Ok(CreateGroupPayload {
            name,
            description: self.rules.description(body)?,
            groupid: self.rules.groupid(body)?,
            group_type,
            scopes: self.rules.scopes(body, group_type)?,
            pre_moderated: self.rules.pre_moderated(body)?.unwrap_or(false),
        })
    }
}

/// UpdateGroupAPISchema
///
/// Same rules as creation, with every field optional.
pub struct UpdateGroupAPISchema<'a> {
    rules: GroupRules<'a>,
}

impl<'a> UpdateGroupAPISchema<'a> {
    pub fn new(default_authority: &'a str, group_authority: &'a str) -> Self {
        Self {
            rules: GroupRules {
                default_authority,
                group_authority,
            },
        }
    }

    pub fn validate(&self, body: &Value) -> Result<UpdateGroupPayload, ValidationError> {
        let body = as_object(body)?;
        Ok(UpdateGroupPayload {
            name: self.rules.name(body)?,
            description: self.rules.description(body)?,
            groupid: self.rules.groupid(body)?,
            group_type: self.rules.group_type(body)?,
            pre_moderated: self.rules.pre_moderated(body)?,
        })
    }
}
