use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::validation;

/// Maximum number of managed policies attached to an assumed-role target.
pub const MAX_POLICY_ARNS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    AwsAccount,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwsAccount => "aws_account",
        }
    }
}

/// How the secrets engine mints credentials for a target. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    AssumedRole,
}

impl CredentialType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssumedRole => "assumed_role",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assumed_role" => Ok(Self::AssumedRole),
            other => anyhow::bail!("unknown credential type: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub properties: TargetProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProperties {
    pub credential_type: CredentialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub policy_arns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_document: Option<String>,
}

/// Partial update for a target. `name` and `type` may appear in the body but
/// are never read, so stored identity cannot change.
#[derive(Debug, Default, Deserialize)]
pub struct TargetPatch {
    #[serde(default)]
    pub properties: Option<PropertiesPatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PropertiesPatch {
    /// Kept as a string so an unknown value is still reported as an attempt
    /// to change an immutable field.
    #[serde(default)]
    pub credential_type: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub policy_arns: Option<Vec<String>>,
    #[serde(default)]
    pub policy_document: Option<String>,
}

impl Target {
    /// Check the target against the rules for its credential type, reporting
    /// every violation at once.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        let mut record = |result: Result<(), ApiError>| {
            if let Err(ApiError::BadRequest(msg)) = result {
                errors.push(msg);
            }
        };

        record(validation::check_target_name(&self.name));

        let props = &self.properties;
        match props.credential_type {
            CredentialType::AssumedRole => match props.role_arn.as_deref() {
                Some(arn) => record(validation::check_role_arn(arn)),
                None => record(Err(ApiError::BadRequest(
                    "role_arn is required for assumed_role targets".into(),
                ))),
            },
        }

        if props.policy_arns.len() > MAX_POLICY_ARNS {
            record(Err(ApiError::BadRequest(format!(
                "policy_arns: max {MAX_POLICY_ARNS} entries"
            ))));
        }
        for arn in &props.policy_arns {
            record(validation::check_policy_arn(arn));
        }

        if let Some(doc) = props.policy_document.as_deref() {
            record(validation::check_policy_document(doc));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    /// Shallow merge: every property present in the patch replaces the stored
    /// value, absent properties are kept.
    pub fn apply_patch(&self, patch: TargetPatch) -> Result<Self, ApiError> {
        let mut merged = self.clone();
        let Some(props) = patch.properties else {
            return Ok(merged);
        };

        if let Some(requested) = props.credential_type
            && requested != self.properties.credential_type.as_str()
        {
            return Err(ApiError::BadRequest(
                "credential_type cannot be changed".into(),
            ));
        }
        if let Some(role_arn) = props.role_arn {
            merged.properties.role_arn = Some(role_arn);
        }
        if let Some(policy_arns) = props.policy_arns {
            merged.properties.policy_arns = policy_arns;
        }
        if let Some(policy_document) = props.policy_document {
            merged.properties.policy_document = Some(policy_document);
        }
        Ok(merged)
    }
}
