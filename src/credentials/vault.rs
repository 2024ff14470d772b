use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{
    CredentialsError, CredentialsProvider, ProjectCredentials, ProjectInfo, Target,
    TargetProperties, TargetType, TokenScope,
};

const POLICY_PREFIX: &str = "cello-project-";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Project tokens are periodic: they stay valid while renewed within this window.
const TOKEN_PERIOD: &str = "768h";

/// ACL policy naming a project's namespace.
pub fn policy_name(project: &str) -> String {
    format!("{POLICY_PREFIX}{project}")
}

/// AWS secrets engine role backing a target.
pub fn role_name(project: &str, target: &str) -> String {
    format!("{}-target-{target}", policy_name(project))
}

fn project_policy(project: &str) -> String {
    let roles = format!("{}-target-*", policy_name(project));
    format!(
        "path \"aws/creds/{roles}\" {{\n  capabilities = [\"read\"]\n}}\n\
         path \"aws/sts/{roles}\" {{\n  capabilities = [\"read\", \"update\"]\n}}\n"
    )
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct LookupSelf {
    #[serde(default)]
    policies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenCreate {
    auth: TokenAuth,
}

#[derive(Debug, Deserialize)]
struct TokenAuth {
    client_token: String,
    accessor: String,
}

#[derive(Debug, Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AwsRole {
    credential_type: String,
    #[serde(default)]
    role_arns: Vec<String>,
    #[serde(default)]
    policy_arns: Vec<String>,
    #[serde(default)]
    policy_document: String,
}

impl AwsRole {
    fn into_target(self, name: &str) -> Result<Target, CredentialsError> {
        let credential_type = self.credential_type.parse()?;
        Ok(Target {
            name: name.to_owned(),
            target_type: TargetType::AwsAccount,
            properties: TargetProperties {
                credential_type,
                role_arn: self.role_arns.into_iter().next(),
                policy_arns: self.policy_arns,
                policy_document: Some(self.policy_document).filter(|doc| !doc.is_empty()),
            },
        })
    }
}

fn role_payload(target: &Target) -> serde_json::Value {
    let props = &target.properties;
    serde_json::json!({
        "credential_type": props.credential_type.as_str(),
        "role_arns": props.role_arn.iter().collect::<Vec<_>>(),
        "policy_arns": props.policy_arns,
        "policy_document": props.policy_document.as_deref().unwrap_or_default(),
    })
}

async fn check(resp: Response) -> Result<Response, CredentialsError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(CredentialsError::Engine {
        status: status.as_u16(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Credentials provider backed by Vault's HTTP API.
///
/// A project is an ACL policy plus a periodic token carrying it; a target is
/// an AWS secrets engine role under the project's naming prefix.
pub struct VaultProvider {
    client: reqwest::Client,
    addr: String,
    token: String,
}

impl VaultProvider {
    pub fn new(addr: &str, token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.addr)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("X-Vault-Token", &self.token)
    }

    async fn read_role(&self, project: &str, target: &str) -> Result<Option<AwsRole>, CredentialsError> {
        let path = format!("aws/roles/{}", role_name(project, target));
        let resp = self.request(Method::GET, &path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<AwsRole> = check(resp).await?.json().await?;
        Ok(Some(envelope.data))
    }

    async fn write_role(&self, project: &str, target: &Target) -> Result<(), CredentialsError> {
        let path = format!("aws/roles/{}", role_name(project, &target.name));
        let resp = self
            .request(Method::POST, &path)
            .json(&role_payload(target))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialsProvider for VaultProvider {
    async fn validate_user_token(&self, token: &str) -> Result<TokenScope, CredentialsError> {
        if token.is_empty() {
            return Err(CredentialsError::InvalidToken);
        }
        let resp = self
            .client
            .get(self.url("auth/token/lookup-self"))
            .header("X-Vault-Token", token)
            .send()
            .await?;
        if matches!(resp.status(), StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED) {
            return Err(CredentialsError::InvalidToken);
        }
        let envelope: Envelope<LookupSelf> = check(resp).await?.json().await?;

        let projects: Vec<String> = envelope
            .data
            .policies
            .iter()
            .filter_map(|policy| policy.strip_prefix(POLICY_PREFIX))
            .map(str::to_owned)
            .collect();
        if projects.is_empty() {
            return Err(CredentialsError::InvalidToken);
        }
        Ok(TokenScope { projects })
    }

    async fn project_exists(&self, project: &str) -> Result<bool, CredentialsError> {
        let path = format!("sys/policies/acl/{}", policy_name(project));
        let resp = self.request(Method::GET, &path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(resp).await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), err)]
    async fn create_project(&self, project: &str) -> Result<ProjectCredentials, CredentialsError> {
        let policy = policy_name(project);

        let resp = self
            .request(Method::PUT, &format!("sys/policies/acl/{policy}"))
            .json(&serde_json::json!({ "policy": project_policy(project) }))
            .send()
            .await?;
        check(resp).await?;

        let resp = self
            .request(Method::POST, "auth/token/create")
            .json(&serde_json::json!({
                "policies": [policy],
                "meta": { "project": project },
                "display_name": format!("cello-{project}"),
                "no_parent": true,
                "period": TOKEN_PERIOD,
            }))
            .send()
            .await?;
        let created: TokenCreate = check(resp).await?.json().await?;

        tracing::info!(%project, "project namespace provisioned");
        Ok(ProjectCredentials {
            token: created.auth.client_token,
            token_accessor: created.auth.accessor,
        })
    }

    async fn get_project(&self, project: &str) -> Result<ProjectInfo, CredentialsError> {
        if !self.project_exists(project).await? {
            return Err(CredentialsError::NotFound("project"));
        }
        Ok(ProjectInfo {
            name: project.to_owned(),
        })
    }

    #[tracing::instrument(skip(self), err)]
    async fn delete_project(&self, project: &str) -> Result<(), CredentialsError> {
        let path = format!("sys/policies/acl/{}", policy_name(project));
        let resp = self.request(Method::DELETE, &path).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_targets(&self, project: &str) -> Result<Vec<String>, CredentialsError> {
        if !self.project_exists(project).await? {
            return Err(CredentialsError::NotFound("project"));
        }

        let resp = self
            .request(Method::GET, "aws/roles?list=true")
            .send()
            .await?;
        // Vault answers 404 for a list with no keys.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let envelope: Envelope<KeyList> = check(resp).await?.json().await?;

        let prefix = format!("{}-target-", policy_name(project));
        let mut targets: Vec<String> = envelope
            .data
            .keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_owned)
            .collect();
        targets.sort();
        Ok(targets)
    }

    async fn target_exists(&self, project: &str, target: &str) -> Result<bool, CredentialsError> {
        Ok(self.read_role(project, target).await?.is_some())
    }

    async fn get_target(&self, project: &str, target: &str) -> Result<Target, CredentialsError> {
        self.read_role(project, target)
            .await?
            .ok_or(CredentialsError::NotFound("target"))?
            .into_target(target)
    }

    #[tracing::instrument(skip(self, target), fields(target = %target.name), err)]
    async fn create_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError> {
        self.write_role(project, target).await
    }

    #[tracing::instrument(skip(self, target), fields(target = %target.name), err)]
    async fn update_target(&self, project: &str, target: &Target) -> Result<(), CredentialsError> {
        self.write_role(project, target).await
    }

    #[tracing::instrument(skip(self), err)]
    async fn delete_target(&self, project: &str, target: &str) -> Result<(), CredentialsError> {
        let path = format!("aws/roles/{}", role_name(project, target));
        let resp = self.request(Method::DELETE, &path).send().await?;
        check(resp).await?;
        Ok(())
    }
}
