use std::net::IpAddr;

use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.len();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Project names double as secrets-engine path segments, so only ASCII
/// alphanumerics are allowed.
pub fn check_project_name(value: &str) -> Result<(), ApiError> {
    check_length("project name", value, 4, 32)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(
            "project name must contain only alphanumeric characters".into(),
        ));
    }
    Ok(())
}

pub fn check_target_name(value: &str) -> Result<(), ApiError> {
    check_length("target name", value, 1, 32)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::BadRequest(
            "target name must contain only alphanumeric characters, hyphens, or underscores"
                .into(),
        ));
    }
    Ok(())
}

/// Kubernetes object names (DNS subdomain): lowercase alphanumerics, `-`, `.`.
pub fn check_template_name(value: &str) -> Result<(), ApiError> {
    check_length("workflow_template_name", value, 1, 253)?;
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid_chars || !valid_edges {
        return Err(ApiError::BadRequest(
            "workflow_template_name must be a valid resource name".into(),
        ));
    }
    Ok(())
}

/// Validates a container image reference.
///
/// Accepts: `registry/image:tag`, `image:tag`, `image@sha256:abc...`,
///          `gcr.io/project/image:tag`, `localhost:5000/image:tag`
///
/// Rejects: shell metacharacters, empty strings, strings > 500 chars,
///          strings containing `;`, `&`, `|`, `$`, backtick, quotes, `\`, newlines
pub fn check_container_image(image: &str) -> Result<(), ApiError> {
    check_length("execute_container_image_uri", image, 1, 500)?;

    let forbidden = [
        ';', '&', '|', '$', '`', '\'', '"', '\\', '\n', '\r', ' ', '\t',
    ];
    if image.chars().any(|c| forbidden.contains(&c)) {
        return Err(ApiError::BadRequest(
            "execute_container_image_uri: contains forbidden characters".into(),
        ));
    }

    if !image.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(
            "execute_container_image_uri: must contain alphanumeric characters".into(),
        ));
    }

    Ok(())
}

/// Split an IAM ARN (`arn:<partition>:iam::<account>:<resource>`) into its
/// account and resource parts.
fn parse_iam_arn(value: &str) -> Option<(&str, &str)> {
    let mut parts = value.splitn(6, ':');
    let (Some("arn"), Some(partition), Some("iam"), Some(""), Some(account), Some(resource)) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return None;
    };
    if partition.is_empty() || account.is_empty() {
        return None;
    }
    Some((account, resource))
}

pub fn check_role_arn(value: &str) -> Result<(), ApiError> {
    check_length("role_arn", value, 1, 2048)?;
    let valid = parse_iam_arn(value).is_some_and(|(account, resource)| {
        account.chars().all(|c| c.is_ascii_digit())
            && resource.strip_prefix("role/").is_some_and(|name| !name.is_empty())
    });
    if !valid {
        return Err(ApiError::BadRequest(format!(
            "role_arn must be an IAM role ARN (got {value})"
        )));
    }
    Ok(())
}

pub fn check_policy_arn(value: &str) -> Result<(), ApiError> {
    check_length("policy_arn", value, 1, 2048)?;
    // AWS-managed policies use the literal account "aws".
    let valid = parse_iam_arn(value).is_some_and(|(account, resource)| {
        (account == "aws" || account.chars().all(|c| c.is_ascii_digit()))
            && resource.strip_prefix("policy/").is_some_and(|name| !name.is_empty())
    });
    if !valid {
        return Err(ApiError::BadRequest(format!(
            "policy_arns must contain IAM policy ARNs (got {value})"
        )));
    }
    Ok(())
}

pub fn check_policy_document(value: &str) -> Result<(), ApiError> {
    check_length("policy_document", value, 1, 6144)?;
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        _ => Err(ApiError::BadRequest(
            "policy_document must be a JSON object".into(),
        )),
    }
}

pub fn check_env_var_name(value: &str) -> Result<(), ApiError> {
    check_length("environment variable name", value, 1, 255)?;
    let mut chars = value.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::BadRequest(format!(
            "invalid environment variable name: {value}"
        )));
    }
    Ok(())
}

pub fn check_label(key: &str, value: &str) -> Result<(), ApiError> {
    check_length("label key", key, 1, 63)?;
    check_length("label value", value, 0, 63)?;
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !key.chars().all(allowed) || !value.chars().all(allowed) {
        return Err(ApiError::BadRequest(format!("invalid label: {key}={value}")));
    }
    Ok(())
}

/// Schemes a manifest repository may be cloned over.
pub const REPOSITORY_SCHEMES: &[&str] = &["https", "ssh"];

/// Remote git repository URL. Local paths, `file://` and internal hosts are
/// rejected so a caller cannot make the server clone from itself.
pub fn check_repository(value: &str) -> Result<(), ApiError> {
    check_length("repository", value, 1, 2048)?;
    if value.starts_with('-') || value.chars().any(|c| c.is_whitespace() || c == '\0') {
        return Err(ApiError::BadRequest("invalid repository".into()));
    }
    check_ssrf_url(value, REPOSITORY_SCHEMES)
}

fn is_ipv6_unique_local(v6: &std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

/// Loopback, private, link-local, broadcast or unspecified.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || is_ipv6_unique_local(&v6)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parse `url_str` and reject disallowed schemes, missing hosts, metadata
/// endpoints and private or reserved IP literals.
pub fn check_ssrf_url(url_str: &str, allowed_schemes: &[&str]) -> Result<(), ApiError> {
    let parsed =
        url::Url::parse(url_str).map_err(|_| ApiError::BadRequest("invalid URL".into()))?;

    if !allowed_schemes.contains(&parsed.scheme()) {
        return Err(ApiError::BadRequest(format!(
            "URL must use one of these schemes: {allowed_schemes:?}"
        )));
    }

    let host = match parsed.host() {
        Some(url::Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(url::Host::Ipv4(ip)) => {
            return reject_private(IpAddr::V4(ip));
        }
        Some(url::Host::Ipv6(ip)) => {
            return reject_private(IpAddr::V6(ip));
        }
        None => return Err(ApiError::BadRequest("URL must have a host".into())),
    };

    // Hosts of non-special schemes such as ssh stay opaque, so IPv4 literals
    // arrive here as domains.
    if let Ok(ip) = host.parse::<IpAddr>() {
        return reject_private(ip);
    }

    let blocked = ["localhost", "metadata.google.internal"];
    if blocked.contains(&host.as_str()) || host.ends_with(".localhost") {
        return Err(ApiError::BadRequest(
            "URL must not target internal/metadata endpoints".into(),
        ));
    }
    Ok(())
}

fn reject_private(ip: IpAddr) -> Result<(), ApiError> {
    if is_private_ip(ip) {
        return Err(ApiError::BadRequest(
            "URL must not target private/reserved IP addresses".into(),
        ));
    }
    Ok(())
}

/// Abbreviated or full SHA-1 commit hash.
pub fn check_commit_hash(value: &str) -> Result<(), ApiError> {
    if !(7..=40).contains(&value.len()) || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::BadRequest(
            "commit_hash must be 7 to 40 hex characters".into(),
        ));
    }
    Ok(())
}

/// Repository-relative file path.
pub fn check_repo_path(value: &str) -> Result<(), ApiError> {
    check_length("path", value, 1, 1024)?;
    if value.starts_with('/')
        || value.contains('\0')
        || value.contains('\n')
        || value.split('/').any(|segment| segment == "..")
    {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    Ok(())
}
