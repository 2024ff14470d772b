use std::collections::BTreeMap;

use serde::Deserialize;

use super::Submission;
use crate::config::WorkflowConfig;
use crate::error::ApiError;
use crate::validation;

const IMAGE_PARAMETER: &str = "execute_container_image_uri";
const ARGUMENT_STAGES: [&str; 2] = ["init", "execute"];

pub const LABEL_PROJECT: &str = "cello-project";
pub const LABEL_TARGET: &str = "cello-target";
pub const LABEL_FRAMEWORK: &str = "cello-framework";
pub const LABEL_TYPE: &str = "cello-type";

/// A run request, either posted directly or read from a manifest file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkflowRequest {
    pub workflow_template_name: String,
    pub framework: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl WorkflowRequest {
    /// Parse manifest bytes (YAML, or JSON as a subset of it) and bind the run
    /// to `project`/`target`. Names in the file never override the binding.
    pub fn from_manifest(bytes: &[u8], project: &str, target: &str) -> Result<Self, ApiError> {
        let mut request: Self = serde_yaml::from_slice(bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid manifest: {e}")))?;
        request.project_name = project.to_owned();
        request.target_name = target.to_owned();
        Ok(request)
    }

    /// Check the request shape and its framework/type against the configured
    /// command table. Existence of the project and target is not checked here.
    pub fn validate(&self, config: &WorkflowConfig) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        let mut record = |result: Result<(), ApiError>| {
            if let Err(ApiError::BadRequest(msg)) = result {
                errors.push(msg);
            }
        };

        record(validation::check_template_name(&self.workflow_template_name));
        record(validation::check_project_name(&self.project_name));
        record(validation::check_target_name(&self.target_name));

        if config.frameworks().any(|f| f == self.framework) {
            if config.command(&self.framework, &self.workflow_type).is_none() {
                record(Err(ApiError::BadRequest(format!(
                    "type must be one of: {}",
                    config.types(&self.framework).join(", ")
                ))));
            }
        } else {
            record(Err(ApiError::BadRequest(format!(
                "framework must be one of: {}",
                config.frameworks().collect::<Vec<_>>().join(", ")
            ))));
        }

        match self.parameters.get(IMAGE_PARAMETER) {
            Some(image) => record(validation::check_container_image(image)),
            None => record(Err(ApiError::BadRequest(format!(
                "parameters.{IMAGE_PARAMETER} is required"
            )))),
        }
        for key in self.parameters.keys().filter(|k| *k != IMAGE_PARAMETER) {
            record(Err(ApiError::BadRequest(format!("unknown parameter: {key}"))));
        }

        for key in self.arguments.keys() {
            if !ARGUMENT_STAGES.contains(&key.as_str()) {
                record(Err(ApiError::BadRequest(format!(
                    "arguments: unknown stage {key}, expected init or execute"
                ))));
            }
        }

        for (name, value) in &self.environment_variables {
            record(validation::check_env_var_name(name));
            if value.chars().any(char::is_whitespace) {
                record(Err(ApiError::BadRequest(format!(
                    "environment variable {name} must not contain whitespace"
                ))));
            }
        }

        for (key, value) in &self.labels {
            record(validation::check_label(key, value));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    /// Build the engine submission. Expects a request that passed `validate`.
    pub fn into_submission(self, config: &WorkflowConfig) -> Result<Submission, ApiError> {
        let command = config
            .command(&self.framework, &self.workflow_type)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "no command for {}/{}",
                    self.framework, self.workflow_type
                ))
            })?;

        let args = |stage: &str| self.arguments.get(stage).map(|a| a.join(" "));

        let mut execute_command = command.to_owned();
        if let Some(extra) = args("execute").filter(|a| !a.is_empty()) {
            execute_command.push(' ');
            execute_command.push_str(&extra);
        }

        let mut parameters = BTreeMap::new();
        parameters.insert("project_name".to_owned(), self.project_name.clone());
        parameters.insert("target_name".to_owned(), self.target_name.clone());
        parameters.insert("framework".to_owned(), self.framework.clone());
        parameters.insert("type".to_owned(), self.workflow_type.clone());
        if let Some(image) = self.parameters.get(IMAGE_PARAMETER) {
            parameters.insert(IMAGE_PARAMETER.to_owned(), image.clone());
        }
        parameters.insert("execute_command".to_owned(), execute_command);
        if let Some(init) = args("init").filter(|a| !a.is_empty()) {
            parameters.insert("init_command".to_owned(), init);
        }
        parameters.insert(
            "environment_variables_string".to_owned(),
            self.environment_variables
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" "),
        );

        let mut labels = self.labels;
        labels.insert(LABEL_PROJECT.to_owned(), self.project_name);
        labels.insert(LABEL_TARGET.to_owned(), self.target_name);
        labels.insert(LABEL_FRAMEWORK.to_owned(), self.framework);
        labels.insert(LABEL_TYPE.to_owned(), self.workflow_type);

        Ok(Submission {
            from: format!("workflowtemplate/{}", self.workflow_template_name),
            parameters,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request() -> WorkflowRequest {
        serde_json::from_value(serde_json::json!({
            "workflow_template_name": "cello-single-step",
            "framework": "cdk",
            "type": "diff",
            "project_name": "proj1",
            "target_name": "t1",
            "parameters": {"execute_container_image_uri": "registry.example.com/cdk:1.2"},
            "arguments": {"init": ["--stage", "dev"], "execute": ["--all"]},
            "environment_variables": {"STAGE": "dev", "AWS_REGION": "us-west-2"},
            "labels": {"team": "platform"}
        }))
        .unwrap()
    }

    fn fields(err: ApiError) -> Vec<String> {
        match err {
            ApiError::Validation(fields) => fields,
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn valid_request_passes() {
        request().validate(&WorkflowConfig::default()).unwrap();
    }

    #[rstest]
    #[case::framework("framework", "pulumi", "framework must be one of")]
    #[case::workflow_type("type", "destroy", "type must be one of")]
    fn unknown_framework_or_type_rejected(
        #[case] field: &str,
        #[case] value: &str,
        #[case] expected: &str,
    ) {
        let mut json = serde_json::to_value(serde_json::json!({
            "workflow_template_name": "tpl",
            "framework": "cdk",
            "type": "diff",
            "project_name": "proj1",
            "target_name": "t1",
            "parameters": {"execute_container_image_uri": "img:1"}
        }))
        .unwrap();
        json[field] = value.into();
        let req: WorkflowRequest = serde_json::from_value(json).unwrap();

        let errors = fields(req.validate(&WorkflowConfig::default()).unwrap_err());
        assert!(errors.iter().any(|e| e.contains(expected)), "{errors:?}");
    }

    #[test]
    fn missing_image_rejected() {
        let mut req = request();
        req.parameters.clear();
        let errors = fields(req.validate(&WorkflowConfig::default()).unwrap_err());
        assert!(errors[0].contains(IMAGE_PARAMETER));
    }

    #[test]
    fn unknown_argument_stage_rejected() {
        let mut req = request();
        req.arguments.insert("deploy".into(), vec!["x".into()]);
        assert!(req.validate(&WorkflowConfig::default()).is_err());
    }

    #[test]
    fn whitespace_in_env_value_rejected() {
        let mut req = request();
        req.environment_variables.insert("BAD".into(), "two words".into());
        assert!(req.validate(&WorkflowConfig::default()).is_err());
    }

    #[test]
    fn submission_parameters() {
        let sub = request().into_submission(&WorkflowConfig::default()).unwrap();
        assert_eq!(sub.from, "workflowtemplate/cello-single-step");
        assert_eq!(sub.parameters["execute_command"], "cdk diff --all");
        assert_eq!(sub.parameters["init_command"], "--stage dev");
        assert_eq!(
            sub.parameters["environment_variables_string"],
            "AWS_REGION=us-west-2 STAGE=dev"
        );
        assert_eq!(sub.parameters["project_name"], "proj1");
        assert_eq!(
            sub.parameters[IMAGE_PARAMETER],
            "registry.example.com/cdk:1.2"
        );
    }

    #[test]
    fn system_labels_win() {
        let mut req = request();
        req.labels.insert(LABEL_PROJECT.into(), "spoofed".into());
        let sub = req.into_submission(&WorkflowConfig::default()).unwrap();
        assert_eq!(sub.labels[LABEL_PROJECT], "proj1");
        assert_eq!(sub.labels[LABEL_TYPE], "diff");
        assert_eq!(sub.labels["team"], "platform");
    }

    #[test]
    fn no_init_arguments_omits_init_command() {
        let mut req = request();
        req.arguments.remove("init");
        let sub = req.into_submission(&WorkflowConfig::default()).unwrap();
        assert!(!sub.parameters.contains_key("init_command"));
    }

    #[test]
    fn manifest_binds_project_and_target() {
        let manifest = br"
workflow_template_name: cello-single-step
framework: terraform
type: sync
project_name: elsewhere
parameters:
  execute_container_image_uri: hashicorp/terraform:1.9
";
        let req = WorkflowRequest::from_manifest(manifest, "proj1", "t1").unwrap();
        assert_eq!(req.project_name, "proj1");
        assert_eq!(req.target_name, "t1");
        req.validate(&WorkflowConfig::default()).unwrap();
    }

    #[test]
    fn manifest_accepts_json() {
        let manifest = serde_json::to_vec(&serde_json::json!({
            "workflow_template_name": "tpl",
            "framework": "cdk",
            "type": "sync",
            "parameters": {"execute_container_image_uri": "img:1"}
        }))
        .unwrap();
        let req = WorkflowRequest::from_manifest(&manifest, "proj1", "t1").unwrap();
        assert_eq!(req.workflow_type, "sync");
    }

    #[test]
    fn malformed_manifest_is_bad_request() {
        let err = WorkflowRequest::from_manifest(b"framework: [", "proj1", "t1").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
