//! Infra-applier output
//!
//! `terraform output -json` wraps every value as
//! `{"value": ..., "type": ..., "sensitive": ...}`. The rest of the workflow
//! (templates, document patches, the persisted `tf/output.json`) works on the
//! flattened `key -> value` form.

use crate::document::malformed;
use crate::error::{CoreError, Result};
use serde_json::{Map, Value};

/// Output key holding the role the final kubeconfig authenticates as.
pub const ADMIN_ROLE_KEY: &str = "aws_iam_cluster_admin_role_arn";

/// Output key holding the volume encryption key reference, when present.
pub const ENCRYPTION_KEY_KEY: &str = "encryption_key_arn";

/// Path (relative to the working directory) of the persisted output.
pub const OUTPUT_ASSET: &str = "tf/output.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfraOutput {
    values: Map<String, Value>,
}

impl InfraOutput {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Parse raw applier output and flatten it.
    pub fn from_terraform_json(bytes: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        let Value::Object(raw) = raw else {
            return Err(malformed("/", "object"));
        };

        let values = raw
            .into_iter()
            .map(|(key, entry)| match entry {
                Value::Object(mut wrapped) if wrapped.contains_key("value") => {
                    let value = wrapped.remove("value").unwrap_or(Value::Null);
                    (key, value)
                }
                other => (key, other),
            })
            .collect();

        Ok(Self { values })
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Look up a value; JSON `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(malformed(format!("/{key}"), "string")),
            None => Err(CoreError::MissingOutput(key.to_string())),
        }
    }

    pub fn admin_role_arn(&self) -> Result<&str> {
        self.require_str(ADMIN_ROLE_KEY)
    }

    pub fn encryption_key(&self) -> Option<&Value> {
        self.get(ENCRYPTION_KEY_KEY)
    }

    /// Pretty JSON as persisted to [`OUTPUT_ASSET`].
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.values)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{
        "aws_iam_cluster_admin_role_arn": {"sensitive": false, "type": "string", "value": "arn:aws:iam::1:role/admin"},
        "encryption_key_arn": {"sensitive": false, "type": "string", "value": "arn:aws:kms:us-east-1:1:key/k"},
        "vpc_id": {"sensitive": false, "type": "string", "value": "vpc-1"}
    }"#;

    #[test]
    fn test_flattens_wrapped_values() {
        let output = InfraOutput::from_terraform_json(RAW.as_bytes()).unwrap();
        assert_eq!(output.admin_role_arn().unwrap(), "arn:aws:iam::1:role/admin");
        assert_eq!(output.get("vpc_id"), Some(&Value::from("vpc-1")));
        assert_eq!(
            output.encryption_key(),
            Some(&Value::from("arn:aws:kms:us-east-1:1:key/k"))
        );
    }

    #[test]
    fn test_null_encryption_key_is_absent() {
        let raw = r#"{"encryption_key_arn": {"value": null}}"#;
        let output = InfraOutput::from_terraform_json(raw.as_bytes()).unwrap();
        assert_eq!(output.encryption_key(), None);
    }

    #[test]
    fn test_missing_admin_role() {
        let output = InfraOutput::from_terraform_json(b"{}").unwrap();
        assert!(matches!(
            output.admin_role_arn(),
            Err(CoreError::MissingOutput(key)) if key == ADMIN_ROLE_KEY
        ));
    }

    #[test]
    fn test_non_object_output_is_malformed() {
        assert!(matches!(
            InfraOutput::from_terraform_json(b"[]"),
            Err(CoreError::MalformedDocument { .. })
        ));
        assert!(InfraOutput::from_terraform_json(b"not json").is_err());
    }

    #[test]
    fn test_persisted_form_is_flat() {
        let output = InfraOutput::from_terraform_json(RAW.as_bytes()).unwrap();
        let persisted: Value = serde_json::from_slice(&output.to_json_bytes().unwrap()).unwrap();
        assert_eq!(persisted["vpc_id"], "vpc-1");
    }
}
