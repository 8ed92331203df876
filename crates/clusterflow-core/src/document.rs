//! Generated infra document patches
//!
//! The cluster manager emits its own infra document (`kubernetes.tf.json`)
//! into the same directory as ours. Before both are applied together the
//! generated one is rewritten so it does not collide with our definitions:
//!
//! 1. the duplicated `cluster_name` output is removed
//! 2. the `provider` block is removed
//! 3. the `terraform` block is removed
//! 4. boot volumes of launch configurations and launch templates are encrypted
//! 5. `type` is dropped from DNS alias blocks
//!
//! Each patch is a pure function over the JSON tree, skips silently when its
//! target is absent and fails with [`CoreError::MalformedDocument`] when the
//! target has an unexpected shape. Every patch is idempotent.

use crate::error::{CoreError, Result};
use crate::output::InfraOutput;
use serde_json::{Map, Value};
use std::path::Path;

/// File name of the generated document inside the infra directory.
pub const GENERATED_DOCUMENT: &str = "kubernetes.tf.json";

const LAUNCH_CONFIGURATION: &str = "aws_launch_configuration";
const LAUNCH_TEMPLATE: &str = "aws_launch_template";
const ROUTE53_RECORD: &str = "aws_route53_record";

const DUPLICATE_OUTPUT: &str = "cluster_name";
const ENCRYPTED: &str = "encrypted";
const KMS_KEY_ID: &str = "kms_key_id";

/// Apply every patch in order.
pub fn transform(document: Value, output: &InfraOutput) -> Result<Value> {
    let document = remove_duplicate_outputs(document)?;
    let document = remove_provider_block(document)?;
    let document = remove_terraform_block(document)?;
    let document = encrypt_boot_volumes(document, output.encryption_key())?;
    strip_alias_record_types(document)
}

/// Read the document at `path`, transform it and write it back as
/// pretty-printed JSON.
pub fn transform_file(path: &Path, output: &InfraOutput) -> Result<()> {
    let bytes = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
    let document: Value = serde_json::from_slice(&bytes)?;

    let document = transform(document, output)?;

    let bytes = serde_json::to_vec_pretty(&document)?;
    std::fs::write(path, bytes).map_err(|e| CoreError::io(path, e))?;
    tracing::debug!("Patched generated document {}", path.display());
    Ok(())
}

/// Drop the `cluster_name` output our own document already defines.
pub fn remove_duplicate_outputs(mut document: Value) -> Result<Value> {
    let root = as_object_mut(&mut document, "/")?;
    if let Some(outputs) = present_mut(root.get_mut("output")) {
        as_object_mut(outputs, "/output")?.remove(DUPLICATE_OUTPUT);
    }
    Ok(document)
}

/// Provider wiring belongs to our document only.
pub fn remove_provider_block(mut document: Value) -> Result<Value> {
    as_object_mut(&mut document, "/")?.remove("provider");
    Ok(document)
}

/// Backend and required-provider settings belong to our document only.
pub fn remove_terraform_block(mut document: Value) -> Result<Value> {
    as_object_mut(&mut document, "/")?.remove("terraform");
    Ok(document)
}

/// Force `encrypted = true` on every boot volume and, when `key` is given,
/// point `kms_key_id` at it.
///
/// Covers both the launch-configuration shape (`root_block_device`) and the
/// launch-template shape (`block_device_mappings[].ebs[]`).
pub fn encrypt_boot_volumes(mut document: Value, key: Option<&Value>) -> Result<Value> {
    let mut encrypt = |volume: &mut Map<String, Value>, _: &str| -> Result<()> {
        volume.insert(ENCRYPTED.to_string(), Value::Bool(true));
        if let Some(key) = key {
            volume.insert(KMS_KEY_ID.to_string(), key.clone());
        }
        Ok(())
    };

    for_each_resource(&mut document, LAUNCH_CONFIGURATION, &mut |config, path| {
        match present_mut(config.get_mut("root_block_device")) {
            Some(device) => for_each_block(device, &format!("{path}/root_block_device"), &mut encrypt),
            None => Ok(()),
        }
    })?;

    for_each_resource(&mut document, LAUNCH_TEMPLATE, &mut |template, path| {
        let Some(mappings) = present_mut(template.get_mut("block_device_mappings")) else {
            return Ok(());
        };
        for_each_block(
            mappings,
            &format!("{path}/block_device_mappings"),
            &mut |mapping, mapping_path| match present_mut(mapping.get_mut("ebs")) {
                Some(ebs) => for_each_block(ebs, &format!("{mapping_path}/ebs"), &mut encrypt),
                None => Ok(()),
            },
        )
    })?;

    Ok(document)
}

/// Newer cluster-manager releases put `type` inside alias blocks, which the
/// applier rejects.
pub fn strip_alias_record_types(mut document: Value) -> Result<Value> {
    for_each_resource(&mut document, ROUTE53_RECORD, &mut |record, path| {
        match present_mut(record.get_mut("alias")) {
            Some(alias) => for_each_block(alias, &format!("{path}/alias"), &mut |alias, _| {
                alias.remove("type");
                Ok(())
            }),
            None => Ok(()),
        }
    })?;
    Ok(document)
}

type Visit<'v> = dyn FnMut(&mut Map<String, Value>, &str) -> Result<()> + 'v;

/// Visit every instance of `resource_type` under `/resource`.
fn for_each_resource(document: &mut Value, resource_type: &str, visit: &mut Visit<'_>) -> Result<()> {
    let root = as_object_mut(document, "/")?;
    let Some(resources) = present_mut(root.get_mut("resource")) else {
        return Ok(());
    };
    let resources = as_object_mut(resources, "/resource")?;
    let Some(collection) = present_mut(resources.get_mut(resource_type)) else {
        return Ok(());
    };

    let collection_path = format!("/resource/{resource_type}");
    for (name, instance) in as_object_mut(collection, &collection_path)?.iter_mut() {
        let path = format!("{collection_path}/{name}");
        visit(as_object_mut(instance, &path)?, &path)?;
    }
    Ok(())
}

/// Nested blocks may be written as a single object or a list of objects.
fn for_each_block(value: &mut Value, path: &str, visit: &mut Visit<'_>) -> Result<()> {
    match value {
        Value::Object(block) => visit(block, path),
        Value::Array(blocks) => {
            for (index, block) in blocks.iter_mut().enumerate() {
                let block_path = format!("{path}/{index}");
                visit(as_object_mut(block, &block_path)?, &block_path)?;
            }
            Ok(())
        }
        _ => Err(malformed(path, "object or array of objects")),
    }
}

fn as_object_mut<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>> {
    value.as_object_mut().ok_or_else(|| malformed(path, "object"))
}

/// `null` is treated like a missing key.
fn present_mut(value: Option<&mut Value>) -> Option<&mut Value> {
    value.filter(|v| !v.is_null())
}

pub(crate) fn malformed(path: impl Into<String>, expected: &'static str) -> CoreError {
    CoreError::MalformedDocument {
        path: path.into(),
        expected,
    }
}
