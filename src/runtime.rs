//! # Runtime Normalization
//!
//! After all merge layers, a handful of engine settings are pinned from
//! the process environment so the emitted document always matches the
//! deployment it runs in. These writes happen last and override whatever
//! the template, policy, override file, or script produced.

use serde_yaml::Value;

use crate::document;
use crate::error::Result;
use crate::settings::Runtime;

/// Pin deployment-owned engine settings onto the merged document.
///
/// `allow-lan`, `bind-address`, and `external-controller` are always
/// written. `secret`, `mixed-port`, and `socks-port` are written only
/// when configured, leaving the merged value alone otherwise.
pub fn normalize(config: &Value, runtime: &Runtime) -> Result<Value> {
    let root = document::expect_mapping(config, "document root")?;
    let mut output = root.clone();

    document::set(&mut output, "allow-lan", Value::Bool(true));
    document::set(&mut output, "bind-address", Value::String("*".to_string()));
    document::set(
        &mut output,
        "external-controller",
        Value::String(runtime.external_controller.clone()),
    );
    if let Some(secret) = &runtime.secret {
        document::set(&mut output, "secret", Value::String(secret.clone()));
    }
    if let Some(port) = runtime.mixed_port {
        document::set(&mut output, "mixed-port", Value::Number(port.into()));
    }
    if let Some(port) = runtime.socks_port {
        document::set(&mut output, "socks-port", Value::Number(port.into()));
    }

    Ok(output.into())
}
