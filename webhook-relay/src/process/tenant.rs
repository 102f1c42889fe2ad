//! Channel → tenant routing.
//!
//! The routing table is a JSON object such as `{"1234567890":"tenantA"}`,
//! parsed once when the resolver is built. Resolution never fails: anything
//! that cannot be mapped lands on [`DEFAULT_TENANT`].

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

/// Tenant used when no mapping applies.
pub const DEFAULT_TENANT: &str = "default";

/// Static, read-only channel → tenant table.
#[derive(Debug, Clone, Default)]
pub struct TenantResolver {
    routes: HashMap<String, String>,
}

impl TenantResolver {
    /// Build a resolver from the raw routing blob.
    ///
    /// A blob that is not valid JSON, or not an object, yields an empty table.
    /// Entries whose value is not a non-empty string or number are skipped.
    pub fn from_json(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, raw_length = raw.len(), "tenant_routing_invalid_json");
                return Self::default();
            }
        };

        let object = match parsed {
            Value::Object(map) => map,
            Value::Null => return Self::default(),
            other => {
                warn!(json_type = json_type(&other), "tenant_routing_not_an_object");
                return Self::default();
            }
        };

        let mut routes = HashMap::with_capacity(object.len());
        for (channel_id, tenant) in object {
            let tenant_id = match tenant {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    warn!(
                        channel_id = %channel_id,
                        json_type = json_type(&other),
                        "tenant_routing_entry_skipped"
                    );
                    continue;
                }
            };

            if tenant_id.trim().is_empty() {
                warn!(channel_id = %channel_id, "tenant_routing_entry_empty");
                continue;
            }

            routes.insert(channel_id, tenant_id);
        }

        debug!(routes = routes.len(), "tenant_routing_loaded");

        Self { routes }
    }

    /// Number of usable routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve a channel to its tenant, falling back to [`DEFAULT_TENANT`].
    pub fn resolve(&self, channel_id: Option<&str>) -> String {
        channel_id
            .and_then(|id| self.routes.get(id))
            .cloned()
            .unwrap_or_else(|| DEFAULT_TENANT.to_string())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
