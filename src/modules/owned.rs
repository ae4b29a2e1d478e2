//! Owned module instances and their grouping by type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::modules::kind::ModuleType;

/// A module reference as held by the build screen.
///
/// `data` carries the module content once it has been fetched from the module
/// store during selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRef {
    /// Identifier of the published module (shared by all its instances).
    pub on_chain_id: String,
    /// Identifier of the owned instance object.
    #[serde(default)]
    pub instance_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Image URL.
    #[serde(default)]
    pub image_url: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail_url: String,
    /// Module type.
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Module content, once fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ModuleRef {
    /// Build a bare reference with only the identifying fields set.
    #[must_use]
    pub fn new(module_type: ModuleType, on_chain_id: impl Into<String>) -> Self {
        Self {
            on_chain_id: on_chain_id.into(),
            instance_id: String::new(),
            name: String::new(),
            description: String::new(),
            image_url: String::new(),
            thumbnail_url: String::new(),
            module_type,
            data: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach fetched content.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Owned module instances grouped by type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OwnedModules {
    by_type: BTreeMap<ModuleType, Vec<ModuleRef>>,
}

impl OwnedModules {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an owned module under its type.
    pub fn insert(&mut self, module: ModuleRef) {
        self.by_type.entry(module.module_type).or_default().push(module);
    }

    /// Owned modules of one type.
    #[must_use]
    pub fn of_type(&self, module_type: ModuleType) -> &[ModuleRef] {
        self.by_type
            .get(&module_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a module with this on-chain id is owned under the given type.
    #[must_use]
    pub fn owns(&self, module_type: ModuleType, on_chain_id: &str) -> bool {
        self.of_type(module_type)
            .iter()
            .any(|m| m.on_chain_id == on_chain_id)
    }

    /// Every owned instance, grouped by type.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRef> {
        self.by_type.values().flatten()
    }

    /// Total number of owned instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// Whether nothing is owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<ModuleRef> for OwnedModules {
    fn from_iter<I: IntoIterator<Item = ModuleRef>>(iter: I) -> Self {
        let mut owned = Self::new();
        for module in iter {
            owned.insert(module);
        }
        owned
    }
}

/// Group raw owned-object responses from the chain RPC by module type.
///
/// Each object is expected in the `getOwnedObjects` shape with
/// `data.content.dataType == "moveObject"`. Objects without move content or
/// with an unknown type are skipped.
#[must_use]
pub fn categorize_instances(objects: &[Value]) -> OwnedModules {
    objects.iter().filter_map(parse_instance).collect()
}

fn parse_instance(object: &Value) -> Option<ModuleRef> {
    let content = object.get("data")?.get("content")?;
    if content.get("dataType").and_then(Value::as_str) != Some("moveObject") {
        return None;
    }

    let fields = content.get("fields")?;
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let raw_type = fields.get("type").and_then(Value::as_str)?;
    let module_type = match raw_type.parse::<ModuleType>() {
        Ok(kind) => kind,
        Err(err) => {
            tracing::debug!("Skipping owned object: {err}");
            return None;
        }
    };

    let on_chain_id = text("module_id");
    if on_chain_id.is_empty() {
        return None;
    }

    let instance_id = fields
        .get("id")
        .and_then(|id| id.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(ModuleRef {
        on_chain_id,
        instance_id,
        name: text("name"),
        description: text("description"),
        image_url: text("url"),
        thumbnail_url: text("thumbnail_url"),
        module_type,
        data: None,
    })
}
