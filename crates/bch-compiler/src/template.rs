//! Wallet templates: the JSON format describing the entities, variables
//! and scripts of a wallet.
//!
//! Only the parts the compiler consumes are modelled; scenarios are kept
//! as raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CompilerError;

/// A complete wallet template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTemplate {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entities: BTreeMap<String, WalletTemplateEntity>,
    pub scripts: BTreeMap<String, WalletTemplateScript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<BTreeMap<String, serde_json::Value>>,
    /// Identifiers of the virtual machines this template supports, such as
    /// `BCH_2023_05`.
    #[serde(default)]
    pub supported: Vec<String>,
    #[serde(default)]
    pub version: u32,
}

impl WalletTemplate {
    /// Parse a wallet template from JSON.
    ///
    /// # Arguments
    /// * `json` - The template document.
    ///
    /// # Returns
    /// The template, or `CompilerError::Json` if the document does not match
    /// the schema, or `CompilerError::Template` for an unsupported version.
    pub fn from_json(json: &str) -> Result<Self, CompilerError> {
        let template: WalletTemplate = serde_json::from_str(json)?;
        if template.version != 0 {
            return Err(CompilerError::Template(format!(
                "only version 0 wallet templates are supported, but this template is version {}",
                template.version
            )));
        }
        Ok(template)
    }

    /// Serialize this template as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CompilerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A participant in a wallet, owning a set of variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTemplateEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The scripts this entity is able to compile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, WalletTemplateVariable>>,
}

/// How a locking script is used in an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingType {
    /// The compiled bytecode is wrapped in a 20-byte P2SH template.
    P2sh20,
    /// The compiled bytecode is wrapped in a 32-byte P2SH template.
    P2sh32,
    /// The compiled bytecode is used directly.
    Standard,
}

/// The kind of locktime an unlocking script requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeLockType {
    Height,
    Timestamp,
}

/// A script in a wallet template.
///
/// The template format distinguishes plain, locking, unlocking and tested
/// scripts by which fields are present; all of them share this structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTemplateScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub script: String,
    /// Present on locking scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locking_type: Option<LockingType>,
    /// Present on unlocking scripts: the ID of the locking script unlocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_lock_type: Option<TimeLockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_lock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fails: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passes: Option<Vec<String>>,
    /// For tested scripts: whether the script is pushed before the checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<BTreeMap<String, WalletTemplateScriptTest>>,
}

impl WalletTemplateScript {
    /// A plain script with no role.
    pub fn new(script: impl Into<String>) -> Self {
        WalletTemplateScript {
            script: script.into(),
            ..WalletTemplateScript::default()
        }
    }
}

/// A test of a tested script. `setup` runs before the script and `check`
/// after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTemplateScriptTest {
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fails: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passes: Option<Vec<String>>,
}

/// A variable declared by an entity, tagged by its `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WalletTemplateVariable {
    AddressData(VariableInfo),
    HdKey(HdKeyVariable),
    Key(KeyVariable),
    WalletData(VariableInfo),
}

impl WalletTemplateVariable {
    /// The variable type as written in templates.
    pub fn type_name(&self) -> &'static str {
        match self {
            WalletTemplateVariable::AddressData(_) => "AddressData",
            WalletTemplateVariable::HdKey(_) => "HdKey",
            WalletTemplateVariable::Key(_) => "Key",
            WalletTemplateVariable::WalletData(_) => "WalletData",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub never_sign_twice: Option<bool>,
}

/// An HD key variable. Omitted paths use the compiler defaults: address
/// offset `0`, private derivation path `m/i` and HD public key derivation
/// path `m`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HdKeyVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub never_sign_twice: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_offset: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_public_key_derivation_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_derivation_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_derivation_path: Option<String>,
}
