use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{GovernedObject, KernelError, ObjectRef, ObjectType, Oid, Relation};

pub const ASSIGNMENT_DEFINITION: &str = "AssignmentType";
pub const INDUCEMENT_DEFINITION: &str = "InducementType";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ItemDefinition {
    pub type_name: String,
}

impl ItemDefinition {
    #[must_use]
    pub fn assignment() -> Self {
        Self { type_name: ASSIGNMENT_DEFINITION.to_string() }
    }

    #[must_use]
    pub fn inducement() -> Self {
        Self { type_name: INDUCEMENT_DEFINITION.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ExtensionItem {
    pub name: String,
    #[serde(default)]
    pub definition: Option<ItemDefinition>,
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeStatus {
    Enabled,
    Disabled,
    Archived,
}

impl AdministrativeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Archived => "archived",
        }
    }
}

/// Activation metadata; interpreted only by an [`crate::ActivationCalculator`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Activation {
    #[serde(default)]
    pub administrative_status: Option<AdministrativeStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
}

impl Activation {
    #[must_use]
    pub fn disabled() -> Self {
        Self { administrative_status: Some(AdministrativeStatus::Disabled), ..Self::default() }
    }

    #[must_use]
    pub fn window(valid_from: Option<OffsetDateTime>, valid_to: Option<OffsetDateTime>) -> Self {
        Self { administrative_status: None, valid_from, valid_to }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrength {
    Weak,
    #[default]
    Normal,
    Strong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShadowKind {
    #[default]
    Account,
    Entitlement,
    Generic,
}

impl ShadowKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Entitlement => "entitlement",
            Self::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AttributeRule {
    pub attribute: String,
    #[serde(default)]
    pub strength: MappingStrength,
    pub expression: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ConstructionSpec {
    pub resource_ref: Oid,
    /// Serialized as `shadow_kind`; `kind` is the content tag.
    #[serde(default, rename = "shadow_kind")]
    pub kind: ShadowKind,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeRule>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ConstructionSpec {
    #[must_use]
    pub fn account(resource_ref: Oid) -> Self {
        Self {
            resource_ref,
            kind: ShadowKind::Account,
            intent: None,
            attributes: Vec::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    #[must_use]
    pub fn with_attribute(
        mut self,
        attribute: impl Into<String>,
        expression: serde_json::Value,
    ) -> Self {
        self.attributes.push(AttributeRule {
            attribute: attribute.into(),
            strength: MappingStrength::Normal,
            expression,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MappingSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub target_path: String,
    #[serde(default)]
    pub strength: MappingStrength,
    pub expression: serde_json::Value,
    /// Statically evaluated condition; `Some(false)` scopes the mapping out.
    #[serde(default)]
    pub condition: Option<bool>,
}

impl MappingSpec {
    #[must_use]
    pub fn new(target_path: impl Into<String>, expression: serde_json::Value) -> Self {
        Self {
            name: None,
            target_path: target_path.into(),
            strength: MappingStrength::Normal,
            expression,
            condition: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_condition(mut self, condition: bool) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct FocusMappingsSpec {
    pub mappings: Vec<MappingSpec>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Target of a grant edge; `embedded` carries an inlined object instead of a lookup.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TargetSpec {
    pub target_ref: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<Box<GovernedObject>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentContent {
    Target(TargetSpec),
    Construction(ConstructionSpec),
    FocusMappings(FocusMappingsSpec),
    #[default]
    Empty,
}

impl AssignmentContent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target(_) => "target",
            Self::Construction(_) => "construction",
            Self::FocusMappings(_) => "focus_mappings",
            Self::Empty => "empty",
        }
    }
}

/// One grant edge: a membership assignment on a subject or role, or an inducement on a role.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AssignmentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub owner: Option<ObjectRef>,
    #[serde(default)]
    pub definition: Option<ItemDefinition>,
    #[serde(default)]
    pub content: AssignmentContent,
    #[serde(default)]
    pub activation: Activation,
    /// Propagation order; only consulted when this assignment is an inducement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_type: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<ExtensionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AssignmentSpec {
    #[must_use]
    pub fn new(content: AssignmentContent) -> Self {
        Self {
            id: None,
            owner: None,
            definition: Some(ItemDefinition::assignment()),
            content,
            activation: Activation::default(),
            order: None,
            focus_type: None,
            extension: Vec::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn target(target_ref: ObjectRef) -> Self {
        Self::new(AssignmentContent::Target(TargetSpec { target_ref, embedded: None }))
    }

    #[must_use]
    pub fn embedded(object: GovernedObject, relation: Relation) -> Self {
        let target_ref = object.object_ref().with_relation(relation);
        Self::new(AssignmentContent::Target(TargetSpec {
            target_ref,
            embedded: Some(Box::new(object)),
        }))
    }

    #[must_use]
    pub fn construction(construction: ConstructionSpec) -> Self {
        Self::new(AssignmentContent::Construction(construction))
    }

    #[must_use]
    pub fn focus_mappings(mappings: Vec<MappingSpec>) -> Self {
        Self::new(AssignmentContent::FocusMappings(FocusMappingsSpec {
            mappings,
            description: None,
        }))
    }

    #[must_use]
    pub fn owned_by(mut self, owner: ObjectRef) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn for_focus_type(mut self, focus_type: ObjectType) -> Self {
        self.focus_type = Some(focus_type);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, item: ExtensionItem) -> Self {
        self.extension.push(item);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn effective_order(&self) -> u32 {
        self.order.unwrap_or(1)
    }

    #[must_use]
    pub fn target_spec(&self) -> Option<&TargetSpec> {
        match &self.content {
            AssignmentContent::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Check that the assignment is bound to `source` and every embedded item is defined.
    ///
    /// # Errors
    /// Returns [`KernelError::SchemaViolation`] when the owner back-reference or a
    /// definition is missing, or when the owner is not `source`.
    pub fn check_schema(&self, source: &ObjectRef) -> Result<(), KernelError> {
        let Some(owner) = &self.owner else {
            return Err(KernelError::SchemaViolation(format!(
                "assignment in {source} MUST carry an owner back-reference"
            )));
        };

        if owner.oid != source.oid {
            return Err(KernelError::SchemaViolation(format!(
                "assignment owner {owner} MUST match evaluated source {source}"
            )));
        }

        if self.definition.is_none() {
            return Err(KernelError::SchemaViolation(format!(
                "assignment in {source} MUST carry a definition"
            )));
        }

        for item in &self.extension {
            if item.definition.is_none() {
                return Err(KernelError::SchemaViolation(format!(
                    "extension item `{}` in assignment of {source} MUST carry a definition",
                    item.name
                )));
            }
        }

        Ok(())
    }
}
