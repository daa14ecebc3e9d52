use serde::{Deserialize, Serialize};

use crate::{
    AssignmentPath, AttributeRule, Authorization, ObjectRef, Oid, Relation, ShadowKind,
};

/// Construction produced by a [`crate::ConstructionEvaluator`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvaluatedConstruction {
    pub resource_ref: Oid,
    pub kind: ShadowKind,
    pub intent: Option<String>,
    pub source: ObjectRef,
    /// Frozen copy of the path at the frame that fired the construction.
    pub path: AssignmentPath,
    #[serde(default)]
    pub attributes: Vec<AttributeRule>,
}

/// Mapping output produced by a [`crate::FocusMappingEvaluator`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvaluatedMapping {
    pub name: Option<String>,
    pub target_path: String,
    pub source: ObjectRef,
    #[serde(default)]
    pub order_one_object: Option<ObjectRef>,
    #[serde(default)]
    pub outputs: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrgRef {
    pub org: ObjectRef,
    pub relation: Relation,
}

/// Accumulated consequences of one direct assignment.
///
/// Collections only grow during a traversal; `target` is taken from the first
/// frame that resolves one.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EvaluatedAssignment {
    pub target: Option<ObjectRef>,
    pub constructions: Vec<EvaluatedConstruction>,
    pub focus_mappings: Vec<EvaluatedMapping>,
    pub authorizations: Vec<Authorization>,
    pub org_refs: Vec<OrgRef>,
    pub valid: bool,
    #[serde(default)]
    pub dangling_refs: Vec<ObjectRef>,
}

impl Default for EvaluatedAssignment {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatedAssignment {
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: None,
            constructions: Vec::new(),
            focus_mappings: Vec::new(),
            authorizations: Vec::new(),
            org_refs: Vec::new(),
            valid: true,
            dangling_refs: Vec::new(),
        }
    }

    pub fn set_target_once(&mut self, target: ObjectRef) {
        if self.target.is_none() {
            self.target = Some(target);
        }
    }

    pub fn add_construction(&mut self, construction: EvaluatedConstruction) {
        self.constructions.push(construction);
    }

    pub fn add_focus_mapping(&mut self, mapping: EvaluatedMapping) {
        self.focus_mappings.push(mapping);
    }

    pub fn add_authorization(&mut self, authorization: Authorization) {
        self.authorizations.push(authorization);
    }

    pub fn add_org_ref(&mut self, org: ObjectRef, relation: Relation) {
        self.org_refs.push(OrgRef { org, relation });
    }

    /// Record an unresolvable reference; returns `false` when it was already recorded.
    pub fn add_dangling_ref(&mut self, reference: ObjectRef) -> bool {
        if self.dangling_refs.iter().any(|known| known.oid == reference.oid) {
            return false;
        }
        self.dangling_refs.push(reference);
        true
    }

    #[must_use]
    pub fn is_empty_content(&self) -> bool {
        self.constructions.is_empty()
            && self.focus_mappings.is_empty()
            && self.authorizations.is_empty()
            && self.org_refs.is_empty()
    }

    #[must_use]
    pub fn has_org(&self, oid: Oid) -> bool {
        self.org_refs.iter().any(|org_ref| org_ref.org.oid == oid)
    }
}
