use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

mod adapters;
mod collaborators;
mod evaluated;
mod evaluator;
mod path;
mod spec;

pub use adapters::{
    InMemoryObjectResolver, PassThroughConstructionEvaluator, PassThroughMappingEvaluator,
    WindowActivationCalculator,
};
pub use collaborators::{
    ActivationCalculator, CollaboratorError, ConstructionEvaluator, FocusMappingEvaluator,
    ObjectResolver, Resolution,
};
pub use evaluated::{EvaluatedAssignment, EvaluatedConstruction, EvaluatedMapping, OrgRef};
pub use evaluator::{AssignmentEvaluator, Collaborators, EvaluateOptions};
pub use path::{AssignmentPath, AssignmentPathSegment, AssignmentPathVariables, SegmentKind};
pub use spec::{
    Activation, AdministrativeStatus, AssignmentContent, AssignmentSpec, AttributeRule,
    ConstructionSpec, ExtensionItem, FocusMappingsSpec, ItemDefinition, MappingSpec,
    MappingStrength, ShadowKind, TargetSpec, ASSIGNMENT_DEFINITION, INDUCEMENT_DEFINITION,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("policy violation ({kind}) on {target}: {path}")]
    PolicyViolation { kind: PolicyViolationKind, target: Oid, path: String },
    #[error("assignment path exceeded {max} segments: {path}")]
    DepthLimitExceeded { max: usize, path: String },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl KernelError {
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. })
    }

    #[must_use]
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation(_))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolationKind {
    SelfReference,
    Cycle,
}

impl PolicyViolationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfReference => "self-reference",
            Self::Cycle => "cycle",
        }
    }
}

impl Display for PolicyViolationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object identifier shared by subjects, roles, orgs, services and resources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Oid(pub Ulid);

impl Oid {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Oid {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Oid {
    type Err = ulid::DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(value).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    User,
    Role,
    Org,
    Service,
}

impl ObjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Role => "role",
            Self::Org => "org",
            Self::Service => "service",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "role" => Some(Self::Role),
            "org" => Some(Self::Org),
            "service" => Some(Self::Service),
            _ => None,
        }
    }

    /// Types whose inducements, assignments and authorizations are expanded.
    #[must_use]
    pub fn is_role_like(self) -> bool {
        matches!(self, Self::Role | Self::Org | Self::Service)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    #[default]
    Member,
    Manager,
    Approver,
    Owner,
    Custom(String),
}

impl Relation {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Approver => "approver",
            Self::Owner => "owner",
            Self::Custom(label) => label.as_str(),
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "member" => Self::Member,
            "manager" => Self::Manager,
            "approver" => Self::Approver,
            "owner" => Self::Owner,
            other => Self::Custom(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct ObjectRef {
    pub oid: Oid,
    pub object_type: ObjectType,
    #[serde(default)]
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ObjectRef {
    #[must_use]
    pub fn new(oid: Oid, object_type: ObjectType) -> Self {
        Self { oid, object_type, relation: Relation::Member, name: None }
    }

    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{name}", self.object_type.as_str()),
            None => write!(f, "{}:{}", self.object_type.as_str(), self.oid),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationPhase {
    Request,
    Execution,
}

/// Authorization statement declared on a role; collected verbatim, never decided here.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Authorization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub decision: AuthorizationDecision,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<AuthorizationPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Authorization {
    #[must_use]
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            decision: AuthorizationDecision::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            phase: None,
            description: None,
        }
    }

    #[must_use]
    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { decision: AuthorizationDecision::Deny, ..Self::allow(actions) }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Resolved form of a subject, role, org or service as returned by an [`ObjectResolver`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GovernedObject {
    pub oid: Oid,
    pub object_type: ObjectType,
    pub name: String,
    #[serde(default)]
    pub assignments: Vec<AssignmentSpec>,
    #[serde(default)]
    pub inducements: Vec<AssignmentSpec>,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
}

impl GovernedObject {
    #[must_use]
    pub fn new(oid: Oid, object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            oid,
            object_type,
            name: name.into(),
            assignments: Vec::new(),
            inducements: Vec::new(),
            authorizations: Vec::new(),
        }
    }

    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.oid, self.object_type).with_name(self.name.clone())
    }

    /// Attach a membership assignment, taking ownership of its back-reference.
    #[must_use]
    pub fn with_assignment(mut self, spec: AssignmentSpec) -> Self {
        let owner = self.object_ref();
        self.assignments.push(spec.owned_by(owner));
        self
    }

    /// Attach an inducement, taking ownership of its back-reference.
    #[must_use]
    pub fn with_inducement(mut self, spec: AssignmentSpec) -> Self {
        let owner = self.object_ref();
        let mut spec = spec.owned_by(owner);
        spec.definition = Some(ItemDefinition::inducement());
        self.inducements.push(spec);
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorizations.push(authorization);
        self
    }

    /// Fill in owner back-references and definitions that a parsed snapshot left empty.
    ///
    /// Values already present are kept, so an owner pointing elsewhere is still
    /// reported by the schema check during evaluation.
    pub fn adopt_specifications(&mut self) {
        let owner = self.object_ref();
        for spec in &mut self.assignments {
            spec.owner.get_or_insert_with(|| owner.clone());
            spec.definition.get_or_insert_with(ItemDefinition::assignment);
            adopt_embedded(spec);
        }
        for spec in &mut self.inducements {
            spec.owner.get_or_insert_with(|| owner.clone());
            spec.definition.get_or_insert_with(ItemDefinition::inducement);
            adopt_embedded(spec);
        }
    }
}

fn adopt_embedded(spec: &mut AssignmentSpec) {
    if let AssignmentContent::Target(TargetSpec { embedded: Some(object), .. }) =
        &mut spec.content
    {
        object.adopt_specifications();
    }
}
