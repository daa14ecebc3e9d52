use time::OffsetDateTime;

use crate::{
    AssignmentPath, AssignmentPathVariables, AssignmentSpec, ConstructionSpec,
    EvaluatedConstruction, EvaluatedMapping, GovernedObject, MappingSpec, ObjectRef, ObjectType,
    Oid,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CollaboratorError {
    #[error("construction evaluation failed: {0}")]
    Construction(String),
    #[error("focus mapping evaluation failed: {0}")]
    Mapping(String),
}

/// Outcome of an object lookup. A missing object is a value, not an error.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Resolution {
    Found(GovernedObject),
    NotFound,
}

pub trait ObjectResolver: Send + Sync {
    fn resolve(&self, oid: Oid, expected_type: ObjectType) -> Resolution;
}

pub trait ConstructionEvaluator: Send + Sync {
    /// `path` is a snapshot the evaluator may keep after the frame is popped.
    ///
    /// # Errors
    /// Returns [`CollaboratorError`] when the construction cannot be evaluated.
    fn evaluate(
        &self,
        construction: &ConstructionSpec,
        path: AssignmentPath,
        source: &ObjectRef,
    ) -> Result<EvaluatedConstruction, CollaboratorError>;
}

pub trait FocusMappingEvaluator: Send + Sync {
    /// Returns `Ok(None)` when the mapping does not apply.
    ///
    /// # Errors
    /// Returns [`CollaboratorError`] when the mapping cannot be evaluated.
    fn evaluate(
        &self,
        mapping: &MappingSpec,
        variables: &AssignmentPathVariables,
        source: &ObjectRef,
    ) -> Result<Option<EvaluatedMapping>, CollaboratorError>;
}

pub trait ActivationCalculator: Send + Sync {
    fn is_valid(&self, spec: &AssignmentSpec, now: OffsetDateTime) -> bool;
}
