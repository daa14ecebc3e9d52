//! In-process collaborator implementations.
//!
//! These back the api crate's defaults and double as test fixtures for the
//! evaluator. Production deployments plug in their own repository and
//! expression engines through the traits in [`crate::ObjectResolver`] and
//! friends.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::{
    ActivationCalculator, AdministrativeStatus, AssignmentPath, AssignmentPathVariables,
    AssignmentSpec, CollaboratorError, ConstructionEvaluator, ConstructionSpec,
    EvaluatedConstruction, EvaluatedMapping, FocusMappingEvaluator, GovernedObject, MappingSpec,
    ObjectRef, ObjectResolver, ObjectType, Oid, Resolution,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectResolver {
    objects: BTreeMap<Oid, GovernedObject>,
}

impl InMemoryObjectResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object, returning the previous one with the same oid.
    pub fn insert(&mut self, object: GovernedObject) -> Option<GovernedObject> {
        self.objects.insert(object.oid, object)
    }

    #[must_use]
    pub fn with_object(mut self, object: GovernedObject) -> Self {
        self.insert(object);
        self
    }

    #[must_use]
    pub fn get(&self, oid: Oid) -> Option<&GovernedObject> {
        self.objects.get(&oid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<GovernedObject> for InMemoryObjectResolver {
    fn from_iter<I: IntoIterator<Item = GovernedObject>>(iter: I) -> Self {
        Self { objects: iter.into_iter().map(|object| (object.oid, object)).collect() }
    }
}

impl ObjectResolver for InMemoryObjectResolver {
    fn resolve(&self, oid: Oid, expected_type: ObjectType) -> Resolution {
        match self.objects.get(&oid) {
            Some(object) if object.object_type == expected_type => {
                Resolution::Found(object.clone())
            }
            Some(object) => {
                tracing::trace!(
                    %oid,
                    expected = expected_type.as_str(),
                    actual = object.object_type.as_str(),
                    "object type mismatch treated as not found"
                );
                Resolution::NotFound
            }
            None => Resolution::NotFound,
        }
    }
}

/// Administrative status wins over the validity window when it is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowActivationCalculator;

impl ActivationCalculator for WindowActivationCalculator {
    fn is_valid(&self, spec: &AssignmentSpec, now: OffsetDateTime) -> bool {
        let activation = &spec.activation;
        match activation.administrative_status {
            Some(AdministrativeStatus::Enabled) => return true,
            Some(AdministrativeStatus::Disabled | AdministrativeStatus::Archived) => return false,
            None => {}
        }

        if activation.valid_from.is_some_and(|valid_from| now < valid_from) {
            return false;
        }

        if activation.valid_to.is_some_and(|valid_to| valid_to <= now) {
            return false;
        }

        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughConstructionEvaluator;

impl ConstructionEvaluator for PassThroughConstructionEvaluator {
    fn evaluate(
        &self,
        construction: &ConstructionSpec,
        path: AssignmentPath,
        source: &ObjectRef,
    ) -> Result<EvaluatedConstruction, CollaboratorError> {
        Ok(EvaluatedConstruction {
            resource_ref: construction.resource_ref,
            kind: construction.kind,
            intent: construction.intent.clone(),
            source: source.clone(),
            path,
            attributes: construction.attributes.clone(),
        })
    }
}

/// Echoes each mapping's expression as its single output value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughMappingEvaluator;

impl FocusMappingEvaluator for PassThroughMappingEvaluator {
    fn evaluate(
        &self,
        mapping: &MappingSpec,
        variables: &AssignmentPathVariables,
        source: &ObjectRef,
    ) -> Result<Option<EvaluatedMapping>, CollaboratorError> {
        if mapping.condition == Some(false) {
            return Ok(None);
        }

        Ok(Some(EvaluatedMapping {
            name: mapping.name.clone(),
            target_path: mapping.target_path.clone(),
            source: source.clone(),
            order_one_object: variables.order_one_object.clone(),
            outputs: vec![mapping.expression.clone()],
        }))
    }
}
