use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    ActivationCalculator, AssignmentContent, AssignmentPath, AssignmentPathSegment,
    AssignmentSpec, ConstructionEvaluator, EvaluatedAssignment, FocusMappingEvaluator,
    GovernedObject, KernelError, ObjectRef, ObjectResolver, ObjectType,
    PassThroughConstructionEvaluator, PassThroughMappingEvaluator, PolicyViolationKind,
    Resolution, SegmentKind, WindowActivationCalculator,
};

/// External services the evaluator calls in-line during a traversal.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub resolver: &'a dyn ObjectResolver,
    pub constructions: &'a dyn ConstructionEvaluator,
    pub mappings: &'a dyn FocusMappingEvaluator,
    pub activation: &'a dyn ActivationCalculator,
}

impl<'a> Collaborators<'a> {
    /// Pair `resolver` with the pass-through evaluators and the window activation calculator.
    #[must_use]
    pub fn with_defaults(resolver: &'a dyn ObjectResolver) -> Self {
        Self {
            resolver,
            constructions: &PassThroughConstructionEvaluator,
            mappings: &PassThroughMappingEvaluator,
            activation: &WindowActivationCalculator,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct EvaluateOptions {
    /// Expand the root assignment's content even when it is not currently valid.
    pub validity_override: bool,
}

/// Per-call state; never outlives one [`AssignmentEvaluator::evaluate`] call.
struct Traversal<'t> {
    focus: &'t ObjectRef,
    path: AssignmentPath,
    evaluated: EvaluatedAssignment,
}

pub struct AssignmentEvaluator<'a> {
    collaborators: Collaborators<'a>,
    now: OffsetDateTime,
    max_path_length: Option<usize>,
}

impl<'a> AssignmentEvaluator<'a> {
    #[must_use]
    pub fn new(collaborators: Collaborators<'a>, now: OffsetDateTime) -> Self {
        Self { collaborators, now, max_path_length: None }
    }

    #[must_use]
    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = Some(max_path_length);
        self
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Evaluate one direct assignment of `source` and everything it reaches.
    ///
    /// # Errors
    /// Returns [`KernelError::SchemaViolation`] for malformed specifications,
    /// [`KernelError::PolicyViolation`] for self-references and cycles,
    /// [`KernelError::DepthLimitExceeded`] when a configured path bound is hit, and
    /// [`KernelError::Collaborator`] unchanged from construction or mapping evaluation.
    pub fn evaluate(
        &self,
        spec: &AssignmentSpec,
        source: &ObjectRef,
        options: EvaluateOptions,
    ) -> Result<EvaluatedAssignment, KernelError> {
        let mut traversal = Traversal {
            focus: source,
            path: AssignmentPath::new(),
            evaluated: EvaluatedAssignment::new(),
        };
        let root =
            AssignmentPathSegment::root(source.clone(), spec.clone(), options.validity_override);
        self.evaluate_segment(&mut traversal, root)?;
        Ok(traversal.evaluated)
    }

    fn evaluate_segment(
        &self,
        traversal: &mut Traversal<'_>,
        mut segment: AssignmentPathSegment,
    ) -> Result<(), KernelError> {
        segment.spec.check_schema(&segment.source)?;

        let target = self.resolve_target(traversal, &segment.spec);
        if let Some(target) = &target {
            guard_target(traversal, &segment, target)?;
            let relation = segment
                .spec
                .target_spec()
                .map(|spec| spec.target_ref.relation.clone())
                .unwrap_or_default();
            let target_ref = target.object_ref().with_relation(relation);
            traversal.evaluated.set_target_once(target_ref.clone());
            segment.target = Some(target_ref);
        }

        if let Some(max) = self.max_path_length {
            if traversal.path.len() >= max {
                return Err(KernelError::DepthLimitExceeded { max, path: traversal.path.render() });
            }
        }

        let valid = self.collaborators.activation.is_valid(&segment.spec, self.now);
        let expand = valid || segment.validity_override;
        if !valid {
            tracing::debug!(
                source = %segment.source,
                order = segment.evaluation_order,
                override_validity = segment.validity_override,
                "assignment is not valid at evaluation time"
            );
        }

        traversal.path.push(segment);
        let outcome =
            if expand { self.evaluate_content(traversal, target.as_ref()) } else { Ok(()) };
        traversal.path.pop();
        traversal.evaluated.valid = valid;
        outcome
    }

    fn resolve_target(
        &self,
        traversal: &mut Traversal<'_>,
        spec: &AssignmentSpec,
    ) -> Option<GovernedObject> {
        let target = spec.target_spec()?;
        if let Some(embedded) = &target.embedded {
            return Some(embedded.as_ref().clone());
        }

        let reference = &target.target_ref;
        match self.collaborators.resolver.resolve(reference.oid, reference.object_type) {
            Resolution::Found(object) => Some(object),
            Resolution::NotFound => {
                if traversal.evaluated.add_dangling_ref(reference.clone()) {
                    tracing::debug!(
                        oid = %reference.oid,
                        object_type = reference.object_type.as_str(),
                        path = %traversal.path.render(),
                        "target reference does not resolve; treating as no target"
                    );
                } else {
                    tracing::trace!(oid = %reference.oid, "dangling reference seen again");
                }
                None
            }
        }
    }

    fn evaluate_content(
        &self,
        traversal: &mut Traversal<'_>,
        target: Option<&GovernedObject>,
    ) -> Result<(), KernelError> {
        let Some(segment) = traversal.path.last() else {
            return Ok(());
        };

        if segment.evaluate_downstream {
            match &segment.spec.content {
                AssignmentContent::Construction(construction) => {
                    let snapshot = traversal.path.clone();
                    let evaluated = self.collaborators.constructions.evaluate(
                        construction,
                        snapshot,
                        &segment.source,
                    )?;
                    traversal.evaluated.add_construction(evaluated);
                    return Ok(());
                }
                AssignmentContent::FocusMappings(focus_mappings) => {
                    let variables = traversal.path.variables();
                    for mapping in &focus_mappings.mappings {
                        match self.collaborators.mappings.evaluate(
                            mapping,
                            &variables,
                            &segment.source,
                        )? {
                            Some(evaluated) => traversal.evaluated.add_focus_mapping(evaluated),
                            None => tracing::trace!(
                                target_path = %mapping.target_path,
                                "focus mapping not applicable"
                            ),
                        }
                    }
                    return Ok(());
                }
                AssignmentContent::Target(_) | AssignmentContent::Empty => {}
            }
        }

        match target {
            Some(target) if target.object_type.is_role_like() => self.expand_role(traversal, target),
            Some(target) => {
                tracing::debug!(
                    target_ref = %target.object_ref(),
                    "target is not a role, org or service; nothing to expand"
                );
                Ok(())
            }
            None => {
                tracing::debug!(
                    path = %traversal.path.render(),
                    "assignment has no applicable content or resolvable target"
                );
                Ok(())
            }
        }
    }

    fn expand_role(
        &self,
        traversal: &mut Traversal<'_>,
        role: &GovernedObject,
    ) -> Result<(), KernelError> {
        let Some(segment) = traversal.path.last() else {
            return Ok(());
        };

        let order = segment.evaluation_order;
        let role_ref = segment.target.clone().unwrap_or_else(|| role.object_ref());
        let order_one_object = if order == 1 {
            role_ref.clone()
        } else {
            segment.order_one_object.clone().unwrap_or_else(|| role_ref.clone())
        };
        let directly_assigned = order == 1 && segment.kind == SegmentKind::Assignment;
        let source = role.object_ref();
        let focus_type = traversal.focus.object_type;

        for inducement in &role.inducements {
            if inducement.focus_type.is_some_and(|applies_to| applies_to != focus_type) {
                tracing::trace!(
                    role = %source,
                    focus_type = focus_type.as_str(),
                    "inducement restricted to another focus type"
                );
                continue;
            }

            let inducement_order = inducement.effective_order();
            if inducement_order != order {
                tracing::trace!(
                    role = %source,
                    inducement_order,
                    order,
                    "inducement order does not match evaluation order"
                );
                continue;
            }

            self.evaluate_segment(
                traversal,
                AssignmentPathSegment::inducement(
                    source.clone(),
                    inducement.clone(),
                    order,
                    order_one_object.clone(),
                ),
            )?;
        }

        for assignment in &role.assignments {
            self.evaluate_segment(
                traversal,
                AssignmentPathSegment::membership(
                    source.clone(),
                    assignment.clone(),
                    order.saturating_add(1),
                    order_one_object.clone(),
                ),
            )?;
        }

        for authorization in &role.authorizations {
            traversal.evaluated.add_authorization(authorization.clone());
        }

        if role.object_type == ObjectType::Org && directly_assigned {
            let relation = role_ref.relation.clone();
            traversal.evaluated.add_org_ref(role_ref, relation);
        }

        Ok(())
    }
}

fn guard_target(
    traversal: &Traversal<'_>,
    segment: &AssignmentPathSegment,
    target: &GovernedObject,
) -> Result<(), KernelError> {
    let kind = if target.oid == segment.source.oid {
        PolicyViolationKind::SelfReference
    } else if traversal.path.contains_target(target.oid) {
        PolicyViolationKind::Cycle
    } else {
        return Ok(());
    };

    let mut offending = traversal.path.clone();
    let mut attempted = segment.clone();
    attempted.target = Some(target.object_ref());
    offending.push(attempted);
    let path = offending.render();

    tracing::warn!(
        kind = kind.as_str(),
        target_ref = %target.object_ref(),
        %path,
        "assignment policy violation"
    );
    Err(KernelError::PolicyViolation { kind, target: target.oid, path })
}
