use serde::{Deserialize, Serialize};

use crate::{AssignmentSpec, ObjectRef, Oid};

/// Edge kind that produced a path segment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Assignment,
    Inducement,
}

impl SegmentKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Inducement => "inducement",
        }
    }
}

/// One open recursion frame of an evaluation.
///
/// `evaluation_order` counts the membership edges crossed since the root;
/// inducement edges keep the order of the frame that declared them.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AssignmentPathSegment {
    pub kind: SegmentKind,
    pub source: ObjectRef,
    pub spec: AssignmentSpec,
    pub evaluation_order: u32,
    pub evaluate_downstream: bool,
    pub validity_override: bool,
    #[serde(default)]
    pub target: Option<ObjectRef>,
    #[serde(default)]
    pub order_one_object: Option<ObjectRef>,
}

impl AssignmentPathSegment {
    /// Frame for a direct assignment of the subject.
    #[must_use]
    pub fn root(source: ObjectRef, spec: AssignmentSpec, validity_override: bool) -> Self {
        Self {
            kind: SegmentKind::Assignment,
            source,
            spec,
            evaluation_order: 1,
            evaluate_downstream: true,
            validity_override,
            target: None,
            order_one_object: None,
        }
    }

    /// Frame for an inducement whose order matched `evaluation_order`.
    #[must_use]
    pub fn inducement(
        source: ObjectRef,
        spec: AssignmentSpec,
        evaluation_order: u32,
        order_one_object: ObjectRef,
    ) -> Self {
        Self {
            kind: SegmentKind::Inducement,
            source,
            spec,
            evaluation_order,
            evaluate_downstream: true,
            validity_override: false,
            target: None,
            order_one_object: Some(order_one_object),
        }
    }

    /// Frame for a role's own membership assignment; never fires content directly.
    #[must_use]
    pub fn membership(
        source: ObjectRef,
        spec: AssignmentSpec,
        evaluation_order: u32,
        order_one_object: ObjectRef,
    ) -> Self {
        Self {
            kind: SegmentKind::Assignment,
            source,
            spec,
            evaluation_order,
            evaluate_downstream: false,
            validity_override: false,
            target: None,
            order_one_object: Some(order_one_object),
        }
    }
}

/// Variables handed to the focus mapping evaluator for the current frame.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct AssignmentPathVariables {
    pub focus_assignment: Option<AssignmentSpec>,
    pub this_assignment: Option<AssignmentSpec>,
    pub immediate_role: Option<ObjectRef>,
    pub order_one_object: Option<ObjectRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(transparent)]
pub struct AssignmentPath {
    segments: Vec<AssignmentPathSegment>,
}

impl AssignmentPath {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: AssignmentPathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<AssignmentPathSegment> {
        self.segments.pop()
    }

    #[must_use]
    pub fn contains_target(&self, oid: Oid) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.target.as_ref().is_some_and(|target| target.oid == oid))
    }

    #[must_use]
    pub fn current_order(&self) -> u32 {
        self.segments.last().map_or(1, |segment| segment.evaluation_order)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&AssignmentPathSegment> {
        self.segments.first()
    }

    #[must_use]
    pub fn last(&self) -> Option<&AssignmentPathSegment> {
        self.segments.last()
    }

    #[must_use]
    pub fn segments(&self) -> &[AssignmentPathSegment] {
        &self.segments
    }

    /// Render the chain as `source -> target -> ...` for diagnostics.
    #[must_use]
    pub fn render(&self) -> String {
        let Some(first) = self.segments.first() else {
            return "(empty path)".to_string();
        };

        let mut rendered = first.source.to_string();
        for segment in &self.segments {
            let arrow = match segment.kind {
                SegmentKind::Assignment => " -> ",
                SegmentKind::Inducement => " => ",
            };
            rendered.push_str(arrow);
            match &segment.target {
                Some(target) => rendered.push_str(&target.to_string()),
                None => rendered.push_str(segment.spec.content.as_str()),
            }
        }
        rendered
    }

    #[must_use]
    pub fn variables(&self) -> AssignmentPathVariables {
        let Some(current) = self.segments.last() else {
            return AssignmentPathVariables::default();
        };

        AssignmentPathVariables {
            focus_assignment: self.segments.first().map(|segment| segment.spec.clone()),
            this_assignment: Some(current.spec.clone()),
            immediate_role: current
                .source
                .object_type
                .is_role_like()
                .then(|| current.source.clone()),
            order_one_object: current.order_one_object.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConstructionSpec, ObjectType};

    fn fixture_oid(input: &str) -> Oid {
        match input.parse::<Oid>() {
            Ok(oid) => oid,
            Err(err) => panic!("invalid fixture ULID {input}: {err}"),
        }
    }

    fn user() -> ObjectRef {
        ObjectRef::new(fixture_oid("01J0S2AB9E0P8N7M6K5J4H3G21"), ObjectType::User).with_name("jdoe")
    }

    fn role(input: &str, name: &str) -> ObjectRef {
        ObjectRef::new(fixture_oid(input), ObjectType::Role).with_name(name)
    }

    fn targeted(mut segment: AssignmentPathSegment, target: ObjectRef) -> AssignmentPathSegment {
        segment.target = Some(target);
        segment
    }

    #[test]
    fn empty_path_reports_order_one() {
        let path = AssignmentPath::new();
        assert_eq!(path.current_order(), 1);
        assert!(path.is_empty());
        assert_eq!(path.variables(), AssignmentPathVariables::default());
        assert_eq!(path.render(), "(empty path)");
    }

    #[test]
    fn push_pop_tracks_current_order_and_targets() {
        let engineer = role("01J0S2AB9E0P8N7M6K5J4H3G22", "Engineer");
        let employee = role("01J0S2AB9E0P8N7M6K5J4H3G23", "Employee");
        let mut path = AssignmentPath::new();

        path.push(targeted(
            AssignmentPathSegment::root(user(), AssignmentSpec::target(engineer.clone()), true),
            engineer.clone(),
        ));
        path.push(targeted(
            AssignmentPathSegment::membership(
                engineer.clone(),
                AssignmentSpec::target(employee.clone()),
                2,
                engineer.clone(),
            ),
            employee.clone(),
        ));

        assert_eq!(path.len(), 2);
        assert_eq!(path.current_order(), 2);
        assert!(path.contains_target(engineer.oid));
        assert!(path.contains_target(employee.oid));
        assert!(!path.contains_target(user().oid));

        let popped = path.pop();
        assert_eq!(popped.and_then(|segment| segment.target), Some(employee.clone()));
        assert_eq!(path.current_order(), 1);
        assert!(!path.contains_target(employee.oid));
    }

    #[test]
    fn render_distinguishes_assignment_and_inducement_edges() {
        let engineer = role("01J0S2AB9E0P8N7M6K5J4H3G24", "Engineer");
        let mut path = AssignmentPath::new();
        path.push(targeted(
            AssignmentPathSegment::root(user(), AssignmentSpec::target(engineer.clone()), false),
            engineer.clone(),
        ));
        path.push(AssignmentPathSegment::inducement(
            engineer.clone(),
            AssignmentSpec::construction(ConstructionSpec::account(fixture_oid(
                "01J0S2AB9E0P8N7M6K5J4H3G25",
            ))),
            1,
            engineer,
        ));

        assert_eq!(path.render(), "user:jdoe -> role:Engineer => construction");
    }

    #[test]
    fn variables_expose_root_and_current_frames() {
        let engineer = role("01J0S2AB9E0P8N7M6K5J4H3G26", "Engineer");
        let root_spec = AssignmentSpec::target(engineer.clone());
        let inducement = AssignmentSpec::construction(ConstructionSpec::account(fixture_oid(
            "01J0S2AB9E0P8N7M6K5J4H3G27",
        )));
        let mut path = AssignmentPath::new();
        path.push(targeted(
            AssignmentPathSegment::root(user(), root_spec.clone(), false),
            engineer.clone(),
        ));
        path.push(AssignmentPathSegment::inducement(
            engineer.clone(),
            inducement.clone(),
            1,
            engineer.clone(),
        ));

        let variables = path.variables();
        assert_eq!(variables.focus_assignment, Some(root_spec));
        assert_eq!(variables.this_assignment, Some(inducement));
        assert_eq!(variables.immediate_role, Some(engineer.clone()));
        assert_eq!(variables.order_one_object, Some(engineer));
    }

    #[test]
    fn cloned_path_is_frozen_against_later_pops() {
        let engineer = role("01J0S2AB9E0P8N7M6K5J4H3G28", "Engineer");
        let mut path = AssignmentPath::new();
        path.push(targeted(
            AssignmentPathSegment::root(user(), AssignmentSpec::target(engineer.clone()), false),
            engineer,
        ));

        let snapshot = path.clone();
        path.pop();

        assert!(path.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
