use std::path::Path;

use anyhow::{anyhow, Context, Result};
use assignment_kernel_core::{
    ActivationCalculator, AssignmentEvaluator, AssignmentSpec, Collaborators,
    ConstructionEvaluator, EvaluatedAssignment, FocusMappingEvaluator, ObjectRef, Oid,
    PassThroughConstructionEvaluator, PassThroughMappingEvaluator, WindowActivationCalculator,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

mod catalog;
mod config;

pub use catalog::{CatalogDocument, ObjectCatalog};
pub use config::KernelConfig;

pub const API_CONTRACT_VERSION: &str = "assignment-api.v1";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.json` selects JSON; anything else is read as YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

pub(crate) fn load_document<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} {}", path.display()))?;
    match DocumentFormat::from_path(path) {
        DocumentFormat::Json => serde_json::from_str(&body)
            .with_context(|| format!("failed to parse JSON {what} {}", path.display())),
        DocumentFormat::Yaml => serde_yaml::from_str(&body)
            .with_context(|| format!("failed to parse YAML {what} {}", path.display())),
    }
}

/// Direct assignments of one subject, split by how they changed in the current wave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DirectAssignments {
    #[serde(default)]
    pub added: Vec<AssignmentSpec>,
    #[serde(default)]
    pub removed: Vec<AssignmentSpec>,
    #[serde(default)]
    pub retained: Vec<AssignmentSpec>,
}

impl DirectAssignments {
    #[must_use]
    pub fn retained(retained: Vec<AssignmentSpec>) -> Self {
        Self { retained, ..Self::default() }
    }
}

/// Evaluated assignments partitioned as plus (added), minus (removed) and zero (retained).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EvaluatedAssignmentTriple {
    pub plus: Vec<EvaluatedAssignment>,
    pub minus: Vec<EvaluatedAssignment>,
    pub zero: Vec<EvaluatedAssignment>,
}

impl EvaluatedAssignmentTriple {
    #[must_use]
    pub fn len(&self) -> usize {
        self.plus.len() + self.minus.len() + self.zero.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationReport {
    pub contract_version: String,
    pub subject: ObjectRef,
    #[serde(with = "time::serde::rfc3339")]
    pub evaluated_at: OffsetDateTime,
    pub triple: EvaluatedAssignmentTriple,
    pub fingerprint: String,
}

/// `sha256:<hex>` digest over the canonical JSON of `triple`.
///
/// # Errors
/// Returns an error when the triple cannot be serialized.
pub fn fingerprint(triple: &EvaluatedAssignmentTriple) -> Result<String> {
    let canonical = serde_json::to_vec(triple).context("failed to serialize evaluated triple")?;
    let mut hasher = Sha256::new();
    hasher.update(API_CONTRACT_VERSION.as_bytes());
    hasher.update(&canonical);
    let digest = hasher.finalize();
    Ok(format!("sha256:{digest:x}"))
}

pub struct AssignmentKernelApi {
    config: KernelConfig,
    catalog: ObjectCatalog,
    constructions: Box<dyn ConstructionEvaluator>,
    mappings: Box<dyn FocusMappingEvaluator>,
    activation: Box<dyn ActivationCalculator>,
}

impl AssignmentKernelApi {
    /// # Errors
    /// Returns an error when `config` fails validation.
    pub fn new(config: KernelConfig, catalog: ObjectCatalog) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            constructions: Box::new(PassThroughConstructionEvaluator),
            mappings: Box::new(PassThroughMappingEvaluator),
            activation: Box::new(WindowActivationCalculator),
        })
    }

    /// # Errors
    /// Returns an error when either file cannot be loaded.
    pub fn from_paths(
        config_path: impl AsRef<Path>,
        catalog_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let config = KernelConfig::from_path(config_path)?;
        let catalog = ObjectCatalog::from_path(catalog_path)?;
        Self::new(config, catalog)
    }

    #[must_use]
    pub fn with_construction_evaluator(
        mut self,
        evaluator: impl ConstructionEvaluator + 'static,
    ) -> Self {
        self.constructions = Box::new(evaluator);
        self
    }

    #[must_use]
    pub fn with_mapping_evaluator(
        mut self,
        evaluator: impl FocusMappingEvaluator + 'static,
    ) -> Self {
        self.mappings = Box::new(evaluator);
        self
    }

    #[must_use]
    pub fn with_activation_calculator(
        mut self,
        calculator: impl ActivationCalculator + 'static,
    ) -> Self {
        self.activation = Box::new(calculator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    fn evaluator(&self) -> AssignmentEvaluator<'_> {
        let collaborators = Collaborators {
            resolver: self.catalog.resolver(),
            constructions: self.constructions.as_ref(),
            mappings: self.mappings.as_ref(),
            activation: self.activation.as_ref(),
        };
        let evaluator =
            AssignmentEvaluator::new(collaborators, self.config.evaluation_time_or_now());
        match self.config.max_path_length {
            Some(max) => evaluator.with_max_path_length(max),
            None => evaluator,
        }
    }

    /// Evaluate a single direct assignment of `subject`.
    ///
    /// # Errors
    /// Returns the underlying [`assignment_kernel_core::KernelError`] on schema or
    /// policy violations and collaborator failures.
    pub fn evaluate_one(
        &self,
        subject: &ObjectRef,
        spec: &AssignmentSpec,
    ) -> Result<EvaluatedAssignment> {
        Ok(self.evaluator().evaluate(spec, subject, self.config.evaluate_options())?)
    }

    /// Evaluate every direct assignment of `subject` into a plus/minus/zero triple.
    ///
    /// # Errors
    /// Aborts on the first failing assignment with its
    /// [`assignment_kernel_core::KernelError`].
    pub fn evaluate_triple(
        &self,
        subject: &ObjectRef,
        direct: &DirectAssignments,
    ) -> Result<EvaluatedAssignmentTriple> {
        evaluate_triple_with(&self.evaluator(), &self.config, subject, direct)
    }

    /// Evaluate `direct` and wrap the triple in a fingerprinted report.
    ///
    /// # Errors
    /// Returns an error when evaluation or fingerprinting fails.
    pub fn report(
        &self,
        subject: &ObjectRef,
        direct: &DirectAssignments,
    ) -> Result<EvaluationReport> {
        let evaluator = self.evaluator();
        let triple = evaluate_triple_with(&evaluator, &self.config, subject, direct)?;
        let fingerprint = fingerprint(&triple)?;
        Ok(EvaluationReport {
            contract_version: API_CONTRACT_VERSION.to_string(),
            subject: subject.clone(),
            evaluated_at: evaluator.now(),
            triple,
            fingerprint,
        })
    }

    /// Report on a catalog subject, treating all of its own assignments as retained.
    ///
    /// # Errors
    /// Returns an error when the subject is not in the catalog or evaluation fails.
    pub fn evaluate_subject(&self, subject: Oid) -> Result<EvaluationReport> {
        let object = self
            .catalog
            .get(subject)
            .ok_or_else(|| anyhow!("subject not found in catalog: {subject}"))?;
        self.report(&object.object_ref(), &DirectAssignments::retained(object.assignments.clone()))
    }
}

fn evaluate_triple_with(
    evaluator: &AssignmentEvaluator<'_>,
    config: &KernelConfig,
    subject: &ObjectRef,
    direct: &DirectAssignments,
) -> Result<EvaluatedAssignmentTriple> {
    tracing::debug!(
        subject = %subject,
        added = direct.added.len(),
        removed = direct.removed.len(),
        retained = direct.retained.len(),
        "evaluating direct assignments"
    );

    let options = config.evaluate_options();
    let evaluate_all = |specs: &[AssignmentSpec]| -> Result<Vec<EvaluatedAssignment>> {
        specs
            .iter()
            .map(|spec| evaluator.evaluate(spec, subject, options).map_err(anyhow::Error::from))
            .collect()
    };

    Ok(EvaluatedAssignmentTriple {
        plus: evaluate_all(&direct.added)?,
        minus: evaluate_all(&direct.removed)?,
        zero: evaluate_all(&direct.retained)?,
    })
}

#[cfg(test)]
mod tests {
    use assignment_kernel_core::{
        Activation, AssignmentPath, Authorization, CollaboratorError, ConstructionSpec,
        EvaluatedConstruction, GovernedObject, KernelError, ObjectType, PolicyViolationKind,
        Relation,
    };
    use time::Duration;

    use super::*;

    fn fixture_oid(input: &str) -> Oid {
        match input.parse::<Oid>() {
            Ok(oid) => oid,
            Err(err) => panic!("invalid fixture ULID {input}: {err}"),
        }
    }

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_760_000_000)
    }

    fn fixed_config() -> KernelConfig {
        KernelConfig { evaluation_time: Some(fixture_time()), ..KernelConfig::default() }
    }

    fn account(intent: &str) -> AssignmentSpec {
        AssignmentSpec::construction(
            ConstructionSpec::account(fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N99"))
                .with_intent(intent),
        )
    }

    fn engineer() -> GovernedObject {
        GovernedObject::new(fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N02"), ObjectType::Role, "Engineer")
            .with_inducement(account("engineer"))
            .with_authorization(Authorization::allow(["read"]))
    }

    fn sales() -> GovernedObject {
        GovernedObject::new(fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N03"), ObjectType::Org, "Sales")
    }

    fn subject() -> GovernedObject {
        GovernedObject::new(fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N01"), ObjectType::User, "jdoe")
            .with_assignment(AssignmentSpec::target(engineer().object_ref()))
            .with_assignment(AssignmentSpec::target(
                sales().object_ref().with_relation(Relation::Manager),
            ))
    }

    fn api_with(config: KernelConfig, objects: Vec<GovernedObject>) -> AssignmentKernelApi {
        let catalog = match ObjectCatalog::from_objects(objects) {
            Ok(catalog) => catalog,
            Err(err) => panic!("fixture catalog should load: {err}"),
        };
        match AssignmentKernelApi::new(config, catalog) {
            Ok(api) => api,
            Err(err) => panic!("fixture api should build: {err}"),
        }
    }

    fn fixture_api() -> AssignmentKernelApi {
        api_with(fixed_config(), vec![subject(), engineer(), sales()])
    }

    fn owned(spec: AssignmentSpec) -> AssignmentSpec {
        spec.owned_by(subject().object_ref())
    }

    #[test]
    fn evaluate_subject_reports_retained_assignments() -> Result<()> {
        let api = fixture_api();

        let report = api.evaluate_subject(subject().oid)?;

        assert_eq!(report.contract_version, API_CONTRACT_VERSION);
        assert_eq!(report.evaluated_at, fixture_time());
        assert!(report.triple.plus.is_empty());
        assert!(report.triple.minus.is_empty());
        assert_eq!(report.triple.zero.len(), 2);
        assert_eq!(report.triple.zero[0].constructions.len(), 1);
        assert!(report.triple.zero[1].has_org(sales().oid));
        assert!(report.fingerprint.starts_with("sha256:"));
        assert_eq!(report.fingerprint.len(), "sha256:".len() + 64);
        Ok(())
    }

    #[test]
    fn unknown_subject_is_an_error() {
        let api = fixture_api();
        let missing = fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N50");

        let Err(err) = api.evaluate_subject(missing) else {
            panic!("unknown subject should fail");
        };
        assert!(err.to_string().contains("subject not found"), "{err}");
    }

    #[test]
    fn triple_keeps_added_removed_and_retained_apart() -> Result<()> {
        let api = fixture_api();
        let direct = DirectAssignments {
            added: vec![owned(AssignmentSpec::target(engineer().object_ref()))],
            removed: vec![owned(AssignmentSpec::target(sales().object_ref()))],
            retained: vec![owned(account("direct"))],
        };

        let triple = api.evaluate_triple(&subject().object_ref(), &direct)?;

        assert_eq!(triple.len(), 3);
        assert_eq!(triple.plus[0].target.as_ref().map(|target| target.oid), Some(engineer().oid));
        assert_eq!(triple.minus[0].target.as_ref().map(|target| target.oid), Some(sales().oid));
        assert_eq!(triple.zero[0].target, None);
        assert_eq!(triple.zero[0].constructions[0].intent.as_deref(), Some("direct"));
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() -> Result<()> {
        let api = fixture_api();
        let first = api.evaluate_subject(subject().oid)?;
        let second = api.evaluate_subject(subject().oid)?;
        assert_eq!(first.fingerprint, second.fingerprint);

        let mut changed = first.triple.clone();
        changed.zero.pop();
        assert_ne!(fingerprint(&changed)?, first.fingerprint);
        assert_eq!(fingerprint(&first.triple)?, first.fingerprint);
        Ok(())
    }

    #[test]
    fn policy_violations_surface_as_kernel_errors() {
        let looped = GovernedObject::new(
            fixture_oid("01J0T2CD3E4F5G6H7J8K9M0N04"),
            ObjectType::Role,
            "Looped",
        );
        let looped = looped.clone().with_inducement(AssignmentSpec::target(looped.object_ref()));
        let api = api_with(fixed_config(), vec![subject(), looped.clone()]);

        let result = api.evaluate_triple(
            &subject().object_ref(),
            &DirectAssignments::retained(vec![owned(AssignmentSpec::target(looped.object_ref()))]),
        );

        let Err(err) = result else {
            panic!("self-inducement should fail");
        };
        assert!(matches!(
            err.downcast_ref::<KernelError>(),
            Some(KernelError::PolicyViolation { kind: PolicyViolationKind::SelfReference, .. })
        ));
    }

    #[test]
    fn validity_override_follows_config() -> Result<()> {
        let expired = owned(
            AssignmentSpec::target(engineer().object_ref())
                .with_activation(Activation::window(None, Some(fixture_time()))),
        );

        let overriding = fixture_api().evaluate_one(&subject().object_ref(), &expired)?;
        assert!(!overriding.valid);
        assert_eq!(overriding.constructions.len(), 1);

        let strict = api_with(
            KernelConfig { validity_override: false, ..fixed_config() },
            vec![subject(), engineer(), sales()],
        );
        let gated = strict.evaluate_one(&subject().object_ref(), &expired)?;
        assert!(!gated.valid);
        assert!(gated.is_empty_content());
        Ok(())
    }

    #[test]
    fn max_path_length_from_config_bounds_traversal() {
        let api = api_with(
            KernelConfig { max_path_length: Some(1), ..fixed_config() },
            vec![subject(), engineer(), sales()],
        );

        let spec = owned(AssignmentSpec::target(engineer().object_ref()));

        let result = api.evaluate_one(&subject().object_ref(), &spec);

        let Err(err) = result else {
            panic!("depth bound should be hit");
        };
        assert!(matches!(
            err.downcast_ref::<KernelError>(),
            Some(KernelError::DepthLimitExceeded { max: 1, .. })
        ));
    }

    #[test]
    fn zero_max_path_length_is_rejected_at_construction() {
        let config = KernelConfig { max_path_length: Some(0), ..KernelConfig::default() };
        assert!(AssignmentKernelApi::new(config, ObjectCatalog::default()).is_err());
    }

    struct TaggingConstructions;

    impl ConstructionEvaluator for TaggingConstructions {
        fn evaluate(
            &self,
            construction: &ConstructionSpec,
            path: AssignmentPath,
            source: &ObjectRef,
        ) -> Result<EvaluatedConstruction, CollaboratorError> {
            Ok(EvaluatedConstruction {
                resource_ref: construction.resource_ref,
                kind: construction.kind,
                intent: Some(format!("tagged:{}", path.len())),
                source: source.clone(),
                path,
                attributes: Vec::new(),
            })
        }
    }

    #[test]
    fn custom_construction_evaluator_is_used() -> Result<()> {
        let api = fixture_api().with_construction_evaluator(TaggingConstructions);

        let evaluated = api.evaluate_one(
            &subject().object_ref(),
            &owned(AssignmentSpec::target(engineer().object_ref())),
        )?;

        assert_eq!(evaluated.constructions[0].intent.as_deref(), Some("tagged:2"));
        Ok(())
    }

    #[test]
    fn document_format_follows_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("catalog.JSON")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("catalog.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("catalog")), DocumentFormat::Yaml);
    }
}
