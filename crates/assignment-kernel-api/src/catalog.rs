use std::path::Path;

use anyhow::{bail, Context, Result};
use assignment_kernel_core::{GovernedObject, InMemoryObjectResolver, Oid};
use serde::{Deserialize, Serialize};

use crate::load_document;

/// On-disk layout of a catalog snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    #[serde(default)]
    pub objects: Vec<GovernedObject>,
}

/// Snapshot of governed objects backing object resolution for one api instance.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    resolver: InMemoryObjectResolver,
}

impl ObjectCatalog {
    /// Build a catalog, filling in owner back-references and definitions the
    /// objects' own specifications leave empty.
    ///
    /// # Errors
    /// Returns an error when two objects share an oid.
    pub fn from_objects(objects: impl IntoIterator<Item = GovernedObject>) -> Result<Self> {
        let mut resolver = InMemoryObjectResolver::new();
        for mut object in objects {
            object.adopt_specifications();
            let oid = object.oid;
            if let Some(previous) = resolver.insert(object) {
                bail!("duplicate object oid {oid} in catalog (first defined as `{}`)", previous.name);
            }
        }
        tracing::debug!(objects = resolver.len(), "object catalog loaded");
        Ok(Self { resolver })
    }

    /// # Errors
    /// Returns an error when the document does not parse or repeats an oid.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let document: CatalogDocument =
            serde_yaml::from_str(input).context("failed to parse YAML object catalog")?;
        Self::from_objects(document.objects)
    }

    /// # Errors
    /// Returns an error when the document does not parse or repeats an oid.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let document: CatalogDocument =
            serde_json::from_str(input).context("failed to parse JSON object catalog")?;
        Self::from_objects(document.objects)
    }

    /// Load a `.json`, `.yaml` or `.yml` snapshot.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or repeats an oid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document: CatalogDocument = load_document(path, "object catalog")?;
        Self::from_objects(document.objects)
            .with_context(|| format!("invalid object catalog {}", path.display()))
    }

    #[must_use]
    pub fn get(&self, oid: Oid) -> Option<&GovernedObject> {
        self.resolver.get(oid)
    }

    #[must_use]
    pub fn resolver(&self) -> &InMemoryObjectResolver {
        &self.resolver
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assignment_kernel_core::{AssignmentContent, ObjectType, INDUCEMENT_DEFINITION};

    use super::*;

    const CATALOG_YAML: &str = r#"
objects:
  - oid: "01J0T1AB2C3D4E5F6G7H8J9K01"
    object_type: role
    name: Engineer
    inducements:
      - content:
          kind: construction
          resource_ref: "01J0T1AB2C3D4E5F6G7H8J9K99"
          intent: default
    authorizations:
      - decision: allow
        actions: [read]
  - oid: "01J0T1AB2C3D4E5F6G7H8J9K02"
    object_type: org
    name: Sales
"#;

    fn fixture_oid(input: &str) -> Oid {
        match input.parse::<Oid>() {
            Ok(oid) => oid,
            Err(err) => panic!("invalid fixture ULID {input}: {err}"),
        }
    }

    #[test]
    fn yaml_catalog_adopts_owner_and_definition() -> Result<()> {
        let catalog = ObjectCatalog::from_yaml_str(CATALOG_YAML)?;
        assert_eq!(catalog.len(), 2);

        let Some(engineer) = catalog.get(fixture_oid("01J0T1AB2C3D4E5F6G7H8J9K01")) else {
            panic!("engineer should be in the catalog");
        };
        assert_eq!(engineer.object_type, ObjectType::Role);
        let inducement = &engineer.inducements[0];
        assert_eq!(inducement.owner.as_ref().map(|owner| owner.oid), Some(engineer.oid));
        assert_eq!(
            inducement.definition.as_ref().map(|definition| definition.type_name.as_str()),
            Some(INDUCEMENT_DEFINITION)
        );
        assert!(matches!(inducement.content, AssignmentContent::Construction(_)));
        Ok(())
    }

    #[test]
    fn embedded_targets_adopt_their_own_specifications() -> Result<()> {
        let catalog = ObjectCatalog::from_yaml_str(
            r#"
objects:
  - oid: "01J0T1AB2C3D4E5F6G7H8J9K04"
    object_type: user
    name: jdoe
    assignments:
      - content:
          kind: target
          target_ref:
            oid: "01J0T1AB2C3D4E5F6G7H8J9K05"
            object_type: role
          embedded:
            oid: "01J0T1AB2C3D4E5F6G7H8J9K05"
            object_type: role
            name: Inline
            inducements:
              - content:
                  kind: focus_mappings
                  mappings:
                    - target_path: title
                      expression: Inline
"#,
        )?;
        let api = crate::AssignmentKernelApi::new(crate::KernelConfig::default(), catalog)?;

        let report = api.evaluate_subject(fixture_oid("01J0T1AB2C3D4E5F6G7H8J9K04"))?;

        assert_eq!(report.triple.zero.len(), 1);
        let evaluated = &report.triple.zero[0];
        assert_eq!(
            evaluated.target.as_ref().map(|target| target.oid),
            Some(fixture_oid("01J0T1AB2C3D4E5F6G7H8J9K05"))
        );
        assert_eq!(evaluated.focus_mappings.len(), 1);
        assert_eq!(evaluated.focus_mappings[0].target_path, "title");
        Ok(())
    }

    #[test]
    fn duplicate_oids_are_rejected() {
        let oid = fixture_oid("01J0T1AB2C3D4E5F6G7H8J9K03");
        let result = ObjectCatalog::from_objects([
            GovernedObject::new(oid, ObjectType::Role, "First"),
            GovernedObject::new(oid, ObjectType::Role, "Second"),
        ]);

        let Err(err) = result else {
            panic!("duplicate oid should be rejected");
        };
        assert!(err.to_string().contains("duplicate object oid"), "{err}");
    }

    #[test]
    fn json_catalog_rejects_unknown_top_level_fields() {
        assert!(ObjectCatalog::from_json_str(r#"{"objects": [], "roles": []}"#).is_err());
        assert!(ObjectCatalog::from_json_str(r#"{"objects": []}"#).is_ok_and(|c| c.is_empty()));
    }
}
