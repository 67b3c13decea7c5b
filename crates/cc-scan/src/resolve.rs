//! Entity resolution against a [`Directory`].
//!
//! Each lookup turns the directory's `Option` into [`Error::NotFound`] and
//! is bounded by the configured timeout.

use std::time::Duration;

use cc_core::{
  Error, Result,
  entity::{Family, Individual, Institution, Tag},
  store::Directory,
};

use crate::bounded::bounded;

pub struct Resolver<'a, D> {
  directory: &'a D,
  timeout:   Duration,
}

impl<'a, D: Directory> Resolver<'a, D> {
  pub fn new(directory: &'a D, timeout: Duration) -> Self {
    Self { directory, timeout }
  }

  pub async fn individual(&self, individual_id: &str) -> Result<Individual> {
    bounded(
      self.timeout,
      "get_individual",
      self.directory.get_individual(individual_id.to_owned()),
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("individual {individual_id}")))
  }

  /// The family `guardian` scans for.
  pub async fn family_of_guardian(&self, guardian: &Individual) -> Result<Family> {
    let Some(link) = &guardian.family else {
      return Err(Error::not_found(format!(
        "family of guardian {}",
        guardian.individual_id
      )));
    };
    bounded(
      self.timeout,
      "get_family",
      self.directory.get_family(link.family_id.clone()),
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("family {}", link.family_id)))
  }

  pub async fn family_of_dependent(&self, dependent_id: &str) -> Result<Family> {
    bounded(
      self.timeout,
      "family_of_dependent",
      self.directory.family_of_dependent(dependent_id.to_owned()),
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("dependent {dependent_id}")))
  }

  pub async fn institution(&self, institution_id: &str) -> Result<Institution> {
    bounded(
      self.timeout,
      "get_institution",
      self.directory.get_institution(institution_id.to_owned()),
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("institution {institution_id}")))
  }

  pub async fn institution_by_identifier(
    &self,
    identifier: &str,
  ) -> Result<Institution> {
    bounded(
      self.timeout,
      "institution_by_identifier",
      self.directory.institution_by_identifier(identifier.to_owned()),
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("institution identifier {identifier}")))
  }

  /// Tags are never missing: the first sighting creates one.
  pub async fn tag(&self, institution: &Institution, tag_string: &str) -> Result<Tag> {
    bounded(
      self.timeout,
      "get_or_create_tag",
      self
        .directory
        .get_or_create_tag(institution.institution_id.clone(), tag_string.to_owned()),
    )
    .await
  }
}
