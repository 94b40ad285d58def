//! In-memory enrollment registry.
//!
//! Holds enrolled identities and their presets, validates enrollments, and
//! hands out read-only slices for the matchers. Entries keep insertion
//! order, which is also the scan order used for tie-breaking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::gesture::classify_digit;
use crate::types::{
    DeviceState, Embedding, EnrolledIdentity, EnrolledPreset, Landmark, HAND_LANDMARK_COUNT,
};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
    #[error("identity {owner_id} already has a preset named {name:?}")]
    DuplicatePreset { owner_id: String, name: String },
    #[error("expected {expected} hand landmarks, got {actual}")]
    InsufficientLandmarks { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("embedding has {actual} values, enrolled identities have {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("registry serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    identities: Vec<EnrolledIdentity>,
    #[serde(default)]
    presets: Vec<EnrolledPreset>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn identities(&self) -> &[EnrolledIdentity] {
        &self.identities
    }

    pub fn presets(&self) -> &[EnrolledPreset] {
        &self.presets
    }

    pub fn identity(&self, id: &str) -> Option<&EnrolledIdentity> {
        self.identities.iter().find(|i| i.id == id)
    }

    pub fn preset(&self, id: &str) -> Option<&EnrolledPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn presets_for<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> impl Iterator<Item = &'a EnrolledPreset> + 'a {
        self.presets.iter().filter(move |p| p.owner_id == owner_id)
    }

    /// Enroll a new identity and return a copy of the stored entry.
    ///
    /// All embeddings must share one dimensionality.
    pub fn enroll_identity(
        &mut self,
        name: &str,
        embedding: Embedding,
    ) -> Result<EnrolledIdentity, RegistryError> {
        if embedding.is_empty() {
            return Err(RegistryError::EmptyEmbedding);
        }
        if let Some(existing) = self.identities.first() {
            if existing.embedding.len() != embedding.len() {
                return Err(RegistryError::DimensionMismatch {
                    expected: existing.embedding.len(),
                    actual: embedding.len(),
                });
            }
        }

        let identity = EnrolledIdentity::new(Uuid::new_v4().to_string(), name, embedding);
        tracing::info!(
            id = %identity.id,
            name,
            dim = identity.embedding.len(),
            "identity enrolled"
        );
        self.identities.push(identity.clone());
        Ok(identity)
    }

    /// Enroll a preset for an existing identity and return a copy of the
    /// stored entry. Names are unique per owner.
    pub fn enroll_preset(
        &mut self,
        owner_id: &str,
        name: &str,
        landmarks: Vec<Landmark>,
        device_states: Vec<DeviceState>,
    ) -> Result<EnrolledPreset, RegistryError> {
        if self.identity(owner_id).is_none() {
            return Err(RegistryError::UnknownIdentity(owner_id.to_string()));
        }
        if landmarks.len() != HAND_LANDMARK_COUNT {
            return Err(RegistryError::InsufficientLandmarks {
                expected: HAND_LANDMARK_COUNT,
                actual: landmarks.len(),
            });
        }
        if self.presets_for(owner_id).any(|p| p.name == name) {
            return Err(RegistryError::DuplicatePreset {
                owner_id: owner_id.to_string(),
                name: name.to_string(),
            });
        }

        let digit = classify_digit(&landmarks);
        let mut preset = EnrolledPreset::new(
            Uuid::new_v4().to_string(),
            name,
            owner_id,
            landmarks,
            device_states,
        );
        preset.digit = Some(digit);
        tracing::info!(id = %preset.id, owner = owner_id, name, digit, "preset enrolled");
        self.presets.push(preset.clone());
        Ok(preset)
    }

    /// Remove an identity together with all presets it owns.
    pub fn remove_identity(&mut self, id: &str) -> Result<EnrolledIdentity, RegistryError> {
        let pos = self
            .identities
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| RegistryError::UnknownIdentity(id.to_string()))?;
        let before = self.presets.len();
        self.presets.retain(|p| p.owner_id != id);
        tracing::info!(id, presets_removed = before - self.presets.len(), "identity removed");
        Ok(self.identities.remove(pos))
    }

    pub fn remove_preset(&mut self, id: &str) -> Result<EnrolledPreset, RegistryError> {
        let pos = self
            .presets
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RegistryError::UnknownPreset(id.to_string()))?;
        Ok(self.presets.remove(pos))
    }

    pub fn record_login(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), RegistryError> {
        let identity = self
            .identities
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| RegistryError::UnknownIdentity(id.to_string()))?;
        identity.last_login = Some(at);
        Ok(())
    }

    pub fn record_preset_used(&mut self, id: &str, at: DateTime<Utc>) -> Result<(), RegistryError> {
        let preset = self
            .presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RegistryError::UnknownPreset(id.to_string()))?;
        preset.last_used = Some(at);
        Ok(())
    }
}
