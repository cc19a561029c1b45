//! Strategy factory
//!
//! Maps model ids to zero-argument strategy constructors. Every call to
//! [`StrategyFactory::create`] runs the constructor again, so no strategy
//! instance is ever shared between invocations.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::{GatewayError, Result};
use crate::strategy::{ModelStrategy, StrategyCreator};
use crate::types::ModelDescriptor;

#[derive(Clone)]
struct Registration {
    creator: StrategyCreator,
    registered_at: DateTime<Utc>,
}

/// In-memory map from model id to strategy constructor.
#[derive(Default)]
pub struct StrategyFactory {
    creators: RwLock<HashMap<String, Registration>>,
}

impl StrategyFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `model_id`.
    pub fn register(&self, model_id: impl Into<String>, creator: StrategyCreator) -> Result<()> {
        let model_id = model_id.into();
        if model_id.trim().is_empty() {
            return Err(GatewayError::BadRequest(
                "Model id must not be empty".to_string(),
            ));
        }

        let mut creators = self.write();
        if creators.contains_key(&model_id) {
            return Err(GatewayError::DuplicateRegistration(model_id));
        }
        tracing::debug!(model_id = %model_id, "strategy registered");
        creators.insert(
            model_id,
            Registration {
                creator,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Build a fresh strategy for `model_id`.
    pub fn create(&self, model_id: &str) -> Result<Box<dyn ModelStrategy>> {
        // Clone the constructor out so it runs without the lock held.
        let creator = self
            .read()
            .get(model_id)
            .map(|registration| registration.creator.clone())
            .ok_or_else(|| GatewayError::ModelNotAvailable(model_id.to_string()))?;
        Ok(creator())
    }

    /// Whether `model_id` has a constructor.
    pub fn is_registered(&self, model_id: &str) -> bool {
        self.read().contains_key(model_id)
    }

    /// Descriptor for one model.
    pub fn describe(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.read()
            .get(model_id)
            .map(|registration| ModelDescriptor {
                model_id: model_id.to_string(),
                available: true,
                registered_at: registration.registered_at,
            })
    }

    /// Descriptors of every registered model, sorted by id.
    pub fn list(&self) -> Vec<ModelDescriptor> {
        let mut models: Vec<ModelDescriptor> = self
            .read()
            .iter()
            .map(|(model_id, registration)| ModelDescriptor {
                model_id: model_id.clone(),
                available: true,
                registered_at: registration.registered_at,
            })
            .collect();
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        models
    }

    /// Remove a constructor. Returns whether one was present.
    pub fn unregister(&self, model_id: &str) -> bool {
        self.write().remove(model_id).is_some()
    }

    /// Number of registered constructors.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the factory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Registration>> {
        self.creators.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Registration>> {
        self.creators.write().unwrap_or_else(PoisonError::into_inner)
    }
}
