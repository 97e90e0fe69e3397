use tracing::{debug, info};

use crate::credential::{CredentialStore, KeyValueStore, mask};
use crate::error::{ClientError, ClientResult};
use crate::models::ChatModel;

/// Per-user settings handed to the orchestrator: the optional credential,
/// the selected model and an optional sampling temperature.
///
/// The credential is read from the store once, in [`Session::load`], and
/// only written back by [`Session::persist`].
#[derive(Debug)]
pub struct Session<S> {
    credentials: CredentialStore<S>,
    credential: Option<String>,
    model: ChatModel,
    temperature: Option<f32>,
}

impl<S: KeyValueStore> Session<S> {
    pub fn load(store: S, model: ChatModel) -> ClientResult<Self> {
        let credentials = CredentialStore::new(store);
        let credential = credentials.load()?;
        match &credential {
            Some(key) => info!("Loaded stored credential {}", mask(key)),
            None => debug!("No stored credential, the server default key will be used"),
        }
        Ok(Self {
            credentials,
            credential,
            model,
            temperature: None,
        })
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Replace the in-memory credential. Blank input clears it.
    pub fn set_credential(&mut self, value: &str) {
        let value = value.trim();
        self.credential = (!value.is_empty()).then(|| value.to_string());
    }

    pub fn model(&self) -> ChatModel {
        self.model
    }

    pub fn set_model(&mut self, model: ChatModel) {
        self.model = model;
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: Option<f32>) -> ClientResult<()> {
        if let Some(t) = temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ClientError::InvalidTemperature(t));
            }
        }
        self.temperature = temperature;
        Ok(())
    }

    /// Write the current credential to the store. Without a credential
    /// nothing is written and any stored one is left in place.
    pub fn persist(&self) -> ClientResult<bool> {
        match &self.credential {
            Some(key) => self.credentials.save(key),
            None => Ok(false),
        }
    }

    pub fn store(&self) -> &S {
        self.credentials.inner()
    }
}
