use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::protocol::{InvocationRequest, Signature};
use diffusive_common::serializer::SerializerKind;

use crate::code_source::RemoteCodeSource;
use crate::diffuser::{Diffuser, DiffusionContext};
use crate::handle::InvocationHandle;

/// Diffusers of one process, keyed by signature.
///
/// The repository is built once and passed to whoever needs it: the HTTP
/// surface, and the call-site wrappers that turn ordinary calls into
/// invocations through [`DiffuserRepository::submit`].
pub struct DiffuserRepository {
    context: DiffusionContext,
    code_source: Option<RemoteCodeSource>,
    diffusers: RwLock<HashMap<Signature, Arc<Diffuser>>>,
}

impl DiffuserRepository {
    pub fn new(context: DiffusionContext) -> Self {
        Self {
            context,
            code_source: None,
            diffusers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_code_source(mut self, code_source: RemoteCodeSource) -> Self {
        self.code_source = Some(code_source);
        self
    }

    pub fn context(&self) -> &DiffusionContext {
        &self.context
    }

    pub fn code_source(&self) -> Option<&RemoteCodeSource> {
        self.code_source.as_ref()
    }

    /// Creates (or replaces) the diffuser for `signature`.
    pub fn create(&self, signature: Signature, class_paths: Vec<String>, serializer: SerializerKind) -> Arc<Diffuser> {
        let diffuser = Arc::new(Diffuser::new(
            signature.clone(),
            self.context.clone(),
            self.code_source.as_ref(),
            class_paths,
            serializer,
        ));
        info!("Created diffuser {} ({})", diffuser.key(), serializer);

        self.diffusers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signature, diffuser.clone());
        diffuser
    }

    pub fn get(&self, signature: &Signature) -> Option<Arc<Diffuser>> {
        self.diffusers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signature)
            .cloned()
    }

    /// The diffuser for `signature`, created with defaults if missing.
    pub fn get_or_create(&self, signature: &Signature, serializer: SerializerKind) -> Arc<Diffuser> {
        if let Some(diffuser) = self.get(signature) {
            return diffuser;
        }
        self.create(signature.clone(), Vec::new(), serializer)
    }

    pub fn remove(&self, signature: &Signature) -> Option<Arc<Diffuser>> {
        let removed = self
            .diffusers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(signature);
        if removed.is_some() {
            info!("Removed diffuser {}", signature);
        }
        removed
    }

    /// Every diffuser, ordered by signature.
    pub fn list(&self) -> Vec<Arc<Diffuser>> {
        let mut diffusers: Vec<_> = self
            .diffusers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        diffusers.sort_by(|a, b| a.signature().cmp(b.signature()));
        diffusers
    }

    /// Routes `request` to the diffuser for its signature.
    ///
    /// This is the entry point for call-site wrappers: the diffuser is
    /// created on first use with the request's serializer.
    pub fn submit(&self, request: InvocationRequest) -> Result<InvocationHandle> {
        let diffuser = self.get_or_create(&request.signature(), request.serializer());
        diffuser.submit(request)
    }

    /// Routes `request` to an existing diffuser only.
    ///
    /// # Errors
    ///
    /// `CodeNotFound` if no diffuser exists for `signature`, `InvalidRequest`
    /// if the request names a different signature.
    pub fn submit_to(&self, signature: &Signature, request: InvocationRequest) -> Result<InvocationHandle> {
        let diffuser = self
            .get(signature)
            .ok_or_else(|| DiffusiveError::CodeNotFound(format!("No diffuser for {}", signature)))?;
        diffuser.submit(request)
    }
}
