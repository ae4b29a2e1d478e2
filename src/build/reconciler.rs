//! Keeps the saved build configuration in line with what the user owns.

use std::sync::Arc;

use crate::api::{ChatBackend, ModuleStore};
use crate::build::character::compose_character;
use crate::build::selection::{BuildConfig, PairingPolicy};
use crate::error::{BabError, BabResult};
use crate::ids::ModuleId;
use crate::modules::{ModuleRef, ModuleType, OwnedModules};
use crate::storage::{ChatPointer, SessionContext};

/// Build-screen state: the current selection and the last known owned list.
pub struct BuildReconciler {
    context: SessionContext,
    store: Arc<dyn ModuleStore>,
    chat: Arc<dyn ChatBackend>,
    policy: PairingPolicy,
    selection: BuildConfig,
    owned: Option<OwnedModules>,
}

impl BuildReconciler {
    /// Restore the saved selection. Nothing is reconciled until the owned
    /// list is known.
    #[must_use]
    pub fn load(
        context: SessionContext,
        store: Arc<dyn ModuleStore>,
        chat: Arc<dyn ChatBackend>,
        policy: PairingPolicy,
    ) -> Self {
        let selection = context.load_build_config().unwrap_or_default();
        Self {
            context,
            store,
            chat,
            policy,
            selection,
            owned: None,
        }
    }

    /// Current selection.
    #[must_use]
    pub const fn selection(&self) -> &BuildConfig {
        &self.selection
    }

    /// Last owned-module list, if one has been received.
    #[must_use]
    pub const fn owned(&self) -> Option<&OwnedModules> {
        self.owned.as_ref()
    }

    /// Speech/tone pairing rule in force.
    #[must_use]
    pub const fn policy(&self) -> PairingPolicy {
        self.policy
    }

    /// Apply a fresh owned-module list, dropping selections no longer owned.
    ///
    /// Returns whether the selection changed; a changed selection is saved.
    pub fn on_owned_modules_changed(&mut self, owned: OwnedModules) -> bool {
        let changed = self.selection.reconcile(&owned);
        self.owned = Some(owned);

        if changed {
            tracing::info!("Build configuration dropped modules that are no longer owned");
            self.persist();
        }
        changed
    }

    /// Select an owned module, fetching its content from the module store.
    ///
    /// # Errors
    /// Returns `NotOwned` if the module is not in the owned list (or no list
    /// has been received yet), or the store error if its content cannot be
    /// fetched. The selection is unchanged on error.
    pub async fn select_module(&mut self, module: ModuleRef) -> BabResult<()> {
        let owned = self
            .owned
            .as_ref()
            .is_some_and(|o| o.owns(module.module_type, &module.on_chain_id));
        if !owned {
            tracing::warn!("Module {} is no longer owned", module.on_chain_id);
            return Err(BabError::NotOwned(module.on_chain_id));
        }

        let module_id = ModuleId::new(module.on_chain_id.clone());
        let content = match self.store.fetch_content(&module_id).await {
            Ok(content) => content,
            Err(err) => {
                tracing::error!("Error selecting module {module_id}: {err}");
                return Err(err);
            }
        };

        self.selection.select(module.with_data(content));
        self.persist();
        Ok(())
    }

    /// Deselect a module. Never fails.
    pub fn remove_module(&mut self, module_type: ModuleType, on_chain_id: &str) {
        self.selection.remove(module_type, on_chain_id);
        self.persist();
    }

    /// Whether the selection is complete enough to build an agent.
    #[must_use]
    pub const fn can_instantiate(&self) -> bool {
        self.selection.can_instantiate(self.policy)
    }

    /// Compose the character, start the agent and point the chat at it.
    ///
    /// The new agent is recorded as created but not started, so its first
    /// message carries the memory module's history.
    ///
    /// # Errors
    /// Returns `NotReady` if the selection is incomplete, or the backend or
    /// storage error.
    pub async fn instantiate(&self) -> BabResult<ChatPointer> {
        if !self.can_instantiate() {
            return Err(BabError::NotReady(format!(
                "character and memory modules are required ({} pairing)",
                self.policy
            )));
        }
        let memory = self
            .selection
            .memory
            .as_ref()
            .ok_or_else(|| BabError::NotReady("no memory module selected".to_string()))?;

        let character = compose_character(&self.selection, &mut rand::thread_rng())?;
        let agent = self.chat.start_agent(character).await?;

        self.context.mark_agent_created(agent.id)?;
        let pointer = ChatPointer {
            agent_id: agent.id,
            module_id: ModuleId::new(memory.on_chain_id.clone()),
        };
        self.context.set_current_chat(&pointer)?;

        tracing::info!("Started agent {} with memory module {}", agent.id, pointer.module_id);
        Ok(pointer)
    }

    fn persist(&self) {
        if let Err(err) = self.context.save_build_config(&self.selection) {
            tracing::error!("Failed to save build configuration: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::api::{AgentInfo, ApiFuture, FileUpload, ModuleContent, ResponseMessage};
    use crate::ids::AgentId;
    use crate::storage::MemoryStorage;

    struct FakeStore;

    impl ModuleStore for FakeStore {
        fn fetch_content(&self, module_id: &ModuleId) -> ApiFuture<'_, BabResult<Value>> {
            let result = match module_id.as_str() {
                "c1" => Ok(json!({"name": "Eliza", "bio": ["helpful"]})),
                "k1" => Ok(json!(["the sky is blue"])),
                "m1" => Ok(json!({})),
                other => Err(BabError::Api {
                    status: 404,
                    message: format!("Module {other} not found"),
                }),
            };
            Box::pin(async move { result })
        }

        fn append_module(&self, _: &ModuleId, _: ModuleContent) -> ApiFuture<'_, BabResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct FakeChat {
        started: Mutex<Vec<Value>>,
    }

    impl ChatBackend for FakeChat {
        fn send_message(
            &self,
            _: AgentId,
            _: String,
            _: Option<FileUpload>,
        ) -> ApiFuture<'_, BabResult<Vec<ResponseMessage>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn start_agent(&self, character: Value) -> ApiFuture<'_, BabResult<AgentInfo>> {
            if let Ok(mut started) = self.started.lock() {
                started.push(character.clone());
            }
            Box::pin(async move {
                Ok(AgentInfo {
                    id: AgentId::random(),
                    character,
                })
            })
        }
    }

    fn context() -> SessionContext {
        SessionContext::new(Arc::new(MemoryStorage::new()), Duration::from_secs(3600))
    }

    fn reconciler(context: SessionContext, chat: Arc<FakeChat>) -> BuildReconciler {
        BuildReconciler::load(context, Arc::new(FakeStore), chat, PairingPolicy::Relaxed)
    }

    fn owned(ids: &[(ModuleType, &str)]) -> OwnedModules {
        ids.iter().map(|(t, id)| ModuleRef::new(*t, *id)).collect()
    }

    #[tokio::test]
    async fn test_selection_requires_known_ownership() {
        let mut build = reconciler(context(), Arc::new(FakeChat::default()));
        let result = build
            .select_module(ModuleRef::new(ModuleType::Character, "c1"))
            .await;
        assert!(matches!(result, Err(BabError::NotOwned(_))));
        assert_eq!(build.selection(), &BuildConfig::default());
    }

    #[tokio::test]
    async fn test_select_attaches_content_and_persists() {
        let ctx = context();
        let mut build = reconciler(ctx.clone(), Arc::new(FakeChat::default()));
        build.on_owned_modules_changed(owned(&[(ModuleType::Knowledge, "k1")]));

        let selected = build
            .select_module(ModuleRef::new(ModuleType::Knowledge, "k1"))
            .await;
        assert!(selected.is_ok());
        assert_eq!(
            build.selection().knowledge[0].data,
            Some(json!(["the sky is blue"]))
        );
        assert_eq!(ctx.load_build_config().as_ref(), Some(build.selection()));
    }

    #[tokio::test]
    async fn test_store_failure_leaves_selection_unchanged() {
        let mut build = reconciler(context(), Arc::new(FakeChat::default()));
        build.on_owned_modules_changed(owned(&[(ModuleType::Tone, "t404")]));

        let result = build.select_module(ModuleRef::new(ModuleType::Tone, "t404")).await;
        assert!(matches!(result, Err(BabError::Api { status: 404, .. })));
        assert_eq!(build.selection().tone, None);
    }

    #[tokio::test]
    async fn test_lost_ownership_is_reconciled_on_reload() {
        let ctx = context();
        let mut build = reconciler(ctx.clone(), Arc::new(FakeChat::default()));
        build.on_owned_modules_changed(owned(&[
            (ModuleType::Character, "c1"),
            (ModuleType::Memory, "m1"),
        ]));
        assert!(build.select_module(ModuleRef::new(ModuleType::Character, "c1")).await.is_ok());
        assert!(build.select_module(ModuleRef::new(ModuleType::Memory, "m1")).await.is_ok());

        let mut reloaded = reconciler(ctx.clone(), Arc::new(FakeChat::default()));
        assert!(reloaded.selection().character.is_some());
        assert!(reloaded.on_owned_modules_changed(owned(&[(ModuleType::Memory, "m1")])));
        assert_eq!(reloaded.selection().character, None);
        assert_eq!(ctx.load_build_config().and_then(|c| c.character), None);
        assert!(!reloaded.on_owned_modules_changed(owned(&[(ModuleType::Memory, "m1")])));
    }

    #[test]
    fn test_remove_on_empty_owned_list_never_fails() {
        let mut build = reconciler(context(), Arc::new(FakeChat::default()));
        build.on_owned_modules_changed(OwnedModules::new());
        build.remove_module(ModuleType::Knowledge, "k1");
        build.remove_module(ModuleType::Character, "c1");
        assert_eq!(build.selection(), &BuildConfig::default());
    }

    #[tokio::test]
    async fn test_instantiate_records_new_agent() {
        let ctx = context();
        let chat = Arc::new(FakeChat::default());
        let mut build = reconciler(ctx.clone(), Arc::clone(&chat));
        build.on_owned_modules_changed(owned(&[
            (ModuleType::Character, "c1"),
            (ModuleType::Knowledge, "k1"),
            (ModuleType::Memory, "m1"),
        ]));

        assert!(matches!(build.instantiate().await, Err(BabError::NotReady(_))));

        for (t, id) in [
            (ModuleType::Character, "c1"),
            (ModuleType::Knowledge, "k1"),
            (ModuleType::Memory, "m1"),
        ] {
            assert!(build.select_module(ModuleRef::new(t, id)).await.is_ok());
        }
        assert!(build.can_instantiate());

        let pointer = match build.instantiate().await {
            Ok(pointer) => pointer,
            Err(err) => panic!("instantiate: {err}"),
        };
        assert_eq!(pointer.module_id, ModuleId::from("m1"));
        assert!(ctx.is_agent_created(pointer.agent_id));
        assert!(!ctx.is_agent_started(pointer.agent_id));
        assert_eq!(ctx.current_chat(), Some(pointer));

        let started = chat.started.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0]["knowledge"], json!(["the sky is blue"]));
        assert!(started[0]["name"].as_str().is_some_and(|n| n.starts_with("Eliza#")));
    }
}
