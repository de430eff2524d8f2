//! Inspection server - the process-wide registry
//!
//! Holds the inspection types, the task universe, the interceptor and
//! run-context-option chains, and every live session. Bootstrap registers
//! the intrinsic tasks: the artifact serializer and the run-context option
//! that publishes a fresh history builder into each session store.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{KhronicleError, Result};
use crate::history::{builder_key, serializer::serializer_task, HistoryBuilder};
use crate::runtime::{with_lazy, IoConfig, RunContextOption};
use crate::task::{Task, TaskSet};
use crate::typedmap::SharedTypedMap;
use crate::upload::{upload_store_key, SharedUploadStore, UploadStore};

use super::interceptor::Interceptor;
use super::runner::InspectionRunner;
use super::types::InspectionType;

pub struct InspectionServer {
    types: RwLock<Vec<InspectionType>>,
    universe: RwLock<TaskSet>,
    interceptors: RwLock<Vec<Interceptor>>,
    options: RwLock<Vec<RunContextOption>>,
    runners: DashMap<String, Arc<InspectionRunner>>,
    io: IoConfig,
    process_store: SharedTypedMap,
    upload_store: SharedUploadStore,
}

impl InspectionServer {
    /// Server with intrinsic tasks and options registered.
    pub fn new(io: IoConfig, max_upload_size: u64) -> Self {
        let upload_store = Arc::new(UploadStore::new(io.upload_dir.clone(), max_upload_size));
        let process_store = SharedTypedMap::new();
        process_store.set_arc(&upload_store_key(), Arc::clone(&upload_store));

        let mut universe = TaskSet::new();
        universe
            .add(serializer_task(vec![]))
            .expect("empty universe accepts the serializer");

        let options: Vec<RunContextOption> = vec![with_lazy(builder_key(), |_ctx, _mode| {
            Ok(HistoryBuilder::new())
        })];

        Self {
            types: RwLock::new(Vec::new()),
            universe: RwLock::new(universe),
            interceptors: RwLock::new(Vec::new()),
            options: RwLock::new(options),
            runners: DashMap::new(),
            io,
            process_store,
            upload_store,
        }
    }

    pub fn io(&self) -> &IoConfig {
        &self.io
    }

    pub fn upload_store(&self) -> SharedUploadStore {
        Arc::clone(&self.upload_store)
    }

    pub fn process_store(&self) -> &SharedTypedMap {
        &self.process_store
    }

    // ═══════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════

    pub fn add_inspection_type(&self, inspection_type: InspectionType) -> Result<()> {
        inspection_type.validate()?;
        let mut types = self.types.write();
        if types.iter().any(|t| t.id == inspection_type.id) {
            return Err(KhronicleError::InvalidInspectionTypeId {
                id: inspection_type.id,
            });
        }
        types.push(inspection_type);
        Ok(())
    }

    pub fn add_task(&self, task: Arc<Task>) -> Result<()> {
        self.universe.write().add(task)
    }

    pub fn add_interceptor(&self, interceptor: Interceptor) {
        self.interceptors.write().push(interceptor);
    }

    pub fn add_run_context_option(&self, option: RunContextOption) {
        self.options.write().push(option);
    }

    // ═══════════════════════════════════════════════════════════
    // LOOKUP
    // ═══════════════════════════════════════════════════════════

    /// Registered types, sorted by descending priority for presentation.
    pub fn all_inspection_types(&self) -> Vec<InspectionType> {
        let mut types = self.types.read().clone();
        types.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        types
    }

    pub fn get_inspection_type(&self, id: &str) -> Option<InspectionType> {
        self.types.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn get_inspection(&self, id: &str) -> Option<Arc<InspectionRunner>> {
        self.runners.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn all_runners(&self) -> Vec<Arc<InspectionRunner>> {
        let mut runners: Vec<_> = self
            .runners
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();
        runners.sort_by_key(|r| r.created_at());
        runners
    }

    // ═══════════════════════════════════════════════════════════
    // SESSIONS
    // ═══════════════════════════════════════════════════════════

    /// Create a session for the given inspection type.
    ///
    /// The session gets a snapshot of the current universe; tasks registered
    /// later do not leak into already created sessions.
    pub fn create_inspection(&self, type_id: &str) -> Result<Arc<InspectionRunner>> {
        let inspection_type = self.get_inspection_type(type_id).ok_or_else(|| {
            KhronicleError::UnknownInspectionType {
                id: type_id.to_string(),
            }
        })?;

        let id = Uuid::new_v4().to_string();
        let runner = Arc::new(InspectionRunner::new(
            id.clone(),
            self.universe.read().clone(),
            self.interceptors.read().clone(),
            self.options.read().clone(),
            self.io.clone(),
            self.process_store.clone(),
        ));
        runner.set_inspection_type(inspection_type)?;
        self.runners.insert(id, Arc::clone(&runner));
        Ok(runner)
    }

    /// Cancel every live session; used on shutdown.
    pub fn cancel_all(&self) {
        for runner in self.runners.iter() {
            runner.value().cancel();
        }
    }
}

impl std::fmt::Debug for InspectionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectionServer")
            .field("types", &self.types.read().len())
            .field("tasks", &self.universe.read().len())
            .field("sessions", &self.runners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> InspectionServer {
        let dir = std::env::temp_dir().join("khronicle-server-tests");
        InspectionServer::new(
            IoConfig {
                data_dir: dir.clone(),
                temp_dir: dir.clone(),
                upload_dir: dir.clone(),
                app_root: dir,
            },
            1 << 20,
        )
    }

    #[test]
    fn types_sort_by_descending_priority() {
        let server = server();
        server
            .add_inspection_type(InspectionType::new("oss", "OSS Kubernetes").priority(1))
            .unwrap();
        server
            .add_inspection_type(InspectionType::new("gke", "GKE").priority(10))
            .unwrap();
        let ids: Vec<&str> = server
            .all_inspection_types()
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        assert_eq!(ids, vec!["gke", "oss"]);
    }

    #[test]
    fn duplicate_type_id_is_rejected() {
        let server = server();
        server
            .add_inspection_type(InspectionType::new("gke", "GKE"))
            .unwrap();
        assert!(server
            .add_inspection_type(InspectionType::new("gke", "GKE again"))
            .is_err());
    }

    #[test]
    fn create_inspection_requires_known_type() {
        let server = server();
        assert!(matches!(
            server.create_inspection("nope").unwrap_err(),
            KhronicleError::UnknownInspectionType { .. }
        ));
    }

    #[test]
    fn created_session_is_registered_and_typed() {
        let server = server();
        server
            .add_inspection_type(InspectionType::new("gke", "GKE"))
            .unwrap();
        let runner = server.create_inspection("gke").unwrap();
        assert_eq!(
            runner.inspection_type().map(|t| t.id),
            Some("gke".to_string())
        );
        assert!(server.get_inspection(runner.id()).is_some());
        assert_eq!(server.all_runners().len(), 1);
    }
}
