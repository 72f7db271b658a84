use chrono::NaiveDate;
use compliance_intake::config::IntakeConfig;
use compliance_intake::error::AppError;
use compliance_intake::workflows::compliance::{
    Application, ApplicationFilter, ApplicationId, ComplianceRequestService, ComplianceType,
    CountryCode, Page, PageRequest, RepositoryError, SchemaCatalog, SubmissionStore, UploadEntry,
    UploadError, UploadRegistry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type IntakeService =
    ComplianceRequestService<SchemaCatalog, InMemoryUploadRegistry, InMemorySubmissionStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySubmissionStore {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl SubmissionStore for InMemorySubmissionStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&application.id) {
            guard.insert(application.id.clone(), application);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(
        &self,
        filter: &ApplicationFilter,
        page: PageRequest,
    ) -> Result<Page<Application>, RepositoryError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let matching = guard
            .values()
            .filter(|application| filter.matches(application))
            .cloned()
            .collect();
        Ok(Page::paginate(matching, page))
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryUploadRegistry {
    entries: Arc<Mutex<HashMap<String, UploadEntry>>>,
}

impl UploadRegistry for InMemoryUploadRegistry {
    fn insert(&self, entry: UploadEntry) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        let key = entry.reference.object_key.clone();
        if guard.contains_key(&key) {
            return Err(UploadError::Conflict(key));
        }
        guard.insert(key, entry);
        Ok(())
    }

    fn fetch(&self, object_key: &str) -> Result<Option<UploadEntry>, UploadError> {
        let guard = self.entries.lock().expect("registry mutex poisoned");
        Ok(guard.get(object_key).cloned())
    }

    fn update(&self, entry: UploadEntry) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        let key = entry.reference.object_key.clone();
        if guard.contains_key(&key) {
            guard.insert(key, entry);
            Ok(())
        } else {
            Err(UploadError::UnknownObjectKey(key))
        }
    }

    fn claim(&self, object_key: &str, application_id: &ApplicationId) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        guard
            .get_mut(object_key)
            .ok_or_else(|| UploadError::UnknownObjectKey(object_key.to_string()))?
            .claim_for(application_id)
    }

    fn release(
        &self,
        object_key: &str,
        application_id: &ApplicationId,
    ) -> Result<(), UploadError> {
        let mut guard = self.entries.lock().expect("registry mutex poisoned");
        if let Some(entry) = guard.get_mut(object_key) {
            entry.release_for(application_id);
        }
        Ok(())
    }
}

/// Standard schemas unless a schema document is configured.
pub(crate) fn load_catalog(config: &IntakeConfig) -> Result<SchemaCatalog, AppError> {
    let catalog = match &config.schema_path {
        Some(path) => {
            let catalog = SchemaCatalog::from_path(path)?;
            info!(path = %path.display(), schemas = catalog.len(), "loaded schema document");
            catalog
        }
        None => SchemaCatalog::standard(),
    };
    Ok(catalog)
}

pub(crate) fn in_memory_service(config: &IntakeConfig) -> Result<Arc<IntakeService>, AppError> {
    let catalog = load_catalog(config)?;
    Ok(Arc::new(ComplianceRequestService::new(
        Arc::new(catalog),
        Arc::new(InMemoryUploadRegistry::default()),
        Arc::new(InMemorySubmissionStore::default()),
        config,
    )))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_country(raw: &str) -> Result<CountryCode, String> {
    CountryCode::parse(raw).map_err(|err| err.to_string())
}

pub(crate) fn parse_form_type(raw: &str) -> Result<ComplianceType, String> {
    ComplianceType::from_code(raw)
        .ok_or_else(|| format!("'{raw}' is not one of A1, A1_MULTI, COC, ETA, VISA"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2025-04-01 "),
            Ok(NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid"))
        );
        assert!(parse_date("04/01/2025").is_err());
    }

    #[test]
    fn catalog_loads_from_configured_path() {
        let path = std::env::temp_dir().join(format!(
            "compliance-intake-schemas-{}.json",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).expect("create schema file");
        file.write_all(
            br#"[{"country":"FR","compliance_type":"A1","fields":[{"name":"employee_name","type":"string","required":true}]}]"#,
        )
        .expect("write schema file");

        let config = IntakeConfig {
            schema_path: Some(path.clone()),
            ..IntakeConfig::default()
        };
        let catalog = load_catalog(&config).expect("catalog loads");
        std::fs::remove_file(&path).ok();

        assert_eq!(catalog.len(), 1);
        assert!(load_catalog(&IntakeConfig::default())
            .expect("standard catalog")
            .len()
            > 1);
    }

    #[test]
    fn registry_updates_require_issued_keys() {
        let registry = InMemoryUploadRegistry::default();
        let service = ComplianceRequestService::new(
            Arc::new(SchemaCatalog::standard()),
            Arc::new(registry.clone()),
            Arc::new(InMemorySubmissionStore::default()),
            &IntakeConfig::default(),
        );
        let issued = service
            .issue_upload_urls(&["a.pdf".to_string()], chrono::Utc::now())
            .expect("issue");
        let mut entry = registry
            .fetch(&issued[0].object_key)
            .expect("fetch")
            .expect("entry");
        entry.reference.object_key = "uploads/missing".to_string();

        assert!(matches!(
            registry.update(entry),
            Err(UploadError::UnknownObjectKey(_))
        ));
    }
}
