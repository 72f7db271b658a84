use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationId, ApplicationStatus, ComplianceType, CountryCode};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Storage abstraction so the request service can be exercised in isolation.
pub trait SubmissionStore: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn update(&self, application: Application) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn list(
        &self,
        filter: &ApplicationFilter,
        page: PageRequest,
    ) -> Result<Page<Application>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Listing filter. `tenant` is always set by the caller; the rest are optional.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplicationFilter {
    pub tenant: String,
    pub status: Option<ApplicationStatus>,
    pub compliance_type: Option<ComplianceType>,
    pub home_country: Option<CountryCode>,
    pub host_country: Option<CountryCode>,
}

impl ApplicationFilter {
    pub fn for_tenant(tenant: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            ..Self::default()
        }
    }

    pub fn matches(&self, application: &Application) -> bool {
        application.tenant == self.tenant
            && self
                .status
                .map_or(true, |status| application.status == status)
            && self
                .compliance_type
                .map_or(true, |kind| application.compliance_type == kind)
            && self
                .home_country
                .as_ref()
                .map_or(true, |home| &application.home_country == home)
            && self
                .host_country
                .as_ref()
                .map_or(true, |host| application.host_countries.contains(host))
    }
}

/// 1-based offset pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPage {
    #[error("page must be a positive integer")]
    Page,
    #[error("page_size must be between 1 and {MAX_PAGE_SIZE}")]
    PageSize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Result<Self, InvalidPage> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(InvalidPage::Page);
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(InvalidPage::PageSize);
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn next_page(&self) -> Option<u32> {
        let seen = self.page as usize * self.page_size as usize;
        (seen < self.count).then(|| self.page + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.page > 1).then(|| self.page - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

impl Page<Application> {
    /// Order newest first (ties broken by descending id) and cut out the requested page.
    pub fn paginate(mut matching: Vec<Application>, request: PageRequest) -> Self {
        matching.sort_by_key(|application| {
            (
                Reverse(application.created_at),
                Reverse(application.id.clone()),
            )
        });
        let count = matching.len();
        let results = matching
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .collect();
        Page {
            count,
            page: request.page,
            page_size: request.page_size,
            results,
        }
    }
}
