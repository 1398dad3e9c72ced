//! Repository source sync
//!
//! Pages through an owner's repository listing and upserts every non-fork
//! entry into the catalog.

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use crate::guard::RunGuard;
use crate::storage::Catalog;
use crate::Result;

/// Repositories requested per listing page
pub const PAGE_SIZE: u32 = 100;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// One entry of the remote repository listing
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRepo {
    pub full_name: String,
    pub clone_url: String,
    pub fork: bool,
    #[serde(default)]
    pub language: Option<String>,
    pub updated_at: String,
    pub default_branch: String,
}

/// Source of listing pages. Page numbers start at 0.
pub trait RepoLister: Send + Sync {
    fn list_page(&self, owner: &str, page: u32) -> Result<Vec<RemoteRepo>>;
}

/// Lists public repositories through the GitHub REST API
pub struct GitHubLister {
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GitHubLister {
    pub fn new(api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("random-source/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

impl RepoLister for GitHubLister {
    fn list_page(&self, owner: &str, page: u32) -> Result<Vec<RemoteRepo>> {
        let url = format!("{}/users/{}/repos", self.api_base, owner);
        let body = self.client
            .get(&url)
            .query(&[("per_page", PAGE_SIZE), ("page", page)])
            .header(ACCEPT, "application/vnd.github+json")
            .send()?
            .error_for_status()?
            .text()?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Listing page {} did not decode, body: {}", page, body);
            e.into()
        })
    }
}

/// Outcome of one sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: u32,
    pub upserted: usize,
    pub forks_skipped: usize,
    pub failed: usize,
}

/// Parse an RFC 3339 listing timestamp
pub fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Fetch every listing page for `owner` and upsert its non-fork repositories.
///
/// A failed page aborts the sync; a failed upsert only skips that record.
pub fn sync(catalog: &Catalog, lister: &dyn RepoLister, owner: &str) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for page in 0.. {
        let entries = lister.list_page(owner, page)?;
        if entries.is_empty() {
            break;
        }
        report.pages += 1;

        for entry in entries {
            if entry.fork {
                report.forks_skipped += 1;
                continue;
            }

            let updated_at = parse_updated_at(&entry.updated_at).unwrap_or_else(|| {
                tracing::warn!(
                    "Unparseable updated_at {:?} for {}, storing epoch",
                    entry.updated_at,
                    entry.full_name
                );
                DateTime::<Utc>::default()
            });

            match catalog.upsert_repository(&entry.clone_url, &entry.default_branch, updated_at) {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    tracing::warn!("Failed to add or update repository {}: {}", entry.full_name, e);
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Sync entry point for triggers; overlapping calls are coalesced.
pub struct SyncService {
    lister: Box<dyn RepoLister>,
    owner: String,
    guard: RunGuard,
}

impl SyncService {
    pub fn new(lister: Box<dyn RepoLister>, owner: impl Into<String>) -> Self {
        Self {
            lister,
            owner: owner.into(),
            guard: RunGuard::new(),
        }
    }

    /// Returns `None` when another sync is already running.
    pub fn run(&self, catalog: &Catalog) -> Option<Result<SyncReport>> {
        self.guard.run_exclusive(|| {
            let started = std::time::Instant::now();
            let res = sync(catalog, self.lister.as_ref(), &self.owner);
            match &res {
                Ok(report) => tracing::info!(
                    "Synced {} repositories for {} in {:?} ({} forks skipped, {} failed)",
                    report.upserted,
                    self.owner,
                    started.elapsed(),
                    report.forks_skipped,
                    report.failed
                ),
                Err(e) => tracing::error!("Failed to fetch repository listing for {}: {}", self.owner, e),
            }
            res
        })
    }
}
