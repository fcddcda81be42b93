//! PuppetDB host discovery.
//!
//! Affected hosts are the active nodes with at least one resource declared
//! in a changed manifest, found with one PQL query against
//! `{base_uri}/pdb/query/v4`.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use preview_core::verified::build_affected_nodes_query;
use serde::Deserialize;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;

use crate::collaborators::HostDiscovery;
use crate::constants::USER_AGENT;
use crate::error::HttpSnafu;
use crate::error::PreviewError;
use crate::error::ReadFileSnafu;
use crate::error::Result;

const COLLABORATOR: &str = "puppetdb";

/// Client certificate material for PuppetDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuppetDbTls {
    pub host_key: PathBuf,
    pub host_cert: PathBuf,
    pub ca_cert: PathBuf,
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).context(ReadFileSnafu {
        path: path.display().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    certname: String,
}

/// Queries PuppetDB for hosts using changed manifests.
#[derive(Debug, Clone)]
pub struct PuppetDbClient {
    http: reqwest::Client,
    query_url: String,
}

impl PuppetDbClient {
    /// Create a client for `base_uri`, authenticating with `tls` when given.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::ReadFile`] if certificate material cannot be
    /// read, or [`PreviewError::Http`] if it cannot be used.
    pub fn new(base_uri: &str, tls: Option<&PuppetDbTls>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout);

        if let Some(tls) = tls {
            debug!(
                host_key = %tls.host_key.display(),
                host_cert = %tls.host_cert.display(),
                ca_cert = %tls.ca_cert.display(),
                "loading PuppetDB client certificate"
            );
            let mut identity_pem = read(&tls.host_cert)?;
            identity_pem.push(b'\n');
            identity_pem.extend(read(&tls.host_key)?);
            let identity = reqwest::Identity::from_pem(&identity_pem).context(HttpSnafu { collaborator: COLLABORATOR })?;
            let ca = reqwest::Certificate::from_pem(&read(&tls.ca_cert)?).context(HttpSnafu { collaborator: COLLABORATOR })?;
            builder = builder.use_rustls_tls().identity(identity).add_root_certificate(ca);
        }

        let http = builder.build().context(HttpSnafu { collaborator: COLLABORATOR })?;
        let query_url = query_url(base_uri);
        debug!(url = %query_url, "querying against PuppetDB");
        Ok(Self { http, query_url })
    }

    /// The query endpoint in use.
    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

/// PQL endpoint for a PuppetDB base URI.
pub fn query_url(base_uri: &str) -> String {
    format!("{}/pdb/query/v4", base_uri.trim_end_matches('/'))
}

#[async_trait]
impl HostDiscovery for PuppetDbClient {
    async fn resolve_hosts(&self, paths: &[String]) -> Result<Vec<String>> {
        let Some(query) = build_affected_nodes_query(paths.iter().map(String::as_str)) else {
            info!("no manifests changed, no hosts affected");
            return Ok(Vec::new());
        };
        info!("querying PuppetDB for nodes affected by the pull request");
        debug!(query = %query, "PQL query");

        let response = self
            .http
            .get(&self.query_url)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .context(HttpSnafu { collaborator: COLLABORATOR })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PreviewError::Collaborator {
                collaborator: COLLABORATOR,
                reason: format!("query returned {status}: {}", body.chars().take(512).collect::<String>()),
            });
        }

        let rows: Vec<NodeRow> = response.json().await.context(HttpSnafu { collaborator: COLLABORATOR })?;
        let hosts: Vec<String> = rows.into_iter().map(|row| row.certname).collect();
        debug!(hosts = ?hosts, "nodes affected by the change");
        Ok(hosts)
    }
}
