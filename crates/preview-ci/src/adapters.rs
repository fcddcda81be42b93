//! Production collaborator wiring.

use std::sync::Arc;

use preview_core::PullRequestPayload;

use crate::collaborators::CollaboratorFactory;
use crate::collaborators::JobCollaborators;
use crate::elasticsearch::ElasticsearchSink;
use crate::github::GitHubClient;
use crate::process::CommandDeployer;
use crate::process::PuppetPreview;
use crate::puppetdb::PuppetDbClient;

/// Shares long-lived clients across jobs and binds the GitHub ones to each
/// pull request.
#[derive(Clone)]
pub struct ServiceCollaborators {
    github: GitHubClient,
    puppetdb: Arc<PuppetDbClient>,
    deployer: Arc<CommandDeployer>,
    compiler: Arc<PuppetPreview>,
    sink: Arc<ElasticsearchSink>,
}

impl ServiceCollaborators {
    pub fn new(
        github: GitHubClient,
        puppetdb: PuppetDbClient,
        deployer: CommandDeployer,
        compiler: PuppetPreview,
        sink: ElasticsearchSink,
    ) -> Self {
        Self {
            github,
            puppetdb: Arc::new(puppetdb),
            deployer: Arc::new(deployer),
            compiler: Arc::new(compiler),
            sink: Arc::new(sink),
        }
    }
}

impl CollaboratorFactory for ServiceCollaborators {
    fn for_pull_request(&self, payload: &PullRequestPayload) -> JobCollaborators {
        let repository = payload.repository.full_name.as_str();
        JobCollaborators {
            status: Arc::new(self.github.status_reporter(repository, payload.head_sha())),
            files: Arc::new(self.github.changed_files(repository, payload.number)),
            hosts: self.puppetdb.clone(),
            deployer: self.deployer.clone(),
            compiler: self.compiler.clone(),
            sink: self.sink.clone(),
        }
    }
}
