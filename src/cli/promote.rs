//! Promote command: runs one promotion for a trigger event.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use crate::config::PromotionConfig;
use crate::event::{FieldMap, TaskResult, TriggerEvent, DEFAULT_NEXT_STAGE};
use crate::promotion::{
    NoChangePolicy, PromoterOptions, Promoter, PromotionOutcome, PromotionRequest,
};
use crate::replacer::{ContentReplacer, DEFAULT_NAMESPACE};
use crate::repoaccess::{GitHubClient, GitHubConfig};
use crate::utils::{ServiceSettings, Settings};

/// Promote command options.
#[derive(Parser)]
pub struct PromoteCommand {
    /// Trigger event JSON file.
    #[arg(long, value_name = "FILE")]
    pub event: PathBuf,

    /// Directory holding project/stage/service configuration resources.
    #[arg(long, value_name = "DIR")]
    pub config_dir: PathBuf,

    /// Branch content is promoted from and the pull request targets.
    #[arg(long, default_value = "main")]
    pub source_branch: String,

    /// Stage the promotion targets.
    #[arg(long, default_value = DEFAULT_NEXT_STAGE)]
    pub next_stage: String,

    /// Marker namespace recognised in promoted files.
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Skip unchanged mappings instead of stopping the promotion.
    #[arg(long)]
    pub skip_unchanged: bool,
}

impl PromoteCommand {
    /// Executes the promote command and prints the task result as JSON.
    pub async fn execute(self) -> Result<()> {
        let event = TriggerEvent::from_file(&self.event)?;

        if !event.is_promotion_trigger() {
            info!(event_type = %event.event_type, "Ignoring event");
            let task = TaskResult::succeeded(&event, "event type ignored");
            println!("{}", serde_json::to_string_pretty(&task)?);
            return Ok(());
        }

        let result = self.run(&event).await;
        let task = match &result {
            Ok(outcome) => TaskResult::succeeded(&event, describe(outcome)),
            Err(e) => TaskResult::failed(&event, e),
        };
        println!("{}", serde_json::to_string_pretty(&task)?);
        result.map(drop)
    }

    async fn run(&self, event: &TriggerEvent) -> Result<PromotionOutcome> {
        let settings = Settings::load()?.service_settings();
        let (config, _) =
            super::config::load_resolved_config(&self.config_dir, event, &self.next_stage)?;
        let fields = FieldMap::from_event(event)?;
        let promoter = self.promoter(&config, &settings)?;

        let repository = config.repo()?;
        let branch = event.branch_name(&self.next_stage);
        let title = event.pull_request_title(&self.next_stage);
        let body = event.pull_request_body(&settings.external_url);

        info!(repository, branch = %branch, "Promoting {} path(s)", config.spec.paths.len());
        promoter
            .promote(PromotionRequest {
                repository,
                fields: &fields,
                source_branch: &self.source_branch,
                target_branch: &branch,
                title: &title,
                body: &body,
                paths: &config.spec.paths,
            })
            .await
            .with_context(|| format!("{} strategy failed on {repository}", config.strategy()))
    }

    fn promoter(&self, config: &PromotionConfig, settings: &ServiceSettings) -> Result<Promoter> {
        if let Some(secret) = config.spec.target.secret.as_deref() {
            debug!(secret, "Access token is read from the environment");
        }
        let github = GitHubConfig::for_repository(
            config.repo()?,
            &settings.api_url,
            settings.access_token.clone(),
        )?
        .with_author(settings.author.clone());
        let client = GitHubClient::new(github)?;

        let options = PromoterOptions {
            no_change_policy: if self.skip_unchanged {
                NoChangePolicy::SkipMapping
            } else {
                NoChangePolicy::AbortPromotion
            },
        };
        Ok(Promoter::new(
            Box::new(client),
            ContentReplacer::new(self.namespace.as_str()),
            options,
        ))
    }
}

fn describe(outcome: &PromotionOutcome) -> String {
    match outcome.pull_request_url() {
        Some(url) => format!("{outcome} {url}"),
        None => outcome.to_string(),
    }
}
