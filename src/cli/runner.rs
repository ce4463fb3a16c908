//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::engine::ExtractionRunner;
use crate::error::{Error, Result};
use crate::output::{CloudDestination, LandingWriter};
use crate::resolver::{LatestRunResolver, RunScope, SelectionPolicy};
use crate::run::{RunId, RunLedger};
use crate::source::{catalog, select_entities, EntitySpec};
use crate::state::{ObjectWatermarkStore, WatermarkStore};
use crate::types::Source;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use tracing::{error, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command, returning the process exit code
    pub async fn run(&self) -> Result<i32> {
        let config = self.load_config()?;
        match &self.cli.command {
            Commands::Extract {
                source,
                entities,
                run_id,
            } => self.extract(&config, *source, entities, run_id.clone()).await,
            Commands::Resolve {
                source,
                entity,
                scope,
                policy,
                max_bad_records,
            } => {
                self.resolve(&config, *source, entity, *scope, *policy, *max_bad_records)
                    .await
            }
            Commands::Watermarks { source } => self.watermarks(&config, *source).await,
            Commands::Runs { source, entity } => self.runs(&config, *source, entity).await,
            Commands::Entities { source } => self.entities(&config, *source),
        }
    }

    /// Config file, then environment, then flags
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.cli.config.as_deref())?.with_env();
        if let Some(destination) = &self.cli.destination {
            config.destination = Some(destination.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Catalog of a source with configured page sizes applied
    fn entity_catalog(&self, config: &PipelineConfig, source: Source) -> Vec<EntitySpec> {
        catalog(source)
            .iter()
            .map(|e| match source {
                Source::Crm => e.with_page_size(config.crm.page_size),
                Source::Tracking => match config.tracking.page_size_overrides.get(e.name) {
                    Some(size) => e.with_page_size(*size),
                    None => *e,
                },
            })
            .collect()
    }

    fn find_entity(&self, config: &PipelineConfig, source: Source, name: &str) -> Result<EntitySpec> {
        self.entity_catalog(config, source)
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::unknown_entity(source.as_str(), name))
    }

    /// Extract a source
    async fn extract(
        &self,
        config: &PipelineConfig,
        source: Source,
        entities: &[String],
        run_id: Option<RunId>,
    ) -> Result<i32> {
        let destination = config.destination()?;
        let client = config.source_client(source)?;
        let selected = select_entities(&client.entities(), entities, source.as_str())?;
        let run_id = run_id.unwrap_or_else(RunId::now);

        let writer = LandingWriter::new(destination.clone());
        let watermarks = ObjectWatermarkStore::new(destination.clone());
        let ledger = RunLedger::new(destination.clone());

        info!(
            %source,
            run_id = %run_id,
            destination = %destination.display_path(""),
            "Extract command"
        );

        let report = ExtractionRunner::new(client.as_ref(), &writer, &watermarks, &ledger, run_id)
            .with_config(config.runner_config())
            .run(&selected)
            .await?;

        for failed in report.failed() {
            error!(
                %source,
                entity = %failed.entity_type,
                error = failed.error.as_deref().unwrap_or("unknown"),
                "Entity type failed"
            );
        }
        self.emit(&report)?;
        Ok(report.exit_code())
    }

    /// Resolve an entity type to NDJSON on stdout
    async fn resolve(
        &self,
        config: &PipelineConfig,
        source: Source,
        entity: &str,
        scope: RunScope,
        policy: SelectionPolicy,
        max_bad_records: Option<usize>,
    ) -> Result<i32> {
        let spec = self.find_entity(config, source, entity)?;
        let mut resolver_config = config
            .resolver_config(&spec)
            .with_scope(scope)
            .with_policy(policy);
        if let Some(max) = max_bad_records {
            resolver_config = resolver_config.with_max_bad_records(max);
        }

        let resolution = LatestRunResolver::new(config.destination()?)
            .resolve(source, entity, &resolver_config)
            .await?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in &resolution.records {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }
        out.flush()?;
        Ok(0)
    }

    /// Print the watermark of every entity type
    async fn watermarks(&self, config: &PipelineConfig, source: Source) -> Result<i32> {
        let store = ObjectWatermarkStore::new(config.destination()?);
        for entity in self.entity_catalog(config, source) {
            let watermark = store.get(source, entity.name).await?;
            self.emit(&json!({
                "source": source,
                "entity_type": entity.name,
                "watermark": watermark,
            }))?;
        }
        Ok(0)
    }

    /// Print the run ledger of an entity type, oldest first
    async fn runs(&self, config: &PipelineConfig, source: Source, entity: &str) -> Result<i32> {
        self.find_entity(config, source, entity)?;
        let destination: CloudDestination = config.destination()?;
        for run in RunLedger::new(destination).list(source, entity).await? {
            self.emit(&run)?;
        }
        Ok(0)
    }

    /// Print the entity catalog
    fn entities(&self, config: &PipelineConfig, source: Source) -> Result<i32> {
        for entity in self.entity_catalog(config, source) {
            self.emit(&json!({
                "name": entity.name,
                "resource": entity.resource,
                "sync_mode": entity.sync_mode,
                "page_size": entity.page_size,
                "depends_on": entity.depends_on,
            }))?;
        }
        Ok(0)
    }

    /// One JSON document per line, pretty-printed when verbose
    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = if self.cli.verbose {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn runner(args: &[&str]) -> Runner {
        Runner::new(Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "saas-landing",
            "extract",
            "tracking",
            "--entities",
            "tasks,lists",
            "--run-id",
            "20240102T030405Z",
        ])
        .unwrap();
        match cli.command {
            Commands::Extract {
                source,
                entities,
                run_id,
            } => {
                assert_eq!(source, Source::Tracking);
                assert_eq!(entities, vec!["tasks".to_string(), "lists".to_string()]);
                assert_eq!(run_id.unwrap().as_str(), "20240102T030405Z");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_run_id() {
        let result =
            Cli::try_parse_from(["saas-landing", "extract", "crm", "--run-id", "2024-01-02"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_resolve_defaults() {
        let cli = Cli::try_parse_from(["saas-landing", "resolve", "crm", "deals"]).unwrap();
        match cli.command {
            Commands::Resolve {
                scope,
                policy,
                max_bad_records,
                ..
            } => {
                assert_eq!(scope, RunScope::LatestRun);
                assert_eq!(policy, SelectionPolicy::LatestSuccessful);
                assert_eq!(max_bad_records, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_source() {
        assert!(Cli::try_parse_from(["saas-landing", "entities", "salesforce"]).is_err());
    }

    #[test]
    fn test_entity_catalog_applies_page_sizes() {
        let runner = runner(&["saas-landing", "entities", "tracking"]);
        let mut config = PipelineConfig::default();
        config.tracking.page_size_overrides.insert("tasks".into(), 7);
        config.crm.page_size = 40;

        let tasks = runner.find_entity(&config, Source::Tracking, "tasks").unwrap();
        assert_eq!(tasks.page_size, 7);
        let deals = runner.find_entity(&config, Source::Crm, "deals").unwrap();
        assert_eq!(deals.page_size, 40);
        assert!(matches!(
            runner.find_entity(&config, Source::Crm, "tickets"),
            Err(Error::UnknownEntity { .. })
        ));
    }

    #[tokio::test]
    async fn test_runs_requires_destination() {
        let runner = runner(&["saas-landing", "runs", "crm", "deals"]);
        let err = runner
            .runs(&PipelineConfig::default(), Source::Crm, "deals")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { .. }));
    }

    #[tokio::test]
    async fn test_extract_without_token_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.destination = Some(dir.path().to_string_lossy().to_string());
        config.tracking.token_env = "SAAS_LANDING_TEST_UNSET_TOKEN".into();

        let runner = runner(&["saas-landing", "extract", "tracking"]);
        let err = runner
            .extract(&config, Source::Tracking, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
