//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, ExportKind, MessageFormat};
use crate::client::{BatchReport, ResearchClient};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::output::{export_comments, export_videos, get_video_ids, ExportFormat, ExportSummary};
use crate::pagination::FetchOutcome;
use crate::query::Mode;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Videos {
                mode,
                entities,
                start_date,
                end_date,
                filter_hashtags,
                regions,
                limit,
            } => {
                self.videos(
                    mode,
                    entities,
                    start_date,
                    end_date,
                    filter_hashtags,
                    regions,
                    *limit,
                )
                .await
            }
            Commands::Comments {
                video_ids,
                from_videos,
            } => self.comments(video_ids, from_videos.as_deref()).await,
            Commands::Export {
                kind,
                table_format,
                output,
                no_join,
            } => self.export(*kind, table_format, output.as_deref(), *no_join),
            Commands::Token => self.token().await,
        }
    }

    /// Load configuration from file and environment
    fn load_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.cli.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        config.apply_env();
        if let Some(root) = &self.cli.output_dir {
            config.output.root.clone_from(root);
        }
        Ok(config)
    }

    /// Fetch videos
    #[allow(clippy::too_many_arguments)]
    async fn videos(
        &self,
        mode: &str,
        entities: &[String],
        start_date: &str,
        end_date: &str,
        filter_hashtags: &[String],
        regions: &[String],
        limit: Option<usize>,
    ) -> Result<()> {
        // Reject a bad mode before touching config or network
        let mode: Mode = mode.parse()?;
        let client = ResearchClient::new(self.load_config()?)?;

        // Accounts are fetched one by one; hashtags are one combined query
        let groups: Vec<Vec<String>> = match mode {
            Mode::Username => entities.iter().map(|e| vec![e.clone()]).collect(),
            Mode::Hashtag => vec![entities.to_vec()],
        };

        let queries = groups
            .into_iter()
            .map(|group| {
                client
                    .video_query(mode, group, start_date, end_date)
                    .filter_hashtags(filter_hashtags.iter().cloned())
                    .regions(regions.iter().cloned())
                    .result_ceiling(limit)
            })
            .collect::<Vec<_>>();

        // Validate every query up front so a typo fails fast
        for query in &queries {
            query.build()?;
        }

        // Bad credentials fail the whole run, not each entity
        client.authenticate().await?;

        let started = Instant::now();
        let report = client.fetch_videos_batch(&queries).await;
        self.report_batch("videos", &report, started);
        Self::batch_result(&report)
    }

    /// Fetch comments
    async fn comments(&self, video_ids: &[String], from_videos: Option<&Path>) -> Result<()> {
        let config = self.load_config()?;

        let ids = if video_ids.is_empty() {
            let dir = from_videos.map_or_else(|| config.output.videos_path(), Path::to_path_buf);
            let ids = get_video_ids(&dir)?;
            self.output_message(&json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!("Found {} video ids in {}", ids.len(), dir.display())
                }
            }));
            ids
        } else {
            video_ids.to_vec()
        };

        if ids.is_empty() {
            return Err(Error::invalid_query("no video ids to fetch comments for"));
        }

        let client = ResearchClient::connect(config).await?;
        let started = Instant::now();
        let report = client.fetch_comments_batch(&ids).await;
        self.report_batch("comments", &report, started);
        Self::batch_result(&report)
    }

    /// Export documents
    fn export(
        &self,
        kind: ExportKind,
        table_format: &str,
        output: Option<&Path>,
        no_join: bool,
    ) -> Result<()> {
        let format: ExportFormat = table_format.parse()?;
        let config = self.load_config()?;
        let paths = &config.output;

        let (stem, summary) = match kind {
            ExportKind::Videos => {
                let target = output.map_or_else(
                    || paths.export_path("video_data", format.extension()),
                    Path::to_path_buf,
                );
                ("video_data", export_videos(&paths.videos_path(), &target, format)?)
            }
            ExportKind::Comments => {
                let target = output.map_or_else(
                    || paths.export_path("comments_data", format.extension()),
                    Path::to_path_buf,
                );
                let videos = paths.videos_path();
                let join = (!no_join && videos.is_dir()).then_some(videos.as_path());
                (
                    "comments_data",
                    export_comments(&paths.comments_path(), join, &target, format)?,
                )
            }
        };

        self.output_message(&export_message(stem, summary.as_ref()));
        Ok(())
    }

    /// Request a token
    async fn token(&self) -> Result<()> {
        let client = ResearchClient::connect(self.load_config()?).await?;
        let credential = client
            .tokens()
            .current()
            .await
            .ok_or_else(|| Error::auth("no token after refresh"))?;

        self.output_message(&json!({
            "type": "TOKEN",
            "token": {
                "issued_at": credential.issued_at.to_rfc3339(),
                "expires_at": credential.expires_at().to_rfc3339()
            }
        }));
        Ok(())
    }

    fn report_batch(&self, what: &str, report: &BatchReport, started: Instant) {
        for outcome in &report.outcomes {
            self.output_message(&outcome_message(outcome));
        }
        for failure in &report.failures {
            self.output_message(&json!({
                "type": "FAILURE",
                "failure": {
                    "entity": failure.entity,
                    "error": failure.error
                }
            }));
        }
        for entity in &report.skipped {
            self.output_message(&json!({
                "type": "FAILURE",
                "failure": {
                    "entity": entity,
                    "error": "skipped after authentication failure"
                }
            }));
        }
        self.output_message(&json!({
            "type": "SUMMARY",
            "summary": {
                "kind": what,
                "entities": report.outcomes.len() + report.failures.len() + report.skipped.len(),
                "items": report.total_items(),
                "aborted": report.aborted().count(),
                "failed": report.failures.len(),
                "skipped": report.skipped.len(),
                "elapsed_ms": started.elapsed().as_millis() as u64
            }
        }));
    }

    fn batch_result(report: &BatchReport) -> Result<()> {
        if report.failures.is_empty() && report.skipped.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "{} of {} entities failed",
                report.failures.len() + report.skipped.len(),
                report.outcomes.len() + report.failures.len() + report.skipped.len()
            )))
        }
    }

    /// Print a message in the selected format
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            MessageFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            MessageFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn outcome_message(outcome: &FetchOutcome) -> Value {
    json!({
        "type": "FETCH",
        "fetch": {
            "entity": outcome.entity,
            "status": outcome.status.to_string(),
            "aborted": outcome.is_aborted(),
            "pages": outcome.pages,
            "items": outcome.len(),
            "path": outcome.output_path.as_ref().map(|p| p.display().to_string())
        }
    })
}

fn export_message(stem: &str, summary: Option<&ExportSummary>) -> Value {
    match summary {
        Some(summary) => json!({
            "type": "EXPORT",
            "export": {
                "table": stem,
                "path": summary.path.display().to_string(),
                "rows": summary.rows,
                "columns": summary.columns
            }
        }),
        None => json!({
            "type": "EXPORT",
            "export": {
                "table": stem,
                "path": Value::Null,
                "rows": 0,
                "columns": 0
            }
        }),
    }
}
