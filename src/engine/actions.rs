// src/engine/actions.rs

//! The three rule actions: cascade, submit and command.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::engine::dispatcher::TriggerEngine;
use crate::engine::expand::PlaceholderMap;
use crate::errors::{Result, TriggerError};
use crate::exec::{CommandContext, CommandOp, PendingJobRecord};
use crate::rules::{Action, TriggerRule};
use crate::types::Change;
use crate::watch::event::Event;
use crate::watch::path_utils::{confined_join, relative_str, slash_str};
use crate::watch::patterns::expand_glob;

impl TriggerEngine {
    /// `path` relative to the data directory of the rule's workspace; the
    /// full path when it lies elsewhere.
    pub fn relative_path(&self, rule: &TriggerRule, path: &Path) -> String {
        relative_str(&self.config.data_dir_of(&rule.workspace), path)
            .unwrap_or_else(|| slash_str(path))
    }

    pub(super) async fn run_action(self: &Arc<Self>, event: &Event, rule: &TriggerRule) -> Result<()> {
        let rel = self.relative_path(rule, &event.path);
        let placeholders = PlaceholderMap::new(&rel, rule, event.change);
        match rule.action {
            Action::Cascade(change) => self.cascade(event, rule, change, &placeholders).await,
            Action::Submit => self.submit_jobs(event, rule, &rel, &placeholders).await,
            Action::Command(op) => self.run_command(rule, op, &rel, &placeholders).await,
        }
    }

    async fn cascade(
        self: &Arc<Self>,
        event: &Event,
        rule: &TriggerRule,
        change: Change,
        placeholders: &PlaceholderMap,
    ) -> Result<()> {
        let data_dir = self.config.data_dir_of(&rule.workspace);
        let audit = self.audit_log(&rule.workspace);

        for argument in &rule.arguments {
            let pattern = placeholders.fill(argument);
            if confined_join(&data_dir, &pattern).is_none() {
                warn!(rule_id = %rule.rule_id, %pattern, "cascade target escapes workspace; skipping");
                audit.warning(&format!("refusing cascade target outside workspace: {pattern}"));
                continue;
            }
            if pattern != *argument {
                audit.info(&format!("expanded argument {argument} to {pattern}"));
            }

            for path in expand_glob(self.backends.fs.as_ref(), &data_dir, &pattern)? {
                let rel = self.relative_path(rule, &path);
                if event.chain_contains(&path, change) {
                    let chain: Vec<String> = event
                        .chain_or_origin()
                        .iter()
                        .map(|(p, c)| format!("{} {c}", self.relative_path(rule, p)))
                        .collect();
                    warn!(
                        rule_id = %rule.rule_id,
                        path = %rel,
                        %change,
                        chain = %chain.join(" -> "),
                        "breaking trigger cycle"
                    );
                    audit.warning(&format!(
                        "breaking trigger cycle {} -> {rel} {change}",
                        chain.join(" -> ")
                    ));
                    continue;
                }

                info!(rule_id = %rule.rule_id, path = %rel, %change, "cascading event");
                audit.info(&format!("trigger {change} event on {rel}"));
                let is_dir = self.backends.fs.is_dir(&path);
                let child = Event::cascaded(path, change, is_dir, event.chain_or_origin());
                self.ingest(child).await;
            }
        }
        Ok(())
    }

    async fn submit_jobs(
        &self,
        event: &Event,
        rule: &TriggerRule,
        rel: &str,
        placeholders: &PlaceholderMap,
    ) -> Result<()> {
        let audit = self.audit_log(&rule.workspace);
        let home = self.config.workspace_home_of(&rule.workspace);

        for template in &rule.templates {
            let description = placeholders.fill(template);
            let receipt = self.backends.jobs.submit(description, &rule.run_as).await?;

            let record = PendingJobRecord {
                job_id: &receipt.job_id,
                owner: &rule.run_as,
                event: event.into(),
                rule,
            };
            match record.write(self.backends.fs.as_ref(), &home) {
                Ok(path) => debug!(job_id = %receipt.job_id, path = %path.display(), "pending job recorded"),
                Err(err) => warn!(job_id = %receipt.job_id, error = %err, "could not record pending job"),
            }

            info!(
                workspace = %rule.workspace,
                rule_id = %rule.rule_id,
                job_id = %receipt.job_id,
                path = %rel,
                "submitted job"
            );
            audit.info(&format!("submitted job for {rel}: {}", receipt.message));
        }
        Ok(())
    }

    async fn run_command(
        &self,
        rule: &TriggerRule,
        op: CommandOp,
        rel: &str,
        placeholders: &PlaceholderMap,
    ) -> Result<()> {
        let audit = self.audit_log(&rule.workspace);
        let args: Vec<String> = rule
            .action_arguments()
            .iter()
            .map(|arg| placeholders.fill(arg))
            .collect();
        let ctx = CommandContext {
            workspace: rule.workspace.clone(),
            rule_id: rule.rule_id.clone(),
            run_as: rule.run_as.clone(),
            data_dir: self.config.data_dir_of(&rule.workspace),
        };

        let outcome = self.backends.commands.run(op, args.clone(), &ctx).await?;
        let line = format!("{op} {}", args.join(" "));
        if outcome.success() {
            info!(rule_id = %rule.rule_id, path = %rel, command = %line, "command succeeded");
            audit.info(&format!("ran {line} for {rel}: {}", outcome.output));
            Ok(())
        } else {
            Err(TriggerError::CommandError(format!(
                "{line} exited with {}: {}",
                outcome.exit_status, outcome.output
            )))
        }
    }
}
