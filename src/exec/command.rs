// src/exec/command.rs

//! Built-in command backend: a closed set of file operations confined to
//! the rule's workspace data directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{Result, TriggerError};
use crate::exec::backend::{BoxFuture, CommandBackend, CommandContext, CommandOutcome};
use crate::fs::FileSystem;
use crate::watch::path_utils::confined_join;

/// Operations a `command` rule may name as its first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOp {
    Touch,
    Mkdir,
    Rm,
    Cp,
    Mv,
    Truncate,
}

impl CommandOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOp::Touch => "touch",
            CommandOp::Mkdir => "mkdir",
            CommandOp::Rm => "rm",
            CommandOp::Cp => "cp",
            CommandOp::Mv => "mv",
            CommandOp::Truncate => "truncate",
        }
    }
}

impl fmt::Display for CommandOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "touch" => Ok(CommandOp::Touch),
            "mkdir" => Ok(CommandOp::Mkdir),
            "rm" => Ok(CommandOp::Rm),
            "cp" => Ok(CommandOp::Cp),
            "mv" => Ok(CommandOp::Mv),
            "truncate" => Ok(CommandOp::Truncate),
            other => Err(format!(
                "unknown command operation '{other}' (expected touch, mkdir, rm, cp, mv or truncate)"
            )),
        }
    }
}

/// Performs [`CommandOp`]s through the `FileSystem` trait.
#[derive(Debug, Clone)]
pub struct BuiltinCommandBackend {
    fs: Arc<dyn FileSystem>,
}

impl BuiltinCommandBackend {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn resolve(&self, ctx: &CommandContext, arg: &str) -> Result<PathBuf> {
        confined_join(&ctx.data_dir, arg).ok_or_else(|| {
            TriggerError::CommandError(format!(
                "path '{arg}' escapes workspace '{}'",
                ctx.workspace
            ))
        })
    }

    /// Destination for cp/mv: into an existing directory keeps the name.
    fn destination(&self, src: &Path, dst: PathBuf) -> PathBuf {
        match src.file_name() {
            Some(name) if self.fs.is_dir(&dst) => dst.join(name),
            _ => dst,
        }
    }

    /// Apply a single-path operation. Removing a missing path is not an
    /// error; the returned note says so.
    fn apply_single(&self, op: CommandOp, path: &Path) -> anyhow::Result<&'static str> {
        match op {
            CommandOp::Touch => self.fs.touch(path)?,
            CommandOp::Mkdir => self.fs.create_dir_all(path)?,
            CommandOp::Truncate => self.fs.write(path, b"")?,
            CommandOp::Rm if !self.fs.exists(path) => return Ok(": already gone"),
            CommandOp::Rm if self.fs.is_dir(path) => self.fs.remove_dir_all(path)?,
            CommandOp::Rm => self.fs.remove_file(path)?,
            CommandOp::Cp | CommandOp::Mv => anyhow::bail!("{op} takes a source and a destination"),
        }
        Ok("")
    }

    fn execute(&self, op: CommandOp, args: &[String], ctx: &CommandContext) -> Result<CommandOutcome> {
        if args.is_empty() {
            return Err(TriggerError::CommandError(format!("{op} needs at least one path")));
        }

        let mut output = Vec::new();
        let mut failures = 0;

        match op {
            CommandOp::Cp | CommandOp::Mv => {
                if args.len() != 2 {
                    return Err(TriggerError::CommandError(format!(
                        "{op} needs exactly a source and a destination (got {} arguments)",
                        args.len()
                    )));
                }
                let src = self.resolve(ctx, &args[0])?;
                let dst = self.destination(&src, self.resolve(ctx, &args[1])?);
                let res = if op == CommandOp::Cp {
                    self.fs.copy(&src, &dst)
                } else {
                    self.fs.rename(&src, &dst)
                };
                match res {
                    Ok(()) => output.push(format!("{op} {} -> {}", args[0], args[1])),
                    Err(err) => {
                        failures += 1;
                        output.push(format!("{op} {} -> {} failed: {err:#}", args[0], args[1]));
                    }
                }
            }
            CommandOp::Touch | CommandOp::Mkdir | CommandOp::Rm | CommandOp::Truncate => {
                for arg in args {
                    let path = self.resolve(ctx, arg)?;
                    match self.apply_single(op, &path) {
                        Ok(note) => output.push(format!("{op} {arg}{note}")),
                        Err(err) => {
                            failures += 1;
                            output.push(format!("{op} {arg} failed: {err:#}"));
                        }
                    }
                }
            }
        }

        Ok(CommandOutcome {
            exit_status: if failures == 0 { 0 } else { 1 },
            output: output.join("\n"),
        })
    }
}

impl CommandBackend for BuiltinCommandBackend {
    fn run<'a>(
        &'a self,
        op: CommandOp,
        args: Vec<String>,
        ctx: &'a CommandContext,
    ) -> BoxFuture<'a, Result<CommandOutcome>> {
        Box::pin(async move {
            info!(
                workspace = %ctx.workspace,
                rule_id = %ctx.rule_id,
                run_as = %ctx.run_as,
                op = %op,
                ?args,
                "running command"
            );
            let outcome = self.execute(op, &args, ctx)?;
            debug!(exit_status = outcome.exit_status, output = %outcome.output, "command finished");
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn ctx() -> CommandContext {
        CommandContext {
            workspace: "Project".to_string(),
            rule_id: "r".to_string(),
            run_as: "alice".to_string(),
            data_dir: PathBuf::from("/data/Project"),
        }
    }

    #[tokio::test]
    async fn touch_and_rm_inside_workspace() -> Result<()> {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_dir("/data/Project");
        let backend = BuiltinCommandBackend::new(fs.clone());

        let out = backend
            .run(CommandOp::Touch, vec!["done.flag".to_string()], &ctx())
            .await?;
        assert!(out.success());
        assert!(fs.is_file(Path::new("/data/Project/done.flag")));

        let out = backend
            .run(
                CommandOp::Rm,
                vec!["done.flag".to_string(), "never-there".to_string()],
                &ctx(),
            )
            .await?;
        assert!(out.success());
        assert!(out.output.contains("already gone"));
        assert!(!fs.exists(Path::new("/data/Project/done.flag")));
        Ok(())
    }

    #[tokio::test]
    async fn escaping_path_is_rejected() {
        let fs = Arc::new(MockFileSystem::new());
        let backend = BuiltinCommandBackend::new(fs);
        let err = backend
            .run(CommandOp::Touch, vec!["../Other/x".to_string()], &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes workspace"));
    }

    #[tokio::test]
    async fn cp_into_directory_keeps_name() -> Result<()> {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/data/Project/in/a.csv", "1,2");
        fs.add_dir("/data/Project/archive");
        let backend = BuiltinCommandBackend::new(fs.clone());

        let out = backend
            .run(
                CommandOp::Cp,
                vec!["in/a.csv".to_string(), "archive".to_string()],
                &ctx(),
            )
            .await?;
        assert!(out.success());
        assert_eq!(
            fs.read_to_string(Path::new("/data/Project/archive/a.csv"))
                .map_err(TriggerError::from)?,
            "1,2"
        );
        Ok(())
    }

    #[test]
    fn op_names_parse() {
        assert_eq!("mv".parse::<CommandOp>(), Ok(CommandOp::Mv));
        assert!("chmod".parse::<CommandOp>().is_err());
    }
}
