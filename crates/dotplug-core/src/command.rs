//! Command execution for build and install steps.
//!
//! Each command string is rendered in two passes: build flags first, then
//! descriptor fields. `{{` and `}}` produce literal braces and `${...}` is
//! handed to the shell untouched. Commands run through `sh -c` with an
//! explicit environment and working directory; the process's own working
//! directory is never changed.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{CommandPolicy, Config, expand_vars};
use crate::descriptor::{AppDescriptor, CommandBlock};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown placeholder {{{placeholder}}} in `{command}`")]
    UnknownPlaceholder {
        placeholder: String,
        command: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", exit_label(.code))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\$\{[^}]*\}|\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .expect("placeholder pattern is valid")
});

/// Descriptor fields available to command templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars(BTreeMap<&'static str, String>);

impl TemplateVars {
    /// Every field name a template may reference.
    pub const FIELDS: [&'static str; 8] = [
        "name", "version", "dest", "archive", "scratch", "url", "build", "type",
    ];

    /// Collect the fields of `app` under `config`. Fields that do not apply
    /// to the build kind render as empty strings.
    pub fn for_app(app: &AppDescriptor, config: &Config) -> Self {
        let path = |p: Option<PathBuf>| p.map(|p| p.display().to_string()).unwrap_or_default();
        let mut vars = BTreeMap::new();
        vars.insert("name", app.name.to_string());
        vars.insert("version", app.version.to_string());
        vars.insert("dest", app.install_dest(config).display().to_string());
        vars.insert("archive", path(app.archive_path(config)));
        vars.insert("scratch", app.scratch_dir(config).display().to_string());
        vars.insert("url", app.url().unwrap_or_default());
        vars.insert("build", app.build.to_string());
        vars.insert(
            "type",
            app.archive_type.map(|t| t.to_string()).unwrap_or_default(),
        );
        Self(vars)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Render descriptor fields only.
    pub fn render(&self, template: &str) -> Result<String, CommandError> {
        render(template, &BTreeMap::new(), self)
    }
}

/// Substitute build flags, then descriptor fields, into `template`.
pub fn render(
    template: &str,
    flags: &BTreeMap<String, Vec<String>>,
    vars: &TemplateVars,
) -> Result<String, CommandError> {
    let with_flags = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match caps.get(1).and_then(|name| flags.get(name.as_str())) {
            Some(values) => values.join(" "),
            None => caps[0].to_string(),
        }
    });

    let mut out = String::with_capacity(with_flags.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(&with_flags) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&with_flags[last..whole.start]);
        match (&caps[0], caps.get(1)) {
            ("{{", _) => out.push('{'),
            ("}}", _) => out.push('}'),
            (_, Some(name)) => match vars.get(name.as_str()) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(CommandError::UnknownPlaceholder {
                        placeholder: name.as_str().to_string(),
                        command: template.to_string(),
                    });
                }
            },
            (shell, None) => out.push_str(shell),
        }
        last = whole.end;
    }
    out.push_str(&with_flags[last..]);
    Ok(out)
}

/// Where a block of commands runs and what its templates can see.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Directory that block `cwd` values are relative to.
    pub base_dir: PathBuf,
    pub vars: TemplateVars,
}

/// Runs command blocks sequentially under a fixed policy and environment.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    policy: CommandPolicy,
    env: BTreeMap<String, String>,
    log_path: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            policy: config.command_policy,
            env: config.env.clone(),
            log_path: None,
        }
    }

    /// Append command output to `path` instead of discarding it.
    pub fn with_log(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Run every command of every block, in order.
    pub async fn run(&self, blocks: &[CommandBlock], ctx: &CommandContext) -> Result<(), CommandError> {
        for block in blocks {
            let env = self.block_env(block);
            let cwd = match &block.cwd {
                Some(rel) => ctx.base_dir.join(rel),
                None => ctx.base_dir.clone(),
            };

            for raw in &block.cmds {
                let command = render(raw, &block.flags, &ctx.vars)?;
                self.run_one(&command, &env, &cwd).await?;
            }
        }
        Ok(())
    }

    /// The configured environment plus the block's overrides, expanded
    /// against it.
    fn block_env(&self, block: &CommandBlock) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        for (key, value) in &block.env {
            let expanded = expand_vars(value, &self.env);
            env.insert(key.clone(), expanded);
        }
        env
    }

    async fn run_one(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
        cwd: &Path,
    ) -> Result<(), CommandError> {
        debug!(command, cwd = %cwd.display(), "running");

        let (stdout, stderr) = self.output_sinks(command)?;
        let status = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .env_clear()
            .envs(env)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            return Ok(());
        }

        let code = status.code();
        if let Some(log) = &self.log_path {
            if let Ok(tail) = read_last_lines(log, 20) {
                warn!("`{command}` failed, last lines of {}:\n{tail}", log.display());
            }
        }

        match self.policy {
            CommandPolicy::FailFast => Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code,
            }),
            CommandPolicy::BestEffort => {
                warn!("`{command}` exited with {}, continuing", exit_label(&code));
                Ok(())
            }
        }
    }

    fn output_sinks(&self, command: &str) -> Result<(Stdio, Stdio), CommandError> {
        let Some(path) = &self.log_path else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(log, "$ {command}")?;
        Ok((Stdio::from(log.try_clone()?), Stdio::from(log)))
    }
}

/// Read the last N lines of a build log without loading all of it.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    let buffer = String::from_utf8_lossy(&buffer);

    // Seeking mid-file leaves a partial first line.
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&*buffer, |idx| &buffer[idx + 1..])
    } else {
        &buffer
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
