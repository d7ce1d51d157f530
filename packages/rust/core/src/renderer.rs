//! Markup-to-HTML rendering.
//!
//! The renderer is an external tool. [`Renderer`] is the seam the batch
//! pipeline calls through; [`CommandRenderer`] shells out to the configured
//! executable (`raml2html` by default).

use std::path::Path;
use std::process::Command;

use tracing::{debug, info, instrument};

use ramlpreparer_shared::{PreparerError, RendererConfig, Result};

/// Turns one source document into a complete HTML page.
pub trait Renderer: Send + Sync {
    /// Render `source` into the HTML file `output`.
    fn render(&self, source: &Path, output: &Path) -> Result<()>;
}

/// Runs an external renderer as `<command> <source> -o <output>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    config: RendererConfig,
}

impl CommandRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Version string reported by the renderer, if it can be run.
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.config.command)
            .arg("--version")
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Make sure the renderer is available, installing it if it is not.
    ///
    /// Safe to call repeatedly: nothing is installed when the version check
    /// already succeeds. Returns the renderer's version.
    #[instrument(skip(self), fields(command = %self.config.command))]
    pub fn setup(&self) -> Result<String> {
        if let Some(version) = self.version() {
            info!(%version, "renderer found");
            return Ok(version);
        }

        let Some((program, args)) = self.config.install_command.split_first() else {
            return Err(PreparerError::Render(format!(
                "`{}` not found and no install command is configured",
                self.config.command
            )));
        };

        info!(install = %self.config.install_command.join(" "), "installing renderer");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| PreparerError::Render(format!("failed to run `{program}`: {e}")))?;
        if !status.success() {
            return Err(PreparerError::Render(format!(
                "`{}` exited with {status}",
                self.config.install_command.join(" ")
            )));
        }

        self.version().ok_or_else(|| {
            PreparerError::Render(format!(
                "`{}` still unavailable after install",
                self.config.command
            ))
        })
    }
}

impl Renderer for CommandRenderer {
    #[instrument(skip(self), fields(source = %source.display()))]
    fn render(&self, source: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.config.command)
            .arg(source)
            .arg("-o")
            .arg(output)
            .output()
            .map_err(|e| {
                PreparerError::Render(format!(
                    "failed to run `{}`: {e}. Try `ramlpreparer setup`",
                    self.config.command
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PreparerError::Render(format!(
                "`{}` failed on {} ({}): {}",
                self.config.command,
                source.display(),
                result.status,
                stderr.trim()
            )));
        }

        check_output(output)?;
        debug!(output = %output.display(), "rendered");
        Ok(())
    }
}

/// A renderer that exits cleanly but leaves nothing behind still failed.
pub(crate) fn check_output(output: &Path) -> Result<()> {
    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(PreparerError::Render(format!(
            "renderer produced an empty file at {}",
            output.display()
        ))),
        Err(_) => Err(PreparerError::Render(format!(
            "renderer produced no file at {}",
            output.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;

    fn renderer(command: &str, install: &[&str]) -> CommandRenderer {
        CommandRenderer::new(RendererConfig {
            command: command.into(),
            install_command: install.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn missing_executable_is_render_error() {
        let root = temp_dir("renderer-missing");
        let r = renderer("ramlpreparer-no-such-renderer", &[]);
        let err = r
            .render(&root.join("a.raml"), &root.join("a.html"))
            .unwrap_err();
        assert!(matches!(err, PreparerError::Render(_)));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn setup_without_install_command_fails() {
        let r = renderer("ramlpreparer-no-such-renderer", &[]);
        let err = r.setup().unwrap_err();
        assert!(err.to_string().contains("no install command"));
    }

    #[test]
    fn setup_reports_failed_install() {
        let r = renderer("ramlpreparer-no-such-renderer", &["ramlpreparer-no-such-installer"]);
        assert!(matches!(r.setup(), Err(PreparerError::Render(_))));
    }

    #[test]
    fn empty_or_absent_output_is_render_error() {
        let root = temp_dir("renderer-output");
        let out = root.join("out.html");
        assert!(check_output(&out).is_err());

        std::fs::write(&out, "").unwrap();
        assert!(check_output(&out).unwrap_err().to_string().contains("empty"));

        std::fs::write(&out, "<html></html>").unwrap();
        assert!(check_output(&out).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }
}
