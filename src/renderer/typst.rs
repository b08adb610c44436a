use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::{CompileError, config::RendererConfig};

/// Turns typst markup into PDF bytes.
pub trait PdfCompiler: Send + Sync {
    /// `root` is the directory absolute paths in the markup resolve against.
    fn compile(
        &self,
        markup: &str,
        root: Option<&Path>,
    ) -> impl Future<Output = Result<Vec<u8>, CompileError>> + Send;
}

/// Runs `typst compile` as a child process, markup in through stdin and the PDF out
/// through stdout.
#[derive(Debug, Clone)]
pub struct Typst {
    bin: PathBuf,
    font_paths: Vec<PathBuf>,
    timeout: Duration,
}

impl Typst {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            bin: config.typst_bin.clone(),
            font_paths: config.font_paths.clone(),
            timeout: config.compile_timeout,
        }
    }

    fn command(&self, root: Option<&Path>) -> Command {
        let mut command = Command::new(&self.bin);
        command.args(["compile", "--format", "pdf"]);
        if let Some(root) = root {
            command.arg("--root").arg(root);
        }
        for font_path in &self.font_paths {
            command.arg("--font-path").arg(font_path);
        }
        command
            .args(["-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, markup: &str, root: Option<&Path>) -> Result<Vec<u8>, CompileError> {
        let mut child = self
            .command(root)
            .spawn()
            .map_err(|error| CompileError::Spawn {
                program: self.bin.display().to_string(),
                error,
            })?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(markup.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(CompileError::Io)?;
        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            warn!(status = %output.status, %diagnostics, "typst failed");
            return Err(CompileError::Failed {
                status: output.status.to_string(),
                diagnostics,
            });
        }
        // A broken pipe only matters if typst didn't produce a document anyway.
        fed.map_err(CompileError::Io)?;
        debug!(bytes = output.stdout.len(), "typst finished");
        Ok(output.stdout)
    }
}

impl PdfCompiler for Typst {
    async fn compile(&self, markup: &str, root: Option<&Path>) -> Result<Vec<u8>, CompileError> {
        tokio::time::timeout(self.timeout, self.run(markup, root))
            .await
            .map_err(|_| CompileError::Timeout(self.timeout))?
    }
}
