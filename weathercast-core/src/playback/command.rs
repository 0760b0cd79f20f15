use std::process::Stdio;

use async_trait::async_trait;
use tokio::{process::Command, sync::watch};
use tracing::debug;

use super::{SpeechControl, SpeechEngine, stop_requested};
use crate::error::EngineError;

/// Speaks through an external TTS program, passing the text as the last argument.
/// The program cannot pause; a pause request only holds the controller state.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl SpeechEngine for CommandEngine {
    async fn init(&self) -> Result<(), EngineError> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{}: {e}", self.program)))?;

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Unavailable(format!(
                "{} --version exited with {status}",
                self.program
            )))
        }
    }

    async fn speak(
        &self,
        text: &str,
        mut control: watch::Receiver<SpeechControl>,
    ) -> Result<(), EngineError> {
        if *control.borrow() == SpeechControl::Stop {
            debug!(program = %self.program, "utterance stopped before start");
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Synthesis(format!("{}: {e}", self.program)))?;

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            () = stop_requested(&mut control) => None,
        };

        let Some(status) = exited else {
            debug!(program = %self.program, "killing speech process");
            let _ = child.kill().await;
            return Ok(());
        };

        let status = status.map_err(|e| EngineError::Synthesis(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Synthesis(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }

    fn release(&self) {
        debug!(program = %self.program, "external engine released");
    }
}
