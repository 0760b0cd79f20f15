use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, watch},
};

use super::{SpeechControl, SpeechEngine};
use crate::error::EngineError;

type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// Prints the utterance word by word at a speaking pace.
pub struct ConsoleEngine {
    out: Mutex<Output>,
    word_delay: Duration,
}

impl ConsoleEngine {
    pub fn stdout(words_per_minute: u32) -> Self {
        Self::with_writer(Box::new(tokio::io::stdout()), words_per_minute)
    }

    pub fn with_writer(out: Output, words_per_minute: u32) -> Self {
        Self {
            out: Mutex::new(out),
            word_delay: Duration::from_millis(60_000 / u64::from(words_per_minute.max(1))),
        }
    }
}

fn io_failure(e: std::io::Error) -> EngineError {
    EngineError::Synthesis(e.to_string())
}

#[async_trait]
impl SpeechEngine for ConsoleEngine {
    async fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn speak(
        &self,
        text: &str,
        mut control: watch::Receiver<SpeechControl>,
    ) -> Result<(), EngineError> {
        // Held for the whole utterance so a stopped one finishes its line
        // before the next starts printing.
        let mut out = self.out.lock().await;

        for (i, word) in text.split_whitespace().enumerate() {
            loop {
                let current = *control.borrow_and_update();
                match current {
                    SpeechControl::Play => break,
                    SpeechControl::Pause => {
                        if control.changed().await.is_err() {
                            return Ok(());
                        }
                    }
                    SpeechControl::Stop => {
                        out.write_all(b"\n").await.map_err(io_failure)?;
                        return out.flush().await.map_err(io_failure);
                    }
                }
            }

            if i > 0 {
                out.write_all(b" ").await.map_err(io_failure)?;
            }
            out.write_all(word.as_bytes()).await.map_err(io_failure)?;
            out.flush().await.map_err(io_failure)?;
            tokio::time::sleep(self.word_delay).await;
        }

        out.write_all(b"\n").await.map_err(io_failure)?;
        out.flush().await.map_err(io_failure)
    }

    fn release(&self) {}
}
