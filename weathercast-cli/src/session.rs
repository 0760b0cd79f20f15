//! Line-oriented interactive session.
//!
//! One orchestrator and one playback controller live for the whole session;
//! every command goes through them.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use weathercast_core::{
    BroadcastTextGenerator, Config, PlaybackController, PlaybackState, WeatherOrchestrator,
    WidgetPublisher,
    location::LocationService,
    orchestrator::FetchHandle,
    playback::{self, PlaybackEvent},
    provider::provider_from_config,
};

use crate::{
    cli::{persist_selection, publisher},
    output,
};

const HELP: &str = "\
Commands:
  select <city>    fetch current weather and forecast
  refresh          re-fetch the selected city
  locate           use the device location
  search <query>   list matching places
  date <n>         show forecast day n (0 = today)
  clear            dismiss the error message
  speak            read the current weather aloud
  pause | resume | stop
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Select(String),
    Refresh,
    Locate,
    Search(String),
    Date(usize),
    Clear,
    Speak,
    Pause,
    Resume,
    Stop,
    Help,
    Quit,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let needs_arg = |what: &str| {
            if rest.is_empty() {
                Err(format!("`{word}` needs {what}"))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_lowercase().as_str() {
            "select" | "s" => needs_arg("a city").map(Self::Select),
            "refresh" | "r" => Ok(Self::Refresh),
            "locate" => Ok(Self::Locate),
            "search" => needs_arg("a query").map(Self::Search),
            "date" | "d" => rest
                .parse()
                .map(Self::Date)
                .map_err(|_| format!("`{word}` needs a day index, got {rest:?}")),
            "clear" => Ok(Self::Clear),
            "speak" => Ok(Self::Speak),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command `{other}`, try `help`")),
        }
    }
}

pub struct Session {
    orchestrator: WeatherOrchestrator,
    narrator: BroadcastTextGenerator,
    playback: PlaybackController,
    location: LocationService,
    publisher: Option<WidgetPublisher>,
}

impl Session {
    pub fn from_config(cfg: Config) -> anyhow::Result<Self> {
        let provider = provider_from_config(&cfg)?;
        Ok(Self {
            orchestrator: WeatherOrchestrator::new(provider, cfg.forecast_days),
            narrator: BroadcastTextGenerator::from_config(&cfg),
            playback: PlaybackController::new(playback::engine_from_config(&cfg.speech)),
            location: LocationService::from_config(&cfg.location),
            publisher: publisher(&cfg),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        println!("{HELP}");
        if let Err(e) = self.playback.initialize().await {
            println!("Speech unavailable ({e}); `speak` will retry.");
        }
        let events = tokio::spawn(report_playback(self.playback.subscribe()));

        if let Some(city) = self
            .publisher
            .as_ref()
            .and_then(|p| p.selected_city().ok().flatten())
        {
            println!("Restoring last city: {city}");
            self.settle(self.orchestrator.select_city(&city)).await;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            match SessionCommand::parse(&line) {
                Ok(SessionCommand::Quit) => break,
                Ok(cmd) => self.handle(cmd).await,
                Err(msg) if msg.is_empty() => {}
                Err(msg) => println!("{msg}"),
            }
        }

        self.playback.release();
        events.abort();
        Ok(())
    }

    async fn handle(&self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Select(city) => self.settle(self.orchestrator.select_city(&city)).await,
            SessionCommand::Refresh => match self.orchestrator.refresh() {
                Some(handle) => self.settle(handle).await,
                None => println!("Nothing selected yet."),
            },
            SessionCommand::Locate => {
                match self.orchestrator.use_current_location(&self.location).await {
                    Some(handle) => self.settle(handle).await,
                    None => output::print_state(&self.orchestrator.state()),
                }
            }
            SessionCommand::Search(query) => {
                self.orchestrator.search_cities(&query).await;
                output::print_cities(&self.orchestrator.state().search_results);
            }
            SessionCommand::Date(index) => {
                self.orchestrator.select_date(index);
                let state = self.orchestrator.state();
                match state.forecast.as_ref().and_then(|f| f.forecast_days.get(index)) {
                    Some(day) => {
                        output::print_day(day);
                        output::print_hours(day);
                    }
                    None => println!("No forecast for day {index}."),
                }
            }
            SessionCommand::Clear => self.orchestrator.clear_error(),
            SessionCommand::Speak => self.speak().await,
            SessionCommand::Pause => {
                if !self.playback.pause() {
                    println!("Nothing is playing.");
                }
            }
            SessionCommand::Resume => {
                if !self.playback.resume() {
                    println!("Nothing is paused.");
                }
            }
            SessionCommand::Stop => {
                self.playback.stop();
            }
            SessionCommand::Help => println!("{HELP}"),
            SessionCommand::Quit => {}
        }
    }

    async fn settle(&self, handle: FetchHandle) {
        handle.settled().await;
        let state = self.orchestrator.state();
        output::print_state(&state);

        if let (None, Some(city), Some(current)) =
            (&state.error, &state.selected_city, &state.current)
        {
            persist_selection(self.publisher.as_ref(), city, current);
        }
    }

    async fn speak(&self) {
        let Some(current) = self.orchestrator.state().current else {
            println!("Select a city first.");
            return;
        };

        let ready = match self.playback.state() {
            PlaybackState::Uninitialized => self.playback.initialize().await,
            _ => Ok(()),
        };
        if let Err(e) = ready {
            println!("Speech unavailable: {e}");
            return;
        }

        let text = self.narrator.generate(&current).await;
        println!("{text}");
        if let Err(e) = self.playback.speak(&text) {
            println!("{e}");
        }
    }
}

async fn report_playback(mut events: tokio::sync::broadcast::Receiver<PlaybackEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(PlaybackEvent::SynthesisFailed(reason)) => println!("(speech failed: {reason})"),
            Ok(PlaybackEvent::InitFailed(reason)) => println!("(speech engine failed: {reason})"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "playback events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            SessionCommand::parse("select  北京 "),
            Ok(SessionCommand::Select("北京".into()))
        );
        assert_eq!(
            SessionCommand::parse("search New York"),
            Ok(SessionCommand::Search("New York".into()))
        );
        assert_eq!(SessionCommand::parse("date 3"), Ok(SessionCommand::Date(3)));
        assert_eq!(SessionCommand::parse("QUIT"), Ok(SessionCommand::Quit));
    }

    #[test]
    fn reports_missing_or_bad_arguments() {
        assert!(SessionCommand::parse("select").unwrap_err().contains("needs a city"));
        assert!(SessionCommand::parse("date tomorrow").is_err());
        assert!(SessionCommand::parse("dance").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn blank_line_is_silent() {
        assert_eq!(SessionCommand::parse("   "), Err(String::new()));
    }
}
