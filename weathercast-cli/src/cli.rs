use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{Local, NaiveDate, Timelike};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use tokio::sync::watch;
use tracing::{info, warn};

use weathercast_core::{
    BroadcastTextGenerator, Config, PlaybackController, RefreshScheduler, ServiceId, SlotStore,
    WeatherOrchestrator, WeatherProvider, WeatherSnapshot, WidgetPublisher, city,
    location::LocationService,
    narration::quick_report,
    playback::{self, UtteranceOutcome},
    provider::{DateRequest, classify_date, provider_from_config},
};

use crate::{output, session::Session};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathercast", version, about = "Weather lookup and spoken forecasts")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a service.
    Configure {
        /// Service short name: "weatherapi" or "deepseek".
        provider: String,
    },

    /// Show weather for a city.
    Show {
        /// City name, coordinates or postal code.
        city: String,

        /// Day to show (YYYY-MM-DD); past dates use history, future dates the forecast.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Search for places matching a query.
    Search { query: String },

    /// Resolve the device's city and show its weather.
    Locate,

    /// Speak a weather report.
    Broadcast {
        /// Defaults to the last selected city.
        city: Option<String>,

        /// Short greeting-style report without calling the text service.
        #[arg(long)]
        quick: bool,
    },

    /// Interactive session.
    Session,

    /// Keep the widget record fresh until interrupted.
    Daemon,

    /// Print the widget record.
    Widget,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { city, date } => show(&city, date).await,
            Command::Search { query } => search(&query).await,
            Command::Locate => locate().await,
            Command::Broadcast { city, quick } => broadcast(city, quick).await,
            Command::Session => Session::from_config(Config::load()?)?.run().await,
            Command::Daemon => daemon().await,
            Command::Widget => widget(),
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let service = ServiceId::try_from(provider)?;
    let mut cfg = Config::load()?;

    let api_key = Password::new(&format!("API key for {service}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }
    cfg.upsert_provider_api_key(service, api_key.trim().to_string());

    if service == ServiceId::WeatherApi {
        let default_city = Text::new("Default city:")
            .with_default(&cfg.default_city)
            .prompt()
            .context("Failed to read default city")?;
        cfg.default_city = default_city.trim().to_string();
    }

    cfg.save()?;
    println!(
        "Saved {service} credentials to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// Publisher for the widget slots, or `None` when no data dir can be determined.
pub(crate) fn publisher(cfg: &Config) -> Option<WidgetPublisher> {
    match SlotStore::from_config(cfg) {
        Ok(store) => Some(WidgetPublisher::new(store)),
        Err(e) => {
            warn!(error = %e, "widget storage unavailable");
            None
        }
    }
}

/// Remember an interactive selection and mirror it to the widget.
pub(crate) fn persist_selection(
    publisher: Option<&WidgetPublisher>,
    city: &str,
    snapshot: &WeatherSnapshot,
) {
    let Some(publisher) = publisher else {
        return;
    };
    if let Err(e) = publisher.remember_selection(city) {
        warn!(error = %e, "failed to remember selection");
    }
    if let Err(e) = publisher.publish_snapshot(snapshot) {
        warn!(error = %e, "failed to update widget");
    }
}

async fn show(city: &str, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let provider = provider_from_config(&cfg)?;
    let query = city::normalize(city);

    match classify_date(Local::now().date_naive(), date) {
        DateRequest::Today => {
            let orchestrator = WeatherOrchestrator::new(provider, cfg.forecast_days);
            orchestrator.select_city(city).settled().await;
            let state = orchestrator.state();
            if let Some(error) = &state.error {
                bail!("{error}");
            }
            output::print_state(&state);
            if let Some(current) = &state.current {
                persist_selection(publisher(&cfg).as_ref(), city, current);
            }
        }
        DateRequest::Past(day) => {
            let snapshot = provider.history(query, day).await?;
            let found = snapshot
                .forecast_day(day)
                .with_context(|| format!("No history available for {day}"))?;
            println!("{} on {day}", snapshot.location.name);
            output::print_day(found);
            output::print_hours(found);
        }
        DateRequest::Future(day) => {
            let snapshot = provider.forecast(query, cfg.forecast_days).await?;
            let Some(found) = snapshot.forecast_day(day) else {
                bail!(
                    "{day} is outside the {}-day forecast window",
                    cfg.forecast_days
                );
            };
            println!("{} on {day}", snapshot.location.name);
            output::print_day(found);
            output::print_hours(found);
        }
    }

    Ok(())
}

async fn search(query: &str) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let orchestrator = WeatherOrchestrator::new(provider_from_config(&cfg)?, cfg.forecast_days);
    orchestrator.search_cities(query).await;
    output::print_cities(&orchestrator.state().search_results);
    Ok(())
}

async fn locate() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let orchestrator = WeatherOrchestrator::new(provider_from_config(&cfg)?, cfg.forecast_days);
    let location = LocationService::from_config(&cfg.location);

    if let Some(handle) = orchestrator.use_current_location(&location).await {
        handle.settled().await;
    }

    let state = orchestrator.state();
    if let Some(error) = &state.error {
        bail!("{error}");
    }
    if let Some(city) = &state.location_city {
        println!("You are in {city}.");
    }
    output::print_state(&state);
    if let (Some(city), Some(current)) = (&state.location_city, &state.current) {
        persist_selection(publisher(&cfg).as_ref(), city, current);
    }
    Ok(())
}

async fn broadcast(city: Option<String>, quick: bool) -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let provider = provider_from_config(&cfg)?;

    let city = match city {
        Some(city) => city,
        None => publisher(&cfg)
            .and_then(|p| p.selected_city().ok().flatten())
            .unwrap_or_else(|| cfg.default_city.clone()),
    };
    let snapshot = provider.current(city::normalize(&city)).await?;

    let text = if quick {
        quick_report(
            &snapshot.location.name,
            snapshot.temp_whole_c(),
            &snapshot.current.condition.text,
            Local::now().hour(),
        )
    } else {
        BroadcastTextGenerator::from_config(&cfg)
            .generate(&snapshot)
            .await
    };
    println!("{text}");

    let controller = PlaybackController::new(playback::engine_from_config(&cfg.speech));
    if let Err(e) = controller.initialize().await {
        warn!(error = %e, "speech unavailable, text only");
        return Ok(());
    }

    let utterance = controller.speak(&text)?;
    let outcome = tokio::select! {
        outcome = utterance.finished() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.stop();
            UtteranceOutcome::Interrupted
        }
    };
    controller.release();

    match outcome {
        UtteranceOutcome::Failed(e) => Err(e.into()),
        UtteranceOutcome::Completed | UtteranceOutcome::Interrupted => Ok(()),
    }
}

async fn daemon() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let provider: Arc<dyn WeatherProvider> = provider_from_config(&cfg)?;
    let scheduler = Arc::new(RefreshScheduler::from_config(&cfg, provider)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    let attempts = task.await.context("Refresh task panicked")?;
    println!("Stopped after {attempts} refreshes.");
    Ok(())
}

fn widget() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    let store = SlotStore::from_config(&cfg)?;
    match WidgetPublisher::new(store).current()? {
        Some(record) => output::print_widget(&record),
        None => println!("No widget record yet. Run `weathercast daemon` or `weathercast show <city>`."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_with_date() {
        let cli = Cli::try_parse_from(["weathercast", "show", "北京", "--date", "2024-06-01"])
            .expect("parse");
        match cli.command {
            Command::Show { city, date } => {
                assert_eq!(city, "北京");
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Cli::try_parse_from(["weathercast", "show", "Paris", "--date", "June 1"]).is_err());
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["weathercast", "broadcast", "--quick", "-v"]).expect("parse");
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Broadcast { city: None, quick: true }));
    }
}
