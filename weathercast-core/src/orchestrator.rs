//! Concurrent current + forecast fetching for one selected city.
//!
//! Every selection bumps a generation counter and tags both fetches with it.
//! Results carrying an older tag are dropped on arrival, so the latest
//! selection wins no matter which request finishes first. In-flight requests
//! are never aborted.
//!
//! The orchestrator is the only writer of [`WeatherState`]; consumers observe
//! it through [`WeatherOrchestrator::subscribe`].

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    city,
    error::WeatherError,
    location::LocationService,
    model::{City, WeatherSnapshot},
    provider::WeatherProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    /// Current and forecast both applied.
    Ready,
    /// Current applied; forecast pending or failed.
    PartialReady,
    /// Current failed. A forecast may still have been applied.
    Failed,
}

/// Everything a presentation layer needs, published as one value.
#[derive(Debug, Clone, Default)]
pub struct WeatherState {
    pub phase: Phase,
    pub generation: u64,
    /// The name as the user gave it, before normalization.
    pub selected_city: Option<String>,
    pub current: Option<WeatherSnapshot>,
    pub forecast: Option<WeatherSnapshot>,
    pub is_loading: bool,
    /// At most one user-visible message.
    pub error: Option<String>,
    pub search_results: Vec<City>,
    pub is_searching: bool,
    pub location_city: Option<String>,
    /// Forecast day shown in detail, 0 = today.
    pub selected_date_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug)]
struct Inner {
    state: WeatherState,
    current: Outcome,
    forecast: Outcome,
    search_generation: u64,
}

impl Inner {
    fn recompute_phase(&mut self) {
        self.state.phase = match (self.current, self.forecast) {
            (Outcome::Pending, _) => Phase::Loading,
            (Outcome::Failed, _) => Phase::Failed,
            (Outcome::Succeeded, Outcome::Succeeded) => Phase::Ready,
            (Outcome::Succeeded, _) => Phase::PartialReady,
        };
    }
}

struct Shared {
    inner: Mutex<Inner>,
    tx: watch::Sender<WeatherState>,
}

/// Join point for the current + forecast pair of one generation.
#[derive(Debug)]
pub struct FetchHandle {
    pub generation: u64,
    current: JoinHandle<bool>,
    forecast: JoinHandle<bool>,
}

/// Which halves of a fetch were applied (false = discarded as stale).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    pub current_applied: bool,
    pub forecast_applied: bool,
}

impl FetchHandle {
    /// Wait for both fetches to land.
    pub async fn settled(self) -> Settled {
        let (current, forecast) = tokio::join!(self.current, self.forecast);
        Settled {
            current_applied: current.unwrap_or(false),
            forecast_applied: forecast.unwrap_or(false),
        }
    }
}

#[derive(Clone)]
pub struct WeatherOrchestrator {
    provider: Arc<dyn WeatherProvider>,
    forecast_days: u8,
    shared: Arc<Shared>,
}

impl WeatherOrchestrator {
    pub fn new(provider: Arc<dyn WeatherProvider>, forecast_days: u8) -> Self {
        let state = WeatherState::default();
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            provider,
            forecast_days,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state,
                    current: Outcome::Pending,
                    forecast: Outcome::Pending,
                    search_generation: 0,
                }),
                tx,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.shared.tx.subscribe()
    }

    pub fn state(&self) -> WeatherState {
        self.shared.tx.borrow().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, inner: &Inner) {
        self.shared.tx.send_replace(inner.state.clone());
    }

    /// Start a new generation: loading on, error cleared.
    fn begin(&self, selected: Option<&str>) -> u64 {
        let mut inner = self.lock();
        inner.state.generation += 1;
        if let Some(name) = selected {
            inner.state.selected_city = Some(name.to_string());
            inner.state.search_results.clear();
        }
        inner.state.is_loading = true;
        inner.state.error = None;
        inner.current = Outcome::Pending;
        inner.forecast = Outcome::Pending;
        inner.recompute_phase();
        self.publish(&inner);
        inner.state.generation
    }

    pub fn select_city(&self, name: &str) -> FetchHandle {
        let generation = self.begin(Some(name));
        let query = city::normalize(name).to_string();
        info!(generation, city = name, %query, "selecting city");
        self.dispatch(generation, query)
    }

    /// Re-fetch the selected city under a new generation. `None` when nothing is selected.
    pub fn refresh(&self) -> Option<FetchHandle> {
        let name = self.lock().state.selected_city.clone()?;
        let generation = self.begin(None);
        let query = city::normalize(&name).to_string();
        info!(generation, city = %name, "refreshing");
        Some(self.dispatch(generation, query))
    }

    pub fn clear_error(&self) {
        let mut inner = self.lock();
        if inner.state.error.take().is_some() {
            self.publish(&inner);
        }
    }

    pub fn select_date(&self, index: usize) {
        let mut inner = self.lock();
        inner.state.selected_date_index = index;
        self.publish(&inner);
    }

    fn dispatch(&self, generation: u64, query: String) -> FetchHandle {
        let current = tokio::spawn({
            let this = self.clone();
            let query = query.clone();
            async move {
                let result = this.provider.current(&query).await;
                this.apply_current(generation, result)
            }
        });

        let forecast = tokio::spawn({
            let this = self.clone();
            async move {
                let result = this.provider.forecast(&query, this.forecast_days).await;
                this.apply_forecast(generation, result)
            }
        });

        FetchHandle {
            generation,
            current,
            forecast,
        }
    }

    fn apply_current(&self, generation: u64, result: Result<WeatherSnapshot, WeatherError>) -> bool {
        let mut inner = self.lock();
        if generation != inner.state.generation {
            debug!(generation, latest = inner.state.generation, "discarding stale current weather");
            return false;
        }

        match result {
            Ok(snapshot) => {
                debug!(generation, location = %snapshot.location.name, "current weather applied");
                inner.state.current = Some(snapshot);
                inner.state.error = None;
                inner.current = Outcome::Succeeded;
            }
            Err(e) => {
                warn!(generation, error = %e, "current weather failed");
                inner.state.error = Some(format!("Failed to load current weather: {e}"));
                inner.current = Outcome::Failed;
            }
        }
        inner.state.is_loading = false;
        inner.recompute_phase();
        self.publish(&inner);
        true
    }

    fn apply_forecast(&self, generation: u64, result: Result<WeatherSnapshot, WeatherError>) -> bool {
        let mut inner = self.lock();
        if generation != inner.state.generation {
            debug!(generation, latest = inner.state.generation, "discarding stale forecast");
            return false;
        }

        match result {
            Ok(snapshot) => {
                debug!(generation, days = snapshot.forecast_days.len(), "forecast applied");
                inner.state.forecast = Some(snapshot);
                inner.forecast = Outcome::Succeeded;
            }
            Err(e) => {
                // Never user-visible; the current snapshot stays as it is.
                warn!(generation, error = %e, "forecast failed");
                inner.forecast = Outcome::Failed;
            }
        }
        inner.recompute_phase();
        self.publish(&inner);
        true
    }

    /// Resolve the device's city and select it.
    ///
    /// The lookup itself occupies a generation, so a manual selection made
    /// while it runs wins and the late location result is dropped.
    pub async fn use_current_location(&self, location: &LocationService) -> Option<FetchHandle> {
        let generation = self.begin(None);
        let resolved = location.resolve_current_city().await;

        {
            let mut inner = self.lock();
            if generation != inner.state.generation {
                debug!(generation, "discarding stale location result");
                return None;
            }

            match &resolved {
                Ok(city) => inner.state.location_city = Some(city.clone()),
                Err(e) => {
                    warn!(error = %e, "location lookup failed");
                    inner.state.error = Some(format!("Could not determine location: {e}"));
                    inner.state.is_loading = false;
                    inner.current = Outcome::Failed;
                    inner.recompute_phase();
                    self.publish(&inner);
                    return None;
                }
            }
            self.publish(&inner);
        }

        resolved.ok().map(|city| self.select_city(&city))
    }

    /// Look up place candidates. A blank query clears results without a request.
    pub async fn search_cities(&self, query: &str) {
        let search_generation = {
            let mut inner = self.lock();
            if query.trim().is_empty() {
                inner.state.search_results.clear();
                inner.state.is_searching = false;
                self.publish(&inner);
                return;
            }
            inner.search_generation += 1;
            inner.state.is_searching = true;
            self.publish(&inner);
            inner.search_generation
        };

        let result = self.provider.search(city::normalize(query)).await;

        let mut inner = self.lock();
        if search_generation != inner.search_generation {
            debug!(search_generation, "discarding stale search results");
            return;
        }
        inner.state.search_results = match result {
            Ok(cities) => cities,
            Err(e) => {
                warn!(error = %e, %query, "city search failed");
                Vec::new()
            }
        };
        inner.state.is_searching = false;
        self.publish(&inner);
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::location::fakes as loc;
    use crate::location::ProviderKind;
    use tokio::sync::Notify;

    fn orchestrator(provider: ScriptedProvider) -> WeatherOrchestrator {
        WeatherOrchestrator::new(Arc::new(provider), 7)
    }

    #[tokio::test]
    async fn select_known_city_loads_current_and_seven_day_forecast() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);

        let settled = orch.select_city("北京").settled().await;
        assert!(settled.current_applied && settled.forecast_applied);

        let state = orch.state();
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.selected_city.as_deref(), Some("北京"));
        let current = state.current.expect("current");
        assert_eq!(current.current.temp_c, 15.0);
        assert_eq!(current.current.condition.text, "Clear");
        assert_eq!(state.forecast.expect("forecast").forecast_days.len(), 7);
    }

    #[tokio::test]
    async fn provider_error_surfaces_and_keeps_previous_current() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);
        orch.select_city("北京").settled().await;
        let before = orch.state().current;

        orch.select_city("UnknownPlace").settled().await;

        let state = orch.state();
        assert!(!state.is_loading);
        assert!(state.error.is_some());
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.current, before);
    }

    #[tokio::test]
    async fn forecast_failure_is_silent_and_keeps_current() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Paris", ok("Paris", 21.0, "Sunny"))
            .on_forecast("Paris", status(500));
        let orch = orchestrator(provider);

        orch.select_city("Paris").settled().await;

        let state = orch.state();
        assert!(state.current.is_some());
        assert!(state.error.is_none());
        assert!(state.forecast.is_none());
        assert_eq!(state.phase, Phase::PartialReady);
    }

    #[tokio::test]
    async fn forecast_failure_leaves_prior_forecast_in_place() {
        let provider = Arc::new(ScriptedProvider::default());
        provider
            .on_current("Paris", ok("Paris", 21.0, "Sunny"))
            .on_forecast("Paris", ok_forecast("Paris", 3));
        let orch = WeatherOrchestrator::new(provider.clone(), 7);
        orch.select_city("Paris").settled().await;

        provider
            .on_current("Paris", ok("Paris", 22.0, "Sunny"))
            .on_forecast("Paris", status(503));
        orch.refresh().expect("selected").settled().await;

        let state = orch.state();
        assert_eq!(state.current.map(|c| c.current.temp_c), Some(22.0));
        assert_eq!(state.forecast.map(|f| f.forecast_days.len()), Some(3));
        assert!(state.error.is_none());
        assert_eq!(state.phase, Phase::PartialReady);
    }

    #[tokio::test]
    async fn forecast_may_land_before_current() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::default();
        provider
            .on_current_gated("Oslo", ok("Oslo", -2.0, "Light snow"), Some(gate.clone()))
            .on_forecast("Oslo", ok_forecast("Oslo", 7));
        let orch = orchestrator(provider);
        let mut rx = orch.subscribe();

        let handle = orch.select_city("Oslo");
        rx.wait_for(|s| s.forecast.is_some()).await.expect("forecast published");
        let mid = orch.state();
        assert!(mid.is_loading);
        assert_eq!(mid.phase, Phase::Loading);

        gate.notify_one();
        handle.settled().await;
        let state = orch.state();
        assert!(!state.is_loading);
        assert_eq!(state.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn current_failure_does_not_block_forecast() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Lima", status(502))
            .on_forecast("Lima", ok_forecast("Lima", 7));
        let orch = orchestrator(provider);

        let settled = orch.select_city("Lima").settled().await;
        assert!(settled.forecast_applied);

        let state = orch.state();
        assert!(state.error.is_some());
        assert_eq!(state.forecast.map(|f| f.forecast_days.len()), Some(7));
    }

    #[tokio::test]
    async fn late_result_from_older_selection_is_discarded() {
        let gate_current = Arc::new(Notify::new());
        let gate_forecast = Arc::new(Notify::new());
        let provider = ScriptedProvider::default();
        provider
            .on_current_gated("Tokyo", ok("Tokyo", 10.0, "Rain"), Some(gate_current.clone()))
            .on_forecast_gated("Tokyo", ok_forecast("Tokyo", 7), Some(gate_forecast.clone()))
            .on_current("Seoul", ok("Seoul", 5.0, "Clear"))
            .on_forecast("Seoul", ok_forecast("Seoul", 7));
        let orch = orchestrator(provider);

        let a = orch.select_city("Tokyo");
        let b = orch.select_city("Seoul");
        assert_eq!((a.generation, b.generation), (1, 2));

        let settled_b = b.settled().await;
        assert!(settled_b.current_applied && settled_b.forecast_applied);

        gate_current.notify_one();
        gate_forecast.notify_one();
        let settled_a = a.settled().await;
        assert_eq!(
            settled_a,
            Settled {
                current_applied: false,
                forecast_applied: false
            }
        );

        let state = orch.state();
        assert_eq!(state.generation, 2);
        assert_eq!(state.current.map(|c| c.location.name), Some("Seoul".to_string()));
        assert_eq!(state.forecast.map(|f| f.location.name), Some("Seoul".to_string()));
    }

    #[tokio::test]
    async fn stale_error_does_not_clobber_newer_success() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::default();
        provider
            .on_current_gated("Nowhere", status(400), Some(gate.clone()))
            .on_current("Rome", ok("Rome", 18.0, "Sunny"))
            .on_forecast("Rome", ok_forecast("Rome", 7));
        let orch = orchestrator(provider);

        let stale = orch.select_city("Nowhere");
        orch.select_city("Rome").settled().await;
        gate.notify_one();
        stale.settled().await;

        let state = orch.state();
        assert!(state.error.is_none());
        assert_eq!(state.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn refresh_bumps_generation_and_refetches_same_city() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);

        assert!(orch.refresh().is_none());

        orch.select_city("北京").settled().await;
        let handle = orch.refresh().expect("city selected");
        assert_eq!(handle.generation, 2);
        handle.settled().await;

        let state = orch.state();
        assert_eq!(state.selected_city.as_deref(), Some("北京"));
        assert_eq!(state.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn retry_success_clears_previous_error() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);

        orch.select_city("UnknownPlace").settled().await;
        assert!(orch.state().error.is_some());

        orch.select_city("北京").settled().await;
        assert!(orch.state().error.is_none());
    }

    #[tokio::test]
    async fn clear_error_touches_nothing_else() {
        let provider = ScriptedProvider::default();
        let orch = orchestrator(provider);
        orch.select_city("UnknownPlace").settled().await;

        let before = orch.state();
        orch.clear_error();
        let after = orch.state();

        assert!(after.error.is_none());
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.current, before.current);
        assert_eq!(after.selected_city, before.selected_city);
        assert_eq!(after.is_loading, before.is_loading);
    }

    #[tokio::test]
    async fn subscribers_see_loading_then_result() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::default();
        provider
            .on_current_gated("Beijing", ok("Beijing", 15.0, "Clear"), Some(gate.clone()))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);
        let rx = orch.subscribe();

        let handle = orch.select_city("北京");
        assert!(rx.borrow().is_loading);

        gate.notify_one();
        handle.settled().await;
        assert!(!rx.borrow().is_loading);
        assert!(rx.borrow().current.is_some());
    }

    #[tokio::test]
    async fn current_location_selects_resolved_city() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7));
        let orch = orchestrator(provider);
        let precise = loc::FakeProvider::new(ProviderKind::Precise, true, Some(loc::fix(39.9, 116.4)));
        let location = loc::service(true, vec![precise], loc::beijing_geocoder());

        let handle = orch.use_current_location(&location).await.expect("resolved");
        handle.settled().await;

        let state = orch.state();
        assert_eq!(state.location_city.as_deref(), Some("北京"));
        assert_eq!(state.selected_city.as_deref(), Some("北京"));
        assert!(state.current.is_some());
    }

    #[tokio::test]
    async fn manual_selection_during_location_lookup_wins() {
        let provider = ScriptedProvider::default();
        provider
            .on_current("Beijing", ok("Beijing", 15.0, "Clear"))
            .on_forecast("Beijing", ok_forecast("Beijing", 7))
            .on_current("Seoul", ok("Seoul", 8.0, "Cloudy"))
            .on_forecast("Seoul", ok_forecast("Seoul", 7));
        let orch = orchestrator(provider);

        let gate = Arc::new(Notify::new());
        let mut geocoder = loc::beijing_geocoder();
        geocoder.gate = Some(gate.clone());
        let precise = loc::FakeProvider::new(ProviderKind::Precise, true, Some(loc::fix(39.9, 116.4)));
        let location = loc::service(true, vec![precise], geocoder);

        let lookup = tokio::spawn({
            let orch = orch.clone();
            async move { orch.use_current_location(&location).await.map(|h| h.generation) }
        });
        while orch.state().generation == 0 {
            tokio::task::yield_now().await;
        }

        orch.select_city("Seoul").settled().await;
        gate.notify_one();

        assert_eq!(lookup.await.expect("join"), None);
        let state = orch.state();
        assert!(state.location_city.is_none());
        assert_eq!(state.selected_city.as_deref(), Some("Seoul"));
        assert_eq!(
            state.current.map(|c| c.location.name).as_deref(),
            Some("Seoul")
        );
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn location_failure_sets_distinct_message() {
        let orch = orchestrator(ScriptedProvider::default());
        let location = loc::service(false, vec![], loc::beijing_geocoder());

        assert!(orch.use_current_location(&location).await.is_none());

        let state = orch.state();
        assert!(!state.is_loading);
        let msg = state.error.expect("error");
        assert!(msg.starts_with("Could not determine location"));
    }

    #[tokio::test]
    async fn search_blank_clears_and_query_is_normalized() {
        let provider = ScriptedProvider::default();
        let beijing = City {
            id: "39.93,116.39".into(),
            name: "Beijing".into(),
            region: "Beijing".into(),
            country: "China".into(),
            lat: 39.93,
            lon: 116.39,
        };
        provider.on_search("Beijing", vec![beijing.clone()]);
        let orch = orchestrator(provider);

        orch.search_cities("北京").await;
        assert_eq!(orch.state().search_results, vec![beijing]);
        assert!(!orch.state().is_searching);

        orch.search_cities("   ").await;
        assert!(orch.state().search_results.is_empty());
    }

    #[tokio::test]
    async fn search_failure_yields_empty_results_without_error() {
        let orch = orchestrator(ScriptedProvider::default());
        orch.search_cities("Atlantis").await;

        let state = orch.state();
        assert!(state.search_results.is_empty());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn select_date_records_index() {
        let orch = orchestrator(ScriptedProvider::default());
        orch.select_date(3);
        assert_eq!(orch.state().selected_date_index, 3);
    }
}
