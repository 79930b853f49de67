//! Per-visitor navigation state.
//!
//! A session is either on the `Home` screen or on the `Dashboard`. `start`
//! moves Home to Dashboard, `back` moves Dashboard to Home, and nothing else is
//! a valid transition.

use crate::charts::build_charts;
use crate::models::{
    score_label, DashboardView, InputsRequest, Metrics, MetricsError, NewPrediction, PersonName,
    SessionView,
};
use crate::predictor::{ModelStatus, ModelUnavailable};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Start,
    Back,
}

impl Screen {
    pub fn next(self, action: NavAction) -> Option<Screen> {
        match (self, action) {
            (Screen::Home, NavAction::Start) => Some(Screen::Dashboard),
            (Screen::Dashboard, NavAction::Back) => Some(Screen::Home),
            _ => None,
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Screen::Home => "home",
            Screen::Dashboard => "dashboard",
        })
    }
}

impl fmt::Display for NavAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NavAction::Start => "start",
            NavAction::Back => "back",
        })
    }
}

impl FromStr for NavAction {
    type Err = SessionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "start" => Ok(NavAction::Start),
            "back" => Ok(NavAction::Back),
            other => Err(SessionError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("action must be 'start' or 'back', got '{0}'")]
    UnknownAction(String),
    #[error("cannot {action} from the {screen} screen")]
    InvalidTransition { screen: Screen, action: NavAction },
    #[error("inputs can only be used on the dashboard")]
    NotOnDashboard,
    #[error("enter a name to enable cloud sync")]
    SyncDisabled,
    #[error(transparent)]
    ModelUnavailable(#[from] ModelUnavailable),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

#[derive(Debug, Clone)]
pub struct Session {
    screen: Screen,
    metrics: Metrics,
    name: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            screen: Screen::Home,
            metrics: Metrics::default(),
            name: String::new(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies a navigation action. Entering the dashboard resets the inputs
    /// to their baseline and requires a loaded model.
    pub fn navigate(&mut self, action: NavAction, model: &ModelStatus) -> Result<Screen, SessionError> {
        let next = self
            .screen
            .next(action)
            .ok_or(SessionError::InvalidTransition {
                screen: self.screen,
                action,
            })?;

        if next == Screen::Dashboard {
            model.predictor()?;
            self.metrics = Metrics::default();
            self.name.clear();
        }

        self.screen = next;
        Ok(next)
    }

    /// Validates the whole tuple before touching state, so a rejected update
    /// leaves the previous values in place.
    pub fn update_inputs(&mut self, update: &InputsRequest) -> Result<(), SessionError> {
        self.require_dashboard()?;
        let metrics = update.apply_to(self.metrics);
        metrics.validate()?;
        self.metrics = metrics;
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        Ok(())
    }

    pub fn sync_enabled(&self) -> bool {
        self.screen == Screen::Dashboard && PersonName::parse(&self.name).is_some()
    }

    /// Builds the record a sync would submit, scored from the current inputs.
    pub fn sync_candidate(&self, model: &ModelStatus) -> Result<NewPrediction, SessionError> {
        self.require_dashboard()?;
        let name = PersonName::parse(&self.name).ok_or(SessionError::SyncDisabled)?;
        let predictor = model.predictor()?;
        Ok(NewPrediction {
            name,
            score: predictor.predict(&self.metrics),
            metrics: self.metrics,
        })
    }

    pub fn view(&self, model: &ModelStatus, connected: bool) -> SessionView {
        let model_error = match model.predictor() {
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        };
        SessionView {
            screen: self.screen,
            model_ready: model.is_ready(),
            model_error,
            connected,
            dashboard: self.dashboard_view(model),
        }
    }

    fn dashboard_view(&self, model: &ModelStatus) -> Option<DashboardView> {
        if self.screen != Screen::Dashboard {
            return None;
        }
        let predictor = model.predictor().ok()?;
        // Recomputed on every view; the model is a pure function of the inputs.
        let score = predictor.predict(&self.metrics);
        Some(DashboardView {
            title: self.title(),
            name: self.name.clone(),
            metrics: self.metrics,
            score,
            score_label: score_label(score),
            sync_enabled: self.sync_enabled(),
            charts: build_charts(&self.metrics),
        })
    }

    fn title(&self) -> String {
        let who = PersonName::parse(&self.name)
            .map(|name| name.as_str().to_uppercase())
            .unwrap_or_else(|| "YOU".to_string());
        format!("THE MINIMALIST x {who}")
    }

    fn require_dashboard(&self) -> Result<(), SessionError> {
        if self.screen == Screen::Dashboard {
            Ok(())
        } else {
            Err(SessionError::NotOnDashboard)
        }
    }
}
