use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::host::CanvasHost;
use crate::canvas::{Point, Raster, StrokeStyle, StrokeSurface, Tool};
use crate::db::CanvasState;
use crate::detector::{detector_from_settings, ChangeDetector};
use crate::recognition::{
    parse_response, RecognitionClient, RecognitionError, RecognitionEvent, RecognitionRequest,
    RecognitionResult, RecognitionTransport, Trigger,
};
use crate::render::ResultRenderer;
use crate::settings::EngineSettings;
use crate::variables::{VariableDictionary, VariableStore};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Persisted rasters a session starts from.
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    pub composite: Raster,
    /// Preferred over `composite` when present so the band is not baked in.
    pub clean: Option<Raster>,
}

impl SessionSeed {
    pub fn blank() -> Self {
        Self::default()
    }

    fn base_layer(&self) -> Option<&Raster> {
        match &self.clean {
            Some(clean) if !clean.is_empty() => Some(clean),
            _ if !self.composite.is_empty() => Some(&self.composite),
            _ => None,
        }
    }
}

impl From<CanvasState> for SessionSeed {
    fn from(state: CanvasState) -> Self {
        Self {
            composite: state.composite,
            clean: Some(state.clean),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Results were rendered; carries how many.
    Applied(usize),
    /// Computed against a canvas generation or document that is gone.
    Stale,
    Failed(RecognitionError),
}

/// One open document: drawing surface, recognition round-trips and the
/// results overlay.
pub struct CanvasSession {
    document_id: String,
    surface: StrokeSurface,
    renderer: ResultRenderer,
    detector: Box<dyn ChangeDetector>,
    client: RecognitionClient,
    events: mpsc::UnboundedReceiver<RecognitionEvent>,
    host: Arc<dyn CanvasHost>,
    store: Arc<dyn VariableStore>,
    variables: VariableDictionary,
    results: Vec<RecognitionResult>,
    clean: Raster,
    last_analyzed: Option<Raster>,
    generation: u64,
}

impl CanvasSession {
    /// Loads the document's variables and seeds the surface.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(
        settings: &EngineSettings,
        document_id: impl Into<String>,
        seed: SessionSeed,
        host: Arc<dyn CanvasHost>,
        store: Arc<dyn VariableStore>,
        transport: Arc<dyn RecognitionTransport>,
    ) -> Result<Self> {
        let document_id = document_id.into();

        let variables = match store.load(&document_id).await {
            Ok(Some(variables)) => VariableDictionary::new(variables),
            Ok(None) => VariableDictionary::empty(),
            Err(err) => {
                log_warn!("failed to load variables for {document_id}, starting empty: {err:#}");
                VariableDictionary::empty()
            }
        };

        let canvas = &settings.canvas;
        let surface = StrokeSurface::new(canvas.width, canvas.height, canvas.pixel_ratio)
            .context("failed to create drawing surface")?;
        let renderer = ResultRenderer::new(&settings.render, canvas);
        let detector = detector_from_settings(settings.recognition.detector);
        let (client, events) = RecognitionClient::new(
            transport,
            Duration::from_millis(settings.recognition.debounce_ms),
            Duration::from_millis(settings.recognition.timeout_ms),
        );

        let mut session = Self {
            document_id,
            surface,
            renderer,
            detector,
            client,
            events,
            host,
            store,
            variables,
            results: Vec::new(),
            clean: Raster::empty(),
            last_analyzed: None,
            generation: 0,
        };
        session.apply_seed(&seed)?;

        log_info!(
            "opened canvas session for {} ({} variables)",
            session.document_id,
            session.variables.len()
        );
        Ok(session)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn variables(&self) -> &VariableDictionary {
        &self.variables
    }

    pub fn results(&self) -> &[RecognitionResult] {
        &self.results
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clean_canvas(&self) -> &Raster {
        &self.clean
    }

    pub fn surface(&self) -> &StrokeSurface {
        &self.surface
    }

    pub fn is_recognition_in_flight(&self) -> bool {
        self.client.is_in_flight()
    }

    pub fn begin_stroke(&mut self, point: Point, tool: Tool, style: StrokeStyle) {
        self.surface.begin_stroke(point, tool, style);
    }

    pub fn extend_stroke(&mut self, point: Point) {
        self.surface.extend_stroke(point);
    }

    /// Completes the stroke, publishes the canvas and, if the change is big
    /// enough, schedules recognition.
    pub fn end_stroke(&mut self, point: Point) -> Result<Option<Trigger>> {
        match self.surface.end_stroke(point)? {
            Some(raster) => self.commit_edit(raster).map(Some),
            None => Ok(None),
        }
    }

    pub fn undo(&mut self) -> Result<Option<Trigger>> {
        match self.surface.undo()? {
            Some(raster) => self.commit_edit(raster).map(Some),
            None => Ok(None),
        }
    }

    pub fn redo(&mut self) -> Result<Option<Trigger>> {
        match self.surface.redo()? {
            Some(raster) => self.commit_edit(raster).map(Some),
            None => Ok(None),
        }
    }

    /// Clears the canvas and results. Responses still in flight will be
    /// discarded. Variables are kept.
    pub fn reset(&mut self) {
        self.surface.reset();
        self.bump_generation();
        self.clean = Raster::empty();
        self.host.on_clean_canvas(&self.clean);
        self.host.on_update_canvas("");
        log_info!("canvas {} reset (generation {})", self.document_id, self.generation);
    }

    /// Replaces the canvas with persisted content, e.g. after the host
    /// reloaded the document.
    pub fn reseed(&mut self, seed: SessionSeed) -> Result<()> {
        self.bump_generation();
        self.apply_seed(&seed)?;
        let composite = self.renderer.render(&self.clean, &self.results)?;
        self.host.on_clean_canvas(&self.clean);
        self.host.on_update_canvas(composite.as_str());
        Ok(())
    }

    /// Requests recognition now, skipping the change check and quiet period.
    /// `None` when the canvas is blank.
    pub fn analyze_now(&mut self) -> Option<Trigger> {
        if self.clean.is_empty() {
            return None;
        }
        let trigger = self.client.request_now(self.request());
        if trigger == Trigger::Scheduled {
            self.last_analyzed = Some(self.clean.clone());
        }
        Some(trigger)
    }

    /// Waits for the next completed recognition and applies it.
    pub async fn process_next(&mut self) -> Result<Option<EventOutcome>> {
        match self.events.recv().await {
            Some(event) => self.apply_event(event).await.map(Some),
            None => Ok(None),
        }
    }

    /// Applies a completed recognition if one is waiting.
    pub async fn try_process(&mut self) -> Result<Option<EventOutcome>> {
        match self.events.try_recv() {
            Ok(event) => self.apply_event(event).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Drops pending triggers and disconnects persistent transports.
    pub fn shutdown(&self) {
        self.client.shutdown();
        log_debug!("canvas session {} shut down", self.document_id);
    }

    fn apply_seed(&mut self, seed: &SessionSeed) -> Result<()> {
        self.results.clear();
        self.last_analyzed = None;
        match seed.base_layer() {
            Some(raster) => {
                self.surface
                    .seed(raster)
                    .context("failed to seed canvas from persisted raster")?;
                self.clean = self.surface.snapshot()?;
            }
            None => {
                self.surface.reset();
                self.clean = Raster::empty();
            }
        }
        Ok(())
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.results.clear();
        self.last_analyzed = None;
        self.client.cancel_pending();
    }

    fn commit_edit(&mut self, raster: Raster) -> Result<Trigger> {
        self.clean = raster;
        let composite = self.renderer.render(&self.clean, &self.results)?;
        self.host.on_clean_canvas(&self.clean);
        self.host.on_update_canvas(composite.as_str());

        if !self
            .detector
            .has_changed_significantly(self.last_analyzed.as_ref(), &self.clean)
        {
            log_debug!("canvas change below threshold; not scheduling recognition");
            return Ok(Trigger::Unchanged);
        }

        let trigger = self.client.request_recognition(self.request());
        if trigger == Trigger::Scheduled {
            self.last_analyzed = Some(self.clean.clone());
        }
        Ok(trigger)
    }

    fn request(&self) -> RecognitionRequest {
        RecognitionRequest {
            raster: self.clean.clone(),
            variables: self.variables.clone(),
            document_id: self.document_id.clone(),
            generation: self.generation,
        }
    }

    async fn apply_event(&mut self, event: RecognitionEvent) -> Result<EventOutcome> {
        if event.generation != self.generation || event.document_id != self.document_id {
            log_debug!(
                "discarding stale recognition (generation {} != {})",
                event.generation,
                self.generation
            );
            return Ok(EventOutcome::Stale);
        }

        let response = match event.outcome.and_then(|body| parse_response(&body)) {
            Ok(response) => response,
            Err(err) => {
                self.host.on_recognition_error(&err);
                return Ok(EventOutcome::Failed(err));
            }
        };

        let mut variables = self.variables.merge_assignments(&response.results);
        if let Some(echoed) = &response.variables {
            variables = variables.merge_map(echoed);
        }
        if variables != self.variables {
            self.variables = variables;
            if let Err(err) = self.store.save(&self.document_id, self.variables.as_map()).await {
                log_warn!("failed to persist variables for {}: {err:#}", self.document_id);
            }
        }

        self.results = response.results;
        let composite = self.renderer.render(&self.clean, &self.results)?;
        self.host.on_update_canvas(composite.as_str());

        log_info!(
            "applied {} recognition results to {}",
            self.results.len(),
            self.document_id
        );
        Ok(EventOutcome::Applied(self.results.len()))
    }
}
