//! Parallel per-layer generation with ordered hand-off.
//!
//! Layers are generated independently on the rayon pool and handed to a
//! single [`LayerSink`] in strictly increasing layer number. Raft layers have
//! negative numbers and therefore come first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use rayon::prelude::*;

use crate::config::{
    BridgeWallSettings, CombingSettings, FanSpeedLayerTimeSettings, MachineSettings, PathPlanningSettings,
    Settings, SettingsResult, WallSettings,
};
use crate::{CoordF, Error, Result};

/// Shared flag to stop slicing early.
///
/// Clones observe the same flag. Long running work polls it between
/// layers and between islands and returns early once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Error::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Values replacing settings for a single layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerOverrides {
    /// Minimum layer time (s).
    pub min_layer_time: Option<CoordF>,
    /// Nozzle temperature to set at the start of the layer.
    pub nozzle_temperature: Option<CoordF>,
}

/// Read-only state of one slicing run.
///
/// Built once by the caller and passed by reference to everything that
/// needs settings or the cancellation token.
#[derive(Debug, Clone)]
pub struct SliceContext {
    pub settings: Arc<Settings>,
    pub machine: MachineSettings,
    pub walls: WallSettings,
    pub combing: CombingSettings,
    pub bridge: BridgeWallSettings,
    pub planning: PathPlanningSettings,
    /// Fan and layer time settings per extruder.
    pub fan_speed_layer_time: Vec<FanSpeedLayerTimeSettings>,
    overrides: BTreeMap<i64, LayerOverrides>,
    cancel: CancellationToken,
}

impl Default for SliceContext {
    fn default() -> Self {
        Self {
            settings: Arc::new(Settings::new()),
            machine: MachineSettings::default(),
            walls: WallSettings::default(),
            combing: CombingSettings::default(),
            bridge: BridgeWallSettings::default(),
            planning: PathPlanningSettings::default(),
            fan_speed_layer_time: vec![FanSpeedLayerTimeSettings::default()],
            overrides: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }
}

impl SliceContext {
    /// Context with default bundles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every bundle from the global store and one store per extruder.
    ///
    /// Extruder stores usually chain to the global one; with no extruder
    /// stores the global store describes the only extruder.
    pub fn from_settings(global: Arc<Settings>, extruders: &[Settings]) -> SettingsResult<Self> {
        let machine = MachineSettings::from_settings(&global, extruders)?;
        let fan_speed_layer_time = if extruders.is_empty() {
            vec![FanSpeedLayerTimeSettings::from_settings(&global)?]
        } else {
            extruders
                .iter()
                .map(FanSpeedLayerTimeSettings::from_settings)
                .collect::<SettingsResult<Vec<_>>>()?
        };
        Ok(Self {
            machine,
            walls: WallSettings::from_settings(&global)?,
            combing: CombingSettings::from_settings(&global)?,
            bridge: BridgeWallSettings::from_settings(&global)?,
            planning: PathPlanningSettings::from_settings(&global)?,
            fan_speed_layer_time,
            overrides: BTreeMap::new(),
            cancel: CancellationToken::new(),
            settings: global,
        })
    }

    /// Builder method: replace settings for one layer.
    pub fn with_overrides(mut self, layer_nr: i64, overrides: LayerOverrides) -> Self {
        self.overrides.insert(layer_nr, overrides);
        self
    }

    /// Builder method: use an existing cancellation token.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Overrides for `layer_nr`, if any.
    pub fn overrides(&self, layer_nr: i64) -> Option<&LayerOverrides> {
        self.overrides.get(&layer_nr)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fan and layer time settings of an extruder, falling back to the first one.
    pub fn fan_speed_layer_time(&self, extruder_nr: usize) -> FanSpeedLayerTimeSettings {
        self.fan_speed_layer_time
            .get(extruder_nr)
            .or_else(|| self.fan_speed_layer_time.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// Receiver of finished layers, called in increasing layer order.
pub trait LayerSink<T> {
    fn consume(&mut self, layer_nr: i64, layer: T) -> Result<()>;
}

impl<T> LayerSink<T> for Vec<(i64, T)> {
    fn consume(&mut self, layer_nr: i64, layer: T) -> Result<()> {
        self.push((layer_nr, layer));
        Ok(())
    }
}

/// Generates layers in parallel and delivers them in order.
#[derive(Debug, Clone, Copy)]
pub struct LayerPipeline<'a> {
    ctx: &'a SliceContext,
}

impl<'a> LayerPipeline<'a> {
    pub fn new(ctx: &'a SliceContext) -> Self {
        Self { ctx }
    }

    /// Generate every layer in `layers` with `generate` and pass the results
    /// to `sink` in increasing layer number.
    ///
    /// Returns the number of delivered layers. When the context is cancelled
    /// the layers delivered so far stay delivered, the rest are dropped and
    /// `Err(Error::Cancelled)` is returned. The first generator or sink error
    /// stops the run the same way and is returned.
    pub fn run<T, G, S>(&self, layers: impl IntoIterator<Item = i64>, generate: G, sink: &mut S) -> Result<usize>
    where
        T: Send,
        G: Fn(&SliceContext, i64) -> Result<T> + Sync,
        S: LayerSink<T> + ?Sized,
    {
        let mut order: Vec<i64> = layers.into_iter().collect();
        order.sort_unstable();
        order.dedup();

        let ctx = self.ctx;
        let cancel = ctx.cancellation_token();
        let stop = AtomicBool::new(false);
        let halted = || cancel.is_cancelled() || stop.load(Ordering::Relaxed);

        let (tx, rx) = mpsc::channel::<(i64, Result<T>)>();
        let (delivered, failure) = std::thread::scope(|scope| {
            let producers = &order;
            let generate = &generate;
            let halted = &halted;
            scope.spawn(move || {
                producers.par_iter().for_each_with(tx, |tx, &layer_nr| {
                    if halted() {
                        return;
                    }
                    // The receiver outlives every producer.
                    let _ = tx.send((layer_nr, generate(ctx, layer_nr)));
                });
            });

            let mut pending: BTreeMap<i64, T> = BTreeMap::new();
            let mut next = 0;
            let mut last_delivered: Option<i64> = None;
            let mut failure: Option<Error> = None;
            for (layer_nr, result) in rx {
                if failure.is_some() {
                    continue;
                }
                match result {
                    Ok(layer) => {
                        pending.insert(layer_nr, layer);
                    }
                    Err(err) => {
                        stop.store(true, Ordering::Relaxed);
                        failure = Some(err);
                        continue;
                    }
                }
                while let Some(&expected) = order.get(next) {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Some(layer) = pending.remove(&expected) else { break };
                    if last_delivered.is_some_and(|prev| prev >= expected) {
                        stop.store(true, Ordering::Relaxed);
                        failure = Some(Error::Internal(format!("layer {expected} delivered out of order")));
                        break;
                    }
                    if let Err(err) = sink.consume(expected, layer) {
                        stop.store(true, Ordering::Relaxed);
                        failure = Some(err);
                        break;
                    }
                    last_delivered = Some(expected);
                    next += 1;
                }
            }
            (next, failure)
        });

        if let Some(err) = failure {
            if matches!(err, Error::Cancelled) {
                log::warn!("layer pipeline cancelled after {delivered} of {} layers", order.len());
            }
            return Err(err);
        }
        if delivered < order.len() {
            log::warn!("layer pipeline cancelled after {delivered} of {} layers", order.len());
            return Err(Error::Cancelled);
        }
        log::debug!("layer pipeline delivered {delivered} layers");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_layers_arrive_in_order() {
        let ctx = SliceContext::new();
        let mut sink: Vec<(i64, i64)> = Vec::new();
        let layers = (-3..40).rev();
        let delivered = LayerPipeline::new(&ctx)
            .run(layers, |_, layer_nr| Ok(layer_nr * 10), &mut sink)
            .unwrap();
        assert_eq!(delivered, 43);
        assert_eq!(sink.first(), Some(&(-3, -30)));
        assert!(sink.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_cancel_before_run() {
        let ctx = SliceContext::new();
        ctx.cancellation_token().cancel();
        let mut sink: Vec<(i64, ())> = Vec::new();
        let result = LayerPipeline::new(&ctx).run(0..10, |_, _| Ok(()), &mut sink);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_generator_error_stops_run() {
        let ctx = SliceContext::new();
        let mut sink: Vec<(i64, i64)> = Vec::new();
        let result = LayerPipeline::new(&ctx).run(
            0..20,
            |_, layer_nr| {
                if layer_nr == 5 {
                    Err(Error::Geometry("broken layer".into()))
                } else {
                    Ok(layer_nr)
                }
            },
            &mut sink,
        );
        assert!(matches!(result, Err(Error::Geometry(_))));
        assert!(sink.iter().all(|&(nr, _)| nr < 5));
    }

    #[test]
    fn test_overrides_lookup() {
        let overrides = LayerOverrides {
            min_layer_time: Some(12.0),
            ..LayerOverrides::default()
        };
        let ctx = SliceContext::new().with_overrides(3, overrides);
        assert_eq!(ctx.overrides(3), Some(&overrides));
        assert!(ctx.overrides(4).is_none());
        assert_eq!(ctx.fan_speed_layer_time(7), FanSpeedLayerTimeSettings::default());
    }

    #[test]
    fn test_context_from_settings() {
        let global = Arc::new(
            Settings::new()
                .with("retraction_combing", "off")
                .with("cool_min_layer_time", "9")
                .with("speed_travel", "200"),
        );
        let ctx = SliceContext::from_settings(global, &[]).unwrap();
        assert_eq!(ctx.combing.mode, crate::config::CombingMode::Off);
        assert_eq!(ctx.fan_speed_layer_time(0).cool_min_layer_time, 9.0);
        assert_eq!(ctx.planning.travel_speed, 200.0);
    }
}
