//! Parallel layer generation with ordered delivery.

use slicecore::gcode::{FinalizedLayer, GCodePathConfig, LayerGeometry, LayerPlan, PrintFeatureType};
use slicecore::geometry::{Point, Polygon};
use slicecore::pipeline::LayerOverrides;
use slicecore::{CancellationToken, Error, LayerPipeline, LayerSink, Result, SliceContext};

fn plan_layer(ctx: &SliceContext, layer_nr: i64) -> Result<FinalizedLayer> {
    ctx.cancellation_token().check()?;
    let outline = vec![Polygon::rectangle(Point::new(0, 0), Point::new(20_000, 20_000))];
    let geometry = LayerGeometry::from_outline(outline.clone());
    let thickness = 200;
    let mut plan = LayerPlan::new(ctx, layer_nr, thickness * (layer_nr + 1), thickness, 0, &geometry);
    let config = GCodePathConfig::new(PrintFeatureType::OuterWall, 400, thickness, 40.0);
    plan.add_polygons_by_optimizer(&outline, &config, 0, 1.0, false, false, None);
    plan.process_fan_speed_and_minimal_layer_time(Point::zero());
    Ok(plan.finalize())
}

/// Collects layers and cancels the run once enough arrived.
struct CancellingSink {
    token: CancellationToken,
    cancel_after: usize,
    layers: Vec<FinalizedLayer>,
}

impl LayerSink<FinalizedLayer> for CancellingSink {
    fn consume(&mut self, _layer_nr: i64, layer: FinalizedLayer) -> Result<()> {
        self.layers.push(layer);
        if self.layers.len() == self.cancel_after {
            self.token.cancel();
        }
        Ok(())
    }
}

#[test]
fn test_layers_are_delivered_in_order() {
    let ctx = SliceContext::new();
    let mut sink: Vec<(i64, FinalizedLayer)> = Vec::new();
    let delivered = LayerPipeline::new(&ctx).run(0..24, plan_layer, &mut sink).unwrap();

    assert_eq!(delivered, 24);
    for (expected, (layer_nr, layer)) in sink.iter().enumerate() {
        assert_eq!(*layer_nr, expected as i64);
        assert_eq!(layer.layer_nr, expected as i64);
        assert_eq!(layer.z, 200 * (expected as i64 + 1));
    }
}

#[test]
fn test_layer_overrides_reach_the_plan() {
    let overrides = LayerOverrides {
        min_layer_time: Some(30.0),
        ..LayerOverrides::default()
    };
    let ctx = SliceContext::new().with_overrides(2, overrides);
    let mut sink: Vec<(i64, FinalizedLayer)> = Vec::new();
    LayerPipeline::new(&ctx).run(0..4, plan_layer, &mut sink).unwrap();

    let slow = &sink[2].1;
    let normal = &sink[1].1;
    assert!(slow.total_time() >= 30.0 - 0.1 - 1e-6);
    assert!(normal.total_time() < 30.0);
}

#[test]
fn test_cancel_from_sink_stops_delivery() {
    let token = CancellationToken::new();
    let ctx = SliceContext::new().with_cancellation_token(token.clone());
    let mut sink = CancellingSink {
        token,
        cancel_after: 3,
        layers: Vec::new(),
    };
    let result = LayerPipeline::new(&ctx).run(0..50, plan_layer, &mut sink);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(sink.layers.len(), 3);
    let numbers: Vec<i64> = sink.layers.iter().map(|l| l.layer_nr).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
}

#[test]
fn test_raft_layers_come_first() {
    let ctx = SliceContext::new();
    let mut sink: Vec<(i64, i64)> = Vec::new();
    LayerPipeline::new(&ctx)
        .run([2, -2, 0, 1, -1], |_, layer_nr| Ok(layer_nr), &mut sink)
        .unwrap();
    let order: Vec<i64> = sink.iter().map(|(nr, _)| *nr).collect();
    assert_eq!(order, vec![-2, -1, 0, 1, 2]);
}
