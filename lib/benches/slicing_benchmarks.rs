//! Slicing benchmarks
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slicecore::config::WallSettings;
use slicecore::gcode::{GCodePathConfig, LayerGeometry, LayerPlan, PrintFeatureType};
use slicecore::geometry::{Point, Polygon};
use slicecore::{scale, LayerPipeline, SliceContext, WallToolPaths};

fn square_with_hole() -> Vec<Polygon> {
    let outer = Polygon::rectangle(Point::new(0, 0), Point::new(scale(20.0), scale(20.0)));
    let mut hole = Polygon::rectangle(Point::new(scale(6.0), scale(6.0)), Point::new(scale(14.0), scale(14.0)));
    hole.make_clockwise();
    vec![outer, hole]
}

fn wall_generation_benchmark(c: &mut Criterion) {
    let outline = square_with_hole();
    let settings = WallSettings::default().with_wall_count(3);
    c.bench_function("wall_toolpaths_square_with_hole", |b| {
        b.iter(|| {
            let mut walls = WallToolPaths::from_settings(black_box(&outline), &settings);
            black_box(walls.generate().len())
        })
    });
}

fn large_outline_benchmark(c: &mut Criterion) {
    let outline = vec![Polygon::rectangle(Point::new(0, 0), Point::new(scale(200.0), scale(200.0)))];
    let settings = WallSettings::default().with_wall_count(3);
    let mut group = c.benchmark_group("large_outline");
    group.sample_size(10);
    group.bench_function("wall_toolpaths_200mm_square", |b| {
        b.iter(|| {
            let mut walls = WallToolPaths::from_settings(black_box(&outline), &settings);
            black_box(walls.generate().len())
        })
    });
    group.finish();
}

fn plan_layer(ctx: &SliceContext, layer_nr: i64, outline: &[Polygon]) -> usize {
    let mut walls = WallToolPaths::from_settings(outline, &ctx.walls);
    let toolpaths = walls.generate().to_vec();
    let geometry = LayerGeometry::from_outline(outline.to_vec()).with_infill_area(walls.get_inner_contour().clone());
    let mut plan = LayerPlan::new(ctx, layer_nr, 200 * (layer_nr + 1), 200, 0, &geometry);
    let config = GCodePathConfig::new(PrintFeatureType::InnerWall, 400, 200, 60.0);
    plan.set_is_inside(true);
    for bucket in toolpaths.iter().rev() {
        plan.add_walls(bucket, &config, &config.with_bridge(), 0, 1.0, false);
    }
    plan.process_fan_speed_and_minimal_layer_time(Point::zero());
    plan.finalize().paths().count()
}

fn layer_planning_benchmark(c: &mut Criterion) {
    let outline = square_with_hole();
    let ctx = SliceContext::new();
    c.bench_function("layer_plan_square_with_hole", |b| {
        b.iter(|| black_box(plan_layer(&ctx, 5, black_box(&outline))))
    });
    c.bench_function("pipeline_32_layers", |b| {
        b.iter(|| {
            let mut sink: Vec<(i64, usize)> = Vec::new();
            LayerPipeline::new(&ctx)
                .run(0..32, |ctx, layer_nr| Ok(plan_layer(ctx, layer_nr, &outline)), &mut sink)
                .map(|delivered| black_box(delivered))
        })
    });
}

criterion_group!(
    benches,
    wall_generation_benchmark,
    large_outline_benchmark,
    layer_planning_benchmark
);
criterion_main!(benches);
