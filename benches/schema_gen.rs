//! Benchmarks for schema compilation and CPU-side marshaling.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Vec3};

use gpuflock::kernels::tick_kernels_wgsl;
use gpuflock::schema::Schema;
use gpuflock::sim::{BoidInput, BoidObject, SimParams};
use gpuflock::RecordType;

fn bench_schema_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_compile");

    group.bench_function("boid_input", |b| {
        b.iter(|| black_box(Schema::for_record::<BoidInput>(true, Some(4096), false).unwrap()))
    });

    group.bench_function("boid_object", |b| {
        b.iter(|| black_box(Schema::for_record::<BoidObject>(true, Some(4096), false).unwrap()))
    });

    group.bench_function("sim_params_uniform", |b| {
        b.iter(|| black_box(Schema::for_record::<SimParams>(false, None, true).unwrap()))
    });

    group.finish();
}

fn bench_wgsl_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("wgsl_generation");

    let input = Schema::for_record::<BoidInput>(true, Some(4096), false).unwrap();
    let object = Schema::for_record::<BoidObject>(true, Some(4096), false).unwrap();

    group.bench_function("struct_decl", |b| {
        b.iter(|| black_box(input.wgsl_struct_decl()))
    });

    group.bench_function("binding_decl", |b| {
        b.iter(|| black_box(object.wgsl_binding_decl(0, 1, "objects")))
    });

    group.bench_function("tick_kernels", |b| b.iter(|| black_box(tick_kernels_wgsl())));

    group.finish();
}

fn bench_marshaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshaling");

    let input_schema = Schema::for_record::<BoidInput>(true, Some(4096), false).unwrap();
    let mut record = BoidInput::zeroed();
    record.goal = Vec3::new(1.0, 2.0, 3.0);
    record.speed = 5.0;
    record.alive = true;

    group.bench_function("write_record", |b| {
        let mut bytes = vec![0u8; input_schema.stride() as usize];
        b.iter(|| input_schema.write_record(black_box(&mut bytes), black_box(&record)))
    });

    group.bench_function("read_record", |b| {
        let mut bytes = vec![0u8; input_schema.stride() as usize];
        input_schema.write_record(&mut bytes, &record);
        b.iter(|| black_box(input_schema.read_record::<BoidInput>(black_box(&bytes))))
    });

    let object_schema = Schema::for_record::<BoidObject>(true, Some(4096), false).unwrap();
    let mut object = BoidObject::zeroed();
    object.transform = Mat4::from_translation(Vec3::splat(4.0));
    object.visible = true;

    for count in [64u32, 1024, 4096] {
        group.bench_with_input(
            BenchmarkId::new("write_population", count),
            &count,
            |b, &count| {
                let mut bytes = vec![0u8; object_schema.byte_size() as usize];
                let stride = object_schema.stride() as usize;
                b.iter(|| {
                    for i in 0..count as usize {
                        object_schema.write_record(&mut bytes[i * stride..], &object);
                    }
                    black_box(&bytes);
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_schema_compile,
    bench_wgsl_generation,
    bench_marshaling
);
criterion_main!(benches);
