use buffers_and_batches::driver::trace::TraceDriver;
use buffers_and_batches::driver::{Driver, DriverLimits, TextureId};
use buffers_and_batches::pipeline::state::{
    Blend, Culling, DepthTest, StateManager, WriteMask,
};

#[test]
fn second_apply_issues_zero_driver_calls() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.set_blend(Blend::Alpha);
    state.set_depth_test(DepthTest::LessEqual);
    state.apply(&*trace);
    assert!(trace.log_len() > 0);
    trace.take_log();
    state.apply(&*trace);
    assert_eq!(trace.take_log(), vec![]);
}

#[test]
fn each_changed_group_issues_exactly_one_call() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace); // converge the defaults
    trace.take_log();

    state.set_blend(Blend::Additive);
    state.set_culling(Culling::Back);
    state.apply(&*trace);
    let log = trace.take_log();
    assert_eq!(log.len(), 2);
    assert_eq!(trace.count_calls("set_blend"), 0); // drained
    assert_eq!(log.iter().filter(|c| c.entry == "set_blend").count(), 1);
    assert_eq!(log.iter().filter(|c| c.entry == "set_culling").count(), 1);
}

#[test]
fn redundant_set_is_free() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    // setting the already-applied value changes no bits
    state.set_write_mask(WriteMask::COLOR | WriteMask::DEPTH);
    state.apply(&*trace);
    assert_eq!(trace.log_len(), 0);
}

#[test]
fn mutable_state_diffs_by_bit_pattern() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    state.set_line_width(2.5);
    state.set_depth_range(0.1, 0.9);
    state.apply(&*trace);
    assert_eq!(trace.count_calls("set_line_width"), 1);
    assert_eq!(trace.count_calls("set_depth_range"), 1);
    assert_eq!(trace.count_calls("set_point_size"), 0);
    trace.take_log();
    state.set_line_width(2.5); // same bits
    state.apply(&*trace);
    assert_eq!(trace.log_len(), 0);
}

#[test]
fn force_all_touches_every_group_on_the_next_apply() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    state.force_all();
    state.apply(&*trace);
    for entry in [
        "set_blend",
        "set_write_mask",
        "set_culling",
        "set_depth_test",
        "set_stencil",
        "set_provoking_vertex",
        "set_line_width",
        "set_depth_range",
        "set_point_size",
        "set_stencil_values",
    ] {
        assert_eq!(trace.count_calls(entry), 1, "{entry} not reissued");
    }
}

#[test]
fn dirty_texture_units_flush_as_one_contiguous_bind() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    state.bind_texture(2, TextureId(11));
    state.bind_texture(5, TextureId(12));
    state.bind_texture(3, TextureId(13));
    state.apply(&*trace);
    let log = trace.take_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].entry, "texture_bind_units");
    assert!(log[0].detail.contains("first=2"));
    assert!(log[0].detail.contains("count=4"));
}

#[test]
fn without_multi_bind_units_flush_individually() {
    let limits = DriverLimits {
        supports_multi_bind: false,
        ..DriverLimits::default()
    };
    let trace = TraceDriver::with_limits(limits);
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    state.bind_texture(0, TextureId(21));
    state.bind_texture(7, TextureId(22));
    state.apply(&*trace);
    assert_eq!(trace.count_calls("texture_bind_unit"), 2);
    assert_eq!(trace.count_calls("texture_bind_units"), 0);
}

#[test]
#[should_panic(expected = "Texture unit out of range")]
fn binding_past_the_unit_count_is_fatal() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    let max = trace.limits().max_texture_units;
    state.bind_texture(max, TextureId(1));
}

#[test]
fn rebinding_the_same_unit_keeps_one_call() {
    let trace = TraceDriver::new();
    let mut state = StateManager::new(trace.limits());
    state.apply(&*trace);
    trace.take_log();
    state.bind_texture(4, TextureId(1));
    state.bind_texture(4, TextureId(2)); // last write wins
    state.apply(&*trace);
    let log = trace.take_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].detail.contains("textures=[2]"));
}
