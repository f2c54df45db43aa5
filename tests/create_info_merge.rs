use buffers_and_batches::pipeline::create_info::{
    CreateInfoError, CreateInfoRegistry, Frequency, Resource, ResourceKind, ShaderCreateInfo,
    VarType,
};

fn ubo_info(name: &str, slot: u32, resource_name: &str) -> ShaderCreateInfo {
    let mut info = ShaderCreateInfo::new(name);
    info.uniform_buffer(Frequency::Pass, slot, "Data", resource_name);
    info
}

fn resources(info: &ShaderCreateInfo) -> Vec<Resource> {
    info.resources().cloned().collect()
}

#[test]
fn finalize_is_idempotent() {
    let mut registry = CreateInfoRegistry::new();
    registry.register(ubo_info("a", 0, "a_data"));
    registry.register(ubo_info("b", 1, "b_data"));
    let mut info = ShaderCreateInfo::new("top");
    info.vertex_source("vs")
        .fragment_source("fs")
        .vertex_in(0, VarType::Vec3, "pos")
        .additional_info("a")
        .additional_info("b");
    info.finalize(&mut registry).expect("first finalize");
    let once = info.clone();
    info.finalize(&mut registry).expect("second finalize");
    assert_eq!(info, once);
}

#[test]
fn merge_is_associative_over_grouping() {
    // {A, B} then {C}
    let mut registry = CreateInfoRegistry::new();
    registry.register(ubo_info("a", 0, "a_data"));
    registry.register(ubo_info("b", 1, "b_data"));
    registry.register(ubo_info("c", 2, "c_data"));
    let mut ab = ShaderCreateInfo::new("ab");
    ab.additional_info("a").additional_info("b");
    registry.register(ab);
    let mut grouped = ShaderCreateInfo::new("grouped");
    grouped.additional_info("ab").additional_info("c");
    grouped.finalize(&mut registry).expect("grouped");

    // {A, B, C}
    let mut registry_flat = CreateInfoRegistry::new();
    registry_flat.register(ubo_info("a", 0, "a_data"));
    registry_flat.register(ubo_info("b", 1, "b_data"));
    registry_flat.register(ubo_info("c", 2, "c_data"));
    let mut flat = ShaderCreateInfo::new("flat");
    flat.additional_info("a")
        .additional_info("b")
        .additional_info("c");
    flat.finalize(&mut registry_flat).expect("flat");

    assert_eq!(resources(&grouped), resources(&flat));
}

#[test]
fn slot_collision_without_auto_location_is_reported() {
    let mut registry = CreateInfoRegistry::new();
    registry.register(ubo_info("b", 0, "b_data"));
    let mut info = ubo_info("a", 0, "a_data");
    info.additional_info("b");
    let err = info.finalize(&mut registry).expect_err("collision");
    match err {
        CreateInfoError::SlotCollision {
            kind, slot, first, second,
        } => {
            assert_eq!(kind, ResourceKind::UniformBuffer);
            assert_eq!(slot, 0);
            assert_eq!(first, "a_data");
            assert_eq!(second, "b_data");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn auto_location_assigns_per_kind_counters() {
    let mut registry = CreateInfoRegistry::new();
    let mut info = ShaderCreateInfo::new("auto");
    info.auto_resource_location(true)
        .uniform_buffer(Frequency::Pass, 9, "Data", "first_ubo")
        .sampler(Frequency::Pass, 9, "sampler2D", "tex")
        .uniform_buffer(Frequency::Batch, 9, "Data", "second_ubo")
        .storage_buffer(Frequency::Batch, 9, "Raw", "ssbo");
    info.finalize(&mut registry).expect("auto slots");
    let by_name = |name: &str| {
        info.resources()
            .find(|r| r.name == name)
            .expect("resource")
            .slot
    };
    // declaration order within each kind, counters independent per kind
    assert_eq!(by_name("first_ubo"), 0);
    assert_eq!(by_name("second_ubo"), 1);
    assert_eq!(by_name("tex"), 0);
    assert_eq!(by_name("ssbo"), 0);
}

#[test]
fn distinct_kinds_may_share_a_slot() {
    let mut registry = CreateInfoRegistry::new();
    let mut info = ShaderCreateInfo::new("mixed");
    info.uniform_buffer(Frequency::Pass, 0, "Data", "ubo")
        .sampler(Frequency::Pass, 0, "sampler2D", "tex")
        .image(Frequency::Batch, 0, "rgba8", "img");
    info.finalize(&mut registry).expect("no collision");
}

#[test]
fn singleton_stage_sources_conflict_on_merge() {
    let mut registry = CreateInfoRegistry::new();
    let mut other = ShaderCreateInfo::new("other");
    other.vertex_source("other_vs");
    registry.register(other);
    let mut info = ShaderCreateInfo::new("top");
    info.vertex_source("top_vs").additional_info("other");
    let err = info.finalize(&mut registry).expect_err("conflict");
    assert!(matches!(
        err,
        CreateInfoError::StageSourceConflict { stage: "Vertex", .. }
    ));
}

#[test]
fn unknown_additional_info_is_reported() {
    let mut registry = CreateInfoRegistry::new();
    let mut info = ShaderCreateInfo::new("top");
    info.additional_info("nowhere");
    let err = info.finalize(&mut registry).expect_err("unknown");
    assert!(matches!(err, CreateInfoError::UnknownInfo(name) if name == "nowhere"));
}

#[test]
fn transitive_merge_is_dependency_ordered() {
    let mut registry = CreateInfoRegistry::new();
    registry.register(ubo_info("leaf", 3, "leaf_data"));
    let mut middle = ubo_info("middle", 2, "middle_data");
    middle.additional_info("leaf");
    registry.register(middle);
    let mut top = ubo_info("top", 1, "top_data");
    top.additional_info("middle");
    top.finalize(&mut registry).expect("chain");
    let names: Vec<&str> = top.resources().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["top_data", "middle_data", "leaf_data"]);
}
