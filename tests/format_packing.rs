use buffers_and_batches::bindings::vertex_format::{ComponentType, FetchMode, VertexFormat};

/// The documented alignment rule, restated for checking pack results.
fn expected_alignment(comp_type: ComponentType, comp_len: u32, minimum_stride: usize) -> usize {
    let comp_size = comp_type.byte_size();
    if comp_len == 3 && comp_size <= 2 {
        4 * comp_size
    } else {
        minimum_stride.max(comp_size)
    }
}

fn check_packed(format: &VertexFormat, minimum_stride: usize) {
    // stride is a multiple of every attribute's alignment requirement
    for attr in format.attributes() {
        let alignment = expected_alignment(attr.comp_type(), attr.comp_len(), minimum_stride);
        assert_eq!(
            format.stride() % alignment,
            0,
            "stride {} not a multiple of alignment {} for {}",
            format.stride(),
            alignment,
            attr.name()
        );
        assert_eq!(
            attr.offset() % alignment,
            0,
            "offset {} misaligned for {}",
            attr.offset(),
            attr.name()
        );
    }
    // no two attributes' byte ranges overlap
    let mut ranges: Vec<(usize, usize, &str)> = format
        .attributes()
        .iter()
        .map(|a| (a.offset(), a.offset() + a.byte_size(), a.name()))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "{} [{}, {}) overlaps {} [{}, {})",
            pair[0].2,
            pair[0].0,
            pair[0].1,
            pair[1].2,
            pair[1].0,
            pair[1].1
        );
    }
}

#[test]
fn vec3_plus_vec2_packs_to_stride_20() {
    let mut format = VertexFormat::new();
    format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
    format.add_attribute("uv", ComponentType::F32, 2, FetchMode::Float);
    format.pack(4);
    assert_eq!(format.attribute(0).offset(), 0);
    // uv lands right after pos, already on a 4-byte boundary
    assert_eq!(format.attribute(1).offset(), 12);
    assert_eq!(format.stride(), 20);
    check_packed(&format, 4);
}

#[test]
fn packing_is_deterministic_for_mixed_registrations() {
    let registrations: [&[(ComponentType, u32, FetchMode)]; 4] = [
        &[
            (ComponentType::F32, 3, FetchMode::Float),
            (ComponentType::U8, 4, FetchMode::IntToFloatUnit),
            (ComponentType::I16, 2, FetchMode::IntToFloat),
        ],
        &[
            (ComponentType::U16, 3, FetchMode::IntToFloatUnit),
            (ComponentType::F32, 1, FetchMode::Float),
        ],
        &[
            (ComponentType::U8, 1, FetchMode::Int),
            (ComponentType::U8, 2, FetchMode::Int),
            (ComponentType::F16, 4, FetchMode::Float),
            (ComponentType::I32, 1, FetchMode::Int),
        ],
        &[(ComponentType::I8, 3, FetchMode::IntToFloatUnit)],
    ];
    for minimum_stride in [1, 4] {
        for attrs in registrations {
            let mut format = VertexFormat::new();
            for (i, (comp_type, comp_len, fetch)) in attrs.iter().enumerate() {
                format.add_attribute(&format!("attr{i}"), *comp_type, *comp_len, *fetch);
            }
            format.pack(minimum_stride);
            check_packed(&format, minimum_stride);

            // packing the same registrations again reproduces the layout
            let mut again = VertexFormat::new();
            for (i, (comp_type, comp_len, fetch)) in attrs.iter().enumerate() {
                again.add_attribute(&format!("attr{i}"), *comp_type, *comp_len, *fetch);
            }
            again.pack(minimum_stride);
            assert_eq!(again.stride(), format.stride());
            for (a, b) in again.attributes().iter().zip(format.attributes()) {
                assert_eq!(a.offset(), b.offset());
            }
        }
    }
}

#[test]
fn minimum_stride_pads_small_attributes() {
    let mut format = VertexFormat::new();
    format.add_attribute("flag", ComponentType::U8, 1, FetchMode::Int);
    format.add_attribute("weight", ComponentType::U8, 1, FetchMode::IntToFloatUnit);
    format.pack(4);
    // each attribute respects the backend-supplied 4-byte minimum
    assert_eq!(format.attribute(1).offset(), 4);
    assert_eq!(format.stride(), 8);
}

#[test]
#[should_panic(expected = "Too many attributes")]
fn seventeenth_attribute_is_fatal() {
    let mut format = VertexFormat::new();
    for i in 0..17 {
        format.add_attribute(&format!("a{i}"), ComponentType::F32, 1, FetchMode::Float);
    }
}

#[test]
#[should_panic(expected = "exactly one attribute")]
fn texture_buffer_pack_rejects_multiple_attributes() {
    let mut format = VertexFormat::new();
    format.add_attribute("a", ComponentType::F32, 1, FetchMode::Float);
    format.add_attribute("b", ComponentType::F32, 1, FetchMode::Float);
    format.pack_for_texture_buffer();
}

#[test]
#[should_panic(expected = "requires a packed format")]
fn multi_load_before_pack_is_fatal() {
    let mut format = VertexFormat::new();
    format.add_attribute("pos", ComponentType::F32, 2, FetchMode::Float);
    format.multi_load_expand(2);
}

#[test]
fn multi_load_offsets_step_by_stride() {
    let mut format = VertexFormat::new();
    format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
    format.add_attribute("nor", ComponentType::I16, 4, FetchMode::IntToFloatUnit);
    format.pack(4);
    let stride = format.stride();
    let base_offsets: Vec<usize> = format.attributes().iter().map(|a| a.offset()).collect();
    format.multi_load_expand(3);
    assert_eq!(format.attribute_len(), 6);
    for load in 1..3 {
        for (i, base) in base_offsets.iter().enumerate() {
            let name = format!("{}{load}", ["pos", "nor"][i]);
            let index = format.attribute_index_of(&name).expect("expanded attribute");
            assert_eq!(format.attribute(index).offset(), base + stride * load);
        }
    }
}
