// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Global pipeline state: desired vs. applied, diffed lazily before draws.
//!
//! State lives in two plain bit-packed records.  The immutable word holds the modes
//! that force pipeline object rebuilds on some backends (blend, culling,
//! depth/stencil tests, write masks); the mutable words hold the cheap values (line
//! width, depth range, point size, stencil reference/masks) as `f32` bit patterns.
//! [`StateManager::apply`] XORs desired against applied and issues exactly one
//! driver call per changed group, so a draw with unchanged state costs zero calls.
//!
//! Texture units are tracked the same way: pending binds accumulate in a per-unit
//! dirty bitmask and flush as one batched call over the contiguous dirty range when
//! the driver supports it.

use crate::driver::{Driver, DriverLimits, TextureId};

/// Hard cap on tracked texture units; drivers may report fewer.
pub const MAX_TEXTURE_UNITS: usize = 32;

/// Blend equation presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Blend {
    None = 0,
    Alpha,
    AlphaPremult,
    Additive,
    AdditivePremult,
    Multiply,
    Subtract,
    Invert,
}

impl Blend {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Blend::None,
            1 => Blend::Alpha,
            2 => Blend::AlphaPremult,
            3 => Blend::Additive,
            4 => Blend::AdditivePremult,
            5 => Blend::Multiply,
            6 => Blend::Subtract,
            7 => Blend::Invert,
            _ => unreachable!("invalid blend bits"),
        }
    }
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Culling {
    None = 0,
    Front,
    Back,
}

impl Culling {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Culling::None,
            1 => Culling::Front,
            2 => Culling::Back,
            _ => unreachable!("invalid culling bits"),
        }
    }
}

/// Depth comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DepthTest {
    None = 0,
    Always,
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
}

impl DepthTest {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => DepthTest::None,
            1 => DepthTest::Always,
            2 => DepthTest::Less,
            3 => DepthTest::LessEqual,
            4 => DepthTest::Equal,
            5 => DepthTest::Greater,
            6 => DepthTest::GreaterEqual,
            _ => unreachable!("invalid depth test bits"),
        }
    }
}

/// Stencil comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StencilTest {
    None = 0,
    Always,
    Equal,
    NotEqual,
}

impl StencilTest {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => StencilTest::None,
            1 => StencilTest::Always,
            2 => StencilTest::Equal,
            3 => StencilTest::NotEqual,
            _ => unreachable!("invalid stencil test bits"),
        }
    }
}

/// What a passing stencil test writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StencilOp {
    None = 0,
    Replace,
    CountDepthPass,
    CountDepthFail,
}

impl StencilOp {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => StencilOp::None,
            1 => StencilOp::Replace,
            2 => StencilOp::CountDepthPass,
            3 => StencilOp::CountDepthFail,
            _ => unreachable!("invalid stencil op bits"),
        }
    }
}

/// Which vertex carries flat-interpolated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProvokingVertex {
    First = 0,
    Last,
}

impl ProvokingVertex {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => ProvokingVertex::First,
            1 => ProvokingVertex::Last,
            _ => unreachable!("invalid provoking vertex bits"),
        }
    }
}

/// Per-channel write enables, packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMask(u8);

impl WriteMask {
    pub const NONE: WriteMask = WriteMask(0);
    pub const COLOR: WriteMask = WriteMask(0b0000_1111);
    pub const DEPTH: WriteMask = WriteMask(0b0001_0000);
    pub const STENCIL: WriteMask = WriteMask(0b0010_0000);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        WriteMask(bits & 0b0011_1111)
    }

    pub fn contains(self, other: WriteMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for WriteMask {
    type Output = WriteMask;
    fn bitor(self, rhs: WriteMask) -> WriteMask {
        WriteMask(self.0 | rhs.0)
    }
}

// Immutable-word field layout: shift and width per group.
const BLEND: (u32, u32) = (0, 4);
const WRITE_MASK: (u32, u32) = (4, 6);
const CULLING: (u32, u32) = (10, 2);
const DEPTH_TEST: (u32, u32) = (12, 3);
const STENCIL_TEST: (u32, u32) = (15, 2);
const STENCIL_OP: (u32, u32) = (17, 2);
const PROVOKING: (u32, u32) = (19, 1);
const CLIP_DISTANCES: (u32, u32) = (20, 3);

fn field(word: u64, group: (u32, u32)) -> u64 {
    (word >> group.0) & ((1 << group.1) - 1)
}

fn set_field(word: u64, group: (u32, u32), value: u64) -> u64 {
    let mask = ((1u64 << group.1) - 1) << group.0;
    debug_assert!(value << group.0 & !mask == 0, "field value out of range");
    (word & !mask) | (value << group.0)
}

fn changed(diff: u64, group: (u32, u32)) -> bool {
    field(diff, group) != 0
}

// Mutable-word indices.
const LINE_WIDTH: usize = 0;
const DEPTH_NEAR: usize = 1;
const DEPTH_FAR: usize = 2;
const POINT_SIZE: usize = 3;
const STENCIL_VALUES: usize = 4;
const MUTABLE_LEN: usize = 5;

fn pack_stencil(reference: u8, compare_mask: u8, write_mask: u8) -> u32 {
    reference as u32 | (compare_mask as u32) << 8 | (write_mask as u32) << 16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextureUnits {
    pending: [Option<TextureId>; MAX_TEXTURE_UNITS],
    bound: [Option<TextureId>; MAX_TEXTURE_UNITS],
    dirty: u32,
    max_units: u32,
    multi_bind: bool,
}

impl TextureUnits {
    fn new(limits: &DriverLimits) -> Self {
        assert!(
            limits.max_texture_units as usize <= MAX_TEXTURE_UNITS,
            "Driver reports more texture units than tracked"
        );
        TextureUnits {
            pending: [None; MAX_TEXTURE_UNITS],
            bound: [None; MAX_TEXTURE_UNITS],
            dirty: 0,
            max_units: limits.max_texture_units,
            multi_bind: limits.supports_multi_bind,
        }
    }

    fn bind(&mut self, unit: u32, texture: TextureId) {
        assert!(unit < self.max_units, "Texture unit out of range");
        self.pending[unit as usize] = Some(texture);
        self.dirty |= 1 << unit;
    }

    fn flush(&mut self, driver: &dyn Driver) {
        if self.dirty == 0 {
            return;
        }
        if self.multi_bind {
            let first = self.dirty.trailing_zeros();
            let last = 31 - self.dirty.leading_zeros();
            let textures: Vec<TextureId> = (first..=last)
                .map(|unit| {
                    let unit = unit as usize;
                    self.pending[unit]
                        .or(self.bound[unit])
                        .unwrap_or(TextureId::NONE)
                })
                .collect();
            driver.texture_bind_units(first, &textures);
        } else {
            for unit in 0..self.max_units {
                if self.dirty & (1 << unit) != 0 {
                    let texture = self.pending[unit as usize].expect("dirty unit has a binding");
                    driver.texture_bind_unit(unit, texture);
                }
            }
        }
        for unit in 0..self.max_units as usize {
            if self.dirty & (1 << unit) != 0 {
                self.bound[unit] = self.pending[unit].take();
            }
        }
        self.dirty = 0;
    }

    fn force_all(&mut self) {
        for unit in 0..self.max_units as usize {
            if let Some(texture) = self.bound[unit] {
                self.pending[unit] = Some(texture);
                self.dirty |= 1 << unit;
            }
        }
    }
}

/// Holds desired vs. applied pipeline state and converges them before draws.
///
/// # Example
///
/// ```
/// use buffers_and_batches::driver::trace::TraceDriver;
/// use buffers_and_batches::driver::Driver;
/// use buffers_and_batches::pipeline::state::{Blend, StateManager};
///
/// let trace = TraceDriver::new();
/// let mut state = StateManager::new(trace.limits());
/// state.set_blend(Blend::Alpha);
/// state.apply(&*trace);
/// let first = trace.take_log().len();
/// state.apply(&*trace); // nothing changed
/// assert!(first > 0);
/// assert_eq!(trace.log_len(), 0);
/// ```
#[derive(Debug)]
pub struct StateManager {
    desired: u64,
    applied: u64,
    desired_mutable: [u32; MUTABLE_LEN],
    applied_mutable: [u32; MUTABLE_LEN],
    units: TextureUnits,
}

impl StateManager {
    pub fn new(limits: DriverLimits) -> Self {
        let mut desired = 0u64;
        desired = set_field(desired, BLEND, Blend::None as u64);
        desired = set_field(
            desired,
            WRITE_MASK,
            (WriteMask::COLOR | WriteMask::DEPTH).bits() as u64,
        );
        desired = set_field(desired, CULLING, Culling::None as u64);
        desired = set_field(desired, DEPTH_TEST, DepthTest::None as u64);
        desired = set_field(desired, STENCIL_TEST, StencilTest::None as u64);
        desired = set_field(desired, STENCIL_OP, StencilOp::None as u64);
        desired = set_field(desired, PROVOKING, ProvokingVertex::Last as u64);
        desired = set_field(desired, CLIP_DISTANCES, 0);
        let mut desired_mutable = [0u32; MUTABLE_LEN];
        desired_mutable[LINE_WIDTH] = 1.0f32.to_bits();
        desired_mutable[DEPTH_NEAR] = 0.0f32.to_bits();
        desired_mutable[DEPTH_FAR] = 1.0f32.to_bits();
        desired_mutable[POINT_SIZE] = 1.0f32.to_bits();
        desired_mutable[STENCIL_VALUES] = pack_stencil(0, 0xFF, 0xFF);
        let mut manager = StateManager {
            desired,
            applied: 0,
            desired_mutable,
            applied_mutable: [0; MUTABLE_LEN],
            units: TextureUnits::new(&limits),
        };
        manager.force_all();
        manager
    }

    // -- desired-state setters ----------------------------------------------

    pub fn set_blend(&mut self, blend: Blend) {
        self.desired = set_field(self.desired, BLEND, blend as u64);
    }

    pub fn set_write_mask(&mut self, mask: WriteMask) {
        self.desired = set_field(self.desired, WRITE_MASK, mask.bits() as u64);
    }

    pub fn set_culling(&mut self, culling: Culling) {
        self.desired = set_field(self.desired, CULLING, culling as u64);
    }

    pub fn set_depth_test(&mut self, test: DepthTest) {
        self.desired = set_field(self.desired, DEPTH_TEST, test as u64);
    }

    pub fn set_stencil_test(&mut self, test: StencilTest, op: StencilOp) {
        self.desired = set_field(self.desired, STENCIL_TEST, test as u64);
        self.desired = set_field(self.desired, STENCIL_OP, op as u64);
    }

    pub fn set_provoking_vertex(&mut self, provoking: ProvokingVertex) {
        self.desired = set_field(self.desired, PROVOKING, provoking as u64);
    }

    pub fn set_clip_distances(&mut self, count: u32) {
        assert!(count <= 6, "Clip distance count out of range");
        self.desired = set_field(self.desired, CLIP_DISTANCES, count as u64);
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.desired_mutable[LINE_WIDTH] = width.to_bits();
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        self.desired_mutable[DEPTH_NEAR] = near.to_bits();
        self.desired_mutable[DEPTH_FAR] = far.to_bits();
    }

    pub fn set_point_size(&mut self, size: f32) {
        self.desired_mutable[POINT_SIZE] = size.to_bits();
    }

    pub fn set_stencil_values(&mut self, reference: u8, compare_mask: u8, write_mask: u8) {
        self.desired_mutable[STENCIL_VALUES] = pack_stencil(reference, compare_mask, write_mask);
    }

    /// Queues a texture for a unit; issued at the next [`apply`](Self::apply).
    ///
    /// # Panics
    ///
    /// Panics on a unit at or above the driver-reported count.
    pub fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.units.bind(unit, texture);
    }

    // -- desired-state getters ----------------------------------------------

    pub fn blend(&self) -> Blend {
        Blend::from_bits(field(self.desired, BLEND))
    }

    pub fn write_mask(&self) -> WriteMask {
        WriteMask::from_bits(field(self.desired, WRITE_MASK) as u8)
    }

    pub fn culling(&self) -> Culling {
        Culling::from_bits(field(self.desired, CULLING))
    }

    pub fn depth_test(&self) -> DepthTest {
        DepthTest::from_bits(field(self.desired, DEPTH_TEST))
    }

    pub fn stencil_test(&self) -> (StencilTest, StencilOp) {
        (
            StencilTest::from_bits(field(self.desired, STENCIL_TEST)),
            StencilOp::from_bits(field(self.desired, STENCIL_OP)),
        )
    }

    pub fn line_width(&self) -> f32 {
        f32::from_bits(self.desired_mutable[LINE_WIDTH])
    }

    // -- convergence ---------------------------------------------------------

    /// Converges applied state to desired state, one driver call per changed
    /// group.  Called once per draw dispatch.
    pub fn apply(&mut self, driver: &dyn Driver) {
        let diff = self.desired ^ self.applied;
        if diff != 0 {
            if changed(diff, BLEND) {
                driver.set_blend(self.blend());
            }
            if changed(diff, WRITE_MASK) {
                driver.set_write_mask(self.write_mask());
            }
            if changed(diff, CULLING) {
                driver.set_culling(self.culling());
            }
            if changed(diff, DEPTH_TEST) {
                driver.set_depth_test(self.depth_test());
            }
            if changed(diff, STENCIL_TEST) || changed(diff, STENCIL_OP) {
                let (test, op) = self.stencil_test();
                driver.set_stencil(test, op);
            }
            if changed(diff, PROVOKING) {
                driver.set_provoking_vertex(ProvokingVertex::from_bits(field(
                    self.desired,
                    PROVOKING,
                )));
            }
            if changed(diff, CLIP_DISTANCES) {
                driver.set_clip_distances(field(self.desired, CLIP_DISTANCES) as u32);
            }
            self.applied = self.desired;
        }
        let mutable_diff: [u32; MUTABLE_LEN] = std::array::from_fn(|i| {
            self.desired_mutable[i] ^ self.applied_mutable[i]
        });
        if mutable_diff != [0; MUTABLE_LEN] {
            if mutable_diff[LINE_WIDTH] != 0 {
                driver.set_line_width(f32::from_bits(self.desired_mutable[LINE_WIDTH]));
            }
            if mutable_diff[DEPTH_NEAR] != 0 || mutable_diff[DEPTH_FAR] != 0 {
                driver.set_depth_range(
                    f32::from_bits(self.desired_mutable[DEPTH_NEAR]),
                    f32::from_bits(self.desired_mutable[DEPTH_FAR]),
                );
            }
            if mutable_diff[POINT_SIZE] != 0 {
                driver.set_point_size(f32::from_bits(self.desired_mutable[POINT_SIZE]));
            }
            if mutable_diff[STENCIL_VALUES] != 0 {
                let packed = self.desired_mutable[STENCIL_VALUES];
                driver.set_stencil_values(
                    packed as u8,
                    (packed >> 8) as u8,
                    (packed >> 16) as u8,
                );
            }
            self.applied_mutable = self.desired_mutable;
        }
        self.units.flush(driver);
    }

    /// Resets applied state to the complement of desired, so the next
    /// [`apply`](Self::apply) touches every group.  For recovery after
    /// uncontrolled external driver calls.
    pub fn force_all(&mut self) {
        self.applied = !self.desired;
        self.applied_mutable = self.desired_mutable.map(|word| !word);
        self.units.force_all();
    }
}
