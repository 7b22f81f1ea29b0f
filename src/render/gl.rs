//! glow execution of frame plans.
//!
//! The [`TileRenderer`] lives on the render thread and is only ever touched
//! from inside an egui paint callback. Each frame pins the cache's current
//! buffers under a new epoch, uploads any buffer it has not seen yet, draws
//! the planned ranges and inserts a fence. Epochs are reported complete to
//! the [`SweepCache`] as their fences signal, which is what lets retired
//! buffers (and their GPU copies) be freed.

use super::plan::{plan_frame, FramePlan};
use super::{classify_gl_error, RenderError};
use crate::camera::ViewTransform;
use crate::radar::SweepKey;
use crate::raster::{BufferId, RasterBuffer, RasterVertex};
use crate::sweep_cache::SweepCache;
use glow::HasContext as _;
use std::collections::{HashMap, VecDeque};
use std::mem::{offset_of, size_of};

const SHADER_VERSION: &str = if cfg!(target_arch = "wasm32") {
    "#version 300 es"
} else {
    "#version 330"
};

const VERTEX_SHADER: &str = r#"
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec4 a_color;
uniform mat4 u_matrix;
uniform float u_opacity;
out vec4 v_color;
void main() {
    v_color = a_color * u_opacity;
    gl_Position = u_matrix * vec4(a_position, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
precision mediump float;
in vec4 v_color;
out vec4 out_color;
void main() {
    out_color = v_color;
}
"#;

/// GPU copy of one raster buffer.
struct GpuSweep {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    bytes: usize,
}

/// A submitted frame waiting for the GPU.
struct InFlight {
    epoch: u64,
    /// `None` when nothing was submitted or the fence could not be created
    fence: Option<FrameFence>,
}

/// Native fences are raw `GLsync` pointers. They are created, polled and
/// deleted on the render thread only.
struct FrameFence(glow::Fence);

unsafe impl Send for FrameFence {}

/// Counters for one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub epoch: u64,
    pub buffers: usize,
    pub draw_calls: usize,
    pub vertices: u64,
    pub uploads: usize,
    pub visible_tiles: usize,
    pub culled_tiles: usize,
    pub freed: usize,
}

/// Owns the sweep shader and every uploaded sweep buffer.
pub struct TileRenderer {
    program: glow::Program,
    u_matrix: Option<glow::UniformLocation>,
    u_opacity: Option<glow::UniformLocation>,
    sweeps: HashMap<BufferId, GpuSweep>,
    in_flight: VecDeque<InFlight>,
}

impl TileRenderer {
    pub fn new(gl: &glow::Context) -> Result<Self, RenderError> {
        let program = unsafe { compile_program(gl)? };
        let (u_matrix, u_opacity) = unsafe {
            (
                gl.get_uniform_location(program, "u_matrix"),
                gl.get_uniform_location(program, "u_opacity"),
            )
        };
        log::info!("Tile renderer initialized ({})", SHADER_VERSION);
        Ok(Self {
            program,
            u_matrix,
            u_opacity,
            sweeps: HashMap::new(),
            in_flight: VecDeque::new(),
        })
    }

    /// Number of buffers resident on the GPU.
    pub fn resident(&self) -> usize {
        self.sweeps.len()
    }

    /// Bytes of vertex data resident on the GPU.
    pub fn resident_bytes(&self) -> usize {
        self.sweeps.values().map(|s| s.bytes).sum()
    }

    /// Frames submitted but not yet known to be complete.
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Draws the current buffer of every key accepted by `include`.
    ///
    /// On `ResourceExhausted` nothing is drawn and the frame's epoch is
    /// still accounted for, so the next frame can proceed normally.
    pub fn render_frame(
        &mut self,
        gl: &glow::Context,
        cache: &SweepCache,
        view: &ViewTransform,
        include: impl Fn(&SweepKey) -> bool,
        opacity: f32,
    ) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats {
            freed: self.collect_garbage(gl, cache),
            ..FrameStats::default()
        };

        let snapshot = cache.begin_frame();
        stats.epoch = snapshot.epoch;
        let plan = plan_frame(
            snapshot.buffers.iter().filter(|b| include(&b.key)),
            view,
        );
        stats.visible_tiles = plan.visible_tiles;
        stats.culled_tiles = plan.culled_tiles;

        let result = self.execute(gl, &plan, opacity, &mut stats);
        let fence = if result.is_ok() && !plan.is_empty() {
            match unsafe { gl.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) } {
                Ok(fence) => Some(FrameFence(fence)),
                Err(e) => {
                    log::debug!("fence_sync failed for epoch {}: {}", snapshot.epoch, e);
                    None
                }
            }
        } else {
            None
        };
        self.in_flight.push_back(InFlight {
            epoch: snapshot.epoch,
            fence,
        });

        result.map(|()| stats)
    }

    fn execute(
        &mut self,
        gl: &glow::Context,
        plan: &FramePlan,
        opacity: f32,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        if plan.is_empty() {
            return Ok(());
        }

        for draw in &plan.draws {
            if !self.sweeps.contains_key(&draw.id()) {
                let sweep = unsafe { upload(gl, &draw.buffer)? };
                self.sweeps.insert(draw.id(), sweep);
                stats.uploads += 1;
            }
        }

        unsafe {
            gl.use_program(Some(self.program));
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
            gl.uniform_1_f32(self.u_opacity.as_ref(), opacity.clamp(0.0, 1.0));

            for draw in &plan.draws {
                let Some(sweep) = self.sweeps.get(&draw.id()) else {
                    continue;
                };
                gl.uniform_matrix_4_f32_slice(
                    self.u_matrix.as_ref(),
                    false,
                    &draw.matrix.to_cols_array(),
                );
                gl.bind_vertex_array(Some(sweep.vao));
                for range in &draw.ranges {
                    gl.draw_arrays(glow::TRIANGLES, range.first as i32, range.count as i32);
                }
                stats.buffers += 1;
                stats.draw_calls += draw.ranges.len();
                stats.vertices += u64::from(draw.vertex_count());
            }

            gl.bind_vertex_array(None);
            gl.use_program(None);
            check(gl, "sweep draw")
        }
    }

    /// Completes every epoch whose fence has signaled, then frees the GPU
    /// copies of buffers the cache no longer needs. Returns how many
    /// buffers were freed.
    fn collect_garbage(&mut self, gl: &glow::Context, cache: &SweepCache) -> usize {
        while let Some(front) = self.in_flight.front() {
            if let Some(FrameFence(fence)) = &front.fence {
                let fence = *fence;
                let status = unsafe { gl.client_wait_sync(fence, 0, 0) };
                match status {
                    glow::ALREADY_SIGNALED | glow::CONDITION_SATISFIED => {}
                    glow::TIMEOUT_EXPIRED => break,
                    other => log::warn!(
                        "Fence wait for epoch {} failed (0x{:04X})",
                        front.epoch,
                        other
                    ),
                }
                unsafe { gl.delete_sync(fence) };
            }
            cache.complete_frame(front.epoch);
            self.in_flight.pop_front();
        }

        let freed = cache.reclaim();
        let mut count = 0;
        for id in freed {
            if let Some(sweep) = self.sweeps.remove(&id) {
                unsafe {
                    gl.delete_vertex_array(sweep.vao);
                    gl.delete_buffer(sweep.vbo);
                }
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("Freed {} GPU sweep buffers ({} resident)", count, self.sweeps.len());
        }
        count
    }

    /// Releases every GPU resource. The context must still be current.
    pub fn destroy(&mut self, gl: &glow::Context, cache: &SweepCache) {
        unsafe {
            for entry in self.in_flight.drain(..) {
                if let Some(FrameFence(fence)) = entry.fence {
                    gl.delete_sync(fence);
                }
                cache.complete_frame(entry.epoch);
            }
            for (_, sweep) in self.sweeps.drain() {
                gl.delete_vertex_array(sweep.vao);
                gl.delete_buffer(sweep.vbo);
            }
            gl.delete_program(self.program);
        }
        cache.reclaim();
    }

    /// Drops the renderer after device loss without touching GL.
    ///
    /// Every in-flight epoch is reported complete; the context that could
    /// have been reading them no longer exists.
    pub fn abandon(self, cache: &SweepCache) {
        log::warn!(
            "Abandoning tile renderer ({} buffers, {} frames in flight)",
            self.sweeps.len(),
            self.in_flight.len()
        );
        if let Some(last) = self.in_flight.back() {
            cache.complete_frame(last.epoch);
        }
        cache.reclaim();
    }
}

unsafe fn compile_program(gl: &glow::Context) -> Result<glow::Program, RenderError> {
    let program = gl.create_program().map_err(RenderError::Backend)?;

    let sources = [
        (glow::VERTEX_SHADER, VERTEX_SHADER),
        (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
    ];
    let mut shaders = Vec::with_capacity(sources.len());
    for (kind, source) in sources {
        let shader = gl.create_shader(kind).map_err(RenderError::Backend)?;
        gl.shader_source(shader, &format!("{}\n{}", SHADER_VERSION, source));
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            gl.delete_program(program);
            return Err(RenderError::ShaderCompile(log));
        }
        gl.attach_shader(program, shader);
        shaders.push(shader);
    }

    gl.link_program(program);
    let linked = gl.get_program_link_status(program);
    for shader in shaders {
        gl.detach_shader(program, shader);
        gl.delete_shader(shader);
    }
    if !linked {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(RenderError::ShaderCompile(log));
    }
    Ok(program)
}

unsafe fn upload(gl: &glow::Context, buffer: &RasterBuffer) -> Result<GpuSweep, RenderError> {
    let vao = gl.create_vertex_array().map_err(RenderError::Backend)?;
    let vbo = match gl.create_buffer() {
        Ok(vbo) => vbo,
        Err(e) => {
            gl.delete_vertex_array(vao);
            return Err(RenderError::Backend(e));
        }
    };

    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
    gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, buffer.vertex_bytes(), glow::STATIC_DRAW);

    let stride = size_of::<RasterVertex>() as i32;
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(
        0,
        2,
        glow::FLOAT,
        false,
        stride,
        offset_of!(RasterVertex, position) as i32,
    );
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(
        1,
        4,
        glow::UNSIGNED_BYTE,
        true,
        stride,
        offset_of!(RasterVertex, color) as i32,
    );
    gl.bind_vertex_array(None);
    gl.bind_buffer(glow::ARRAY_BUFFER, None);

    if let Err(e) = check(gl, &format!("upload of {} {}", buffer.key, buffer.id)) {
        gl.delete_vertex_array(vao);
        gl.delete_buffer(vbo);
        return Err(e);
    }

    log::debug!(
        "Uploaded {} {} ({} vertices, {} bytes)",
        buffer.key,
        buffer.id,
        buffer.vertex_count(),
        buffer.byte_len()
    );
    Ok(GpuSweep {
        vao,
        vbo,
        bytes: buffer.byte_len(),
    })
}

unsafe fn check(gl: &glow::Context, context: &str) -> Result<(), RenderError> {
    match classify_gl_error(gl.get_error(), context) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
