//! The standard uniform block every pass receives.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::document::CHANNEL_COUNT;

/// Uniform block shared by all passes.
///
/// Uploaded once per pass per frame and bound at `set = 0, binding = 0`.
/// The layout follows std140, so scalar arrays use a 16-byte stride and
/// the struct has no implicit padding.
///
/// # GLSL Declaration
///
/// ```glsl
/// layout(std140, set = 0, binding = 0) uniform ShadertoyUniforms {
///     vec3  iResolution;
///     float iTime;
///     float iTimeDelta;
///     int   iFrame;
///     float iSampleRate;
///     float iFrameRate;
///     vec4  iMouse;
///     vec4  iDate;
///     vec4  _st_eyeMod;
///     float iChannelTime[4];
///     vec3  iChannelResolution[4];
/// };
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadertoyUniforms {
    /// Output size in pixels; `z` is width / height.
    pub resolution: [f32; 3],
    /// Elapsed time in seconds.
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    /// Samples per second used by sound passes.
    pub sample_rate: f32,
    /// Measured frames per second, zero in single-shot mode.
    pub frame_rate: f32,
    /// `xy` = position in pixels, `z` = left button, `w` = right button.
    pub mouse: [f32; 4],
    /// Year, month (1-12), day, seconds of the day.
    pub date: [f32; 4],
    /// `x` = eye distance, `y` = eye rotation.
    pub eye_mod: [f32; 4],
    /// Only `[i][0]` is read by the shader.
    pub channel_time: [[f32; 4]; CHANNEL_COUNT],
    /// `[w, h, w / h, 0]` per channel, zero for unbound channels.
    pub channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

impl ShadertoyUniforms {
    /// Byte size of the block as the GPU sees it.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(width: u32, height: u32, frame: &FrameInputs) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            resolution: [w, h, aspect(w, h)],
            time: frame.time,
            time_delta: frame.time_delta,
            frame: frame.frame,
            sample_rate: frame.sample_rate,
            frame_rate: frame.frame_rate,
            mouse: frame.mouse,
            date: frame.date.to_vec4(),
            eye_mod: [frame.eye_distance, frame.eye_rotation, 0.0, 0.0],
            channel_time: [[0.0; 4]; CHANNEL_COUNT],
            channel_resolution: [[0.0; 4]; CHANNEL_COUNT],
        }
    }

    /// Records the size of whatever is bound to `channel`.
    pub fn set_channel_resolution(&mut self, channel: usize, width: u32, height: u32) {
        if let Some(slot) = self.channel_resolution.get_mut(channel) {
            let (w, h) = (width as f32, height as f32);
            *slot = [w, h, aspect(w, h), 0.0];
        }
    }
}

fn aspect(w: f32, h: f32) -> f32 {
    if h > 0.0 { w / h } else { 0.0 }
}

/// Calendar date as seen by `iDate`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShaderDate {
    pub year: i32,
    /// 1-12.
    pub month: u32,
    /// 1-31.
    pub day: u32,
    /// Seconds since midnight, with fraction.
    pub seconds: f32,
}

impl ShaderDate {
    pub fn to_vec4(self) -> [f32; 4] {
        [
            self.year as f32,
            self.month as f32,
            self.day as f32,
            self.seconds,
        ]
    }

    /// The current local date from the system clock.
    pub fn now() -> Self {
        Local::now().into()
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ShaderDate {
    fn from(time: DateTime<Tz>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
            day: time.day(),
            seconds: time.num_seconds_from_midnight() as f32
                + time.nanosecond() as f32 / 1_000_000_000.0,
        }
    }
}

/// Host-controlled per-frame state, applied at the next render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub frame_rate: f32,
    pub sample_rate: f32,
    pub mouse: [f32; 4],
    pub date: ShaderDate,
    pub eye_distance: f32,
    pub eye_rotation: f32,
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            time: 0.0,
            time_delta: 0.0,
            frame: 0,
            frame_rate: 0.0,
            sample_rate: 44_100.0,
            mouse: [0.0; 4],
            date: ShaderDate::default(),
            eye_distance: 0.1,
            eye_rotation: 0.0,
        }
    }
}
