//! GLSL generation: wraps a pass' raw source into a complete fragment program.
//!
//! The generated program is, in order: the uniform preamble, one sampler
//! declaration per channel, the pass source verbatim, and an epilogue whose
//! `main` calls the pass entry point (`mainImage`, `mainSound` or `mainVR`).

use std::fmt::Write as _;

use crate::document::{CHANNEL_COUNT, PassKind};

/// How image passes map pixels to the shader's entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Plain `mainImage`.
    #[default]
    Rect,
    /// `mainVR` with a fisheye ray per pixel.
    Fisheye,
    /// `mainVR` rendered side by side for the left and right eye.
    CrossEye,
}

impl Projection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rect" => Some(Self::Rect),
            "fisheye" => Some(Self::Fisheye),
            "cross-eye" | "crosseye" => Some(Self::CrossEye),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Fisheye => "fisheye",
            Self::CrossEye => "cross-eye",
        }
    }
}

/// Vertex program shared by every pass: an indexed quad in clip space.
pub const VERTEX_WGSL: &str = r#"
@vertex
fn vs(@location(0) position: vec2f) -> @builtin(position) vec4f {
    return vec4f(position, 0.0, 1.0);
}
"#;

const PREAMBLE: &str = "#version 450
layout(std140, set = 0, binding = 0) uniform ShadertoyUniforms {
    vec3  iResolution;
    float iTime;
    float iTimeDelta;
    int   iFrame;
    float iSampleRate;
    float iFrameRate;
    vec4  iMouse;
    vec4  iDate;
    vec4  _st_eyeMod;
    float iChannelTime[4];
    vec3  iChannelResolution[4];
};
#define iGlobalTime iTime
layout(location = 0) out vec4 _st_fragColor;
";

const EPILOGUE_BUFFER: &str = "
void main() {
    mainImage(_st_fragColor, gl_FragCoord.xy);
}
";

const EPILOGUE_RECT: &str = "
void main() {
    vec2 _st_fc = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    mainImage(_st_fragColor, _st_fc);
}
";

const EPILOGUE_FISHEYE: &str = "
void main() {
    vec2 _st_fc = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    vec2 _st_uv = (_st_fc - .5 * iResolution.xy) / iResolution.y * 2.;
    vec3 _st_ro = vec3(0.);
    vec3 _st_rd = normalize(vec3(_st_uv, -2. + length(_st_uv)));
    mainVR(_st_fragColor, _st_fc, _st_ro, _st_rd);
}
";

const EPILOGUE_CROSS_EYE: &str = "
void main() {
    vec2 _st_fc = vec2(gl_FragCoord.x, iResolution.y - gl_FragCoord.y);
    vec2 _st_res = iResolution.xy * vec2(.5, 1.);
    float _st_side = _st_fc.x < _st_res.x ? -1. : 1.;
    vec2 _st_uv = (vec2(mod(_st_fc.x, _st_res.x), _st_fc.y) - .5 * _st_res) / _st_res.y * 2.;
    vec3 _st_ro = vec3(-_st_side * _st_eyeMod.x, 0., 0.);
    vec3 _st_rd = normalize(vec3(_st_uv, -1.));
    mainVR(_st_fragColor, _st_fc, _st_ro, _st_rd);
}
";

const EPILOGUE_SOUND: &str = "
void main() {
    vec2 _st_pix = floor(gl_FragCoord.xy);
    float _st_pos = _st_pix.x + iResolution.x * _st_pix.y;
    vec2 _st_sam = mainSound(_st_pos / iSampleRate);
    _st_fragColor = vec4(_st_sam.x, _st_sam.y, 0., 1.);
}
";

/// Declares `iChannel0..3` over separate texture/sampler bindings in set 1.
///
/// Sampler kinds are fixed at compile time, so cubemap channels must be
/// known before the program is built.
pub fn sampler_declarations(cube_channels: [bool; CHANNEL_COUNT]) -> String {
    let mut out = String::new();
    for (channel, cube) in cube_channels.into_iter().enumerate() {
        let (texture, sampler) = if cube {
            ("textureCube", "samplerCube")
        } else {
            ("texture2D", "sampler2D")
        };
        let binding = channel * 2;
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {binding}) uniform {texture} iChannel{channel}_texture;"
        );
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {}) uniform sampler iChannel{channel}_sampler;",
            binding + 1
        );
        let _ = writeln!(
            out,
            "#define iChannel{channel} {sampler}(iChannel{channel}_texture, iChannel{channel}_sampler)"
        );
    }
    out
}

/// The `main` wrapper for a pass of `kind`.
///
/// Buffer passes always use `mainImage`; the projection only affects image passes.
pub fn epilogue(kind: PassKind, projection: Projection) -> &'static str {
    match (kind, projection) {
        (PassKind::Sound, _) => EPILOGUE_SOUND,
        (PassKind::Buffer, _) => EPILOGUE_BUFFER,
        (PassKind::Image, Projection::Rect) => EPILOGUE_RECT,
        (PassKind::Image, Projection::Fisheye) => EPILOGUE_FISHEYE,
        (PassKind::Image, Projection::CrossEye) => EPILOGUE_CROSS_EYE,
    }
}

/// Complete fragment program for one pass.
pub fn fragment_program(
    kind: PassKind,
    source: &str,
    cube_channels: [bool; CHANNEL_COUNT],
    projection: Projection,
) -> String {
    let samplers = sampler_declarations(cube_channels);
    let epilogue = epilogue(kind, projection);
    let mut out =
        String::with_capacity(PREAMBLE.len() + samplers.len() + source.len() + epilogue.len() + 1);
    out.push_str(PREAMBLE);
    out.push_str(&samplers);
    out.push_str(source);
    out.push('\n');
    out.push_str(epilogue);
    out
}

/// Number of generated lines in front of the pass source, for mapping
/// compiler line numbers back to the user's text.
pub fn source_line_offset() -> usize {
    PREAMBLE.lines().count() + sampler_declarations([false; CHANNEL_COUNT]).lines().count()
}

/// Rewrites `path:line:column` locations in compiler diagnostics so lines
/// count from the first line of the pass source. Lines inside the generated
/// preamble are left alone.
pub fn map_source_lines(log: &str, paths: &[&str]) -> String {
    let offset = source_line_offset();
    let mut mapped = log.to_string();
    for path in paths.iter().filter(|p| !p.is_empty()) {
        let needle = format!("{path}:");
        let mut out = String::with_capacity(mapped.len());
        let mut rest = mapped.as_str();
        while let Some(at) = rest.find(&needle) {
            let (head, tail) = rest.split_at(at + needle.len());
            out.push_str(head);
            let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
            let (number, after) = tail.split_at(digits);
            match number.parse::<usize>() {
                Ok(line) if line > offset && after.starts_with(':') => {
                    out.push_str(&(line - offset).to_string());
                }
                _ => out.push_str(number),
            }
            rest = after;
        }
        out.push_str(rest);
        mapped = out;
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "void mainImage(out vec4 c, in vec2 f) { c = vec4(1.0, 0.0, 0.0, 1.0); }";

    #[test]
    fn program_is_preamble_samplers_source_epilogue() {
        let program = fragment_program(PassKind::Image, SRC, [false; 4], Projection::Rect);
        assert!(program.starts_with("#version 450"));
        let samplers = program.find("iChannel0_texture").unwrap();
        let source = program.find(SRC).unwrap();
        let main = program.find("void main()").unwrap();
        assert!(samplers < source && source < main);
        assert!(program.contains("mainImage(_st_fragColor, _st_fc)"));
    }

    #[test]
    fn cube_channels_declare_cube_samplers() {
        let decls = sampler_declarations([false, true, false, false]);
        assert!(decls.contains("uniform texture2D iChannel0_texture"));
        assert!(decls.contains("uniform textureCube iChannel1_texture"));
        assert!(decls.contains("#define iChannel1 samplerCube(iChannel1_texture, iChannel1_sampler)"));
        assert!(decls.contains("#define iChannel3 sampler2D("));
        assert!(decls.contains("layout(set = 1, binding = 7) uniform sampler iChannel3_sampler"));
    }

    #[test]
    fn sound_epilogue_addresses_samples_linearly() {
        let program = fragment_program(PassKind::Sound, "", [false; 4], Projection::Fisheye);
        assert!(program.contains("_st_pix.x + iResolution.x * _st_pix.y"));
        assert!(program.contains("mainSound(_st_pos / iSampleRate)"));
        assert!(!program.contains("mainVR"));
    }

    #[test]
    fn projections_pick_entry_points() {
        assert!(epilogue(PassKind::Image, Projection::Fisheye).contains("mainVR"));
        assert!(epilogue(PassKind::Image, Projection::CrossEye).contains("_st_eyeMod.x"));
        assert!(epilogue(PassKind::Buffer, Projection::CrossEye).contains("mainImage"));
        assert!(epilogue(PassKind::Buffer, Projection::Rect).contains("gl_FragCoord.xy"));
    }

    #[test]
    fn projection_names() {
        for p in [Projection::Rect, Projection::Fisheye, Projection::CrossEye] {
            assert_eq!(Projection::from_name(p.name()), Some(p));
        }
        assert_eq!(Projection::from_name("sphere"), None);
    }

    #[test]
    fn line_offset_counts_generated_lines() {
        let program = fragment_program(PassKind::Image, "LINE_ONE", [false; 4], Projection::Rect);
        let line = program.lines().position(|l| l == "LINE_ONE").unwrap();
        assert_eq!(line, source_line_offset());
    }

    #[test]
    fn diagnostics_count_from_the_pass_source() {
        let offset = source_line_offset();
        let log = format!(
            "error: expected expression\n  ┌─ glsl:{}:45\n  ┌─ Buf A:{}:3\n  ┌─ glsl:2:1",
            offset + 1,
            offset + 7
        );
        let mapped = map_source_lines(&log, &["glsl", "Buf A"]);
        assert!(mapped.contains("glsl:1:45"), "{mapped}");
        assert!(mapped.contains("Buf A:7:3"), "{mapped}");
        // Preamble lines are not shifted.
        assert!(mapped.contains("glsl:2:1"), "{mapped}");
    }
}
