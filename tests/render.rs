use std::sync::Arc;

use serde_json::json;
use toygraph::{
    GpuContext, OffscreenRenderer, PixelData, RenderError, RendererConfig, ShaderDocument,
};

/// A renderer on real hardware, or `None` when the machine has no adapter.
fn offscreen(width: u32, height: u32) -> Option<OffscreenRenderer> {
    match GpuContext::headless(width, height) {
        Ok(gpu) => Some(OffscreenRenderer::new(
            Arc::new(gpu),
            RendererConfig::new().size(width, height),
        )),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// A renderer on wgpu's noop backend. Shaders and resources are validated
/// as on hardware, but nothing is drawn.
fn validating_offscreen(width: u32, height: u32) -> OffscreenRenderer {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::NOOP,
        backend_options: wgpu::BackendOptions {
            noop: wgpu::NoopBackendOptions { enable: true },
            ..Default::default()
        },
        ..Default::default()
    });
    let gpu = GpuContext::headless_on(&instance, width, height).unwrap();
    OffscreenRenderer::new(Arc::new(gpu), RendererConfig::new().size(width, height))
}

fn image_document(code: &str) -> ShaderDocument {
    ShaderDocument::from_json(json!({
        "info": { "id": "test" },
        "renderpass": [{ "type": "image", "name": "Image", "code": code }]
    }))
}

const RED: &str = "void mainImage(out vec4 c, in vec2 f) { c = vec4(1.0, 0.0, 0.0, 1.0); }";

#[test]
fn solid_red_image() {
    let Some(mut offscreen) = offscreen(4, 4) else {
        return;
    };
    offscreen.renderer_mut().set_document(image_document(RED));

    let image = offscreen.render_to_image(4, 4).unwrap();
    assert_eq!(image.dimensions(), (4, 4));
    for pixel in image.pixels() {
        assert_eq!(pixel.0, [255, 0, 0, 255]);
    }
    assert!(offscreen.renderer().is_ready());
}

#[test]
fn feedback_reads_previous_frame() {
    let Some(mut offscreen) = offscreen(4, 4) else {
        return;
    };
    offscreen
        .renderer_mut()
        .set_document(ShaderDocument::from_json(json!({
            "info": { "id": "feedback" },
            "renderpass": [
                { "type": "buffer", "name": "Buf A",
                  "outputs": [{ "id": 257, "channel": 0 }],
                  "inputs": [{ "channel": 0, "ctype": "buffer", "id": 257,
                               "sampler": { "filter": "nearest", "wrap": "clamp" } }],
                  "code": "void mainImage(out vec4 c, in vec2 f) {
                               c = texture(iChannel0, f / iResolution.xy) + vec4(0.125, 0.0, 0.0, 0.0);
                           }" },
                { "type": "image", "name": "Image",
                  "inputs": [{ "channel": 0, "ctype": "buffer", "id": 257,
                               "sampler": { "filter": "nearest", "wrap": "clamp" } }],
                  "code": "void mainImage(out vec4 c, in vec2 f) {
                               c = vec4(texture(iChannel0, f / iResolution.xy).rgb, 1.0);
                           }" }
            ]
        })));

    // Each frame adds 0.125 on top of what the previous frame left behind.
    for (frame, expected) in [(0, 32u8), (1, 64), (2, 96)] {
        offscreen.renderer_mut().set_frame_number(frame);
        let image = offscreen.render_to_image(4, 4).unwrap();
        for pixel in image.pixels() {
            assert!(
                pixel.0[0].abs_diff(expected) <= 1,
                "frame {frame}: red {} != {expected}",
                pixel.0[0]
            );
        }
    }
}

#[test]
fn later_buffer_sees_this_frames_output() {
    let Some(mut offscreen) = offscreen(4, 4) else {
        return;
    };
    let nearest = json!({ "filter": "nearest", "wrap": "clamp" });
    // Buf B is declared first but runs after Buf A.
    offscreen
        .renderer_mut()
        .set_document(ShaderDocument::from_json(json!({
            "info": { "id": "chain" },
            "renderpass": [
                { "type": "buffer", "name": "Buf B",
                  "outputs": [{ "id": 258, "channel": 0 }],
                  "inputs": [{ "channel": 0, "ctype": "buffer", "id": 257, "sampler": nearest }],
                  "code": "void mainImage(out vec4 c, in vec2 f) {
                               c = texture(iChannel0, f / iResolution.xy);
                           }" },
                { "type": "buffer", "name": "Buf A",
                  "outputs": [{ "id": 257, "channel": 0 }],
                  "code": "void mainImage(out vec4 c, in vec2 f) {
                               c = vec4(float(iFrame + 1) * 0.125, 0.0, 0.0, 1.0);
                           }" },
                { "type": "image", "name": "Image",
                  "inputs": [{ "channel": 0, "ctype": "buffer", "id": 258, "sampler": nearest }],
                  "code": "void mainImage(out vec4 c, in vec2 f) {
                               c = vec4(texture(iChannel0, f / iResolution.xy).rgb, 1.0);
                           }" }
            ]
        })));

    for (frame, expected) in [(0, 32u8), (1, 64), (2, 96)] {
        offscreen.renderer_mut().set_frame_number(frame);
        let image = offscreen.render_to_image(4, 4).unwrap();
        for pixel in image.pixels() {
            assert!(
                pixel.0[0].abs_diff(expected) <= 1,
                "frame {frame}: red {} != {expected}",
                pixel.0[0]
            );
        }
    }
}

#[test]
fn compile_failure_names_the_pass() {
    let mut offscreen = validating_offscreen(4, 4);
    offscreen
        .renderer_mut()
        .set_document(ShaderDocument::from_json(json!({
            "info": { "id": "broken" },
            "renderpass": [
                { "type": "buffer", "name": "Buf A", "outputs": [{ "id": 257 }],
                  "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(0.5); }" },
                { "type": "image", "name": "Broken Image",
                  "code": "void mainImage(out vec4 c, in vec2 f) { c = ; }" }
            ]
        })));

    assert!(offscreen.render_to_image(4, 4).is_err());
    let renderer = offscreen.renderer();
    assert!(!renderer.is_ready());
    let error = renderer.last_error().unwrap();
    assert!(error.contains("Broken Image"), "{error}");
    // Locations count from the first line of the pass source.
    assert!(error.contains("glsl:1:"), "{error}");

    // No retry without a structural change.
    assert!(offscreen.render_to_image(4, 4).is_err());
    assert!(offscreen.renderer().last_error().unwrap().contains("Broken Image"));
}

#[test]
fn resolution_change_rebuilds() {
    let mut offscreen = validating_offscreen(4, 4);
    offscreen.renderer_mut().set_document(image_document(RED));

    offscreen.render_to_image(4, 4).unwrap();
    let renderer = offscreen.renderer_mut();
    assert!(renderer.is_ready());
    renderer.set_resolution(4, 4);
    assert!(renderer.is_ready());
    renderer.set_resolution(8, 2);
    assert!(!renderer.is_ready());

    let image = offscreen.render_to_image(8, 2).unwrap();
    assert_eq!(image.dimensions(), (8, 2));
    assert!(offscreen.renderer().is_ready());
    assert_eq!(offscreen.renderer().resolution(), (8, 2));
}

#[test]
fn resolution_reaches_the_shader() {
    let Some(mut offscreen) = offscreen(4, 4) else {
        return;
    };
    offscreen.renderer_mut().set_document(image_document(
        "void mainImage(out vec4 c, in vec2 f) { c = vec4(iResolution.x / 255.0, iResolution.y / 255.0, 0.0, 1.0); }",
    ));

    let image = offscreen.render_to_image(4, 4).unwrap();
    assert_eq!(image.get_pixel(0, 0).0, [4, 4, 0, 255]);

    let image = offscreen.render_to_image(8, 2).unwrap();
    assert_eq!(image.get_pixel(7, 1).0, [8, 2, 0, 255]);
}

#[test]
fn oversized_target_is_an_error() {
    let mut offscreen = validating_offscreen(4, 4);
    offscreen.renderer_mut().set_document(image_document(RED));

    let err = offscreen.render_to_image(10_000, 4).unwrap_err();
    assert!(matches!(err, RenderError::Resource(_)), "{err}");

    // The renderer recovers once the size fits again.
    offscreen.render_to_image(4, 4).unwrap();
    assert!(offscreen.renderer().is_ready());
}

#[test]
fn oversized_asset_stays_unbound() {
    let mut offscreen = validating_offscreen(4, 4);
    let renderer = offscreen.renderer_mut();
    renderer.set_document(ShaderDocument::from_json(json!({
        "info": { "id": "big" },
        "renderpass": [{ "type": "image", "name": "Image",
            "inputs": [{ "channel": 0, "ctype": "texture", "src": "/media/wide.png" }],
            "code": "void mainImage(out vec4 c, in vec2 f) { c = texture(iChannel0, f / iResolution.xy); }" }]
    })));
    renderer.insert_asset(
        "/media/wide.png",
        Arc::new(PixelData::new(9000, 1, vec![255; 9000 * 4])),
    );

    offscreen.render_to_image(4, 4).unwrap();
    offscreen.render_to_image(4, 4).unwrap();
    assert!(offscreen.renderer().is_ready());
}

#[test]
fn oversized_sound_target_is_an_error() {
    let mut offscreen = validating_offscreen(4, 4);
    let renderer = offscreen.renderer_mut();
    renderer.set_document(ShaderDocument::from_json(json!({
        "info": { "id": "sound" },
        "renderpass": [{ "type": "sound", "name": "Sound",
            "code": "vec2 mainSound(float t) { return vec2(0.0); }" }]
    })));
    renderer.set_resolution(4096, 9000);

    let err = renderer.render_sound_samples().unwrap_err();
    assert!(matches!(err, RenderError::Resource(_)), "{err}");
    assert!(renderer.last_error().unwrap().contains("Sound Target"));
}

#[test]
fn sound_pass_renders_stereo_samples() {
    let Some(mut offscreen) = offscreen(4, 2) else {
        return;
    };
    let renderer = offscreen.renderer_mut();
    renderer.set_document(ShaderDocument::from_json(json!({
        "info": { "id": "sound" },
        "renderpass": [{ "type": "sound", "name": "Sound",
            "code": "vec2 mainSound(float t) { return vec2(t * 44100.0, -0.5); }" }]
    })));

    let samples = renderer.render_sound_samples().unwrap();
    assert_eq!(samples.len(), 4 * 2 * 2);
    for (frame, pair) in samples.chunks_exact(2).enumerate() {
        assert!((pair[0] - frame as f32).abs() < 0.01, "{pair:?} at {frame}");
        assert_eq!(pair[1], -0.5);
    }
}
