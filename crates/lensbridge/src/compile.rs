/// Name of the uniform block the parameter uniforms live in.
pub const PARAMS_BLOCK: &str = "DistortionParams";

/// Produces a self-contained fragment shader from a host-supplied body.
///
/// Host shaders may be written GLES-style with loose `uniform float k1;`
/// declarations. Steps performed:
///
/// 1. Leave sources that already declare [`PARAMS_BLOCK`] untouched.
/// 2. Strip `#version`, `precision` statements and loose `k1`/`k2` uniform
///    declarations.
/// 3. Prepend [`HEADER`], which declares the varyings, the output, the
///    uniform block, and macro aliases for the bare `k1`/`k2` names.
pub fn wrap_fragment(source: &str) -> String {
    if source.contains(PARAMS_BLOCK) {
        return source.to_string();
    }

    let mut sanitized = String::with_capacity(source.len());
    let mut skipped_version = false;
    for line in source.lines() {
        let trimmed = line.trim_start();
        if !skipped_version && trimmed.starts_with("#version") {
            skipped_version = true;
            continue;
        }
        let loose_parameter = trimmed.starts_with("uniform ")
            && (trimmed.contains(" k1;") || trimmed.contains(" k2;"));
        if loose_parameter || trimmed.starts_with("precision ") {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n#line 1\n{sanitized}")
}

/// Prologue injected ahead of host fragment shaders.
///
/// The block layout must stay in sync with the reflection done by the wgpu
/// platform: two std140 floats at offsets 0 and 4.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform DistortionParams {
    float k1;
    float k2;
} params;

#define k1 params.k1
#define k2 params.k2
";

/// Side-by-side lens pre-distortion over a calibration grid.
///
/// Each eye covers half of the surface. Coordinates are normalised to
/// [-1, 1] around the eye centre and scaled by `1 + k1·r² + k2·r⁴`; samples
/// that land outside the unit square are black.
pub const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform DistortionParams {
    float k1;
    float k2;
} params;

const float GRID_CELLS = 8.0;
const float LINE_WIDTH = 0.04;

void main() {
    bool right_eye = v_uv.x >= 0.5;
    vec2 local = vec2(fract(v_uv.x * 2.0), v_uv.y);
    vec2 n = local * 2.0 - 1.0;
    float r2 = dot(n, n);
    float scale = 1.0 + params.k1 * r2 + params.k2 * r2 * r2;
    vec2 src = n * scale;
    if (abs(src.x) > 1.0 || abs(src.y) > 1.0) {
        outColor = vec4(0.0, 0.0, 0.0, 1.0);
        return;
    }

    vec2 cell = abs(fract(src * (GRID_CELLS * 0.5)) - vec2(0.5));
    float line = 1.0 - smoothstep(0.0, LINE_WIDTH, min(cell.x, cell.y));
    vec3 tint = right_eye ? vec3(0.25, 0.6, 0.95) : vec3(0.95, 0.55, 0.25);
    vec3 background = vec3(0.04);
    outColor = vec4(background + (tint - background) * line, 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_replaces_loose_uniforms_with_block() {
        let source = r#"#version 300 es
precision mediump float;
uniform float k1;
uniform float k2;
void main() {
    outColor = vec4(v_uv * (1.0 + k1 + k2), 0.0, 1.0);
}
"#;

        let wrapped = wrap_fragment(source);
        assert!(!wrapped.contains("uniform float k1;"));
        assert!(!wrapped.contains("#version 300 es"));
        assert!(!wrapped.contains("precision mediump"));
        assert!(wrapped.starts_with("#version 450"));
        assert!(wrapped.contains(PARAMS_BLOCK));
        assert!(wrapped.contains("#define k1 params.k1"));
        assert!(wrapped.contains("outColor = vec4(v_uv * (1.0 + k1 + k2), 0.0, 1.0);"));
    }

    #[test]
    fn wrap_leaves_complete_shaders_alone() {
        assert_eq!(wrap_fragment(FRAGMENT_SHADER_GLSL), FRAGMENT_SHADER_GLSL);
    }
}
